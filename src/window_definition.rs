use crate::error::ConfigError;
use crate::window_clause_parser::WindowClauseParser;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A window flavor and its bound, as written in a window clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowDefinition {
    /// `[LAST n]`: the last `count` tuples, processed on every insert.
    LastN { count: usize },
    /// `[BATCH n]`: batches of `size` tuples.
    CountBatch { size: usize },
    /// `[RANGE d UNIT]`: tuples inserted within the last `span`.
    TimeSliding { span: Duration },
    /// `[TUMBLE d UNIT]`: everything inserted during each `period`.
    TimeBatch { period: Duration },
}

impl WindowDefinition {
    /// Whether windows built from this definition need a scheduler.
    pub fn requires_scheduler(&self) -> bool {
        matches!(
            self,
            WindowDefinition::TimeSliding { .. } | WindowDefinition::TimeBatch { .. }
        )
    }

    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            WindowDefinition::CountBatch { .. } | WindowDefinition::TimeBatch { .. }
        )
    }
}

impl fmt::Display for WindowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowDefinition::LastN { count } => write!(f, "[LAST {}]", count),
            WindowDefinition::CountBatch { size } => write!(f, "[BATCH {}]", size),
            WindowDefinition::TimeSliding { span } => {
                write!(f, "[RANGE {} MILLISECONDS]", span.as_millis())
            }
            WindowDefinition::TimeBatch { period } => {
                write!(f, "[TUMBLE {} MILLISECONDS]", period.as_millis())
            }
        }
    }
}

impl FromStr for WindowDefinition {
    type Err = ConfigError;

    fn from_str(clause: &str) -> Result<Self, Self::Err> {
        WindowClauseParser::parse(clause)
    }
}
