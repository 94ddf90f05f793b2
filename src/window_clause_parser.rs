use crate::error::ConfigError;
use crate::window_definition::WindowDefinition;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use std::time::Duration;

static CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\[?\s*(LAST|BATCH|RANGE|TUMBLE)\s+(\S+?)(?:\s*([A-Z]+))?\s*\]?\s*$")
        .expect("window clause pattern is valid")
});

static EMBEDDED_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*(LAST|BATCH|RANGE|TUMBLE)\s+(\S+?)(?:\s*([A-Z]+))?\s*\]")
        .expect("embedded window clause pattern is valid")
});

/// Parser for textual window clauses.
///
/// | Clause                      | Window                         |
/// |-----------------------------|--------------------------------|
/// | `[LAST 10]`, `[LAST 10 TUPLES]` | last 10 tuples, sliding    |
/// | `[BATCH 113]`               | batches of 113 tuples          |
/// | `[RANGE 5 SECONDS]`         | tuples of the last 5 seconds   |
/// | `[TUMBLE 1 S]`, `[BATCH 1 S]` | a batch every second         |
///
/// Keywords and units are case-insensitive, the brackets are optional for
/// a single clause.
pub struct WindowClauseParser {
    text: String,
}

impl WindowClauseParser {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Parse a single clause.
    pub fn parse(clause: &str) -> Result<WindowDefinition, ConfigError> {
        Self::new(clause).parse_clause()
    }

    /// Parse the text as exactly one clause.
    pub fn parse_clause(&self) -> Result<WindowDefinition, ConfigError> {
        let captures = CLAUSE
            .captures(&self.text)
            .ok_or_else(|| ConfigError::Malformed {
                clause: self.text.clone(),
            })?;
        definition_from(&captures, &self.text)
    }

    /// Parse every bracketed clause embedded in the text, in order of
    /// appearance.
    pub fn parse_all(&self) -> Result<Vec<WindowDefinition>, ConfigError> {
        EMBEDDED_CLAUSE
            .captures_iter(&self.text)
            .map(|captures| {
                let clause = captures.get(0).map_or("", |m| m.as_str());
                definition_from(&captures, clause)
            })
            .collect()
    }
}

fn definition_from(captures: &Captures<'_>, clause: &str) -> Result<WindowDefinition, ConfigError> {
    let malformed = || ConfigError::Malformed {
        clause: clause.to_string(),
    };

    let kind = captures
        .get(1)
        .ok_or_else(malformed)?
        .as_str()
        .to_ascii_uppercase();
    let value = captures.get(2).ok_or_else(malformed)?.as_str();
    let unit = captures.get(3).map(|m| m.as_str().to_ascii_uppercase());

    let amount = parse_amount(value)?;

    match (kind.as_str(), unit.as_deref()) {
        ("LAST", unit) if unit.is_none_or(is_count_unit) => Ok(WindowDefinition::LastN {
            count: to_count(amount, value)?,
        }),
        ("BATCH", unit) if unit.is_none_or(is_count_unit) => Ok(WindowDefinition::CountBatch {
            size: to_count(amount, value)?,
        }),
        ("BATCH" | "TUMBLE", Some(unit)) => Ok(WindowDefinition::TimeBatch {
            period: to_duration(amount, unit, value)?,
        }),
        ("RANGE", Some(unit)) => Ok(WindowDefinition::TimeSliding {
            span: to_duration(amount, unit, value)?,
        }),
        _ => Err(malformed()),
    }
}

fn parse_amount(value: &str) -> Result<u64, ConfigError> {
    let amount: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
        value: value.to_string(),
        reason: "not a whole number".to_string(),
    })?;
    if amount == 0 {
        return Err(ConfigError::InvalidValue {
            value: value.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(amount)
}

fn is_count_unit(unit: &str) -> bool {
    matches!(unit, "TUPLES" | "TUPLE" | "ROWS" | "ROW")
}

fn to_count(amount: u64, value: &str) -> Result<usize, ConfigError> {
    usize::try_from(amount).map_err(|_| ConfigError::InvalidValue {
        value: value.to_string(),
        reason: "too large".to_string(),
    })
}

fn to_duration(amount: u64, unit: &str, value: &str) -> Result<Duration, ConfigError> {
    let millis_per_unit: u64 = match unit {
        "MILLISECONDS" | "MILLISECOND" | "MILLIS" | "MS" => 1,
        "SECONDS" | "SECOND" | "SECS" | "SEC" | "S" => 1_000,
        "MINUTES" | "MINUTE" | "MINS" | "MIN" | "M" => 60_000,
        "HOURS" | "HOUR" | "H" => 3_600_000,
        _ => {
            return Err(ConfigError::UnknownUnit {
                unit: unit.to_string(),
            });
        }
    };
    amount
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| ConfigError::InvalidValue {
            value: value.to_string(),
            reason: "duration overflows".to_string(),
        })
}
