use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stream_windows::{Aggregate, ScheduledThreadPool, WindowDefinition, Windows};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Sensor reading fed into the demo window.
#[derive(Debug, Clone)]
struct Reading {
    sensor: u32,
    value: f64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let clause = std::env::args().nth(1).unwrap_or_else(|| "[LAST 5]".to_string());
    if let Err(e) = run(&clause) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(clause: &str) -> Result<(), Box<dyn std::error::Error>> {
    let definition: WindowDefinition = clause.parse()?;
    info!("Window clause {} parsed as {}", clause, definition);

    let window = Windows::from_definition(&definition, |reading: &Reading| reading.sensor)?;
    let pool = if window.requires_scheduler() {
        let pool = Arc::new(ScheduledThreadPool::new(2)?);
        window.register_scheduler(pool.clone())?;
        Some(pool)
    } else {
        None
    };

    let averages = Aggregate::attach_defined(&window, |readings: &[Reading], sensor: &u32| {
        let sum: f64 = readings.iter().map(|r| r.value).sum();
        let average = if readings.is_empty() {
            None
        } else {
            Some(sum / readings.len() as f64)
        };
        (*sensor, readings.len(), average)
    });

    for i in 0..40u32 {
        window.insert(Reading {
            sensor: i % 3,
            value: f64::from(20 + i % 7),
        })?;
        if definition.requires_scheduler() {
            thread::sleep(Duration::from_millis(25));
        }
    }

    if let WindowDefinition::TimeSliding { span: wait } | WindowDefinition::TimeBatch { period: wait } =
        definition
    {
        thread::sleep(wait + Duration::from_millis(50));
    }

    for (sensor, count, average) in averages.try_iter() {
        match average {
            Some(average) => info!(sensor, count, average, "Window processed"),
            None => info!(sensor, "Window processed with no readings"),
        }
    }

    if let Some(pool) = pool {
        pool.shutdown();
    }
    Ok(())
}
