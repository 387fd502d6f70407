//! Autofill scenario replay
//!
//! Drives the autofill engine with a scripted sequence of screens and events
//! and prints what it did at every step.
//!
//! ## Usage
//! ```text
//! autofill-replay scenario.json
//! AUTOFILL_SCENARIO=scenario.json autofill-replay
//! ```
//!
//! Scenarios that carry no `settings` block use the stored user settings
//! (see `AUTOFILL_CONFIG`).

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use accessibility_autofill::config::load_settings;
use accessibility_autofill::error::{AutofillError, Result};
use accessibility_autofill::simulator::{replay, Scenario};

const SCENARIO_ENV: &str = "AUTOFILL_SCENARIO";

fn scenario_path() -> Result<PathBuf> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(SCENARIO_ENV).ok())
        .map(PathBuf::from)
        .ok_or_else(|| {
            AutofillError::ConfigError(format!(
                "No scenario given. Pass a path or set {}",
                SCENARIO_ENV
            ))
        })
}

fn main() -> Result<()> {
    // Load environment variables from .env file (optional)
    let _ = dotenvy::dotenv();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    let path = scenario_path()?;
    info!("Replaying scenario {:?}", path);

    let content = fs::read_to_string(&path)?;
    let mut scenario: Scenario = serde_json::from_str(&content)
        .map_err(|e| AutofillError::ConfigError(format!("Invalid scenario: {}", e)))?;

    if scenario.settings.is_none() {
        match load_settings() {
            Ok(settings) => scenario.settings = Some(settings),
            Err(e) => warn!("Using default settings: {}", e),
        }
    }

    let reports = replay(&scenario);
    for report in &reports {
        let line = serde_json::to_string(report)
            .map_err(|e| AutofillError::ConfigError(format!("Failed to encode report: {}", e)))?;
        println!("{}", line);
    }

    let leaked: usize = reports.iter().map(|r| r.handles_outstanding).max().unwrap_or(0);
    if leaked > 0 {
        warn!("{} node handles were never released", leaked);
    }

    info!("Replayed {} steps", reports.len());
    Ok(())
}
