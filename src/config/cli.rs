//! Command-line argument parsing

use std::time::Duration;

use clap::Parser;

use crate::config::AppConfig;
use crate::error::ConfigError;

/// Command-line arguments structure
#[derive(Parser, Debug)]
#[command(name = "dockdig")]
#[command(about = "Digs and validates DNS names on all networks attached to a specific container")]
#[command(version)]
pub struct CliArgs {
    /// Name of the target container
    pub container: String,

    /// Indentation width
    #[arg(long, default_value_t = 3)]
    pub indent: u32,

    /// Number of DNS and ping workers
    #[arg(long, default_value_t = 5)]
    pub workers: u32,

    /// Spinner interval, e.g. "100ms" or "1s"
    #[arg(long, default_value = "100ms")]
    pub spinner: String,

    /// Enable debugging output
    #[arg(long)]
    pub debug: bool,
}

impl CliArgs {
    /// Validates the arguments and maps them into the application
    /// configuration.
    pub fn into_config(self) -> Result<AppConfig, ConfigError> {
        if self.indent > 80 {
            return Err(ConfigError::OutOfRange {
                flag: "indent",
                value: self.indent.to_string(),
                range: "0..=80",
            });
        }
        if self.workers < 1 || self.workers > 10 {
            return Err(ConfigError::OutOfRange {
                flag: "workers",
                value: self.workers.to_string(),
                range: "1..=10",
            });
        }
        let spinner_interval = parse_duration(&self.spinner)?;
        if spinner_interval < Duration::from_millis(10) {
            return Err(ConfigError::OutOfRange {
                flag: "spinner",
                value: self.spinner,
                range: "10ms..",
            });
        }

        Ok(AppConfig {
            container: self.container,
            indentation: self.indent as usize,
            workers: self.workers as usize,
            spinner_interval,
            debug: self.debug,
        })
    }
}

/// Parses durations of the forms "250ms", "2s" and "1m"; a bare number counts
/// as milliseconds.
fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let input = input.trim();
    let (digits, unit) = match input.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => input.split_at(split),
        None => (input, "ms"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(input.to_string()))?;
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        _ => Err(ConfigError::InvalidDuration(input.to_string())),
    }
}
