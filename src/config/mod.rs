//! Configuration management module
//!
//! The command line is the entire configuration surface of this tool; CLI
//! arguments are validated and mapped into an [`AppConfig`].

use std::time::Duration;

pub mod cli;

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name of the container whose networks get dug.
    pub container: String,
    /// Indentation width of the rendered report.
    pub indentation: usize,
    /// Worker count for both the resolver and the prober pool.
    pub workers: usize,
    /// Spinner animation tick.
    pub spinner_interval: Duration,
    /// Verbose diagnostics.
    pub debug: bool,
}
