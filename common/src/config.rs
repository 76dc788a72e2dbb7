//! Configuration types for logging and execution settings

use tracing::level_filters::LevelFilter;

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level used when `RUST_LOG` is not set
    pub default_level: LevelFilter,
    /// Name of the span wrapping the whole run
    pub trace_identifier: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: LevelFilter::ERROR,
            trace_identifier: "uremap".to_string(),
        }
    }
}
