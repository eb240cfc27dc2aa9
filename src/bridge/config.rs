//! Engine configuration

/// Environment variable overriding `EngineConfig::error_marker`.
pub const ERROR_MARKER_ENV: &str = "TETHER_ERROR_MARKER";
/// Environment variable overriding `EngineConfig::max_arguments`.
pub const MAX_ARGUMENTS_ENV: &str = "TETHER_MAX_ARGUMENTS";

/// Configuration for an `Engine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Prefix of the String result a failed callback returns.
    pub error_marker: String,
    /// Largest argument count a callback accepts; larger calls are treated
    /// as malformed.
    pub max_arguments: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            error_marker: "Error: ".to_string(),
            max_arguments: 256,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TETHER_ERROR_MARKER` / `TETHER_MAX_ARGUMENTS`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(marker) = lookup(ERROR_MARKER_ENV) {
            config.error_marker = marker;
        }
        if let Some(max) = lookup(MAX_ARGUMENTS_ENV).and_then(|s| s.trim().parse().ok()) {
            config.max_arguments = max;
        }
        config
    }

    pub fn with_error_marker(mut self, marker: impl Into<String>) -> Self {
        self.error_marker = marker.into();
        self
    }

    pub fn with_max_arguments(mut self, max: usize) -> Self {
        self.max_arguments = max;
        self
    }
}
