#![forbid(unsafe_code)]

//! Hub configuration.
//!
//! Every hub carries a [`HarkConfig`]. [`Events::new`](crate::Events::new)
//! uses the defaults; applications that want env-driven behavior parse it
//! once at startup and hand it to
//! [`Events::with_config`](crate::Events::with_config).
//!
//! Environment variables:
//!
//! - `HARK_MAX_TRIGGER_DEPTH` (positive integer)
//! - `HARK_TRACE_DISPATCH` (bool)
//! - `HARK_LOG_UNHANDLED` (bool)
//!
//! Malformed values leave the default in place and are reported as
//! [`ConfigError`] diagnostics rather than failing the parse.

use std::env;

const ENV_MAX_TRIGGER_DEPTH: &str = "HARK_MAX_TRIGGER_DEPTH";
const ENV_TRACE_DISPATCH: &str = "HARK_TRACE_DISPATCH";
const ENV_LOG_UNHANDLED: &str = "HARK_LOG_UNHANDLED";

/// Default nesting limit for re-entrant triggers on one hub.
pub const DEFAULT_MAX_TRIGGER_DEPTH: usize = 64;

/// Behavior knobs for a hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarkConfig {
    /// Maximum nesting of `trigger` calls on one hub. A trigger issued from
    /// a handler at this depth fails with `DepthExceeded`.
    pub max_trigger_depth: usize,
    /// Wrap every dispatch pass in a `debug` span.
    pub trace_dispatch: bool,
    /// Log triggers that found no handlers at `debug` instead of `trace`.
    pub log_unhandled: bool,
}

impl Default for HarkConfig {
    fn default() -> Self {
        Self {
            max_trigger_depth: DEFAULT_MAX_TRIGGER_DEPTH,
            trace_dispatch: false,
            log_unhandled: false,
        }
    }
}

/// Configuration parse result with diagnostics.
#[derive(Debug, Clone)]
pub struct HarkConfigParse {
    pub config: HarkConfig,
    pub errors: Vec<ConfigError>,
}

/// A rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}={value} ({message})")]
pub struct ConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl HarkConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_trigger_depth(mut self, depth: usize) -> Self {
        self.max_trigger_depth = depth;
        self
    }

    #[must_use]
    pub fn with_trace_dispatch(mut self, enabled: bool) -> Self {
        self.trace_dispatch = enabled;
        self
    }

    #[must_use]
    pub fn with_log_unhandled(mut self, enabled: bool) -> Self {
        self.log_unhandled = enabled;
        self
    }

    /// Parse config from environment variables, discarding diagnostics.
    #[must_use]
    pub fn from_env() -> HarkConfig {
        Self::from_env_with_diagnostics().config
    }

    /// Parse config from environment variables and return diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> HarkConfigParse {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Parse config through an arbitrary lookup. Used by `from_env` and by
    /// tests that must not touch the process environment.
    pub fn from_env_with<F>(mut get: F) -> HarkConfigParse
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut config = HarkConfig::default();
        let mut errors = Vec::new();

        if let Some(value) = get(ENV_MAX_TRIGGER_DEPTH) {
            match parse_usize(&value) {
                Some(parsed) if parsed > 0 => config.max_trigger_depth = parsed,
                _ => errors.push(ConfigError::new(
                    "max_trigger_depth",
                    value,
                    "expected positive integer",
                )),
            }
        }

        if let Some(value) = get(ENV_TRACE_DISPATCH) {
            match parse_bool(&value) {
                Some(parsed) => config.trace_dispatch = parsed,
                None => errors.push(ConfigError::new(
                    "trace_dispatch",
                    value,
                    "expected bool (1/0/true/false)",
                )),
            }
        }

        if let Some(value) = get(ENV_LOG_UNHANDLED) {
            match parse_bool(&value) {
                Some(parsed) => config.log_unhandled = parsed,
                None => errors.push(ConfigError::new(
                    "log_unhandled",
                    value,
                    "expected bool (1/0/true/false)",
                )),
            }
        }

        if let Err(mut validation) = config.validate() {
            errors.append(&mut validation);
        }

        HarkConfigParse { config, errors }
    }

    /// Validate constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if self.max_trigger_depth == 0 {
            errors.push(ConfigError::new(
                "max_trigger_depth",
                "0",
                "must be at least 1",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Repair values that `validate` rejects: a zero trigger depth becomes 1,
    /// which still allows top-level triggers but no nesting.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_trigger_depth = self.max_trigger_depth.max(1);
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse().ok()
}
