//! Runtime configuration loaded from the environment.

use std::env;

use thiserror::Error;

use kardex_requests::CodeFormat;

pub const CODE_PREFIX_VAR: &str = "KARDEX_CODE_PREFIX";
pub const CODE_WIDTH_VAR: &str = "KARDEX_CODE_WIDTH";
pub const LOG_FILTER_VAR: &str = "KARDEX_LOG_FILTER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KardexConfig {
    /// Leading segment of request codes (`EPP` in `EPP-2024-0001`).
    pub code_prefix: String,
    /// Zero-padding of the sequence segment.
    pub code_width: usize,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for KardexConfig {
    fn default() -> Self {
        Self {
            code_prefix: "EPP".to_string(),
            code_width: 4,
            log_filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("KARDEX_CODE_PREFIX must be 1-16 ASCII alphanumeric characters, got {0:?}")]
    InvalidCodePrefix(String),

    #[error("KARDEX_CODE_WIDTH must be an integer between 1 and 9, got {0:?}")]
    InvalidCodeWidth(String),
}

impl KardexConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let code_prefix = match get(CODE_PREFIX_VAR) {
            Some(prefix) => {
                let valid = prefix.len() <= 16 && prefix.chars().all(|c| c.is_ascii_alphanumeric());
                if !valid {
                    return Err(ConfigError::InvalidCodePrefix(prefix));
                }
                prefix
            }
            None => defaults.code_prefix,
        };

        let code_width = match get(CODE_WIDTH_VAR) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(w) if (1..=9).contains(&w) => w,
                _ => return Err(ConfigError::InvalidCodeWidth(raw)),
            },
            None => defaults.code_width,
        };

        let log_filter = get(LOG_FILTER_VAR).unwrap_or(defaults.log_filter);

        Ok(Self {
            code_prefix,
            code_width,
            log_filter,
        })
    }

    pub fn code_format(&self) -> CodeFormat {
        CodeFormat::new(self.code_prefix.clone(), self.code_width)
    }
}
