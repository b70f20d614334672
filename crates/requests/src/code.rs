//! Human-readable sequential request codes (`EPP-2024-0007`).
//!
//! The sequence is derived as "requests already created this year + 1". Two
//! concurrent creations for the same company can observe the same count and
//! therefore receive the same code; uniqueness is not guaranteed here.

use serde::{Deserialize, Serialize};

use kardex_core::ValueObject;

/// A formatted request code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestCode(String);

impl RequestCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing sequence number, if the code ends in digits.
    pub fn sequence(&self) -> Option<u64> {
        self.0.rsplit('-').next()?.parse().ok()
    }
}

impl ValueObject for RequestCode {}

impl core::fmt::Display for RequestCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prefix and zero-padding used when formatting codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFormat {
    prefix: String,
    width: usize,
}

impl Default for CodeFormat {
    fn default() -> Self {
        Self {
            prefix: "EPP".to_string(),
            width: 4,
        }
    }
}

impl CodeFormat {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Code for the next request of a company, given how many it already has this year.
    pub fn code_for(&self, year: i32, created_this_year: u64) -> RequestCode {
        RequestCode(format!(
            "{}-{}-{:0width$}",
            self.prefix,
            year,
            created_this_year + 1,
            width = self.width
        ))
    }
}
