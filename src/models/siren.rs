use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::packet::Label;

/// Alarm level shown on the dashboard and sounded by the siren
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SirenLevel {
    #[default]
    Safe,
    Suspicious,
    High,
}

impl SirenLevel {
    pub const COUNT: usize = 3;

    /// Unknown modes fall back to safe
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => SirenLevel::High,
            "suspicious" => SirenLevel::Suspicious,
            _ => SirenLevel::Safe,
        }
    }

    /// Position in per-level tables
    pub fn index(&self) -> usize {
        match self {
            SirenLevel::Safe => 0,
            SirenLevel::Suspicious => 1,
            SirenLevel::High => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SirenLevel::Safe => "safe",
            SirenLevel::Suspicious => "suspicious",
            SirenLevel::High => "high",
        }
    }
}

impl fmt::Display for SirenLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Label> for SirenLevel {
    fn from(label: Label) -> Self {
        match label {
            Label::Safe => SirenLevel::Safe,
            Label::Suspicious => SirenLevel::Suspicious,
            Label::Malicious => SirenLevel::High,
        }
    }
}
