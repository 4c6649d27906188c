use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::models::siren::SirenLevel;
use crate::utils::error::{AppError, AppResult};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the REST API binds to
    pub bind: String,

    /// Port for the REST API server
    pub port: u16,

    /// Bounded container sizes
    pub retention: RetentionConfig,

    /// Classifier settings
    pub detection: DetectionConfig,

    /// Siren state machine and sink settings
    pub alarm: AlarmConfig,

    /// Capture settings, reported to external capture producers
    pub capture: CaptureConfig,

    /// Geolocation enrichment
    pub geo: GeoConfig,
}

/// Sizes of the in-memory rings and series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Packets kept for `GET /api/packets`
    pub max_packets: usize,

    /// Alerts kept for `GET /api/alerts`
    pub max_alerts: usize,

    /// Seconds of per-second buckets kept for the chart
    pub series_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Model probability at or above which a packet is malicious
    pub alert_threshold: f64,

    /// Model probability at or above which a packet is suspicious
    pub suspicious_threshold: f64,

    /// SYN-only segments per source tolerated within one reset window
    pub syn_threshold: u32,

    /// Seconds between full resets of the SYN counter table
    pub syn_reset_secs: u64,

    /// Ports that mark traffic as suspicious (telnet, rdp, vnc, ...)
    pub blacklist_ports: Vec<u16>,

    /// Source addresses that mark traffic as malicious
    pub blacklist_ips: Vec<IpAddr>,

    /// Logistic model weights (JSON)
    pub model_path: Option<PathBuf>,

    /// Standard scaler for model features (JSON)
    pub scaler_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Level displayed before any traffic arrives
    pub default_mode: SirenLevel,

    /// Minimum seconds between two high alarms
    pub throttle_high: f64,

    /// Minimum seconds between two suspicious alarms
    pub throttle_suspicious: f64,

    /// Minimum seconds between two safe (all clear) signals
    pub throttle_safe: f64,

    /// Print coloured siren lines to the terminal
    pub console: bool,

    /// External audio player command, e.g. "mpg123 -q"
    pub player: Option<String>,

    /// Sound played for the high level
    pub high_sound: Option<PathBuf>,

    /// Sound played for the suspicious level
    pub suspicious_sound: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Network interface name
    pub interface: Option<String>,

    /// BPF filter expression
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    pub enabled: bool,

    /// Lookup URL prefix; the IP address is appended
    pub endpoint: String,

    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
            retention: RetentionConfig::default(),
            detection: DetectionConfig::default(),
            alarm: AlarmConfig::default(),
            capture: CaptureConfig {
                interface: None,
                filter: Some("ip".to_string()),
            },
            geo: GeoConfig::default(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_packets: 1200,
            max_alerts: 500,
            series_window: 180,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 0.85,
            suspicious_threshold: 0.6,
            syn_threshold: 100,
            syn_reset_secs: 30,
            blacklist_ports: vec![23, 2323, 3389, 4444, 5900],
            blacklist_ips: Vec::new(),
            model_path: None,
            scaler_path: None,
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            default_mode: SirenLevel::Safe,
            throttle_high: 3.0,
            throttle_suspicious: 2.0,
            throttle_safe: 1.0,
            console: true,
            player: None,
            high_sound: None,
            suspicious_sound: None,
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://ip-api.com/json/".to_string(),
            timeout_secs: 3,
        }
    }
}

impl AlarmConfig {
    /// Throttle interval in seconds for a level
    pub fn throttle_for(&self, level: SirenLevel) -> f64 {
        match level {
            SirenLevel::High => self.throttle_high,
            SirenLevel::Suspicious => self.throttle_suspicious,
            SirenLevel::Safe => self.throttle_safe,
        }
    }

    /// Sound file for a level, if one is configured
    pub fn sound_for(&self, level: SirenLevel) -> Option<&PathBuf> {
        match level {
            SirenLevel::High => self.high_sound.as_ref(),
            SirenLevel::Suspicious => self.suspicious_sound.as_ref(),
            SirenLevel::Safe => None,
        }
    }
}

impl AppConfig {
    /// Reject settings the engine cannot honour
    pub fn validate(&self) -> AppResult<()> {
        let retention = &self.retention;
        if retention.max_packets == 0 || retention.max_alerts == 0 || retention.series_window == 0 {
            return Err(AppError::ConfigError(
                "packet, alert and series capacities must be at least 1".to_string(),
            ));
        }

        let detection = &self.detection;
        for (name, value) in [
            ("alert threshold", detection.alert_threshold),
            ("suspicious threshold", detection.suspicious_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::ConfigError(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if detection.suspicious_threshold > detection.alert_threshold {
            return Err(AppError::ConfigError(format!(
                "suspicious threshold {} is above alert threshold {}",
                detection.suspicious_threshold, detection.alert_threshold
            )));
        }

        for level in [SirenLevel::Safe, SirenLevel::Suspicious, SirenLevel::High] {
            let throttle = self.alarm.throttle_for(level);
            if !throttle.is_finite() || throttle < 0.0 {
                return Err(AppError::ConfigError(format!(
                    "throttle for {} must be a non-negative number of seconds, got {}",
                    level, throttle
                )));
            }
        }

        Ok(())
    }
}
