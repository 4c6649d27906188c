//! Siren level and alarm debouncing.
//!
//! The displayed level follows every event immediately. Alarm *effects* (a
//! sound, a banner) are rate limited per level so a sustained attack does not
//! re-trigger the siren on every packet.

use chrono::{DateTime, Duration, Utc};

use crate::models::config::AlarmConfig;
use crate::models::siren::SirenLevel;
use crate::models::stats::Bucket;

/// Receiver of alarm effects (audio player, console banner, ...).
///
/// Called outside the engine lock. Implementations must return promptly;
/// errors are logged and otherwise ignored.
pub trait AlarmSink: Send + Sync {
    fn play_alert(&self, level: SirenLevel) -> anyhow::Result<()>;
}

/// One permitted alarm effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmEffect {
    pub level: SirenLevel,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AlarmStateMachine {
    current: SirenLevel,
    last_trigger: [Option<DateTime<Utc>>; SirenLevel::COUNT],
    throttle: [Duration; SirenLevel::COUNT],
}

impl AlarmStateMachine {
    pub fn new(config: &AlarmConfig) -> Self {
        let throttle = [SirenLevel::Safe, SirenLevel::Suspicious, SirenLevel::High]
            .map(|level| seconds_to_duration(config.throttle_for(level)));
        Self {
            current: config.default_mode,
            last_trigger: [None; SirenLevel::COUNT],
            throttle,
        }
    }

    pub fn current(&self) -> SirenLevel {
        self.current
    }

    /// A packet was classified: show its level, alarm if the throttle allows
    pub fn on_event(&mut self, level: SirenLevel, now: DateTime<Utc>) -> Option<AlarmEffect> {
        self.current = level;
        self.try_trigger(level, now)
    }

    /// A second has closed: its most severe label becomes the level
    pub fn on_bucket_frozen(&mut self, bucket: &Bucket, now: DateTime<Utc>) -> Option<AlarmEffect> {
        self.set_level(SirenLevel::from(bucket.severity()), now)
    }

    /// Replace the level. Escalation asks for an effect under the normal
    /// throttle; de-escalation is silent.
    pub fn set_level(&mut self, level: SirenLevel, now: DateTime<Utc>) -> Option<AlarmEffect> {
        let previous = std::mem::replace(&mut self.current, level);
        if level > previous {
            self.try_trigger(level, now)
        } else {
            None
        }
    }

    fn try_trigger(&mut self, level: SirenLevel, now: DateTime<Utc>) -> Option<AlarmEffect> {
        let slot = level.index();
        if let Some(last) = self.last_trigger[slot] {
            if now - last < self.throttle[slot] {
                return None;
            }
        }
        self.last_trigger[slot] = Some(now);
        Some(AlarmEffect { level, at: now })
    }
}

fn seconds_to_duration(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::zero();
    }
    Duration::milliseconds((secs * 1000.0).round().min(i64::MAX as f64 / 2.0) as i64)
}

/// Sink that remembers every effect, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    played: parking_lot::Mutex<Vec<SirenLevel>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn played(&self) -> Vec<SirenLevel> {
        self.played.lock().clone()
    }

    pub fn count(&self, level: SirenLevel) -> usize {
        self.played.lock().iter().filter(|played| **played == level).count()
    }
}

#[cfg(test)]
impl AlarmSink for RecordingSink {
    fn play_alert(&self, level: SirenLevel) -> anyhow::Result<()> {
        self.played.lock().push(level);
        Ok(())
    }
}
