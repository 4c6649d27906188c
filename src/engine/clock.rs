use chrono::{DateTime, Utc};

/// Source of "now" for the engine
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for deterministic tests
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn at_secs(secs: f64) -> Self {
        Self {
            now: parking_lot::Mutex::new(Self::instant(secs)),
        }
    }

    pub fn set_secs(&self, secs: f64) {
        *self.now.lock() = Self::instant(secs);
    }

    pub fn advance_secs(&self, secs: f64) {
        let mut now = self.now.lock();
        *now += chrono::Duration::milliseconds((secs * 1000.0).round() as i64);
    }

    fn instant(secs: f64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis((secs * 1000.0).round() as i64)
            .expect("test timestamp in range")
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
