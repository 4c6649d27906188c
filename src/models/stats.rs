use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::packet::{format_clock_time, Label};

/// Packet counts for one whole second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bucket {
    /// Unix second this bucket covers
    pub second: i64,
    pub safe: u64,
    pub suspicious: u64,
    pub malicious: u64,
    pub total: u64,
}

impl Bucket {
    pub fn empty(second: i64) -> Self {
        Self {
            second,
            safe: 0,
            suspicious: 0,
            malicious: 0,
            total: 0,
        }
    }

    pub fn add(&mut self, label: Label) {
        match label {
            Label::Safe => self.safe += 1,
            Label::Suspicious => self.suspicious += 1,
            Label::Malicious => self.malicious += 1,
        }
        self.total += 1;
    }

    /// Most severe label seen in this second (safe when empty)
    pub fn severity(&self) -> Label {
        if self.malicious > 0 {
            Label::Malicious
        } else if self.suspicious > 0 {
            Label::Suspicious
        } else {
            Label::Safe
        }
    }

    pub fn display_time(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.second, 0)
            .map(|ts| format_clock_time(&ts))
            .unwrap_or_default()
    }
}

/// Process-lifetime packet totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningCounters {
    pub total: u64,
    pub safe: u64,
    pub suspicious: u64,
    pub malicious: u64,
}

impl RunningCounters {
    pub fn add(&mut self, label: Label) {
        match label {
            Label::Safe => self.safe += 1,
            Label::Suspicious => self.suspicious += 1,
            Label::Malicious => self.malicious += 1,
        }
        self.total += 1;
    }
}

/// Per-second series laid out as parallel arrays for charting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    /// `HH:MM:SS` display label per bucket
    pub labels: Vec<String>,
    pub total: Vec<u64>,
    pub safe: Vec<u64>,
    pub suspicious: Vec<u64>,
    pub malicious: Vec<u64>,
}

impl<'a> FromIterator<&'a Bucket> for SeriesSnapshot {
    fn from_iter<I: IntoIterator<Item = &'a Bucket>>(iter: I) -> Self {
        let mut series = SeriesSnapshot::default();
        for bucket in iter {
            series.labels.push(bucket.display_time());
            series.total.push(bucket.total);
            series.safe.push(bucket.safe);
            series.suspicious.push(bucket.suspicious);
            series.malicious.push(bucket.malicious);
        }
        series
    }
}

/// Everything `GET /api/stats` returns, taken at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub series: SeriesSnapshot,
    pub counts: RunningCounters,
}
