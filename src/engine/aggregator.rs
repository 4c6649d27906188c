use chrono::{DateTime, Utc};
use log::trace;

use crate::engine::ring::BoundedRing;
use crate::models::packet::{Label, PacketRecord};
use crate::models::stats::{Bucket, RunningCounters, StatsSnapshot};

/// Recent packets, lifetime totals and a per-second series.
///
/// The series always ends at the most recently observed second and has no
/// gaps: seconds without traffic get an all-zero bucket. Only the last bucket
/// is ever incremented.
#[derive(Debug)]
pub struct WindowedAggregator {
    packets: BoundedRing<PacketRecord>,
    series: BoundedRing<Bucket>,
    counters: RunningCounters,
}

impl WindowedAggregator {
    pub fn new(max_packets: usize, series_window: usize) -> Self {
        Self {
            packets: BoundedRing::new(max_packets),
            series: BoundedRing::new(series_window),
            counters: RunningCounters::default(),
        }
    }

    /// Bring the series up to `now`.
    ///
    /// Idempotent within a second. When the frontier moves, returns the bucket
    /// that immediately precedes the new current one; that bucket is now
    /// frozen. A clock that goes backwards leaves the series untouched.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Option<Bucket> {
        let now_sec = now.timestamp();
        let last = match self.series.back() {
            Some(bucket) => *bucket,
            None => {
                self.series.push(Bucket::empty(now_sec));
                return None;
            }
        };

        if now_sec <= last.second {
            return None;
        }

        // After a long idle gap only the seconds that fit in the window matter
        let window = self.series.capacity() as i64;
        let first_new = (last.second + 1).max(now_sec - window + 1);
        for second in first_new..=now_sec {
            self.series.push(Bucket::empty(second));
        }
        trace!("Series advanced from {} to {}", last.second, now_sec);

        if now_sec - 1 == last.second {
            Some(last)
        } else {
            Some(Bucket::empty(now_sec - 1))
        }
    }

    /// Store a classified packet and count it in the current second
    pub fn record(&mut self, packet: PacketRecord, now: DateTime<Utc>) -> Option<Bucket> {
        let frozen = self.advance(now);

        self.counters.add(packet.label);
        if let Some(current) = self.series.back_mut() {
            current.add(packet.label);
        }
        self.packets.push(packet);

        frozen
    }

    /// Advance to `now` and read series and totals together
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> (StatsSnapshot, Option<Bucket>) {
        let frozen = self.advance(now);
        let snapshot = StatsSnapshot {
            series: self.series.iter().collect(),
            counts: self.counters,
        };
        (snapshot, frozen)
    }

    /// Retained packets, oldest first
    pub fn packets(&self) -> Vec<PacketRecord> {
        self.packets.to_vec()
    }

    pub fn packets_with_label(&self, label: Label) -> Vec<PacketRecord> {
        self.packets
            .iter()
            .filter(|packet| packet.label == label)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub fn counters(&self) -> RunningCounters {
        self.counters
    }

    #[cfg(test)]
    pub fn buckets(&self) -> Vec<Bucket> {
        self.series.to_vec()
    }
}
