use log::{debug, info, log, warn, Level};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::engine::aggregator::WindowedAggregator;
use crate::engine::alarm::{AlarmEffect, AlarmSink, AlarmStateMachine};
use crate::engine::alert_log::AlertLog;
use crate::engine::classifier::Classifier;
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::model::ModelPipeline;
use crate::models::config::AppConfig;
use crate::models::packet::{format_clock_time, AlertEntry, Label, PacketRecord, RawPacket};
use crate::models::siren::SirenLevel;
use crate::models::stats::StatsSnapshot;

/// All mutable detection state; only ever touched under the engine lock
struct EngineState {
    classifier: Classifier,
    aggregator: WindowedAggregator,
    alerts: AlertLog,
    alarm: AlarmStateMachine,
}

impl EngineState {
    fn process(&mut self, raw: RawPacket, now: DateTime<Utc>, effects: &mut Vec<AlarmEffect>) -> PacketRecord {
        let asserted = raw.label.as_deref().map(Label::parse_lenient);
        let mut record = PacketRecord::from_raw(&raw, now);

        let verdict = self.classifier.classify(&record, now);
        record.label = verdict.label;
        record.score = verdict.score;
        // An asserted label is a floor; when it is at least as severe as the
        // verdict it also supplies the score
        if let Some(asserted) = asserted {
            if asserted >= record.label {
                record.label = asserted;
                record.score = asserted.nominal_score();
            }
        }

        if let Some(frozen) = self.aggregator.record(record.clone(), now) {
            effects.extend(self.alarm.on_bucket_frozen(&frozen, now));
        }

        if self.alerts.record_if_alertable(&record) {
            debug!(
                "{} packet from {} (score {:.2})",
                record.label,
                record
                    .source_address
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                record.score
            );
        }

        effects.extend(self.alarm.on_event(SirenLevel::from(record.label), now));
        record
    }

    fn advance(&mut self, now: DateTime<Utc>, effects: &mut Vec<AlarmEffect>) -> StatsSnapshot {
        let (snapshot, frozen) = self.aggregator.snapshot(now);
        if let Some(frozen) = frozen {
            effects.extend(self.alarm.on_bucket_frozen(&frozen, now));
        }
        snapshot
    }
}

/// The streaming detection engine.
///
/// Owns the classifier, packet ring, series, alert log and siren state behind a
/// single lock, so every reader sees the state as of one complete `ingest`.
/// Shared between producers and HTTP handlers as `Arc<Engine>`.
pub struct Engine {
    state: Mutex<EngineState>,
    sink: Option<Arc<dyn AlarmSink>>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(config: &AppConfig, model: Option<ModelPipeline>, sink: Option<Arc<dyn AlarmSink>>) -> Self {
        Self::with_clock(config, model, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &AppConfig,
        model: Option<ModelPipeline>,
        sink: Option<Arc<dyn AlarmSink>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut aggregator = WindowedAggregator::new(config.retention.max_packets, config.retention.series_window);
        aggregator.advance(clock.now());

        let classifier = Classifier::new(&config.detection, model);
        info!(
            "Engine ready: {} packets, {} alerts, {}s series, model {}",
            config.retention.max_packets,
            config.retention.max_alerts,
            config.retention.series_window,
            if classifier.has_model() { "loaded" } else { "not loaded" }
        );

        Self {
            state: Mutex::new(EngineState {
                classifier,
                aggregator,
                alerts: AlertLog::new(config.retention.max_alerts),
                alarm: AlarmStateMachine::new(&config.alarm),
            }),
            sink,
            clock,
        }
    }

    /// Normalize, classify, aggregate, log and alarm on one packet.
    ///
    /// This is the only way packets enter the engine.
    pub fn ingest(&self, raw: RawPacket) -> PacketRecord {
        let mut effects = Vec::new();
        let record = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            state.process(raw, now, &mut effects)
        };
        self.dispatch(effects);
        record
    }

    /// Series and totals as of now; moves the series frontier even when idle
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let mut effects = Vec::new();
        let snapshot = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            state.advance(now, &mut effects)
        };
        self.dispatch(effects);
        snapshot
    }

    /// Retained packets, oldest first
    pub fn packets(&self) -> Vec<PacketRecord> {
        self.state.lock().aggregator.packets()
    }

    pub fn packets_with_label(&self, label: Label) -> Vec<PacketRecord> {
        self.state.lock().aggregator.packets_with_label(label)
    }

    pub fn alerts(&self) -> Vec<AlertEntry> {
        self.state.lock().alerts.snapshot()
    }

    pub fn siren_level(&self) -> SirenLevel {
        self.state.lock().alarm.current()
    }

    /// Force the displayed level (operator override)
    pub fn set_siren_level(&self, level: SirenLevel) -> SirenLevel {
        let effect = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            state.alarm.set_level(level, now)
        };
        info!("Siren level set to {}", level);
        self.dispatch(effect.into_iter().collect());
        level
    }

    fn dispatch(&self, effects: Vec<AlarmEffect>) {
        for effect in effects {
            log!(
                effect_log_level(effect.level),
                "Alarm: {} at {}",
                effect.level,
                format_clock_time(&effect.at)
            );
            let sink = match &self.sink {
                Some(sink) => sink,
                None => continue,
            };
            match panic::catch_unwind(AssertUnwindSafe(|| sink.play_alert(effect.level))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Alarm sink failed for {}: {}", effect.level, e),
                Err(_) => warn!("Alarm sink panicked for {}", effect.level),
            }
        }
    }
}

/// Log level for an alarm effect; the once-a-second all-clear stays at debug
fn effect_log_level(level: SirenLevel) -> Level {
    match level {
        SirenLevel::Safe => Level::Debug,
        SirenLevel::Suspicious | SirenLevel::High => Level::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::alarm::RecordingSink;
    use crate::engine::clock::ManualClock;
    use std::thread;

    struct Harness {
        engine: Arc<Engine>,
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
    }

    fn harness(config: AppConfig) -> Harness {
        let clock = Arc::new(ManualClock::at_secs(1_000.0));
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(Engine::with_clock(
            &config,
            None,
            Some(sink.clone() as Arc<dyn AlarmSink>),
            clock.clone() as Arc<dyn Clock>,
        ));
        Harness { engine, clock, sink }
    }

    fn quiet_packet(label: &str) -> RawPacket {
        RawPacket {
            src: Some("10.0.3.4".into()),
            dst: Some("172.16.1.1".into()),
            proto: Some("UDP".into()),
            sport: Some(40000),
            dport: Some(53),
            length: Some(80),
            label: Some(label.into()),
            ..Default::default()
        }
    }

    struct FailingSink;

    impl AlarmSink for FailingSink {
        fn play_alert(&self, _level: SirenLevel) -> anyhow::Result<()> {
            anyhow::bail!("no audio device")
        }
    }

    struct PanickingSink;

    impl AlarmSink for PanickingSink {
        fn play_alert(&self, _level: SirenLevel) -> anyhow::Result<()> {
            panic!("mixer crashed")
        }
    }

    #[test]
    fn test_end_to_end_sequence() {
        let h = harness(AppConfig::default());
        h.engine.ingest(quiet_packet("malicious"));
        h.engine.ingest(quiet_packet("safe"));
        h.engine.ingest(quiet_packet("suspicious"));

        let stats = h.engine.stats_snapshot();
        assert_eq!(stats.counts.total, 3);
        assert_eq!(stats.counts.safe, 1);
        assert_eq!(stats.counts.suspicious, 1);
        assert_eq!(stats.counts.malicious, 1);

        let alerts: Vec<Label> = h.engine.alerts().iter().map(|a| a.label).collect();
        assert_eq!(alerts, vec![Label::Malicious, Label::Suspicious]);

        assert_eq!(h.engine.siren_level(), SirenLevel::Suspicious);
        assert_eq!(h.sink.count(SirenLevel::High), 1);
        assert_eq!(h.sink.count(SirenLevel::Suspicious), 1);
    }

    #[test]
    fn test_asserted_label_is_a_floor() {
        let h = harness(AppConfig::default());

        // Blacklisted port makes a "safe" injection suspicious
        let mut raw = quiet_packet("safe");
        raw.dport = Some(3389);
        let record = h.engine.ingest(raw);
        assert_eq!(record.label, Label::Suspicious);
        assert_eq!(record.score, 0.65);

        let record = h.engine.ingest(quiet_packet("malicious"));
        assert_eq!(record.label, Label::Malicious);
        assert_eq!(record.score, 0.93);
    }

    #[test]
    fn test_asserted_label_supplies_nominal_score() {
        let h = harness(AppConfig::default());

        let record = h.engine.ingest(quiet_packet("safe"));
        assert_eq!(record.label, Label::Safe);
        assert_eq!(record.score, 0.01);

        // A tie with the port rule still reports the asserted score
        let mut raw = quiet_packet("suspicious");
        raw.dport = Some(3389);
        let record = h.engine.ingest(raw);
        assert_eq!(record.label, Label::Suspicious);
        assert_eq!(record.score, 0.62);
    }

    #[test]
    fn test_unlabelled_packet_uses_classifier() {
        let h = harness(AppConfig::default());
        let mut raw = quiet_packet("safe");
        raw.label = None;
        let record = h.engine.ingest(raw);
        assert_eq!(record.label, Label::Safe);
        assert_eq!(record.score, 0.1);

        let record = h.engine.ingest(RawPacket::with_label("no-such-label"));
        assert_eq!(record.label, Label::Safe);
    }

    #[test]
    fn test_syn_flood_through_pipeline() {
        let h = harness(AppConfig::default());
        let syn = RawPacket {
            src: Some("198.51.100.20".into()),
            proto: Some("TCP".into()),
            dport: Some(80),
            tcp_flags: Some("S".into()),
            ..Default::default()
        };

        for _ in 0..100 {
            assert_eq!(h.engine.ingest(syn.clone()).label, Label::Safe);
        }
        assert_eq!(h.engine.ingest(syn.clone()).label, Label::Malicious);

        h.clock.advance_secs(31.0);
        assert_eq!(h.engine.ingest(syn).label, Label::Safe);
    }

    #[test]
    fn test_throttle_through_pipeline() {
        let h = harness(AppConfig::default());
        h.engine.ingest(quiet_packet("malicious"));
        h.clock.advance_secs(1.0);
        h.engine.ingest(quiet_packet("malicious"));
        assert_eq!(h.sink.count(SirenLevel::High), 1);
        assert_eq!(h.engine.siren_level(), SirenLevel::High);

        let h = harness(AppConfig::default());
        h.engine.ingest(quiet_packet("malicious"));
        h.clock.advance_secs(4.0);
        h.engine.ingest(quiet_packet("malicious"));
        assert_eq!(h.sink.count(SirenLevel::High), 2);
    }

    #[test]
    fn test_safe_bucket_deescalates_on_roll() {
        let h = harness(AppConfig::default());
        h.clock.set_secs(2_000.2);
        h.engine.ingest(quiet_packet("safe"));
        h.engine.ingest(quiet_packet("safe"));

        h.clock.set_secs(2_000.6);
        h.engine.set_siren_level(SirenLevel::Suspicious);
        assert_eq!(h.engine.siren_level(), SirenLevel::Suspicious);

        h.clock.set_secs(2_001.1);
        h.engine.stats_snapshot();
        assert_eq!(h.engine.siren_level(), SirenLevel::Safe);
    }

    #[test]
    fn test_malicious_bucket_escalates_on_roll() {
        let h = harness(AppConfig::default());
        h.clock.set_secs(3_000.0);
        h.engine.ingest(quiet_packet("malicious"));
        h.engine.ingest(quiet_packet("safe"));
        assert_eq!(h.engine.siren_level(), SirenLevel::Safe);

        h.clock.set_secs(3_001.0);
        h.engine.stats_snapshot();
        assert_eq!(h.engine.siren_level(), SirenLevel::High);

        // Only the immediately preceding second counts
        h.clock.set_secs(3_005.0);
        h.engine.stats_snapshot();
        assert_eq!(h.engine.siren_level(), SirenLevel::Safe);
    }

    #[test]
    fn test_idle_reader_sees_frontier_move() {
        let h = harness(AppConfig::default());
        let before = h.engine.stats_snapshot();
        h.clock.advance_secs(3.0);
        let after = h.engine.stats_snapshot();

        assert_eq!(after.series.labels.len(), before.series.labels.len() + 3);
        assert!(after.series.total.iter().all(|count| *count == 0));
    }

    #[test]
    fn test_rings_stay_bounded() {
        let mut config = AppConfig::default();
        config.retention.max_packets = 5;
        config.retention.max_alerts = 3;
        let h = harness(config);

        for i in 0..40 {
            let label = ["safe", "suspicious", "malicious"][i % 3];
            h.engine.ingest(quiet_packet(label));
            assert!(h.engine.packets().len() <= 5);
            assert!(h.engine.alerts().len() <= 3);
            h.clock.advance_secs(0.3);
        }

        let stats = h.engine.stats_snapshot();
        assert_eq!(stats.counts.total, 40);
        assert_eq!(stats.counts.total, stats.counts.safe + stats.counts.suspicious + stats.counts.malicious);
    }

    #[test]
    fn test_filter_packets_by_label() {
        let h = harness(AppConfig::default());
        h.engine.ingest(quiet_packet("safe"));
        h.engine.ingest(quiet_packet("malicious"));
        assert_eq!(h.engine.packets_with_label(Label::Malicious).len(), 1);
        assert_eq!(h.engine.packets().len(), 2);
    }

    #[test]
    fn test_safe_effects_log_below_info() {
        assert_eq!(effect_log_level(SirenLevel::Safe), Level::Debug);
        assert_eq!(effect_log_level(SirenLevel::Suspicious), Level::Info);
        assert_eq!(effect_log_level(SirenLevel::High), Level::Info);
    }

    #[test]
    fn test_sink_failures_are_swallowed() {
        let sinks: [Arc<dyn AlarmSink>; 2] = [Arc::new(FailingSink), Arc::new(PanickingSink)];
        for sink in sinks {
            let clock = Arc::new(ManualClock::at_secs(0.0));
            let engine = Engine::with_clock(&AppConfig::default(), None, Some(sink), clock);
            let record = engine.ingest(quiet_packet("malicious"));
            assert_eq!(record.label, Label::Malicious);
            assert_eq!(engine.siren_level(), SirenLevel::High);
        }
    }

    #[test]
    fn test_concurrent_producers_keep_counters_consistent() {
        let h = harness(AppConfig::default());
        let producers: Vec<_> = (0..4)
            .map(|n| {
                let engine = h.engine.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        let label = if (i + n) % 5 == 0 { "malicious" } else { "safe" };
                        engine.ingest(quiet_packet(label));
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let stats = h.engine.stats_snapshot();
            assert_eq!(stats.counts.total, stats.counts.safe + stats.counts.suspicious + stats.counts.malicious);
        }
        for producer in producers {
            producer.join().unwrap();
        }

        let stats = h.engine.stats_snapshot();
        assert_eq!(stats.counts.total, 1000);
        assert_eq!(stats.counts.malicious, 200);
        assert_eq!(h.engine.packets().len(), 1000);
    }
}
