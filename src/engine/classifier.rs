use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use crate::engine::model::ModelPipeline;
use crate::models::config::DetectionConfig;
use crate::models::packet::{Label, PacketRecord};

const BASELINE_SCORE: f64 = 0.1;
const BLACKLISTED_PORT_SCORE: f64 = 0.65;
const SYN_FLOOD_SCORE: f64 = 0.9;
const BLACKLISTED_IP_SCORE: f64 = 0.95;

/// Label and confidence produced for one packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: Label,
    pub score: f64,
}

impl Classification {
    /// Raise to at least `label`/`score`; never lowers either
    fn escalate(&mut self, label: Label, score: f64) {
        self.label = self.label.max(label);
        self.score = self.score.max(score);
    }
}

/// Per-source SYN counters, cleared wholesale at a fixed interval.
///
/// This is an epoch counter: every source restarts from zero at the same
/// moment, so a burst that straddles a reset is split across two epochs.
#[derive(Debug)]
pub struct SynFloodTable {
    counts: HashMap<Option<IpAddr>, u32>,
    last_reset: Option<DateTime<Utc>>,
    reset_interval: Duration,
    threshold: u32,
}

impl SynFloodTable {
    pub fn new(threshold: u32, reset_interval: Duration) -> Self {
        Self {
            counts: HashMap::new(),
            last_reset: None,
            reset_interval,
            threshold,
        }
    }

    /// Clear the whole table once the reset interval has elapsed
    pub fn reset_if_needed(&mut self, now: DateTime<Utc>) {
        match self.last_reset {
            None => self.last_reset = Some(now),
            Some(last) if now - last > self.reset_interval => {
                if !self.counts.is_empty() {
                    debug!("Resetting SYN counters for {} sources", self.counts.len());
                }
                self.counts.clear();
                self.last_reset = Some(now);
            }
            Some(_) => {}
        }
    }

    /// Count one SYN-only segment; true once the source is over the threshold
    pub fn observe(&mut self, source: Option<IpAddr>) -> bool {
        let count = self.counts.entry(source).or_insert(0);
        *count = count.saturating_add(1);
        *count > self.threshold
    }

    #[cfg(test)]
    pub fn count(&self, source: Option<IpAddr>) -> u32 {
        self.counts.get(&source).copied().unwrap_or(0)
    }
}

/// Heuristic rules plus an optional statistical override
pub struct Classifier {
    blacklist_ports: HashSet<u16>,
    blacklist_ips: HashSet<IpAddr>,
    syn_table: SynFloodTable,
    model: Option<ModelPipeline>,
    alert_threshold: f64,
    suspicious_threshold: f64,
}

impl Classifier {
    pub fn new(config: &DetectionConfig, model: Option<ModelPipeline>) -> Self {
        let reset_secs = i64::try_from(config.syn_reset_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        Self {
            blacklist_ports: config.blacklist_ports.iter().copied().collect(),
            blacklist_ips: config.blacklist_ips.iter().copied().collect(),
            syn_table: SynFloodTable::new(config.syn_threshold, Duration::seconds(reset_secs)),
            model,
            alert_threshold: config.alert_threshold,
            suspicious_threshold: config.suspicious_threshold,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Classify one packet. Never fails: a model error falls back to the
    /// heuristic verdict.
    pub fn classify(&mut self, packet: &PacketRecord, now: DateTime<Utc>) -> Classification {
        self.syn_table.reset_if_needed(now);
        let heuristic = self.heuristic(packet);

        let model = match &self.model {
            Some(model) => model,
            None => return heuristic,
        };

        match model.probability(packet) {
            Ok(probability) => self.band(probability),
            Err(e) => {
                debug!("Model scoring failed, using heuristic verdict: {}", e);
                heuristic
            }
        }
    }

    fn heuristic(&mut self, packet: &PacketRecord) -> Classification {
        let mut verdict = Classification {
            label: Label::Safe,
            score: BASELINE_SCORE,
        };

        if self.blacklist_ports.contains(&packet.source_port) || self.blacklist_ports.contains(&packet.dest_port) {
            verdict.escalate(Label::Suspicious, BLACKLISTED_PORT_SCORE);
        }

        if packet.is_syn_only() && self.syn_table.observe(packet.source_address) {
            verdict.escalate(Label::Malicious, SYN_FLOOD_SCORE);
        }

        if let Some(source) = packet.source_address {
            if self.blacklist_ips.contains(&source) {
                verdict.escalate(Label::Malicious, BLACKLISTED_IP_SCORE);
            }
        }

        verdict
    }

    /// Map a model probability onto a label
    fn band(&self, probability: f64) -> Classification {
        let label = if probability >= self.alert_threshold {
            Label::Malicious
        } else if probability >= self.suspicious_threshold {
            Label::Suspicious
        } else {
            Label::Safe
        };
        Classification {
            label,
            score: probability,
        }
    }

    #[cfg(test)]
    pub fn syn_count(&self, source: Option<IpAddr>) -> u32 {
        self.syn_table.count(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{FeatureVector, ScoringModel};
    use crate::models::packet::RawPacket;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn tcp(src: &str, dport: u16, flags: Option<&str>) -> PacketRecord {
        let raw = RawPacket {
            src: Some(src.into()),
            dst: Some("172.16.0.10".into()),
            proto: Some("TCP".into()),
            sport: Some(50000),
            dport: Some(dport),
            length: Some(60),
            tcp_flags: flags.map(String::from),
            ..Default::default()
        };
        PacketRecord::from_raw(&raw, at(0))
    }

    struct FixedModel(f64);

    impl ScoringModel for FixedModel {
        fn predict_probability(&self, _features: &FeatureVector) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    struct FailingModel;

    impl ScoringModel for FailingModel {
        fn predict_probability(&self, _features: &FeatureVector) -> anyhow::Result<f64> {
            anyhow::bail!("backend unavailable")
        }
    }

    fn with_model(model: impl ScoringModel + 'static) -> Classifier {
        Classifier::new(
            &DetectionConfig::default(),
            Some(ModelPipeline::new(Box::new(model), None)),
        )
    }

    #[test]
    fn test_baseline_is_safe() {
        let mut classifier = Classifier::new(&DetectionConfig::default(), None);
        let verdict = classifier.classify(&tcp("10.0.0.1", 443, Some("PA")), at(0));
        assert_eq!(verdict, Classification { label: Label::Safe, score: 0.1 });
    }

    #[test]
    fn test_blacklisted_port_is_suspicious() {
        let mut classifier = Classifier::new(&DetectionConfig::default(), None);

        let verdict = classifier.classify(&tcp("10.0.0.1", 3389, None), at(0));
        assert_eq!(verdict, Classification { label: Label::Suspicious, score: 0.65 });

        // Source port counts too
        let mut packet = tcp("10.0.0.1", 443, None);
        packet.source_port = 4444;
        assert_eq!(classifier.classify(&packet, at(0)).label, Label::Suspicious);
    }

    #[test]
    fn test_blacklisted_ip_is_malicious() {
        let config = DetectionConfig {
            blacklist_ips: vec!["203.0.113.7".parse().unwrap()],
            ..Default::default()
        };
        let mut classifier = Classifier::new(&config, None);

        let verdict = classifier.classify(&tcp("203.0.113.7", 23, None), at(0));
        assert_eq!(verdict, Classification { label: Label::Malicious, score: 0.95 });
    }

    #[test]
    fn test_stateless_rules_are_deterministic() {
        let packet = tcp("10.1.1.1", 5900, Some("PA"));
        let first = Classifier::new(&DetectionConfig::default(), None).classify(&packet, at(0));
        let mut classifier = Classifier::new(&DetectionConfig::default(), None);
        for _ in 0..5 {
            assert_eq!(classifier.classify(&packet, at(0)), first);
        }
    }

    #[test]
    fn test_syn_flood_escalates_after_threshold() {
        let mut classifier = Classifier::new(&DetectionConfig::default(), None);
        let syn = tcp("198.51.100.9", 80, Some("S"));

        for i in 1..=100 {
            let verdict = classifier.classify(&syn, at(10));
            assert_eq!(verdict.label, Label::Safe, "packet {} flagged too early", i);
        }
        let verdict = classifier.classify(&syn, at(10));
        assert_eq!(verdict, Classification { label: Label::Malicious, score: 0.9 });
        assert_eq!(classifier.classify(&syn, at(11)).label, Label::Malicious);

        // Other sources are unaffected
        assert_eq!(classifier.classify(&tcp("198.51.100.10", 80, Some("S")), at(11)).label, Label::Safe);
    }

    #[test]
    fn test_syn_ack_is_not_counted() {
        let mut classifier = Classifier::new(&DetectionConfig::default(), None);
        let source = Some("198.51.100.9".parse().unwrap());
        for _ in 0..150 {
            classifier.classify(&tcp("198.51.100.9", 80, Some("SA")), at(0));
        }
        assert_eq!(classifier.syn_count(source), 0);
    }

    #[test]
    fn test_syn_table_resets_after_interval() {
        let mut classifier = Classifier::new(&DetectionConfig::default(), None);
        let syn = tcp("198.51.100.9", 80, Some("S"));
        let source = syn.source_address;

        for _ in 0..101 {
            classifier.classify(&syn, at(100));
        }
        assert_eq!(classifier.syn_count(source), 101);

        // Exactly 30s is still the same epoch
        classifier.classify(&syn, at(130));
        assert_eq!(classifier.syn_count(source), 102);

        let verdict = classifier.classify(&syn, at(131));
        assert_eq!(classifier.syn_count(source), 1);
        assert_eq!(verdict.label, Label::Safe);
    }

    #[test]
    fn test_model_replaces_heuristic() {
        let mut classifier = with_model(FixedModel(0.2));
        // Blacklisted port would be suspicious, the model says otherwise
        let verdict = classifier.classify(&tcp("10.0.0.1", 3389, None), at(0));
        assert_eq!(verdict, Classification { label: Label::Safe, score: 0.2 });

        let mut classifier = with_model(FixedModel(0.7));
        assert_eq!(classifier.classify(&tcp("10.0.0.1", 443, None), at(0)).label, Label::Suspicious);

        let mut classifier = with_model(FixedModel(0.85));
        assert_eq!(classifier.classify(&tcp("10.0.0.1", 443, None), at(0)).label, Label::Malicious);
    }

    #[test]
    fn test_model_failure_falls_back_to_heuristic() {
        let mut classifier = with_model(FailingModel);
        let verdict = classifier.classify(&tcp("10.0.0.1", 3389, None), at(0));
        assert_eq!(verdict, Classification { label: Label::Suspicious, score: 0.65 });
    }

    #[test]
    fn test_non_finite_probability_falls_back_to_heuristic() {
        for probability in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut classifier = with_model(FixedModel(probability));
            let verdict = classifier.classify(&tcp("10.0.0.1", 3389, None), at(0));
            assert_eq!(verdict, Classification { label: Label::Suspicious, score: 0.65 });
        }
    }
}
