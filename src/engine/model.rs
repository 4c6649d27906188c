//! Optional statistical scoring.
//!
//! A model turns a small feature vector into a probability that the packet is
//! malicious. It is loaded once at startup; when no model file is configured or
//! the file cannot be read, the classifier simply runs without one.

use anyhow::{anyhow, bail};
use log::{info, warn};
use serde::Deserialize;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::models::packet::PacketRecord;
use crate::utils::error::{AppError, AppResult};

/// Number of features fed to a model
pub const FEATURE_COUNT: usize = 4;

/// `[length, destination port, source port, protocol ordinal]`
pub type FeatureVector = [f64; FEATURE_COUNT];

pub fn extract_features(packet: &PacketRecord) -> FeatureVector {
    [
        packet.length_bytes as f64,
        f64::from(packet.dest_port),
        f64::from(packet.source_port),
        f64::from(packet.protocol.ordinal()),
    ]
}

/// Anything that can score a feature vector.
///
/// Implementations must be fast local computations; they run while the
/// engine lock is held.
pub trait ScoringModel: Send + Sync {
    /// Probability in [0, 1] that the packet is malicious
    fn predict_probability(&self, features: &FeatureVector) -> anyhow::Result<f64>;
}

/// Logistic regression over the raw (or scaled) feature vector
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    pub weights: FeatureVector,
    pub bias: f64,
}

impl LogisticModel {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let text = fs::read_to_string(path)?;
        let model: LogisticModel = serde_json::from_str(&text)?;
        if model.weights.iter().chain(std::iter::once(&model.bias)).any(|w| !w.is_finite()) {
            return Err(AppError::ModelError(format!("non-finite weight in {}", path.display())));
        }
        Ok(model)
    }
}

impl ScoringModel for LogisticModel {
    fn predict_probability(&self, features: &FeatureVector) -> anyhow::Result<f64> {
        let z = self
            .weights
            .iter()
            .zip(features.iter())
            .fold(self.bias, |acc, (w, x)| acc + w * x);
        let probability = 1.0 / (1.0 + (-z).exp());
        if !probability.is_finite() {
            bail!("model produced a non-finite probability");
        }
        Ok(probability)
    }
}

/// Per-feature standardization: `(x - mean) / scale`
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: FeatureVector,
    pub scale: FeatureVector,
}

impl StandardScaler {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn transform(&self, features: &FeatureVector) -> anyhow::Result<FeatureVector> {
        let mut scaled = [0.0; FEATURE_COUNT];
        for (i, value) in features.iter().enumerate() {
            let scale = self.scale[i];
            if scale == 0.0 || !scale.is_finite() {
                return Err(anyhow!("scaler has an unusable scale for feature {}", i));
            }
            scaled[i] = (value - self.mean[i]) / scale;
        }
        Ok(scaled)
    }
}

/// A model plus its optional scaler, as used by the classifier
pub struct ModelPipeline {
    model: Box<dyn ScoringModel>,
    scaler: Option<StandardScaler>,
}

impl ModelPipeline {
    pub fn new(model: Box<dyn ScoringModel>, scaler: Option<StandardScaler>) -> Self {
        Self { model, scaler }
    }

    /// Load the model (and scaler) configured on disk.
    ///
    /// Returns `None` when no model path is set or loading fails; a scaler
    /// that fails to load only disables scaling.
    pub fn load(model_path: Option<&Path>, scaler_path: Option<&Path>) -> Option<Self> {
        let model_path = model_path?;
        let model = match LogisticModel::from_file(model_path) {
            Ok(model) => model,
            Err(e) => {
                warn!("Statistical model unavailable ({}): {}", model_path.display(), e);
                return None;
            }
        };

        let scaler = scaler_path.and_then(|path| match StandardScaler::from_file(path) {
            Ok(scaler) => Some(scaler),
            Err(e) => {
                warn!("Feature scaler unavailable ({}): {}", path.display(), e);
                None
            }
        });

        info!(
            "Loaded statistical model from {} (scaler: {})",
            model_path.display(),
            if scaler.is_some() { "yes" } else { "no" }
        );
        Some(Self::new(Box::new(model), scaler))
    }

    /// Score a packet; any error or panic inside the model becomes `Err`
    pub fn probability(&self, packet: &PacketRecord) -> anyhow::Result<f64> {
        let features = extract_features(packet);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let features = match &self.scaler {
                Some(scaler) => scaler.transform(&features)?,
                None => features,
            };
            self.model.predict_probability(&features)
        }));

        match outcome {
            Ok(Ok(p)) if !p.is_finite() => Err(anyhow!("model produced a non-finite probability")),
            Ok(result) => result.map(|p| p.clamp(0.0, 1.0)),
            Err(_) => Err(anyhow!("model panicked during inference")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::packet::RawPacket;
    use chrono::Utc;
    use std::io::Write;

    fn packet(length: u64, dport: u16) -> PacketRecord {
        let raw = RawPacket {
            proto: Some("UDP".into()),
            sport: Some(5353),
            dport: Some(dport),
            length: Some(length),
            ..Default::default()
        };
        PacketRecord::from_raw(&raw, Utc::now())
    }

    fn json_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    struct PanickingModel;

    impl ScoringModel for PanickingModel {
        fn predict_probability(&self, _features: &FeatureVector) -> anyhow::Result<f64> {
            panic!("corrupt model state");
        }
    }

    #[test]
    fn test_feature_layout() {
        assert_eq!(extract_features(&packet(1500, 53)), [1500.0, 53.0, 5353.0, 1.0]);
    }

    #[test]
    fn test_logistic_probability() {
        let model = LogisticModel {
            weights: [0.0; FEATURE_COUNT],
            bias: 0.0,
        };
        let p = model.predict_probability(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_load_from_files() {
        let model_file = json_file(r#"{"weights": [0.0, 0.0, 0.0, 0.0], "bias": 3.0}"#);
        let scaler_file = json_file(r#"{"mean": [0, 0, 0, 0], "scale": [1, 1, 1, 1]}"#);

        let pipeline = ModelPipeline::load(Some(model_file.path()), Some(scaler_file.path())).unwrap();
        let p = pipeline.probability(&packet(100, 80)).unwrap();
        assert!(p > 0.95 && p < 1.0);
    }

    #[test]
    fn test_missing_or_malformed_model_is_none() {
        assert!(ModelPipeline::load(None, None).is_none());
        assert!(ModelPipeline::load(Some(Path::new("/nonexistent/model.json")), None).is_none());

        let broken = json_file("{ not json");
        assert!(ModelPipeline::load(Some(broken.path()), None).is_none());
    }

    #[test]
    fn test_zero_scale_is_a_failure() {
        let scaler = StandardScaler {
            mean: [0.0; FEATURE_COUNT],
            scale: [1.0, 0.0, 1.0, 1.0],
        };
        let pipeline = ModelPipeline::new(
            Box::new(LogisticModel {
                weights: [0.0; FEATURE_COUNT],
                bias: 0.0,
            }),
            Some(scaler),
        );
        assert!(pipeline.probability(&packet(64, 443)).is_err());
    }

    #[test]
    fn test_panicking_model_is_contained() {
        let pipeline = ModelPipeline::new(Box::new(PanickingModel), None);
        assert!(pipeline.probability(&packet(64, 443)).is_err());
    }
}
