use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::controller::Mode;
use crate::feature_extractor::{NormalizationMode, NormalizerConfig};
use crate::finger_bend::{BendRange, DEFAULT_BENT_DEG, DEFAULT_STRAIGHT_DEG};
use crate::gesture_classifier::DEFAULT_K;
use crate::protocol::{FingerEncoding, GestureEncoding, DEFAULT_DIGITAL_THRESHOLD};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Valor inválido para {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuración de ejecución. Todo campo ausente toma su valor por defecto.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MAC del periférico BLE (p. ej. "E3:5A:...")
    pub device: Option<String>,
    pub adapter: String,
    pub send_interval_ms: u64,
    /// Confianza mínima (exclusiva) para transmitir un gesto
    pub confidence_threshold: f32,
    pub k: usize,
    pub normalization: NormalizationMode,
    /// Si se indica, fuerza la inclusión de la muñeca en el vector
    pub include_wrist: Option<bool>,
    pub mode: Mode,
    pub finger_encoding: FingerEncoding,
    pub gesture_encoding: GestureEncoding,
    pub flip: bool,
    pub bend_min_deg: f32,
    pub bend_max_deg: f32,
    pub digital_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            adapter: "hci0".to_string(),
            send_interval_ms: 100,
            confidence_threshold: 0.85,
            k: DEFAULT_K,
            normalization: NormalizationMode::default(),
            include_wrist: None,
            mode: Mode::GestureKnn,
            finger_encoding: FingerEncoding::default(),
            gesture_encoding: GestureEncoding::default(),
            flip: false,
            bend_min_deg: DEFAULT_BENT_DEG,
            bend_max_deg: DEFAULT_STRAIGHT_DEG,
            digital_threshold: DEFAULT_DIGITAL_THRESHOLD,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid {
                field: "confidence_threshold",
                reason: format!("{} fuera de [0, 1]", self.confidence_threshold),
            });
        }
        if self.k == 0 {
            return Err(ConfigError::Invalid {
                field: "k",
                reason: "debe ser al menos 1".to_string(),
            });
        }
        if !(self.bend_min_deg < self.bend_max_deg) {
            return Err(ConfigError::Invalid {
                field: "bend_min_deg",
                reason: format!(
                    "{} debe ser menor que bend_max_deg ({})",
                    self.bend_min_deg, self.bend_max_deg
                ),
            });
        }
        if !(0.0..=100.0).contains(&self.digital_threshold) {
            return Err(ConfigError::Invalid {
                field: "digital_threshold",
                reason: format!("{} fuera de [0, 100]", self.digital_threshold),
            });
        }
        Ok(())
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn normalizer(&self) -> NormalizerConfig {
        let config = NormalizerConfig::for_mode(self.normalization);
        match self.include_wrist {
            Some(include) => config.with_include_wrist(include),
            None => config,
        }
    }

    pub fn bend_range(&self) -> BendRange {
        BendRange {
            bent_deg: self.bend_min_deg,
            straight_deg: self.bend_max_deg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.send_interval(), Duration::from_millis(100));
        assert_eq!(config.normalizer().feature_len(), 40);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_json(
            r#"{
                "device": "E3:5A:12:00:00:01",
                "confidence_threshold": 0.8,
                "normalization": "full",
                "include_wrist": true,
                "mode": "finger_sync",
                "finger_encoding": "digital",
                "gesture_encoding": "g"
            }"#,
        )
        .unwrap();
        assert_eq!(config.device.as_deref(), Some("E3:5A:12:00:00:01"));
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.normalizer().feature_len(), 63);
        assert_eq!(config.mode, Mode::FingerSync);
        assert_eq!(config.finger_encoding, FingerEncoding::Digital);
        assert_eq!(config.gesture_encoding, GestureEncoding::G);
        assert_eq!(config.adapter, "hci0");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_json(r#"{"confidence_threshold": 1.5}"#),
            Err(ConfigError::Invalid { field: "confidence_threshold", .. })
        ));
        assert!(matches!(
            Config::from_json(r#"{"k": 0}"#),
            Err(ConfigError::Invalid { field: "k", .. })
        ));
        assert!(matches!(
            Config::from_json(r#"{"bend_min_deg": 170, "bend_max_deg": 80}"#),
            Err(ConfigError::Invalid { field: "bend_min_deg", .. })
        ));
        assert!(matches!(
            Config::from_json(r#"{"mode": "teleport"}"#),
            Err(ConfigError::JsonError(_))
        ));
    }
}
