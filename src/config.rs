//! Configuración de quirocontrol.
//!
//! Todos los campos tienen valor por defecto: un archivo ausente equivale a
//! `Config::default()` y un archivo parcial solo sobrescribe lo que declara.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::gesture_classifier::TrainingParams;
use crate::types::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DEBOUNCE_SECS};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No se pudo leer la configuración {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuración {path:?} inválida: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Valor inválido para {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_dataset_path")]
    pub dataset: PathBuf,
    #[serde(default = "default_model_path")]
    pub model: PathBuf,
    #[serde(default = "default_commands_path")]
    pub commands: PathBuf,
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("dataset/gesture_data.json")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("model/gesture_model.json")
}

fn default_commands_path() -> PathBuf {
    PathBuf::from("config/gesture_commands.json")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset_path(),
            model: default_model_path(),
            commands: default_commands_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Probabilidad mínima (exclusiva) para aceptar una predicción
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Segundos antes de que el mismo gesto pueda volver a disparar
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: f32,
}

fn default_confidence_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_debounce_secs() -> f32 {
    DEFAULT_DEBOUNCE_SECS
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            debounce_secs: default_debounce_secs(),
        }
    }
}

impl RecognitionConfig {
    /// Valores fuera de rango se recortan; `validate` ya los rechaza antes.
    pub fn debounce_window(&self) -> Duration {
        secs_to_duration(self.debounce_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Espera máxima por un comando de shell antes de dejarlo en segundo plano
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: f32,
    #[serde(default = "default_key_press_delay")]
    pub key_press_delay_ms: u64,
}

fn default_shell_timeout() -> f32 {
    2.0
}

fn default_key_press_delay() -> u64 {
    10
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout(),
            key_press_delay_ms: default_key_press_delay(),
        }
    }
}

impl ActionsConfig {
    pub fn shell_timeout(&self) -> Duration {
        secs_to_duration(self.shell_timeout_secs)
    }

    pub fn key_press_delay(&self) -> Duration {
        Duration::from_millis(self.key_press_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// Manos a recoger por cada `collect`
    #[serde(default = "default_samples_per_gesture")]
    pub samples_per_gesture: usize,
}

fn default_epochs() -> usize {
    20
}

fn default_batch_size() -> usize {
    16
}

fn default_learning_rate() -> f32 {
    0.001
}

fn default_samples_per_gesture() -> usize {
    1000
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            samples_per_gesture: default_samples_per_gesture(),
        }
    }
}

impl TrainingConfig {
    pub fn params(&self) -> TrainingParams {
        TrainingParams {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
        }
    }
}

impl Config {
    /// Carga la configuración desde un archivo TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Como `from_file`, pero un archivo inexistente da la configuración por defecto.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.recognition.confidence_threshold;
        if !(0.0..1.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                field: "recognition.confidence_threshold",
                reason: format!("{} no está en [0, 1)", threshold),
            });
        }
        check_secs("recognition.debounce_secs", self.recognition.debounce_secs)?;
        check_secs("actions.shell_timeout_secs", self.actions.shell_timeout_secs)?;
        if self.training.epochs == 0 {
            return Err(ConfigError::Invalid {
                field: "training.epochs",
                reason: "debe ser mayor que 0".to_string(),
            });
        }
        if self.training.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "training.batch_size",
                reason: "debe ser mayor que 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Límite superior para cualquier duración configurable (un día)
pub const MAX_DURATION_SECS: f32 = 86_400.0;

fn check_secs(field: &'static str, value: f32) -> Result<(), ConfigError> {
    let valid = (0.0..=MAX_DURATION_SECS).contains(&value)
        && Duration::try_from_secs_f32(value).is_ok();
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!(
                "{} no es un número de segundos válido (0..={})",
                value, MAX_DURATION_SECS
            ),
        })
    }
}

fn secs_to_duration(value: f32) -> Duration {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_DURATION_SECS)
    };
    Duration::from_secs_f32(clamped)
}

pub const EXAMPLE_CONFIG: &str = r#"# quirocontrol.toml

[paths]
dataset = "dataset/gesture_data.json"
model = "model/gesture_model.json"
commands = "config/gesture_commands.json"

[recognition]
# una predicción se acepta solo si su probabilidad es mayor que este valor
confidence_threshold = 0.7
# segundos antes de que el mismo gesto vuelva a disparar su acción
debounce_secs = 1.5

[actions]
shell_timeout_secs = 2.0
key_press_delay_ms = 10

[training]
epochs = 20
batch_size = 16
learning_rate = 0.001
samples_per_gesture = 1000
"#;
