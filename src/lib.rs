//! Multi-task visual encoder pretraining for embodied question answering
//!
//! A convolutional encoder is trained to jointly predict semantic segmentation,
//! reconstruct its input image and estimate depth from a single RGB frame.

pub mod data;
pub mod model;
pub mod results;
pub mod training;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Application-wide errors
#[derive(Debug, Error)]
pub enum PretrainError {
    #[error("No compute accelerator available: {0}")]
    NoAccelerator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset split '{split}' is empty")]
    EmptyDataset { split: String },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid sample {sample_index}: {message}")]
    InvalidSample { sample_index: usize, message: String },

    #[error("Checkpoint error at {path:?}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Tensor data error: {0}")]
    TensorData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PretrainError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub training: TrainingConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub learning_rate: f64,
    pub max_epochs: usize,
    /// Iterations between progress log lines (and metric writes while training)
    pub log_interval: usize,
    /// Epochs between checkpoint saves
    pub checkpoint_interval: usize,
    pub train_split: String,
    pub eval_split: String,
    pub eval_save_results: bool,
    pub eval_save_results_interval: usize,
    pub shuffle_seed: u64,
    pub device_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub num_classes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub data_dir: String,
    /// Split the dataset collaborator is asked for
    pub split: String,
    pub checkpoint_dir: String,
    pub results_dir: String,
    pub metrics_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            training: TrainingConfig {
                batch_size: 20,
                learning_rate: 1e-3,
                max_epochs: 5,
                log_interval: 10,
                checkpoint_interval: 1,
                train_split: "train".to_string(),
                eval_split: "val".to_string(),
                eval_save_results: true,
                eval_save_results_interval: 40,
                shuffle_seed: 42,
                device_id: 0,
            },
            model: ModelConfig { num_classes: 41 },
            data: DataConfig {
                data_dir: "data/frames".to_string(),
                split: "train".to_string(),
                checkpoint_dir: "data/checkpoints".to_string(),
                results_dir: "data/results".to_string(),
                metrics_dir: "data/metrics".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PretrainError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| PretrainError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PretrainError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the invariants every run relies on
    pub fn validate(&self) -> Result<()> {
        let t = &self.training;
        let positive = [
            ("batch_size", t.batch_size),
            ("max_epochs", t.max_epochs),
            ("log_interval", t.log_interval),
            ("checkpoint_interval", t.checkpoint_interval),
            ("eval_save_results_interval", t.eval_save_results_interval),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PretrainError::Config(format!("{} must be at least 1", name)));
            }
        }
        if !(t.learning_rate > 0.0) {
            return Err(PretrainError::Config(format!(
                "learning_rate must be positive, got {}",
                t.learning_rate
            )));
        }
        if self.model.num_classes < 2 {
            return Err(PretrainError::Config(format!(
                "num_classes must be at least 2, got {}",
                self.model.num_classes
            )));
        }
        Ok(())
    }

    /// Derive a configuration that reads the given dataset split
    pub fn with_split(&self, split: &str) -> Config {
        let mut derived = self.clone();
        derived.data.split = split.to_string();
        derived
    }
}
