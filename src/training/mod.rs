//! Model training
//!
//! Training loop, loss composition, checkpointing and metrics tracking.

pub mod checkpoint;
pub mod device;
pub mod loss;
pub mod metrics;
pub mod sink;
pub mod trainer;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::tensor::backend::AutodiffBackend;

use crate::data::FrameSource;
use crate::{Config, PretrainError, Result};

pub use checkpoint::{CheckpointManager, CheckpointRecord};
pub use device::{Accelerator, DeviceHandle};
pub use loss::{LossBreakdown, MultitaskLoss};
pub use metrics::{LossAverages, LossMeans, RunningAverage};
pub use sink::{CsvScalarWriter, MemorySink, MetricsSink};
pub use trainer::{EpochSummary, EvalReport, TrainReport, TrainerController};

/// Capabilities every trainer kind provides
pub trait Trainer {
    fn train(&self, sink: &mut dyn MetricsSink) -> Result<TrainReport>;

    fn eval_checkpoint(
        &self,
        checkpoint_path: &Path,
        checkpoint_index: usize,
        sink: &mut dyn MetricsSink,
    ) -> Result<EvalReport>;

    /// Checkpoints this trainer has written, ordered by epoch
    fn list_checkpoints(&self) -> Result<Vec<CheckpointRecord>>;
}

/// Closed set of trainer implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainerKind {
    #[default]
    EqaCnnPretrain,
}

impl TrainerKind {
    pub fn name(&self) -> &'static str {
        match self {
            TrainerKind::EqaCnnPretrain => "eqa-cnn-pretrain",
        }
    }

    /// Construct the trainer for this kind
    pub fn build<B, S>(
        self,
        config: Config,
        device: DeviceHandle<B>,
        source: S,
    ) -> Result<Box<dyn Trainer>>
    where
        B: AutodiffBackend,
        S: FrameSource + 'static,
    {
        match self {
            TrainerKind::EqaCnnPretrain => {
                Ok(Box::new(TrainerController::new(config, device, source)?))
            }
        }
    }
}

impl fmt::Display for TrainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TrainerKind {
    type Err = PretrainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eqa-cnn-pretrain" => Ok(TrainerKind::EqaCnnPretrain),
            _ => Err(PretrainError::Config(format!(
                "Unknown trainer: {}. Use eqa-cnn-pretrain.",
                s
            ))),
        }
    }
}
