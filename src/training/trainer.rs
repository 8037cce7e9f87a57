//! Training loop and checkpoint evaluation

use std::path::Path;
use std::time::Instant;

use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::Dataset;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;

use crate::data::{FrameBatcher, FrameDataset, FrameSource};
use crate::model::{MultitaskCnn, MultitaskCnnConfig, MultitaskModel};
use crate::results::{ColorPalette, ResultArtifactExporter};
use crate::training::checkpoint::{CheckpointManager, CheckpointRecord};
use crate::training::device::DeviceHandle;
use crate::training::loss::MultitaskLoss;
use crate::training::metrics::{is_due, LossAverages, LossMeans, RunningAverage};
use crate::training::sink::MetricsSink;
use crate::training::Trainer;
use crate::{Config, PretrainError, Result};

/// Summary of one completed training epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub batches: usize,
    pub mean_loss: f64,
    pub minutes: f64,
}

/// Outcome of a full training run
#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    /// Iterations across all epochs
    pub iterations: usize,
    pub epochs: Vec<EpochSummary>,
    pub checkpoints: Vec<CheckpointRecord>,
}

/// Aggregated metrics of one checkpoint evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub checkpoint_index: usize,
    pub batches: usize,
    pub means: LossMeans,
    pub artifacts_exported: usize,
}

/// Adam with torch's default epsilon
fn optimizer_config() -> AdamConfig {
    AdamConfig::new().with_epsilon(1e-8)
}

/// Drives training epochs and checkpoint evaluation for the multi-task CNN
pub struct TrainerController<B: AutodiffBackend, S: FrameSource> {
    config: Config,
    device: DeviceHandle<B>,
    source: S,
    checkpoints: CheckpointManager,
    loss_fn: MultitaskLoss,
}

impl<B: AutodiffBackend, S: FrameSource> TrainerController<B, S> {
    /// Create a controller on an acquired accelerator
    pub fn new(config: Config, device: DeviceHandle<B>, source: S) -> Result<Self> {
        config.validate()?;
        let checkpoints = CheckpointManager::new(&config.data.checkpoint_dir)?;
        log::info!("config: {:?}", config);

        Ok(TrainerController {
            config,
            device,
            source,
            checkpoints,
            loss_fn: MultitaskLoss::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn checkpoint_manager(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    fn model_config(&self) -> MultitaskCnnConfig {
        MultitaskCnnConfig::from_model_config(&self.config.model)
    }

    /// Load the split named by `config` and check the model can consume it
    fn load_frames(&self, config: &Config) -> Result<FrameDataset> {
        let dataset = self.source.load_split(&config.data.split)?;
        let stride = MultitaskCnnConfig::spatial_stride();
        let [height, width] = dataset.frame_dims();

        if height % stride != 0 || width % stride != 0 {
            return Err(PretrainError::ShapeMismatch {
                expected: vec![height.next_multiple_of(stride), width.next_multiple_of(stride)],
                actual: vec![height, width],
            });
        }
        Ok(dataset)
    }

    /// Train from scratch for `max_epochs`, checkpointing on the configured cadence
    pub fn train(&self, sink: &mut dyn MetricsSink) -> Result<TrainReport> {
        let config = self.config.with_split(&self.config.training.train_split);
        let training = &config.training;

        let dataset = self.load_frames(&config)?;
        log::info!("[ train_loader has {} samples ]", dataset.len());
        log::debug!(
            "{} batches per epoch",
            dataset.num_batches(training.batch_size)
        );

        let device = self.device.device().clone();
        let mut model = MultitaskCnn::<B>::new(&device, self.model_config());
        let mut optimizer = optimizer_config().init();

        let loader = DataLoaderBuilder::new(FrameBatcher::<B>::new(device.clone()))
            .batch_size(training.batch_size)
            .shuffle(training.shuffle_seed)
            .build(dataset);

        let mut report = TrainReport::default();
        let mut t = 0;

        for epoch in 1..=training.max_epochs {
            let start = Instant::now();
            let mut avg_loss = RunningAverage::new();

            for batch in loader.iter() {
                t += 1;

                let output = model.forward(batch.rgb.clone());
                let (loss, breakdown) = self.loss_fn.forward(&output, &batch);
                avg_loss.accumulate(breakdown.total);

                if is_due(t, training.log_interval) {
                    log::info!(
                        "[ Epoch: {}; iter: {}; loss: {} ]",
                        epoch,
                        t,
                        breakdown.total
                    );
                    sink.record_scalar("total_loss", breakdown.total, t)?;
                    sink.record_grouped_scalars("individual_losses", &breakdown.named_terms(), t)?;
                }

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(training.learning_rate, model, grads);
            }

            let minutes = start.elapsed().as_secs_f64() / 60.0;
            let mean_loss = avg_loss.mean().ok_or_else(|| PretrainError::EmptyDataset {
                split: config.data.split.clone(),
            })?;

            log::info!(
                "[ Epoch {} completed. Time taken: {:.1} minutes. ]",
                epoch,
                minutes
            );
            log::info!("[ Average loss: {:.2} ]", mean_loss);

            report.epochs.push(EpochSummary {
                epoch,
                batches: avg_loss.count(),
                mean_loss,
                minutes,
            });

            if epoch % training.checkpoint_interval == 0 {
                let record = self
                    .checkpoints
                    .save::<B, _>(model.clone().into_record(), epoch)?;
                log::info!("Checkpoint saved: {}", record.path.display());
                report.checkpoints.push(record);
            }
        }

        report.iterations = t;
        Ok(report)
    }

    /// Evaluate a saved checkpoint on the evaluation split
    pub fn eval_checkpoint(
        &self,
        checkpoint_path: &Path,
        checkpoint_index: usize,
        sink: &mut dyn MetricsSink,
    ) -> Result<EvalReport> {
        let config = self.config.with_split(&self.config.training.eval_split);
        let training = &config.training;

        let dataset = self.load_frames(&config)?;
        log::info!("[ eval_loader has {} samples ]", dataset.len());
        log::debug!("{} eval batches", dataset.num_batches(training.batch_size));

        let device = self.device.device().clone();
        let record = CheckpointManager::load::<B, _>(checkpoint_path, &device)?;
        let model = MultitaskCnn::<B>::new(&device, self.model_config())
            .load_record(record)
            .valid();

        let exporter = if training.eval_save_results {
            Some(ResultArtifactExporter::new(
                &config.data.results_dir,
                &config.data.split,
                ColorPalette::generate(),
            )?)
        } else {
            None
        };

        let loader = DataLoaderBuilder::new(FrameBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(training.batch_size)
            .build(dataset);

        let mut averages = LossAverages::new();
        let mut artifacts_exported = 0;
        let mut t = 0;

        for batch in loader.iter() {
            t += 1;

            let output = model.forward(batch.rgb.clone());
            let (_, breakdown) = self.loss_fn.forward(&output, &batch);
            averages.update(&breakdown);

            if is_due(t, training.log_interval) {
                log::info!("[ Iter: {}; loss: {} ]", t, breakdown.total);
            }

            if let Some(exporter) = &exporter {
                if is_due(t, training.eval_save_results_interval) {
                    exporter.export(checkpoint_index, &batch, &output)?;
                    artifacts_exported += 1;
                }
            }
        }

        let means = averages.means().ok_or_else(|| PretrainError::EmptyDataset {
            split: config.data.split.clone(),
        })?;

        sink.record_scalar("avg val total loss", means.total, checkpoint_index)?;
        sink.record_grouped_scalars(
            "avg val individual_losses",
            &means.named_terms(),
            checkpoint_index,
        )?;

        log::info!("[ Average loss: {:.3} ]", means.total);
        log::info!("[ Average seg loss: {:.3} ]", means.segmentation);
        log::info!("[ Average autoencoder loss: {:.4} ]", means.reconstruction);
        log::info!("[ Average depth loss: {:.4} ]", means.depth);

        Ok(EvalReport {
            checkpoint_index,
            batches: averages.batches(),
            means,
            artifacts_exported,
        })
    }
}

impl<B: AutodiffBackend, S: FrameSource> Trainer for TrainerController<B, S> {
    fn train(&self, sink: &mut dyn MetricsSink) -> Result<TrainReport> {
        TrainerController::train(self, sink)
    }

    fn eval_checkpoint(
        &self,
        checkpoint_path: &Path,
        checkpoint_index: usize,
        sink: &mut dyn MetricsSink,
    ) -> Result<EvalReport> {
        TrainerController::eval_checkpoint(self, checkpoint_path, checkpoint_index, sink)
    }

    fn list_checkpoints(&self) -> Result<Vec<CheckpointRecord>> {
        self.checkpoints.checkpoints()
    }
}
