//! Running loss statistics

use crate::training::loss::LossBreakdown;

/// Online mean over one epoch or one evaluation pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of the accumulated values, `None` before the first value
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Independent running averages for the total and each loss term
#[derive(Debug, Clone, Copy, Default)]
pub struct LossAverages {
    pub total: RunningAverage,
    pub segmentation: RunningAverage,
    pub reconstruction: RunningAverage,
    pub depth: RunningAverage,
}

impl LossAverages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, loss: &LossBreakdown) {
        self.total.accumulate(loss.total);
        self.segmentation.accumulate(loss.segmentation);
        self.reconstruction.accumulate(loss.reconstruction);
        self.depth.accumulate(loss.depth);
    }

    pub fn batches(&self) -> usize {
        self.total.count()
    }

    /// Means of every term, `None` if nothing was accumulated
    pub fn means(&self) -> Option<LossMeans> {
        Some(LossMeans {
            total: self.total.mean()?,
            segmentation: self.segmentation.mean()?,
            reconstruction: self.reconstruction.mean()?,
            depth: self.depth.mean()?,
        })
    }
}

/// Aggregated loss means of a pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossMeans {
    pub total: f64,
    pub segmentation: f64,
    pub reconstruction: f64,
    pub depth: f64,
}

impl LossMeans {
    pub fn named_terms(&self) -> [(&'static str, f64); 3] {
        [
            ("seg_loss", self.segmentation),
            ("ae_loss", self.reconstruction),
            ("depth_loss", self.depth),
        ]
    }
}

/// True on every `interval`-th iteration (1-based)
pub fn is_due(iteration: usize, interval: usize) -> bool {
    interval > 0 && iteration % interval == 0
}
