//! Multi-task loss
//!
//! ```text
//! L_total = L_seg + 10 · L_ae + 10 · L_depth
//! ```
//!
//! The regression terms are upweighted to balance their much smaller
//! magnitude against the cross-entropy term.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

use crate::data::dataset::FrameBatch;
use crate::model::MultitaskOutput;

pub const SEGMENTATION_WEIGHT: f64 = 1.0;
pub const RECONSTRUCTION_WEIGHT: f64 = 10.0;
pub const DEPTH_WEIGHT: f64 = 10.0;

/// Scalar loss terms of one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossBreakdown {
    pub segmentation: f64,
    pub reconstruction: f64,
    pub depth: f64,
    pub total: f64,
}

impl LossBreakdown {
    /// Combine the three terms with the fixed task weights
    pub fn new(segmentation: f64, reconstruction: f64, depth: f64) -> Self {
        LossBreakdown {
            segmentation,
            reconstruction,
            depth,
            total: SEGMENTATION_WEIGHT * segmentation
                + RECONSTRUCTION_WEIGHT * reconstruction
                + DEPTH_WEIGHT * depth,
        }
    }

    /// Per-term values under the names the metrics sink groups them by
    pub fn named_terms(&self) -> [(&'static str, f64); 3] {
        [
            ("seg_loss", self.segmentation),
            ("ae_loss", self.reconstruction),
            ("depth_loss", self.depth),
        ]
    }
}

/// Composes segmentation, reconstruction and depth losses
#[derive(Debug, Clone, Copy, Default)]
pub struct MultitaskLoss;

impl MultitaskLoss {
    pub fn new() -> Self {
        MultitaskLoss
    }

    /// Compute the differentiable total and its scalar breakdown
    pub fn forward<B: Backend>(
        &self,
        output: &MultitaskOutput<B>,
        batch: &FrameBatch<B>,
    ) -> (Tensor<B, 1>, LossBreakdown) {
        let seg = self.segmentation_loss(output, batch);
        let ae = smooth_l1(output.reconstruction.clone(), batch.rgb.clone());
        let depth = smooth_l1(output.depth.clone(), batch.depth.clone());

        let breakdown = LossBreakdown::new(
            seg.clone().into_scalar().elem::<f64>(),
            ae.clone().into_scalar().elem::<f64>(),
            depth.clone().into_scalar().elem::<f64>(),
        );

        let total = seg * SEGMENTATION_WEIGHT
            + ae * RECONSTRUCTION_WEIGHT
            + depth * DEPTH_WEIGHT;

        (total, breakdown)
    }

    /// Mean per-pixel cross-entropy between class logits and labels
    fn segmentation_loss<B: Backend>(
        &self,
        output: &MultitaskOutput<B>,
        batch: &FrameBatch<B>,
    ) -> Tensor<B, 1> {
        let [batch_size, num_classes, height, width] = output.segmentation.dims();
        let pixels = batch_size * height * width;

        // [N, C, H, W] -> [N * H * W, C]
        let logits = output
            .segmentation
            .clone()
            .permute([0, 2, 3, 1])
            .reshape([pixels, num_classes]);
        let targets = batch.segmentation.clone().reshape([pixels]);

        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, targets)
    }
}

/// Smooth-L1 (beta = 1) averaged over every element
///
/// 0.5 · d² where |d| < 1, |d| - 0.5 elsewhere.
pub fn smooth_l1<B: Backend, const D: usize>(
    predictions: Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    let abs = (predictions - targets).abs();
    let clipped = abs.clone().clamp_max(1.0);
    // clipped · (|d| - clipped / 2) covers both branches
    (clipped.clone() * (abs - clipped * 0.5)).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Int, TensorData};

    type TestBackend = NdArray<f32>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_total_is_weighted_sum() {
        let breakdown = LossBreakdown::new(2.5, 0.125, 0.0625);
        assert_eq!(breakdown.total, 2.5 + 10.0 * 0.125 + 10.0 * 0.0625);

        let zero = LossBreakdown::new(0.0, 0.0, 0.0);
        assert_eq!(zero.total, 0.0);
    }

    #[test]
    fn test_smooth_l1_branches() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 1>::from_floats([0.5, 3.0, -2.0, 1.0], &device);
        let target = Tensor::<TestBackend, 1>::zeros([4], &device);

        // 0.125, 2.5, 1.5, 0.5
        let loss = scalar(smooth_l1(pred, target));
        assert!((loss - 4.625 / 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_smooth_l1_zero_for_identical_inputs() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random(
            [2, 3, 4, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert!(scalar(smooth_l1(x.clone(), x)).abs() < 1e-9);
    }

    #[test]
    fn test_forward_breakdown_matches_tensor_total() {
        let device = Default::default();
        let (n, c, h, w) = (2, 4, 3, 5);

        let output = MultitaskOutput {
            segmentation: Tensor::<TestBackend, 4>::random(
                [n, c, h, w],
                burn::tensor::Distribution::Normal(0.0, 1.0),
                &device,
            ),
            depth: Tensor::random([n, 1, h, w], burn::tensor::Distribution::Uniform(0.0, 1.0), &device),
            reconstruction: Tensor::random(
                [n, 3, h, w],
                burn::tensor::Distribution::Uniform(0.0, 1.0),
                &device,
            ),
        };
        let labels: Vec<i64> = (0..n * h * w).map(|i| (i % c) as i64).collect();
        let batch = FrameBatch {
            sample_indices: vec![0, 1],
            rgb: Tensor::random([n, 3, h, w], burn::tensor::Distribution::Uniform(0.0, 1.0), &device),
            depth: Tensor::random([n, 1, h, w], burn::tensor::Distribution::Uniform(0.0, 1.0), &device),
            segmentation: Tensor::<TestBackend, 1, Int>::from_data(
                TensorData::new(labels, [n * h * w]),
                &device,
            )
            .reshape([n, h, w]),
        };

        let (total, breakdown) = MultitaskLoss::new().forward(&output, &batch);

        assert!(breakdown.segmentation > 0.0);
        assert!(breakdown.reconstruction >= 0.0);
        assert!(breakdown.depth >= 0.0);
        assert_eq!(
            breakdown.total,
            breakdown.segmentation + 10.0 * breakdown.reconstruction + 10.0 * breakdown.depth
        );
        assert!((scalar(total) - breakdown.total).abs() < 1e-4);
    }

    #[test]
    fn test_confident_correct_logits_give_small_seg_loss() {
        let device = Default::default();
        // One pixel per class, logit 20 on the labelled class
        let mut logits = vec![0.0f32; 3 * 3];
        for p in 0..3 {
            logits[p * 3 + p] = 20.0;
        }
        let seg = Tensor::<TestBackend, 1>::from_floats(logits.as_slice(), &device)
            .reshape([1, 3, 1, 3])
            .permute([0, 3, 1, 2]);
        let zeros3 = Tensor::<TestBackend, 4>::zeros([1, 3, 3, 1], &device);
        let zeros1 = Tensor::<TestBackend, 4>::zeros([1, 1, 3, 1], &device);

        let output = MultitaskOutput {
            segmentation: seg,
            depth: zeros1.clone(),
            reconstruction: zeros3.clone(),
        };
        let batch = FrameBatch {
            sample_indices: vec![0],
            rgb: zeros3,
            depth: zeros1,
            segmentation: Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 2], &device)
                .reshape([1, 3, 1]),
        };

        let (_, breakdown) = MultitaskLoss::new().forward(&output, &batch);
        assert!(breakdown.segmentation < 1e-6);
        assert_eq!(breakdown.reconstruction, 0.0);
        assert_eq!(breakdown.total, breakdown.segmentation);
    }
}
