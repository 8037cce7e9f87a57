//! Frame dataset and batching
//!
//! Each sample is one RGB frame captured by the agent together with its
//! depth map and per-pixel semantic class labels.

use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::{PretrainError, Result};

/// A single frame with its ground truth
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub sample_index: usize,
    pub height: usize,
    pub width: usize,
    /// Channel-major RGB in [0, 1]: [3, height, width]
    pub rgb: Vec<f32>,
    /// Depth in [0, 1]: [height, width]
    pub depth: Vec<f32>,
    /// Semantic class index per pixel: [height, width]
    pub segmentation: Vec<u8>,
}

impl FrameSample {
    /// Number of pixels in one channel
    pub fn pixels(&self) -> usize {
        self.height * self.width
    }

    fn check(&self, num_classes: usize) -> Result<()> {
        let pixels = self.pixels();
        let invalid = |message: String| PretrainError::InvalidSample {
            sample_index: self.sample_index,
            message,
        };

        if pixels == 0 {
            return Err(invalid("frame has no pixels".to_string()));
        }
        if self.rgb.len() != 3 * pixels {
            return Err(invalid(format!(
                "rgb has {} values, expected {}",
                self.rgb.len(),
                3 * pixels
            )));
        }
        if self.depth.len() != pixels {
            return Err(invalid(format!(
                "depth has {} values, expected {}",
                self.depth.len(),
                pixels
            )));
        }
        if self.segmentation.len() != pixels {
            return Err(invalid(format!(
                "segmentation has {} values, expected {}",
                self.segmentation.len(),
                pixels
            )));
        }
        if let Some(class) = self
            .segmentation
            .iter()
            .find(|c| **c as usize >= num_classes)
        {
            return Err(invalid(format!(
                "class {} is outside 0..{}",
                class, num_classes
            )));
        }
        Ok(())
    }
}

/// Validated collection of frames sharing one resolution
#[derive(Debug, Clone)]
pub struct FrameDataset {
    split: String,
    samples: Vec<FrameSample>,
}

impl FrameDataset {
    /// Build a dataset, rejecting empty splits and inconsistent samples
    pub fn new(split: &str, samples: Vec<FrameSample>, num_classes: usize) -> Result<Self> {
        let first = samples.first().ok_or_else(|| PretrainError::EmptyDataset {
            split: split.to_string(),
        })?;
        let dims = [first.height, first.width];

        for sample in &samples {
            sample.check(num_classes)?;
            if [sample.height, sample.width] != dims {
                return Err(PretrainError::ShapeMismatch {
                    expected: dims.to_vec(),
                    actual: vec![sample.height, sample.width],
                });
            }
        }

        Ok(FrameDataset {
            split: split.to_string(),
            samples,
        })
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    /// Spatial dimensions shared by every frame: [height, width]
    pub fn frame_dims(&self) -> [usize; 2] {
        // new() guarantees at least one sample
        let first = &self.samples[0];
        [first.height, first.width]
    }

    /// Number of batches one pass produces at the given batch size
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.samples.len().div_ceil(batch_size.max(1))
    }
}

impl Dataset<FrameSample> for FrameDataset {
    fn get(&self, index: usize) -> Option<FrameSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batch of frames on the training device
#[derive(Debug, Clone)]
pub struct FrameBatch<B: Backend> {
    /// Dataset indices of the frames, in batch order
    pub sample_indices: Vec<usize>,
    /// Input images: [batch, 3, height, width]
    pub rgb: Tensor<B, 4>,
    /// Ground-truth depth: [batch, 1, height, width]
    pub depth: Tensor<B, 4>,
    /// Ground-truth classes: [batch, height, width]
    pub segmentation: Tensor<B, 3, Int>,
}

/// Batcher that stacks frames directly onto the configured device
#[derive(Clone)]
pub struct FrameBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> FrameBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        FrameBatcher { device }
    }
}

impl<B: Backend> burn::data::dataloader::batcher::Batcher<B, FrameSample, FrameBatch<B>>
    for FrameBatcher<B>
{
    fn batch(&self, items: Vec<FrameSample>, _device: &B::Device) -> FrameBatch<B> {
        let batch_size = items.len();
        let (height, width) = items
            .first()
            .map(|s| (s.height, s.width))
            .unwrap_or((0, 0));
        let pixels = height * width;

        let mut sample_indices = Vec::with_capacity(batch_size);
        let mut rgb_data = Vec::with_capacity(batch_size * 3 * pixels);
        let mut depth_data = Vec::with_capacity(batch_size * pixels);
        let mut seg_data = Vec::with_capacity(batch_size * pixels);

        for sample in &items {
            sample_indices.push(sample.sample_index);
            rgb_data.extend_from_slice(&sample.rgb);
            depth_data.extend_from_slice(&sample.depth);
            seg_data.extend(sample.segmentation.iter().map(|c| *c as i32));
        }

        let rgb = Tensor::<B, 1>::from_floats(rgb_data.as_slice(), &self.device)
            .reshape([batch_size, 3, height, width]);

        let depth = Tensor::<B, 1>::from_floats(depth_data.as_slice(), &self.device)
            .reshape([batch_size, 1, height, width]);

        let segmentation = Tensor::<B, 1, Int>::from_ints(seg_data.as_slice(), &self.device)
            .reshape([batch_size, height, width]);

        FrameBatch {
            sample_indices,
            rgb,
            depth,
            segmentation,
        }
    }
}
