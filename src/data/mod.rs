//! Frame data
//!
//! Datasets of RGB/depth/segmentation frames and the sources that load them.

pub mod dataset;
pub mod source;

pub use dataset::{FrameBatch, FrameBatcher, FrameDataset, FrameSample};
pub use source::{FrameDirectory, FrameSource, SplitFrames};
