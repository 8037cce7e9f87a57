//! Frame sources resolving a split name to a dataset

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::dataset::{FrameDataset, FrameSample};
use crate::{PretrainError, Result};

/// Anything that can hand out the frames of a named split
pub trait FrameSource {
    fn load_split(&self, split: &str) -> Result<FrameDataset>;
}

/// Frames exported to disk as PNG triplets
///
/// Layout: `{root}/{split}/{index}_rgb.png`, `{index}_depth.png` (16-bit
/// grayscale) and `{index}_seg.png` (8-bit class indices).
#[derive(Debug, Clone)]
pub struct FrameDirectory {
    root: PathBuf,
    num_classes: usize,
}

impl FrameDirectory {
    pub fn new(root: impl Into<PathBuf>, num_classes: usize) -> Self {
        FrameDirectory {
            root: root.into(),
            num_classes,
        }
    }

    /// Sorted sample indices present in a split directory
    fn indices(dir: &Path) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix("_rgb.png") {
                if let Ok(index) = stem.parse::<usize>() {
                    indices.push(index);
                }
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    fn read_sample(dir: &Path, index: usize) -> Result<FrameSample> {
        let rgb = image::open(dir.join(format!("{}_rgb.png", index)))?.to_rgb8();
        let depth = image::open(dir.join(format!("{}_depth.png", index)))?.to_luma16();
        let seg = image::open(dir.join(format!("{}_seg.png", index)))?.to_luma8();

        let (width, height) = rgb.dimensions();
        if depth.dimensions() != (width, height) || seg.dimensions() != (width, height) {
            return Err(PretrainError::InvalidSample {
                sample_index: index,
                message: format!(
                    "rgb is {}x{} but depth is {:?} and segmentation is {:?}",
                    width,
                    height,
                    depth.dimensions(),
                    seg.dimensions()
                ),
            });
        }
        let (width, height) = (width as usize, height as usize);
        let pixels = width * height;

        // HWC -> CHW
        let raw = rgb.as_raw();
        let mut planar = vec![0.0f32; 3 * pixels];
        for p in 0..pixels {
            for c in 0..3 {
                planar[c * pixels + p] = raw[p * 3 + c] as f32 / 255.0;
            }
        }

        Ok(FrameSample {
            sample_index: index,
            height,
            width,
            rgb: planar,
            depth: depth
                .as_raw()
                .iter()
                .map(|d| *d as f32 / u16::MAX as f32)
                .collect(),
            segmentation: seg.into_raw(),
        })
    }
}

impl FrameSource for FrameDirectory {
    fn load_split(&self, split: &str) -> Result<FrameDataset> {
        let dir = self.root.join(split);
        let indices = Self::indices(&dir)?;

        log::info!(
            "Loading {} frames from {}",
            indices.len(),
            dir.display()
        );

        let samples = indices
            .into_iter()
            .map(|index| Self::read_sample(&dir, index))
            .collect::<Result<Vec<_>>>()?;

        FrameDataset::new(split, samples, self.num_classes)
    }
}

/// In-memory frames keyed by split name
#[derive(Debug, Clone, Default)]
pub struct SplitFrames {
    splits: HashMap<String, FrameDataset>,
}

impl SplitFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split(mut self, dataset: FrameDataset) -> Self {
        self.splits.insert(dataset.split().to_string(), dataset);
        self
    }
}

impl FrameSource for SplitFrames {
    fn load_split(&self, split: &str) -> Result<FrameDataset> {
        self.splits
            .get(split)
            .cloned()
            .ok_or_else(|| PretrainError::EmptyDataset {
                split: split.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::Dataset;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

    fn write_frame(dir: &Path, index: usize, width: u32, height: u32) {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 255]))
            .save(dir.join(format!("{}_rgb.png", index)))
            .unwrap();
        ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(width, height, |x, _| {
            Luma([if x == 0 { 0 } else { u16::MAX }])
        })
        .save(dir.join(format!("{}_depth.png", index)))
        .unwrap();
        GrayImage::from_fn(width, height, |_, y| Luma([(y % 3) as u8]))
            .save(dir.join(format!("{}_seg.png", index)))
            .unwrap();
    }

    #[test]
    fn test_frame_directory_reads_split_in_index_order() {
        let root = tempfile::tempdir().unwrap();
        let split_dir = root.path().join("val");
        fs::create_dir_all(&split_dir).unwrap();
        write_frame(&split_dir, 10, 4, 2);
        write_frame(&split_dir, 2, 4, 2);

        let source = FrameDirectory::new(root.path(), 41);
        let dataset = source.load_split("val").unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.frame_dims(), [2, 4]);

        let first = dataset.get(0).unwrap();
        assert_eq!(first.sample_index, 2);
        // Blue channel plane is fully saturated
        assert!(first.rgb[2 * 8..].iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert_eq!(first.depth[0], 0.0);
        assert_eq!(first.depth[1], 1.0);
        assert_eq!(first.segmentation[4], 1);
    }

    #[test]
    fn test_missing_split_directory_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let source = FrameDirectory::new(root.path(), 41);
        assert!(matches!(source.load_split("test"), Err(PretrainError::Io(_))));
    }

    #[test]
    fn test_split_frames_lookup() {
        let dataset = crate::data::dataset::tests::synthetic_dataset("val", 3, 4, 4, 5);
        let source = SplitFrames::new().with_split(dataset);

        assert_eq!(source.load_split("val").unwrap().len(), 3);
        assert!(source.load_split("train").is_err());
    }
}
