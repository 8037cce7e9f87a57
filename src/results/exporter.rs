//! Evaluation artifacts for offline inspection
//!
//! For the first frame of a batch, six PNGs are written to
//! `{results_dir}/{split}/frames/`:
//!
//! ```text
//! ckpt_{c}_{i}_image.png           input RGB
//! ckpt_{c}_{i}_reconstruction.png  autoencoder output
//! ckpt_{c}_{i}_seg_gt.png          labels, colored by class
//! ckpt_{c}_{i}_seg_pred.png        argmax of the logits, colored by class
//! ckpt_{c}_{i}_depth_gt.png
//! ckpt_{c}_{i}_depth_pred.png
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::data::dataset::FrameBatch;
use crate::model::MultitaskOutput;
use crate::results::palette::ColorPalette;
use crate::{PretrainError, Result};

/// Writes input/prediction images during evaluation
#[derive(Debug, Clone)]
pub struct ResultArtifactExporter {
    dir: PathBuf,
    palette: ColorPalette,
}

impl ResultArtifactExporter {
    pub fn new(results_dir: impl AsRef<Path>, split: &str, palette: ColorPalette) -> Result<Self> {
        let dir = results_dir.as_ref().join(split).join("frames");
        fs::create_dir_all(&dir)?;
        Ok(ResultArtifactExporter { dir, palette })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export the first frame of the batch with its predictions
    pub fn export<B: Backend>(
        &self,
        checkpoint_index: usize,
        batch: &FrameBatch<B>,
        output: &MultitaskOutput<B>,
    ) -> Result<Vec<PathBuf>> {
        let [_, _, height, width] = batch.rgb.dims();
        let sample_index = batch.sample_indices.first().copied().unwrap_or_default();

        let seg_pred = output.segmentation.clone().slice([0..1]).argmax(1);

        let images: [(&str, Preview); 6] = [
            ("image", Preview::Rgb(floats(batch.rgb.clone().slice([0..1]))?)),
            (
                "reconstruction",
                Preview::Rgb(floats(output.reconstruction.clone().slice([0..1]))?),
            ),
            ("seg_gt", Preview::Classes(ints(batch.segmentation.clone().slice([0..1]))?)),
            ("seg_pred", Preview::Classes(ints(seg_pred)?)),
            ("depth_gt", Preview::Depth(floats(batch.depth.clone().slice([0..1]))?)),
            ("depth_pred", Preview::Depth(floats(output.depth.clone().slice([0..1]))?)),
        ];

        let mut paths = Vec::with_capacity(images.len());
        for (kind, preview) in images {
            let path = self
                .dir
                .join(format!("ckpt_{}_{}_{}.png", checkpoint_index, sample_index, kind));
            match preview {
                Preview::Rgb(planar) => rgb_image(&planar, height, width).save(&path)?,
                Preview::Classes(classes) => self.class_image(&classes, height, width).save(&path)?,
                Preview::Depth(depth) => depth_image(&depth, height, width).save(&path)?,
            }
            paths.push(path);
        }

        log::debug!(
            "Exported results for checkpoint {} sample {} to {}",
            checkpoint_index,
            sample_index,
            self.dir.display()
        );
        Ok(paths)
    }

    fn class_image(&self, classes: &[i64], height: usize, width: usize) -> RgbImage {
        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            let class = classes[y as usize * width + x as usize].max(0) as usize;
            Rgb(self.palette.color(class))
        })
    }
}

enum Preview {
    Rgb(Vec<f32>),
    Classes(Vec<i64>),
    Depth(Vec<f32>),
}

fn floats<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .map_err(|e| PretrainError::TensorData(format!("{:?}", e)))
}

fn ints<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Result<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .into_vec::<i64>()
        .map_err(|e| PretrainError::TensorData(format!("{:?}", e)))
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Channel-major [3, H, W] values in [0, 1]
fn rgb_image(planar: &[f32], height: usize, width: usize) -> RgbImage {
    let pixels = height * width;
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let p = y as usize * width + x as usize;
        Rgb([
            to_byte(planar[p]),
            to_byte(planar[pixels + p]),
            to_byte(planar[2 * pixels + p]),
        ])
    })
}

fn depth_image(depth: &[f32], height: usize, width: usize) -> GrayImage {
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([to_byte(depth[y as usize * width + x as usize])])
    })
}
