//! Multi-task CNN encoder-decoder
//!
//! Architecture: 4 x (Conv5x5 → ReLU → MaxPool2) shared encoder
//!             → segmentation decoder (num_classes logits)
//!             → depth decoder (1 channel)
//!             → autoencoder decoder (3 channels, sigmoid)
//!
//! Every decoder upsamples with stride-2 transposed convolutions back to the
//! input resolution, so input height and width must be multiples of 16.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::ModelConfig;

/// Encoder channel widths, one per downsampling block
const ENCODER_CHANNELS: [usize; 4] = [8, 16, 32, 32];

/// Configuration for the multi-task CNN
#[derive(Debug, Clone, PartialEq)]
pub struct MultitaskCnnConfig {
    /// Number of semantic classes (including background)
    pub num_classes: usize,
}

impl Default for MultitaskCnnConfig {
    fn default() -> Self {
        MultitaskCnnConfig { num_classes: 41 }
    }
}

impl MultitaskCnnConfig {
    pub fn from_model_config(config: &ModelConfig) -> Self {
        MultitaskCnnConfig {
            num_classes: config.num_classes,
        }
    }

    /// Total downsampling factor of the encoder
    pub fn spatial_stride() -> usize {
        1 << ENCODER_CHANNELS.len()
    }
}

/// Outputs of one forward pass
#[derive(Debug, Clone)]
pub struct MultitaskOutput<B: Backend> {
    /// Per-pixel class logits [batch, num_classes, height, width]
    pub segmentation: Tensor<B, 4>,
    /// Predicted depth [batch, 1, height, width]
    pub depth: Tensor<B, 4>,
    /// Reconstructed input image [batch, 3, height, width]
    pub reconstruction: Tensor<B, 4>,
}

/// Model collaborator driven by the trainer
pub trait MultitaskModel<B: Backend>: Module<B> {
    fn forward(&self, rgb: Tensor<B, 4>) -> MultitaskOutput<B>;
}

/// Conv → ReLU → MaxPool block halving the resolution
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        EncoderBlock {
            conv: Conv2dConfig::new([in_channels, out_channels], [5, 5])
                .with_padding(PaddingConfig2d::Explicit(2, 2))
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(relu(self.conv.forward(x)))
    }
}

/// Stack of stride-2 transposed convolutions mirroring the encoder
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    layers: Vec<ConvTranspose2d<B>>,
}

impl<B: Backend> Decoder<B> {
    pub fn new(device: &B::Device, out_channels: usize) -> Self {
        let mut widths: Vec<usize> = ENCODER_CHANNELS.iter().rev().copied().collect();
        widths.push(out_channels);

        let layers = widths
            .windows(2)
            .map(|w| {
                ConvTranspose2dConfig::new([w[0], w[1]], [2, 2])
                    .with_stride([2, 2])
                    .init(device)
            })
            .collect();

        Decoder { layers }
    }

    /// Upsample features back to input resolution; no activation on the last layer
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let last = self.layers.len() - 1;
        self.layers.iter().enumerate().fold(x, |x, (i, layer)| {
            let x = layer.forward(x);
            if i < last {
                relu(x)
            } else {
                x
            }
        })
    }
}

/// Shared encoder with segmentation, depth and reconstruction decoders
#[derive(Module, Debug)]
pub struct MultitaskCnn<B: Backend> {
    encoder: Vec<EncoderBlock<B>>,
    seg_decoder: Decoder<B>,
    depth_decoder: Decoder<B>,
    ae_decoder: Decoder<B>,
}

impl<B: Backend> MultitaskCnn<B> {
    pub fn new(device: &B::Device, config: MultitaskCnnConfig) -> Self {
        let mut in_channels = 3;
        let encoder = ENCODER_CHANNELS
            .iter()
            .map(|&out_channels| {
                let block = EncoderBlock::new(device, in_channels, out_channels);
                in_channels = out_channels;
                block
            })
            .collect();

        MultitaskCnn {
            encoder,
            seg_decoder: Decoder::new(device, config.num_classes),
            depth_decoder: Decoder::new(device, 1),
            ae_decoder: Decoder::new(device, 3),
        }
    }

    /// Encoded feature map [batch, 32, height / 16, width / 16]
    pub fn encode(&self, rgb: Tensor<B, 4>) -> Tensor<B, 4> {
        self.encoder.iter().fold(rgb, |x, block| block.forward(x))
    }
}

impl<B: Backend> MultitaskModel<B> for MultitaskCnn<B> {
    fn forward(&self, rgb: Tensor<B, 4>) -> MultitaskOutput<B> {
        let features = self.encode(rgb);

        MultitaskOutput {
            segmentation: self.seg_decoder.forward(features.clone()),
            depth: self.depth_decoder.forward(features.clone()),
            reconstruction: sigmoid(self.ae_decoder.forward(features)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_multitask_cnn_output_shapes() {
        let device = Default::default();
        let model = MultitaskCnn::<TestBackend>::new(&device, MultitaskCnnConfig { num_classes: 5 });

        let rgb = Tensor::random(
            [2, 3, 32, 16],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let out = model.forward(rgb);

        assert_eq!(out.segmentation.dims(), [2, 5, 32, 16]);
        assert_eq!(out.depth.dims(), [2, 1, 32, 16]);
        assert_eq!(out.reconstruction.dims(), [2, 3, 32, 16]);
    }

    #[test]
    fn test_reconstruction_in_unit_range() {
        let device = Default::default();
        let model = MultitaskCnn::<TestBackend>::new(&device, MultitaskCnnConfig::default());

        let rgb = Tensor::random(
            [1, 3, 16, 16],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let out = model.forward(rgb);

        assert_eq!(out.segmentation.dims()[1], 41);
        let recon = out.reconstruction.to_data();
        for val in recon.as_slice::<f32>().unwrap() {
            assert!(*val >= 0.0 && *val <= 1.0);
        }
    }

    #[test]
    fn test_spatial_stride() {
        assert_eq!(MultitaskCnnConfig::spatial_stride(), 16);
    }
}
