//! Neural network architecture
//!
//! A shared convolutional encoder feeding three decoders:
//! - segmentation logits
//! - depth estimate
//! - input reconstruction (autoencoder)

pub mod multitask_cnn;

pub use multitask_cnn::{MultitaskCnn, MultitaskCnnConfig, MultitaskModel, MultitaskOutput};
