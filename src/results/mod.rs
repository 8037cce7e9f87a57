//! Evaluation result artifacts
//!
//! Colored segmentation maps and image/depth previews written during evaluation.

pub mod exporter;
pub mod palette;

pub use exporter::ResultArtifactExporter;
pub use palette::ColorPalette;
