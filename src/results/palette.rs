//! Class color palette for segmentation previews

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const PALETTE_SEED: u64 = 2;
pub const PALETTE_SIZE: usize = 41;

/// Fixed mapping from class index to an RGB color
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette {
    colors: Vec<[u8; 3]>,
}

impl ColorPalette {
    /// The palette used for every exported segmentation map
    pub fn generate() -> Self {
        Self::with_seed(PALETTE_SEED, PALETTE_SIZE)
    }

    pub fn with_seed(seed: u64, size: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let colors = (0..size.max(1))
            .map(|_| {
                [
                    rng.gen_range(0..255),
                    rng.gen_range(0..255),
                    rng.gen_range(0..255),
                ]
            })
            .collect();
        ColorPalette { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color of a class; indices past the end wrap around
    pub fn color(&self, class: usize) -> [u8; 3] {
        self.colors[class % self.colors.len()]
    }
}
