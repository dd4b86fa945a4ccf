//! # Edge Magnitude
//!
//! Per-pixel Sobel gradient magnitude, normalised by a maximum magnitude so that the
//! strongest edge of each normalisation slice is `1`.
//!
//! ```text
//! mag  = sqrt(dy² + dx²)
//! norm = mag / max(max_slice(mag), eps)
//! ```

use burn::{config::Config, module::Ignored, prelude::*};

use crate::sobel::sobel_edges;

/// Which slice of the magnitude map provides the normalising maximum.
#[derive(Config, Debug, Copy, PartialEq, Eq, Hash)]
pub enum EdgeNormalization {
    /// Maximum over the class axis of each pixel.
    Classes,
    /// Maximum over height and width of each image and class.
    Spatial,
    /// Raw magnitude.
    Raw,
}

impl Default for EdgeNormalization {
    fn default() -> Self {
        Self::Classes
    }
}

/// Configuration for creating an [edge magnitude](EdgeMagnitude) operation.
#[derive(Config, Debug)]
pub struct EdgeMagnitudeConfig {
    /// Normalisation slice. Default: classes
    #[config(default = "EdgeNormalization::Classes")]
    pub normalization: EdgeNormalization,

    /// Lower bound of the normalising maximum. Default: 1e-8
    #[config(default = 1e-8)]
    pub eps: f64,
}

impl EdgeMagnitudeConfig {
    /// Initialize an [edge magnitude](EdgeMagnitude) operation.
    pub fn init(&self) -> EdgeMagnitude {
        assert!(
            self.eps > 0.0,
            "Epsilon for EdgeMagnitude must be positive, got {}",
            self.eps
        );
        EdgeMagnitude {
            normalization: Ignored(self.normalization),
            eps: self.eps,
        }
    }
}

/// Normalised Sobel gradient magnitude.
#[derive(Module, Clone, Debug)]
pub struct EdgeMagnitude {
    normalization: Ignored<EdgeNormalization>,
    eps: f64,
}

impl Default for EdgeMagnitude {
    fn default() -> Self {
        EdgeMagnitudeConfig::new().init()
    }
}

impl EdgeMagnitude {
    /// Normalisation slice in use.
    pub const fn normalization(&self) -> EdgeNormalization {
        self.normalization.0
    }

    /// Compute the normalised edge magnitude.
    ///
    /// # Shapes
    /// - input: `[batch, height, width, channels]`
    /// - output: `[batch, height, width, channels]`
    pub fn forward<B: Backend>(&self, tensor: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, height, width, channels] = tensor.dims();

        let squared = sobel_edges(tensor)
            .powi_scalar(2)
            .sum_dim(4)
            .reshape([batch, height, width, channels]);

        // Sobel responses vanish at reflected borders; sqrt backward must not see 0.
        let floor = self.eps * self.eps;
        let flat = squared.clone().lower_elem(floor);
        let magnitude = squared.clamp_min(floor).sqrt().mask_fill(flat, 0.0);

        let maximum = match self.normalization.0 {
            EdgeNormalization::Classes => magnitude.clone().max_dim(3),
            EdgeNormalization::Spatial => magnitude
                .clone()
                .permute([0, 3, 1, 2])
                .reshape([batch, channels, height * width])
                .max_dim(2)
                .reshape([batch, 1, 1, channels]),
            EdgeNormalization::Raw => return magnitude,
        };

        magnitude / maximum.clamp_min(self.eps)
    }
}

/// Edge magnitude normalised over the class axis.
pub fn edge_magnitude<B: Backend>(tensor: Tensor<B, 4>) -> Tensor<B, 4> {
    EdgeMagnitude::default().forward(tensor)
}
