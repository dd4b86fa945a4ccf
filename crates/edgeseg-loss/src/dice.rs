//! Generalised Dice loss.
//!
//! Soft Dice dissimilarity where every class is weighted by the inverse square of
//! its ground-truth pixel count, so small structures weigh as much as large ones.
//!
//! ```text
//! p      = softmax(logits) over classes
//! n_c    = max(Σ_px gt_c, min_count)
//! w_c    = 1 / n_c²
//! Dice   = 1 - 2 · Σ_c w_c Σ_px gt_c·p_c / Σ_c w_c Σ_px (gt_c + p_c)
//! ```

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::loss::Reduction,
    tensor::{Tensor, activation::softmax, backend::Backend},
};

/// Configuration for creating a [generalised Dice loss](GeneralisedDiceLoss).
#[derive(Config, Debug)]
pub struct GeneralisedDiceLossConfig {
    /// Class counts below this value are raised to it before weighting. Default: 1.0
    #[config(default = 1.0)]
    pub min_count: f64,
}

impl GeneralisedDiceLossConfig {
    /// Initialize [generalised Dice loss](GeneralisedDiceLoss).
    pub fn init(&self) -> GeneralisedDiceLoss {
        self.assertions();
        GeneralisedDiceLoss {
            min_count: self.min_count,
        }
    }

    fn assertions(&self) {
        assert!(
            self.min_count > 0.0,
            "Minimum class count for GeneralisedDiceLoss must be positive, got {}",
            self.min_count
        );
    }
}

/// Generalised Dice loss over one-hot, channel-last segmentation maps.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct GeneralisedDiceLoss {
    /// Lower bound of the per-class pixel count.
    pub min_count: f64,
}

impl Default for GeneralisedDiceLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for GeneralisedDiceLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content.add("min_count", &self.min_count).optional()
    }
}

impl GeneralisedDiceLoss {
    /// Create a new generalised Dice loss with default configuration.
    pub fn new() -> Self {
        GeneralisedDiceLossConfig::new().init()
    }

    /// Compute the criterion on the input tensor with reduction.
    ///
    /// # Shapes
    ///
    /// - ground_truth: `[batch_size, height, width, classes]` (one-hot)
    /// - logits: `[batch_size, height, width, classes]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(ground_truth, logits);
        match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        }
    }

    /// Compute the criterion on the input tensor without reduction.
    ///
    /// # Shapes
    ///
    /// - ground_truth: `[batch_size, height, width, classes]` (one-hot)
    /// - logits: `[batch_size, height, width, classes]`
    /// - output: `[batch_size]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        self.assertions(&ground_truth, &logits);
        let probabilities = softmax(logits, 3);
        self.forward_probabilities_no_reduction(ground_truth, probabilities, None)
    }

    /// Dice per sample on class probabilities, optionally restricted to a pixel mask.
    ///
    /// Masked-out pixels contribute to neither the class counts nor the overlap
    /// sums. A sample without any selected pixel has a loss of `0`.
    ///
    /// # Shapes
    ///
    /// - ground_truth: `[batch_size, height, width, classes]`
    /// - probabilities: `[batch_size, height, width, classes]`
    /// - mask: `[batch_size, height, width, 1]` or `[batch_size, height, width, classes]`, values in `{0, 1}`
    /// - output: `[batch_size]`
    pub fn forward_probabilities_no_reduction<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        probabilities: Tensor<B, 4>,
        mask: Option<Tensor<B, 4>>,
    ) -> Tensor<B, 1> {
        self.assertions(&ground_truth, &probabilities);
        let [batch_size, height, width, classes] = ground_truth.dims();

        let (ground_truth, probabilities) = match mask {
            Some(mask) => (ground_truth * mask.clone(), probabilities * mask),
            None => (ground_truth, probabilities),
        };

        // [B, H*W, C]
        let gt_flat = ground_truth.reshape([batch_size, height * width, classes]);
        let pred_flat = probabilities.reshape([batch_size, height * width, classes]);

        // Per-class pixel counts [B, 1, C], clamped so absent classes keep a finite weight
        let counts = gt_flat.clone().sum_dim(1);
        let counts = counts
            .clone()
            .mask_fill(counts.lower_elem(self.min_count), self.min_count);
        let weights = counts.powi_scalar(2).recip();

        let multed = (gt_flat.clone() * pred_flat.clone()).sum_dim(1);
        let summed = (gt_flat + pred_flat).sum_dim(1);

        // [B, 1, 1]
        let numerator = (weights.clone() * multed).sum_dim(2);
        let denominator = (weights * summed).sum_dim(2);

        // Only an empty selection leaves the denominator at zero
        let empty = denominator.clone().equal_elem(0.0);
        let ratio = (numerator.mul_scalar(2.0) / denominator.mask_fill(empty.clone(), 1.0))
            .mask_fill(empty, 1.0);

        ratio.neg().add_scalar(1.0).reshape([batch_size])
    }

    fn assertions<B: Backend>(&self, ground_truth: &Tensor<B, 4>, prediction: &Tensor<B, 4>) {
        let gt_dims = ground_truth.dims();
        let pred_dims = prediction.dims();
        assert_eq!(
            gt_dims, pred_dims,
            "Shape of ground truth ({gt_dims:?}) must match prediction ({pred_dims:?})"
        );
    }
}

/// Mean generalised Dice loss between a one-hot ground truth and raw logits.
pub fn generalised_dice<B: Backend>(ground_truth: Tensor<B, 4>, logits: Tensor<B, 4>) -> Tensor<B, 1> {
    GeneralisedDiceLoss::new().forward(ground_truth, logits, Reduction::Mean)
}
