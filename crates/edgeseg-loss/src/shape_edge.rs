//! Shape-conditioned edge loss.
//!
//! Generalised Dice evaluated only on pixels where the shape stream's confidence
//! exceeds a threshold:
//!
//! ```text
//! M    = [shape > t]
//! Loss = Dice(M · gt, M · softmax(logits))
//! ```
//!
//! Masking instead of gathering keeps every tensor at a static shape, so the term
//! batches like the others and stays differentiable with respect to the logits.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::loss::Reduction,
    tensor::{Tensor, activation::softmax, backend::Backend},
};

use crate::dice::{GeneralisedDiceLoss, GeneralisedDiceLossConfig};

/// Configuration for creating a [shape edge loss](ShapeEdgeLoss).
#[derive(Config, Debug)]
pub struct ShapeEdgeLossConfig {
    /// Shape confidence above which a pixel takes part in the Dice term. Default: 0.8
    #[config(default = 0.8)]
    pub thresh: f64,

    /// Lower bound of the per-class pixel count. Default: 1.0
    #[config(default = 1.0)]
    pub min_count: f64,
}

impl ShapeEdgeLossConfig {
    /// Initialize [shape edge loss](ShapeEdgeLoss).
    pub fn init(&self) -> ShapeEdgeLoss {
        self.assertions();
        ShapeEdgeLoss {
            thresh: self.thresh,
            dice: GeneralisedDiceLossConfig::new()
                .with_min_count(self.min_count)
                .init(),
        }
    }

    fn assertions(&self) {
        assert!(
            (0.0..=1.0).contains(&self.thresh),
            "Threshold for ShapeEdgeLoss must be in [0, 1], got {}",
            self.thresh
        );
    }
}

/// Generalised Dice loss gated by a shape-confidence map.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct ShapeEdgeLoss {
    /// Shape-confidence threshold.
    pub thresh: f64,
    dice: GeneralisedDiceLoss,
}

impl Default for ShapeEdgeLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for ShapeEdgeLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("thresh", &self.thresh)
            .add("min_count", &self.dice.min_count)
            .optional()
    }
}

impl ShapeEdgeLoss {
    /// Create a new shape edge loss with default configuration.
    pub fn new() -> Self {
        ShapeEdgeLossConfig::new().init()
    }

    /// Compute the criterion on the input tensor with reduction.
    ///
    /// # Shapes
    ///
    /// - ground_truth: `[batch_size, height, width, classes]` (one-hot)
    /// - logits: `[batch_size, height, width, classes]`
    /// - shape: `[batch_size, height, width, 1]` or `[batch_size, height, width, classes]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
        shape: Tensor<B, 4>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(ground_truth, logits, shape);
        match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        }
    }

    /// Compute the criterion on the input tensor without reduction.
    ///
    /// A sample with no pixel above the threshold contributes `0`.
    ///
    /// # Shapes
    ///
    /// - ground_truth: `[batch_size, height, width, classes]` (one-hot)
    /// - logits: `[batch_size, height, width, classes]`
    /// - shape: `[batch_size, height, width, 1]` or `[batch_size, height, width, classes]`
    /// - output: `[batch_size]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
        shape: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        self.assertions(&ground_truth, &logits, &shape);

        let mask = self.mask(shape);
        let probabilities = softmax(logits, 3);
        self.dice
            .forward_probabilities_no_reduction(ground_truth, probabilities, Some(mask))
    }

    /// Fraction of shape-confidence entries above the threshold, per sample.
    ///
    /// # Shapes
    ///
    /// - shape: `[batch_size, height, width, channels]`
    /// - output: `[batch_size]`
    pub fn selected_fraction<B: Backend>(&self, shape: Tensor<B, 4>) -> Tensor<B, 1> {
        let [batch_size, ..] = shape.dims();
        self.mask(shape)
            .reshape([batch_size as i32, -1])
            .mean_dim(1)
            .reshape([batch_size])
    }

    fn mask<B: Backend>(&self, shape: Tensor<B, 4>) -> Tensor<B, 4> {
        shape.greater_elem(self.thresh).float()
    }

    fn assertions<B: Backend>(
        &self,
        ground_truth: &Tensor<B, 4>,
        logits: &Tensor<B, 4>,
        shape: &Tensor<B, 4>,
    ) {
        let gt_dims = ground_truth.dims();
        let pred_dims = logits.dims();
        let shape_dims = shape.dims();
        assert_eq!(
            gt_dims, pred_dims,
            "Shape of ground truth ({gt_dims:?}) must match prediction ({pred_dims:?})"
        );
        assert!(
            shape_dims[..3] == pred_dims[..3] && (shape_dims[3] == 1 || shape_dims[3] == pred_dims[3]),
            "Shape confidence ({shape_dims:?}) must be [batch, height, width, 1] or match prediction ({pred_dims:?})"
        );
    }
}

/// Mean shape edge loss with the default threshold of `0.8`.
pub fn shape_edge_loss<B: Backend>(
    ground_truth: Tensor<B, 4>,
    logits: Tensor<B, 4>,
    shape: Tensor<B, 4>,
) -> Tensor<B, 1> {
    ShapeEdgeLoss::new().forward(ground_truth, logits, shape, Reduction::Mean)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use burn::tensor::{Distribution, TensorData, cast::ToElement};

    use super::*;
    use crate::{
        dice::generalised_dice,
        tests::{TestBackend, one_hot},
    };

    fn labels() -> Tensor<TestBackend, 4> {
        one_hot(&[0, 1, 1, 2, 0, 2, 1, 1, 0], [1, 3, 3], 3)
    }

    fn logits() -> Tensor<TestBackend, 4> {
        Tensor::random([1, 3, 3, 3], Distribution::Normal(0.0, 1.5), &Default::default())
    }

    #[test]
    fn shape_edge_below_threshold_everywhere_is_zero_and_finite() {
        let shape = Tensor::<TestBackend, 4>::ones([1, 3, 3, 1], &Default::default()).mul_scalar(0.3);

        let loss = shape_edge_loss(labels(), logits(), shape).into_scalar().to_f64();
        assert!(loss.is_finite());
        assert_relative_eq!(loss, 0.0);
    }

    #[test]
    fn shape_edge_above_threshold_everywhere_equals_plain_dice() {
        let logits = logits();
        let shape = Tensor::<TestBackend, 4>::ones([1, 3, 3, 1], &Default::default());

        let gated = shape_edge_loss(labels(), logits.clone(), shape).into_scalar();
        let plain = generalised_dice(labels(), logits).into_scalar();
        assert_relative_eq!(gated, plain, epsilon = 1e-6);
    }

    #[test]
    fn shape_edge_accepts_per_class_confidence() {
        let logits = logits();
        let device = Default::default();
        let single = Tensor::<TestBackend, 4>::random([1, 3, 3, 1], Distribution::Uniform(0.0, 1.0), &device);
        let repeated = Tensor::cat(vec![single.clone(), single.clone(), single.clone()], 3);

        let loss = ShapeEdgeLoss::new();
        let broadcast = loss
            .forward(labels(), logits.clone(), single, Reduction::Mean)
            .into_scalar();
        let full = loss.forward(labels(), logits, repeated, Reduction::Mean).into_scalar();
        assert_relative_eq!(broadcast, full, epsilon = 1e-6);
    }

    #[test]
    fn empty_sample_does_not_affect_the_other_samples() {
        let device = Default::default();
        let gt = one_hot(&[0, 1, 1, 0, 1, 0, 0, 1], [2, 2, 2], 2);
        let logits =
            Tensor::<TestBackend, 4>::random([2, 2, 2, 2], Distribution::Normal(0.0, 1.0), &device);
        let shape = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.9f32, 0.9, 0.9, 0.9, 0.1, 0.1, 0.1, 0.1], [2, 2, 2, 1]),
            &device,
        );

        let per_sample = ShapeEdgeLoss::new()
            .forward_no_reduction(gt.clone(), logits.clone(), shape)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let first = GeneralisedDiceLoss::new()
            .forward_no_reduction(gt.slice([0..1, 0..2, 0..2, 0..2]), logits.slice([0..1, 0..2, 0..2, 0..2]))
            .into_scalar();

        assert_relative_eq!(per_sample[0], first, epsilon = 1e-6);
        assert_relative_eq!(per_sample[1], 0.0);
    }

    #[test]
    fn selected_fraction_counts_confident_pixels() {
        let device = Default::default();
        let shape = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.9f32, 0.2, 0.85, 0.8, 0.0, 0.0, 0.0, 1.0], [2, 2, 2, 1]),
            &device,
        );

        let fraction = ShapeEdgeLoss::new()
            .selected_fraction(shape)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_relative_eq!(fraction[0], 0.5);
        assert_relative_eq!(fraction[1], 0.25);
    }

    #[test]
    #[should_panic = "Shape confidence"]
    fn shape_edge_with_wrong_confidence_channels_panics() {
        let shape = Tensor::<TestBackend, 4>::ones([1, 3, 3, 2], &Default::default());
        let _loss = shape_edge_loss(labels(), logits(), shape);
    }

    #[test]
    fn shape_edge_display_shows_threshold() {
        let loss = ShapeEdgeLossConfig::new().with_thresh(0.5).init();

        let display_str = format!("{loss}");
        assert!(display_str.contains("ShapeEdgeLoss"));
        assert!(display_str.contains("thresh: 0.5"));
    }
}
