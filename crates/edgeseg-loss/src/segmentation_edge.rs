//! Segmentation edge loss.
//!
//! Compares the Sobel edge strength of the ground truth with that of a
//! Gumbel-softmax relaxed prediction. The relaxation lets gradients flow through
//! what is otherwise a hard class decision.
//!
//! ```text
//! E_gt   = edge_magnitude(gt)
//! E_pred = edge_magnitude(gumbel_softmax(logits))
//! D      = |E_gt - E_pred|
//! Loss   = 0.5 · [E_gt > t] · D + 0.5 · [E_pred > t] · D
//! ```

use burn::{
    config::Config,
    module::Module,
    nn::loss::Reduction,
    tensor::{Tensor, backend::Backend},
};
use edgeseg_ops::{
    EdgeMagnitude, EdgeMagnitudeConfig, EdgeNormalization, GumbelSoftmax, GumbelSoftmaxConfig,
};

/// Configuration for creating a [segmentation edge loss](SegmentationEdgeLoss).
#[derive(Config, Debug)]
pub struct SegmentationEdgeLossConfig {
    /// Edge strength above which a pixel counts as a confident edge. Default: 0.8
    #[config(default = 0.8)]
    pub thresh: f64,

    /// Gumbel-softmax temperature. Default: 1.0
    #[config(default = 1.0)]
    pub tau: f64,

    /// Offset inside the Gumbel noise logarithms. Default: 1e-8
    #[config(default = 1e-8)]
    pub gumbel_eps: f64,

    /// Slice that normalises the edge magnitude. Default: classes
    #[config(default = "EdgeNormalization::Classes")]
    pub normalization: EdgeNormalization,

    /// Lower bound of the normalising maximum. Default: 1e-8
    #[config(default = 1e-8)]
    pub edge_eps: f64,
}

impl SegmentationEdgeLossConfig {
    /// Initialize [segmentation edge loss](SegmentationEdgeLoss).
    pub fn init(&self) -> SegmentationEdgeLoss {
        self.assertions();
        SegmentationEdgeLoss {
            thresh: self.thresh,
            edges: EdgeMagnitudeConfig::new()
                .with_normalization(self.normalization)
                .with_eps(self.edge_eps)
                .init(),
            relaxation: GumbelSoftmaxConfig::new()
                .with_tau(self.tau)
                .with_eps(self.gumbel_eps)
                .init(),
        }
    }

    fn assertions(&self) {
        assert!(
            (0.0..=1.0).contains(&self.thresh),
            "Threshold for SegmentationEdgeLoss must be in [0, 1], got {}",
            self.thresh
        );
    }
}

/// Edge-strength mismatch between ground truth and relaxed prediction.
#[derive(Module, Clone, Debug)]
pub struct SegmentationEdgeLoss {
    /// Confident-edge threshold.
    pub thresh: f64,
    edges: EdgeMagnitude,
    relaxation: GumbelSoftmax,
}

impl Default for SegmentationEdgeLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationEdgeLoss {
    /// Create a new segmentation edge loss with default configuration.
    pub fn new() -> Self {
        SegmentationEdgeLossConfig::new().init()
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

    /// Compute the per-pixel criterion, drawing fresh Gumbel noise.
    ///
    /// # Shapes
    ///
    /// - ground_truth: `[batch_size, height, width, classes]` (one-hot)
    /// - logits: `[batch_size, height, width, classes]`
    /// - output: `[batch_size, height, width, classes]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.assertions(&ground_truth, &logits);
        let relaxed = self.relaxation.forward(logits);
        self.edge_penalty(ground_truth, relaxed)
    }

    /// Compute the per-pixel criterion with a given uniform draw for the relaxation.
    ///
    /// # Shapes
    ///
    /// - uniform: same as `logits`, values in `[0, 1)`
    /// - output: `[batch_size, height, width, classes]`
    pub fn forward_with_noise<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
        uniform: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.assertions(&ground_truth, &logits);
        let relaxed = self.relaxation.forward_with_noise(logits, uniform);
        self.edge_penalty(ground_truth, relaxed)
    }

    fn edge_penalty<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        relaxed: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let gt_edges = self.edges.forward(ground_truth);
        let pred_edges = self.edges.forward(relaxed);

        let difference = (gt_edges.clone() - pred_edges.clone()).abs();
        let gt_contribution = gt_edges.greater_elem(self.thresh).float() * difference.clone();
        let pred_contribution = pred_edges.greater_elem(self.thresh).float() * difference;

        gt_contribution.mul_scalar(0.5) + pred_contribution.mul_scalar(0.5)
    }

    fn assertions<B: Backend>(&self, ground_truth: &Tensor<B, 4>, logits: &Tensor<B, 4>) {
        let gt_dims = ground_truth.dims();
        let pred_dims = logits.dims();
        assert_eq!(
            gt_dims, pred_dims,
            "Shape of ground truth ({gt_dims:?}) must match prediction ({pred_dims:?})"
        );
    }
}

/// Per-pixel segmentation edge loss with the default threshold of `0.8`.
pub fn segmentation_edge_loss<B: Backend>(
    ground_truth: Tensor<B, 4>,
    logits: Tensor<B, 4>,
) -> Tensor<B, 4> {
    SegmentationEdgeLoss::new().forward_no_reduction(ground_truth, logits)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use burn::{
        backend::{Autodiff, ndarray::NdArray},
        tensor::{Distribution, cast::ToElement},
    };
    use rstest::rstest;

    use super::*;
    use crate::tests::{TestBackend, one_hot};

    type GradBackend = Autodiff<NdArray<f32>>;

    /// Two-class `[1, 4, 4, 2]` map split vertically down the middle.
    fn split() -> Tensor<TestBackend, 4> {
        one_hot(
            &[0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1, 1],
            [1, 4, 4],
            2,
        )
    }

    fn half_noise() -> Tensor<TestBackend, 4> {
        Tensor::ones([1, 4, 4, 2], &Default::default()).mul_scalar(0.5)
    }

    #[test]
    fn matching_confident_prediction_has_no_edge_penalty() {
        let gt = split();
        let logits = gt.clone().mul_scalar(50.0);

        let loss = SegmentationEdgeLoss::new().forward_with_noise(gt, logits, half_noise());
        assert_relative_eq!(loss.abs().sum().into_scalar(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn flat_prediction_is_penalised_on_ground_truth_edges_only() {
        let gt = split();
        let logits = Tensor::<TestBackend, 4>::zeros([1, 4, 4, 2], &Default::default());

        let loss = SegmentationEdgeLoss::new().forward_with_noise(gt, logits, half_noise());
        let values = loss.clone().into_data().to_vec::<f32>().unwrap();

        // Boundary columns 1 and 2 carry normalised gt edges of 1, the prediction has none
        for row in 0..4 {
            for col in 0..4 {
                for class in 0..2 {
                    let expected = if col == 1 || col == 2 { 0.5 } else { 0.0 };
                    assert_relative_eq!(values[(row * 4 + col) * 2 + class], expected, epsilon = 1e-5);
                }
            }
        }
        assert_relative_eq!(loss.mean().into_scalar().to_f64(), 0.25, epsilon = 1e-5);
    }

    #[test]
    fn threshold_of_one_disables_penalty() {
        let device = Default::default();
        let logits =
            Tensor::<TestBackend, 4>::random([1, 4, 4, 2], Distribution::Normal(0.0, 1.0), &device);

        let loss = SegmentationEdgeLossConfig::new()
            .with_thresh(1.0)
            .init()
            .forward(split(), logits, Reduction::Sum);
        assert_relative_eq!(loss.into_scalar(), 0.0);
    }

    #[test]
    fn per_pixel_loss_keeps_input_shape_and_is_non_negative() {
        let device = Default::default();
        let gt = one_hot(&[0, 1, 2, 0, 1, 2, 2, 1, 0, 1, 1, 1], [1, 3, 4], 3);
        let logits =
            Tensor::<TestBackend, 4>::random([1, 3, 4, 3], Distribution::Normal(0.0, 2.0), &device);

        let loss = segmentation_edge_loss(gt, logits);
        assert_eq!(loss.dims(), [1, 3, 4, 3]);

        let values = loss.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite() && *v >= 0.0 && *v <= 1.0 + 1e-5));
    }

    #[rstest]
    #[case(EdgeNormalization::Classes)]
    #[case(EdgeNormalization::Spatial)]
    #[case(EdgeNormalization::Raw)]
    fn backward_reaches_logits_for_every_normalization(#[case] normalization: EdgeNormalization) {
        let device = Default::default();
        let gt = Tensor::<GradBackend, 4>::from_data(split().into_data(), &device);
        let logits = Tensor::<GradBackend, 4>::random(
            [1, 4, 4, 2],
            Distribution::Normal(0.0, 1.0),
            &device,
        )
        .require_grad();

        let loss = SegmentationEdgeLossConfig::new()
            .with_thresh(0.0)
            .with_normalization(normalization)
            .init()
            .forward(gt, logits.clone(), Reduction::Mean);
        let grads = loss.backward();

        let grad = logits.grad(&grads).expect("logits should receive a gradient");
        let values = grad.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()), "got {values:?}");
    }

    #[test]
    #[should_panic = "Threshold for SegmentationEdgeLoss must be in [0, 1]"]
    fn segmentation_edge_config_out_of_range_threshold_panics() {
        let _loss = SegmentationEdgeLossConfig::new().with_thresh(1.5).init();
    }

    #[test]
    #[should_panic = "Shape of ground truth"]
    fn segmentation_edge_mismatched_shapes_panics() {
        let device = Default::default();
        let gt = Tensor::<TestBackend, 4>::zeros([1, 4, 4, 2], &device);
        let logits = Tensor::<TestBackend, 4>::zeros([1, 4, 3, 2], &device);

        let _loss = SegmentationEdgeLoss::new().forward_no_reduction(gt, logits);
    }
}
