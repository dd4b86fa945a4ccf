//! Combined edge-aware segmentation objective.
//!
//! Sums the generalised Dice loss, the segmentation edge loss and the shape edge
//! loss. Dice and shape edge terms reduce to scalars while the segmentation edge
//! term is per pixel, so the unreduced objective is the per-pixel edge map shifted
//! by the two scalar terms.

use std::{collections::HashMap, fs, path::Path};

use burn::{
    nn::loss::Reduction,
    prelude::*,
    tensor::{Tensor, backend::Backend, cast::ToElement},
};

use crate::{
    dice::{GeneralisedDiceLoss, GeneralisedDiceLossConfig},
    error::{ConfigFileError, EdgeSegLossError, EdgeSegLossResult},
    segmentation_edge::{SegmentationEdgeLoss, SegmentationEdgeLossConfig},
    shape_edge::{ShapeEdgeLoss, ShapeEdgeLossConfig},
};

/// Configuration for the combined [edge-aware objective](EdgeSegLoss).
#[derive(Config, Debug)]
pub struct EdgeSegLossConfig {
    /// Generalised Dice term
    #[config(default = "GeneralisedDiceLossConfig::new()")]
    pub dice: GeneralisedDiceLossConfig,

    /// Segmentation edge term
    #[config(default = "SegmentationEdgeLossConfig::new()")]
    pub segmentation_edge: SegmentationEdgeLossConfig,

    /// Shape edge term
    #[config(default = "ShapeEdgeLossConfig::new()")]
    pub shape_edge: ShapeEdgeLossConfig,

    #[config(default = "1.0")]
    pub dice_weight: f64,

    #[config(default = "1.0")]
    pub segmentation_edge_weight: f64,

    #[config(default = "1.0")]
    pub shape_edge_weight: f64,
}

impl EdgeSegLossConfig {
    /// Initialize the combined objective.
    pub fn init(&self) -> EdgeSegLoss {
        self.assertions();
        EdgeSegLoss {
            dice: self.dice.init(),
            segmentation_edge: self.segmentation_edge.init(),
            shape_edge: self.shape_edge.init(),
            dice_weight: self.dice_weight,
            segmentation_edge_weight: self.segmentation_edge_weight,
            shape_edge_weight: self.shape_edge_weight,
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&config_str).map_err(|source| ConfigFileError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Saves this configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized or the file
    /// cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigFileError> {
        let path = path.as_ref();
        let config_str =
            serde_json::to_string_pretty(self).map_err(|source| ConfigFileError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, config_str).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn assertions(&self) {
        for (name, weight) in [
            ("dice", self.dice_weight),
            ("segmentation edge", self.segmentation_edge_weight),
            ("shape edge", self.shape_edge_weight),
        ] {
            assert!(
                weight >= 0.0,
                "Weight for the {name} term of EdgeSegLoss must be non-negative, got {weight}"
            );
        }
    }
}

/// Combined objective: Dice + segmentation edge + shape edge.
#[derive(Module, Clone, Debug)]
pub struct EdgeSegLoss {
    dice: GeneralisedDiceLoss,
    segmentation_edge: SegmentationEdgeLoss,
    shape_edge: ShapeEdgeLoss,
    dice_weight: f64,
    segmentation_edge_weight: f64,
    shape_edge_weight: f64,
}

impl Default for EdgeSegLoss {
    fn default() -> Self {
        EdgeSegLossConfig::new().init()
    }
}

/// The three weighted terms of one evaluation.
struct Terms<B: Backend> {
    dice: Tensor<B, 1>,
    segmentation_edge: Tensor<B, 4>,
    shape_edge: Tensor<B, 1>,
}

impl<B: Backend> Terms<B> {
    /// Scalar terms broadcast onto the per-pixel edge map.
    fn per_pixel(self) -> Tensor<B, 4> {
        let scalars = (self.dice + self.shape_edge).reshape([1, 1, 1, 1]);
        self.segmentation_edge + scalars
    }
}

impl EdgeSegLoss {
    /// Compute the objective without reduction.
    ///
    /// # Shapes
    ///
    /// - ground_truth: `[batch_size, height, width, classes]` (one-hot)
    /// - logits: `[batch_size, height, width, classes]`
    /// - shape: `[batch_size, height, width, 1]`
    /// - output: `[batch_size, height, width, classes]`
    ///
    /// # Errors
    ///
    /// Returns an error if the input shapes are incompatible.
    pub fn forward_no_reduction<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
        shape: Tensor<B, 4>,
    ) -> EdgeSegLossResult<Tensor<B, 4>> {
        Ok(self.terms(ground_truth, logits, shape)?.per_pixel())
    }

    /// Compute the objective with reduction.
    ///
    /// With [`Reduction::Mean`] this is `dice + mean(segmentation_edge) + shape_edge`.
    ///
    /// # Shapes
    ///
    /// - output: `[1]`
    ///
    /// # Errors
    ///
    /// Returns an error if the input shapes are incompatible.
    pub fn forward<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
        shape: Tensor<B, 4>,
        reduction: Reduction,
    ) -> EdgeSegLossResult<Tensor<B, 1>> {
        let loss = self.forward_no_reduction(ground_truth, logits, shape)?;
        Ok(match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        })
    }

    /// Compute the mean-reduced objective with a per-term breakdown.
    ///
    /// The map holds `dice`, `segmentation_edge`, `shape_edge`, `shape_selected`
    /// (mean fraction of confident shape pixels) and `total`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input shapes are incompatible or a term is not finite.
    pub fn forward_detailed<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
        shape: Tensor<B, 4>,
    ) -> EdgeSegLossResult<(Tensor<B, 1>, HashMap<String, f64>)> {
        let selected = self
            .shape_edge
            .selected_fraction(shape.clone())
            .mean()
            .into_scalar()
            .to_f64();
        if selected == 0.0 {
            tracing::debug!("no shape confidence above threshold, shape edge term is zero");
        }

        let terms = self.terms(ground_truth, logits, shape)?;
        let segmentation_edge = terms.segmentation_edge.clone().mean();
        let total = terms.dice.clone() + segmentation_edge.clone() + terms.shape_edge.clone();

        let mut loss_dict: HashMap<String, f64> = HashMap::new();
        for (name, term) in [
            ("dice", terms.dice),
            ("segmentation_edge", segmentation_edge),
            ("shape_edge", terms.shape_edge),
            ("total", total.clone()),
        ] {
            let value = term.into_scalar().to_f64();
            if !value.is_finite() {
                tracing::warn!(term = name, value, "non-finite loss term");
                return Err(EdgeSegLossError::NonFinite {
                    term: name.to_owned(),
                    value,
                });
            }
            loss_dict.insert(name.to_owned(), value);
        }
        loss_dict.insert("shape_selected".to_owned(), selected);

        tracing::debug!(
            dice = loss_dict["dice"],
            segmentation_edge = loss_dict["segmentation_edge"],
            shape_edge = loss_dict["shape_edge"],
            shape_selected = selected,
            total = loss_dict["total"],
            "edge segmentation loss",
        );

        Ok((total, loss_dict))
    }

    /// Fix the shape-confidence tensor, giving a two-argument reduced loss.
    pub fn wrap<B: Backend>(
        self,
        shape: Tensor<B, 4>,
        reduction: Reduction,
    ) -> impl Fn(Tensor<B, 4>, Tensor<B, 4>) -> EdgeSegLossResult<Tensor<B, 1>> {
        move |ground_truth, logits| {
            self.forward(ground_truth, logits, shape.clone(), reduction.clone())
        }
    }

    fn terms<B: Backend>(
        &self,
        ground_truth: Tensor<B, 4>,
        logits: Tensor<B, 4>,
        shape: Tensor<B, 4>,
    ) -> EdgeSegLossResult<Terms<B>> {
        Self::validate(&ground_truth, &logits, &shape)?;

        let dice = self
            .dice
            .forward(ground_truth.clone(), logits.clone(), Reduction::Mean)
            .mul_scalar(self.dice_weight);
        let segmentation_edge = self
            .segmentation_edge
            .forward_no_reduction(ground_truth.clone(), logits.clone())
            .mul_scalar(self.segmentation_edge_weight);
        let shape_edge = self
            .shape_edge
            .forward(ground_truth, logits, shape, Reduction::Mean)
            .mul_scalar(self.shape_edge_weight);

        Ok(Terms {
            dice,
            segmentation_edge,
            shape_edge,
        })
    }

    fn validate<B: Backend>(
        ground_truth: &Tensor<B, 4>,
        logits: &Tensor<B, 4>,
        shape: &Tensor<B, 4>,
    ) -> EdgeSegLossResult<()> {
        let gt_dims = ground_truth.dims();
        let pred_dims = logits.dims();
        if gt_dims != pred_dims {
            return Err(EdgeSegLossError::IncompatibleShapes {
                ground_truth: gt_dims.to_vec(),
                prediction: pred_dims.to_vec(),
            });
        }

        let [batch_size, height, width, classes] = pred_dims;
        let shape_dims = shape.dims();
        if shape_dims[..3] != pred_dims[..3] || (shape_dims[3] != 1 && shape_dims[3] != classes) {
            return Err(EdgeSegLossError::IncompatibleShapeConfidence {
                expected: format!("[{batch_size}, {height}, {width}, 1]"),
                actual: shape_dims.to_vec(),
            });
        }

        if height < 2 || width < 2 {
            return Err(EdgeSegLossError::SpatialTooSmall { height, width });
        }

        Ok(())
    }
}

/// Per-pixel objective with the default configuration.
///
/// # Errors
///
/// Returns an error if the input shapes are incompatible.
pub fn loss<B: Backend>(
    ground_truth: Tensor<B, 4>,
    logits: Tensor<B, 4>,
    shape: Tensor<B, 4>,
) -> EdgeSegLossResult<Tensor<B, 4>> {
    EdgeSegLoss::default().forward_no_reduction(ground_truth, logits, shape)
}

/// Fix the shape-confidence tensor of [`loss`], giving a `(ground_truth, logits)` loss.
pub fn loss_wrapper<B: Backend>(
    shape: Tensor<B, 4>,
) -> impl Fn(Tensor<B, 4>, Tensor<B, 4>) -> EdgeSegLossResult<Tensor<B, 4>> {
    let objective = EdgeSegLoss::default();
    move |ground_truth, logits| objective.forward_no_reduction(ground_truth, logits, shape.clone())
}
