//! Edge-aware loss functions for multi-class image segmentation.
//!
//! This crate provides the training objective of a segmentation network with an
//! auxiliary shape (edge) stream, written against the Burn deep learning framework.
//! Every loss is backend-agnostic and differentiable on any `AutodiffBackend`.
//!
//! ## Loss Functions
//!
//! - **[`GeneralisedDiceLoss`]**: class-weighted soft Dice dissimilarity
//! - **[`SegmentationEdgeLoss`]**: penalises mismatched Sobel edge strength between the
//!   ground truth and a Gumbel-softmax relaxed prediction
//! - **[`ShapeEdgeLoss`]**: generalised Dice restricted to pixels the shape stream is
//!   confident about
//! - **[`EdgeSegLoss`]**: the sum of the three terms
//!
//! ## Tensor Layout
//!
//! All maps are channel-last, `[batch, height, width, classes]`. Ground truth is
//! one-hot, predictions are raw logits and the shape confidence is
//! `[batch, height, width, 1]`.
//!
//! ## Usage Example
//!
//! ```rust
//! use burn::{nn::loss::Reduction, prelude::*};
//! use edgeseg_loss::{EdgeSegLossConfig, EdgeSegLossResult};
//!
//! fn training_loss<B: Backend>(
//!     ground_truth: Tensor<B, 4>,
//!     logits: Tensor<B, 4>,
//!     shape: Tensor<B, 4>,
//! ) -> EdgeSegLossResult<Tensor<B, 1>> {
//!     let objective = EdgeSegLossConfig::new().init();
//!     objective.forward(ground_truth, logits, shape, Reduction::Mean)
//! }
//! ```
//!
//! Individual terms follow Burn's loss conventions: `forward_no_reduction` keeps
//! the per-sample (or per-pixel) shape and `forward` applies a [`Reduction`].
//!
//! [`Reduction`]: burn::nn::loss::Reduction

mod dice;
mod error;
mod objective;
mod segmentation_edge;
mod shape_edge;

pub use dice::{GeneralisedDiceLoss, GeneralisedDiceLossConfig, generalised_dice};
pub use error::{ConfigFileError, EdgeSegLossError, EdgeSegLossResult};
pub use objective::{EdgeSegLoss, EdgeSegLossConfig, loss, loss_wrapper};
pub use segmentation_edge::{
    SegmentationEdgeLoss, SegmentationEdgeLossConfig, segmentation_edge_loss,
};
pub use shape_edge::{ShapeEdgeLoss, ShapeEdgeLossConfig, shape_edge_loss};

// Re-export the edge primitives the losses are configured with
pub use edgeseg_ops::EdgeNormalization;
