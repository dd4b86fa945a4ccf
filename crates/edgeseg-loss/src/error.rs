//! Error types for the edge-aware segmentation objective.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while evaluating [`EdgeSegLoss`](crate::EdgeSegLoss).
#[derive(Debug, Error)]
pub enum EdgeSegLossError {
    /// Ground truth and prediction differ in shape
    #[error("incompatible tensor shapes: ground truth {ground_truth:?} does not match prediction {prediction:?}")]
    IncompatibleShapes {
        ground_truth: Vec<usize>,
        prediction: Vec<usize>,
    },

    /// Shape-confidence tensor cannot be broadcast onto the prediction
    #[error("incompatible shape confidence: expected {expected}, got {actual:?}")]
    IncompatibleShapeConfidence { expected: String, actual: Vec<usize> },

    /// Images too small for the 3x3 edge operator
    #[error("edge terms need spatial size >= 2x2, got [{height}x{width}]")]
    SpatialTooSmall { height: usize, width: usize },

    /// A loss term evaluated to NaN or infinity
    #[error("loss term '{term}' is not finite: {value}")]
    NonFinite { term: String, value: f64 },
}

/// Errors raised while persisting an [`EdgeSegLossConfig`](crate::EdgeSegLossConfig).
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Reading or writing the file failed.
    #[error("failed to access config file: {path}")]
    Io {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file content is not a valid configuration.
    #[error("invalid config JSON in {path}")]
    Json {
        /// The config file path.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// A specialized `Result` type for loss evaluation.
pub type EdgeSegLossResult<T> = Result<T, EdgeSegLossError>;
