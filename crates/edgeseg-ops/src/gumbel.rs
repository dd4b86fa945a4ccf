//! # Gumbel-Softmax
//!
//! Continuous relaxation of drawing a class from categorical logits. Uniform noise
//! is turned into Gumbel noise, added to the logits and pushed through a tempered
//! softmax over the trailing axis:
//!
//! ```text
//! g   = -ln(eps - ln(u + eps)),   u ~ U(0, 1)
//! out = softmax((logits + g) / tau)
//! ```

use burn::{
    prelude::*,
    tensor::{Distribution, activation::softmax},
};

/// Configuration for the `GumbelSoftmax` operation.
#[derive(Config, Debug)]
pub struct GumbelSoftmaxConfig {
    /// Softmax temperature.
    #[config(default = "1.0")]
    pub tau: f64,
    /// Offset keeping both logarithms finite.
    #[config(default = "1e-8")]
    pub eps: f64,
}

impl GumbelSoftmaxConfig {
    /// Initializes a new `GumbelSoftmax` operation.
    pub fn init(&self) -> GumbelSoftmax {
        assert!(
            self.tau > 0.0,
            "Temperature for GumbelSoftmax must be positive, got {}",
            self.tau
        );
        assert!(
            self.eps > 0.0,
            "Epsilon for GumbelSoftmax must be positive, got {}",
            self.eps
        );
        GumbelSoftmax {
            tau: self.tau,
            eps: self.eps,
        }
    }
}

/// Gumbel-softmax relaxation.
#[derive(Module, Clone, Debug)]
pub struct GumbelSoftmax {
    tau: f64,
    eps: f64,
}

impl Default for GumbelSoftmax {
    fn default() -> Self {
        GumbelSoftmaxConfig::new().init()
    }
}

impl GumbelSoftmax {
    /// Relax the logits with freshly drawn noise.
    ///
    /// # Shapes
    /// - input: `[..., classes]`
    /// - output: `[..., classes]`, summing to one over the last axis
    pub fn forward<B: Backend, const D: usize>(&self, logits: Tensor<B, D>) -> Tensor<B, D> {
        let uniform = Tensor::random(logits.shape(), Distribution::Default, &logits.device());
        self.forward_with_noise(logits, uniform)
    }

    /// Relax the logits with a given uniform draw of the same shape.
    pub fn forward_with_noise<B: Backend, const D: usize>(
        &self,
        logits: Tensor<B, D>,
        uniform: Tensor<B, D>,
    ) -> Tensor<B, D> {
        assert_eq!(
            logits.dims(),
            uniform.dims(),
            "Noise shape must match logits shape"
        );

        let gumbel = uniform
            .add_scalar(self.eps)
            .log()
            .neg()
            .add_scalar(self.eps)
            .log()
            .neg();

        softmax((logits + gumbel).div_scalar(self.tau), D - 1)
    }
}

/// Gumbel-softmax with the given temperature and epsilon.
pub fn gumbel_softmax<B: Backend, const D: usize>(
    logits: Tensor<B, D>,
    tau: f64,
    eps: f64,
) -> Tensor<B, D> {
    GumbelSoftmaxConfig::new()
        .with_tau(tau)
        .with_eps(eps)
        .init()
        .forward(logits)
}

/// Gumbel-softmax with an explicit uniform draw.
pub fn gumbel_softmax_with_noise<B: Backend, const D: usize>(
    logits: Tensor<B, D>,
    uniform: Tensor<B, D>,
    tau: f64,
    eps: f64,
) -> Tensor<B, D> {
    GumbelSoftmaxConfig::new()
        .with_tau(tau)
        .with_eps(eps)
        .init()
        .forward_with_noise(logits, uniform)
}
