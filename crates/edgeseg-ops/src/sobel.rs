//! Sobel gradient filtering
//!
//! Computes the vertical and horizontal Sobel responses of every channel of a
//! channel-last image batch. Borders are handled with reflect padding so the output
//! keeps the input's spatial size.

use burn::tensor::{Tensor, backend::Backend, module::conv2d, ops::ConvOptions};

use crate::padding::reflect_pad;

#[rustfmt::skip]
const SOBEL: [f32; 18] = [
    // d/dy
    -1.0, -2.0, -1.0,
     0.0,  0.0,  0.0,
     1.0,  2.0,  1.0,
    // d/dx
    -1.0,  0.0,  1.0,
    -2.0,  0.0,  2.0,
    -1.0,  0.0,  1.0,
];

/// The two 3x3 Sobel kernels `(dy, dx)` as a `[2, 1, 3, 3]` tensor.
pub fn sobel_kernels<B: Backend>(device: &B::Device) -> Tensor<B, 4> {
    Tensor::<B, 1>::from_floats(SOBEL, device).reshape([2, 1, 3, 3])
}

/// Sobel edge maps of a channel-last image batch.
///
/// # Shapes
/// - input: `[batch, height, width, channels]`
/// - output: `[batch, height, width, channels, 2]`, the last axis holding `(dy, dx)`
///
/// # Panics
///
/// If either spatial axis is shorter than 2, since reflect padding needs a
/// neighbour to mirror.
pub fn sobel_edges<B: Backend>(tensor: Tensor<B, 4>) -> Tensor<B, 5> {
    let [batch, height, width, channels] = tensor.dims();
    assert!(
        height >= 2 && width >= 2,
        "Sobel edges require spatial size >= 2x2, got [{height}x{width}]"
    );
    let device = tensor.device();

    // Depthwise convolution: group g owns output channels 2g (dy) and 2g + 1 (dx)
    let weight = Tensor::cat(vec![sobel_kernels::<B>(&device); channels], 0);

    let padded = reflect_pad(tensor.permute([0, 3, 1, 2]), 1, 1);
    let options = ConvOptions::new([1, 1], [0, 0], [1, 1], channels);
    let gradients = conv2d(padded, weight, None, options);

    gradients
        .reshape([batch, channels, 2, height, width])
        .permute([0, 3, 4, 1, 2])
}
