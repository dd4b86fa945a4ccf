//! # Reflect Padding
//!
//! Mirror padding that excludes the border sample, e.g. `[a, b, c]` padded by one
//! becomes `[b, a, b, c, b]`.

use burn::{prelude::*, tensor::TensorData};

/// Source index for every position of a reflect-padded axis.
fn reflect_indices(len: usize, pad: usize) -> Vec<i64> {
    let last = len as i64 - 1;
    (0..len + 2 * pad)
        .map(|j| {
            let src = j as i64 - pad as i64;
            if src < 0 {
                -src
            } else if src > last {
                2 * last - src
            } else {
                src
            }
        })
        .collect()
}

fn reflect_axis<B: Backend>(tensor: Tensor<B, 4>, dim: usize, pad: usize) -> Tensor<B, 4> {
    if pad == 0 {
        return tensor;
    }

    let len = tensor.dims()[dim];
    assert!(
        pad < len,
        "Reflect padding of {pad} requires at least {} elements on axis {dim}, got {len}",
        pad + 1
    );

    let indices = reflect_indices(len, pad);
    let count = indices.len();
    let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [count]), &tensor.device());

    tensor.select(dim, indices)
}

/// Reflect-pad the two spatial axes of a `[batch, channels, height, width]` tensor.
///
/// # Panics
///
/// If a padding amount is not smaller than the padded axis.
pub fn reflect_pad<B: Backend>(tensor: Tensor<B, 4>, pad_h: usize, pad_w: usize) -> Tensor<B, 4> {
    let tensor = reflect_axis(tensor, 2, pad_h);
    reflect_axis(tensor, 3, pad_w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn reflect_indices_mirror_without_border() {
        assert_eq!(reflect_indices(3, 1), vec![1, 0, 1, 2, 1]);
        assert_eq!(reflect_indices(4, 2), vec![2, 1, 0, 1, 2, 3, 2, 1]);
        assert_eq!(reflect_indices(2, 1), vec![1, 0, 1, 0]);
    }

    #[test]
    fn reflect_pad_matches_manual_layout() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]]]),
            &device,
        );

        let padded = reflect_pad(tensor, 1, 1);
        assert_eq!(padded.dims(), [1, 1, 4, 5]);

        let values = padded.into_data().to_vec::<f32>().unwrap();
        #[rustfmt::skip]
        let expected = vec![
            5.0, 4.0, 5.0, 6.0, 5.0,
            2.0, 1.0, 2.0, 3.0, 2.0,
            5.0, 4.0, 5.0, 6.0, 5.0,
            2.0, 1.0, 2.0, 3.0, 2.0,
        ];
        assert_eq!(values, expected);
    }

    #[test]
    fn reflect_pad_zero_is_identity() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::ones([1, 2, 3, 3], &device);
        assert_eq!(reflect_pad(tensor, 0, 0).dims(), [1, 2, 3, 3]);
    }

    #[test]
    #[should_panic = "Reflect padding of 1 requires at least 2 elements"]
    fn reflect_pad_single_row_panics() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::ones([1, 1, 1, 3], &device);
        let _padded = reflect_pad(tensor, 1, 1);
    }
}
