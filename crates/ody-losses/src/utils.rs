use burn::{prelude::*, tensor::ElementConversion};

use crate::error::{LossError, Result};

/// Sums over the last two (spatial) dimensions and drops them.
pub(crate) fn sum_spatial<B: Backend, const D: usize, const D2: usize>(
    tensor: Tensor<B, D>,
) -> Result<Tensor<B, D2>> {
    sum_trailing(tensor, 2)
}

/// Sums over the last `count` dimensions and drops them.
pub(crate) fn sum_trailing<B: Backend, const D: usize, const D2: usize>(
    tensor: Tensor<B, D>,
    count: usize,
) -> Result<Tensor<B, D2>> {
    check_rank(D, D2, count)?;
    let dims = tensor.shape();
    let batch_dims = Shape::from(dims.dims[..dims.num_dims() - count].to_vec());
    let summed = (D - count..D).fold(tensor, |t, dim| t.sum_dim(dim));
    Ok(summed.reshape::<D2, _>(batch_dims))
}

/// Sums over the last two dimensions, keeping them with size 1.
pub(crate) fn sum_spatial_keepdim<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor.sum_dim(D - 1).sum_dim(D - 2)
}

pub(crate) fn check_rank(input: usize, output: usize, reduced: usize) -> Result<()> {
    if input < reduced || input - reduced != output || output == 0 {
        return Err(LossError::RankMismatch {
            input,
            output,
            expected: input.saturating_sub(reduced),
        });
    }
    Ok(())
}

/// Reads a single element tensor back to the host.
pub(crate) fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}
