use burn::prelude::*;
use tracing::trace_span;

use crate::{
    error::{check_same_shape, Result},
    utils::{sum_spatial, sum_spatial_keepdim, sum_trailing},
};

const EPS: f64 = 1e-6;

/// Per-map IoU of two alpha maps after thresholding both at 0.5.
///
/// The last two dimensions are reduced, so `D2` must be `D - 2`.
pub fn mean_iou_noreduce<B: Backend, const D: usize, const D2: usize>(
    alpha_pred: Tensor<B, D>,
    alpha_real: Tensor<B, D>,
) -> Result<Tensor<B, D2>> {
    let _span = trace_span!("mean_iou_noreduce").entered();
    check_same_shape(&alpha_real.dims(), &alpha_pred.dims())?;

    let pred = alpha_pred.greater_elem(0.5).float();
    let real = alpha_real.greater_elem(0.5).float();

    let intersection = sum_spatial::<B, D, D2>(pred.clone() * real.clone())?;
    let union = sum_spatial::<B, D, D2>(pred.max_pair(real))?;

    Ok(intersection / union.add_scalar(EPS))
}

/// Soft IoU over `[.., C, H, W]` masks, averaged over channels. `D2` must be `D - 3`.
///
/// With `balanced`, every non-empty target channel gets the same vote and empty
/// channels are ignored. A sample whose target channels are all empty has
/// nothing to vote and comes out as NaN. Without `balanced`, intersections and
/// unions are pooled over channels first.
pub fn mean_miou_noreduce<B: Backend, const D: usize, const D2: usize>(
    pred: Tensor<B, D>,
    target: Tensor<B, D>,
    balanced: bool,
) -> Result<Tensor<B, D2>> {
    let _span = trace_span!("mean_miou_noreduce").entered();
    check_same_shape(&target.dims(), &pred.dims())?;

    let intersection = pred.clone().min_pair(target.clone());
    let union = pred.max_pair(target.clone());

    if balanced {
        // Per-channel values, with the spatial dims kept at size 1.
        let iou = sum_spatial_keepdim(intersection) / sum_spatial_keepdim(union).add_scalar(EPS);
        let wts = sum_spatial_keepdim(target).greater_elem(EPS).float();
        Ok(sum_trailing::<B, D, D2>(iou * wts.clone(), 3)? / sum_trailing::<B, D, D2>(wts, 3)?)
    } else {
        Ok(sum_trailing::<B, D, D2>(intersection, 3)?
            / sum_trailing::<B, D, D2>(union, 3)?.add_scalar(EPS))
    }
}
