use std::fmt;

use burn::{prelude::*, tensor::activation::softmax, tensor::TensorData};
use tracing::trace_span;

use crate::{
    error::{check_same_shape, LossError, Result},
    utils::scalar,
};

/// Marks a ground-truth rotation that is not available, stored in component 0.
pub const GT_UNAVAILABLE: f64 = -1000.0;

pub const DEFAULT_AGREEMENT_TEMPERATURE: f64 = 0.01;

/// How much confident rotation hypotheses disagree with each other.
///
/// `iou_or_miou` is `[batch, hyps]` and scores each hypothesis, `rotations` is
/// `[batch, hyps, k]`. Scores are softmaxed with `temperature` (lower is
/// sharper) and the pairwise distance `1 - <r_i, r_j>^2` is averaged under the
/// outer product of those weights. Returns one value per batch element.
pub fn agreement_score<B: Backend>(
    iou_or_miou: Tensor<B, 2>,
    rotations: Tensor<B, 3>,
    temperature: f64,
) -> Tensor<B, 1> {
    let _span = trace_span!("agreement_score").entered();
    let [batch, hyps] = iou_or_miou.dims();

    let v_conf = softmax(iou_or_miou.div_scalar(temperature), 1);

    let gram = rotations.clone().matmul(rotations.swap_dims(1, 2));
    let distance = gram.powf_scalar(2.0).neg().add_scalar(1.0);

    let v_conf_mask = v_conf
        .clone()
        .reshape([batch, hyps, 1])
        .matmul(v_conf.reshape([batch, 1, hyps]));

    (distance * v_conf_mask)
        .sum_dim(2)
        .sum_dim(1)
        .reshape([batch])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodesicDistance {
    /// Mean of `1 - <pred, target>^2` over the rows with ground truth.
    pub distance: f32,
    /// Number of rows with ground truth.
    pub count: usize,
}

/// Mean geodesic distance over the rows of `[n, k]` rotations whose target is
/// available. Without any such row the distance is 0.
pub fn geodesic_distance<B: Backend>(
    predicted_rotations: Tensor<B, 2>,
    target_rotations: Tensor<B, 2>,
) -> Result<f32> {
    Ok(geodesic_distance_with_count(predicted_rotations, target_rotations)?.distance)
}

pub fn geodesic_distance_with_count<B: Backend>(
    predicted_rotations: Tensor<B, 2>,
    target_rotations: Tensor<B, 2>,
) -> Result<GeodesicDistance> {
    let _span = trace_span!("geodesic_distance").entered();
    check_same_shape(&target_rotations.dims(), &predicted_rotations.dims())?;

    let [n, _] = target_rotations.dims();
    if n == 0 {
        log::warn!("No rotations to evaluate");
        return Ok(GeodesicDistance {
            distance: 0.0,
            count: 0,
        });
    }
    let device = target_rotations.device();

    let rdist = (predicted_rotations * target_rotations.clone())
        .sum_dim(1)
        .reshape([n])
        .powf_scalar(2.0)
        .neg()
        .add_scalar(1.0);

    let valid = valid_rows(&target_rotations);
    let count = valid.len();
    if count == 0 {
        log::warn!("No ground-truth rotations available among {n} samples");
        return Ok(GeodesicDistance {
            distance: 0.0,
            count: 0,
        });
    }

    let indices = Tensor::<B, 1, Int>::from_data(
        TensorData::new(valid.into_iter().map(|i| i as i64).collect(), [count]),
        &device,
    );
    let distance = scalar(rdist.select(0, indices).mean());

    Ok(GeodesicDistance { distance, count })
}

/// Indices of the rows whose ground truth is available.
fn valid_rows<B: Backend>(target_rotations: &Tensor<B, 2>) -> Vec<usize> {
    let [n, _] = target_rotations.dims();
    let unavailable = target_rotations
        .clone()
        .slice([0..n, 0..1])
        .equal_elem(GT_UNAVAILABLE)
        .int()
        .into_data();

    unavailable
        .iter::<i64>()
        .enumerate()
        .filter(|(_, missing)| *missing == 0)
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recall {
    pub retrieved: usize,
    pub num_total: usize,
}

impl Recall {
    pub fn fraction(&self) -> f64 {
        self.retrieved as f64 / self.num_total as f64
    }
}

/// Summary line of a rotation evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicReport {
    pub experiment_name: String,
    pub distance: f32,
    pub matching: usize,
    pub total: usize,
    pub recall: Option<Recall>,
}

impl fmt::Display for GeodesicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:.5} (evaluated on {} matching images out of {})",
            self.experiment_name, self.distance, self.matching, self.total
        )?;
        if let Some(recall) = &self.recall {
            write!(
                f,
                " - Recall: {:.5} ({}/{})",
                recall.fraction(),
                recall.retrieved,
                recall.num_total
            )?;
        }
        Ok(())
    }
}

/// Scores predicted rotations against ground truth and logs the report line.
///
/// `num_total` is the number of samples that should have been predicted; when
/// given, the report includes the fraction that actually were. It must not be 0.
pub fn evaluate_geodesic_distance<B: Backend>(
    experiment_name: &str,
    predicted_rotations: Tensor<B, 2>,
    target_rotations: Tensor<B, 2>,
    num_total: Option<usize>,
) -> Result<GeodesicReport> {
    if num_total == Some(0) {
        return Err(LossError::EmptyRecallTotal);
    }
    let [retrieved, _] = predicted_rotations.dims();
    let [total, _] = target_rotations.dims();

    let gd = geodesic_distance_with_count(predicted_rotations, target_rotations)?;

    let report = GeodesicReport {
        experiment_name: experiment_name.to_owned(),
        distance: gd.distance,
        matching: gd.count,
        total,
        recall: num_total.map(|num_total| Recall {
            retrieved,
            num_total,
        }),
    };
    log::info!("{report}");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    fn quats(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2> {
        let h = std::f32::consts::FRAC_1_SQRT_2;
        Tensor::from_floats(
            [
                [1.0, 0.0, 0.0, 0.0],
                [h, h, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            device,
        )
    }

    #[test]
    fn identical_rotations_have_zero_distance() {
        let device = Default::default();
        let gd = geodesic_distance_with_count(quats(&device), quats(&device)).unwrap();
        assert_approx_eq!(gd.distance, 0.0, 1e-6);
        assert_eq!(gd.count, 3);
    }

    #[test]
    fn antipodal_quaternions_are_the_same_rotation() {
        let device = Default::default();
        let gd = geodesic_distance(quats(&device).neg(), quats(&device)).unwrap();
        assert_approx_eq!(gd, 0.0, 1e-6);
    }

    #[test]
    fn unavailable_targets_are_skipped() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]],
            &device,
        );
        let target = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 1.0, 0.0, 0.0], [-1000.0, 0.0, 0.0, 0.0]],
            &device,
        );

        let gd = geodesic_distance_with_count(pred, target).unwrap();
        assert_eq!(gd.count, 1);
        assert_approx_eq!(gd.distance, 1.0, 1e-6);
    }

    #[test]
    fn no_ground_truth_gives_zero() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 2>::ones([2, 4], &device);
        let target = Tensor::<TestBackend, 2>::from_floats(
            [[-1000.0, 0.0, 0.0, 0.0], [-1000.0, 1.0, 0.0, 0.0]],
            &device,
        );

        let gd = geodesic_distance_with_count(pred, target).unwrap();
        assert_eq!(
            gd,
            GeodesicDistance {
                distance: 0.0,
                count: 0
            }
        );
    }

    #[test]
    fn empty_batch_gives_zero() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 2>::zeros([0, 4], &device);
        let target = Tensor::<TestBackend, 2>::zeros([0, 4], &device);

        let gd = geodesic_distance_with_count(pred.clone(), target.clone()).unwrap();
        assert_eq!(
            gd,
            GeodesicDistance {
                distance: 0.0,
                count: 0
            }
        );

        let report = evaluate_geodesic_distance("empty", pred, target, None).unwrap();
        assert_eq!(
            report.to_string(),
            "[empty] 0.00000 (evaluated on 0 matching images out of 0)"
        );
    }

    #[test]
    fn zero_expected_samples_is_rejected() {
        let device = Default::default();
        let err = evaluate_geodesic_distance("cars", quats(&device), quats(&device), Some(0))
            .unwrap_err();
        assert_eq!(err, LossError::EmptyRecallTotal);
    }

    #[test]
    fn mismatched_rotations_are_rejected() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 2>::ones([2, 4], &device);
        let target = Tensor::<TestBackend, 2>::ones([3, 4], &device);

        let err = geodesic_distance(pred, target).unwrap_err();
        assert_eq!(
            err,
            LossError::ShapeMismatch {
                expected: vec![3, 4],
                actual: vec![2, 4]
            }
        );
    }

    #[test]
    fn report_line_format() {
        let device = Default::default();
        let target = Tensor::<TestBackend, 2>::from_floats(
            [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [-1000.0, 0.0, 0.0, 0.0],
            ],
            &device,
        );
        let pred = Tensor::<TestBackend, 2>::from_floats(
            [
                [1.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
            ],
            &device,
        );

        let report =
            evaluate_geodesic_distance("cars", pred.clone(), target.clone(), Some(4)).unwrap();
        assert_eq!(
            report.to_string(),
            "[cars] 0.50000 (evaluated on 2 matching images out of 3) - Recall: 0.75000 (3/4)"
        );

        let report = evaluate_geodesic_distance("cars", pred, target, None).unwrap();
        assert_eq!(
            report.to_string(),
            "[cars] 0.50000 (evaluated on 2 matching images out of 3)"
        );
    }

    #[test]
    fn single_hypothesis_always_agrees() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 2>::from_floats([[0.3], [0.9]], &device);
        let rotations = quats(&device).slice([0..2, 0..4]).reshape([2, 1, 4]);

        let agreement = agreement_score(scores, rotations, DEFAULT_AGREEMENT_TEMPERATURE)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(agreement.len(), 2);
        for v in agreement {
            assert_approx_eq!(v, 0.0, 1e-6);
        }
    }

    #[test]
    fn disagreement_is_weighted_by_confidence() {
        let device = Default::default();
        // Two orthogonal hypotheses, so every off-diagonal distance is 1.
        let rotations = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]]],
            &device,
        );

        // Equal confidence: 2 * 0.5 * 0.5.
        let even = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5]], &device);
        let agreement = agreement_score(even, rotations.clone(), DEFAULT_AGREEMENT_TEMPERATURE)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_approx_eq!(agreement[0], 0.5, 1e-5);

        // One hypothesis dominates after the sharp softmax.
        let skewed = Tensor::<TestBackend, 2>::from_floats([[0.9, 0.1]], &device);
        let agreement = agreement_score(skewed, rotations, DEFAULT_AGREEMENT_TEMPERATURE)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(agreement[0] < 1e-4);
    }
}
