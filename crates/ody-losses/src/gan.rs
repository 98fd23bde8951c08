use std::{fmt, str::FromStr};

use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
    tensor::activation::log_sigmoid,
};
use serde::{Deserialize, Serialize};
use tracing::trace_span;

use crate::error::{self, check_same_shape, LossError};

/// Adversarial objective used by [`GanLoss`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GanMode {
    /// Least squares against the target label.
    #[serde(rename = "ls")]
    LeastSquares,
    /// Binary cross entropy on logits.
    #[serde(rename = "original")]
    Original,
    /// Wasserstein critic score.
    #[serde(rename = "w")]
    Wasserstein,
    #[serde(rename = "hinge")]
    Hinge,
}

impl GanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GanMode::LeastSquares => "ls",
            GanMode::Original => "original",
            GanMode::Wasserstein => "w",
            GanMode::Hinge => "hinge",
        }
    }
}

impl FromStr for GanMode {
    type Err = LossError;

    fn from_str(s: &str) -> error::Result<Self> {
        match s {
            "ls" => Ok(GanMode::LeastSquares),
            "original" => Ok(GanMode::Original),
            "w" => Ok(GanMode::Wasserstein),
            "hinge" => Ok(GanMode::Hinge),
            other => Err(LossError::UnknownGanMode(other.to_owned())),
        }
    }
}

impl fmt::Display for GanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Config, Debug)]
pub struct GanLossConfig {
    gan_mode: GanMode,

    #[config(default = "1.0")]
    target_real_label: f64,

    #[config(default = "0.0")]
    target_fake_label: f64,
}

impl GanLossConfig {
    /// Config for a mode given by name (`ls`, `original`, `w` or `hinge`).
    pub fn from_mode_name(gan_mode: &str) -> error::Result<Self> {
        Ok(Self::new(gan_mode.parse()?))
    }

    pub fn init(&self) -> GanLoss {
        GanLoss {
            gan_mode: self.gan_mode,
            real_label: self.target_real_label,
            fake_label: self.target_fake_label,
        }
    }
}

/// Prediction of one discriminator scale.
#[derive(Debug, Clone)]
pub enum DiscriminatorOutput<B: Backend> {
    Prediction(Tensor<B, 4>),
    /// Intermediate features followed by the final prediction.
    Features(Vec<Tensor<B, 4>>),
}

impl<B: Backend> DiscriminatorOutput<B> {
    fn into_prediction(self) -> Option<Tensor<B, 4>> {
        match self {
            DiscriminatorOutput::Prediction(pred) => Some(pred),
            DiscriminatorOutput::Features(mut features) => features.pop(),
        }
    }
}

impl<B: Backend> From<Tensor<B, 4>> for DiscriminatorOutput<B> {
    fn from(pred: Tensor<B, 4>) -> Self {
        DiscriminatorOutput::Prediction(pred)
    }
}

/// Adversarial loss for discriminator outputs of shape `[batch, C, H, W]`,
/// with optional output masks and per-scale weights.
#[derive(Debug, Clone)]
pub struct GanLoss {
    gan_mode: GanMode,
    real_label: f64,
    fake_label: f64,
}

impl GanLoss {
    /// Constant label tensor shaped like `input`. Never tracked by autodiff.
    pub fn target_tensor<B: Backend, const D: usize>(
        &self,
        input: &Tensor<B, D>,
        target_is_real: bool,
    ) -> Tensor<B, D> {
        let label = if target_is_real {
            self.real_label
        } else {
            self.fake_label
        };
        input.full_like(label).detach()
    }

    pub fn zero_tensor<B: Backend, const D: usize>(&self, input: &Tensor<B, D>) -> Tensor<B, D> {
        input.zeros_like().detach()
    }

    /// Mean of `x`, scaled by `weight`.
    ///
    /// With a mask, each sample is averaged over its masked elements first and
    /// the per-sample values are then averaged over the batch.
    pub fn mean<B: Backend>(
        &self,
        x: Tensor<B, 4>,
        mask: Option<Tensor<B, 4>>,
        weight: Option<f64>,
    ) -> error::Result<Tensor<B, 1>> {
        let weight = weight.unwrap_or(1.0);

        let Some(mask) = mask else {
            return Ok(x.mean().mul_scalar(weight));
        };

        check_same_shape(&x.dims(), &mask.dims())?;
        let [batch, _, _, _] = x.dims();

        let masked = (x * mask.clone()).reshape([batch as i32, -1]).sum_dim(1);
        let area = mask.reshape([batch as i32, -1]).sum_dim(1);
        Ok((masked / area).mean().mul_scalar(weight))
    }

    /// Loss of a single prediction. Masks and weights only apply to the hinge
    /// objective.
    pub fn loss<B: Backend>(
        &self,
        input: Tensor<B, 4>,
        target_is_real: bool,
        for_discriminator: bool,
        mask: Option<Tensor<B, 4>>,
        weight: Option<f64>,
    ) -> error::Result<Tensor<B, 1>> {
        match self.gan_mode {
            GanMode::Original => {
                let target = self.target_tensor(&input, target_is_real);
                Ok(bce_with_logits(input, target))
            }
            GanMode::LeastSquares => {
                let target = self.target_tensor(&input, target_is_real);
                Ok(MseLoss::new().forward(input, target, Reduction::Mean))
            }
            GanMode::Hinge if for_discriminator => {
                let zero = self.zero_tensor(&input);
                let minval = if target_is_real {
                    input.sub_scalar(1.0).min_pair(zero)
                } else {
                    input.neg().sub_scalar(1.0).min_pair(zero)
                };
                Ok(self.mean(minval, mask, weight)?.neg())
            }
            GanMode::Hinge => {
                if !target_is_real {
                    return Err(LossError::GeneratorHingeTarget);
                }
                Ok(self.mean(input, mask, weight)?.neg())
            }
            GanMode::Wasserstein => {
                if target_is_real {
                    Ok(input.mean().neg())
                } else {
                    Ok(input.mean())
                }
            }
        }
    }

    /// Loss of a single discriminator prediction.
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
        target_is_real: bool,
        for_discriminator: bool,
        mask: Option<Tensor<B, 4>>,
    ) -> error::Result<Tensor<B, 1>> {
        let _span = trace_span!("GanLoss", mode = self.gan_mode.as_str()).entered();
        self.loss(input, target_is_real, for_discriminator, mask, None)
    }

    /// Loss over the outputs of a multi-scale discriminator.
    ///
    /// `masks` and `weights`, when given, hold one entry per scale. The summed
    /// per-scale losses are normalized by the number of scales, or by the sum
    /// of the weights when weights are given.
    pub fn forward_multi_scale<B: Backend>(
        &self,
        input: Vec<DiscriminatorOutput<B>>,
        target_is_real: bool,
        for_discriminator: bool,
        masks: Option<Vec<Tensor<B, 4>>>,
        weights: Option<&[f64]>,
    ) -> error::Result<Tensor<B, 1>> {
        let _span = trace_span!("GanLoss multi-scale", mode = self.gan_mode.as_str()).entered();

        let num_scales = input.len();
        if num_scales == 0 {
            return Err(LossError::NoPredictions);
        }
        if let Some(masks) = &masks {
            check_scale_count("masks", num_scales, masks.len())?;
        }
        if let Some(weights) = weights {
            check_scale_count("weights", num_scales, weights.len())?;
        }

        let mut masks = masks.map(|masks| masks.into_iter());
        let mut total: Option<Tensor<B, 1>> = None;

        for (idx, pred) in input.into_iter().enumerate() {
            let pred = pred.into_prediction().ok_or(LossError::NoPredictions)?;
            let mask = masks.as_mut().and_then(|masks| masks.next());
            let weight = weights.map(|weights| weights[idx]);

            let loss = self.loss(pred, target_is_real, for_discriminator, mask, weight)?;

            // One value per batch row.
            let [bs] = loss.dims();
            let loss = loss.reshape([bs as i32, -1]).mean_dim(1).reshape([bs]);

            total = Some(match total {
                Some(total) => total + loss,
                None => loss,
            });
        }

        let norm = match weights {
            Some(weights) => weights.iter().sum(),
            None => num_scales as f64,
        };
        log::debug!("GAN loss over {num_scales} scales, normalized by {norm}");

        let total = total.ok_or(LossError::NoPredictions)?;
        Ok(total.div_scalar(norm))
    }
}

fn check_scale_count(what: &'static str, expected: usize, actual: usize) -> error::Result<()> {
    if expected != actual {
        return Err(LossError::ScaleCountMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Mean binary cross entropy of `logits` against soft `targets`.
fn bce_with_logits<B: Backend>(logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
    let ones = targets.ones_like();
    let pos = log_sigmoid(logits.clone()) * targets.clone();
    let neg = log_sigmoid(logits.neg()) * (ones - targets);
    (pos + neg).mean().neg()
}
