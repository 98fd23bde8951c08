use burn::prelude::*;
use tracing::trace_span;

#[derive(Config, Debug)]
pub struct LaplacianLossConfig {
    /// Reduce to the batch average instead of one value per sample.
    #[config(default = false)]
    average: bool,
}

impl LaplacianLossConfig {
    /// Returns the loss holding `laplacian`, a `[V, V]` operator over mesh vertices.
    pub fn init<B: Backend>(&self, laplacian: Tensor<B, 2>) -> LaplacianLoss<B> {
        LaplacianLoss {
            laplacian,
            average: self.average,
        }
    }
}

/// Squared norm of `L x` for vertex data `x`, penalizing non-smooth deformations.
#[derive(Module, Debug)]
pub struct LaplacianLoss<B: Backend> {
    laplacian: Tensor<B, 2>,
    average: bool,
}

impl<B: Backend> LaplacianLoss<B> {
    /// `x` is `[batch, V, k]`. Returns `[batch]`, or `[1]` when averaging.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 1> {
        let _span = trace_span!("LaplacianLoss").entered();
        let [batch, _, _] = x.dims();
        let [rows, cols] = self.laplacian.dims();

        let laplacian = self
            .laplacian
            .clone()
            .unsqueeze::<3>()
            .expand([batch, rows, cols]);

        let x = laplacian
            .matmul(x)
            .powf_scalar(2.0)
            .sum_dim(2)
            .sum_dim(1)
            .reshape([batch]);

        if self.average {
            x.sum().div_scalar(batch as f64)
        } else {
            x
        }
    }
}
