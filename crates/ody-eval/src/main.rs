use anyhow::Context;
use burn::{
    backend::NdArray,
    tensor::{Tensor, TensorData},
};
use safetensors::{tensor::Dtype, SafeTensors};

use ody_losses::evaluate_geodesic_distance;

type Backend = NdArray;
type Device = <NdArray as burn::prelude::Backend>::Device;

const USAGE: &str = "usage: ody_eval_bin <rotations.safetensors> <experiment-name> [num-total]";

/// Reads an `[n, k]` f32 tensor of rotations.
fn load_rotations(
    tensors: &SafeTensors,
    name: &str,
    device: &Device,
) -> anyhow::Result<Tensor<Backend, 2>> {
    let view = tensors
        .tensor(name)
        .with_context(|| format!("missing tensor '{name}'"))?;

    if view.dtype() != Dtype::F32 {
        anyhow::bail!("'{name}' must be f32, found {:?}", view.dtype());
    }
    let shape = view.shape();
    if shape.len() != 2 {
        anyhow::bail!("'{name}' must be [samples, k], found {shape:?}");
    }

    let values = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect::<Vec<_>>();

    Ok(Tensor::from_data(
        TensorData::new(values, [shape[0], shape[1]]),
        device,
    ))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let path = args.next().context(USAGE)?;
    let experiment_name = args.next().context(USAGE)?;
    let num_total = args
        .next()
        .map(|n| n.parse::<usize>())
        .transpose()
        .context("num-total must be a sample count")?;

    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {path}"))?;
    let tensors = SafeTensors::deserialize(&bytes)?;

    let device = Device::default();
    let predicted = load_rotations(&tensors, "predicted", &device)?;
    let target = load_rotations(&tensors, "target", &device)?;

    let report = evaluate_geodesic_distance(&experiment_name, predicted, target, num_total)?;
    println!("{report}");
    Ok(())
}
