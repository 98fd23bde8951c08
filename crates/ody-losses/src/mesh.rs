use burn::{prelude::*, tensor::TensorData};
use tracing::trace_span;

use crate::error::{LossError, Result};

/// Face connectivity of a triangle mesh, as consumed by [`loss_flat`].
pub trait FaceAdjacency<B: Backend> {
    fn face_count(&self) -> usize;

    /// `[num_faces, 3]` indices of the face across each edge.
    fn face_neighbors(&self) -> Tensor<B, 2, Int>;
}

/// Caller provided faces and face adjacency.
///
/// Boundary edges have no neighbor. Mesh libraries mark those with a sentinel
/// (often `-1`), which has to be replaced before building the topology, usually
/// by pointing the edge back at the face itself.
#[derive(Debug, Clone)]
pub struct FaceTopology<B: Backend> {
    num_faces: usize,
    ff: Tensor<B, 2, Int>,
}

impl<B: Backend> FaceTopology<B> {
    pub fn new(faces: &[[i64; 3]], ff: &[[i64; 3]], device: &B::Device) -> Result<Self> {
        if faces.len() != ff.len() {
            return Err(LossError::ShapeMismatch {
                expected: vec![faces.len(), 3],
                actual: vec![ff.len(), 3],
            });
        }

        let num_faces = faces.len();
        for (face, neighbors) in ff.iter().enumerate() {
            if let Some(&index) = neighbors
                .iter()
                .find(|&&i| i < 0 || i as usize >= num_faces)
            {
                return Err(LossError::AdjacencyOutOfRange {
                    face,
                    index,
                    num_faces,
                });
            }
        }

        Ok(Self {
            num_faces,
            ff: int_table(ff, device),
        })
    }
}

fn int_table<B: Backend>(rows: &[[i64; 3]], device: &B::Device) -> Tensor<B, 2, Int> {
    let values = rows.iter().flatten().copied().collect::<Vec<_>>();
    Tensor::from_data(TensorData::new(values, [rows.len(), 3]), device)
}

impl<B: Backend> FaceAdjacency<B> for FaceTopology<B> {
    fn face_count(&self) -> usize {
        self.num_faces
    }

    fn face_neighbors(&self) -> Tensor<B, 2, Int> {
        self.ff.clone()
    }
}

/// Smoothness regularizer on per-face normals.
///
/// `norms` is `[batch, num_faces, 3]` of unit normals. Each face is compared to
/// its three neighbors with `(cos - 1)^2`, and the result is scaled by
/// `num_faces / 2` since every edge is visited from both sides. A mesh without
/// faces has no neighboring pairs and gives 0.
pub fn loss_flat<B: Backend, M: FaceAdjacency<B>>(mesh: &M, norms: Tensor<B, 3>) -> Tensor<B, 1> {
    let _span = trace_span!("loss_flat").entered();

    let ff = mesh.face_neighbors();
    let [num_faces, _] = ff.dims();

    let mut loss = Tensor::<B, 1>::zeros([1], &norms.device());
    if num_faces == 0 {
        return loss;
    }
    for edge in 0..3 {
        let neighbors = ff
            .clone()
            .slice([0..num_faces, edge..edge + 1])
            .reshape([num_faces]);
        let neighbor_norms = norms.clone().select(1, neighbors);

        let cos = (norms.clone() * neighbor_norms).sum_dim(2);
        loss = loss + cos.sub_scalar(1.0).powf_scalar(2.0).mean();
    }

    loss * (mesh.face_count() as f64 / 2.0)
}
