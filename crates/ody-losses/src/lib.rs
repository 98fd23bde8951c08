//! Losses and metrics for training and scoring mesh reconstruction and pose
//! estimation models on burn backends.

pub mod error;
pub mod gan;
pub mod iou;
pub mod laplacian;
pub mod mesh;
pub mod rotation;

pub(crate) mod utils;

pub use error::{LossError, Result};
pub use gan::{DiscriminatorOutput, GanLoss, GanLossConfig, GanMode};
pub use iou::{mean_iou_noreduce, mean_miou_noreduce};
pub use laplacian::{LaplacianLoss, LaplacianLossConfig};
pub use mesh::{loss_flat, FaceAdjacency, FaceTopology};
pub use rotation::{
    agreement_score, evaluate_geodesic_distance, geodesic_distance, geodesic_distance_with_count,
    GeodesicDistance, GeodesicReport, Recall, DEFAULT_AGREEMENT_TEMPERATURE, GT_UNAVAILABLE,
};
