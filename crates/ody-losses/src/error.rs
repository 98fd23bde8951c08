use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LossError {
    #[error("Unexpected gan_mode {0}")]
    UnknownGanMode(String),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("cannot reduce a rank {input} tensor to rank {output}, expected rank {expected}")]
    RankMismatch {
        input: usize,
        output: usize,
        expected: usize,
    },

    #[error("got {actual} {what} for {expected} discriminator scales")]
    ScaleCountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("no discriminator outputs to score")]
    NoPredictions,

    #[error("recall needs at least one expected sample")]
    EmptyRecallTotal,

    #[error("The generator's hinge loss must be aiming for real")]
    GeneratorHingeTarget,

    #[error("face {face} has neighbor index {index}, but the mesh only has {num_faces} faces")]
    AdjacencyOutOfRange {
        face: usize,
        index: i64,
        num_faces: usize,
    },
}

pub type Result<T> = std::result::Result<T, LossError>;

pub(crate) fn check_same_shape(expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(LossError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}
