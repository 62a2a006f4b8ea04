use thiserror::Error;

/// Errors returned by spacetree operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpaceTreeError {
    #[error("spacetree: dataset has no points")]
    EmptyDataset,

    #[error("spacetree: points must have at least one dimension")]
    ZeroDimension,

    #[error("spacetree: row {row} has {got} values, want {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("spacetree: {len} values cannot be split into points of dimension {dim}")]
    ShapeMismatch { len: usize, dim: usize },
}
