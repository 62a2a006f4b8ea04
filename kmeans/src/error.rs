use giztoy_spacetree::SpaceTreeError;
use thiserror::Error;

/// Errors returned by kmeans operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KMeansError {
    #[error("kmeans: no centroids given")]
    NoCentroids,

    #[error("kmeans: dataset has no points")]
    EmptyDataset,

    #[error("kmeans: {k} clusters requested for {n} points")]
    TooManyClusters { k: usize, n: usize },

    #[error("kmeans: dimension mismatch: got {got}, want {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("kmeans: centroid count changed: got {got}, want {expected}")]
    CentroidCountChanged { expected: usize, got: usize },

    #[error(transparent)]
    Tree(#[from] SpaceTreeError),
}
