//! Lloyd k-means with a dual-tree pruning engine.
//!
//! [`DualTreeKMeans`] computes one Lloyd round by traversing a kd-tree over
//! the points against a tree over the centroids. Distance bounds on nodes
//! and points carry over between rounds, so once the centroids start to
//! settle most of the dataset is resolved before the traversal begins.
//! [`NaiveKMeans`] does the same round by brute force.
//!
//! # Usage
//!
//! ```
//! use giztoy_kmeans::{KMeans, KMeansConfig};
//! use giztoy_spacetree::Dataset;
//!
//! let points = Dataset::from_rows(&[
//!     [0.0, 0.0], [1.0, 0.0], [0.0, 1.0],
//!     [10.0, 10.0], [11.0, 10.0], [10.0, 11.0],
//! ]).unwrap();
//!
//! let km = KMeans::new(KMeansConfig { seed: 1, ..Default::default() });
//! let out = km.cluster(&points, 2).unwrap();
//! assert_eq!(out.counts.iter().sum::<usize>(), 6);
//! ```
//!
//! # Design
//!
//! Each round runs these phases over the reference tree:
//!
//! 1. Bound update: relax stored bounds by centroid movement and mark
//!    subtrees whose owner is still certain as statically pruned.
//! 2. Hiding: splice nodes with one pruned child out of the topology.
//! 3. Traversal: [`PruneTest`]s rule centroids out per node until one is
//!    left or the leaves are reached.
//! 4. Restoration and extraction: put the links back and add every
//!    contribution the traversal did not commit.

mod dual_tree;
mod error;
mod kmeans;
mod naive;
mod rules;
mod stat;

pub use dual_tree::{DualTreeKMeans, RoundStats};
pub use error::KMeansError;
pub use kmeans::{Algorithm, Clustering, EmptyClusterPolicy, KMeans, KMeansConfig, LloydStep, Round};
pub use naive::NaiveKMeans;
pub use rules::{PRUNE_TESTS, PruneTest};
