//! Binary space partitioning trees for pruned distance computations.
//!
//! - [`Dataset`]: an immutable row-major point matrix.
//! - [`Metric`], [`AxisMetric`] and [`LMetric`]: distance functions.
//! - [`HRectBound`]: hyper-rectangle bounds with exact min/max distances.
//! - [`Tree`]: a kd-tree arena with mutable child links.
//! - [`DualTreeTraverser`] and [`DualTreeRules`]: generic dual-tree traversal.
//! - [`nearest_neighbor`]: single-tree nearest-neighbour search.

mod bound;
mod dataset;
mod error;
mod metric;
mod neighbor;
mod traversal;
mod tree;

pub use bound::{HRectBound, Range};
pub use dataset::Dataset;
pub use error::SpaceTreeError;
pub use metric::{AxisMetric, EuclideanDistance, LMetric, ManhattanDistance, Metric};
pub use neighbor::{Neighbor, nearest_neighbor};
pub use traversal::{DualTreeRules, DualTreeTraverser, PRUNE, TraversalStats};
pub use tree::{DEFAULT_LEAF_SIZE, NodeId, Tree};
