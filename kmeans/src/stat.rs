use giztoy_spacetree::{Dataset, NodeId, Tree};

/// Marks a per-round ruled-out count that has not been inherited yet.
pub(crate) const UNSET: usize = usize::MAX;

/// Bounds of a region against one owning centroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Owned {
    pub centroid: usize,
    /// Upper bound on the distance to `centroid`.
    pub upper: f64,
    /// Lower bound on the distance to every other centroid.
    pub lower: f64,
}

impl Owned {
    /// Combines two bound sets for the same region. Bounds on the same
    /// owner are intersected, otherwise `preferred` wins.
    pub fn merge(preferred: Option<Owned>, other: Option<Owned>) -> Option<Owned> {
        match (preferred, other) {
            (Some(p), Some(o)) if p.centroid == o.centroid => Some(Owned {
                centroid: p.centroid,
                upper: p.upper.min(o.upper),
                lower: p.lower.max(o.lower),
            }),
            (Some(p), _) => Some(p),
            (None, o) => o,
        }
    }
}

/// Bound state kept for every reference tree node.
#[derive(Debug, Clone)]
pub(crate) struct NodeStat {
    /// Mean of all descendant points.
    pub centroid: Vec<f64>,
    /// Centroid owning every descendant. Only meaningful while the node is
    /// statically pruned or resolved during the current traversal.
    pub owner: Option<usize>,
    pub upper: f64,
    pub lower: f64,
    /// Every descendant is resolved for the current round.
    pub static_pruned: bool,
    /// Owner movement and maximum movement accumulated while the node's points
    /// were skipped. `None` once the owner changed during such a streak.
    pub acc_movement: Option<(f64, f64)>,

    // Topology as built. Hiding only touches the tree's links.
    pub true_parent: Option<NodeId>,
    pub true_left: Option<NodeId>,
    pub true_right: Option<NodeId>,

    // Per-round traversal state.
    pub ruled_out: usize,
    pub pruned_lower: f64,
    pub first_lo: f64,
    pub first_hi: f64,
    pub first_node: Option<NodeId>,
    pub second_lo: f64,
    pub second_hi: f64,
    pub bound: f64,
    pub credited: bool,
}

impl NodeStat {
    fn new(centroid: Vec<f64>, tree: &Tree, id: NodeId) -> Self {
        Self {
            centroid,
            owner: None,
            upper: f64::MAX,
            lower: f64::MAX,
            static_pruned: false,
            acc_movement: None,
            true_parent: tree.parent(id),
            true_left: tree.left(id),
            true_right: tree.right(id),
            ruled_out: UNSET,
            pruned_lower: f64::MAX,
            first_lo: f64::MAX,
            first_hi: f64::MAX,
            first_node: None,
            second_lo: f64::MAX,
            second_hi: f64::MAX,
            bound: f64::MAX,
            credited: false,
        }
    }

    /// Clears everything the traversal fills in.
    pub fn reset_traversal(&mut self) {
        self.ruled_out = UNSET;
        self.pruned_lower = f64::MAX;
        self.first_lo = f64::MAX;
        self.first_hi = f64::MAX;
        self.first_node = None;
        self.second_lo = f64::MAX;
        self.second_hi = f64::MAX;
        self.bound = f64::MAX;
        self.credited = false;
    }

    /// Copies the traversal state a child starts from.
    pub fn inherit_from(&mut self, parent: &NodeStat) {
        self.ruled_out = parent.ruled_out;
        self.pruned_lower = parent.pruned_lower;
        self.first_lo = parent.first_lo;
        self.first_hi = parent.first_hi;
        self.first_node = parent.first_node;
        self.second_lo = parent.second_lo;
        self.second_hi = parent.second_hi;
        self.bound = parent.bound;
    }

    /// Builds one record per node, computing node means bottom-up.
    pub fn build_all(tree: &Tree, dataset: &Dataset) -> Vec<NodeStat> {
        let dim = dataset.dim();
        let mut sums = vec![vec![0.0; dim]; tree.len()];
        for id in tree.node_ids().rev() {
            match tree.children(id) {
                Some((l, r)) => {
                    let (left, right) = (&sums[l.index()], &sums[r.index()]);
                    let merged: Vec<f64> = left.iter().zip(right).map(|(a, b)| a + b).collect();
                    sums[id.index()] = merged;
                }
                None => {
                    let sum = &mut sums[id.index()];
                    for &i in tree.points(id) {
                        for (s, v) in sum.iter_mut().zip(dataset.point(i)) {
                            *s += v;
                        }
                    }
                }
            }
        }

        tree.node_ids()
            .zip(sums)
            .map(|(id, mut sum)| {
                let n = tree.count(id) as f64;
                for s in &mut sum {
                    *s /= n;
                }
                NodeStat::new(sum, tree, id)
            })
            .collect()
    }
}

/// Per-point bound state, indexed by dataset point index.
#[derive(Debug, Clone)]
pub(crate) struct PointState {
    /// Assigned centroid, `k` when unknown. Doubles as the best candidate
    /// during base cases.
    pub assignment: Vec<usize>,
    /// Distance bound to the assigned centroid. Doubles as the best
    /// distance during base cases.
    pub upper: Vec<f64>,
    /// Bound on the distance to any other centroid. Doubles as the second
    /// best distance during base cases.
    pub lower: Vec<f64>,
    /// Resolved before the traversal.
    pub pruned: Vec<bool>,
    /// Base cases evaluated this round.
    pub visited: Vec<usize>,
}

impl PointState {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            assignment: vec![k; n],
            upper: vec![f64::MAX; n],
            lower: vec![f64::MAX; n],
            pruned: vec![false; n],
            visited: vec![0; n],
        }
    }

    pub fn reset(&mut self, i: usize, k: usize) {
        self.assignment[i] = k;
        self.upper[i] = f64::MAX;
        self.lower[i] = f64::MAX;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let a = Owned {
            centroid: 1,
            upper: 3.0,
            lower: 1.0,
        };
        let b = Owned {
            centroid: 1,
            upper: 2.0,
            lower: 4.0,
        };
        let c = Owned {
            centroid: 2,
            upper: 0.5,
            lower: 9.0,
        };
        assert_eq!(
            Owned::merge(Some(a), Some(b)),
            Some(Owned {
                centroid: 1,
                upper: 2.0,
                lower: 4.0
            })
        );
        assert_eq!(Owned::merge(Some(a), Some(c)), Some(a));
        assert_eq!(Owned::merge(None, Some(c)), Some(c));
        assert_eq!(Owned::merge(None, None), None);
    }

    #[test]
    fn test_node_means() {
        let ds = Dataset::from_rows(&[[0.0, 0.0], [2.0, 0.0], [10.0, 4.0], [12.0, 4.0]]).unwrap();
        let tree = Tree::build(&ds, 1).unwrap();
        let stats = NodeStat::build_all(&tree, &ds);
        assert_eq!(stats.len(), tree.len());
        assert_eq!(stats[tree.root().index()].centroid, vec![6.0, 2.0]);
        for id in tree.node_ids() {
            let st = &stats[id.index()];
            assert_eq!(st.true_parent, tree.parent(id));
            assert_eq!(st.ruled_out, UNSET);
            if tree.is_leaf(id) {
                let i = tree.points(id)[0];
                assert_eq!(st.centroid, ds.point(i));
            }
        }
    }
}
