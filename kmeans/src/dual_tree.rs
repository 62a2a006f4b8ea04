use giztoy_spacetree::{
    AxisMetric, Dataset, DualTreeTraverser, EuclideanDistance, NodeId, TraversalStats, Tree,
    nearest_neighbor,
};
use tracing::{debug, trace};

use crate::error::KMeansError;
use crate::kmeans::{LloydStep, Round};
use crate::rules::{Accumulator, KMeansRules};
use crate::stat::{NodeStat, Owned, PointState};

/// Counters for the most recent round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    /// Point-to-centroid and node-to-centroid distance evaluations.
    pub distance_calculations: usize,
    /// Reference nodes resolved before the traversal.
    pub static_pruned_nodes: usize,
    /// Points resolved individually before the traversal.
    pub pruned_points: usize,
    /// Nodes spliced out of the traversal topology.
    pub hidden_nodes: usize,
    pub traversal: TraversalStats,
}

/// Per-round inputs shared by the bound update.
struct Movement<'r> {
    centroids: &'r Dataset,
    /// Distance each centroid moved since the bounds were computed.
    per_centroid: &'r [f64],
    max: f64,
    intercluster: &'r [f64],
}

enum Frame {
    Enter(NodeId, Option<Owned>),
    Exit(NodeId, bool),
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

enum HideStep {
    Visit(NodeId),
    Splice(NodeId, Side),
}

/// Lloyd rounds accelerated by a dual-tree traversal.
///
/// The engine owns a kd-tree over the dataset and keeps distance bounds for
/// every node and point across rounds. Each round it relaxes those bounds by
/// how far the centroids moved, resolves whatever the relaxed bounds still
/// decide, hides resolved subtrees and traverses the rest against a tree
/// built over the centroids.
///
/// Results match [`NaiveKMeans`](crate::NaiveKMeans) exactly, including
/// tie-breaking toward the lower centroid index.
pub struct DualTreeKMeans<'a, M: AxisMetric = EuclideanDistance> {
    dataset: &'a Dataset,
    metric: M,
    tree: Tree,
    stats: Vec<NodeStat>,
    points: PointState,
    k: Option<usize>,
    prev_input: Option<Dataset>,
    prev_output: Option<Dataset>,
    movements: Vec<Option<f64>>,
    round: usize,
    last_stats: RoundStats,
}

impl<'a> DualTreeKMeans<'a> {
    /// Creates an engine with the Euclidean metric.
    pub fn new(dataset: &'a Dataset, leaf_size: usize) -> Result<Self, KMeansError> {
        Self::with_metric(dataset, EuclideanDistance::default(), leaf_size)
    }
}

impl<'a, M: AxisMetric> DualTreeKMeans<'a, M> {
    /// Creates an engine and builds the reference tree.
    pub fn with_metric(dataset: &'a Dataset, metric: M, leaf_size: usize) -> Result<Self, KMeansError> {
        if dataset.is_empty() {
            return Err(KMeansError::EmptyDataset);
        }
        let tree = Tree::build(dataset, leaf_size)?;
        let stats = NodeStat::build_all(&tree, dataset);
        debug!(
            points = dataset.len(),
            nodes = tree.len(),
            leaf_size = tree.leaf_size(),
            "kmeans: dual-tree engine ready"
        );
        Ok(Self {
            dataset,
            metric,
            tree,
            stats,
            points: PointState::new(dataset.len(), usize::MAX),
            k: None,
            prev_input: None,
            prev_output: None,
            movements: Vec::new(),
            round: 0,
            last_stats: RoundStats::default(),
        })
    }

    /// Counters of the last completed round.
    pub fn last_stats(&self) -> RoundStats {
        self.last_stats
    }

    /// Runs one Lloyd round from `centroids`.
    pub fn iterate(&mut self, centroids: &Dataset) -> Result<Round, KMeansError> {
        let k = centroids.len();
        if k == 0 {
            return Err(KMeansError::NoCentroids);
        }
        if centroids.dim() != self.dataset.dim() {
            return Err(KMeansError::DimensionMismatch {
                expected: self.dataset.dim(),
                got: centroids.dim(),
            });
        }
        if let Some(expected) = self.k
            && expected != k
        {
            return Err(KMeansError::CentroidCountChanged { expected, got: k });
        }
        self.k = Some(k);
        self.round += 1;

        let (per_centroid, max) = self.movement_since_last(centroids);
        let centroid_tree = Tree::build(centroids, 1)?;
        let intercluster = self.intercluster(&centroid_tree, centroids);
        let min_intercluster = min_per_node(&centroid_tree, &intercluster);
        let movement = Movement {
            centroids,
            per_centroid: &per_centroid,
            max,
            intercluster: &intercluster,
        };

        let mut stats = RoundStats::default();
        self.update_bounds(&movement, &mut stats);
        stats.hidden_nodes = self.hide();

        let root = self.tree.root();
        self.stats[root.index()].ruled_out = 0;
        let mut acc = Accumulator::new(k, self.dataset.dim());
        let mut traverser = DualTreeTraverser::new();
        {
            let mut rules = KMeansRules::new(
                self.dataset,
                centroids,
                &centroid_tree,
                &self.tree,
                &self.metric,
                &mut self.stats,
                &mut self.points,
                &min_intercluster,
                &mut acc,
            );
            traverser.traverse(&centroid_tree, &self.tree, &mut rules);
            stats.distance_calculations += rules.distance_calculations();
        }
        stats.traversal = traverser.stats();

        self.restore();
        self.extract(&mut acc);
        let round = self.finish_round(centroids, &acc)?;

        debug!(
            round = self.round,
            k,
            residual = round.residual,
            distance_calculations = stats.distance_calculations,
            static_pruned_nodes = stats.static_pruned_nodes,
            pruned_points = stats.pruned_points,
            hidden_nodes = stats.hidden_nodes,
            base_cases = stats.traversal.base_cases,
            scores = stats.traversal.scores,
            "kmeans: dual-tree round"
        );
        self.last_stats = stats;
        Ok(round)
    }

    /// Owning centroid of every point after the last round, in dataset
    /// order. Entries are out of range before the first round.
    pub fn assignments(&self) -> Vec<usize> {
        let mut out = vec![self.k.unwrap_or(usize::MAX); self.dataset.len()];
        let mut stack = vec![self.tree.root()];
        while let Some(id) = stack.pop() {
            if let Some(c) = self.stats[id.index()].owner {
                for &i in self.tree.points(id) {
                    out[i] = c;
                }
                continue;
            }
            match self.tree.children(id) {
                Some((l, r)) => {
                    stack.push(r);
                    stack.push(l);
                }
                None => {
                    for &i in self.tree.points(id) {
                        out[i] = self.points.assignment[i];
                    }
                }
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Movement and intercluster distances
    // -----------------------------------------------------------------------

    /// Distance every centroid moved since the bounds were last computed.
    fn movement_since_last(&self, centroids: &Dataset) -> (Vec<f64>, f64) {
        let k = centroids.len();
        let per_centroid: Vec<f64> = match (&self.prev_input, &self.prev_output) {
            (Some(_), Some(output)) if output == centroids => self
                .movements
                .iter()
                .map(|m| m.unwrap_or(0.0))
                .collect(),
            (Some(input), _) => (0..k)
                .map(|c| self.metric.evaluate(input.point(c), centroids.point(c)))
                .collect(),
            _ => vec![0.0; k],
        };
        let max = per_centroid.iter().copied().fold(0.0, f64::max);
        (per_centroid, max)
    }

    /// Distance from each centroid to its nearest other centroid.
    fn intercluster(&self, centroid_tree: &Tree, centroids: &Dataset) -> Vec<f64> {
        (0..centroids.len())
            .map(|c| {
                nearest_neighbor(
                    centroid_tree,
                    centroids,
                    &self.metric,
                    centroids.point(c),
                    Some(c),
                )
                .map_or(f64::MAX, |nn| nn.distance)
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Bound update
    // -----------------------------------------------------------------------

    fn update_bounds(&mut self, mv: &Movement<'_>, stats: &mut RoundStats) {
        let mut stack = vec![Frame::Enter(self.tree.root(), None)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id, inherited) => {
                    let (node, points_pruned) = self.enter(id, inherited, mv, stats);
                    stack.push(Frame::Exit(id, points_pruned));
                    if let Some((l, r)) = self.tree.children(id) {
                        stack.push(Frame::Enter(r, node));
                        stack.push(Frame::Enter(l, node));
                    }
                }
                Frame::Exit(id, points_pruned) => self.exit(id, points_pruned, stats),
            }
        }
    }

    /// Relaxes the node's bounds, tries to prune it and then its points.
    /// Returns the bounds children inherit and whether every point of a
    /// leaf was pruned.
    fn enter(
        &mut self,
        id: NodeId,
        inherited: Option<Owned>,
        mv: &Movement<'_>,
        stats: &mut RoundStats,
    ) -> (Option<Owned>, bool) {
        let k = mv.centroids.len();
        let st = &mut self.stats[id.index()];
        st.reset_traversal();

        let prev_owner = st.owner;
        // Points of a node that was pruned with an owner were not touched
        // last round.
        let stale = st.static_pruned && prev_owner.is_some();
        st.static_pruned = false;

        let own = st.owner.map(|c| Owned {
            centroid: c,
            upper: st.upper + mv.per_centroid[c],
            lower: st.lower - mv.max,
        });
        let mut node = Owned::merge(inherited, own);

        if let Some(b) = node.as_mut() {
            let c = b.centroid;
            let plb = b.lower.max(mv.intercluster[c] / 2.0);
            if b.upper >= plb {
                let d = self
                    .tree
                    .bound(id)
                    .max_distance_point(mv.centroids.point(c), &self.metric);
                b.upper = b.upper.min(d);
                stats.distance_calculations += 1;
            }
            if b.upper < plb {
                b.lower = plb;
                st.static_pruned = true;
                st.owner = Some(c);
                st.upper = b.upper;
                st.lower = plb;
                st.acc_movement = if !stale {
                    Some((mv.per_centroid[c], mv.max))
                } else if prev_owner == Some(c) {
                    st.acc_movement
                        .map(|(u, l)| (u + mv.per_centroid[c], l + mv.max))
                } else {
                    None
                };
                stats.static_pruned_nodes += 1;
                trace!(node = id.index(), owner = c, "kmeans: node statically pruned");
            }
        }

        if st.static_pruned || !self.tree.is_leaf(id) {
            return (node, true);
        }

        let acc_movement = if stale { st.acc_movement } else { None };
        let mut all_pruned = true;
        for &i in self.tree.points(id) {
            let pts = &mut self.points;
            pts.visited[i] = 0;
            pts.pruned[i] = false;

            let a = pts.assignment[i];
            let own = if pts.upper[i] == f64::MAX || a >= k {
                None
            } else if !stale {
                Some(Owned {
                    centroid: a,
                    upper: pts.upper[i] + mv.per_centroid[a],
                    lower: pts.lower[i] - mv.max,
                })
            } else {
                match acc_movement {
                    Some((u, l)) if prev_owner == Some(a) => Some(Owned {
                        centroid: a,
                        upper: pts.upper[i] + u + mv.per_centroid[a],
                        lower: pts.lower[i] - l - mv.max,
                    }),
                    _ => None,
                }
            };

            let Some(mut b) = Owned::merge(node, own) else {
                pts.reset(i, k);
                all_pruned = false;
                continue;
            };
            let plb = b.lower.max(mv.intercluster[b.centroid] / 2.0);
            if b.upper >= plb {
                b.upper = self
                    .metric
                    .evaluate(self.dataset.point(i), mv.centroids.point(b.centroid));
                stats.distance_calculations += 1;
            }
            if b.upper < plb {
                pts.pruned[i] = true;
                pts.assignment[i] = b.centroid;
                pts.upper[i] = b.upper;
                pts.lower[i] = plb;
                stats.pruned_points += 1;
            } else {
                pts.reset(i, k);
                all_pruned = false;
            }
        }
        (node, all_pruned)
    }

    fn exit(&mut self, id: NodeId, points_pruned: bool, stats: &mut RoundStats) {
        let children_static = match self.tree.children(id) {
            Some((l, r)) => {
                self.stats[l.index()].static_pruned && self.stats[r.index()].static_pruned
            }
            None => true,
        };
        let st = &mut self.stats[id.index()];
        if st.static_pruned {
            if !children_static {
                panic!("kmeans: statically pruned node {id:?} has a child that is not");
            }
            return;
        }
        if children_static && points_pruned {
            st.static_pruned = true;
            stats.static_pruned_nodes += 1;
        }
        st.owner = None;
        st.upper = f64::MAX;
        st.lower = f64::MAX;
        st.acc_movement = None;
    }

    // -----------------------------------------------------------------------
    // Hiding
    // -----------------------------------------------------------------------

    /// Splices every non-root node with exactly one statically pruned child
    /// out of the tree, linking its other child to the grandparent.
    fn hide(&mut self) -> usize {
        let mut hidden = 0;
        let mut stack = vec![HideStep::Visit(self.tree.root())];
        while let Some(step) = stack.pop() {
            match step {
                HideStep::Visit(id) => {
                    let Some((l, r)) = self.tree.children(id) else {
                        continue;
                    };
                    let left_static = self.stats[l.index()].static_pruned;
                    let right_static = self.stats[r.index()].static_pruned;
                    match (left_static, right_static) {
                        (false, false) => {
                            stack.push(HideStep::Visit(r));
                            stack.push(HideStep::Visit(l));
                        }
                        (true, false) => {
                            stack.push(HideStep::Splice(id, Side::Right));
                            stack.push(HideStep::Visit(r));
                        }
                        (false, true) => {
                            stack.push(HideStep::Splice(id, Side::Left));
                            stack.push(HideStep::Visit(l));
                        }
                        (true, true) => {}
                    }
                }
                HideStep::Splice(id, side) => {
                    let Some(grandparent) = self.tree.parent(id) else {
                        continue;
                    };
                    let keep = match side {
                        Side::Left => self.tree.left(id),
                        Side::Right => self.tree.right(id),
                    };
                    let Some(keep) = keep else {
                        continue;
                    };
                    if self.tree.left(grandparent) == Some(id) {
                        self.tree.set_left(grandparent, Some(keep));
                    } else {
                        self.tree.set_right(grandparent, Some(keep));
                    }
                    self.tree.set_parent(keep, Some(grandparent));
                    hidden += 1;
                }
            }
        }
        hidden
    }

    /// Puts every link back to the topology the tree was built with.
    fn restore(&mut self) {
        let mut stack = vec![self.tree.root()];
        while let Some(id) = stack.pop() {
            let st = &self.stats[id.index()];
            self.tree.set_parent(id, st.true_parent);
            self.tree.set_left(id, st.true_left);
            self.tree.set_right(id, st.true_right);
            if let (Some(l), Some(r)) = (st.true_left, st.true_right) {
                stack.push(r);
                stack.push(l);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Extraction
    // -----------------------------------------------------------------------

    /// Adds everything the traversal did not commit to the accumulators.
    fn extract(&self, acc: &mut Accumulator) {
        let mut stack = vec![self.tree.root()];
        while let Some(id) = stack.pop() {
            let st = &self.stats[id.index()];
            if st.credited {
                continue;
            }
            if st.static_pruned
                && let Some(owner) = st.owner
            {
                acc.add(owner, &st.centroid, self.tree.count(id));
                continue;
            }
            match self.tree.children(id) {
                Some((l, r)) => {
                    stack.push(r);
                    stack.push(l);
                }
                None => {
                    for &i in self.tree.points(id) {
                        if self.points.pruned[i] {
                            acc.add(self.points.assignment[i], self.dataset.point(i), 1);
                        } else if self.points.visited[i] == 0 {
                            panic!("kmeans: point {i} in node {id:?} was never resolved");
                        }
                    }
                }
            }
        }
    }

    fn finish_round(&mut self, centroids: &Dataset, acc: &Accumulator) -> Result<Round, KMeansError> {
        let round = Round::from_sums(centroids, acc, &self.metric)?;
        self.prev_input = Some(centroids.clone());
        self.prev_output = Some(round.centroids.clone());
        self.movements = round.movements.clone();
        Ok(round)
    }

    /// The reference tree. Its links are in built form between rounds.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }
}

/// Smallest per-centroid value under each node of `tree`.
fn min_per_node(tree: &Tree, values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::MAX; tree.len()];
    for id in tree.node_ids().rev() {
        out[id.index()] = match tree.children(id) {
            Some((l, r)) => out[l.index()].min(out[r.index()]),
            None => tree
                .points(id)
                .iter()
                .map(|&c| values[c])
                .fold(f64::MAX, f64::min),
        };
    }
    out
}

impl<M: AxisMetric> LloydStep for DualTreeKMeans<'_, M> {
    fn iterate(&mut self, centroids: &Dataset) -> Result<Round, KMeansError> {
        DualTreeKMeans::iterate(self, centroids)
    }

    fn assignments(&self) -> Vec<usize> {
        DualTreeKMeans::assignments(self)
    }
}
