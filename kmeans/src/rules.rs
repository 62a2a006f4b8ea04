//! Traversal rules for one dual-tree k-means round.
//!
//! The query tree holds the centroids and the reference tree holds the
//! points. For every reference node the rules count how many centroids are
//! ruled out. Once only one centroid is left the node is resolved and its
//! whole sum is committed to that centroid.

use giztoy_spacetree::{AxisMetric, Dataset, DualTreeRules, NodeId, PRUNE, Range, Tree};

use crate::stat::{NodeStat, PointState, UNSET};

/// A pruning predicate evaluated when scoring a node pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneTest {
    /// The reference node is statically pruned or already resolved.
    Resolved,
    /// Cached best and second-best centroid-node distances.
    BoundCache,
    /// Intercluster distances against the best centroid node.
    Elkan,
    /// Smallest maximum distance seen for the reference node.
    PellegMoore,
}

/// Order in which [`PruneTest`]s run.
pub const PRUNE_TESTS: [PruneTest; 4] = [
    PruneTest::Resolved,
    PruneTest::BoundCache,
    PruneTest::Elkan,
    PruneTest::PellegMoore,
];

enum Verdict {
    Keep,
    /// Rule the centroid node out, with a lower bound on the distance from
    /// the reference node to any of its centroids.
    Cut(f64),
    /// Drop the pair without counting it.
    Skip,
}

/// Running per-centroid sums and counts of one round.
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    pub sums: Vec<f64>,
    pub counts: Vec<usize>,
    dim: usize,
}

impl Accumulator {
    pub fn new(k: usize, dim: usize) -> Self {
        Self {
            sums: vec![0.0; k * dim],
            counts: vec![0; k],
            dim,
        }
    }

    /// Adds `weight` copies of `point` to centroid `c`.
    pub fn add(&mut self, c: usize, point: &[f64], weight: usize) {
        let w = weight as f64;
        let sum = &mut self.sums[c * self.dim..(c + 1) * self.dim];
        for (s, v) in sum.iter_mut().zip(point) {
            *s += v * w;
        }
        self.counts[c] += weight;
    }

    pub fn sum(&self, c: usize) -> &[f64] {
        &self.sums[c * self.dim..(c + 1) * self.dim]
    }
}

pub(crate) struct KMeansRules<'a, M> {
    dataset: &'a Dataset,
    centroids: &'a Dataset,
    centroid_tree: &'a Tree,
    tree: &'a Tree,
    metric: &'a M,
    stats: &'a mut [NodeStat],
    points: &'a mut PointState,
    /// Smallest intercluster distance under each centroid tree node.
    min_intercluster: &'a [f64],
    acc: &'a mut Accumulator,
    k: usize,
    last_pair: Option<(usize, usize, f64)>,
    last_reference: Option<NodeId>,
    distance_calculations: usize,
}

impl<'a, M: AxisMetric> KMeansRules<'a, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dataset: &'a Dataset,
        centroids: &'a Dataset,
        centroid_tree: &'a Tree,
        tree: &'a Tree,
        metric: &'a M,
        stats: &'a mut [NodeStat],
        points: &'a mut PointState,
        min_intercluster: &'a [f64],
        acc: &'a mut Accumulator,
    ) -> Self {
        Self {
            dataset,
            centroids,
            centroid_tree,
            tree,
            metric,
            stats,
            points,
            min_intercluster,
            acc,
            k: centroids.len(),
            last_pair: None,
            last_reference: None,
            distance_calculations: 0,
        }
    }

    pub fn distance_calculations(&self) -> usize {
        self.distance_calculations
    }

    /// Pulls the parent's traversal state into `r` on first touch.
    fn prepare(&mut self, r: NodeId) {
        self.last_reference = Some(r);
        if self.stats[r.index()].ruled_out != UNSET {
            return;
        }
        match self.tree.parent(r) {
            // Parents always precede their children in the arena.
            Some(p) => {
                let (head, tail) = self.stats.split_at_mut(r.index());
                tail[0].inherit_from(&head[p.index()]);
            }
            None => self.stats[r.index()].ruled_out = 0,
        }
    }

    /// Credits a statically pruned node to its owner once and reports
    /// whether `r` needs no further work.
    fn resolved(&mut self, r: NodeId) -> bool {
        let st = &mut self.stats[r.index()];
        if st.static_pruned {
            if let Some(owner) = st.owner
                && !st.credited
            {
                st.credited = true;
                self.acc.add(owner, &st.centroid, self.tree.count(r));
            }
            return true;
        }
        st.ruled_out == self.k
    }

    fn bound_cache(&mut self, q: NodeId, r: NodeId, range: Range) -> Verdict {
        let st = &mut self.stats[r.index()];
        let verdict = if range.lo < st.first_lo {
            st.second_lo = st.first_lo;
            st.second_hi = st.first_hi;
            st.first_lo = range.lo;
            st.first_hi = range.hi;
            st.first_node = Some(q);
            Verdict::Keep
        } else if range.lo < st.second_lo {
            st.second_lo = range.lo;
            st.second_hi = range.hi;
            Verdict::Keep
        } else if range.lo > st.second_hi {
            Verdict::Cut(range.lo)
        } else {
            Verdict::Keep
        };
        st.bound = st.bound.min(range.hi);
        verdict
    }

    fn elkan(&self, q: NodeId, r: NodeId) -> Verdict {
        let st = &self.stats[r.index()];
        let Some(first) = st.first_node else {
            return Verdict::Keep;
        };
        if st.first_hi == f64::MAX {
            return Verdict::Keep;
        }
        let min_ic = self.min_intercluster[q.index()];
        let disjoint = !self.centroid_tree.is_descendant_of(q, first)
            && !self.centroid_tree.is_descendant_of(first, q);
        if disjoint && min_ic > 2.0 * st.first_hi {
            Verdict::Cut(min_ic - st.first_hi)
        } else {
            Verdict::Keep
        }
    }

    fn pelleg_moore(&self, r: NodeId, lo: f64) -> Verdict {
        if lo > self.stats[r.index()].bound {
            Verdict::Cut(lo)
        } else {
            Verdict::Keep
        }
    }

    fn cut(&mut self, q: NodeId, r: NodeId, lower: f64) -> f64 {
        let st = &mut self.stats[r.index()];
        st.ruled_out += self.centroid_tree.count(q);
        st.pruned_lower = st.pruned_lower.min(lower);
        PRUNE
    }

    /// Resolves `r` to the single centroid under `q` and commits its sum.
    fn resolve(&mut self, q: NodeId, r: NodeId, hi: f64) {
        let owner = self.centroid_tree.points(q)[0];
        let count = self.tree.count(r);
        let st = &mut self.stats[r.index()];
        st.owner = Some(owner);
        st.upper = hi;
        st.lower = st.pruned_lower;
        st.ruled_out = self.k;
        st.credited = true;
        self.acc.add(owner, &st.centroid, count);
    }
}

impl<M: AxisMetric> DualTreeRules for KMeansRules<'_, M> {
    fn base_case(&mut self, centroid: usize, point: usize) -> f64 {
        if self.points.pruned[point] {
            return f64::MAX;
        }
        if let Some((c, p, d)) = self.last_pair
            && c == centroid
            && p == point
        {
            return d;
        }

        let d = self
            .metric
            .evaluate(self.dataset.point(point), self.centroids.point(centroid));
        self.distance_calculations += 1;
        self.last_pair = Some((centroid, point, d));

        let pts = &mut *self.points;
        if d < pts.upper[point] || (d == pts.upper[point] && centroid < pts.assignment[point]) {
            pts.lower[point] = pts.upper[point];
            pts.upper[point] = d;
            pts.assignment[point] = centroid;
        } else if d < pts.lower[point] {
            pts.lower[point] = d;
        }
        pts.visited[point] += 1;

        if let Some(leaf) = self.last_reference {
            let st = &self.stats[leaf.index()];
            if st.ruled_out != UNSET && pts.visited[point] + st.ruled_out == self.k {
                pts.lower[point] = pts.lower[point].min(st.pruned_lower);
                let owner = pts.assignment[point];
                self.acc.add(owner, self.dataset.point(point), 1);
            }
        }
        d
    }

    fn score(&mut self, q: NodeId, r: NodeId) -> f64 {
        self.prepare(r);

        let mut range: Option<Range> = None;
        for test in PRUNE_TESTS {
            let verdict = match test {
                PruneTest::Resolved => {
                    if self.resolved(r) {
                        Verdict::Skip
                    } else {
                        Verdict::Keep
                    }
                }
                PruneTest::BoundCache => {
                    let rg = *range.get_or_insert_with(|| {
                        self.centroid_tree
                            .bound(q)
                            .range_distance(self.tree.bound(r), self.metric)
                    });
                    self.bound_cache(q, r, rg)
                }
                PruneTest::Elkan => self.elkan(q, r),
                PruneTest::PellegMoore => {
                    let lo = range.map_or(0.0, |rg| rg.lo);
                    self.pelleg_moore(r, lo)
                }
            };
            match verdict {
                Verdict::Keep => {}
                Verdict::Cut(lower) => return self.cut(q, r, lower),
                Verdict::Skip => return PRUNE,
            }
        }

        let Range { lo, hi } = range.unwrap_or(Range::new(0.0, f64::MAX));
        let st = &self.stats[r.index()];
        if self.centroid_tree.count(q) == 1 && st.ruled_out + 1 == self.k {
            self.resolve(q, r, hi);
            return PRUNE;
        }
        lo
    }

    fn rescore(&mut self, q: NodeId, r: NodeId, old_score: f64) -> f64 {
        self.prepare(r);
        if self.resolved(r) {
            return PRUNE;
        }
        if old_score > self.stats[r.index()].bound {
            return self.cut(q, r, old_score);
        }
        old_score
    }
}
