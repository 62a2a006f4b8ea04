//! Generic dual-tree traversal.
//!
//! The traverser walks two trees at once and asks a [`DualTreeRules`]
//! implementation what to do with each (query node, reference node) pair.
//! It is reference-major: every score and rescore against a reference node
//! completes before any of its children is visited, so per-node state the
//! rules keep on the reference side is final when children inherit it.

use tracing::trace;

use crate::tree::{NodeId, Tree};

/// Score value that drops a node pair from the traversal.
pub const PRUNE: f64 = f64::MAX;

/// Callbacks that drive a [`DualTreeTraverser`].
pub trait DualTreeRules {
    /// Evaluates a single (query point, reference point) pair.
    fn base_case(&mut self, query_index: usize, reference_index: usize) -> f64;

    /// Scores a node pair. Lower scores are visited first. [`PRUNE`] drops
    /// the pair.
    fn score(&mut self, query_node: NodeId, reference_node: NodeId) -> f64;

    /// Re-evaluates a score computed for the reference node's parent.
    fn rescore(&mut self, query_node: NodeId, reference_node: NodeId, old_score: f64) -> f64;
}

/// Counters collected during one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub scores: usize,
    pub rescores: usize,
    pub prunes: usize,
    pub base_cases: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    node: NodeId,
    score: f64,
}

/// Reference-major dual-tree traverser.
#[derive(Debug, Default)]
pub struct DualTreeTraverser {
    stats: TraversalStats,
}

impl DualTreeTraverser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TraversalStats {
        self.stats
    }

    /// Traverses `query` against `reference`, starting at both roots.
    ///
    /// Reference children are taken from the current links, so a caller may
    /// splice nodes out of the reference tree before traversing.
    pub fn traverse<R: DualTreeRules>(&mut self, query: &Tree, reference: &Tree, rules: &mut R) {
        self.stats = TraversalStats::default();

        let q_root = query.root();
        let r_root = reference.root();
        let mut roots = Vec::new();
        let s = self.score(rules, q_root, r_root);
        if s != PRUNE {
            roots.push(Candidate {
                node: q_root,
                score: s,
            });
        }

        let mut stack = vec![(r_root, roots)];
        while let Some((r, inherited)) = stack.pop() {
            let mut candidates = if r == r_root {
                inherited
            } else {
                let mut kept = Vec::with_capacity(inherited.len());
                for c in inherited {
                    self.stats.rescores += 1;
                    if rules.rescore(c.node, r, c.score) == PRUNE {
                        self.stats.prunes += 1;
                        continue;
                    }
                    let s = self.score(rules, c.node, r);
                    if s != PRUNE {
                        kept.push(Candidate {
                            node: c.node,
                            score: s,
                        });
                    }
                }
                kept
            };

            self.split_queries(query, reference, rules, r, &mut candidates);
            if candidates.is_empty() {
                continue;
            }
            candidates.sort_by(|a, b| a.score.total_cmp(&b.score));

            match reference.children(r) {
                Some((left, right)) => {
                    stack.push((right, candidates.clone()));
                    stack.push((left, candidates));
                }
                None => {
                    let points = reference.points(r);
                    for c in &candidates {
                        for &qi in query.points(c.node) {
                            for &ri in points {
                                self.stats.base_cases += 1;
                                rules.base_case(qi, ri);
                            }
                        }
                    }
                }
            }
        }

        trace!(
            scores = self.stats.scores,
            rescores = self.stats.rescores,
            prunes = self.stats.prunes,
            base_cases = self.stats.base_cases,
            "spacetree: dual-tree traversal done"
        );
    }

    /// Replaces query nodes that are larger than the reference node (or any
    /// internal query node, at a reference leaf) with their scored children
    /// until nothing splits.
    fn split_queries<R: DualTreeRules>(
        &mut self,
        query: &Tree,
        reference: &Tree,
        rules: &mut R,
        r: NodeId,
        candidates: &mut Vec<Candidate>,
    ) {
        let r_leaf = reference.is_leaf(r);
        let r_width = reference.bound(r).max_width();
        loop {
            let mut split_any = false;
            let mut next = Vec::with_capacity(candidates.len());
            for c in candidates.drain(..) {
                match query.children(c.node) {
                    Some((left, right))
                        if r_leaf || query.bound(c.node).max_width() >= r_width =>
                    {
                        split_any = true;
                        for child in [left, right] {
                            let s = self.score(rules, child, r);
                            if s != PRUNE {
                                next.push(Candidate {
                                    node: child,
                                    score: s,
                                });
                            }
                        }
                    }
                    _ => next.push(c),
                }
            }
            *candidates = next;
            if !split_any {
                break;
            }
        }
    }

    fn score<R: DualTreeRules>(&mut self, rules: &mut R, q: NodeId, r: NodeId) -> f64 {
        self.stats.scores += 1;
        let s = rules.score(q, r);
        if s == PRUNE {
            self.stats.prunes += 1;
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::metric::{EuclideanDistance, Metric};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    /// All-nearest-neighbours rules: for each reference point, find the
    /// closest query point.
    ///
    /// `cutoff[r]` is the smallest box-to-box max distance seen for
    /// reference node `r`. Every point under `r` has a query point within
    /// it, so a query node whose min distance exceeds it can be dropped.
    struct NearestRules<'a> {
        query: &'a Tree,
        reference: &'a Tree,
        qs: &'a Dataset,
        rs: &'a Dataset,
        best: Vec<(f64, usize)>,
        cutoff: Vec<f64>,
        prune: bool,
    }

    impl DualTreeRules for NearestRules<'_> {
        fn base_case(&mut self, qi: usize, ri: usize) -> f64 {
            let d = EuclideanDistance::default().evaluate(self.qs.point(qi), self.rs.point(ri));
            let best = &mut self.best[ri];
            if d < best.0 || (d == best.0 && qi < best.1) {
                *best = (d, qi);
            }
            d
        }

        fn score(&mut self, q: NodeId, r: NodeId) -> f64 {
            let m = EuclideanDistance::default();
            let (qb, rb) = (self.query.bound(q), self.reference.bound(r));
            let inherited = self
                .reference
                .parent(r)
                .map_or(f64::MAX, |p| self.cutoff[p.index()]);
            let cutoff = self.cutoff[r.index()].min(inherited).min(qb.max_distance(rb, &m));
            self.cutoff[r.index()] = cutoff;

            let d = qb.min_distance(rb, &m);
            if self.prune && d > cutoff { PRUNE } else { d }
        }

        fn rescore(&mut self, _q: NodeId, r: NodeId, old: f64) -> f64 {
            let inherited = self
                .reference
                .parent(r)
                .map_or(f64::MAX, |p| self.cutoff[p.index()]);
            let cutoff = self.cutoff[r.index()].min(inherited);
            self.cutoff[r.index()] = cutoff;
            if self.prune && old > cutoff { PRUNE } else { old }
        }
    }

    fn random(n: usize, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        Dataset::new(2, (0..n * 2).map(|_| rng.r#gen::<f64>() * 50.0).collect()).unwrap()
    }

    fn run(prune: bool) -> (Vec<(f64, usize)>, TraversalStats, Dataset, Dataset) {
        let qs = random(40, 11);
        let rs = random(300, 12);
        let qt = Tree::build(&qs, 1).unwrap();
        let rt = Tree::build(&rs, 10).unwrap();
        let mut rules = NearestRules {
            query: &qt,
            reference: &rt,
            qs: &qs,
            rs: &rs,
            best: vec![(f64::MAX, usize::MAX); rs.len()],
            cutoff: vec![f64::MAX; rt.len()],
            prune,
        };
        let mut traverser = DualTreeTraverser::new();
        traverser.traverse(&qt, &rt, &mut rules);
        let best = rules.best;
        (best, traverser.stats(), qs, rs)
    }

    #[test]
    fn test_exhaustive_without_pruning() {
        let (_, stats, qs, rs) = run(false);
        assert_eq!(stats.base_cases, qs.len() * rs.len());
        assert_eq!(stats.prunes, 0);
    }

    #[test]
    fn test_pruned_traversal_finds_nearest() {
        let (best, stats, qs, rs) = run(true);
        let m = EuclideanDistance::default();
        for (ri, p) in rs.iter().enumerate() {
            let mut want = (f64::MAX, usize::MAX);
            for (qi, q) in qs.iter().enumerate() {
                let d = m.evaluate(p, q);
                if d < want.0 {
                    want = (d, qi);
                }
            }
            assert_eq!(best[ri].1, want.1, "reference point {ri}");
        }
        assert!(stats.prunes > 0, "expected some pruning");
        assert!(stats.base_cases < qs.len() * rs.len());
    }

    struct PruneAll;

    impl DualTreeRules for PruneAll {
        fn base_case(&mut self, _: usize, _: usize) -> f64 {
            panic!("base case reached after root was pruned");
        }
        fn score(&mut self, _: NodeId, _: NodeId) -> f64 {
            PRUNE
        }
        fn rescore(&mut self, _: NodeId, _: NodeId, _: f64) -> f64 {
            PRUNE
        }
    }

    #[test]
    fn test_pruned_root_stops() {
        let ds = random(20, 1);
        let t = Tree::build(&ds, 2).unwrap();
        let mut traverser = DualTreeTraverser::new();
        traverser.traverse(&t, &t, &mut PruneAll);
        assert_eq!(traverser.stats().scores, 1);
        assert_eq!(traverser.stats().base_cases, 0);
    }
}
