use crate::dataset::Dataset;
use crate::metric::AxisMetric;
use crate::tree::Tree;

/// Result of a nearest-neighbour search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighbour in the dataset.
    pub index: usize,
    pub distance: f64,
}

/// Finds the point of `dataset` nearest to `query`, skipping `exclude`.
///
/// `tree` must have been built over `dataset`. Ties go to the lower index.
/// Returns `None` when every point is excluded.
pub fn nearest_neighbor<M: AxisMetric>(
    tree: &Tree,
    dataset: &Dataset,
    metric: &M,
    query: &[f64],
    exclude: Option<usize>,
) -> Option<Neighbor> {
    let mut best: Option<Neighbor> = None;
    let mut stack = vec![(tree.root(), 0.0)];

    while let Some((id, min_dist)) = stack.pop() {
        if best.is_some_and(|b| min_dist > b.distance) {
            continue;
        }
        match tree.children(id) {
            Some((left, right)) => {
                let dl = tree.bound(left).min_distance_point(query, metric);
                let dr = tree.bound(right).min_distance_point(query, metric);
                // Closer child is popped first.
                if dl <= dr {
                    stack.push((right, dr));
                    stack.push((left, dl));
                } else {
                    stack.push((left, dl));
                    stack.push((right, dr));
                }
            }
            None => {
                for &i in tree.points(id) {
                    if exclude == Some(i) {
                        continue;
                    }
                    let d = metric.evaluate(query, dataset.point(i));
                    let better = match best {
                        None => true,
                        Some(b) => d < b.distance || (d == b.distance && i < b.index),
                    };
                    if better {
                        best = Some(Neighbor {
                            index: i,
                            distance: d,
                        });
                    }
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{EuclideanDistance, ManhattanDistance, Metric};
    use proptest::prelude::*;

    fn brute<M: Metric>(ds: &Dataset, m: &M, q: &[f64], exclude: Option<usize>) -> Option<Neighbor> {
        let mut best: Option<Neighbor> = None;
        for (i, p) in ds.iter().enumerate() {
            if exclude == Some(i) {
                continue;
            }
            let d = m.evaluate(q, p);
            if best.is_none_or(|b| d < b.distance) {
                best = Some(Neighbor { index: i, distance: d });
            }
        }
        best
    }

    #[test]
    fn test_single_point_excluded() {
        let ds = Dataset::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let tree = Tree::build(&ds, 1).unwrap();
        let m = EuclideanDistance::default();
        assert_eq!(nearest_neighbor(&tree, &ds, &m, ds.point(0), Some(0)), None);
        let nn = nearest_neighbor(&tree, &ds, &m, &[1.0, 3.0], None).unwrap();
        assert_eq!(nn.index, 0);
        assert!((nn.distance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_other_centroid() {
        let ds = Dataset::from_rows(&[[0.0, 0.0], [10.0, 0.0], [3.0, 4.0]]).unwrap();
        let tree = Tree::build(&ds, 1).unwrap();
        let m = EuclideanDistance::default();
        let nn = nearest_neighbor(&tree, &ds, &m, ds.point(0), Some(0)).unwrap();
        assert_eq!(nn, Neighbor { index: 2, distance: 5.0 });
    }

    proptest! {
        #[test]
        fn test_matches_brute_force(
            rows in prop::collection::vec(prop::array::uniform3(-100.0f64..100.0), 1..60),
            q in prop::array::uniform3(-120.0f64..120.0),
            leaf in 1usize..8,
            exclude in prop::option::of(0usize..60),
        ) {
            let ds = Dataset::from_rows(&rows).unwrap();
            let tree = Tree::build(&ds, leaf).unwrap();
            let m = ManhattanDistance::default();
            let got = nearest_neighbor(&tree, &ds, &m, &q, exclude);
            let want = brute(&ds, &m, &q, exclude);
            prop_assert_eq!(got.map(|n| n.distance), want.map(|n| n.distance));
        }
    }
}
