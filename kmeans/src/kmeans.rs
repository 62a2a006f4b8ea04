use giztoy_spacetree::{DEFAULT_LEAF_SIZE, Dataset, EuclideanDistance, Metric};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dual_tree::DualTreeKMeans;
use crate::error::KMeansError;
use crate::naive::NaiveKMeans;
use crate::rules::Accumulator;

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

/// Output of one Lloyd round.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    /// New centroid positions. Empty clusters keep their old position.
    pub centroids: Dataset,
    /// Points assigned to each centroid.
    pub counts: Vec<usize>,
    /// Distance each centroid moved. `None` for an empty cluster.
    pub movements: Vec<Option<f64>>,
    /// Square root of the summed squared movements.
    pub residual: f64,
}

impl Round {
    pub(crate) fn from_sums<M: Metric>(
        centroids: &Dataset,
        acc: &Accumulator,
        metric: &M,
    ) -> Result<Round, KMeansError> {
        let k = centroids.len();
        let mut data = Vec::with_capacity(centroids.as_slice().len());
        let mut movements = Vec::with_capacity(k);
        let mut squared = 0.0;
        for (c, old) in centroids.iter().enumerate() {
            let count = acc.counts[c];
            if count == 0 {
                data.extend_from_slice(old);
                movements.push(None);
                continue;
            }
            let n = count as f64;
            let new: Vec<f64> = acc.sum(c).iter().map(|s| s / n).collect();
            let m = metric.evaluate(old, &new);
            squared += m * m;
            movements.push(Some(m));
            data.extend(new);
        }
        Ok(Round {
            centroids: Dataset::new(centroids.dim(), data)?,
            counts: acc.counts.clone(),
            movements,
            residual: squared.sqrt(),
        })
    }

    /// Indices of centroids that received no points.
    pub fn empty_clusters(&self) -> Vec<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n == 0)
            .map(|(c, _)| c)
            .collect()
    }
}

/// One assign-then-recompute step.
pub trait LloydStep {
    /// Assigns every point to its nearest centroid and returns the new
    /// centroid positions.
    fn iterate(&mut self, centroids: &Dataset) -> Result<Round, KMeansError>;

    /// Owning centroid per point from the last round, in dataset order.
    fn assignments(&self) -> Vec<usize>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do with a centroid that received no points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyClusterPolicy {
    /// Leave it where it is.
    #[default]
    Keep,
    /// Move it onto the point farthest from its own centroid.
    Farthest,
}

/// Which Lloyd step implementation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    DualTree,
    Naive,
}

/// Controls a [`KMeans`] run. Zero values mean "use the default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    /// Upper bound on Lloyd rounds.
    /// Default: 100.
    pub max_iterations: usize,

    /// Stop once the residual drops below this.
    /// Default: 1e-6.
    pub tolerance: f64,

    /// Maximum points per reference tree leaf.
    /// Default: 20.
    pub leaf_size: usize,

    /// Seed for choosing initial centroids.
    pub seed: u64,

    pub empty_cluster: EmptyClusterPolicy,

    pub algorithm: Algorithm,
}

impl KMeansConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_iterations == 0 {
            self.max_iterations = 100;
        }
        if self.tolerance <= 0.0 {
            self.tolerance = 1e-6;
        }
        if self.leaf_size == 0 {
            self.leaf_size = DEFAULT_LEAF_SIZE;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Result of a full k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub centroids: Dataset,
    pub counts: Vec<usize>,
    /// Owning centroid per point, in dataset order.
    pub assignments: Vec<usize>,
    /// Rounds executed.
    pub iterations: usize,
    /// Residual of the last round.
    pub residual: f64,
    pub converged: bool,
}

/// Runs Lloyd rounds until the centroids settle.
#[derive(Debug, Clone)]
pub struct KMeans {
    cfg: KMeansConfig,
}

impl KMeans {
    pub fn new(cfg: KMeansConfig) -> Self {
        Self {
            cfg: cfg.with_defaults(),
        }
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.cfg
    }

    /// Picks `k` distinct dataset points as starting centroids.
    pub fn initial_centroids(&self, dataset: &Dataset, k: usize) -> Result<Dataset, KMeansError> {
        check_k(dataset, k)?;
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let mut picked = sample(&mut rng, dataset.len(), k).into_vec();
        picked.sort_unstable();
        let mut data = Vec::with_capacity(k * dataset.dim());
        for i in picked {
            data.extend_from_slice(dataset.point(i));
        }
        Ok(Dataset::new(dataset.dim(), data)?)
    }

    /// Clusters `dataset` into `k` groups with the configured algorithm.
    pub fn cluster(&self, dataset: &Dataset, k: usize) -> Result<Clustering, KMeansError> {
        let initial = self.initial_centroids(dataset, k)?;
        match self.cfg.algorithm {
            Algorithm::DualTree => {
                let mut step = DualTreeKMeans::new(dataset, self.cfg.leaf_size)?;
                self.run(&mut step, dataset, initial)
            }
            Algorithm::Naive => {
                let mut step = NaiveKMeans::new(dataset);
                self.run(&mut step, dataset, initial)
            }
        }
    }

    /// Drives `step` from `initial` until the residual drops below the
    /// tolerance or the iteration limit is hit.
    pub fn run<S: LloydStep>(
        &self,
        step: &mut S,
        dataset: &Dataset,
        initial: Dataset,
    ) -> Result<Clustering, KMeansError> {
        check_k(dataset, initial.len())?;
        if initial.dim() != dataset.dim() {
            return Err(KMeansError::DimensionMismatch {
                expected: dataset.dim(),
                got: initial.dim(),
            });
        }

        let mut centroids = initial;
        let mut counts = Vec::new();
        let mut residual = f64::MAX;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.cfg.max_iterations {
            iterations += 1;
            let round = step.iterate(&centroids)?;
            let empty = round.empty_clusters();
            let mut next = round.centroids;
            let mut reseeded = false;
            if !empty.is_empty() {
                warn!(round = iterations, clusters = ?empty, "kmeans: empty clusters");
                if self.cfg.empty_cluster == EmptyClusterPolicy::Farthest {
                    next = reseed_farthest(dataset, &next, &step.assignments(), &empty)?;
                    reseeded = true;
                }
            }
            counts = round.counts;
            residual = round.residual;
            centroids = next;

            if !reseeded && residual < self.cfg.tolerance {
                converged = true;
                break;
            }
        }

        if converged {
            info!(iterations, residual, "kmeans: converged");
        } else {
            info!(iterations, residual, "kmeans: stopped at iteration limit");
        }

        Ok(Clustering {
            centroids,
            counts,
            assignments: step.assignments(),
            iterations,
            residual,
            converged,
        })
    }
}

fn check_k(dataset: &Dataset, k: usize) -> Result<(), KMeansError> {
    if dataset.is_empty() {
        return Err(KMeansError::EmptyDataset);
    }
    if k == 0 {
        return Err(KMeansError::NoCentroids);
    }
    if k > dataset.len() {
        return Err(KMeansError::TooManyClusters {
            k,
            n: dataset.len(),
        });
    }
    Ok(())
}

/// Moves each empty centroid onto the point farthest from the centroid it
/// was assigned to. A point is used at most once.
fn reseed_farthest(
    dataset: &Dataset,
    centroids: &Dataset,
    assignments: &[usize],
    empty: &[usize],
) -> Result<Dataset, KMeansError> {
    let metric = EuclideanDistance::default();
    let mut far: Vec<(f64, usize)> = dataset
        .iter()
        .zip(assignments)
        .enumerate()
        .filter(|&(_, (_, &a))| a < centroids.len())
        .map(|(i, (p, &a))| (metric.evaluate(p, centroids.point(a)), i))
        .collect();
    far.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

    let dim = dataset.dim();
    let mut data = centroids.as_slice().to_vec();
    for (&c, &(_, i)) in empty.iter().zip(&far) {
        data[c * dim..(c + 1) * dim].copy_from_slice(dataset.point(i));
    }
    Ok(Dataset::new(dim, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Dataset {
        Dataset::from_rows(&[
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [10.0, 10.0],
            [11.0, 10.0],
            [10.0, 11.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let cfg = KMeansConfig::default().with_defaults();
        assert_eq!(cfg.max_iterations, 100);
        assert_eq!(cfg.tolerance, 1e-6);
        assert_eq!(cfg.leaf_size, DEFAULT_LEAF_SIZE);
        assert_eq!(cfg.empty_cluster, EmptyClusterPolicy::Keep);
        assert_eq!(cfg.algorithm, Algorithm::DualTree);

        let cfg = KMeansConfig {
            max_iterations: 7,
            ..Default::default()
        }
        .with_defaults();
        assert_eq!(cfg.max_iterations, 7);
    }

    #[test]
    fn test_config_from_json() {
        let cfg: KMeansConfig = serde_json::from_str(
            r#"{"max_iterations": 5, "empty_cluster": "farthest", "algorithm": "naive"}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.empty_cluster, EmptyClusterPolicy::Farthest);
        assert_eq!(cfg.algorithm, Algorithm::Naive);
        assert_eq!(cfg.leaf_size, 0);
    }

    #[test]
    fn test_initial_centroids_are_distinct_points() {
        let ds = two_blobs();
        let km = KMeans::new(KMeansConfig {
            seed: 42,
            ..Default::default()
        });
        let init = km.initial_centroids(&ds, 4).unwrap();
        assert_eq!(init.len(), 4);
        let rows = init.to_rows();
        for (i, r) in rows.iter().enumerate() {
            assert!(ds.iter().any(|p| p == r.as_slice()));
            assert!(rows[i + 1..].iter().all(|o| o != r));
        }
        assert_eq!(km.initial_centroids(&ds, 4).unwrap(), init, "seeded");
    }

    #[test]
    fn test_k_validation() {
        let ds = two_blobs();
        let km = KMeans::new(KMeansConfig::default());
        assert_eq!(
            km.cluster(&ds, 7).unwrap_err(),
            KMeansError::TooManyClusters { k: 7, n: 6 }
        );
        assert_eq!(km.cluster(&ds, 0).unwrap_err(), KMeansError::NoCentroids);
    }

    #[test]
    fn test_run_converges() {
        let ds = two_blobs();
        let km = KMeans::new(KMeansConfig::default());
        let initial = Dataset::from_rows(&[[0.0, 0.0], [1.0, 0.0]]).unwrap();
        let mut step = DualTreeKMeans::new(&ds, 1).unwrap();
        let out = km.run(&mut step, &ds, initial).unwrap();
        assert!(out.converged);
        assert!(out.iterations <= 5, "took {} rounds", out.iterations);
        assert_eq!(out.counts, vec![3, 3]);
        assert_eq!(out.assignments, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_iteration_limit() {
        let ds = two_blobs();
        let km = KMeans::new(KMeansConfig {
            max_iterations: 1,
            ..Default::default()
        });
        let initial = Dataset::from_rows(&[[0.0, 0.0], [1.0, 0.0]]).unwrap();
        let out = km.run(&mut NaiveKMeans::new(&ds), &ds, initial).unwrap();
        assert_eq!(out.iterations, 1);
        assert!(!out.converged);
    }

    #[test]
    fn test_farthest_reseeds_empty_cluster() {
        let ds = two_blobs();
        let km = KMeans::new(KMeansConfig {
            max_iterations: 1,
            empty_cluster: EmptyClusterPolicy::Farthest,
            ..Default::default()
        });
        let initial = Dataset::from_rows(&[[0.0, 0.0], [100.0, 100.0]]).unwrap();
        let out = km.run(&mut NaiveKMeans::new(&ds), &ds, initial).unwrap();
        assert_eq!(out.counts, vec![6, 0]);
        // (0, 0) is the farthest point from the shared mean (5.33, 5.33).
        assert_eq!(out.centroids.point(1), &[0.0, 0.0]);
    }
}
