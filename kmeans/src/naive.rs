use giztoy_spacetree::{Dataset, EuclideanDistance, Metric};

use crate::error::KMeansError;
use crate::kmeans::{LloydStep, Round};
use crate::rules::Accumulator;

/// Brute-force Lloyd rounds: every point against every centroid.
pub struct NaiveKMeans<'a, M: Metric = EuclideanDistance> {
    dataset: &'a Dataset,
    metric: M,
    assignments: Vec<usize>,
    distance_calculations: usize,
}

impl<'a> NaiveKMeans<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self::with_metric(dataset, EuclideanDistance::default())
    }
}

impl<'a, M: Metric> NaiveKMeans<'a, M> {
    pub fn with_metric(dataset: &'a Dataset, metric: M) -> Self {
        Self {
            dataset,
            metric,
            assignments: vec![usize::MAX; dataset.len()],
            distance_calculations: 0,
        }
    }

    /// Distance evaluations of the last round.
    pub fn distance_calculations(&self) -> usize {
        self.distance_calculations
    }

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

        let mut acc = Accumulator::new(k, self.dataset.dim());
        for (i, p) in self.dataset.iter().enumerate() {
            let mut best = (f64::MAX, 0);
            for (c, centroid) in centroids.iter().enumerate() {
                let d = self.metric.evaluate(p, centroid);
                if d < best.0 {
                    best = (d, c);
                }
            }
            self.assignments[i] = best.1;
            acc.add(best.1, p, 1);
        }
        self.distance_calculations = self.dataset.len() * k;

        Round::from_sums(centroids, &acc, &self.metric)
    }

    pub fn assignments(&self) -> Vec<usize> {
        self.assignments.clone()
    }
}

impl<M: Metric> LloydStep for NaiveKMeans<'_, M> {
    fn iterate(&mut self, centroids: &Dataset) -> Result<Round, KMeansError> {
        NaiveKMeans::iterate(self, centroids)
    }

    fn assignments(&self) -> Vec<usize> {
        NaiveKMeans::assignments(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_clusters() {
        let ds = Dataset::from_rows(&[
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [10.0, 10.0],
            [11.0, 10.0],
            [10.0, 11.0],
        ])
        .unwrap();
        let centroids = Dataset::from_rows(&[[0.0, 0.0], [10.0, 10.0]]).unwrap();
        let mut naive = NaiveKMeans::new(&ds);
        let round = naive.iterate(&centroids).unwrap();
        assert_eq!(round.counts, vec![3, 3]);
        assert_eq!(naive.assignments(), vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(naive.distance_calculations(), 12);
        let c0 = round.centroids.point(0);
        assert!((c0[0] - 1.0 / 3.0).abs() < 1e-12 && (c0[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_go_to_lower_index() {
        let ds = Dataset::from_rows(&[[0.0]]).unwrap();
        let centroids = Dataset::from_rows(&[[1.0], [-1.0]]).unwrap();
        let mut naive = NaiveKMeans::new(&ds);
        let round = naive.iterate(&centroids).unwrap();
        assert_eq!(round.counts, vec![1, 0]);
        assert_eq!(round.movements[1], None);
    }
}
