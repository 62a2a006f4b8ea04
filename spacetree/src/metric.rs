/// A distance function over points.
///
/// Tree pruning is only exact when the metric satisfies the triangle
/// inequality: d(x, z) ≤ d(x, y) + d(y, z).
pub trait Metric {
    fn evaluate(&self, a: &[f64], b: &[f64]) -> f64;
}

/// A metric that decomposes into a sum of per-axis terms.
///
/// Hyper-rectangle bounds need this to compute exact box-to-box distances.
pub trait AxisMetric: Metric {
    /// Contribution of a single axis whose absolute difference is `delta`.
    fn axis_term(&self, delta: f64) -> f64;

    /// Turns a sum of axis terms into a distance.
    fn finish(&self, sum: f64) -> f64;
}

/// The L_p metric. `P` must be at least 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LMetric<const P: u32>;

/// L1 distance.
pub type ManhattanDistance = LMetric<1>;

/// L2 distance.
pub type EuclideanDistance = LMetric<2>;

impl<const P: u32> Metric for LMetric<P> {
    #[inline]
    fn evaluate(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len(), "metric requires equal lengths");
        let sum = a
            .iter()
            .zip(b)
            .map(|(x, y)| self.axis_term((x - y).abs()))
            .sum();
        self.finish(sum)
    }
}

impl<const P: u32> AxisMetric for LMetric<P> {
    #[inline]
    fn axis_term(&self, delta: f64) -> f64 {
        const { assert!(P >= 1, "LMetric requires P >= 1") };
        match P {
            1 => delta,
            2 => delta * delta,
            _ => delta.powi(P as i32),
        }
    }

    #[inline]
    fn finish(&self, sum: f64) -> f64 {
        match P {
            1 => sum,
            2 => sum.sqrt(),
            _ => sum.powf(1.0 / P as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean() {
        let d = EuclideanDistance::default().evaluate(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_manhattan() {
        let d = ManhattanDistance::default().evaluate(&[1.0, -1.0], &[3.0, 4.0]);
        assert!((d - 7.0).abs() < 1e-12);
    }

    #[test]
    fn l3() {
        let d = LMetric::<3>.evaluate(&[0.0, 0.0], &[1.0, 1.0]);
        assert!((d - 2.0f64.powf(1.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_inequality_holds() {
        let m = EuclideanDistance::default();
        let a = [0.3, -1.2, 4.0];
        let b = [2.0, 0.5, -1.0];
        let c = [-3.0, 2.2, 0.1];
        assert!(m.evaluate(&a, &c) <= m.evaluate(&a, &b) + m.evaluate(&b, &c) + 1e-12);
    }
}
