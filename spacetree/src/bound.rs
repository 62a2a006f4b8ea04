use crate::metric::AxisMetric;

/// A closed interval `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub lo: f64,
    pub hi: f64,
}

impl Range {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// The empty interval. Growing it by any value yields `[v, v]`.
    pub fn empty() -> Self {
        Self {
            lo: f64::INFINITY,
            hi: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.hi - self.lo
        }
    }

    pub fn mid(&self) -> f64 {
        (self.lo + self.hi) / 2.0
    }

    pub fn contains(&self, v: f64) -> bool {
        self.lo <= v && v <= self.hi
    }

    fn grow(&mut self, v: f64) {
        self.lo = self.lo.min(v);
        self.hi = self.hi.max(v);
    }
}

/// An axis-aligned hyper-rectangle.
///
/// Distances are computed per axis and combined by the metric, so they are
/// exact for any [`AxisMetric`].
#[derive(Debug, Clone, PartialEq)]
pub struct HRectBound {
    bounds: Vec<Range>,
}

impl HRectBound {
    /// An empty bound of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            bounds: vec![Range::empty(); dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.bounds.len()
    }

    /// Per-axis intervals.
    pub fn ranges(&self) -> &[Range] {
        &self.bounds
    }

    /// Expands the bound to contain `point`.
    pub fn grow(&mut self, point: &[f64]) {
        debug_assert_eq!(point.len(), self.dim());
        for (r, &v) in self.bounds.iter_mut().zip(point) {
            r.grow(v);
        }
    }

    /// Expands the bound to contain `other`.
    pub fn union(&mut self, other: &HRectBound) {
        for (r, o) in self.bounds.iter_mut().zip(&other.bounds) {
            if !o.is_empty() {
                r.grow(o.lo);
                r.grow(o.hi);
            }
        }
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        self.bounds.iter().zip(point).all(|(r, &v)| r.contains(v))
    }

    /// Center of the box.
    pub fn center(&self) -> Vec<f64> {
        self.bounds.iter().map(Range::mid).collect()
    }

    /// Widest axis and its width. Ties go to the lower axis. `None` for a
    /// zero-dimensional bound.
    pub fn widest_axis(&self) -> Option<(usize, f64)> {
        self.bounds
            .iter()
            .map(Range::width)
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
    }

    /// Width of the widest axis.
    pub fn max_width(&self) -> f64 {
        self.widest_axis().map_or(0.0, |(_, w)| w)
    }

    /// Distance between opposite corners.
    pub fn diameter<M: AxisMetric>(&self, metric: &M) -> f64 {
        let sum = self
            .bounds
            .iter()
            .map(|r| metric.axis_term(r.width()))
            .sum();
        metric.finish(sum)
    }

    /// Smallest distance between any point in `self` and any point in `other`.
    pub fn min_distance<M: AxisMetric>(&self, other: &HRectBound, metric: &M) -> f64 {
        self.range_distance(other, metric).lo
    }

    /// Largest distance between any point in `self` and any point in `other`.
    pub fn max_distance<M: AxisMetric>(&self, other: &HRectBound, metric: &M) -> f64 {
        self.range_distance(other, metric).hi
    }

    /// Minimum and maximum box-to-box distance in one pass.
    pub fn range_distance<M: AxisMetric>(&self, other: &HRectBound, metric: &M) -> Range {
        debug_assert_eq!(self.dim(), other.dim());
        let mut lo = 0.0;
        let mut hi = 0.0;
        for (a, b) in self.bounds.iter().zip(&other.bounds) {
            let gap = (b.lo - a.hi).max(a.lo - b.hi).max(0.0);
            let span = (b.hi - a.lo).max(a.hi - b.lo);
            lo += metric.axis_term(gap);
            hi += metric.axis_term(span);
        }
        Range::new(metric.finish(lo), metric.finish(hi))
    }

    /// Smallest distance from `point` to the box. Zero when it lies inside.
    pub fn min_distance_point<M: AxisMetric>(&self, point: &[f64], metric: &M) -> f64 {
        debug_assert_eq!(self.dim(), point.len());
        let sum = self
            .bounds
            .iter()
            .zip(point)
            .map(|(r, &v)| metric.axis_term((r.lo - v).max(v - r.hi).max(0.0)))
            .sum();
        metric.finish(sum)
    }

    /// Largest distance from `point` to any point of the box.
    pub fn max_distance_point<M: AxisMetric>(&self, point: &[f64], metric: &M) -> f64 {
        debug_assert_eq!(self.dim(), point.len());
        let sum = self
            .bounds
            .iter()
            .zip(point)
            .map(|(r, &v)| metric.axis_term((v - r.lo).max(r.hi - v)))
            .sum();
        metric.finish(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{EuclideanDistance, ManhattanDistance, Metric};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn rect(points: &[[f64; 2]]) -> HRectBound {
        let mut b = HRectBound::new(2);
        for p in points {
            b.grow(p);
        }
        b
    }

    #[test]
    fn test_grow_and_contains() {
        let b = rect(&[[0.0, 1.0], [2.0, -1.0]]);
        assert_eq!(b.ranges()[0], Range::new(0.0, 2.0));
        assert_eq!(b.ranges()[1], Range::new(-1.0, 1.0));
        assert!(b.contains(&[1.0, 0.0]));
        assert!(!b.contains(&[3.0, 0.0]));
        assert_eq!(b.center(), vec![1.0, 0.0]);
        assert_eq!(b.widest_axis(), Some((0, 2.0)));
    }

    #[test]
    fn test_widest_axis_ties_go_low() {
        let square = rect(&[[0.0, 0.0], [2.0, 2.0]]);
        assert_eq!(square.widest_axis(), Some((0, 2.0)));
        let mut cube = HRectBound::new(3);
        cube.grow(&[0.0, 5.0, 1.0]);
        cube.grow(&[1.0, 8.0, 4.0]);
        assert_eq!(cube.widest_axis(), Some((1, 3.0)));
        assert_eq!(HRectBound::new(0).widest_axis(), None);
    }

    #[test]
    fn test_disjoint_boxes() {
        let m = EuclideanDistance::default();
        let a = rect(&[[0.0, 0.0], [1.0, 1.0]]);
        let b = rect(&[[4.0, 5.0], [5.0, 6.0]]);
        let r = a.range_distance(&b, &m);
        assert!((r.lo - 5.0).abs() < 1e-12, "lo = {}", r.lo);
        assert!((r.hi - (25.0f64 + 36.0).sqrt()).abs() < 1e-12, "hi = {}", r.hi);
        assert_eq!(a.min_distance(&b, &m), r.lo);
        assert_eq!(b.max_distance(&a, &m), r.hi);
    }

    #[test]
    fn test_overlapping_boxes_have_zero_min() {
        let m = ManhattanDistance::default();
        let a = rect(&[[0.0, 0.0], [2.0, 2.0]]);
        let b = rect(&[[1.0, 1.0], [3.0, 3.0]]);
        assert_eq!(a.min_distance(&b, &m), 0.0);
        assert_eq!(a.max_distance(&b, &m), 6.0);
    }

    #[test]
    fn test_point_distances() {
        let m = EuclideanDistance::default();
        let b = rect(&[[0.0, 0.0], [2.0, 2.0]]);
        assert_eq!(b.min_distance_point(&[1.0, 1.0], &m), 0.0);
        assert!((b.min_distance_point(&[5.0, 6.0], &m) - 5.0).abs() < 1e-12);
        assert!((b.max_distance_point(&[1.0, 1.0], &m) - 2.0f64.sqrt()).abs() < 1e-12);
        assert!((b.diameter(&m) - 8.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_bounds_bracket_point_distances() {
        let m = EuclideanDistance::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let xs: Vec<[f64; 2]> = (0..5)
                .map(|_| [rng.r#gen::<f64>() * 10.0, rng.r#gen::<f64>() * 10.0])
                .collect();
            let ys: Vec<[f64; 2]> = (0..5)
                .map(|_| [rng.r#gen::<f64>() * 10.0 - 5.0, rng.r#gen::<f64>() * 10.0])
                .collect();
            let (a, b) = (rect(&xs), rect(&ys));
            let r = a.range_distance(&b, &m);
            for x in &xs {
                for y in &ys {
                    let d = m.evaluate(x, y);
                    assert!(r.lo <= d + 1e-9 && d <= r.hi + 1e-9, "{d} outside {r:?}");
                }
                let lo = b.min_distance_point(x, &m);
                let hi = b.max_distance_point(x, &m);
                for y in &ys {
                    let d = m.evaluate(x, y);
                    assert!(lo <= d + 1e-9 && d <= hi + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_union_covers_both() {
        let mut a = rect(&[[0.0, 0.0]]);
        let b = rect(&[[3.0, -2.0]]);
        a.union(&b);
        assert!(a.contains(&[0.0, 0.0]));
        assert!(a.contains(&[3.0, -2.0]));
        a.union(&HRectBound::new(2));
        assert_eq!(a.ranges()[0], Range::new(0.0, 3.0));
    }
}
