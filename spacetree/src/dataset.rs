use std::slice::ChunksExact;

use crate::SpaceTreeError;

/// An immutable, row-major matrix of points.
///
/// Point `i` is the slice `data[i * dim..(i + 1) * dim]`. Trees built over a
/// dataset never move its rows; they keep their own index permutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    dim: usize,
    data: Vec<f64>,
}

impl Dataset {
    /// Wraps a flat row-major buffer. The buffer may be empty.
    pub fn new(dim: usize, data: Vec<f64>) -> Result<Self, SpaceTreeError> {
        if dim == 0 {
            return Err(SpaceTreeError::ZeroDimension);
        }
        if data.len() % dim != 0 {
            return Err(SpaceTreeError::ShapeMismatch {
                len: data.len(),
                dim,
            });
        }
        Ok(Self { dim, data })
    }

    /// Copies a list of equally sized rows into a dataset.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, SpaceTreeError> {
        let dim = rows
            .first()
            .ok_or(SpaceTreeError::EmptyDataset)?
            .as_ref()
            .len();
        if dim == 0 {
            return Err(SpaceTreeError::ZeroDimension);
        }

        let mut data = Vec::with_capacity(rows.len() * dim);
        for (row, values) in rows.iter().enumerate() {
            let values = values.as_ref();
            if values.len() != dim {
                return Err(SpaceTreeError::RaggedRows {
                    row,
                    expected: dim,
                    got: values.len(),
                });
            }
            data.extend_from_slice(values);
        }
        Ok(Self { dim, data })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Dimension of every point.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns point `i`. Panics if `i` is out of range.
    #[inline]
    pub fn point(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Iterates over the points in index order.
    pub fn iter(&self) -> ChunksExact<'_, f64> {
        self.data.chunks_exact(self.dim)
    }

    /// The underlying row-major buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Copies the points out as owned rows.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.iter().map(<[f64]>::to_vec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_and_access() {
        let ds = Dataset::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.dim(), 2);
        assert_eq!(ds.point(1), &[3.0, 4.0]);
        assert_eq!(ds.iter().count(), 3);
        assert_eq!(ds.to_rows()[2], vec![5.0, 6.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = Dataset::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            SpaceTreeError::RaggedRows {
                row: 1,
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_empty_and_zero_dim() {
        let rows: Vec<Vec<f64>> = Vec::new();
        assert_eq!(Dataset::from_rows(&rows).unwrap_err(), SpaceTreeError::EmptyDataset);
        assert_eq!(Dataset::new(0, vec![]).unwrap_err(), SpaceTreeError::ZeroDimension);

        let empty = Dataset::new(3, vec![]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
    }

    #[test]
    fn test_shape_mismatch() {
        assert_eq!(
            Dataset::new(2, vec![1.0, 2.0, 3.0]).unwrap_err(),
            SpaceTreeError::ShapeMismatch { len: 3, dim: 2 }
        );
    }
}
