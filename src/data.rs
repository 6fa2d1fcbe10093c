//! Row-oriented access to the vectors being clustered.
//!
//! The drivers never need the whole data set in memory: they read one block of
//! rows at a time through [`DataSource::read_rows`], so an implementation may
//! be backed by a memory map, a file reader or a remote store. Only in-memory
//! ndarray sources are provided here.

use crate::error::KMeansError;
use ndarray::{s, Array1, Array2, ArrayView2, ArrayViewMut2};
use rand::RngCore;

/// Random and block-wise read access to `n_samples()` rows of `n_features()` values.
///
/// Implementations must tolerate concurrent reads from the worker threads of
/// an assignment pass. The clustering core never writes to a data source.
pub trait DataSource: Sync {
    /// Number of rows (N).
    fn n_samples(&self) -> usize;

    /// Dimensionality of every row (D).
    fn n_features(&self) -> usize;

    /// Copy rows `[start, stop)` into `out`, which has shape `(stop - start, D)`.
    fn read_rows(
        &self,
        start: usize,
        stop: usize,
        out: ArrayViewMut2<'_, f32>,
    ) -> Result<(), KMeansError>;

    /// Read a single row as an owned vector.
    fn fetch_row(&self, index: usize) -> Result<Array1<f32>, KMeansError> {
        let block = self.fetch_rows(index, index + 1)?;
        Ok(block.row(0).to_owned())
    }

    /// Read rows `[start, stop)` into a freshly allocated block.
    fn fetch_rows(&self, start: usize, stop: usize) -> Result<Array2<f32>, KMeansError> {
        check_range(start, stop, self.n_samples())?;
        let mut block = Array2::zeros((stop - start, self.n_features()));
        self.read_rows(start, stop, block.view_mut())?;
        Ok(block)
    }

    /// Copy `n` distinct rows, drawn uniformly without replacement.
    fn random_rows(&self, n: usize, rng: &mut dyn RngCore) -> Result<Array2<f32>, KMeansError> {
        let len = self.n_samples();
        if n > len {
            return Err(KMeansError::InsufficientData(format!(
                "Cannot sample {} distinct rows from {} rows",
                n, len
            )));
        }

        let mut out = Array2::zeros((n, self.n_features()));
        for (i, index) in rand::seq::index::sample(rng, len, n).iter().enumerate() {
            self.read_rows(index, index + 1, out.slice_mut(s![i..i + 1, ..]))?;
        }
        Ok(out)
    }
}

pub(crate) fn check_range(start: usize, stop: usize, len: usize) -> Result<(), KMeansError> {
    if start > stop || stop > len {
        return Err(KMeansError::DataAccess(format!(
            "Row range {}..{} is out of bounds for {} rows",
            start, stop, len
        )));
    }
    Ok(())
}

fn copy_view_rows(
    data: &ArrayView2<'_, f32>,
    start: usize,
    stop: usize,
    mut out: ArrayViewMut2<'_, f32>,
) -> Result<(), KMeansError> {
    check_range(start, stop, data.nrows())?;
    if out.dim() != (stop - start, data.ncols()) {
        return Err(KMeansError::InvalidDimensions(format!(
            "Output block has shape {:?}, expected ({}, {})",
            out.dim(),
            stop - start,
            data.ncols()
        )));
    }
    out.assign(&data.slice(s![start..stop, ..]));
    Ok(())
}

/// A data source over an in-memory `(n_samples, n_features)` matrix.
#[derive(Debug, Clone)]
pub struct ArrayDataSource<'a> {
    data: ArrayView2<'a, f32>,
}

impl<'a> ArrayDataSource<'a> {
    pub fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    pub fn view(&self) -> &ArrayView2<'a, f32> {
        &self.data
    }
}

impl DataSource for ArrayDataSource<'_> {
    fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    fn n_features(&self) -> usize {
        self.data.ncols()
    }

    fn read_rows(
        &self,
        start: usize,
        stop: usize,
        out: ArrayViewMut2<'_, f32>,
    ) -> Result<(), KMeansError> {
        copy_view_rows(&self.data, start, stop, out)
    }
}

impl DataSource for ArrayView2<'_, f32> {
    fn n_samples(&self) -> usize {
        self.nrows()
    }

    fn n_features(&self) -> usize {
        self.ncols()
    }

    fn read_rows(
        &self,
        start: usize,
        stop: usize,
        out: ArrayViewMut2<'_, f32>,
    ) -> Result<(), KMeansError> {
        copy_view_rows(self, start, stop, out)
    }
}

impl DataSource for Array2<f32> {
    fn n_samples(&self) -> usize {
        self.nrows()
    }

    fn n_features(&self) -> usize {
        self.ncols()
    }

    fn read_rows(
        &self,
        start: usize,
        stop: usize,
        out: ArrayViewMut2<'_, f32>,
    ) -> Result<(), KMeansError> {
        copy_view_rows(&self.view(), start, stop, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn test_rows_and_row() {
        let data = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let source = ArrayDataSource::new(data.view());

        assert_eq!(source.n_samples(), 3);
        assert_eq!(source.n_features(), 2);
        assert_eq!(source.fetch_rows(1, 3).unwrap(), array![[3.0f32, 4.0], [5.0, 6.0]]);
        assert_eq!(source.fetch_row(0).unwrap(), array![1.0f32, 2.0]);
    }

    #[test]
    fn test_out_of_bounds_range() {
        let data = Array2::<f32>::zeros((4, 2));
        assert!(matches!(data.fetch_rows(2, 5), Err(KMeansError::DataAccess(_))));
        assert!(matches!(data.fetch_rows(3, 2), Err(KMeansError::DataAccess(_))));
    }

    #[test]
    fn test_random_rows_are_distinct_copies() {
        let data = Array2::from_shape_fn((50, 3), |(i, j)| (i * 3 + j) as f32);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let mut sample = data.random_rows(10, &mut rng).unwrap();
        let firsts: HashSet<i64> = sample.column(0).iter().map(|&v| v as i64).collect();
        assert_eq!(firsts.len(), 10);

        // Mutating the sample must leave the source untouched
        sample.fill(-1.0);
        assert!(data.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_random_rows_too_many() {
        let data = Array2::<f32>::zeros((3, 2));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            data.random_rows(4, &mut rng),
            Err(KMeansError::InsufficientData(_))
        ));
    }
}
