//! Strategies that produce the starting centroids.
//!
//! Every strategy returns an owned `(k, n_features)` matrix. Rows sampled from
//! the data source are copies, so the drivers can update centroids in place
//! without touching the data.

use crate::data::DataSource;
use crate::distance::normalize_in_place;
use crate::error::KMeansError;
use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::{Distribution, StandardNormal};
use rand::{Rng, RngCore};
use rayon::prelude::*;
use std::fmt;

/// Produces exactly `k` centroids of the data source's dimensionality.
pub trait KMeansInit: Send + Sync + fmt::Debug {
    fn init(
        &self,
        data: &dyn DataSource,
        k: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError>;
}

/// `k` distinct rows drawn uniformly without replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomInit;

impl KMeansInit for RandomInit {
    fn init(
        &self,
        data: &dyn DataSource,
        k: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError> {
        data.random_rows(k, rng)
    }
}

/// K-Means++ seeding: each new centroid is a row drawn with probability
/// proportional to its squared distance from the closest centroid so far.
///
/// The data source is streamed `block_size` rows at a time, once per chosen
/// centroid. Only the per-row minimum distances are kept in memory.
#[derive(Debug, Clone)]
pub struct KMeansPlusPlusInit {
    pub block_size: usize,
}

impl Default for KMeansPlusPlusInit {
    fn default() -> Self {
        Self {
            block_size: crate::config::DEFAULT_BLOCK_SIZE,
        }
    }
}

impl KMeansPlusPlusInit {
    /// Lower `min_dists` with the distance of every row to `centroid`.
    fn update_min_dists(
        &self,
        data: &dyn DataSource,
        centroid: &Array1<f32>,
        min_dists: &mut [f32],
    ) -> Result<(), KMeansError> {
        let block_size = self.block_size.max(1);
        for (block_idx, dists) in min_dists.chunks_mut(block_size).enumerate() {
            let start = block_idx * block_size;
            let block = data.fetch_rows(start, start + dists.len())?;

            dists.par_iter_mut().enumerate().for_each(|(i, best)| {
                let dist: f32 = block
                    .row(i)
                    .iter()
                    .zip(centroid.iter())
                    .map(|(&x, &c)| (x - c) * (x - c))
                    .sum();
                if dist < *best {
                    *best = dist;
                }
            });
        }
        Ok(())
    }
}

impl KMeansInit for KMeansPlusPlusInit {
    fn init(
        &self,
        data: &dyn DataSource,
        k: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError> {
        let n_samples = data.n_samples();
        if k > n_samples {
            return Err(KMeansError::InsufficientData(format!(
                "Number of samples ({}) is less than k ({})",
                n_samples, k
            )));
        }

        let mut centroids = Array2::zeros((k, data.n_features()));
        if k == 0 {
            return Ok(centroids);
        }

        let first = data.fetch_row(rng.gen_range(0..n_samples))?;
        centroids.row_mut(0).assign(&first);

        let mut min_dists = vec![f32::INFINITY; n_samples];
        let mut last = first;

        for c in 1..k {
            self.update_min_dists(data, &last, &mut min_dists)?;

            let total: f64 = min_dists.iter().map(|&d| d as f64).sum();
            let chosen = if total > 0.0 && total.is_finite() {
                let target = rng.gen::<f64>() * total;
                let mut cumulative = 0.0f64;
                let mut chosen = n_samples - 1;
                for (i, &d) in min_dists.iter().enumerate() {
                    cumulative += d as f64;
                    if cumulative > target {
                        chosen = i;
                        break;
                    }
                }
                chosen
            } else {
                // Every row coincides with a centroid already
                rng.gen_range(0..n_samples)
            };

            last = data.fetch_row(chosen)?;
            centroids.row_mut(c).assign(&last);
        }

        Ok(centroids)
    }
}

/// Caller-supplied starting centroids.
#[derive(Debug, Clone)]
pub struct FixedInit {
    centroids: Array2<f32>,
}

impl FixedInit {
    pub fn new(centroids: Array2<f32>) -> Self {
        Self { centroids }
    }
}

impl KMeansInit for FixedInit {
    fn init(
        &self,
        data: &dyn DataSource,
        k: usize,
        _rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError> {
        if self.centroids.nrows() != k {
            return Err(KMeansError::InvalidK(format!(
                "Initial centroids contain {} rows, expected k = {}",
                self.centroids.nrows(),
                k
            )));
        }
        if self.centroids.ncols() != data.n_features() {
            return Err(KMeansError::InvalidDimensions(format!(
                "Initial centroids have {} features, data has {}",
                self.centroids.ncols(),
                data.n_features()
            )));
        }
        Ok(self.centroids.clone())
    }
}

/// Gaussian random directions scaled to unit length. Only the data
/// dimensionality is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomUnitInit;

impl KMeansInit for RandomUnitInit {
    fn init(
        &self,
        data: &dyn DataSource,
        k: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError> {
        let n_features = data.n_features();
        if n_features == 0 {
            return Err(KMeansError::InvalidDimensions(
                "Cannot draw unit vectors in zero dimensions".to_string(),
            ));
        }

        let mut centroids = Array2::zeros((k, n_features));
        for c in 0..k {
            centroids
                .row_mut(c)
                .assign(&random_unit_vector(n_features, rng));
        }
        Ok(centroids)
    }
}

/// Draw one Gaussian direction of unit L2 length. `n_features` must be > 0.
pub(crate) fn random_unit_vector(n_features: usize, rng: &mut dyn RngCore) -> Array1<f32> {
    loop {
        let mut v: Array1<f32> =
            Array1::from_shape_fn(n_features, |_| StandardNormal.sample(&mut *rng));
        if normalize_in_place(v.view_mut()) {
            return v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_random_init() {
        let data = Array2::random((100, 8), Uniform::new(-1.0f32, 1.0));
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let centroids = RandomInit.init(&data, 5, &mut rng).unwrap();

        assert_eq!(centroids.nrows(), 5);
        assert_eq!(centroids.ncols(), 8);
        for centroid in centroids.outer_iter() {
            assert!(data.outer_iter().any(|row| row == centroid));
        }
    }

    #[test]
    fn test_random_init_k_too_large() {
        let data = Array2::random((3, 2), Uniform::new(-1.0f32, 1.0));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(RandomInit.init(&data, 4, &mut rng).is_err());
    }

    #[test]
    fn test_kmeans_plus_plus_spreads_centroids() {
        // Two tight groups far apart: the second centroid must land in the other group
        let data = array![
            [0.0f32, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [100.0, 100.0],
            [100.1, 100.0],
            [100.0, 100.1]
        ];

        for seed in 0..10 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let init = KMeansPlusPlusInit { block_size: 2 };
            let centroids = init.init(&data, 2, &mut rng).unwrap();

            let near_origin = centroids.outer_iter().filter(|c| c[0] < 50.0).count();
            assert_eq!(near_origin, 1, "seed {} produced {:?}", seed, centroids);
        }
    }

    #[test]
    fn test_kmeans_plus_plus_duplicates() {
        let data = Array2::<f32>::ones((5, 3));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let centroids = KMeansPlusPlusInit::default()
            .init(&data, 3, &mut rng)
            .unwrap();
        assert_eq!(centroids, Array2::<f32>::ones((3, 3)));
    }

    #[test]
    fn test_fixed_init_validates_shape() {
        let data = Array2::<f32>::zeros((10, 3));
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let init = FixedInit::new(Array2::zeros((2, 4)));
        assert!(matches!(
            init.init(&data, 2, &mut rng),
            Err(KMeansError::InvalidDimensions(_))
        ));

        let init = FixedInit::new(Array2::zeros((3, 3)));
        assert!(matches!(
            init.init(&data, 2, &mut rng),
            Err(KMeansError::InvalidK(_))
        ));

        let init = FixedInit::new(Array2::ones((2, 3)));
        assert_eq!(init.init(&data, 2, &mut rng).unwrap(), Array2::ones((2, 3)));
    }

    #[test]
    fn test_random_unit_init() {
        let data = Array2::<f32>::zeros((10, 16));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let centroids = RandomUnitInit.init(&data, 4, &mut rng).unwrap();

        assert_eq!(centroids.dim(), (4, 16));
        for centroid in centroids.outer_iter() {
            assert_relative_eq!(centroid.dot(&centroid), 1.0, epsilon = 1e-5);
        }
    }
}
