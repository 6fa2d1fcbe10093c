//! Spherical k-means: inner-product similarity with unit-length centroids.
//!
//! Rows are scanned block by block against every centroid directly, no
//! pluggable index is involved. Centroids start as random unit vectors and are
//! renormalized after every update, so they stay on the unit sphere for the
//! whole run. With damping enabled, each update adds the previous centroid to
//! the sum of its newly assigned rows before renormalizing.
//!
//! The loop stops early once the fit (the sum of every row's best inner
//! product) changes by less than `delta` between two passes.

use crate::algorithm::{install, validate_data, Accumulator};
use crate::cancel::check_cancelled;
use crate::config::SphericalKMeansConfig;
use crate::data::DataSource;
use crate::distance::{find_most_similar_chunked, normalize_in_place};
use crate::error::KMeansError;
use crate::init::{random_unit_vector, KMeansInit, RandomUnitInit};
use crate::result::SphericalKMeansResult;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::time::Instant;

/// Assign every row to its most similar centroid, writing `labels` in place.
///
/// The returned accumulator's `score_sum` is the fit of this pass.
fn scan_blocks(
    data: &dyn DataSource,
    centroids: &ArrayView2<f32>,
    labels: &mut [usize],
    config: &SphericalKMeansConfig,
    iteration: usize,
) -> Result<Accumulator, KMeansError> {
    let k = centroids.nrows();
    let n_features = centroids.ncols();
    let block_size = config.block_size.max(1);
    let cancel = config.cancel.as_ref();

    install(config.thread_pool.as_deref(), || {
        labels
            .par_chunks_mut(block_size)
            .enumerate()
            .try_fold(
                || Accumulator::zeros(k, n_features),
                |mut acc, (block_idx, block_labels)| -> Result<Accumulator, KMeansError> {
                    check_cancelled(cancel, iteration)?;

                    let start = block_idx * block_size;
                    let points = data.fetch_rows(start, start + block_labels.len())?;
                    let (best, sims) = find_most_similar_chunked(
                        &points.view(),
                        centroids,
                        config.chunk_size_centroids,
                    );

                    for (i, point) in points.outer_iter().enumerate() {
                        block_labels[i] = best[i];
                        acc.add(best[i], &point, sims[i]);
                    }
                    Ok(acc)
                },
            )
            .try_reduce(
                || Accumulator::zeros(k, n_features),
                |a, b| Ok(a.merge(b)),
            )
    })
}

/// New unit-length centroid from the previous one and its assigned rows.
///
/// Returns `None` when the update has zero length, e.g. when the assigned
/// rows cancel out exactly.
fn updated_centroid(
    previous: &ArrayView1<f32>,
    sum: &ArrayView1<f64>,
    count: usize,
    damped: bool,
) -> Option<Array1<f32>> {
    let mut centroid: Array1<f32> = if damped {
        sum.iter()
            .zip(previous.iter())
            .map(|(&s, &p)| (s + p as f64) as f32)
            .collect()
    } else {
        let inv = 1.0 / count as f64;
        sum.mapv(|s| (s * inv) as f32)
    };

    if normalize_in_place(centroid.view_mut()) {
        Some(centroid)
    } else {
        None
    }
}

/// Run spherical k-means until the fit settles or `max_iters` passes are done.
pub fn spherical_kmeans(
    data: &dyn DataSource,
    config: &SphericalKMeansConfig,
) -> Result<SphericalKMeansResult, KMeansError> {
    config.validate()?;
    validate_data(data, config.k)?;

    let n_samples = data.n_samples();
    let n_features = data.n_features();
    let k = config.k;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut centroids: Array2<f32> = install(config.thread_pool.as_deref(), || {
        RandomUnitInit.init(data, k, &mut rng)
    })?;
    let mut labels = vec![0usize; n_samples];
    let mut fit_history: Vec<f64> = Vec::new();
    let mut n_iterations = 0;
    let mut converged = false;

    info!(
        "Training spherical k-means: {} samples, {} features, {} clusters, damped = {}",
        n_samples, n_features, k, config.damped
    );
    let run_start = Instant::now();

    for iteration in 0..config.max_iters {
        check_cancelled(config.cancel.as_ref(), iteration)?;
        let iter_start = Instant::now();
        n_iterations = iteration + 1;

        let acc = scan_blocks(data, &centroids.view(), &mut labels, config, iteration)?;
        let fit = acc.score_sum;
        let delta = fit_history.last().map(|prev| (fit - prev).abs());
        fit_history.push(fit);

        if let Some(delta) = delta {
            if delta < config.delta {
                debug!(
                    "Converged after {} iterations (fit {:.6}, delta {:.6} < {:.6})",
                    n_iterations, fit, delta, config.delta
                );
                converged = true;
                break;
            }
        }

        let mut n_reseeded = 0;
        for cluster_idx in 0..k {
            let count = acc.counts[cluster_idx];
            let update = if count > 0 {
                let update = updated_centroid(
                    &centroids.row(cluster_idx),
                    &acc.sums.row(cluster_idx),
                    count,
                    config.damped,
                );
                if update.is_none() {
                    warn!(
                        "Centroid {} collapsed to zero length at iteration {}, reseeding",
                        cluster_idx,
                        iteration + 1
                    );
                }
                update
            } else {
                None
            };

            match update {
                Some(centroid) => centroids.row_mut(cluster_idx).assign(&centroid),
                None => {
                    centroids
                        .row_mut(cluster_idx)
                        .assign(&random_unit_vector(n_features, &mut rng));
                    n_reseeded += 1;
                }
            }
        }

        debug!(
            "Iteration {}/{}: fit = {:.6}, delta = {}, reseeded = {}, time = {:.4}s",
            n_iterations,
            config.max_iters,
            fit,
            delta.map_or_else(|| "n/a".to_string(), |d| format!("{:.6}", d)),
            n_reseeded,
            iter_start.elapsed().as_secs_f64()
        );
    }

    if !converged {
        // Bring the assignments in line with the last centroid update
        let acc = scan_blocks(data, &centroids.view(), &mut labels, config, n_iterations)?;
        fit_history.push(acc.score_sum);
    }

    info!(
        "Finished spherical k-means after {} iterations in {:.3}s (fit {:.6})",
        n_iterations,
        run_start.elapsed().as_secs_f64(),
        fit_history.last().copied().unwrap_or(0.0)
    );

    Ok(SphericalKMeansResult::new(
        centroids,
        Array1::from_vec(labels),
        n_iterations,
        fit_history,
    ))
}

/// Spherical k-means clusterer.
///
/// # Example
///
/// ```
/// use streamkmeans_rs::SphericalKMeans;
/// use ndarray::Array2;
/// use ndarray_rand::RandomExt;
/// use ndarray_rand::rand_distr::Uniform;
///
/// let data = Array2::random((500, 16), Uniform::new(-1.0f32, 1.0));
///
/// let kmeans = SphericalKMeans::new(4).unwrap();
/// let result = kmeans.cluster(&data).unwrap();
///
/// assert_eq!(result.centroids().nrows(), 4);
/// assert_eq!(result.assignments().len(), 500);
/// ```
#[derive(Debug, Clone)]
pub struct SphericalKMeans {
    config: SphericalKMeansConfig,
}

impl SphericalKMeans {
    /// Create a damped spherical k-means with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `k` is 0.
    pub fn new(k: usize) -> Result<Self, KMeansError> {
        Self::with_config(SphericalKMeansConfig::new(k)?)
    }

    /// Create a spherical k-means with a custom configuration.
    pub fn with_config(config: SphericalKMeansConfig) -> Result<Self, KMeansError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Cluster the rows of `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, there are fewer rows
    /// than clusters, the data source fails or the run is cancelled.
    pub fn cluster(&self, data: &dyn DataSource) -> Result<SphericalKMeansResult, KMeansError> {
        spherical_kmeans(data, &self.config)
    }

    /// Cluster `data` and return the training row indices of each cluster.
    pub fn perform_clustering(&self, data: &dyn DataSource) -> Result<Vec<Vec<usize>>, KMeansError> {
        Ok(self.cluster(data)?.clusters())
    }

    pub fn config(&self) -> &SphericalKMeansConfig {
        &self.config
    }

    /// Replace the configuration used by later runs.
    pub fn set_config(&mut self, config: SphericalKMeansConfig) -> Result<(), KMeansError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn k(&self) -> usize {
        self.config.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn assert_unit_rows(centroids: &Array2<f32>) {
        for centroid in centroids.outer_iter() {
            assert_relative_eq!(centroid.dot(&centroid), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_updated_centroid_damped_vs_undamped() {
        let previous = array![1.0f32, 0.0];
        let sum = array![0.0f64, 3.0];

        let undamped = updated_centroid(&previous.view(), &sum.view(), 3, false).unwrap();
        assert_relative_eq!(undamped[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(undamped[1], 1.0, epsilon = 1e-6);

        let damped = updated_centroid(&previous.view(), &sum.view(), 3, true).unwrap();
        let expected = 1.0 / 10.0f32.sqrt();
        assert_relative_eq!(damped[0], expected, epsilon = 1e-6);
        assert_relative_eq!(damped[1], 3.0 * expected, epsilon = 1e-6);
    }

    #[test]
    fn test_updated_centroid_zero_length() {
        let previous = array![1.0f32, 0.0];
        let sum = array![-1.0f64, 0.0];
        assert!(updated_centroid(&previous.view(), &sum.view(), 2, true).is_none());
    }

    #[test]
    fn test_scan_blocks_writes_labels() {
        let data = array![[1.0f32, 0.1], [0.1, 1.0], [0.9, 0.0], [-0.1, 0.8]];
        let centroids = array![[1.0f32, 0.0], [0.0, 1.0]];
        let config = SphericalKMeansConfig::new(2).unwrap().with_block_size(3);

        let mut labels = vec![usize::MAX; 4];
        let acc = scan_blocks(&data, &centroids.view(), &mut labels, &config, 0).unwrap();

        assert_eq!(labels, vec![0, 1, 0, 1]);
        assert_eq!(acc.counts, vec![2, 2]);
        assert_relative_eq!(acc.score_sum, 1.0 + 1.0 + 0.9 + 0.8, epsilon = 1e-5);
    }

    #[test]
    fn test_spherical_basic() {
        let data = Array2::random((400, 8), Uniform::new(-1.0f32, 1.0));
        let config = SphericalKMeansConfig::new(5)
            .unwrap()
            .with_seed(11)
            .with_block_size(50);

        let result = spherical_kmeans(&data, &config).unwrap();

        assert_eq!(result.centroids().dim(), (5, 8));
        assert_eq!(result.assignments().len(), 400);
        assert_eq!(result.assignment_counts().iter().sum::<usize>(), 400);
        assert!(result.n_iterations() >= 1 && result.n_iterations() <= 30);
        assert_unit_rows(result.centroids());
    }

    #[test]
    fn test_assignments_match_final_centroids() {
        let data = Array2::random((300, 6), Uniform::new(-1.0f32, 1.0));
        for damped in [true, false] {
            let config = SphericalKMeansConfig::new(4)
                .unwrap()
                .with_damped(damped)
                .with_max_iters(3)
                .with_delta(0.0);
            let result = spherical_kmeans(&data, &config).unwrap();

            let relabelled = result.assign(&data.view()).unwrap();
            assert_eq!(&relabelled, result.assignments());
        }
    }

    #[test]
    fn test_reseeded_centroids_stay_unit_length() {
        // One distinct direction and three clusters: two are empty every pass
        let data = Array2::from_shape_fn((4, 3), |(_, j)| if j == 0 { 1.0f32 } else { 0.0 });

        for seed in 0..10 {
            for damped in [true, false] {
                let config = SphericalKMeansConfig::new(3)
                    .unwrap()
                    .with_seed(seed)
                    .with_damped(damped)
                    .with_max_iters(5)
                    .with_delta(0.0);
                let result = spherical_kmeans(&data, &config).unwrap();

                assert_unit_rows(result.centroids());
                let counts = result.assignment_counts();
                assert_eq!(counts.iter().sum::<usize>(), 4);
                assert_eq!(counts.iter().filter(|&&c| c == 0).count(), 2);
            }
        }
    }

    #[test]
    fn test_max_iters_bounds_run() {
        let data = Array2::random((200, 4), Uniform::new(-1.0f32, 1.0));
        let config = SphericalKMeansConfig::new(3)
            .unwrap()
            .with_max_iters(2)
            .with_delta(0.0);

        let result = spherical_kmeans(&data, &config).unwrap();
        assert_eq!(result.n_iterations(), 2);
        // Two passes inside the loop plus the final re-assignment
        assert_eq!(result.fit_history().len(), 3);
    }

    #[test]
    fn test_k_larger_than_n_fails() {
        let data = Array2::random((3, 4), Uniform::new(-1.0f32, 1.0));
        let kmeans = SphericalKMeans::new(5).unwrap();
        assert!(matches!(
            kmeans.cluster(&data),
            Err(KMeansError::InsufficientData(_))
        ));
    }
}
