use crate::assign::Assigner;
use crate::cancel::check_cancelled;
use crate::config::KMeansConfig;
use crate::data::DataSource;
use crate::distance::compute_centroid_shift;
use crate::error::KMeansError;
use crate::init::KMeansInit;
use log::{debug, info, log_enabled, Level};
use ndarray::{Array2, ArrayView1, Zip};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::ops::Range;
use std::time::Instant;

/// Result of the generic k-means loop
#[derive(Debug, Clone)]
pub struct KMeansRun {
    pub centroids: Array2<f32>,
    pub n_iterations: usize,
}

/// Per-worker running sums, counts and score total for one iteration.
///
/// Sums are kept in f64 regardless of the f32 storage of the data so that
/// adding millions of rows does not lose precision.
#[derive(Debug, Clone)]
pub struct Accumulator {
    pub sums: Array2<f64>,
    pub counts: Vec<usize>,
    pub score_sum: f64,
}

impl Accumulator {
    pub fn zeros(k: usize, n_features: usize) -> Self {
        Self {
            sums: Array2::zeros((k, n_features)),
            counts: vec![0; k],
            score_sum: 0.0,
        }
    }

    #[inline]
    pub fn add(&mut self, label: usize, point: &ArrayView1<f32>, score: f32) {
        Zip::from(self.sums.row_mut(label))
            .and(point)
            .for_each(|sum, &x| *sum += x as f64);
        self.counts[label] += 1;
        self.score_sum += score as f64;
    }

    pub fn merge(mut self, other: Accumulator) -> Self {
        self.sums += &other.sums;
        for (count, other_count) in self.counts.iter_mut().zip(other.counts) {
            *count += other_count;
        }
        self.score_sum += other.score_sum;
        self
    }

    pub fn total_count(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Assignment of one contiguous block of rows `[start, stop)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentJob {
    pub rows: Range<usize>,
}

impl AssignmentJob {
    /// Read the block, query the index and fold every point into `acc`.
    ///
    /// Only `acc` is written; the data source and the centroids behind the
    /// index are read-only.
    pub fn run(
        &self,
        data: &dyn DataSource,
        assigner: &dyn Assigner,
        acc: &mut Accumulator,
    ) -> Result<(), KMeansError> {
        let points = data.fetch_rows(self.rows.start, self.rows.end)?;
        let assignment = assigner.search_nn(&points.view())?;
        assignment.validate(points.nrows(), acc.counts.len())?;

        for (i, point) in points.outer_iter().enumerate() {
            acc.add(assignment.labels[i], &point, assignment.scores[i]);
        }
        Ok(())
    }
}

/// Split `0..n_samples` into contiguous jobs of at most `block_size` rows.
pub fn block_jobs(n_samples: usize, block_size: usize) -> Vec<AssignmentJob> {
    let block_size = block_size.max(1);
    (0..n_samples)
        .step_by(block_size)
        .map(|start| AssignmentJob {
            rows: start..(start + block_size).min(n_samples),
        })
        .collect()
}

/// Run `op` inside `pool`, or on the current rayon context when there is none.
pub(crate) fn install<OP, R>(pool: Option<&ThreadPool>, op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Fan the jobs out over the pool and reduce the per-worker accumulators.
///
/// Returns only once every job has finished; the first failing job fails the
/// whole pass.
pub fn assign_and_accumulate(
    data: &dyn DataSource,
    assigner: &dyn Assigner,
    jobs: &[AssignmentJob],
    k: usize,
    config: &KMeansConfig,
    iteration: usize,
) -> Result<Accumulator, KMeansError> {
    let n_features = data.n_features();
    let cancel = config.cancel.as_ref();

    install(config.thread_pool.as_deref(), || {
        jobs.par_iter()
            .try_fold(
                || Accumulator::zeros(k, n_features),
                |mut acc, job| -> Result<Accumulator, KMeansError> {
                    check_cancelled(cancel, iteration)?;
                    job.run(data, assigner, &mut acc)?;
                    Ok(acc)
                },
            )
            .try_reduce(
                || Accumulator::zeros(k, n_features),
                |a, b| Ok(a.merge(b)),
            )
    })
}

pub(crate) fn validate_data(data: &dyn DataSource, k: usize) -> Result<(), KMeansError> {
    let n_samples = data.n_samples();
    if data.n_features() == 0 {
        return Err(KMeansError::InvalidDimensions(
            "Data has zero features".to_string(),
        ));
    }
    if n_samples < k {
        return Err(KMeansError::InsufficientData(format!(
            "Number of samples ({}) is less than k ({})",
            n_samples, k
        )));
    }
    Ok(())
}

/// Run the block-parallel k-means loop for exactly `config.max_iters` iterations.
pub fn kmeans_blocked(
    data: &dyn DataSource,
    config: &KMeansConfig,
    init: &dyn KMeansInit,
) -> Result<KMeansRun, KMeansError> {
    config.validate()?;
    validate_data(data, config.k)?;

    let n_samples = data.n_samples();
    let n_features = data.n_features();
    let k = config.k;

    let pool = config.thread_pool.as_deref();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut centroids = install(pool, || init.init(data, k, &mut rng))?;
    if centroids.dim() != (k, n_features) {
        return Err(KMeansError::InvalidDimensions(format!(
            "Initialization produced centroids of shape {:?}, expected ({}, {})",
            centroids.dim(),
            k,
            n_features
        )));
    }

    let jobs = block_jobs(n_samples, config.block_size);

    info!(
        "Training k-means: {} samples, {} features, {} clusters, {} blocks of up to {} rows",
        n_samples,
        n_features,
        k,
        jobs.len(),
        config.block_size
    );
    let run_start = Instant::now();

    for iteration in 0..config.max_iters {
        check_cancelled(config.cancel.as_ref(), iteration)?;
        let iter_start = Instant::now();

        // One index per iteration, shared read-only by every job
        let assigner = install(pool, || config.factory.build(&centroids.view()))?;
        if assigner.n_centroids() != k || assigner.n_features() != n_features {
            return Err(KMeansError::Assignment(format!(
                "Factory built an index over {} centroids of {} features, expected {} of {}",
                assigner.n_centroids(),
                assigner.n_features(),
                k,
                n_features
            )));
        }

        let acc = assign_and_accumulate(data, assigner.as_ref(), &jobs, k, config, iteration)?;
        let assigned = acc.total_count();
        if assigned != n_samples {
            return Err(KMeansError::Assignment(format!(
                "Assigned {} of {} samples",
                assigned, n_samples
            )));
        }

        let prev_centroids = log_enabled!(Level::Debug).then(|| centroids.clone());
        let mut n_reseeded = 0;

        for cluster_idx in 0..k {
            let count = acc.counts[cluster_idx];
            if count > 0 {
                let inv = 1.0 / count as f64;
                Zip::from(centroids.row_mut(cluster_idx))
                    .and(acc.sums.row(cluster_idx))
                    .for_each(|c, &sum| *c = (sum * inv) as f32);
            } else {
                // Empty cluster: replace with a fresh random row
                let replacement = data.random_rows(1, &mut rng)?;
                centroids.row_mut(cluster_idx).assign(&replacement.row(0));
                n_reseeded += 1;
            }
        }

        if let Some(prev_centroids) = prev_centroids {
            debug!(
                "Iteration {}/{}: mean score = {:.6}, shift = {:.6}, reseeded = {}, time = {:.4}s",
                iteration + 1,
                config.max_iters,
                acc.score_sum / n_samples as f64,
                compute_centroid_shift(&prev_centroids.view(), &centroids.view()),
                n_reseeded,
                iter_start.elapsed().as_secs_f64()
            );
        }
    }

    info!(
        "Finished {} iterations in {:.3}s",
        config.max_iters,
        run_start.elapsed().as_secs_f64()
    );

    Ok(KMeansRun {
        centroids,
        n_iterations: config.max_iters,
    })
}
