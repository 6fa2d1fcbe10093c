use crate::algorithm::{block_jobs, install, kmeans_blocked};
use crate::config::KMeansConfig;
use crate::data::DataSource;
use crate::error::KMeansError;
use crate::init::{KMeansInit, RandomInit};
use crate::result::{index_clusters, KMeansResult};
use ndarray::Array1;
use std::sync::Arc;

/// Block-parallel k-means with a pluggable nearest-centroid strategy.
///
/// Each iteration builds one index over the current centroids with the
/// configured [`crate::AssignerFactory`], assigns the data source in blocks of
/// `block_size` rows on the thread pool and replaces every centroid by the
/// mean of its rows. Empty clusters are reseeded with a random data row. The
/// loop always runs `max_iters` iterations.
///
/// # Example
///
/// ```
/// use streamkmeans_rs::KMeans;
/// use ndarray::Array2;
/// use ndarray_rand::RandomExt;
/// use ndarray_rand::rand_distr::Uniform;
///
/// // Generate random data
/// let data = Array2::random((1000, 32), Uniform::new(-1.0f32, 1.0));
///
/// // Create and train the model
/// let kmeans = KMeans::new(10).unwrap();
/// let result = kmeans.cluster(&data).unwrap();
///
/// // Get cluster assignments
/// let labels = result.assign(&data.view()).unwrap();
/// assert_eq!(labels.len(), 1000);
/// ```
#[derive(Debug, Clone)]
pub struct KMeans {
    /// Model configuration
    config: KMeansConfig,

    /// Produces the starting centroids
    init: Arc<dyn KMeansInit>,
}

impl KMeans {
    /// Create a new KMeans instance with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `k` is 0.
    pub fn new(k: usize) -> Result<Self, KMeansError> {
        Self::with_config(KMeansConfig::new(k)?)
    }

    /// Create a new KMeans instance with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_config(config: KMeansConfig) -> Result<Self, KMeansError> {
        config.validate()?;
        Ok(Self {
            config,
            init: Arc::new(RandomInit),
        })
    }

    /// Use a different initialization strategy.
    pub fn with_init(mut self, init: Arc<dyn KMeansInit>) -> Self {
        self.init = init;
        self
    }

    /// Cluster the rows of `data`.
    ///
    /// The returned result carries an index built over the final centroids
    /// by the configured factory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - Number of samples is less than k
    /// - The initial centroids do not match the data dimensions
    /// - The data source or the assignment strategy fails
    /// - The run is cancelled
    pub fn cluster(&self, data: &dyn DataSource) -> Result<KMeansResult, KMeansError> {
        let run = kmeans_blocked(data, &self.config, self.init.as_ref())?;
        let index = install(self.config.thread_pool.as_deref(), || {
            self.config.factory.build(&run.centroids.view())
        })?;
        Ok(KMeansResult::new(run.centroids, run.n_iterations, Some(index)))
    }

    /// Cluster `data`, then label every row with the trained model.
    pub fn fit_predict(&self, data: &dyn DataSource) -> Result<Array1<usize>, KMeansError> {
        let result = self.cluster(data)?;
        let assigner = result.default_hard_assigner()?;

        install(self.config.thread_pool.as_deref(), || -> Result<_, KMeansError> {
            let mut labels = Vec::with_capacity(data.n_samples());
            for job in block_jobs(data.n_samples(), self.config.block_size) {
                let points = data.fetch_rows(job.rows.start, job.rows.end)?;
                labels.extend(assigner.assign(&points.view())?.iter().copied());
            }
            Ok(Array1::from_vec(labels))
        })
    }

    /// Cluster `data` and return the row indices of each cluster.
    pub fn perform_clustering(&self, data: &dyn DataSource) -> Result<Vec<Vec<usize>>, KMeansError> {
        let labels = self.fit_predict(data)?;
        Ok(index_clusters(&labels, self.config.k))
    }

    /// Get the number of clusters.
    pub fn k(&self) -> usize {
        self.config.k
    }

    /// Get the configuration.
    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Replace the configuration used by later runs.
    pub fn set_config(&mut self, config: KMeansConfig) -> Result<(), KMeansError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Get the initialization strategy.
    pub fn init(&self) -> &dyn KMeansInit {
        self.init.as_ref()
    }
}
