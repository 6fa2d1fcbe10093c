use crate::assign::{AssignerFactory, ExactAssignerFactory, DEFAULT_CHUNK_SIZE_CENTROIDS};
use crate::cancel::CancellationToken;
use crate::error::KMeansError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Default number of iterations for both drivers.
pub const DEFAULT_MAX_ITERS: usize = 30;

/// Default number of rows handled by one assignment job.
pub const DEFAULT_BLOCK_SIZE: usize = 50_000;

/// Default fit-delta below which the spherical driver stops.
pub const DEFAULT_SPHERICAL_DELTA: f64 = 0.1;

fn build_pool(n_threads: usize) -> Result<Arc<ThreadPool>, KMeansError> {
    ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()
        .map(Arc::new)
        .map_err(|e| KMeansError::InvalidConfig(format!("Failed to build thread pool: {}", e)))
}

fn validate_common(k: usize, max_iters: usize, block_size: usize) -> Result<(), KMeansError> {
    if k == 0 {
        return Err(KMeansError::InvalidK(
            "k must be greater than 0".to_string(),
        ));
    }
    if max_iters == 0 {
        return Err(KMeansError::InvalidConfig(
            "max_iters must be greater than 0".to_string(),
        ));
    }
    if block_size == 0 {
        return Err(KMeansError::InvalidConfig(
            "block_size must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Configuration for the generic k-means driver.
///
/// The configuration is read once at the start of a run; changing it while
/// [`crate::KMeans::cluster`] executes is not possible through the borrow the
/// driver holds.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters
    pub k: usize,

    /// Number of iterations. The generic driver always runs all of them.
    pub max_iters: usize,

    /// Rows read and assigned by one parallel job. Bounds the number of data
    /// rows resident in memory per worker.
    pub block_size: usize,

    /// Random seed for initialization and empty-cluster reseeding
    pub seed: u64,

    /// Builds the nearest-centroid index for each iteration
    pub factory: Arc<dyn AssignerFactory>,

    /// Pool the assignment jobs run on. `None` uses rayon's global pool.
    pub thread_pool: Option<Arc<ThreadPool>>,

    /// Cooperative cancellation, checked per iteration and per job
    pub cancel: Option<CancellationToken>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 8,
            max_iters: DEFAULT_MAX_ITERS,
            block_size: DEFAULT_BLOCK_SIZE,
            seed: 0,
            factory: Arc::new(ExactAssignerFactory::default()),
            thread_pool: None,
            cancel: None,
        }
    }
}

impl KMeansConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Result<Self, KMeansError> {
        let config = Self {
            k,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field that must hold before a run starts.
    pub fn validate(&self) -> Result<(), KMeansError> {
        validate_common(self.k, self.max_iters, self.block_size)
    }

    /// Set the number of clusters
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set the number of iterations
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the number of rows per assignment job
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the assignment strategy
    pub fn with_factory(mut self, factory: Arc<dyn AssignerFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Run assignment jobs on a caller-owned pool
    pub fn with_thread_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.thread_pool = Some(pool);
        self
    }

    /// Run assignment jobs on a dedicated pool of `n_threads` workers
    pub fn with_num_threads(mut self, n_threads: usize) -> Result<Self, KMeansError> {
        self.thread_pool = Some(build_pool(n_threads)?);
        Ok(self)
    }

    /// Attach a cancellation token
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Configuration for the spherical k-means driver.
#[derive(Debug, Clone)]
pub struct SphericalKMeansConfig {
    /// Number of clusters
    pub k: usize,

    /// Upper bound on iterations; the run may stop earlier on a small fit delta
    pub max_iters: usize,

    /// Rows scanned by one parallel job
    pub block_size: usize,

    /// Add the previous centroid to the new evidence before renormalizing
    pub damped: bool,

    /// Stop once the absolute change in fit between iterations is below this
    pub delta: f64,

    /// Random seed for initialization and empty-cluster reseeding
    pub seed: u64,

    /// Number of centroids compared per matrix product
    pub chunk_size_centroids: usize,

    /// Pool the scan jobs run on. `None` uses rayon's global pool.
    pub thread_pool: Option<Arc<ThreadPool>>,

    /// Cooperative cancellation, checked per iteration and per job
    pub cancel: Option<CancellationToken>,
}

impl Default for SphericalKMeansConfig {
    fn default() -> Self {
        Self {
            k: 8,
            max_iters: DEFAULT_MAX_ITERS,
            block_size: DEFAULT_BLOCK_SIZE,
            damped: true,
            delta: DEFAULT_SPHERICAL_DELTA,
            seed: 0,
            chunk_size_centroids: DEFAULT_CHUNK_SIZE_CENTROIDS,
            thread_pool: None,
            cancel: None,
        }
    }
}

impl SphericalKMeansConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Result<Self, KMeansError> {
        let config = Self {
            k,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KMeansError> {
        validate_common(self.k, self.max_iters, self.block_size)?;
        if !self.delta.is_finite() || self.delta < 0.0 {
            return Err(KMeansError::InvalidConfig(format!(
                "delta must be a non-negative finite number, got {}",
                self.delta
            )));
        }
        Ok(())
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Choose between damped (default) and undamped centroid updates
    pub fn with_damped(mut self, damped: bool) -> Self {
        self.damped = damped;
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_chunk_size_centroids(mut self, chunk_size: usize) -> Self {
        self.chunk_size_centroids = chunk_size;
        self
    }

    pub fn with_thread_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.thread_pool = Some(pool);
        self
    }

    pub fn with_num_threads(mut self, n_threads: usize) -> Result<Self, KMeansError> {
        self.thread_pool = Some(build_pool(n_threads)?);
        Ok(self)
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
