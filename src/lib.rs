//! # streamkmeans-rs
//!
//! Block-parallel k-means clustering over row-oriented data sources,
//! compatible with ndarray.
//!
//! ## Features
//!
//! - **Streamed data access**: Any [`DataSource`] works, rows are read one
//!   block at a time so the full dataset never has to be materialized
//! - **Parallel computation**: Blocks are assigned on a rayon thread pool and
//!   reduced from per-worker accumulators, without locks on the hot path
//! - **Pluggable assignment**: An [`AssignerFactory`] builds the
//!   nearest-centroid index once per iteration, exact search is the default
//! - **Spherical k-means**: Unit-length centroids maximizing inner product,
//!   with damped updates and early stopping
//! - **Optional BLAS acceleration**: Enable `accelerate` (macOS) or `openblas` features for faster matrix operations
//!
//! ## Example
//!
//! ```rust
//! use streamkmeans_rs::{KMeans, KMeansConfig};
//! use ndarray::Array2;
//! use ndarray_rand::RandomExt;
//! use ndarray_rand::rand_distr::Uniform;
//!
//! // Generate random data
//! let data = Array2::random((1000, 128), Uniform::new(-1.0f32, 1.0));
//!
//! // Create and train the model
//! let kmeans = KMeans::new(10).unwrap();
//! let result = kmeans.cluster(&data).unwrap();
//!
//! // Get cluster assignments
//! let labels = result.assign(&data.view()).unwrap();
//! assert_eq!(labels.len(), 1000);
//! ```
//!
//! ## Custom Configuration
//!
//! ```rust
//! use std::sync::Arc;
//! use streamkmeans_rs::{ExactAssignerFactory, KMeans, KMeansConfig, KMeansPlusPlusInit};
//! use ndarray::Array2;
//! use ndarray_rand::RandomExt;
//! use ndarray_rand::rand_distr::Uniform;
//!
//! let data = Array2::random((5000, 64), Uniform::new(-1.0f32, 1.0));
//!
//! let config = KMeansConfig::new(50)
//!     .unwrap()
//!     .with_max_iters(20)
//!     .with_block_size(1_000)
//!     .with_seed(42)
//!     .with_factory(Arc::new(ExactAssignerFactory {
//!         chunk_size_centroids: 16,
//!     }));
//!
//! let kmeans = KMeans::with_config(config)
//!     .unwrap()
//!     .with_init(Arc::new(KMeansPlusPlusInit::default()));
//! let clusters = kmeans.perform_clustering(&data).unwrap();
//! assert_eq!(clusters.len(), 50);
//! ```
//!
//! ## Spherical K-Means
//!
//! ```rust
//! use streamkmeans_rs::{SphericalKMeans, SphericalKMeansConfig};
//! use ndarray::Array2;
//! use ndarray_rand::RandomExt;
//! use ndarray_rand::rand_distr::Uniform;
//!
//! let data = Array2::random((2000, 32), Uniform::new(-1.0f32, 1.0));
//!
//! let config = SphericalKMeansConfig::new(8).unwrap().with_damped(false);
//! let result = SphericalKMeans::with_config(config)
//!     .unwrap()
//!     .cluster(&data)
//!     .unwrap();
//!
//! assert_eq!(result.assignments().len(), 2000);
//! assert!(result.fit() > 0.0);
//! ```
//!
//! ## BLAS Acceleration
//!
//! For improved performance on large datasets, enable a BLAS backend:
//!
//! ```toml
//! # macOS (recommended - uses Apple Accelerate)
//! streamkmeans-rs = { version = "0.1", features = ["accelerate"] }
//!
//! # Linux/Windows (requires OpenBLAS installed)
//! streamkmeans-rs = { version = "0.1", features = ["openblas"] }
//! ```

// Link BLAS libraries when features are enabled
#[cfg(feature = "accelerate")]
extern crate accelerate_src;

#[cfg(feature = "openblas")]
extern crate openblas_src;

mod algorithm;
mod assign;
mod cancel;
mod config;
mod data;
mod distance;
mod error;
mod init;
mod kmeans;
mod result;
mod spherical;

pub use algorithm::{block_jobs, kmeans_blocked, Accumulator, AssignmentJob, KMeansRun};
pub use assign::{
    Assigner, AssignerFactory, Assignment, ExactAssigner, ExactAssignerFactory, HardAssigner,
    InnerProductAssigner, InnerProductAssignerFactory, DEFAULT_CHUNK_SIZE_CENTROIDS,
};
pub use cancel::CancellationToken;
pub use config::{
    KMeansConfig, SphericalKMeansConfig, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_ITERS,
    DEFAULT_SPHERICAL_DELTA,
};
pub use data::{ArrayDataSource, DataSource};
pub use error::KMeansError;
pub use init::{FixedInit, KMeansInit, KMeansPlusPlusInit, RandomInit, RandomUnitInit};
pub use kmeans::KMeans;
pub use result::{index_clusters, KMeansResult, SphericalKMeansResult};
pub use spherical::{spherical_kmeans, SphericalKMeans};
