use thiserror::Error;

/// Error types for the streamkmeans library
#[derive(Error, Debug)]
pub enum KMeansError {
    /// The number of clusters k is invalid (must be > 0)
    #[error("Invalid k value: {0}")]
    InvalidK(String),

    /// A configuration value other than k is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Not enough data points for the requested number of clusters
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Dimension mismatch between data, centroids or query points
    #[error("Dimension mismatch: {0}")]
    InvalidDimensions(String),

    /// The data source failed to produce the requested rows
    #[error("Data access failed: {0}")]
    DataAccess(String),

    /// The assignment strategy failed or returned an unusable result
    #[error("Assignment failed: {0}")]
    Assignment(String),

    /// The run was cancelled through its cancellation token
    #[error("Clustering cancelled during iteration {iteration}")]
    Cancelled { iteration: usize },
}
