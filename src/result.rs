use crate::assign::{
    Assigner, AssignerFactory, Assignment, ExactAssigner, HardAssigner, InnerProductAssigner,
    DEFAULT_CHUNK_SIZE_CENTROIDS,
};
use crate::error::KMeansError;
use ndarray::{Array1, Array2, ArrayView2};

/// Group row indices by cluster label.
pub fn index_clusters(labels: &Array1<usize>, k: usize) -> Vec<Vec<usize>> {
    let mut clusters = vec![Vec::new(); k];
    for (row, &label) in labels.iter().enumerate() {
        if label < k {
            clusters[label].push(row);
        }
    }
    clusters
}

/// Output of [`crate::KMeans::cluster`].
///
/// Owns the final centroids and, when produced by a run, the index the
/// configured factory built over them. A deserialized result carries no index
/// and falls back to an exact squared-Euclidean scan until one is attached
/// with [`KMeansResult::with_index`].
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KMeansResult {
    centroids: Array2<f32>,
    n_iterations: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: Option<Box<dyn Assigner>>,
}

impl KMeansResult {
    pub(crate) fn new(
        centroids: Array2<f32>,
        n_iterations: usize,
        index: Option<Box<dyn Assigner>>,
    ) -> Self {
        Self {
            centroids,
            n_iterations,
            index,
        }
    }

    /// Centroid matrix of shape (k, n_features)
    pub fn centroids(&self) -> &Array2<f32> {
        &self.centroids
    }

    pub fn into_centroids(self) -> Array2<f32> {
        self.centroids
    }

    /// Get the number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Get the number of features (dimensions).
    pub fn n_features(&self) -> usize {
        self.centroids.ncols()
    }

    /// Number of iterations the run performed
    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    /// The search index attached to this result, if any
    pub fn index(&self) -> Option<&dyn Assigner> {
        self.index.as_deref()
    }

    /// Build and attach a fresh index over the centroids
    pub fn with_index(mut self, factory: &dyn AssignerFactory) -> Result<Self, KMeansError> {
        self.index = Some(factory.build(&self.centroids.view())?);
        Ok(self)
    }

    /// Assigner that maps new points to their nearest centroid.
    pub fn default_hard_assigner(&self) -> Result<HardAssigner<'_>, KMeansError> {
        match self.index.as_deref() {
            Some(index) => Ok(HardAssigner::borrowed(index)),
            None => Ok(HardAssigner::owned(Box::new(ExactAssigner::new(
                &self.centroids.view(),
                DEFAULT_CHUNK_SIZE_CENTROIDS,
            )?))),
        }
    }

    /// Nearest-centroid label for each row of `points`.
    pub fn assign(&self, points: &ArrayView2<f32>) -> Result<Array1<usize>, KMeansError> {
        self.default_hard_assigner()?.assign(points)
    }

    /// Nearest-centroid label and distance for each row of `points`.
    pub fn assign_scored(&self, points: &ArrayView2<f32>) -> Result<Assignment, KMeansError> {
        self.default_hard_assigner()?.assign_scored(points)
    }
}

/// Output of [`crate::SphericalKMeans::cluster`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SphericalKMeansResult {
    centroids: Array2<f32>,
    assignments: Array1<usize>,
    n_iterations: usize,
    fit: f64,
    fit_history: Vec<f64>,
}

impl SphericalKMeansResult {
    pub(crate) fn new(
        centroids: Array2<f32>,
        assignments: Array1<usize>,
        n_iterations: usize,
        fit_history: Vec<f64>,
    ) -> Self {
        let fit = fit_history.last().copied().unwrap_or(0.0);
        Self {
            centroids,
            assignments,
            n_iterations,
            fit,
            fit_history,
        }
    }

    /// Unit-length centroid matrix of shape (k, n_features)
    pub fn centroids(&self) -> &Array2<f32> {
        &self.centroids
    }

    /// Cluster of every training row, consistent with the final centroids.
    ///
    /// Empty clusters are reseeded before each centroid update, but the
    /// reseeded centroid may still attract no rows, so a cluster can be
    /// absent from these labels.
    pub fn assignments(&self) -> &Array1<usize> {
        &self.assignments
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.centroids.ncols()
    }

    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    /// Sum over training rows of the inner product with their centroid
    pub fn fit(&self) -> f64 {
        self.fit
    }

    /// Fit of every assignment pass, in order
    pub fn fit_history(&self) -> &[f64] {
        &self.fit_history
    }

    /// Number of training rows in each cluster. May contain zeros, see
    /// [`SphericalKMeansResult::assignments`].
    pub fn assignment_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_clusters()];
        for &label in self.assignments.iter() {
            if label < counts.len() {
                counts[label] += 1;
            }
        }
        counts
    }

    /// Training row indices grouped by cluster
    pub fn clusters(&self) -> Vec<Vec<usize>> {
        index_clusters(&self.assignments, self.n_clusters())
    }

    /// Assigner that maps new points to the centroid with the largest inner product.
    pub fn default_hard_assigner(&self) -> Result<HardAssigner<'static>, KMeansError> {
        Ok(HardAssigner::owned(Box::new(InnerProductAssigner::new(
            &self.centroids.view(),
            DEFAULT_CHUNK_SIZE_CENTROIDS,
        )?)))
    }

    pub fn assign(&self, points: &ArrayView2<f32>) -> Result<Array1<usize>, KMeansError> {
        self.default_hard_assigner()?.assign(points)
    }

    pub fn assign_scored(&self, points: &ArrayView2<f32>) -> Result<Assignment, KMeansError> {
        self.default_hard_assigner()?.assign_scored(points)
    }
}
