//! The pluggable assignment boundary.
//!
//! An [`AssignerFactory`] turns the current centroid matrix into an
//! [`Assigner`], an immutable index that answers "which centroid is closest to
//! each of these points". The generic driver builds one index per iteration
//! and shares it read-only between all assignment jobs, so exact and
//! approximate strategies can be swapped without touching the driver.

use crate::distance::{
    compute_squared_norms, find_most_similar_chunked, find_nearest_centroids_chunked,
};
use crate::error::KMeansError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::fmt;

/// Default number of centroids compared per matrix product.
pub const DEFAULT_CHUNK_SIZE_CENTROIDS: usize = 10_240;

/// Per-point result of a nearest-centroid search.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Index of the selected centroid for each point
    pub labels: Array1<usize>,

    /// Distance (lower is better) or similarity (higher is better) to the
    /// selected centroid, depending on the strategy
    pub scores: Array1<f32>,
}

impl Assignment {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Reject results that cannot be accumulated: wrong length or labels >= k.
    pub(crate) fn validate(&self, n_points: usize, k: usize) -> Result<(), KMeansError> {
        if self.labels.len() != n_points || self.scores.len() != n_points {
            return Err(KMeansError::Assignment(format!(
                "Expected {} labels and scores, got {} and {}",
                n_points,
                self.labels.len(),
                self.scores.len()
            )));
        }
        if let Some(&label) = self.labels.iter().find(|&&label| label >= k) {
            return Err(KMeansError::Assignment(format!(
                "Label {} is out of range for {} clusters",
                label, k
            )));
        }
        Ok(())
    }
}

/// A read-only search index over a fixed set of centroids.
pub trait Assigner: Send + Sync + fmt::Debug {
    /// Select a centroid for every row of `points`.
    fn search_nn(&self, points: &ArrayView2<f32>) -> Result<Assignment, KMeansError>;

    /// Number of centroids indexed.
    fn n_centroids(&self) -> usize;

    /// Dimensionality the index accepts.
    fn n_features(&self) -> usize;
}

/// Builds an [`Assigner`] from a snapshot of the centroids.
pub trait AssignerFactory: Send + Sync + fmt::Debug {
    fn build(&self, centroids: &ArrayView2<f32>) -> Result<Box<dyn Assigner>, KMeansError>;
}

fn check_points(points: &ArrayView2<f32>, n_features: usize) -> Result<(), KMeansError> {
    if points.ncols() != n_features {
        return Err(KMeansError::InvalidDimensions(format!(
            "Expected {} features, got {}",
            n_features,
            points.ncols()
        )));
    }
    Ok(())
}

fn check_centroids(centroids: &ArrayView2<f32>) -> Result<(), KMeansError> {
    if centroids.nrows() == 0 {
        return Err(KMeansError::InvalidK(
            "Cannot build an index over zero centroids".to_string(),
        ));
    }
    Ok(())
}

/// Brute-force squared-Euclidean search.
///
/// Scores are squared distances. Centroid norms are computed once when the
/// index is built and reused for every batch.
#[derive(Debug, Clone)]
pub struct ExactAssigner {
    centroids: Array2<f32>,
    centroid_norms: Array1<f32>,
    chunk_size_centroids: usize,
}

impl ExactAssigner {
    pub fn new(centroids: &ArrayView2<f32>, chunk_size_centroids: usize) -> Result<Self, KMeansError> {
        check_centroids(centroids)?;
        Ok(Self {
            centroids: centroids.to_owned(),
            centroid_norms: compute_squared_norms(centroids),
            chunk_size_centroids,
        })
    }
}

impl Assigner for ExactAssigner {
    fn search_nn(&self, points: &ArrayView2<f32>) -> Result<Assignment, KMeansError> {
        check_points(points, self.centroids.ncols())?;

        let point_norms = compute_squared_norms(points);
        let (labels, scores) = find_nearest_centroids_chunked(
            points,
            &point_norms.view(),
            &self.centroids.view(),
            &self.centroid_norms.view(),
            self.chunk_size_centroids,
        );

        Ok(Assignment {
            labels: Array1::from_vec(labels),
            scores: Array1::from_vec(scores),
        })
    }

    fn n_centroids(&self) -> usize {
        self.centroids.nrows()
    }

    fn n_features(&self) -> usize {
        self.centroids.ncols()
    }
}

/// Factory for [`ExactAssigner`]; the default strategy of [`crate::KMeansConfig`].
#[derive(Debug, Clone)]
pub struct ExactAssignerFactory {
    pub chunk_size_centroids: usize,
}

impl Default for ExactAssignerFactory {
    fn default() -> Self {
        Self {
            chunk_size_centroids: DEFAULT_CHUNK_SIZE_CENTROIDS,
        }
    }
}

impl AssignerFactory for ExactAssignerFactory {
    fn build(&self, centroids: &ArrayView2<f32>) -> Result<Box<dyn Assigner>, KMeansError> {
        Ok(Box::new(ExactAssigner::new(
            centroids,
            self.chunk_size_centroids,
        )?))
    }
}

/// Brute-force inner-product maximization. Scores are inner products.
#[derive(Debug, Clone)]
pub struct InnerProductAssigner {
    centroids: Array2<f32>,
    chunk_size_centroids: usize,
}

impl InnerProductAssigner {
    pub fn new(centroids: &ArrayView2<f32>, chunk_size_centroids: usize) -> Result<Self, KMeansError> {
        check_centroids(centroids)?;
        Ok(Self {
            centroids: centroids.to_owned(),
            chunk_size_centroids,
        })
    }
}

impl Assigner for InnerProductAssigner {
    fn search_nn(&self, points: &ArrayView2<f32>) -> Result<Assignment, KMeansError> {
        check_points(points, self.centroids.ncols())?;

        let (labels, scores) =
            find_most_similar_chunked(points, &self.centroids.view(), self.chunk_size_centroids);

        Ok(Assignment {
            labels: Array1::from_vec(labels),
            scores: Array1::from_vec(scores),
        })
    }

    fn n_centroids(&self) -> usize {
        self.centroids.nrows()
    }

    fn n_features(&self) -> usize {
        self.centroids.ncols()
    }
}

#[derive(Debug, Clone)]
pub struct InnerProductAssignerFactory {
    pub chunk_size_centroids: usize,
}

impl Default for InnerProductAssignerFactory {
    fn default() -> Self {
        Self {
            chunk_size_centroids: DEFAULT_CHUNK_SIZE_CENTROIDS,
        }
    }
}

impl AssignerFactory for InnerProductAssignerFactory {
    fn build(&self, centroids: &ArrayView2<f32>) -> Result<Box<dyn Assigner>, KMeansError> {
        Ok(Box::new(InnerProductAssigner::new(
            centroids,
            self.chunk_size_centroids,
        )?))
    }
}

#[derive(Debug)]
enum Inner<'a> {
    Borrowed(&'a dyn Assigner),
    Owned(Box<dyn Assigner>),
}

/// Maps new vectors to a single cluster each, using the similarity convention
/// the model was trained with.
#[derive(Debug)]
pub struct HardAssigner<'a> {
    inner: Inner<'a>,
}

impl<'a> HardAssigner<'a> {
    pub(crate) fn borrowed(assigner: &'a dyn Assigner) -> Self {
        Self {
            inner: Inner::Borrowed(assigner),
        }
    }

    pub(crate) fn owned(assigner: Box<dyn Assigner>) -> Self {
        Self {
            inner: Inner::Owned(assigner),
        }
    }

    fn assigner(&self) -> &dyn Assigner {
        match &self.inner {
            Inner::Borrowed(assigner) => *assigner,
            Inner::Owned(assigner) => assigner.as_ref(),
        }
    }

    /// Number of clusters a point can be assigned to.
    pub fn n_clusters(&self) -> usize {
        self.assigner().n_centroids()
    }

    /// Cluster labels for each row of `points`.
    pub fn assign(&self, points: &ArrayView2<f32>) -> Result<Array1<usize>, KMeansError> {
        Ok(self.assign_scored(points)?.labels)
    }

    /// Cluster labels and their distance or similarity scores.
    pub fn assign_scored(&self, points: &ArrayView2<f32>) -> Result<Assignment, KMeansError> {
        let assigner = self.assigner();
        let assignment = assigner.search_nn(points)?;
        assignment.validate(points.nrows(), assigner.n_centroids())?;
        Ok(assignment)
    }

    /// Assign a single vector.
    pub fn assign_one(&self, point: &ArrayView1<f32>) -> Result<(usize, f32), KMeansError> {
        let points = point.view().insert_axis(Axis(0));
        let assignment = self.assign_scored(&points)?;
        Ok((assignment.labels[0], assignment.scores[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_exact_assigner() {
        let centroids = array![[0.0f32, 0.0], [10.0, 10.0]];
        let assigner = ExactAssignerFactory::default()
            .build(&centroids.view())
            .unwrap();

        let points = array![[1.0f32, 0.0], [9.0, 10.0]];
        let result = assigner.search_nn(&points.view()).unwrap();

        assert_eq!(result.labels, array![0usize, 1]);
        assert_relative_eq!(result.scores[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.scores[1], 1.0, epsilon = 1e-3);
        assert_eq!(assigner.n_centroids(), 2);
        assert_eq!(assigner.n_features(), 2);
    }

    #[test]
    fn test_inner_product_prefers_direction() {
        let centroids = array![[1.0f32, 0.0], [0.0, 1.0]];
        let assigner = InnerProductAssigner::new(&centroids.view(), 1).unwrap();

        // Closer to centroid 0 in Euclidean terms, but more aligned with 1
        let points = array![[0.4f32, 0.5]];
        let result = assigner.search_nn(&points.view()).unwrap();
        assert_eq!(result.labels[0], 1);
        assert_relative_eq!(result.scores[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let centroids = array![[0.0f32, 0.0]];
        let assigner = ExactAssigner::new(&centroids.view(), 8).unwrap();
        let points = array![[1.0f32, 2.0, 3.0]];

        assert!(matches!(
            assigner.search_nn(&points.view()),
            Err(KMeansError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_empty_centroids_rejected() {
        let centroids = Array2::<f32>::zeros((0, 4));
        assert!(matches!(
            ExactAssigner::new(&centroids.view(), 8),
            Err(KMeansError::InvalidK(_))
        ));
    }

    #[test]
    fn test_hard_assigner_one() {
        let centroids = array![[0.0f32, 0.0], [5.0, 5.0]];
        let hard = HardAssigner::owned(Box::new(
            ExactAssigner::new(&centroids.view(), 8).unwrap(),
        ));

        let point = array![4.0f32, 4.0];
        let (label, dist) = hard.assign_one(&point.view()).unwrap();
        assert_eq!(label, 1);
        assert_relative_eq!(dist, 2.0, epsilon = 1e-4);
        assert_eq!(hard.n_clusters(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_labels() {
        let assignment = Assignment {
            labels: array![0usize, 3],
            scores: array![0.0f32, 0.0],
        };
        assert!(assignment.validate(2, 3).is_err());
        assert!(assignment.validate(3, 4).is_err());
        assert!(assignment.validate(2, 4).is_ok());
    }
}
