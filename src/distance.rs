//! Dense kernels shared by the assignment strategies and the drivers.
//!
//! Point-to-centroid scores are computed as one matrix product per chunk of
//! centroids, so at most `n_points x chunk_size_centroids` scores are live at a
//! time regardless of k.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1};
use rayon::prelude::*;

/// Squared L2 norm of every row.
#[inline]
pub fn compute_squared_norms(data: &ArrayView2<f32>) -> Array1<f32> {
    let norms: Vec<f32> = (0..data.nrows())
        .into_par_iter()
        .map(|i| {
            let row = data.row(i);
            row.dot(&row)
        })
        .collect();

    Array1::from_vec(norms)
}

/// Walk the centroids in chunks and keep, per point, the best score seen.
///
/// `score(i, j, dot)` turns the inner product of point `i` and centroid
/// `c_start + j` into a score; `better(candidate, best)` must be strict so
/// that ties keep the lower centroid index.
fn best_over_centroid_chunks<S, B>(
    points: &ArrayView2<f32>,
    centroids: &ArrayView2<f32>,
    chunk_size_centroids: usize,
    worst: f32,
    score: S,
    better: B,
) -> (Vec<usize>, Vec<f32>)
where
    S: Fn(usize, usize, f32) -> f32 + Sync,
    B: Fn(f32, f32) -> bool + Sync,
{
    let n_points = points.nrows();
    let k = centroids.nrows();
    let chunk_size_centroids = chunk_size_centroids.max(1);

    let mut best_labels = vec![0usize; n_points];
    let mut best_scores = vec![worst; n_points];

    for c_start in (0..k).step_by(chunk_size_centroids) {
        let c_end = (c_start + chunk_size_centroids).min(k);
        // (n_points, c_end - c_start)
        let dots: Array2<f32> = points.dot(&centroids.slice(s![c_start..c_end, ..]).t());

        best_labels
            .par_iter_mut()
            .zip(best_scores.par_iter_mut())
            .enumerate()
            .for_each(|(i, (label, best))| {
                for (j, &dot) in dots.row(i).iter().enumerate() {
                    let candidate = score(i, c_start + j, dot);
                    if better(candidate, *best) {
                        *best = candidate;
                        *label = c_start + j;
                    }
                }
            });
    }

    (best_labels, best_scores)
}

/// Nearest centroid and squared Euclidean distance for every point.
///
/// Uses `||x - c||^2 = ||x||^2 + ||c||^2 - 2 x.c` with precomputed norms.
/// Ties resolve to the lowest centroid index.
pub fn find_nearest_centroids_chunked(
    points: &ArrayView2<f32>,
    point_norms: &ArrayView1<f32>,
    centroids: &ArrayView2<f32>,
    centroid_norms: &ArrayView1<f32>,
    chunk_size_centroids: usize,
) -> (Vec<usize>, Vec<f32>) {
    best_over_centroid_chunks(
        points,
        centroids,
        chunk_size_centroids,
        f32::INFINITY,
        // Rounding can push the identity slightly below zero
        |i, c, dot| (point_norms[i] + centroid_norms[c] - 2.0 * dot).max(0.0),
        |candidate, best| candidate < best,
    )
}

/// Centroid with the largest inner product for every point.
///
/// Ties resolve to the lowest centroid index.
pub fn find_most_similar_chunked(
    points: &ArrayView2<f32>,
    centroids: &ArrayView2<f32>,
    chunk_size_centroids: usize,
) -> (Vec<usize>, Vec<f32>) {
    best_over_centroid_chunks(
        points,
        centroids,
        chunk_size_centroids,
        f32::NEG_INFINITY,
        |_, _, dot| dot,
        |candidate, best| candidate > best,
    )
}

/// Total distance moved by the centroids between two iterations.
pub fn compute_centroid_shift(
    old_centroids: &ArrayView2<f32>,
    new_centroids: &ArrayView2<f32>,
) -> f64 {
    old_centroids
        .outer_iter()
        .zip(new_centroids.outer_iter())
        .map(|(old_c, new_c)| {
            old_c
                .iter()
                .zip(new_c.iter())
                .map(|(&o, &n)| {
                    let d = (n - o) as f64;
                    d * d
                })
                .sum::<f64>()
                .sqrt()
        })
        .sum()
}

/// Scale a vector to unit L2 length in place.
///
/// Returns `false` and leaves the vector untouched when its length is zero or
/// not finite.
pub fn normalize_in_place(mut v: ArrayViewMut1<f32>) -> bool {
    let norm = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    v.mapv_inplace(|x| ((x as f64) / norm) as f32);
    true
}
