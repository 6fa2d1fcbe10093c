//! Basic example demonstrating streamkmeans-rs usage
//!
//! Run with: cargo run --example basic --release

use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use std::sync::Arc;
use streamkmeans_rs::{
    ArrayDataSource, KMeans, KMeansConfig, KMeansPlusPlusInit, SphericalKMeans,
    SphericalKMeansConfig,
};

fn main() {
    println!("=== streamkmeans-rs example ===\n");

    // Generate synthetic data: 3 clusters in 2D for easy visualization
    let n_samples = 300;
    let n_features = 2;
    let n_clusters = 3;

    println!("Generating {} samples with {} features...", n_samples, n_features);

    // Create clustered data by generating points around 3 centers
    let mut data = Array2::<f32>::zeros((n_samples, n_features));

    // Cluster centers
    let centers = [[-5.0f32, -5.0], [0.0, 5.0], [5.0, -5.0]];

    let noise = Array2::random((n_samples, n_features), Uniform::new(-1.0f32, 1.0));
    for i in 0..n_samples {
        let cluster_idx = i % 3;
        data[[i, 0]] = centers[cluster_idx][0] + noise[[i, 0]];
        data[[i, 1]] = centers[cluster_idx][1] + noise[[i, 1]];
    }

    println!("True cluster centers:");
    for (i, center) in centers.iter().enumerate() {
        println!("  Cluster {}: ({:.2}, {:.2})", i, center[0], center[1]);
    }
    println!();

    // Configure and run k-means over the data in blocks of 64 rows
    let config = KMeansConfig::new(n_clusters)
        .expect("Invalid k")
        .with_max_iters(20)
        .with_block_size(64)
        .with_seed(42);

    println!("Running k-means with k={}...\n", n_clusters);

    let source = ArrayDataSource::new(data.view());
    let kmeans = KMeans::with_config(config)
        .expect("Invalid configuration")
        .with_init(Arc::new(KMeansPlusPlusInit::default()));
    let result = kmeans.cluster(&source).expect("Clustering failed");

    // Print learned centroids
    println!("Learned centroids after {} iterations:", result.n_iterations());
    let centroids = result.centroids();
    for i in 0..centroids.nrows() {
        println!(
            "  Centroid {}: ({:.4}, {:.4})",
            i,
            centroids[[i, 0]],
            centroids[[i, 1]]
        );
    }
    println!();

    // Assign labels with the index attached to the result
    let labels = result.assign(&data.view()).expect("Assignment failed");

    // Count samples per cluster
    let mut cluster_counts = vec![0usize; n_clusters];
    for &label in labels.iter() {
        cluster_counts[label] += 1;
    }

    println!("Cluster distribution:");
    for (i, count) in cluster_counts.iter().enumerate() {
        println!(
            "  Cluster {}: {} samples ({:.1}%)",
            i,
            count,
            (*count as f64 / n_samples as f64) * 100.0
        );
    }
    println!();

    // Show first few assignments
    println!("First 10 sample assignments:");
    for i in 0..10 {
        println!(
            "  Sample {} at ({:.2}, {:.2}) -> Cluster {}",
            i,
            data[[i, 0]],
            data[[i, 1]],
            labels[i]
        );
    }
    println!();

    // Spherical k-means groups the same points by direction only
    let config = SphericalKMeansConfig::new(n_clusters)
        .expect("Invalid k")
        .with_seed(42);
    let spherical = SphericalKMeans::with_config(config)
        .expect("Invalid configuration")
        .cluster(&source)
        .expect("Spherical clustering failed");

    println!(
        "Spherical k-means: {} iterations, fit = {:.3}",
        spherical.n_iterations(),
        spherical.fit()
    );
    for (i, (centroid, count)) in spherical
        .centroids()
        .outer_iter()
        .zip(spherical.assignment_counts())
        .enumerate()
    {
        println!(
            "  Direction {}: ({:.4}, {:.4}) with {} samples",
            i, centroid[0], centroid[1], count
        );
    }

    println!("\n=== Done! ===");
}
