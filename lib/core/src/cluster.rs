//! Deterministic k-means clustering.
//!
//! Centroids are seeded with k-means++ from a fixed seed, then refined with
//! Lloyd iterations: assign each vector to its nearest centroid, move every
//! centroid to the mean of its members, repeat until assignments stop
//! changing, the total centroid shift drops below the tolerance, or the
//! iteration cap is reached.
//!
//! Assignment runs in parallel but is collected in input order and centroid
//! sums are accumulated sequentially, so results do not depend on thread
//! scheduling.

use crate::Vector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Default seed for centroid initialisation
pub const DEFAULT_SEED: u64 = 42;

/// Configuration for k-means
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub seed: u64,
    pub max_iterations: usize,
    /// Convergence threshold on the summed squared centroid shift
    pub tolerance: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

/// Outcome of a k-means run
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Cluster of each input vector, in input order
    pub labels: Vec<usize>,
    pub centroids: Vec<Vector>,
    pub iterations: usize,
    /// Within-cluster sum of squared distances
    pub inertia: f64,
}

pub struct KMeans {
    k: usize,
    config: ClusterConfig,
}

impl KMeans {
    pub fn new(k: usize, config: ClusterConfig) -> Self {
        Self { k, config }
    }

    /// Cluster `data` into at most `k` groups.
    ///
    /// `k` is clamped to `1..=data.len()`; empty input yields an empty result.
    pub fn fit(&self, data: &[Vector]) -> Clustering {
        if data.is_empty() {
            return Clustering {
                labels: Vec::new(),
                centroids: Vec::new(),
                iterations: 0,
                inertia: 0.0,
            };
        }

        let k = self.k.clamp(1, data.len());
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut centroids = init_centroids(data, k, &mut rng);
        let mut labels = assign(data, &centroids);
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let updated = update_centroids(data, &labels, &centroids);
            let shift: f64 = centroids
                .iter()
                .zip(&updated)
                .map(|(old, new)| old.squared_distance(new))
                .sum();
            centroids = updated;

            let next = assign(data, &centroids);
            let stable = next == labels;
            labels = next;

            if stable || shift <= self.config.tolerance {
                break;
            }
        }

        let inertia = data
            .iter()
            .zip(&labels)
            .map(|(v, &label)| v.squared_distance(&centroids[label]))
            .sum();

        tracing::debug!(k, iterations, inertia, "k-means finished");

        Clustering {
            labels,
            centroids,
            iterations,
            inertia,
        }
    }
}

/// k-means++ seeding: each next centroid is drawn with probability
/// proportional to its squared distance from the closest chosen centroid.
fn init_centroids(data: &[Vector], k: usize, rng: &mut StdRng) -> Vec<Vector> {
    let n = data.len();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.random_range(0..n));

    let mut min_distances: Vec<f64> = data
        .iter()
        .map(|v| v.squared_distance(&data[chosen[0]]))
        .collect();

    while chosen.len() < k {
        let total: f64 = min_distances.iter().sum();

        let next = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut picked = None;
            for (i, d) in min_distances.iter().enumerate() {
                if *d <= 0.0 {
                    continue;
                }
                cumulative += d;
                picked = Some(i);
                if cumulative >= target {
                    break;
                }
            }
            // total > 0 guarantees at least one positive distance
            picked.unwrap_or(0)
        } else {
            // Every point coincides with a centroid; take the first unused one
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        };

        chosen.push(next);
        for (d, v) in min_distances.iter_mut().zip(data) {
            let candidate = v.squared_distance(&data[next]);
            if candidate < *d {
                *d = candidate;
            }
        }
    }

    chosen.into_iter().map(|i| data[i].clone()).collect()
}

/// Index of the nearest centroid; the lowest index wins ties
#[inline]
fn nearest_centroid(vector: &Vector, centroids: &[Vector]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = vector.squared_distance(centroid);
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

fn assign(data: &[Vector], centroids: &[Vector]) -> Vec<usize> {
    data.par_iter()
        .map(|v| nearest_centroid(v, centroids))
        .collect()
}

/// Mean of each cluster's members. A cluster left without members keeps its
/// previous centroid.
fn update_centroids(data: &[Vector], labels: &[usize], previous: &[Vector]) -> Vec<Vector> {
    let dim = previous.first().map(Vector::dim).unwrap_or(0);
    let mut sums = vec![vec![0.0f64; dim]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (v, &label) in data.iter().zip(labels) {
        counts[label] += 1;
        for (s, x) in sums[label].iter_mut().zip(v.as_slice()) {
            *s += f64::from(*x);
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                Vector::new(sum.into_iter().map(|s| (s / count as f64) as f32).collect())
            }
        })
        .collect()
}
