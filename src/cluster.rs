use std::cmp::Ordering;
use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{DEFAULT_K_MAX, DEFAULT_K_MIN, DEFAULT_SEED};
use crate::models::{ClusterSummary, ClusteredHotspot, CombinedHotspot};
use crate::tables::cmp_f64_desc;

const FEATURE_DIM: usize = 5;
const MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub k_min: usize,
    pub k_max: usize,
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            k_min: DEFAULT_K_MIN,
            k_max: DEFAULT_K_MAX,
            seed: DEFAULT_SEED,
        }
    }
}

pub struct ClusterTables {
    pub clustered: Vec<ClusteredHotspot>,
    pub summary: Vec<ClusterSummary>,
}

/// Group hotspots into archetypes with seeded k-means.
///
/// Features are log-scaled emissions/source counts plus the clamped
/// residential share, standardized per feature. k is chosen from
/// [k_min, k_max] by silhouette score (ties to the smallest k); when the
/// dataset is too small for any candidate the stage falls back to k = 2
/// (or 1 for a single row) with a sentinel score of -1. The same seed
/// reproduces identical assignments, k, and labels.
pub fn cluster_hotspots(
    rows: &[CombinedHotspot],
    config: &ClusterConfig,
) -> anyhow::Result<ClusterTables> {
    if rows.is_empty() {
        anyhow::bail!("no hotspot rows to cluster");
    }

    let mut features = build_features(rows);
    standardize(&mut features);

    let (k_selected, silhouette_selected) = select_k(&features, config);
    let labels = kmeans(&features, k_selected, config.seed);

    let overall_total: f64 = rows.iter().map(|r| r.combined_emissions).sum();
    let overall_median = median(&rows.iter().map(|r| r.combined_emissions).collect::<Vec<_>>());

    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for (idx, &cluster_id) in labels.iter().enumerate() {
        members.entry(cluster_id).or_default().push(idx);
    }

    let mut summary: Vec<ClusterSummary> = members
        .iter()
        .map(|(&cluster_id, indices)| {
            let emissions: Vec<f64> = indices.iter().map(|&i| rows[i].combined_emissions).collect();
            let shares: Vec<f64> = indices
                .iter()
                .map(|&i| rows[i].res_share.clamp(0.0, 1.0))
                .collect();
            let sum_combined_emissions: f64 = emissions.iter().sum();
            let median_combined_emissions = median(&emissions);
            let mean_res_share = shares.iter().sum::<f64>() / shares.len() as f64;
            ClusterSummary {
                cluster_id,
                n_hotspots: indices.len(),
                sum_combined_emissions,
                median_combined_emissions,
                mean_res_share,
                median_res_share: median(&shares),
                share_of_hotspots: indices.len() as f64 / rows.len() as f64,
                share_of_total_emissions: sum_combined_emissions / overall_total.max(1e-9),
                cluster_label: label_cluster(
                    mean_res_share,
                    median_combined_emissions,
                    overall_median,
                )
                .to_string(),
            }
        })
        .collect();
    summary.sort_by(|a, b| {
        cmp_f64_desc(a.share_of_total_emissions, b.share_of_total_emissions)
            .then_with(|| a.cluster_id.cmp(&b.cluster_id))
    });

    let labels_by_cluster: HashMap<usize, &str> = summary
        .iter()
        .map(|s| (s.cluster_id, s.cluster_label.as_str()))
        .collect();

    let mut clustered: Vec<ClusteredHotspot> = rows
        .iter()
        .zip(&labels)
        .map(|(row, &cluster_id)| ClusteredHotspot {
            iso3_country: row.iso3_country.clone(),
            geometry_ref: row.geometry_ref.clone(),
            res_emissions: row.res_emissions,
            nonres_emissions: row.nonres_emissions,
            combined_emissions: row.combined_emissions,
            res_share: row.res_share.clamp(0.0, 1.0),
            nonres_share: row.nonres_share,
            res_n_sources: row.res_n_sources,
            nonres_n_sources: row.nonres_n_sources,
            combined_n_sources: row.combined_n_sources,
            latest_end_time: row.latest_end_time.clone(),
            cluster_id,
            k_selected,
            silhouette_score_selected: silhouette_selected,
            cluster_label: labels_by_cluster
                .get(&cluster_id)
                .copied()
                .unwrap_or_default()
                .to_string(),
        })
        .collect();
    clustered.sort_by(|a, b| {
        cmp_f64_desc(a.combined_emissions, b.combined_emissions)
            .then_with(|| a.iso3_country.cmp(&b.iso3_country))
            .then_with(|| a.geometry_ref.cmp(&b.geometry_ref))
    });

    Ok(ClusterTables { clustered, summary })
}

/// Archetype label from cluster summary statistics. A pure rule table,
/// independent of the clustering implementation.
pub fn label_cluster(mean_res_share: f64, median_emissions: f64, overall_median: f64) -> &'static str {
    let high_emissions = median_emissions >= overall_median;
    if mean_res_share >= 0.8 && high_emissions {
        return "Residential-dominant high";
    }
    if mean_res_share >= 0.8 {
        return "Residential-dominant moderate";
    }
    if mean_res_share <= 0.4 && high_emissions {
        return "Non-residential heavy high";
    }
    if mean_res_share <= 0.4 {
        return "Non-residential heavy moderate";
    }
    if high_emissions {
        return "Mixed high";
    }
    "Mixed moderate"
}

fn build_features(rows: &[CombinedHotspot]) -> Vec<[f64; FEATURE_DIM]> {
    rows.iter()
        .map(|row| {
            [
                row.combined_emissions.ln_1p(),
                row.res_share.clamp(0.0, 1.0),
                row.res_emissions.ln_1p(),
                row.nonres_emissions.ln_1p(),
                (row.combined_n_sources as f64).ln_1p(),
            ]
        })
        .collect()
}

/// Zero mean / unit variance per feature; a zero-variance feature
/// scales to all zeros instead of dividing by zero.
fn standardize(features: &mut [[f64; FEATURE_DIM]]) {
    let n = features.len() as f64;
    for dim in 0..FEATURE_DIM {
        let mean = features.iter().map(|f| f[dim]).sum::<f64>() / n;
        let variance = features.iter().map(|f| (f[dim] - mean).powi(2)).sum::<f64>() / n;
        let scale = if variance > 0.0 { variance.sqrt() } else { 1.0 };
        for feature in features.iter_mut() {
            feature[dim] = (feature[dim] - mean) / scale;
        }
    }
}

fn select_k(points: &[[f64; FEATURE_DIM]], config: &ClusterConfig) -> (usize, f64) {
    let n = points.len();
    let mut best: Option<(usize, f64)> = None;
    for k in config.k_min..=config.k_max {
        // Silhouette needs 2 <= k < n_samples.
        if k < 2 || k >= n {
            continue;
        }
        let labels = kmeans(points, k, config.seed);
        let score = silhouette(points, &labels, k);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((k, score));
        }
    }
    best.unwrap_or_else(|| if n >= 2 { (2, -1.0) } else { (1, -1.0) })
}

fn squared_distance(a: &[f64; FEATURE_DIM], b: &[f64; FEATURE_DIM]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn distance(a: &[f64; FEATURE_DIM], b: &[f64; FEATURE_DIM]) -> f64 {
    squared_distance(a, b).sqrt()
}

fn nearest_center(point: &[f64; FEATURE_DIM], centers: &[[f64; FEATURE_DIM]]) -> usize {
    let mut nearest = 0;
    let mut nearest_dist = f64::INFINITY;
    for (idx, center) in centers.iter().enumerate() {
        let dist = squared_distance(point, center);
        if dist < nearest_dist {
            nearest_dist = dist;
            nearest = idx;
        }
    }
    nearest
}

/// k-means++ seeding: the first center is uniform, each further center
/// is sampled with probability proportional to squared distance from
/// the nearest chosen center.
fn init_centers(
    points: &[[f64; FEATURE_DIM]],
    k: usize,
    rng: &mut StdRng,
) -> Vec<[f64; FEATURE_DIM]> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.gen_range(0..points.len())]);

    let mut dist2: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centers[0]))
        .collect();

    while centers.len() < k {
        let total: f64 = dist2.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (idx, &d) in dist2.iter().enumerate() {
                if target <= d {
                    chosen = idx;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            // All remaining points coincide with a center already.
            rng.gen_range(0..points.len())
        };
        centers.push(points[next]);
        for (idx, point) in points.iter().enumerate() {
            let d = squared_distance(point, &centers[centers.len() - 1]);
            if d < dist2[idx] {
                dist2[idx] = d;
            }
        }
    }
    centers
}

/// Lloyd iterations over k-means++ centers. Deterministic for a given
/// seed; an empty cluster is reseeded with the point farthest from its
/// current center.
fn kmeans(points: &[[f64; FEATURE_DIM]], k: usize, seed: u64) -> Vec<usize> {
    let n = points.len();
    if k <= 1 {
        return vec![0; n];
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centers = init_centers(points, k, &mut rng);
    let mut labels = vec![usize::MAX; n];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (idx, point) in points.iter().enumerate() {
            let nearest = nearest_center(point, &centers);
            if nearest != labels[idx] {
                labels[idx] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![[0.0f64; FEATURE_DIM]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for dim in 0..FEATURE_DIM {
                sums[label][dim] += point[dim];
            }
        }
        for cluster in 0..k {
            if counts[cluster] == 0 {
                let farthest = (0..n)
                    .max_by(|&a, &b| {
                        let da = squared_distance(&points[a], &centers[labels[a]]);
                        let db = squared_distance(&points[b], &centers[labels[b]]);
                        da.partial_cmp(&db).unwrap_or(Ordering::Equal)
                    })
                    .unwrap_or(0);
                centers[cluster] = points[farthest];
            } else {
                for dim in 0..FEATURE_DIM {
                    centers[cluster][dim] = sums[cluster][dim] / counts[cluster] as f64;
                }
            }
        }
    }
    labels
}

/// Mean silhouette coefficient over all points; a point alone in its
/// cluster contributes zero.
fn silhouette(points: &[[f64; FEATURE_DIM]], labels: &[usize], k: usize) -> f64 {
    let n = points.len();
    let mut sizes = vec![0usize; k];
    for &label in labels {
        sizes[label] += 1;
    }

    let mut total = 0.0;
    for i in 0..n {
        let mut dist_sums = vec![0.0f64; k];
        for j in 0..n {
            if i != j {
                dist_sums[labels[j]] += distance(&points[i], &points[j]);
            }
        }
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }
        let a = dist_sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| dist_sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        if b.is_finite() {
            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
        }
    }
    total / n as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
