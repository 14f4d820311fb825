use serde::Serialize;

/// Column contract of a written artifact. Order matches the struct's
/// serialized field order, so the header row can be emitted even when
/// a table has no rows.
pub trait TableSchema {
    const COLUMNS: &'static [&'static str];
}

/// One (country, region) aggregate for a single dataset
/// (residential or non-residential).
#[derive(Debug, Clone, Serialize)]
pub struct GeometryAggregate {
    pub iso3_country: String,
    pub geometry_ref: String,
    pub total_emissions: f64,
    pub n_sources: u64,
    pub latest_end_time: String,
}

impl TableSchema for GeometryAggregate {
    const COLUMNS: &'static [&'static str] = &[
        "iso3_country",
        "geometry_ref",
        "total_emissions",
        "n_sources",
        "latest_end_time",
    ];
}

/// Outer-joined hotspot row covering both datasets. Shares are zero
/// when combined_emissions is zero, and sum to one otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedHotspot {
    pub iso3_country: String,
    pub geometry_ref: String,
    pub res_emissions: f64,
    pub nonres_emissions: f64,
    pub combined_emissions: f64,
    pub res_share: f64,
    pub nonres_share: f64,
    pub res_n_sources: u64,
    pub nonres_n_sources: u64,
    pub combined_n_sources: u64,
    pub latest_end_time: String,
}

impl TableSchema for CombinedHotspot {
    const COLUMNS: &'static [&'static str] = &[
        "iso3_country",
        "geometry_ref",
        "res_emissions",
        "nonres_emissions",
        "combined_emissions",
        "res_share",
        "nonres_share",
        "res_n_sources",
        "nonres_n_sources",
        "combined_n_sources",
        "latest_end_time",
    ];
}

/// Hotspot with global and country-normalized priority scores and
/// dense ranks for each.
#[derive(Debug, Clone, Serialize)]
pub struct PriorityRecord {
    pub iso3_country: String,
    pub geometry_ref: String,
    pub res_emissions: f64,
    pub nonres_emissions: f64,
    pub combined_emissions: f64,
    pub res_share: f64,
    pub nonres_share: f64,
    pub res_n_sources: u64,
    pub nonres_n_sources: u64,
    pub combined_n_sources: u64,
    pub latest_end_time: String,
    pub priority_score: f64,
    pub priority_rank_global: u64,
    pub priority_score_country: f64,
    pub priority_rank_country: u64,
}

impl TableSchema for PriorityRecord {
    const COLUMNS: &'static [&'static str] = &[
        "iso3_country",
        "geometry_ref",
        "res_emissions",
        "nonres_emissions",
        "combined_emissions",
        "res_share",
        "nonres_share",
        "res_n_sources",
        "nonres_n_sources",
        "combined_n_sources",
        "latest_end_time",
        "priority_score",
        "priority_rank_global",
        "priority_score_country",
        "priority_rank_country",
    ];
}

/// Hotspot annotated with its archetype cluster. k_selected and
/// silhouette_score_selected are identical for every row of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ClusteredHotspot {
    pub iso3_country: String,
    pub geometry_ref: String,
    pub res_emissions: f64,
    pub nonres_emissions: f64,
    pub combined_emissions: f64,
    pub res_share: f64,
    pub nonres_share: f64,
    pub res_n_sources: u64,
    pub nonres_n_sources: u64,
    pub combined_n_sources: u64,
    pub latest_end_time: String,
    pub cluster_id: usize,
    pub k_selected: usize,
    pub silhouette_score_selected: f64,
    pub cluster_label: String,
}

impl TableSchema for ClusteredHotspot {
    const COLUMNS: &'static [&'static str] = &[
        "iso3_country",
        "geometry_ref",
        "res_emissions",
        "nonres_emissions",
        "combined_emissions",
        "res_share",
        "nonres_share",
        "res_n_sources",
        "nonres_n_sources",
        "combined_n_sources",
        "latest_end_time",
        "cluster_id",
        "k_selected",
        "silhouette_score_selected",
        "cluster_label",
    ];
}

/// Per-cluster summary statistics backing the archetype labels.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub n_hotspots: usize,
    pub sum_combined_emissions: f64,
    pub median_combined_emissions: f64,
    pub mean_res_share: f64,
    pub median_res_share: f64,
    pub share_of_hotspots: f64,
    pub share_of_total_emissions: f64,
    pub cluster_label: String,
}

impl TableSchema for ClusterSummary {
    const COLUMNS: &'static [&'static str] = &[
        "cluster_id",
        "n_hotspots",
        "sum_combined_emissions",
        "median_combined_emissions",
        "mean_res_share",
        "median_res_share",
        "share_of_hotspots",
        "share_of_total_emissions",
        "cluster_label",
    ];
}

/// Country-level total from a country-emissions export.
#[derive(Debug, Clone, Serialize)]
pub struct CountryTotal {
    pub iso3_country: String,
    pub latest_end_time: String,
    pub total_emissions: f64,
}

impl TableSchema for CountryTotal {
    const COLUMNS: &'static [&'static str] =
        &["iso3_country", "latest_end_time", "total_emissions"];
}
