use std::path::{Path, PathBuf};

pub const DEFAULT_TOP_K_GLOBAL: usize = 500;
pub const DEFAULT_TOP_K_PER_COUNTRY: usize = 50;
pub const DEFAULT_K_MIN: usize = 3;
pub const DEFAULT_K_MAX: usize = 10;
pub const DEFAULT_SEED: u64 = 42;

/// Output table layout for a full pipeline run. Every stage writes into
/// one flat directory so the report can find artifacts by name.
#[derive(Debug, Clone)]
pub struct Paths {
    pub tables: PathBuf,
}

impl Paths {
    pub fn new(tables: PathBuf) -> Self {
        Self { tables }
    }

    pub fn residential_aggregate(&self) -> PathBuf {
        self.tables.join("hotspots_residential_geometry.csv")
    }

    pub fn non_residential_aggregate(&self) -> PathBuf {
        self.tables.join("hotspots_non_residential_geometry.csv")
    }

    pub fn combined_hotspots(&self) -> PathBuf {
        self.tables.join("hotspots_combined_geometry.csv")
    }

    pub fn priority_global(&self) -> PathBuf {
        self.tables.join("hotspots_priority_global.csv")
    }

    pub fn priority_by_country(&self) -> PathBuf {
        self.tables.join("hotspots_priority_by_country.csv")
    }

    pub fn clustered_hotspots(&self) -> PathBuf {
        self.tables.join("hotspots_clustered.csv")
    }

    pub fn cluster_summary(&self) -> PathBuf {
        self.tables.join("hotspots_cluster_summary.csv")
    }

    pub fn country_ranking(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "countries".to_string());
        self.tables.join(format!("ranking_{stem}.csv"))
    }
}
