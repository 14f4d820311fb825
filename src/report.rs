use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::config::Paths;
use crate::tables::{coerce_f64, open_reader, ColumnIndex};

/// A loaded output table, kept as raw records: the report is a display
/// layer and does no business logic beyond filtering and sorting.
pub struct Table {
    columns: ColumnIndex,
    rows: Vec<csv::StringRecord>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn cell<'a>(&'a self, row: &'a csv::StringRecord, name: &str) -> &'a str {
        self.columns.str_field(row, name)
    }
}

/// Table loads memoized by file path. A missing artifact is cached as
/// absent so each section can render its own notice without retrying.
#[derive(Default)]
pub struct TableCache {
    cache: HashMap<PathBuf, Option<Table>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, path: &Path) -> anyhow::Result<Option<&Table>> {
        if !self.cache.contains_key(path) {
            let loaded = if path.exists() {
                let mut reader = open_reader(path)?;
                let columns = ColumnIndex::new(reader.headers()?);
                let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
                Some(Table { columns, rows })
            } else {
                None
            };
            self.cache.insert(path.to_path_buf(), loaded);
        }
        Ok(self.cache.get(path).and_then(Option::as_ref))
    }
}

/// Region-type classification by geometry_ref naming convention.
pub fn geometry_type(geometry_ref: &str) -> &'static str {
    if geometry_ref.starts_with("ghs-fua") {
        "Urban area (FUA)"
    } else if geometry_ref.starts_with("gadm") {
        "Administrative region (GADM)"
    } else {
        "Other/Unknown"
    }
}

/// Human-friendly large-number formatting for headline figures.
pub fn format_large_number(x: f64) -> String {
    if !x.is_finite() {
        return "-".to_string();
    }
    if x >= 1_000_000_000.0 {
        format!("{:.1}B", x / 1_000_000_000.0)
    } else if x >= 1_000_000.0 {
        format!("{:.1}M", x / 1_000_000.0)
    } else if x >= 1_000.0 {
        format!("{:.1}K", x / 1_000.0)
    } else {
        format!("{x:.0}")
    }
}

fn missing_notice(output: &mut String, path: &Path) {
    let _ = writeln!(output, "Data not found: {} (run the pipeline first).", path.display());
}

/// Render a markdown summary over the final pipeline artifacts. Each
/// section stands alone: a missing artifact produces a notice for that
/// section only and the rest still render.
pub fn build_report(cache: &mut TableCache, paths: &Paths) -> anyhow::Result<String> {
    let mut output = String::new();
    let _ = writeln!(output, "# Electric Heating Planning Summary");
    let _ = writeln!(
        output,
        "Hotspots are (country, region) pairs with aggregated onsite-fuel heating emissions;"
    );
    let _ = writeln!(
        output,
        "region ids are opaque (`ghs-fua_*` urban areas, `gadm_*` administrative regions)."
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let global_path = paths.priority_global();
    match cache.load(&global_path)? {
        None => missing_notice(&mut output, &global_path),
        Some(global) if global.is_empty() => {
            let _ = writeln!(output, "- No hotspots scored yet.");
        }
        Some(global) => {
            let countries: HashSet<&str> = global
                .rows
                .iter()
                .map(|row| global.cell(row, "iso3_country"))
                .filter(|c| !c.is_empty())
                .collect();
            let _ = writeln!(output, "- Hotspots in the global priority table: {}", global.len());
            let _ = writeln!(output, "- Countries covered: {}", countries.len());
        }
    }
    let clustered_path = paths.clustered_hotspots();
    match cache.load(&clustered_path)? {
        None => missing_notice(&mut output, &clustered_path),
        Some(clustered) => {
            if let Some(first) = clustered.rows.first() {
                let _ = writeln!(
                    output,
                    "- Archetype clusters (k selected): {}",
                    clustered.cell(first, "k_selected")
                );
                let _ = writeln!(
                    output,
                    "- Silhouette score: {:.3}",
                    coerce_f64(clustered.cell(first, "silhouette_score_selected"))
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Largest Global Hotspots");
    match cache.load(&global_path)? {
        None => missing_notice(&mut output, &global_path),
        Some(global) => {
            for row in global.rows.iter().take(10) {
                let geometry_ref = global.cell(row, "geometry_ref");
                let _ = writeln!(
                    output,
                    "- {} {} ({}): emissions {}, score {:.2}",
                    global.cell(row, "iso3_country"),
                    geometry_ref,
                    geometry_type(geometry_ref),
                    format_large_number(coerce_f64(global.cell(row, "combined_emissions"))),
                    coerce_f64(global.cell(row, "priority_score"))
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Hotspot Archetypes");
    let summary_path = paths.cluster_summary();
    match cache.load(&summary_path)? {
        None => missing_notice(&mut output, &summary_path),
        Some(summary) => {
            for row in &summary.rows {
                let _ = writeln!(
                    output,
                    "- {}: {} hotspots, {:.1}% of emissions, mean residential share {:.2}",
                    summary.cell(row, "cluster_label"),
                    summary.cell(row, "n_hotspots"),
                    coerce_f64(summary.cell(row, "share_of_total_emissions")) * 100.0,
                    coerce_f64(summary.cell(row, "mean_res_share"))
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Leading Region per Country");
    let by_country_path = paths.priority_by_country();
    match cache.load(&by_country_path)? {
        None => missing_notice(&mut output, &by_country_path),
        Some(by_country) => {
            let mut leaders: Vec<&csv::StringRecord> = by_country
                .rows
                .iter()
                .filter(|row| by_country.cell(row, "priority_rank_country") == "1")
                .collect();
            leaders.sort_by(|a, b| {
                coerce_f64(by_country.cell(b, "priority_score"))
                    .partial_cmp(&coerce_f64(by_country.cell(a, "priority_score")))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for row in leaders.iter().take(10) {
                let _ = writeln!(
                    output,
                    "- {}: {} (emissions {})",
                    by_country.cell(row, "iso3_country"),
                    by_country.cell(row, "geometry_ref"),
                    format_large_number(coerce_f64(by_country.cell(row, "combined_emissions")))
                );
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_geometry_refs_by_prefix() {
        assert_eq!(geometry_type("ghs-fua_1234"), "Urban area (FUA)");
        assert_eq!(geometry_type("gadm_USA.5.2"), "Administrative region (GADM)");
        assert_eq!(geometry_type("geom-1"), "Other/Unknown");
    }

    #[test]
    fn formats_large_numbers_compactly() {
        assert_eq!(format_large_number(2_500_000_000.0), "2.5B");
        assert_eq!(format_large_number(1_200_000.0), "1.2M");
        assert_eq!(format_large_number(45_000.0), "45.0K");
        assert_eq!(format_large_number(812.3), "812");
        assert_eq!(format_large_number(f64::NAN), "-");
    }

    #[test]
    fn missing_artifacts_render_notices_not_errors() {
        let paths = Paths::new(PathBuf::from("no-such-dir/tables"));
        let mut cache = TableCache::new();
        let report = build_report(&mut cache, &paths).unwrap();
        assert!(report.contains("# Electric Heating Planning Summary"));
        assert!(report.contains("Data not found"));
        assert!(report.contains("hotspots_priority_global.csv"));
        assert!(report.contains("hotspots_cluster_summary.csv"));
    }

    #[test]
    fn cache_memoizes_missing_paths_too() {
        let mut cache = TableCache::new();
        let path = PathBuf::from("no-such-dir/hotspots_clustered.csv");
        assert!(cache.load(&path).unwrap().is_none());
        assert!(cache.load(&path).unwrap().is_none());
        assert_eq!(cache.cache.len(), 1);
    }
}
