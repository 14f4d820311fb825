use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::models::{CombinedHotspot, GeometryAggregate, TableSchema};

/// Header-name lookup for a CSV file, used to enforce stage schemas and
/// to read cells by column name rather than position.
pub struct ColumnIndex {
    by_name: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(headers: &csv::StringRecord) -> Self {
        let by_name = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_string(), idx))
            .collect();
        Self { by_name }
    }

    /// Hard schema check: every listed column must be present, otherwise
    /// the stage aborts naming the missing set and the offending file.
    pub fn require(&self, required: &[&str], file: &Path) -> anyhow::Result<()> {
        let mut missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| !self.by_name.contains_key(*name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        anyhow::bail!(
            "{} is missing required columns: {:?}",
            file.display(),
            missing
        );
    }

    /// Cell value by column name; empty string when the column or cell
    /// is absent (CSV null).
    pub fn str_field<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.by_name
            .get(name)
            .and_then(|idx| record.get(*idx))
            .map(str::trim)
            .unwrap_or("")
    }

    pub fn f64_field(&self, record: &csv::StringRecord, name: &str) -> f64 {
        coerce_f64(self.str_field(record, name))
    }

    pub fn u64_field(&self, record: &csv::StringRecord, name: &str) -> u64 {
        let value = coerce_f64(self.str_field(record, name));
        if value.is_finite() && value > 0.0 {
            value as u64
        } else {
            0
        }
    }
}

/// Permissive numeric coercion: cells that fail to parse contribute zero
/// rather than erroring the row. Upgrading this to strict parsing would
/// change output row counts on noisy exports.
pub fn coerce_f64(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}

/// Descending order with NaN sorted last.
pub fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Parse an end_time cell. Exports carry a few shapes (with/without a
/// time component, space or `T` separator, optional trailing `Z`);
/// anything else is treated as missing, not an error.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim().trim_end_matches('Z');
    if raw.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn open_reader(path: &Path) -> anyhow::Result<csv::Reader<std::fs::File>> {
    csv::Reader::from_path(path).with_context(|| format!("failed to open {}", path.display()))
}

/// Serialize a table to CSV bytes. The header row comes from the
/// table's column contract, so an empty table still carries its header
/// and stays readable downstream.
fn to_csv_bytes<S: Serialize + TableSchema>(rows: &[S]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(S::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush csv buffer: {err}"))
}

/// Serialize rows to CSV fully in memory, then write the file in one
/// call: an aborted stage leaves no partial artifact behind.
pub fn write_rows<S: Serialize + TableSchema>(path: &Path, rows: &[S]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let buffer = to_csv_bytes(rows)?;
    std::fs::write(path, buffer).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_geometry_aggregates(path: &Path) -> anyhow::Result<Vec<GeometryAggregate>> {
    read_geometry_aggregates_from(open_reader(path)?, path)
}

fn read_geometry_aggregates_from<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    file: &Path,
) -> anyhow::Result<Vec<GeometryAggregate>> {
    let columns = ColumnIndex::new(reader.headers()?);
    columns.require(GeometryAggregate::COLUMNS, file)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(GeometryAggregate {
            iso3_country: columns.str_field(&record, "iso3_country").to_string(),
            geometry_ref: columns.str_field(&record, "geometry_ref").to_string(),
            total_emissions: columns.f64_field(&record, "total_emissions"),
            n_sources: columns.u64_field(&record, "n_sources"),
            latest_end_time: columns.str_field(&record, "latest_end_time").to_string(),
        });
    }
    Ok(rows)
}

pub fn read_combined_hotspots(path: &Path) -> anyhow::Result<Vec<CombinedHotspot>> {
    read_combined_hotspots_from(open_reader(path)?, path)
}

fn read_combined_hotspots_from<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    file: &Path,
) -> anyhow::Result<Vec<CombinedHotspot>> {
    let columns = ColumnIndex::new(reader.headers()?);
    columns.require(CombinedHotspot::COLUMNS, file)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(CombinedHotspot {
            iso3_country: columns.str_field(&record, "iso3_country").to_string(),
            geometry_ref: columns.str_field(&record, "geometry_ref").to_string(),
            res_emissions: columns.f64_field(&record, "res_emissions"),
            nonres_emissions: columns.f64_field(&record, "nonres_emissions"),
            combined_emissions: columns.f64_field(&record, "combined_emissions"),
            res_share: columns.f64_field(&record, "res_share"),
            nonres_share: columns.f64_field(&record, "nonres_share"),
            res_n_sources: columns.u64_field(&record, "res_n_sources"),
            nonres_n_sources: columns.u64_field(&record, "nonres_n_sources"),
            combined_n_sources: columns.u64_field(&record, "combined_n_sources"),
            latest_end_time: columns.str_field(&record, "latest_end_time").to_string(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn index_for(csv_text: &str) -> (ColumnIndex, Vec<csv::StringRecord>) {
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let columns = ColumnIndex::new(reader.headers().unwrap());
        let records = reader.records().map(|r| r.unwrap()).collect();
        (columns, records)
    }

    #[test]
    fn coerces_bad_cells_to_zero() {
        assert_eq!(coerce_f64("12.5"), 12.5);
        assert_eq!(coerce_f64(" 7 "), 7.0);
        assert_eq!(coerce_f64("n/a"), 0.0);
        assert_eq!(coerce_f64(""), 0.0);
    }

    #[test]
    fn require_names_missing_columns_and_file() {
        let (columns, _) = index_for("iso3_country,end_time\nUSA,2022-01-01\n");
        let err = columns
            .require(
                &["iso3_country", "emissions_quantity", "end_time"],
                &PathBuf::from("data/raw/export.csv"),
            )
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("data/raw/export.csv"));
        assert!(message.contains("emissions_quantity"));
        assert!(!message.contains("iso3_country\""));
    }

    #[test]
    fn str_field_is_empty_for_absent_column() {
        let (columns, records) = index_for("a,b\n1,2\n");
        assert_eq!(columns.str_field(&records[0], "missing"), "");
        assert_eq!(columns.str_field(&records[0], "b"), "2");
    }

    #[test]
    fn parses_export_timestamp_shapes() {
        let expected = NaiveDate::from_ymd_opt(2022, 12, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2022-12-31 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2022-12-31T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2022-12-31T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2022-12-31"), Some(expected));
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn empty_tables_still_carry_their_header_row() {
        let bytes = to_csv_bytes(&Vec::<GeometryAggregate>::new()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text.trim_end(),
            "iso3_country,geometry_ref,total_emissions,n_sources,latest_end_time"
        );

        // A zero-row aggregate must still merge cleanly downstream.
        let reader = csv::Reader::from_reader(text.as_bytes());
        let rows = read_geometry_aggregates_from(reader, Path::new("empty.csv")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn empty_combined_table_reads_back_as_zero_rows() {
        let bytes = to_csv_bytes(&Vec::<CombinedHotspot>::new()).unwrap();
        let reader = csv::Reader::from_reader(bytes.as_slice());
        let rows = read_combined_hotspots_from(reader, Path::new("combined.csv")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn written_rows_round_trip_with_a_single_header() {
        let rows = vec![GeometryAggregate {
            iso3_country: "USA".to_string(),
            geometry_ref: "gadm_1".to_string(),
            total_emissions: 175.0,
            n_sources: 2,
            latest_end_time: "2022-12-31 00:00:00".to_string(),
        }];
        let bytes = to_csv_bytes(&rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.trim_end().lines().count(), 2);

        let reader = csv::Reader::from_reader(text.as_bytes());
        let parsed = read_geometry_aggregates_from(reader, Path::new("t.csv")).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].iso3_country, "USA");
        assert_eq!(parsed[0].total_emissions, 175.0);
        assert_eq!(parsed[0].n_sources, 2);
    }

    #[test]
    fn descending_order_puts_nan_last() {
        let mut values = vec![1.0, f64::NAN, 3.0, 2.0];
        values.sort_by(|a, b| cmp_f64_desc(*a, *b));
        assert_eq!(&values[..3], &[3.0, 2.0, 1.0]);
        assert!(values[3].is_nan());
    }
}
