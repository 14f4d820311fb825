use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use crate::models::{CountryTotal, GeometryAggregate};
use crate::tables::{cmp_f64_desc, open_reader, ColumnIndex};

const SOURCE_COLUMNS: [&str; 5] = [
    "iso3_country",
    "geometry_ref",
    "emissions_quantity",
    "source_id",
    "end_time",
];

const COUNTRY_COLUMNS: [&str; 3] = ["iso3_country", "end_time", "emissions_quantity"];

#[derive(Default)]
struct GroupAcc {
    total_emissions: f64,
    sources: HashSet<String>,
    latest_end_time: String,
}

impl GroupAcc {
    fn fold(&mut self, emissions: f64, source_id: &str, end_time: &str) {
        self.total_emissions += emissions;
        if !source_id.is_empty() {
            self.sources.insert(source_id.to_string());
        }
        if !end_time.is_empty() && end_time > self.latest_end_time.as_str() {
            self.latest_end_time = end_time.to_string();
        }
    }
}

/// Aggregate a raw emission-source export by (country, region).
///
/// Rows are folded into per-group accumulators record by record, so the
/// raw table is never materialized whole. Rows with an empty country or
/// region are dropped; empty source ids and end times do not count
/// toward the distinct-source count or the latest end time.
pub fn aggregate_by_geometry<R: Read>(
    mut reader: csv::Reader<R>,
    file: &Path,
) -> anyhow::Result<Vec<GeometryAggregate>> {
    let columns = ColumnIndex::new(reader.headers()?);
    columns.require(&SOURCE_COLUMNS, file)?;

    let mut groups: HashMap<(String, String), GroupAcc> = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let country = columns.str_field(&record, "iso3_country");
        let region = columns.str_field(&record, "geometry_ref");
        if country.is_empty() || region.is_empty() {
            continue;
        }
        groups
            .entry((country.to_string(), region.to_string()))
            .or_default()
            .fold(
                columns.f64_field(&record, "emissions_quantity"),
                columns.str_field(&record, "source_id"),
                columns.str_field(&record, "end_time"),
            );
    }

    let mut rows: Vec<GeometryAggregate> = groups
        .into_iter()
        .map(|((iso3_country, geometry_ref), acc)| GeometryAggregate {
            iso3_country,
            geometry_ref,
            total_emissions: acc.total_emissions,
            n_sources: acc.sources.len() as u64,
            latest_end_time: acc.latest_end_time,
        })
        .collect();

    // Emissions descending; key ascending keeps ties deterministic.
    rows.sort_by(|a, b| {
        cmp_f64_desc(a.total_emissions, b.total_emissions)
            .then_with(|| a.iso3_country.cmp(&b.iso3_country))
            .then_with(|| a.geometry_ref.cmp(&b.geometry_ref))
    });
    Ok(rows)
}

pub fn aggregate_file(path: &Path) -> anyhow::Result<Vec<GeometryAggregate>> {
    aggregate_by_geometry(open_reader(path)?, path)
}

/// Rank countries by total emissions from a country-emissions export.
pub fn rank_countries<R: Read>(
    mut reader: csv::Reader<R>,
    file: &Path,
) -> anyhow::Result<Vec<CountryTotal>> {
    let columns = ColumnIndex::new(reader.headers()?);
    columns.require(&COUNTRY_COLUMNS, file)?;

    let mut totals: HashMap<String, (f64, String)> = HashMap::new();
    for record in reader.records() {
        let record = record?;
        // Unlike the geometry aggregation, a missing country is kept as
        // its own (empty-keyed) group rather than dropped.
        let country = columns.str_field(&record, "iso3_country");
        let entry = totals.entry(country.to_string()).or_default();
        entry.0 += columns.f64_field(&record, "emissions_quantity");
        let end_time = columns.str_field(&record, "end_time");
        if !end_time.is_empty() && end_time > entry.1.as_str() {
            entry.1 = end_time.to_string();
        }
    }

    let mut rows: Vec<CountryTotal> = totals
        .into_iter()
        .map(|(iso3_country, (total_emissions, latest_end_time))| CountryTotal {
            iso3_country,
            latest_end_time,
            total_emissions,
        })
        .collect();
    rows.sort_by(|a, b| {
        cmp_f64_desc(a.total_emissions, b.total_emissions)
            .then_with(|| a.iso3_country.cmp(&b.iso3_country))
    });
    Ok(rows)
}

pub fn rank_countries_file(path: &Path) -> anyhow::Result<Vec<CountryTotal>> {
    rank_countries(open_reader(path)?, path)
}
