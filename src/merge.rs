use std::collections::HashMap;

use crate::models::{CombinedHotspot, GeometryAggregate};
use crate::tables::{cmp_f64_desc, parse_timestamp};

/// Full outer join of the residential and non-residential aggregates on
/// (country, region). A side absent for a key contributes zero to every
/// numeric field; shares are zero when combined emissions are zero.
pub fn merge_hotspot_tables(
    residential: &[GeometryAggregate],
    non_residential: &[GeometryAggregate],
) -> Vec<CombinedHotspot> {
    let mut sides: HashMap<(String, String), (Option<&GeometryAggregate>, Option<&GeometryAggregate>)> =
        HashMap::new();
    for row in residential {
        sides
            .entry((row.iso3_country.clone(), row.geometry_ref.clone()))
            .or_default()
            .0 = Some(row);
    }
    for row in non_residential {
        sides
            .entry((row.iso3_country.clone(), row.geometry_ref.clone()))
            .or_default()
            .1 = Some(row);
    }

    let mut merged: Vec<CombinedHotspot> = sides
        .into_iter()
        .map(|((iso3_country, geometry_ref), (res, nonres))| {
            let res_emissions = res.map_or(0.0, |r| r.total_emissions);
            let nonres_emissions = nonres.map_or(0.0, |r| r.total_emissions);
            let res_n_sources = res.map_or(0, |r| r.n_sources);
            let nonres_n_sources = nonres.map_or(0, |r| r.n_sources);
            let combined_emissions = res_emissions + nonres_emissions;

            let (res_share, nonres_share) = if combined_emissions > 0.0 {
                (
                    res_emissions / combined_emissions,
                    nonres_emissions / combined_emissions,
                )
            } else {
                (0.0, 0.0)
            };

            CombinedHotspot {
                iso3_country,
                geometry_ref,
                res_emissions,
                nonres_emissions,
                combined_emissions,
                res_share,
                nonres_share,
                res_n_sources,
                nonres_n_sources,
                combined_n_sources: res_n_sources + nonres_n_sources,
                latest_end_time: latest_end_time(
                    res.map(|r| r.latest_end_time.as_str()),
                    nonres.map(|r| r.latest_end_time.as_str()),
                ),
            }
        })
        .collect();

    merged.sort_by(|a, b| {
        cmp_f64_desc(a.combined_emissions, b.combined_emissions)
            .then_with(|| a.iso3_country.cmp(&b.iso3_country))
            .then_with(|| a.geometry_ref.cmp(&b.geometry_ref))
    });
    merged
}

/// Max of the two parsed end times as an ISO-8601 string; an unparsable
/// side is treated as missing, and both missing yields an empty string.
fn latest_end_time(res: Option<&str>, nonres: Option<&str>) -> String {
    let parsed = [res, nonres]
        .into_iter()
        .flatten()
        .filter_map(parse_timestamp)
        .max();
    parsed
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(
        country: &str,
        region: &str,
        total: f64,
        n_sources: u64,
        end_time: &str,
    ) -> GeometryAggregate {
        GeometryAggregate {
            iso3_country: country.to_string(),
            geometry_ref: region.to_string(),
            total_emissions: total,
            n_sources,
            latest_end_time: end_time.to_string(),
        }
    }

    #[test]
    fn combines_both_sides_with_shares() {
        let res = vec![aggregate("USA", "geom-1", 100.0, 2, "2022-12-31 00:00:00")];
        let nonres = vec![aggregate("USA", "geom-1", 300.0, 1, "2021-12-31 00:00:00")];
        let merged = merge_hotspot_tables(&res, &nonres);
        assert_eq!(merged.len(), 1);
        let row = &merged[0];
        assert_eq!(row.combined_emissions, 400.0);
        assert_eq!(row.res_share, 0.25);
        assert_eq!(row.nonres_share, 0.75);
        assert_eq!(row.combined_n_sources, 3);
        assert_eq!(row.latest_end_time, "2022-12-31T00:00:00");
    }

    #[test]
    fn keeps_rows_present_on_only_one_side() {
        let res = vec![aggregate("USA", "geom-1", 100.0, 2, "2022-12-31")];
        let nonres = vec![aggregate("USA", "geom-2", 50.0, 1, "2022-12-31")];
        let merged = merge_hotspot_tables(&res, &nonres);
        assert_eq!(merged.len(), 2);

        let only_res = merged.iter().find(|r| r.geometry_ref == "geom-1").unwrap();
        assert_eq!(only_res.nonres_emissions, 0.0);
        assert_eq!(only_res.nonres_share, 0.0);
        assert_eq!(only_res.res_share, 1.0);

        let only_nonres = merged.iter().find(|r| r.geometry_ref == "geom-2").unwrap();
        assert_eq!(only_nonres.res_emissions, 0.0);
        assert_eq!(only_nonres.res_share, 0.0);
        assert_eq!(only_nonres.combined_emissions, 50.0);
    }

    #[test]
    fn shares_sum_to_one_or_are_both_zero() {
        let res = vec![
            aggregate("USA", "geom-1", 60.0, 1, ""),
            aggregate("USA", "geom-2", 0.0, 1, ""),
        ];
        let nonres = vec![aggregate("USA", "geom-1", 40.0, 1, "")];
        let merged = merge_hotspot_tables(&res, &nonres);
        for row in &merged {
            if row.combined_emissions > 0.0 {
                assert!((row.res_share + row.nonres_share - 1.0).abs() < 1e-12);
            } else {
                assert_eq!(row.res_share, 0.0);
                assert_eq!(row.nonres_share, 0.0);
            }
        }
    }

    #[test]
    fn sorts_by_combined_emissions_descending() {
        let res = vec![
            aggregate("AAA", "g1", 5.0, 1, ""),
            aggregate("BBB", "g2", 500.0, 1, ""),
        ];
        let nonres = vec![aggregate("CCC", "g3", 50.0, 1, "")];
        let merged = merge_hotspot_tables(&res, &nonres);
        let totals: Vec<f64> = merged.iter().map(|r| r.combined_emissions).collect();
        assert_eq!(totals, vec![500.0, 50.0, 5.0]);
    }

    #[test]
    fn unparsable_end_times_yield_empty_string() {
        let res = vec![aggregate("USA", "geom-1", 1.0, 1, "unknown")];
        let nonres = vec![aggregate("USA", "geom-1", 1.0, 1, "")];
        let merged = merge_hotspot_tables(&res, &nonres);
        assert_eq!(merged[0].latest_end_time, "");
    }
}
