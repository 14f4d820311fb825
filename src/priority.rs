use std::collections::HashMap;

use crate::models::{CombinedHotspot, PriorityRecord};
use crate::tables::cmp_f64_desc;

/// Global and per-country top-K extracts over the same scored rows.
pub struct PriorityTables {
    pub global_top: Vec<PriorityRecord>,
    pub by_country_top: Vec<PriorityRecord>,
}

/// Score hotspots for electrification planning.
///
/// priority_score = log1p(combined_emissions) * (0.7 + 0.6 * res_share),
/// so the residential multiplier runs from 0.7 (purely non-residential)
/// to 1.3 (purely residential). priority_score_country min-max-normalizes
/// the log-emissions term within each country; a country whose rows all
/// carry the same emissions gets 0 for every row. Upstream should already
/// deliver res_share in [0, 1], but it is re-clamped here so this stage
/// stays correct on arbitrary input.
pub fn compute_priority_scores(
    rows: &[CombinedHotspot],
    top_k_global: usize,
    top_k_per_country: usize,
) -> PriorityTables {
    let log_emissions: Vec<f64> = rows.iter().map(|r| r.combined_emissions.ln_1p()).collect();
    let multipliers: Vec<f64> = rows
        .iter()
        .map(|r| 0.7 + 0.6 * r.res_share.clamp(0.0, 1.0))
        .collect();

    let mut country_groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        country_groups
            .entry(row.iso3_country.as_str())
            .or_default()
            .push(idx);
    }

    let mut country_scores = vec![0.0f64; rows.len()];
    let mut country_ranks = vec![0u64; rows.len()];
    for indices in country_groups.values() {
        let min_e = indices
            .iter()
            .map(|&i| log_emissions[i])
            .fold(f64::INFINITY, f64::min);
        let max_e = indices
            .iter()
            .map(|&i| log_emissions[i])
            .fold(f64::NEG_INFINITY, f64::max);
        let span = max_e - min_e;
        if span > 0.0 {
            for &i in indices {
                country_scores[i] = (log_emissions[i] - min_e) / span * multipliers[i];
            }
        }

        let group_scores: Vec<f64> = indices.iter().map(|&i| country_scores[i]).collect();
        for (&i, rank) in indices.iter().zip(dense_rank_desc(&group_scores)) {
            country_ranks[i] = rank;
        }
    }

    let global_scores: Vec<f64> = log_emissions
        .iter()
        .zip(&multipliers)
        .map(|(e, r)| e * r)
        .collect();
    let global_ranks = dense_rank_desc(&global_scores);

    let scored: Vec<PriorityRecord> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| PriorityRecord {
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
            priority_score: global_scores[i],
            priority_rank_global: global_ranks[i],
            priority_score_country: country_scores[i],
            priority_rank_country: country_ranks[i],
        })
        .collect();

    let mut global_top = scored.clone();
    global_top.sort_by(|a, b| {
        cmp_f64_desc(a.priority_score, b.priority_score)
            .then_with(|| a.iso3_country.cmp(&b.iso3_country))
            .then_with(|| a.geometry_ref.cmp(&b.geometry_ref))
    });
    global_top.truncate(top_k_global);

    let mut by_country = scored;
    by_country.sort_by(|a, b| {
        a.iso3_country
            .cmp(&b.iso3_country)
            .then_with(|| cmp_f64_desc(a.priority_score_country, b.priority_score_country))
            .then_with(|| a.geometry_ref.cmp(&b.geometry_ref))
    });
    let mut by_country_top = Vec::new();
    let mut taken_for_country = 0usize;
    let mut current_country: Option<String> = None;
    for record in by_country {
        if current_country.as_deref() != Some(record.iso3_country.as_str()) {
            current_country = Some(record.iso3_country.clone());
            taken_for_country = 0;
        }
        if taken_for_country < top_k_per_country {
            by_country_top.push(record);
            taken_for_country += 1;
        }
    }

    PriorityTables {
        global_top,
        by_country_top,
    }
}

/// Dense descending ranks: tied values share a rank and the next
/// distinct value's rank is exactly one greater.
pub fn dense_rank_desc(values: &[f64]) -> Vec<u64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| cmp_f64_desc(values[a], values[b]));

    let mut ranks = vec![0u64; values.len()];
    let mut rank = 0u64;
    let mut previous: Option<f64> = None;
    for idx in order {
        if previous != Some(values[idx]) {
            rank += 1;
            previous = Some(values[idx]);
        }
        ranks[idx] = rank;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hotspot(country: &str, region: &str, combined: f64, res_share: f64) -> CombinedHotspot {
        CombinedHotspot {
            iso3_country: country.to_string(),
            geometry_ref: region.to_string(),
            res_emissions: combined * res_share,
            nonres_emissions: combined * (1.0 - res_share),
            combined_emissions: combined,
            res_share,
            nonres_share: 1.0 - res_share,
            res_n_sources: 1,
            nonres_n_sources: 1,
            combined_n_sources: 2,
            latest_end_time: "2022-12-31T00:00:00".to_string(),
        }
    }

    #[test]
    fn dense_ranks_share_and_stay_consecutive() {
        assert_eq!(dense_rank_desc(&[5.0, 5.0, 3.0]), vec![1, 1, 2]);
        assert_eq!(dense_rank_desc(&[3.0, 5.0, 5.0, 1.0]), vec![2, 1, 1, 3]);
    }

    #[test]
    fn scores_match_the_planning_formula() {
        let rows = vec![hotspot("USA", "geom-1", 400.0, 0.25)];
        let tables = compute_priority_scores(&rows, 500, 50);
        let expected = 401.0f64.ln() * 0.85;
        assert!((tables.global_top[0].priority_score - expected).abs() < 1e-12);
        assert_eq!(tables.global_top[0].priority_rank_global, 1);
    }

    #[test]
    fn score_increases_with_emissions_and_with_res_share() {
        let rows = vec![
            hotspot("USA", "g1", 100.0, 0.5),
            hotspot("USA", "g2", 200.0, 0.5),
            hotspot("USA", "g3", 100.0, 0.9),
        ];
        let tables = compute_priority_scores(&rows, 500, 50);
        let score = |region: &str| {
            tables
                .global_top
                .iter()
                .find(|r| r.geometry_ref == region)
                .unwrap()
                .priority_score
        };
        assert!(score("g2") > score("g1"));
        assert!(score("g3") > score("g1"));
    }

    #[test]
    fn uniform_country_gets_zero_country_score() {
        let rows = vec![
            hotspot("FRA", "g1", 100.0, 0.5),
            hotspot("FRA", "g2", 100.0, 0.2),
        ];
        let tables = compute_priority_scores(&rows, 500, 50);
        for record in &tables.by_country_top {
            assert_eq!(record.priority_score_country, 0.0);
            assert_eq!(record.priority_rank_country, 1);
        }
    }

    #[test]
    fn country_score_normalizes_within_each_country() {
        let rows = vec![
            hotspot("DEU", "g1", 10.0, 0.0),
            hotspot("DEU", "g2", 1000.0, 0.0),
            hotspot("DEU", "g3", 100.0, 0.0),
        ];
        let tables = compute_priority_scores(&rows, 500, 50);
        let record = |region: &str| {
            tables
                .by_country_top
                .iter()
                .find(|r| r.geometry_ref == region)
                .unwrap()
                .clone()
        };
        assert_eq!(record("g1").priority_score_country, 0.0);
        assert!((record("g2").priority_score_country - 0.7).abs() < 1e-12);
        let mid = record("g3").priority_score_country;
        assert!(mid > 0.0 && mid < 0.7);
        assert_eq!(record("g2").priority_rank_country, 1);
        assert_eq!(record("g3").priority_rank_country, 2);
        assert_eq!(record("g1").priority_rank_country, 3);
    }

    #[test]
    fn out_of_range_res_share_is_clamped_not_rejected() {
        let rows = vec![hotspot("USA", "g1", 100.0, 1.7)];
        let tables = compute_priority_scores(&rows, 500, 50);
        let record = &tables.global_top[0];
        assert_eq!(record.res_share, 1.0);
        let expected = 101.0f64.ln() * 1.3;
        assert!((record.priority_score - expected).abs() < 1e-12);
    }

    #[test]
    fn per_country_extract_truncates_each_country_independently() {
        let mut rows = Vec::new();
        for i in 0..5 {
            rows.push(hotspot("USA", &format!("us-{i}"), 100.0 * (i + 1) as f64, 0.5));
        }
        for i in 0..2 {
            rows.push(hotspot("CAN", &format!("ca-{i}"), 10.0 * (i + 1) as f64, 0.5));
        }
        let tables = compute_priority_scores(&rows, 500, 3);
        let usa = tables
            .by_country_top
            .iter()
            .filter(|r| r.iso3_country == "USA")
            .count();
        let can = tables
            .by_country_top
            .iter()
            .filter(|r| r.iso3_country == "CAN")
            .count();
        assert_eq!(usa, 3);
        assert_eq!(can, 2);
    }

    #[test]
    fn global_extract_truncates_to_top_k() {
        let rows: Vec<CombinedHotspot> = (0..10)
            .map(|i| hotspot("USA", &format!("g{i}"), (i + 1) as f64, 0.5))
            .collect();
        let tables = compute_priority_scores(&rows, 4, 50);
        assert_eq!(tables.global_top.len(), 4);
        assert_eq!(tables.global_top[0].geometry_ref, "g9");
    }
}
