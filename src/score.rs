//! Opportunity scoring and ranking.
//!
//! The score is the sum of three independent bands (position, impressions,
//! CTR gap against the expected curve), capped at 100. The smallest possible
//! sum is 20, so every score lands in [1, 100] by construction.

use crate::model::{Opportunity, OpportunityKind, PerformanceRecord};

/// Tunable knobs for the selector. Defaults match the production values.
#[derive(Debug, Clone, Copy)]
pub struct RankingConfig {
    /// Records below this many impressions are excluded entirely.
    pub min_impressions: u64,
    /// Ranked list cap.
    pub max_opportunities: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_impressions: 100,
            max_opportunities: 25,
        }
    }
}

/// Expected CTR by integer search position. Positions beyond 10 (and the
/// pathological position 0) fall back to 0.02.
fn expected_ctr(position: f64) -> f64 {
    match position as i64 {
        1 => 0.28,
        2 => 0.15,
        3 => 0.11,
        4 => 0.08,
        5 => 0.07,
        6 => 0.05,
        7 => 0.04,
        8 => 0.035,
        9 => 0.03,
        10 => 0.025,
        _ => 0.02,
    }
}

/// Score a performance record on a 1–100 scale.
pub fn opportunity_score(record: &PerformanceRecord) -> u8 {
    let position = record.position;
    let mut score: u32 = 0;

    score += if (4.0..=10.0).contains(&position) {
        35
    } else if (11.0..=15.0).contains(&position) {
        28
    } else if (1.0..=3.0).contains(&position) {
        15
    } else if (16.0..=30.0).contains(&position) {
        20
    } else {
        10
    };

    score += if record.impressions >= 10_000 {
        30
    } else if record.impressions >= 5_000 {
        25
    } else if record.impressions >= 1_000 {
        18
    } else if record.impressions >= 500 {
        12
    } else {
        5
    };

    let expected = expected_ctr(position);
    score += if record.ctr < expected * 0.5 {
        25
    } else if record.ctr < expected * 0.75 {
        18
    } else if record.ctr < expected {
        10
    } else {
        5
    };

    score.min(100) as u8
}

/// Derive a human keyword from a page URL: last path segment, hyphens to
/// spaces, title-cased.
pub fn keyword_from_url(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or(url);
    segment
        .replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the ranked opportunity list from query and page records.
///
/// Query records become `New` opportunities, page records `Refresh`. Records
/// under the impressions threshold are dropped. The result is sorted by score
/// descending — stable, so ties keep encounter order (queries before pages)
/// — and truncated to the configured cap.
pub fn rank_opportunities(
    queries: &[PerformanceRecord],
    pages: &[PerformanceRecord],
    config: &RankingConfig,
) -> Vec<Opportunity> {
    let mut opportunities = Vec::new();

    for record in queries {
        if record.impressions < config.min_impressions {
            continue;
        }
        opportunities.push(Opportunity {
            id: format!("query_{}", record.key),
            kind: OpportunityKind::New,
            keyword: record.key.clone(),
            page: None,
            position: record.position,
            impressions: record.impressions,
            ctr: record.ctr,
            clicks: record.clicks,
            score: opportunity_score(record),
        });
    }

    for record in pages {
        if record.impressions < config.min_impressions {
            continue;
        }
        opportunities.push(Opportunity {
            id: format!("page_{}", record.key),
            kind: OpportunityKind::Refresh,
            keyword: keyword_from_url(&record.key),
            page: Some(record.key.clone()),
            position: record.position,
            impressions: record.impressions,
            ctr: record.ctr,
            clicks: record.clicks,
            score: opportunity_score(record),
        });
    }

    opportunities.sort_by(|a, b| b.score.cmp(&a.score));
    opportunities.truncate(config.max_opportunities);
    opportunities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(position: f64, impressions: u64, ctr: f64) -> PerformanceRecord {
        PerformanceRecord {
            key: "k".into(),
            clicks: 0,
            impressions,
            ctr,
            position,
        }
    }

    #[test]
    fn score_always_in_range() {
        let cases = [
            record(0.0, 0, 0.0),
            record(1.0, 50_000, 0.9),
            record(7.5, 12_000, 0.0),
            record(100.0, 100, 1.0),
            record(10.9, 999, 0.024),
        ];
        for case in &cases {
            let score = opportunity_score(case);
            assert!((1..=100).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn position_band_edges() {
        // 4 and 10 land in the strongest band; 3 and 11 do not.
        let base = |position| opportunity_score(&record(position, 0, 1.0));
        assert_eq!(base(4.0), 35 + 5 + 5);
        assert_eq!(base(10.0), 35 + 5 + 5);
        assert_eq!(base(3.0), 15 + 5 + 5);
        assert_eq!(base(11.0), 28 + 5 + 5);
        assert_eq!(base(15.0), 28 + 5 + 5);
        assert_eq!(base(16.0), 20 + 5 + 5);
        assert_eq!(base(30.0), 20 + 5 + 5);
        assert_eq!(base(31.0), 10 + 5 + 5);
    }

    #[test]
    fn impressions_bands() {
        let imp = |impressions| opportunity_score(&record(0.0, impressions, 1.0));
        assert_eq!(imp(10_000), 10 + 30 + 5);
        assert_eq!(imp(9_999), 10 + 25 + 5);
        assert_eq!(imp(5_000), 10 + 25 + 5);
        assert_eq!(imp(1_000), 10 + 18 + 5);
        assert_eq!(imp(500), 10 + 12 + 5);
        assert_eq!(imp(499), 10 + 5 + 5);
    }

    #[test]
    fn ctr_gap_uses_expected_curve() {
        // Position 1 expects 0.28.
        let ctr = |actual| opportunity_score(&record(1.0, 0, actual));
        assert_eq!(ctr(0.10), 15 + 5 + 25); // < 50% of expected
        assert_eq!(ctr(0.15), 15 + 5 + 18); // < 75%
        assert_eq!(ctr(0.25), 15 + 5 + 10); // < 100%
        assert_eq!(ctr(0.30), 15 + 5 + 5); // at or above expected
    }

    #[test]
    fn ctr_default_applies_past_position_ten() {
        // Position 42 falls back to expected 0.02.
        assert_eq!(opportunity_score(&record(42.0, 0, 0.005)), 10 + 5 + 25);
        assert_eq!(opportunity_score(&record(42.0, 0, 0.03)), 10 + 5 + 5);
    }

    #[test]
    fn impressions_filter_drops_small_records() {
        let queries = vec![record(5.0, 50, 0.01), record(5.0, 150, 0.01)];
        let ranked = rank_opportunities(&queries, &[], &RankingConfig::default());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].impressions, 150);
    }

    #[test]
    fn ranked_list_sorted_and_capped() {
        let queries: Vec<PerformanceRecord> = (0..40)
            .map(|i| PerformanceRecord {
                key: format!("query {i}"),
                clicks: 0,
                impressions: 100 + i * 400,
                ctr: 0.01,
                position: 5.0 + i as f64,
            })
            .collect();
        let ranked = rank_opportunities(&queries, &[], &RankingConfig::default());
        assert_eq!(ranked.len(), 25);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn ties_keep_queries_before_pages() {
        let queries = vec![record(5.0, 200, 0.5)];
        let mut page = record(5.0, 200, 0.5);
        page.key = "https://example.com/best-running-shoes".into();
        let ranked = rank_opportunities(&queries, &[page], &RankingConfig::default());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranked[0].kind, OpportunityKind::New);
        assert_eq!(ranked[1].kind, OpportunityKind::Refresh);
    }

    #[test]
    fn page_opportunity_fields() {
        let mut page = record(12.0, 800, 0.02);
        page.key = "https://example.com/blog/best-running-shoes".into();
        let ranked = rank_opportunities(&[], &[page], &RankingConfig::default());
        assert_eq!(ranked[0].id, "page_https://example.com/blog/best-running-shoes");
        assert_eq!(ranked[0].keyword, "Best Running Shoes");
        assert_eq!(
            ranked[0].page.as_deref(),
            Some("https://example.com/blog/best-running-shoes")
        );
    }

    #[test]
    fn keyword_from_url_title_cases_segment() {
        assert_eq!(
            keyword_from_url("https://example.com/best-running-shoes"),
            "Best Running Shoes"
        );
        assert_eq!(keyword_from_url("https://example.com/PU-leather"), "Pu Leather");
        assert_eq!(keyword_from_url("plain"), "Plain");
    }

    #[test]
    fn empty_input_yields_empty_list() {
        assert!(rank_opportunities(&[], &[], &RankingConfig::default()).is_empty());
    }
}
