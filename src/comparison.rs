use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::ComparisonScore;
use crate::normalize::parse_number_text;

/// Per-game columns averaged for a player comparison.
pub const AVERAGED_STATS: [&str; 10] = [
    "PTS", "AST", "TRB", "MP", "FG%", "3P%", "FT%", "STL", "BLK", "TOV",
];

/// Game impact weights, in reporting order. They sum to 1.0.
pub const GAME_IMPACT_WEIGHTS: [(&str, f64); 9] = [
    ("PTS", 0.30),
    ("AST", 0.20),
    ("TRB", 0.15),
    ("STL", 0.10),
    ("BLK", 0.10),
    ("FG%", 0.05),
    ("3P%", 0.05),
    ("FT%", 0.03),
    ("MP", 0.02),
];

pub const DELTA_THRESHOLD: f64 = 0.5;

// Absorbs decimal representation error so 10.5 - 10.0 style gaps meet the threshold.
const THRESHOLD_TOLERANCE: f64 = 1e-9;

pub type StatLine = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    First,
    Second,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatDelta {
    pub stat: String,
    pub leader: Side,
    pub v1: f64,
    pub v2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub first: ComparisonScore,
    pub second: ComparisonScore,
    pub verdict: Verdict,
    pub reasons: Vec<StatDelta>,
}

impl Comparison {
    pub fn winner_id(&self) -> Option<&str> {
        match self.verdict {
            Verdict::First => Some(&self.first.entity_id),
            Verdict::Second => Some(&self.second.entity_id),
            Verdict::Tie => None,
        }
    }
}

pub fn weights() -> Vec<(String, f64)> {
    GAME_IMPACT_WEIGHTS
        .iter()
        .map(|(k, w)| (k.to_string(), *w))
        .collect()
}

/// Mean of each column over the rows where it parses as a number. Columns with
/// no numeric cell are left out. Means are rounded half-to-even to two
/// decimals.
pub fn average_stats(rows: &[BTreeMap<String, String>], columns: &[&str]) -> StatLine {
    let mut out = StatLine::new();
    for col in columns {
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(*col))
            .filter_map(|cell| parse_number_text(cell))
            .collect();
        if values.is_empty() {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        out.insert(col.to_string(), round2(mean));
    }
    out
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

/// Weighted sum over the declared weights; a stat missing from `avg` adds 0.0.
pub fn score(avg: &StatLine, weights: &[(String, f64)]) -> f64 {
    weights
        .iter()
        .map(|(stat, w)| w * avg.get(stat).copied().unwrap_or(0.0))
        .sum()
}

pub fn contributions(avg: &StatLine, weights: &[(String, f64)]) -> Vec<(String, f64)> {
    weights
        .iter()
        .map(|(stat, w)| (stat.clone(), w * avg.get(stat).copied().unwrap_or(0.0)))
        .collect()
}

pub fn score_entity(entity_id: &str, avg: &StatLine, weights: &[(String, f64)]) -> ComparisonScore {
    ComparisonScore {
        entity_id: entity_id.to_string(),
        scalar_score: score(avg, weights),
        per_attribute_contribution: contributions(avg, weights),
    }
}

/// Weighted stats whose gap is at least `threshold`, in weight order.
pub fn explain_delta(
    avg1: &StatLine,
    avg2: &StatLine,
    weights: &[(String, f64)],
    threshold: f64,
) -> Vec<StatDelta> {
    weights
        .iter()
        .filter_map(|(stat, _)| {
            let v1 = avg1.get(stat).copied().unwrap_or(0.0);
            let v2 = avg2.get(stat).copied().unwrap_or(0.0);
            if (v1 - v2).abs() + THRESHOLD_TOLERANCE < threshold {
                return None;
            }
            let leader = if v1 > v2 { Side::First } else { Side::Second };
            Some(StatDelta {
                stat: stat.clone(),
                leader,
                v1,
                v2,
            })
        })
        .collect()
}

pub fn verdict(score1: f64, score2: f64) -> Verdict {
    if score1 > score2 {
        Verdict::First
    } else if score2 > score1 {
        Verdict::Second
    } else {
        Verdict::Tie
    }
}

pub fn compare(
    (id1, avg1): (&str, &StatLine),
    (id2, avg2): (&str, &StatLine),
    weights: &[(String, f64)],
    threshold: f64,
) -> Comparison {
    let first = score_entity(id1, avg1, weights);
    let second = score_entity(id2, avg2, weights);
    let verdict = verdict(first.scalar_score, second.scalar_score);
    Comparison {
        first,
        second,
        verdict,
        reasons: explain_delta(avg1, avg2, weights, threshold),
    }
}
