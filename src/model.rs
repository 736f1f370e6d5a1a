use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One raw cell as produced by a data-loading collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Absent,
}

impl RawValue {
    /// Empty or whitespace-only text counts as absent, like a blank CSV cell.
    pub fn from_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            RawValue::Absent
        } else {
            RawValue::Text(trimmed.to_string())
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RawValue::Absent)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Number(n) => Some(format_number(*n)),
            RawValue::Absent => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(raw: &str) -> Self {
        RawValue::from_cell(raw)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// Integral floats print without a fractional part ("2023", not "2023.0").
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Field name to raw value. Ordered so record ids and logs are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawStatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<RawValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<RawValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> &RawValue {
        self.fields.get(name).unwrap_or(&RawValue::Absent)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).as_text()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawStatRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    Player,
    TeamSeason,
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityCategory::Player => write!(f, "player"),
            EntityCategory::TeamSeason => write!(f, "team_season"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub id: String,
    pub category: EntityCategory,
    pub numeric_features: BTreeMap<String, f64>,
    pub categorical_features: BTreeMap<String, String>,
    pub free_text: Option<String>,
    /// Display-only metadata (school, year, team); never used as a feature.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NormalizedEntity {
    pub fn numeric(&self, name: &str) -> Option<f64> {
        self.numeric_features.get(name).copied()
    }

    pub fn categorical(&self, name: &str) -> Option<&str> {
        self.categorical_features.get(name).map(|s| s.as_str())
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(|s| s.as_str())
    }
}

pub type FeatureVector = Vec<f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    rows: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.rows.get(i).and_then(|row| row.get(j)).copied()
    }

    pub fn row(&self, i: usize) -> Option<&[f64]> {
        self.rows.get(i).map(|r| r.as_slice())
    }
}

/// Exact-match constraints pulled from a free-text question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryConstraint {
    pub years: Vec<String>,
    pub team_fragment: Option<String>,
}

impl QueryConstraint {
    pub fn is_empty(&self) -> bool {
        self.years.is_empty() && self.team_fragment.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonScore {
    pub entity_id: String,
    pub scalar_score: f64,
    pub per_attribute_contribution: Vec<(String, f64)>,
}
