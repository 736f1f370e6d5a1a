use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::model::{EntityCategory, NormalizedEntity, RawStatRecord, RawValue};

pub const MIN_HEIGHT_INCHES: f64 = 40.0;
pub const MIN_WEIGHT_LBS: f64 = 100.0;

static HEIGHT_FEET_INCHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*-\s*(\d+)\s*$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericParse {
    Plain,
    /// "6-4" style feet-inches, or a plain number already in inches.
    Height,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissingPolicy {
    /// Missing, unparsable or sub-threshold values drop the whole record.
    Exclude,
    /// Missing or unparsable values resolve to this default.
    Default(f64),
}

#[derive(Debug, Clone)]
pub struct NumericField {
    pub name: String,
    pub parse: NumericParse,
    pub policy: MissingPolicy,
    /// Values at or below this bound are treated as bad data.
    pub min_exclusive: Option<f64>,
}

impl NumericField {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parse: NumericParse::Plain,
            policy: MissingPolicy::Exclude,
            min_exclusive: None,
        }
    }

    pub fn soft(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parse: NumericParse::Plain,
            policy: MissingPolicy::Default(0.0),
            min_exclusive: None,
        }
    }

    pub fn height(mut self) -> Self {
        self.parse = NumericParse::Height;
        self
    }

    pub fn above(mut self, bound: f64) -> Self {
        self.min_exclusive = Some(bound);
        self
    }
}

/// A numeric feature pulled out of the free-text summary ("18.2 Pts").
#[derive(Debug, Clone)]
pub struct TextStat {
    pub feature: String,
    pattern: Regex,
}

impl TextStat {
    pub fn new(feature: &str, label: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            feature: feature.to_string(),
            pattern: stat_pattern(label)?,
        })
    }

    pub fn find(&self, summary: &str) -> Option<f64> {
        let caps = self.pattern.captures(summary)?;
        caps.get(1)?.as_str().parse::<f64>().ok()
    }
}

/// Declares how one raw record shape becomes a `NormalizedEntity`.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub category: EntityCategory,
    pub id_fields: Vec<String>,
    pub numeric: Vec<NumericField>,
    pub categorical: Vec<String>,
    pub free_text: Option<String>,
    pub text_stats: Vec<TextStat>,
    pub labels: Vec<String>,
}

impl RecordSchema {
    pub fn new(category: EntityCategory) -> Self {
        Self {
            category,
            id_fields: Vec::new(),
            numeric: Vec::new(),
            categorical: Vec::new(),
            free_text: None,
            text_stats: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Feature names every normalized entity of this schema carries, in order.
    pub fn numeric_feature_names(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|f| f.name.clone())
            .chain(self.text_stats.iter().map(|s| s.feature.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    Missing { field: String },
    Unparsable { field: String, raw: String },
    BelowThreshold { field: String, value: f64, min: f64 },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Missing { field } => write!(f, "{field} is missing"),
            ExclusionReason::Unparsable { field, raw } => {
                write!(f, "{field} value '{raw}' is not numeric")
            }
            ExclusionReason::BelowThreshold { field, value, min } => {
                write!(f, "{field} = {value} is not above {min}")
            }
        }
    }
}

/// A record dropped by field policy. Not an error: it is reported so callers
/// can tell a dropped record from a kept one.
#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub record_id: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub entities: Vec<NormalizedEntity>,
    pub exclusions: Vec<Exclusion>,
}

/// Height in inches from "6-4" or a plain number. Anything else is `None`.
pub fn convert_height(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Number(n) if n.is_finite() => Some(*n),
        RawValue::Number(_) | RawValue::Absent => None,
        RawValue::Text(s) => {
            if let Some(caps) = HEIGHT_FEET_INCHES.captures(s) {
                let feet = caps.get(1)?.as_str().parse::<u32>().ok()?;
                let inches = caps.get(2)?.as_str().parse::<u32>().ok()?;
                return Some(f64::from(feet.checked_mul(12)?.checked_add(inches)?));
            }
            s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
        }
    }
}

pub fn parse_numeric(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Number(n) => Some(*n).filter(|v| v.is_finite()),
        RawValue::Text(s) => parse_number_text(s),
        RawValue::Absent => None,
    }
}

/// Lenient number parse for scraped cells: ".452", "1,024", "45.2%".
pub fn parse_number_text(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_end_matches('%');
    if s.is_empty() || s == "-" {
        return None;
    }
    let cleaned = s.replace(',', "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Level assigned to absent or blank categorical values.
pub const MISSING_CATEGORY: &str = "NAN";

pub fn normalize_categorical(raw: &RawValue) -> String {
    raw.as_text()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| MISSING_CATEGORY.to_string())
}

/// First number immediately preceding `label` in `summary`, if any.
pub fn find_stat(summary: &str, label: &str) -> Option<f64> {
    let re = stat_pattern(label).ok()?;
    let caps = re.captures(summary)?;
    caps.get(1)?.as_str().parse::<f64>().ok()
}

/// Like `find_stat`, but a missing label reads as 0.0.
pub fn extract_stat(summary: &str, label: &str) -> f64 {
    find_stat(summary, label).unwrap_or(0.0)
}

fn stat_pattern(label: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(\d*\.?\d+)\s*{}", regex::escape(label)))
}

pub fn record_id(record: &RawStatRecord, id_fields: &[String]) -> String {
    id_fields
        .iter()
        .map(|f| record.text(f).unwrap_or_else(|| "?".to_string()))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn normalize(
    record: &RawStatRecord,
    schema: &RecordSchema,
) -> Result<NormalizedEntity, Exclusion> {
    let id = record_id(record, &schema.id_fields);
    let exclude = |reason: ExclusionReason| Exclusion {
        record_id: id.clone(),
        reason,
    };

    let mut numeric_features = BTreeMap::new();
    for field in &schema.numeric {
        let raw = record.get(&field.name);
        let parsed = match field.parse {
            NumericParse::Plain => parse_numeric(raw),
            NumericParse::Height => convert_height(raw),
        };
        let value = match (parsed, field.policy) {
            (Some(v), _) => v,
            (None, MissingPolicy::Default(d)) => d,
            (None, MissingPolicy::Exclude) => {
                return Err(match raw.as_text() {
                    None => exclude(ExclusionReason::Missing {
                        field: field.name.clone(),
                    }),
                    Some(text) => exclude(ExclusionReason::Unparsable {
                        field: field.name.clone(),
                        raw: text,
                    }),
                });
            }
        };
        if let (Some(min), MissingPolicy::Exclude) = (field.min_exclusive, field.policy) {
            if value <= min {
                return Err(exclude(ExclusionReason::BelowThreshold {
                    field: field.name.clone(),
                    value,
                    min,
                }));
            }
        }
        numeric_features.insert(field.name.clone(), value);
    }

    let free_text = schema
        .free_text
        .as_ref()
        .and_then(|name| record.text(name));
    let summary = free_text.as_deref().unwrap_or("");
    for stat in &schema.text_stats {
        numeric_features.insert(stat.feature.clone(), stat.find(summary).unwrap_or(0.0));
    }

    let categorical_features = schema
        .categorical
        .iter()
        .map(|name| (name.clone(), normalize_categorical(record.get(name))))
        .collect();

    let labels = schema
        .labels
        .iter()
        .filter_map(|name| record.text(name).map(|v| (name.clone(), v)))
        .collect();

    Ok(NormalizedEntity {
        id,
        category: schema.category,
        numeric_features,
        categorical_features,
        free_text,
        labels,
    })
}

pub fn normalize_batch<'a, I>(records: I, schema: &RecordSchema) -> NormalizedBatch
where
    I: IntoIterator<Item = &'a RawStatRecord>,
{
    let mut batch = NormalizedBatch::default();
    for record in records {
        match normalize(record, schema) {
            Ok(entity) => batch.entities.push(entity),
            Err(exclusion) => {
                debug!(
                    record = %exclusion.record_id,
                    reason = %exclusion.reason,
                    "excluded record from batch"
                );
                batch.exclusions.push(exclusion);
            }
        }
    }
    info!(
        category = %schema.category,
        kept = batch.entities.len(),
        excluded = batch.exclusions.len(),
        "normalized batch"
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player_schema() -> RecordSchema {
        let mut schema = RecordSchema::new(EntityCategory::Player);
        schema.id_fields = vec!["name".into()];
        schema.numeric = vec![
            NumericField::required("height")
                .height()
                .above(MIN_HEIGHT_INCHES),
            NumericField::required("weight").above(MIN_WEIGHT_LBS),
        ];
        schema.categorical = vec!["pos".into()];
        schema.free_text = Some("summary".into());
        schema.text_stats = vec![TextStat::new("pts", "Pts").expect("valid label")];
        schema
    }

    #[test]
    fn height_conversion() {
        assert_eq!(convert_height(&"6-4".into()), Some(76.0));
        assert_eq!(convert_height(&"5-11".into()), Some(71.0));
        assert_eq!(convert_height(&RawValue::Number(72.0)), Some(72.0));
        assert_eq!(convert_height(&"abc".into()), None);
        assert_eq!(convert_height(&RawValue::Absent), None);
    }

    #[test]
    fn stat_extraction_distinguishes_absent_from_zero() {
        let summary = "18.2 Pts, 7 Reb, 0 Ast";
        assert_eq!(find_stat(summary, "Pts"), Some(18.2));
        assert_eq!(find_stat(summary, "Reb"), Some(7.0));
        assert_eq!(find_stat(summary, "Ast"), Some(0.0));
        assert_eq!(find_stat(summary, "Stl"), None);
        assert_eq!(extract_stat(summary, "Stl"), 0.0);
    }

    #[test]
    fn categorical_is_trimmed_and_uppercased() {
        assert_eq!(normalize_categorical(&" g ".into()), "G");
        assert_eq!(normalize_categorical(&RawValue::Absent), "NAN");
        assert_eq!(normalize_categorical(&RawValue::Text("  ".into())), "NAN");
    }

    #[test]
    fn light_record_is_excluded_whole() {
        let record = RawStatRecord::new()
            .with("name", "Tiny")
            .with("height", "6-0")
            .with("weight", 50.0);
        let err = normalize(&record, &player_schema()).unwrap_err();
        assert_eq!(err.record_id, "Tiny");
        assert!(matches!(
            err.reason,
            ExclusionReason::BelowThreshold { ref field, .. } if field == "weight"
        ));
    }

    #[test]
    fn unparsable_height_is_excluded() {
        let record = RawStatRecord::new()
            .with("name", "Odd")
            .with("height", "tall")
            .with("weight", "200");
        let err = normalize(&record, &player_schema()).unwrap_err();
        assert_eq!(
            err.reason,
            ExclusionReason::Unparsable {
                field: "height".into(),
                raw: "tall".into()
            }
        );
    }

    #[test]
    fn kept_record_has_every_numeric_key() {
        let record = RawStatRecord::new()
            .with("name", "Guard")
            .with("height", "6-2")
            .with("weight", "185")
            .with("pos", " g");
        let entity = normalize(&record, &player_schema()).expect("kept");
        assert_eq!(entity.numeric("height"), Some(74.0));
        assert_eq!(entity.numeric("pts"), Some(0.0));
        assert_eq!(entity.categorical("pos"), Some("G"));
        let keys: Vec<_> = entity.numeric_features.keys().cloned().collect();
        let mut expected = player_schema().numeric_feature_names();
        expected.sort();
        assert_eq!(keys, expected);
    }
}
