use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{ScoutError, ScoutResult};
use crate::model::{EntityCategory, NormalizedEntity, RawStatRecord};
use crate::normalize::{
    MIN_HEIGHT_INCHES, MIN_WEIGHT_LBS, NumericField, RecordSchema, TextStat, normalize_batch,
};
use crate::similarity::SimilarityIndex;
use crate::table::Table;

pub const PLAYER_NUMERIC: [&str; 5] = ["height", "weight", "pts", "reb", "ast"];
pub const PLAYER_CATEGORICAL: [&str; 2] = ["pos", "class"];

pub const DEFAULT_MATCHES: usize = 5;
pub const MIN_MATCHES: usize = 3;
pub const MAX_MATCHES: usize = 10;

const MERGED_RENAMES: [(&str, &str); 4] = [
    ("height_x", "height"),
    ("weight_x", "weight"),
    ("pos_x", "pos"),
    ("class_x", "class"),
];

/// The player statistics table comes either straight from the scraper or
/// merged with a second source, which suffixes the shared columns with `_x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerRowVariant {
    Merged,
    Plain,
}

impl PlayerRowVariant {
    pub fn detect(headers: &[String]) -> Self {
        if headers.iter().any(|h| h == "height_x") {
            PlayerRowVariant::Merged
        } else {
            PlayerRowVariant::Plain
        }
    }

    pub fn canonical(self, record: &RawStatRecord) -> RawStatRecord {
        match self {
            PlayerRowVariant::Plain => record.clone(),
            PlayerRowVariant::Merged => {
                let mut out = RawStatRecord::new();
                for name in record.field_names() {
                    let renamed = MERGED_RENAMES
                        .iter()
                        .find(|(from, _)| *from == name)
                        .map(|(_, to)| *to);
                    // the merged column wins over an unsuffixed duplicate
                    if renamed.is_none() && MERGED_RENAMES.iter().any(|(_, to)| *to == name) {
                        continue;
                    }
                    out.insert(renamed.unwrap_or(name), record.get(name).clone());
                }
                out
            }
        }
    }
}

pub fn player_schema() -> Result<RecordSchema, regex::Error> {
    let mut schema = RecordSchema::new(EntityCategory::Player);
    schema.id_fields = vec!["summary".into(), "school".into(), "year".into()];
    schema.numeric = vec![
        NumericField::required("height").height().above(MIN_HEIGHT_INCHES),
        NumericField::required("weight").above(MIN_WEIGHT_LBS),
    ];
    schema.categorical = PLAYER_CATEGORICAL.iter().map(|s| s.to_string()).collect();
    schema.free_text = Some("summary".into());
    schema.text_stats = vec![
        TextStat::new("pts", "Pts")?,
        TextStat::new("reb", "Reb")?,
        TextStat::new("ast", "Ast")?,
    ];
    schema.labels = vec!["school".into(), "year".into()];
    Ok(schema)
}

/// "summary | school (year)", the key a user selects a player by.
pub fn player_label(entity: &NormalizedEntity) -> String {
    format!(
        "{} | {} ({})",
        entity.free_text.as_deref().unwrap_or(""),
        entity.label("school").unwrap_or(""),
        entity.label("year").unwrap_or("")
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerCard {
    pub summary: String,
    pub school: String,
    pub year: String,
}

impl PlayerCard {
    fn of(entity: &NormalizedEntity) -> Self {
        Self {
            summary: entity.free_text.clone().unwrap_or_default(),
            school: entity.label("school").unwrap_or("").to_string(),
            year: entity.label("year").unwrap_or("").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerMatch {
    #[serde(flatten)]
    pub player: PlayerCard,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarPlayers {
    pub target: PlayerCard,
    pub matches: Vec<PlayerMatch>,
}

/// Every usable player in the table, with the pairwise similarity already
/// computed. Built once per dataset version.
#[derive(Debug, Clone)]
pub struct PlayerPool {
    pub index: SimilarityIndex,
    pub labels: Vec<String>,
    pub excluded: usize,
}

impl PlayerPool {
    pub fn load(path: &Path) -> ScoutResult<Self> {
        let table = Table::load_csv(path).map_err(ScoutError::data)?;
        Self::from_table(&table)
    }

    pub fn from_table(table: &Table) -> ScoutResult<Self> {
        let variant = PlayerRowVariant::detect(&table.headers);
        let records: Vec<RawStatRecord> = table
            .records()
            .iter()
            .map(|r| variant.canonical(r))
            .collect();

        if let Some(first) = records.first() {
            let missing: Vec<&str> = ["height", "weight", "summary"]
                .into_iter()
                .filter(|c| !first.field_names().any(|f| f == *c))
                .collect();
            if !missing.is_empty() {
                return Err(ScoutError::DataUnavailable(format!(
                    "player table is missing column(s): {}",
                    missing.join(", ")
                )));
            }
        }

        let schema = player_schema().map_err(|err| ScoutError::data(err.into()))?;
        let batch = normalize_batch(&records, &schema);
        let excluded = batch.exclusions.len();

        let numeric: Vec<String> = PLAYER_NUMERIC.iter().map(|s| s.to_string()).collect();
        let index = SimilarityIndex::build(batch.entities, &numeric, &schema.categorical);
        let labels = index.features.entities.iter().map(player_label).collect();
        info!(players = index.len(), excluded, ?variant, "player pool ready");

        Ok(Self {
            index,
            labels,
            excluded,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Labels containing the query, case-insensitively, for picking a target.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let needle = query.trim().to_lowercase();
        self.labels
            .iter()
            .filter(|l| l.to_lowercase().contains(&needle))
            .map(|l| l.as_str())
            .collect()
    }

    pub fn similar(&self, label: &str, k: usize) -> ScoutResult<SimilarPlayers> {
        let target = self
            .position(label)
            .ok_or_else(|| ScoutError::EntityNotFound(label.to_string()))?;
        let entity = &self.index.features.entities[target];
        let matches = self
            .index
            .similar_to(target, k)
            .into_iter()
            .map(|(e, score)| PlayerMatch {
                player: PlayerCard::of(e),
                score,
            })
            .collect();
        Ok(SimilarPlayers {
            target: PlayerCard::of(entity),
            matches,
        })
    }
}
