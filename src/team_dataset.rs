use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ScoutError, ScoutResult};
use crate::model::{RawStatRecord, format_number};
use crate::normalize::parse_numeric;
use crate::table::Table;

pub const REQUIRED_COLUMNS: [&str; 10] = [
    "TEAM", "YEAR", "ADJOE", "ADJDE", "EFG_O", "EFG_D", "TOR", "TORD", "ORB", "FTR",
];

pub const SCOUTING_METRICS: [(&str, &str); 8] = [
    ("ADJOE", "Adjusted Offensive Efficiency"),
    ("ADJDE", "Adjusted Defensive Efficiency"),
    ("EFG_O", "Effective FG% (Offense)"),
    ("EFG_D", "Effective FG% (Defense)"),
    ("TOR", "Turnover % (Offense)"),
    ("TORD", "Turnover % (Defense)"),
    ("ORB", "Offensive Rebound %"),
    ("FTR", "Free Throw Rate"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSeason {
    pub team: String,
    pub year: i32,
    pub conference: Option<String>,
    pub seed: Option<String>,
    pub postseason: Option<String>,
    pub metrics: BTreeMap<String, f64>,
}

impl TeamSeason {
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TeamTable {
    pub seasons: Vec<TeamSeason>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMetricsRow {
    pub team: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamComparison {
    pub year: i32,
    pub normalized: bool,
    pub metrics: Vec<String>,
    pub rows: Vec<TeamMetricsRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weakness {
    pub metric: &'static str,
    pub value: f64,
    pub comment: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeaknessProfile {
    pub team: String,
    pub year: i32,
    pub weaknesses: Vec<Weakness>,
    pub suggestions: Vec<&'static str>,
}

impl TeamTable {
    /// Load the team-season CSV. A missing file or any missing required column
    /// makes the dataset unavailable.
    pub fn load(path: &Path) -> ScoutResult<Self> {
        if !path.exists() {
            return Err(ScoutError::DataUnavailable(format!(
                "file not found: {}",
                path.display()
            )));
        }
        let table = Table::load_csv(path).map_err(ScoutError::data)?;
        Self::from_table(&table)
    }

    pub fn from_table(table: &Table) -> ScoutResult<Self> {
        let missing = table.missing_columns(&REQUIRED_COLUMNS);
        if !missing.is_empty() {
            return Err(ScoutError::DataUnavailable(format!(
                "missing expected columns: {}",
                missing.join(", ")
            )));
        }

        let mut seasons = Vec::new();
        for record in table.records() {
            let Some(team) = record.text("TEAM") else {
                continue;
            };
            let Some(year) = parse_numeric(record.get("YEAR")).map(|y| y as i32) else {
                debug!(team = %team, "skipping row without a year");
                continue;
            };
            let metrics = SCOUTING_METRICS
                .iter()
                .filter_map(|(key, _)| parse_numeric(record.get(key)).map(|v| (key.to_string(), v)))
                .collect();
            seasons.push(TeamSeason {
                team,
                year,
                conference: record.text("CONF"),
                seed: record.text("SEED"),
                postseason: record.text("POSTSEASON"),
                metrics,
            });
        }
        Ok(Self { seasons })
    }

    /// Distinct seasons, newest first.
    pub fn years(&self) -> Vec<i32> {
        let set: BTreeSet<i32> = self.seasons.iter().map(|s| s.year).collect();
        set.into_iter().rev().collect()
    }

    pub fn teams_in(&self, year: i32) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .seasons
            .iter()
            .filter(|s| s.year == year)
            .map(|s| s.team.as_str())
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn team_names(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.seasons.iter().map(|s| s.team.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn find(&self, team: &str, year: i32) -> Option<&TeamSeason> {
        self.seasons
            .iter()
            .find(|s| s.year == year && s.team.eq_ignore_ascii_case(team))
    }

    /// Largest value of `metric` over every season in the table.
    pub fn column_max(&self, metric: &str) -> Option<f64> {
        self.seasons
            .iter()
            .filter_map(|s| s.metric(metric))
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Two teams side by side over the scouting metrics. With `normalize`
    /// every value is divided by its column maximum across all seasons.
    pub fn compare_teams(
        &self,
        year: i32,
        teams: &[String],
        normalize: bool,
    ) -> ScoutResult<TeamComparison> {
        let distinct: BTreeSet<String> = teams.iter().map(|t| t.to_lowercase()).collect();
        if teams.len() != 2 || distinct.len() != 2 {
            return Err(ScoutError::InvalidSelection(
                "please select exactly 2 teams".to_string(),
            ));
        }

        let maxima: Vec<Option<f64>> = SCOUTING_METRICS
            .iter()
            .map(|(key, _)| self.column_max(key))
            .collect();

        let mut rows = Vec::new();
        for team in teams {
            let Some(season) = self.find(team, year) else {
                warn!(team = %team, year, "team not in season, skipping");
                continue;
            };
            let values = SCOUTING_METRICS
                .iter()
                .zip(&maxima)
                .map(|((key, _), max)| {
                    let v = season.metric(key)?;
                    if !normalize {
                        return Some(v);
                    }
                    match max {
                        Some(m) if *m != 0.0 => Some(v / m),
                        _ => Some(0.0),
                    }
                })
                .collect();
            rows.push(TeamMetricsRow {
                team: season.team.clone(),
                values,
            });
        }
        if rows.is_empty() {
            return Err(ScoutError::EntityNotFound(format!(
                "{} in {year}",
                teams.join(" / ")
            )));
        }

        Ok(TeamComparison {
            year,
            normalized: normalize,
            metrics: SCOUTING_METRICS.iter().map(|(k, _)| k.to_string()).collect(),
            rows,
        })
    }

    pub fn weakness(&self, team: &str, year: i32) -> ScoutResult<WeaknessProfile> {
        let season = self
            .find(team, year)
            .ok_or_else(|| ScoutError::EntityNotFound(format!("{team} ({year})")))?;
        weakness_profile(season)
    }
}

pub fn weakness_profile(season: &TeamSeason) -> ScoutResult<WeaknessProfile> {
    let need = |key: &str| {
        season.metric(key).ok_or_else(|| {
            ScoutError::DataUnavailable(format!(
                "{key} missing for {} ({})",
                season.team, season.year
            ))
        })
    };
    let efg_d = need("EFG_D")?;
    let tor = need("TOR")?;
    let orb = need("ORB")?;
    let adjde = need("ADJDE")?;

    let weaknesses = vec![
        Weakness {
            metric: "EFG_D",
            value: efg_d,
            comment: "Higher value = Worse FG defense",
        },
        Weakness {
            metric: "TOR",
            value: tor,
            comment: "Higher value = More turnovers",
        },
        Weakness {
            metric: "ORB",
            value: 100.0 - orb,
            comment: "Lower % = Weak on offensive boards",
        },
        Weakness {
            metric: "ADJDE",
            value: adjde,
            comment: "Higher = Worse defensive efficiency",
        },
    ];

    let mut suggestions = Vec::new();
    if efg_d > 50.0 {
        suggestions.push("Attack mid-range and paint: opponent struggles to contest shots.");
    }
    if tor > 18.0 {
        suggestions.push("Press or trap defense: opponent prone to turnovers.");
    }
    if orb < 30.0 {
        suggestions.push("Crash offensive boards: weakness in securing rebounds.");
    }
    if adjde > 105.0 {
        suggestions.push("Push tempo: poor defensive efficiency overall.");
    }

    Ok(WeaknessProfile {
        team: season.team.clone(),
        year: season.year,
        weaknesses,
        suggestions,
    })
}

/// The two raw row shapes the team tables come in, decided once per file
/// from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoutingRowShape {
    /// Ratings table: TEAM, YEAR, CONF, SEED, POSTSEASON, ADJOE, ADJDE.
    Ratings,
    /// Tournament table: Mapped_ESPN_Team_Name, Season, ... long column names.
    Tournament,
}

struct ShapeColumns {
    team: &'static str,
    year: &'static str,
    conference: &'static str,
    seed: &'static str,
    round: &'static str,
    off_eff: &'static str,
    def_eff: &'static str,
}

impl ScoutingRowShape {
    pub fn detect(headers: &[String]) -> Option<Self> {
        let has = |name: &str| headers.iter().any(|h| h == name);
        if has("TEAM") && has("ADJOE") {
            Some(ScoutingRowShape::Ratings)
        } else if has("Mapped_ESPN_Team_Name") {
            Some(ScoutingRowShape::Tournament)
        } else {
            None
        }
    }

    fn columns(self) -> ShapeColumns {
        match self {
            ScoutingRowShape::Ratings => ShapeColumns {
                team: "TEAM",
                year: "YEAR",
                conference: "CONF",
                seed: "SEED",
                round: "POSTSEASON",
                off_eff: "ADJOE",
                def_eff: "ADJDE",
            },
            ScoutingRowShape::Tournament => ShapeColumns {
                team: "Mapped_ESPN_Team_Name",
                year: "Season",
                conference: "Mapped_Conference_Name",
                seed: "Seed",
                round: "Post-Season_Tournament",
                off_eff: "Adjusted_Offensive_Efficiency",
                def_eff: "Adjusted_Defensive_Efficiency",
            },
        }
    }

    /// Total mapping from a row of this shape to the canonical summary record.
    pub fn to_summary(self, record: &RawStatRecord) -> ScoutingSummary {
        let cols = self.columns();
        let cell = |name: &str| record.text(name).unwrap_or_default();
        let mut summary = ScoutingSummary {
            team: cell(cols.team),
            year: tidy_year(&cell(cols.year)),
            conference: cell(cols.conference),
            seed: cell(cols.seed),
            round: cell(cols.round),
            off_eff: cell(cols.off_eff),
            def_eff: cell(cols.def_eff),
            summary: String::new(),
        };
        summary.summary = summary.sentence();
        summary
    }
}

/// "2023.0" -> "2023"; other text unchanged.
fn tidy_year(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.fract() == 0.0 => format_number(v),
        _ => raw.trim().to_string(),
    }
}

/// One team-season as stored for retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutingSummary {
    pub team: String,
    pub year: String,
    pub conference: String,
    pub seed: String,
    pub round: String,
    pub off_eff: String,
    pub def_eff: String,
    pub summary: String,
}

impl ScoutingSummary {
    pub fn sentence(&self) -> String {
        format!(
            "{} ({}) from {} had an offensive efficiency of {} and defensive efficiency of {}. \
They reached round {} with seed {}.",
            self.team, self.year, self.conference, self.off_eff, self.def_eff, self.round, self.seed
        )
    }
}

/// Summaries for every row of a table, or `None` when the header matches
/// neither known shape.
pub fn scouting_summaries(table: &Table) -> Option<Vec<ScoutingSummary>> {
    let shape = ScoutingRowShape::detect(&table.headers)?;
    Some(
        table
            .records()
            .iter()
            .map(|r| shape.to_summary(r))
            .collect(),
    )
}

/// Pretty JSON array, written to a sibling temp file and swapped into place.
pub fn write_scouting_json(path: &Path, records: &[ScoutingSummary]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(records).context("serialize scouting summaries")?;
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "TEAM,CONF,YEAR,ADJOE,ADJDE,EFG_O,EFG_D,TOR,TORD,ORB,FTR,SEED,POSTSEASON\n\
Purdue,B10,2023,120.5,95.2,52.0,45.1,16.0,19.0,35.0,33.0,1,R64\n\
Illinois,B10,2023,110.0,108.0,49.0,51.0,19.5,17.0,28.0,30.0,9,R64\n\
Purdue,B10,2022,122.0,99.0,55.0,47.0,17.0,17.0,33.0,30.0,3,S16\n";

    fn table() -> TeamTable {
        TeamTable::from_table(&Table::from_csv(CSV).expect("csv")).expect("columns")
    }

    #[test]
    fn missing_required_column_is_data_unavailable() {
        let t = Table::from_csv("TEAM,YEAR,ADJOE\nA,2023,100\n").expect("csv");
        let err = TeamTable::from_table(&t).unwrap_err();
        assert!(matches!(err, ScoutError::DataUnavailable(ref m) if m.contains("ADJDE")));
    }

    #[test]
    fn years_newest_first_and_teams_sorted() {
        let t = table();
        assert_eq!(t.years(), vec![2023, 2022]);
        assert_eq!(t.teams_in(2023), vec!["Illinois", "Purdue"]);
    }

    #[test]
    fn normalized_comparison_divides_by_column_max() {
        let t = table();
        let cmp = t
            .compare_teams(2023, &["Purdue".into(), "Illinois".into()], true)
            .expect("two teams");
        assert_eq!(cmp.rows.len(), 2);
        // ADJOE max over all seasons is 122.0.
        assert_eq!(cmp.rows[0].values[0], Some(120.5 / 122.0));
        assert!(t.compare_teams(2023, &["Purdue".into()], false).is_err());
    }

    #[test]
    fn weakness_suggestions_follow_thresholds() {
        let t = table();
        let illinois = t.weakness("Illinois", 2023).expect("row");
        assert_eq!(illinois.suggestions.len(), 4);
        assert_eq!(illinois.weaknesses[2].value, 72.0);
        let purdue = t.weakness("purdue", 2023).expect("row");
        assert!(purdue.suggestions.is_empty());
        assert!(matches!(
            t.weakness("Duke", 2023),
            Err(ScoutError::EntityNotFound(_))
        ));
    }

    #[test]
    fn tournament_shape_maps_long_column_names() {
        let csv = "Mapped_ESPN_Team_Name,Season,Mapped_Conference_Name,Seed,Post-Season_Tournament,Adjusted_Offensive_Efficiency,Adjusted_Defensive_Efficiency\n\
Houston,2024.0,Big 12,1,Sweet Sixteen,118.1,87.0\n";
        let t = Table::from_csv(csv).expect("csv");
        let out = scouting_summaries(&t).expect("known shape");
        assert_eq!(out[0].team, "Houston");
        assert_eq!(out[0].year, "2024");
        assert_eq!(
            out[0].summary,
            "Houston (2024) from Big 12 had an offensive efficiency of 118.1 and defensive efficiency of 87.0. They reached round Sweet Sixteen with seed 1."
        );
    }

    #[test]
    fn export_round_trips_through_json_file() {
        let t = Table::from_csv(CSV).expect("csv");
        let out = scouting_summaries(&t).expect("ratings shape");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("json").join("team_scouting_data.json");
        write_scouting_json(&path, &out).expect("write");
        let raw = fs::read_to_string(&path).expect("read back");
        let back: Vec<ScoutingSummary> = serde_json::from_str(&raw).expect("json");
        assert_eq!(back.len(), 3);
        assert_eq!(back[0].round, "R64");
        assert!(back[0].summary.starts_with("Purdue (2023) from B10"));
    }
}
