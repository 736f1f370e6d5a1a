use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::model::{QueryConstraint, format_number};

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"20\d{2}").expect("valid regex"));
static PROPER_NOUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)?\b").expect("valid regex"));

/// Capitalized words that open questions rather than name teams.
const QUESTION_WORDS: &[&str] = &[
    "How", "What", "Which", "Who", "Whom", "Whose", "When", "Where", "Why", "Was", "Were", "Is",
    "Are", "Did", "Do", "Does", "Has", "Have", "Had", "Can", "Could", "Would", "Should", "Will",
    "The", "In", "On", "Compare", "Tell", "Show", "List", "Give", "Please", "Ncaa",
];

/// Topics the team-season summaries carry no data for.
pub const UNSUPPORTED_TOPICS: &[&str] = &[
    "turnover",
    "rebound",
    "3pt",
    "3-point",
    "three point",
    "steal",
    "block",
    "free throw",
];

pub const ANSWER_INSTRUCTION: &str = "You are a helpful NCAA basketball assistant.\n\
Use only the information from the context below to answer the question.\n\
If no relevant information is found, say: \"Not enough data in the retrieved NCAA stats.\"";

/// One hit from the nearest-neighbour service, in the service's order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl IndexMatch {
    pub fn meta_text(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => n.as_f64().map(format_number),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn team(&self) -> Option<String> {
        self.meta_text("team")
    }

    pub fn year(&self) -> Option<String> {
        self.meta_text("year")
    }

    pub fn summary(&self) -> String {
        self.meta_text("summary").unwrap_or_default()
    }

    pub fn source_label(&self) -> String {
        format!(
            "{} ({})",
            self.team().unwrap_or_else(|| "Unknown".to_string()),
            self.year().unwrap_or_else(|| "Unknown".to_string())
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub matches: Vec<IndexMatch>,
    /// True when nothing passed the constraint and the unfiltered list was kept.
    pub fell_back: bool,
}

pub fn unsupported_topic(query: &str) -> Option<&'static str> {
    let q = query.to_lowercase();
    UNSUPPORTED_TOPICS.iter().copied().find(|topic| q.contains(topic))
}

/// Every "20xx" in the query plus the first capitalized phrase that is not a
/// question word.
pub fn extract_constraint(query: &str) -> QueryConstraint {
    QueryConstraint {
        years: extract_years(query),
        team_fragment: guess_team_fragment(query),
    }
}

/// Prefer the longest known team name found in the query; fall back to the
/// capitalized-phrase guess when none is present.
pub fn extract_constraint_with_teams(query: &str, known_teams: &[String]) -> QueryConstraint {
    let lowered = query.to_lowercase();
    let known = known_teams
        .iter()
        .filter(|t| !t.trim().is_empty())
        .filter(|t| contains_word(&lowered, &t.trim().to_lowercase()))
        .max_by_key(|t| t.trim().len())
        .map(|t| t.trim().to_string());
    QueryConstraint {
        years: extract_years(query),
        team_fragment: known.or_else(|| guess_team_fragment(query)),
    }
}

fn extract_years(query: &str) -> Vec<String> {
    YEAR_RE
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn guess_team_fragment(query: &str) -> Option<String> {
    for m in PROPER_NOUN_RE.find_iter(query) {
        let words: Vec<&str> = m
            .as_str()
            .split_whitespace()
            .skip_while(|w| QUESTION_WORDS.contains(w))
            .collect();
        if !words.is_empty() {
            return Some(words.join(" "));
        }
    }
    None
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

pub fn matches_constraint(candidate: &IndexMatch, constraint: &QueryConstraint) -> bool {
    let year_ok = constraint.years.is_empty()
        || candidate
            .year()
            .is_some_and(|y| constraint.years.iter().any(|c| *c == y.trim()));
    let team_ok = match &constraint.team_fragment {
        None => true,
        Some(fragment) => candidate
            .team()
            .is_some_and(|t| t.to_lowercase().contains(&fragment.to_lowercase())),
    };
    year_ok && team_ok
}

/// Keep candidates that satisfy the constraint, in their original order. If
/// none do, the original list comes back untouched.
pub fn apply_constraint(candidates: &[IndexMatch], constraint: &QueryConstraint) -> Filtered {
    let kept: Vec<IndexMatch> = candidates
        .iter()
        .filter(|c| matches_constraint(c, constraint))
        .cloned()
        .collect();
    if kept.is_empty() {
        debug!(
            candidates = candidates.len(),
            ?constraint,
            "no candidate matched constraint, using unfiltered list"
        );
        return Filtered {
            matches: candidates.to_vec(),
            fell_back: true,
        };
    }
    Filtered {
        matches: kept,
        fell_back: false,
    }
}

pub fn filter_candidates(candidates: &[IndexMatch], query: &str) -> Vec<IndexMatch> {
    apply_constraint(candidates, &extract_constraint(query)).matches
}

pub fn build_prompt(context_chunks: &[String], query: &str) -> String {
    format!(
        "{ANSWER_INSTRUCTION}\n\nCONTEXT:\n{}\n\nQuestion: {query}\n",
        context_chunks.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(team: &str, year: Value) -> IndexMatch {
        IndexMatch {
            id: format!("{team}_{year}"),
            score: 0.5,
            metadata: BTreeMap::from([
                ("team".to_string(), Value::from(team)),
                ("year".to_string(), year),
                ("summary".to_string(), Value::from(format!("{team} summary"))),
            ]),
        }
    }

    #[test]
    fn question_words_are_not_teams() {
        let c = extract_constraint("How did Purdue perform in 2023?");
        assert_eq!(c.years, vec!["2023"]);
        assert_eq!(c.team_fragment.as_deref(), Some("Purdue"));

        let c = extract_constraint("Did Alabama improve from 2022 to 2023?");
        assert_eq!(c.years, vec!["2022", "2023"]);
        assert_eq!(c.team_fragment.as_deref(), Some("Alabama"));
    }

    #[test]
    fn two_word_team_names_are_kept() {
        let c = extract_constraint("was North Carolina good in 2019");
        assert_eq!(c.team_fragment.as_deref(), Some("North Carolina"));
    }

    #[test]
    fn known_team_dictionary_wins_over_guess() {
        let teams = vec!["Kansas".to_string(), "Kansas St.".to_string()];
        let c = extract_constraint_with_teams("What seed did kansas st. have in 2021?", &teams);
        assert_eq!(c.team_fragment.as_deref(), Some("Kansas St."));
        let c = extract_constraint_with_teams("What seed did Arkansas have?", &teams);
        assert_eq!(c.team_fragment.as_deref(), Some("Arkansas"));
    }

    #[test]
    fn numeric_year_metadata_matches() {
        let c = QueryConstraint {
            years: vec!["2023".into()],
            team_fragment: Some("purdue".into()),
        };
        assert!(matches_constraint(&hit("Purdue", Value::from(2023)), &c));
        assert!(!matches_constraint(&hit("Purdue", Value::from("2022")), &c));
    }

    #[test]
    fn filter_candidates_keeps_order_and_falls_back() {
        let candidates = vec![
            hit("Purdue", Value::from("2023")),
            hit("Alabama", Value::from(2022)),
            hit("Purdue", Value::from(2021)),
            hit("Purdue Fort Wayne", Value::from(2022)),
        ];

        let kept = filter_candidates(&candidates, "Did Purdue improve from 2022 to 2023?");
        let labels: Vec<String> = kept.iter().map(IndexMatch::source_label).collect();
        assert_eq!(labels, vec!["Purdue (2023)", "Purdue Fort Wayne (2022)"]);

        let kept = filter_candidates(&candidates, "How did Gonzaga do in 2019?");
        assert_eq!(kept, candidates);
    }

    #[test]
    fn unsupported_topics_are_detected() {
        assert_eq!(unsupported_topic("Most Rebounds in 2021?"), Some("rebound"));
        assert_eq!(unsupported_topic("How did Duke do?"), None);
    }

    #[test]
    fn prompt_joins_chunks_with_newlines() {
        let prompt = build_prompt(&["a".to_string(), "b".to_string()], "q?");
        assert!(prompt.starts_with("You are a helpful NCAA basketball assistant."));
        assert!(prompt.contains("CONTEXT:\na\nb\n\nQuestion: q?"));
    }

    #[test]
    fn source_label_defaults_to_unknown() {
        let m = IndexMatch {
            id: String::new(),
            score: 0.0,
            metadata: BTreeMap::new(),
        };
        assert_eq!(m.source_label(), "Unknown (Unknown)");
    }
}
