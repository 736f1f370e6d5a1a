use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::json;

use hoops_scout::assistant::Assistant;
use hoops_scout::comparison::{Side, Verdict};
use hoops_scout::config::AppConfig;
use hoops_scout::error::ScoutError;
use hoops_scout::player_page::{PlayerProfile, PlayerSource, parse_player_page};
use hoops_scout::retrieval::IndexMatch;
use hoops_scout::services::{Embedder, TextGenerator, VectorIndex};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture file should be readable")
}

fn test_config() -> AppConfig {
    AppConfig {
        data_dir: fixture_path(""),
        team_table: fixture_path("cbb_cleaned.csv"),
        player_table: fixture_path("player_stats_merged.csv"),
        player_links: fixture_path("player_links.json"),
        scouting_json: fixture_path("unused.json"),
        index_host: None,
        index_api_key: None,
        retrieval_top_k: 20,
        embed_url: String::new(),
        embed_api_key: None,
        embed_model: String::new(),
        llm_url: String::new(),
        llm_api_key: None,
        llm_model: String::new(),
        http_timeout_secs: 1,
    }
}

struct CountingEmbedder(Arc<AtomicUsize>);

impl Embedder for CountingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.1, 0.2, 0.3])
    }
}

struct FixedIndex {
    matches: Vec<IndexMatch>,
    fail: bool,
}

impl VectorIndex for FixedIndex {
    fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }
}

struct RecordingGenerator(Arc<Mutex<Vec<String>>>);

impl TextGenerator for RecordingGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.0.lock().expect("prompt log").push(prompt.to_string());
        Ok("Purdue earned a 1 seed and lost in the first round.".to_string())
    }
}

struct FixturePlayers(HashMap<&'static str, &'static str>);

impl PlayerSource for FixturePlayers {
    fn fetch_player(&self, locator: &str) -> Result<Option<PlayerProfile>> {
        let Some(file) = self.0.iter().find(|(k, _)| locator.contains(*k)).map(|(_, v)| *v) else {
            return Ok(None);
        };
        Ok(Some(parse_player_page(&read_fixture(file))))
    }
}

fn hit(id: &str, team: &str, year: serde_json::Value, summary: &str) -> IndexMatch {
    serde_json::from_value(json!({
        "id": id,
        "score": 0.8,
        "metadata": { "team": team, "year": year, "summary": summary }
    }))
    .expect("valid match")
}

fn season_hits() -> Vec<IndexMatch> {
    vec![
        hit(
            "a",
            "Alabama",
            json!("2023"),
            "Alabama (2023) from SEC reached round S16 with seed 1.",
        ),
        hit(
            "p22",
            "Purdue",
            json!(2022),
            "Purdue (2022) from B10 reached round S16 with seed 3.",
        ),
        hit(
            "p23",
            "Purdue",
            json!("2023"),
            "Purdue (2023) from B10 reached round R64 with seed 1.",
        ),
    ]
}

struct Harness {
    assistant: Assistant,
    embeds: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

fn harness_with(config: AppConfig, fail_index: bool) -> Harness {
    let embeds = Arc::new(AtomicUsize::new(0));
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let players = FixturePlayers(HashMap::from([
        ("luka-garza", "luka_garza.html"),
        ("caitlin-clark", "caitlin_clark.html"),
    ]));
    let assistant = Assistant::new(
        config,
        Box::new(CountingEmbedder(embeds.clone())),
        Box::new(FixedIndex {
            matches: season_hits(),
            fail: fail_index,
        }),
        Box::new(RecordingGenerator(prompts.clone())),
        Box::new(players),
    );
    Harness {
        assistant,
        embeds,
        prompts,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), false)
}

#[test]
fn question_is_answered_from_the_named_team_season() {
    let h = harness();
    let answer = h.assistant.ask("How did Purdue perform in 2023?").expect("answer");

    assert_eq!(answer.constraint.years, vec!["2023"]);
    assert_eq!(answer.constraint.team_fragment.as_deref(), Some("Purdue"));
    assert!(!answer.fell_back);
    assert_eq!(answer.chunks, vec!["Purdue (2023) from B10 reached round R64 with seed 1."]);
    assert_eq!(answer.sources, vec!["Purdue (2023)"]);

    let prompts = h.prompts.lock().expect("prompt log");
    let prompt = &prompts[0];
    assert!(prompt.contains("CONTEXT:\nPurdue (2023) from B10"));
    assert!(prompt.ends_with("Question: How did Purdue perform in 2023?\n"));
    assert!(!prompt.contains("Alabama"));
}

#[test]
fn unmatched_constraint_keeps_every_retrieved_chunk() {
    let h = harness();
    let answer = h.assistant.ask("How did Gonzaga do in 2019?").expect("answer");
    assert!(answer.fell_back);
    assert_eq!(answer.chunks.len(), 3);
    assert_eq!(answer.sources, vec!["Alabama (2023)", "Purdue (2022)", "Purdue (2023)"]);
}

#[test]
fn multi_word_team_comes_from_the_team_table() {
    let h = harness();
    let answer = h
        .assistant
        .ask("Was North Carolina better defensively in 2022?")
        .expect("answer");
    assert_eq!(answer.constraint.team_fragment.as_deref(), Some("North Carolina"));
    // no North Carolina summary was retrieved
    assert!(answer.fell_back);
}

#[test]
fn player_level_topics_are_rejected_before_retrieval() {
    let h = harness();
    let err = h
        .assistant
        .ask("Who had the most rebounds in 2023?")
        .unwrap_err();
    assert!(matches!(err, ScoutError::UnsupportedQuery(_)));
    assert!(err.is_warning());
    assert_eq!(h.embeds.load(Ordering::SeqCst), 0);
    assert!(h.prompts.lock().expect("prompt log").is_empty());
}

#[test]
fn index_failure_is_reported_as_external_service() {
    let h = harness_with(test_config(), true);
    let err = h.assistant.ask("How did Purdue perform in 2023?").unwrap_err();
    assert!(matches!(err, ScoutError::ExternalService { service: "vector index", .. }));
    assert!(!err.is_warning());
}

#[test]
fn missing_team_table_only_affects_team_features() {
    let mut config = test_config();
    config.team_table = fixture_path("no_such_table.csv");
    let h = harness_with(config, false);

    let answer = h.assistant.ask("How did Purdue perform in 2023?").expect("answer");
    assert_eq!(answer.sources, vec!["Purdue (2023)"]);

    let err = h
        .assistant
        .team_scouting(2023, &["Purdue".into(), "Illinois".into()], false)
        .unwrap_err();
    assert!(matches!(err, ScoutError::DataUnavailable(_)));
}

#[test]
fn lookup_fetches_profile_and_season_index() {
    let h = harness();
    let lookup = h.assistant.lookup_player("luka garza").expect("player");
    assert!(lookup.locator.ends_with("luka-garza-1.html"));
    assert_eq!(lookup.profile.name, "Luka Garza");
    assert_eq!(lookup.profile.school, "Iowa");
    assert_eq!(lookup.profile.stats.len(), 4);
    assert_eq!(lookup.seasons, vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
    assert_eq!(lookup.profile.career_totals.get("PTS").map(String::as_str), Some("18.3"));
}

#[test]
fn ambiguous_and_unknown_names() {
    let h = harness();
    assert_eq!(h.assistant.find_players("Jalen Johnson").expect("two").len(), 2);
    let err = h.assistant.lookup_player("Zion Williamson").unwrap_err();
    assert!(matches!(err, ScoutError::EntityNotFound(_)));
    assert!(err.is_warning());
}

#[test]
fn comparison_picks_higher_game_impact() {
    let h = harness();
    let result = h
        .assistant
        .compare_players("Luka Garza", "Caitlin Clark")
        .expect("both players");

    assert_eq!(result.first_avg.get("PTS"), Some(&18.3));
    assert_eq!(result.second_avg.get("PTS"), Some(&26.6));
    assert_eq!(result.second_avg.get("BLK"), Some(&0.6));

    let cmp = &result.comparison;
    assert_eq!(cmp.verdict, Verdict::Second);
    assert_eq!(cmp.winner_id(), Some("Caitlin Clark"));
    assert!(cmp.second.scalar_score > cmp.first.scalar_score);

    let stats: Vec<&str> = cmp.reasons.iter().map(|d| d.stat.as_str()).collect();
    assert_eq!(stats, vec!["PTS", "AST", "STL", "BLK", "MP"]);
    let blk = cmp.reasons.iter().find(|d| d.stat == "BLK").expect("BLK gap");
    assert_eq!(blk.leader, Side::First);
}

#[test]
fn comparison_needs_both_players_in_the_locator_list() {
    let h = harness();
    let err = h
        .assistant
        .compare_players("Luka Garza", "Nobody Real")
        .unwrap_err();
    assert!(matches!(err, ScoutError::EntityNotFound(ref n) if n == "Nobody Real"));
}

#[test]
fn team_features_read_the_cached_table() {
    let h = harness();
    let cmp = h
        .assistant
        .team_scouting(2023, &["Purdue".into(), "Alabama".into()], false)
        .expect("two teams");
    assert_eq!(cmp.rows[0].team, "Purdue");
    assert_eq!(cmp.rows[1].values[0], Some(116.2));

    let weak = h.assistant.opponent_weakness("Alabama", 2023).expect("row");
    assert_eq!(weak.suggestions.len(), 1);
    assert!(weak.suggestions[0].starts_with("Press or trap"));

    let again = h.assistant.team_table().expect("cached");
    assert!(Arc::ptr_eq(&again, &h.assistant.team_table().expect("cached")));
}

#[test]
fn similar_players_from_fragment() {
    let h = harness();
    let similar = h.assistant.similar_players("Duke", 1).expect("unique fragment");
    assert_eq!(similar.target.school, "Duke");
    // k is clamped to at least three neighbours
    assert_eq!(similar.matches.len(), 3);
    assert_eq!(similar.matches[0].player.school, "North Carolina");
    assert!(similar.matches.windows(2).all(|w| w[0].score >= w[1].score));

    let err = h.assistant.similar_players("Ast", 5).unwrap_err();
    assert!(matches!(err, ScoutError::InvalidSelection(_)));
}
