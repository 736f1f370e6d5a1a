use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::DatasetCache;
use crate::comparison::{
    AVERAGED_STATS, Comparison, DELTA_THRESHOLD, StatLine, average_stats, compare, weights,
};
use crate::config::AppConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::http_client::http_client;
use crate::locator::LocatorIndex;
use crate::model::QueryConstraint;
use crate::player_page::{HttpPlayerSource, PlayerProfile, PlayerSource, synthetic_seasons};
use crate::recruiting::{MAX_MATCHES, MIN_MATCHES, PlayerPool, SimilarPlayers};
use crate::retrieval::{
    apply_constraint, build_prompt, extract_constraint_with_teams, unsupported_topic,
};
use crate::services::{
    ChatCompletionGenerator, Embedder, HttpEmbedder, HttpVectorIndex, TextGenerator, VectorIndex,
};
use crate::team_dataset::{TeamComparison, TeamTable, WeaknessProfile};

#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub answer: String,
    pub chunks: Vec<String>,
    pub sources: Vec<String>,
    pub constraint: QueryConstraint,
    /// Nothing matched the constraint, so every retrieved chunk was used.
    pub fell_back: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerLookup {
    pub locator: String,
    pub profile: PlayerProfile,
    /// Season index per stats row, aligned with `profile.stats`.
    pub seasons: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerComparison {
    pub first: PlayerLookup,
    pub second: PlayerLookup,
    pub first_avg: StatLine,
    pub second_avg: StatLine,
    pub comparison: Comparison,
}

/// Feature entry points. Every collaborator failure is turned into a
/// `ScoutError` here; nothing below this layer talks to the user.
pub struct Assistant {
    config: AppConfig,
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    generator: Box<dyn TextGenerator>,
    players: Box<dyn PlayerSource>,
    teams: DatasetCache<TeamTable>,
    pool: DatasetCache<PlayerPool>,
    locators: DatasetCache<LocatorIndex>,
}

impl Assistant {
    pub fn new(
        config: AppConfig,
        embedder: Box<dyn Embedder>,
        index: Box<dyn VectorIndex>,
        generator: Box<dyn TextGenerator>,
        players: Box<dyn PlayerSource>,
    ) -> Self {
        Self {
            config,
            embedder,
            index,
            generator,
            players,
            teams: DatasetCache::new(),
            pool: DatasetCache::new(),
            locators: DatasetCache::new(),
        }
    }

    /// Wire the HTTP collaborators described by the config.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let client = http_client(config.http_timeout_secs)?;
        let embedder = HttpEmbedder::new(
            client,
            config.embed_url.clone(),
            config.embed_api_key.clone(),
            config.embed_model.clone(),
        );
        let index = HttpVectorIndex::new(
            client,
            config.index_host.clone().unwrap_or_default(),
            config.index_api_key.clone(),
        );
        let generator = ChatCompletionGenerator::new(
            client,
            config.llm_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        );
        Ok(Self::new(
            config,
            Box::new(embedder),
            Box::new(index),
            Box::new(generator),
            Box::new(HttpPlayerSource::new(client)),
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ask(&self, query: &str) -> ScoutResult<ChatAnswer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScoutError::InvalidSelection("ask a question".to_string()));
        }
        if let Some(topic) = unsupported_topic(query) {
            warn!(topic, "rejected player-level question");
            return Err(ScoutError::UnsupportedQuery(format!(
                "'{topic}' is not covered; this assistant only supports team-level stats like \
efficiency, seed, and round. Try: \"How did Purdue perform in 2023?\""
            )));
        }

        let vector = self
            .embedder
            .embed(query)
            .map_err(|err| ScoutError::external("embedding", err))?;
        let candidates = self
            .index
            .query(&vector, self.config.retrieval_top_k)
            .map_err(|err| ScoutError::external("vector index", err))?;

        let known = self.known_teams();
        let constraint = extract_constraint_with_teams(query, &known);
        let filtered = apply_constraint(&candidates, &constraint);

        let chunks: Vec<String> = filtered.matches.iter().map(|m| m.summary()).collect();
        let sources = filtered.matches.iter().map(|m| m.source_label()).collect();
        let prompt = build_prompt(&chunks, query);
        let answer = self
            .generator
            .generate(&prompt)
            .map_err(|err| ScoutError::external("text generation", err))?;

        info!(
            candidates = candidates.len(),
            used = chunks.len(),
            fell_back = filtered.fell_back,
            "answered question"
        );
        Ok(ChatAnswer {
            answer,
            chunks,
            sources,
            constraint,
            fell_back: filtered.fell_back,
        })
    }

    // Team names sharpen the constraint but are optional.
    fn known_teams(&self) -> Vec<String> {
        match self.team_table() {
            Ok(table) => table.team_names(),
            Err(err) => {
                debug!(error = %err, "team table unavailable, guessing team from query text");
                Vec::new()
            }
        }
    }

    pub fn team_table(&self) -> ScoutResult<Arc<TeamTable>> {
        self.teams.get_or_load(&self.config.team_table, TeamTable::load)
    }

    pub fn player_pool(&self) -> ScoutResult<Arc<PlayerPool>> {
        self.pool.get_or_load(&self.config.player_table, PlayerPool::load)
    }

    fn locator_index(&self) -> ScoutResult<Arc<LocatorIndex>> {
        self.locators.get_or_load(&self.config.player_links, |path| {
            LocatorIndex::load(path).map_err(ScoutError::data)
        })
    }

    /// Locators whose slug contains the name.
    pub fn find_players(&self, name: &str) -> ScoutResult<Vec<String>> {
        let index = self.locator_index()?;
        let found: Vec<String> = index.find(name).into_iter().map(str::to_string).collect();
        if found.is_empty() {
            return Err(ScoutError::EntityNotFound(name.trim().to_string()));
        }
        Ok(found)
    }

    pub fn fetch_player(&self, locator: &str) -> ScoutResult<PlayerLookup> {
        fetch_lookup(self.players.as_ref(), locator)
    }

    /// First locator match for the name, fetched and given season indices.
    pub fn lookup_player(&self, name: &str) -> ScoutResult<PlayerLookup> {
        let found = self.find_players(name)?;
        if found.len() > 1 {
            debug!(name, matches = found.len(), "several locators matched, using the first");
        }
        self.fetch_player(&found[0])
    }

    pub fn compare_players(&self, name1: &str, name2: &str) -> ScoutResult<PlayerComparison> {
        let loc1 = self.first_locator(name1)?;
        let loc2 = self.first_locator(name2)?;

        let source = self.players.as_ref();
        let (first, second) = rayon::join(
            || fetch_lookup(source, &loc1),
            || fetch_lookup(source, &loc2),
        );
        let (first, second) = (first?, second?);

        let first_avg = average_stats(&first.profile.stats, &AVERAGED_STATS);
        let second_avg = average_stats(&second.profile.stats, &AVERAGED_STATS);
        let comparison = compare(
            (first.profile.name.as_str(), &first_avg),
            (second.profile.name.as_str(), &second_avg),
            &weights(),
            DELTA_THRESHOLD,
        );
        info!(
            first = %first.profile.name,
            second = %second.profile.name,
            verdict = ?comparison.verdict,
            "compared players"
        );
        Ok(PlayerComparison {
            first,
            second,
            first_avg,
            second_avg,
            comparison,
        })
    }

    fn first_locator(&self, name: &str) -> ScoutResult<String> {
        let index = self.locator_index()?;
        index
            .first_match(name)
            .map(str::to_string)
            .ok_or_else(|| ScoutError::EntityNotFound(name.trim().to_string()))
    }

    pub fn team_scouting(
        &self,
        year: i32,
        teams: &[String],
        normalize: bool,
    ) -> ScoutResult<TeamComparison> {
        self.team_table()?.compare_teams(year, teams, normalize)
    }

    pub fn opponent_weakness(&self, team: &str, year: i32) -> ScoutResult<WeaknessProfile> {
        self.team_table()?.weakness(team, year)
    }

    /// Neighbours of one player. `query` is an exact label or a fragment that
    /// identifies exactly one label.
    pub fn similar_players(&self, query: &str, k: usize) -> ScoutResult<SimilarPlayers> {
        let pool = self.player_pool()?;
        let k = k.clamp(MIN_MATCHES, MAX_MATCHES);
        if pool.position(query).is_some() {
            return pool.similar(query, k);
        }
        let hits = pool.search(query);
        match hits.as_slice() {
            [] => Err(ScoutError::EntityNotFound(query.to_string())),
            [only] => pool.similar(only, k),
            many => Err(ScoutError::InvalidSelection(format!(
                "{} players match '{query}', be more specific: {}",
                many.len(),
                many.iter().take(5).copied().collect::<Vec<_>>().join("; ")
            ))),
        }
    }
}

fn fetch_lookup(source: &dyn PlayerSource, locator: &str) -> ScoutResult<PlayerLookup> {
    let profile = source
        .fetch_player(locator)
        .map_err(|err| ScoutError::external("player source", err))?
        .ok_or_else(|| ScoutError::EntityNotFound(locator.to_string()))?;
    if profile.stats.is_empty() {
        warn!(locator, "player page has no per-game stats");
    }
    let seasons = synthetic_seasons(&profile.stats);
    Ok(PlayerLookup {
        locator: locator.to_string(),
        profile,
        seasons,
    })
}
