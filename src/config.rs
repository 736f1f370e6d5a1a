use std::env;
use std::path::PathBuf;

/// Runtime settings, read from the environment (after `.env.local` / `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub team_table: PathBuf,
    pub player_table: PathBuf,
    pub player_links: PathBuf,
    pub scouting_json: PathBuf,

    pub index_host: Option<String>,
    pub index_api_key: Option<String>,
    pub retrieval_top_k: usize,

    pub embed_url: String,
    pub embed_api_key: Option<String>,
    pub embed_model: String,

    pub llm_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,

    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = opt_env("SCOUT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let path_or = |key: &str, rel: &str| {
            opt_env(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(rel))
        };

        Self {
            team_table: path_or("SCOUT_TEAM_TABLE", "cleaned/cbb_cleaned.csv"),
            player_table: path_or("SCOUT_PLAYER_TABLE", "player_stats_merged.csv"),
            player_links: path_or("SCOUT_PLAYER_LINKS", "player_links.json"),
            scouting_json: path_or("SCOUT_SCOUTING_JSON", "json/team_scouting_data.json"),
            data_dir,

            index_host: opt_env("PINECONE_INDEX_HOST"),
            index_api_key: opt_env("PINECONE_API_KEY"),
            retrieval_top_k: env::var("RETRIEVAL_TOP_K")
                .ok()
                .and_then(|val| val.parse::<usize>().ok())
                .unwrap_or(20)
                .clamp(1, 100),

            embed_url: opt_env("EMBED_URL")
                .unwrap_or_else(|| "http://localhost:8080/v1/embeddings".to_string()),
            embed_api_key: opt_env("EMBED_API_KEY"),
            embed_model: opt_env("EMBED_MODEL").unwrap_or_else(|| "all-MiniLM-L6-v2".to_string()),

            llm_url: opt_env("LLM_URL").unwrap_or_else(|| {
                "https://api.groq.com/openai/v1/chat/completions".to_string()
            }),
            llm_api_key: opt_env("GROQ_API_KEY"),
            llm_model: opt_env("LLM_MODEL").unwrap_or_else(|| "llama3-8b-8192".to_string()),

            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(10)
                .max(1),
        }
    }
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|val| {
        if val.trim().is_empty() {
            None
        } else {
            Some(val)
        }
    })
}
