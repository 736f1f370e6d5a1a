pub mod assistant;
pub mod cache;
pub mod comparison;
pub mod config;
pub mod error;
pub mod http_client;
pub mod locator;
pub mod model;
pub mod normalize;
pub mod player_page;
pub mod recruiting;
pub mod retrieval;
pub mod services;
pub mod similarity;
pub mod table;
pub mod team_dataset;

use tracing_subscriber::{EnvFilter, fmt};

/// Load `.env.local` then `.env` and install the log subscriber
/// (`RUST_LOG`, default `info`) on stderr.
pub fn init_runtime() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
