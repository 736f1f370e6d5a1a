use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use hoops_scout::config::AppConfig;
use hoops_scout::table::Table;
use hoops_scout::team_dataset::{scouting_summaries, write_scouting_json};

/// Convert team tables into the JSON summaries the Q&A index is built from.
#[derive(Parser)]
#[command(name = "scouting_json")]
struct Args {
    /// Input CSV tables (default: cleaned ratings and tournament tables under the data dir)
    inputs: Vec<PathBuf>,
    /// Output path (default: SCOUT_SCOUTING_JSON)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    /// Number of sample records to print
    #[arg(long, default_value_t = 5)]
    sample: usize,
}

fn main() -> Result<()> {
    hoops_scout::init_runtime();
    let args = Args::parse();
    let config = AppConfig::from_env();

    let inputs = if args.inputs.is_empty() {
        vec![
            config.team_table.clone(),
            config.data_dir.join("cleaned/dev_march_madness_cleaned.csv"),
        ]
    } else {
        args.inputs
    };
    let output = args.output.unwrap_or(config.scouting_json);

    let mut all = Vec::new();
    for path in &inputs {
        let table = Table::load_csv(path)?;
        let Some(records) = scouting_summaries(&table) else {
            warn!(
                path = %path.display(),
                columns = ?table.headers,
                "unrecognized table shape, skipping"
            );
            continue;
        };
        info!(path = %path.display(), rows = records.len(), "converted table");
        all.extend(records);
    }
    if all.is_empty() {
        return Err(anyhow!("no scouting rows found in {} input(s)", inputs.len()));
    }

    write_scouting_json(&output, &all)?;

    println!("Sample records:");
    for r in all.iter().take(args.sample) {
        println!("{}", serde_json::to_string_pretty(r)?);
    }
    println!(
        "Saved {} team scouting records to {} at {}",
        all.len(),
        output.display(),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
