use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use hoops_scout::assistant::{Assistant, PlayerLookup};
use hoops_scout::comparison::{AVERAGED_STATS, Side, Verdict};
use hoops_scout::config::AppConfig;
use hoops_scout::error::ScoutError;
use hoops_scout::recruiting::DEFAULT_MATCHES;
use hoops_scout::team_dataset::SCOUTING_METRICS;

const STAT_COLUMNS: [&str; 11] = [
    "Class", "School", "G", "MP", "PTS", "TRB", "AST", "FG%", "3P%", "FT%", "STL",
];

#[derive(Parser)]
#[command(name = "hoops_scout")]
#[command(about = "NCAA basketball scouting: team Q&A, player lookup, comparisons and recruiting matches")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a team-level question answered from retrieved season summaries
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
        /// Print the retrieved context chunks
        #[arg(long)]
        show_context: bool,
    },
    /// Look up a player's profile and per-game stats
    Lookup {
        name: String,
        /// Which locator match to fetch (1-based)
        #[arg(long, default_value_t = 1)]
        pick: usize,
    },
    /// Compare two players on the weighted game impact score
    Compare { first: String, second: String },
    /// List seasons, or the teams of one season
    Seasons {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Side-by-side scouting metrics for two teams in one season
    Scout {
        #[arg(long)]
        year: i32,
        first: String,
        second: String,
        /// Divide each metric by its maximum across the table
        #[arg(long)]
        normalize: bool,
    },
    /// Weakness profile and game-plan suggestions for one opponent
    Weakness {
        #[arg(long)]
        year: i32,
        team: String,
    },
    /// Players most similar to one player (label or unique fragment of it)
    Similar {
        player: String,
        #[arg(short, long, default_value_t = DEFAULT_MATCHES)]
        k: usize,
    },
}

fn main() -> ExitCode {
    hoops_scout::init_runtime();
    let cli = Cli::parse();

    let assistant = match Assistant::from_config(AppConfig::from_env()) {
        Ok(a) => a,
        Err(err) => {
            error!(error = %err, "startup failed");
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&assistant, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_warning() => {
            eprintln!("warning: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(assistant: &Assistant, command: Command) -> Result<(), ScoutError> {
    match command {
        Command::Ask {
            question,
            show_context,
        } => {
            let answer = assistant.ask(&question.join(" "))?;
            println!("Answer:\n{}\n", answer.answer.trim());
            if answer.fell_back && !answer.constraint.is_empty() {
                println!(
                    "(no summary matched {:?}; used every retrieved chunk)\n",
                    answer.constraint
                );
            }
            if show_context {
                println!("Retrieved context:");
                for (i, chunk) in answer.chunks.iter().enumerate() {
                    println!("  [{}] {chunk}", i + 1);
                }
                println!();
            }
            println!("Sources:");
            for source in &answer.sources {
                println!("  {source}");
            }
        }
        Command::Lookup { name, pick } => {
            let found = assistant.find_players(&name)?;
            if found.len() > 1 {
                println!("{} matches:", found.len());
                for (i, loc) in found.iter().enumerate() {
                    println!("  {}. {loc}", i + 1);
                }
            }
            let locator = found.get(pick.saturating_sub(1)).ok_or_else(|| {
                ScoutError::InvalidSelection(format!("pick must be between 1 and {}", found.len()))
            })?;
            print_lookup(&assistant.fetch_player(locator)?);
        }
        Command::Compare { first, second } => {
            let result = assistant.compare_players(&first, &second)?;
            let (n1, n2) = (&result.first.profile.name, &result.second.profile.name);
            println!("{:<6} {:>12} {:>12}", "", truncate(n1, 12), truncate(n2, 12));
            for stat in AVERAGED_STATS {
                println!(
                    "{:<6} {:>12} {:>12}",
                    stat,
                    show(result.first_avg.get(stat).copied()),
                    show(result.second_avg.get(stat).copied())
                );
            }
            let cmp = &result.comparison;
            println!(
                "\nGame impact score: {n1} {:.2}, {n2} {:.2}",
                cmp.first.scalar_score, cmp.second.scalar_score
            );
            match cmp.verdict {
                Verdict::Tie => println!("Dead even on weighted performance metrics."),
                _ => println!(
                    "{} is the better pick based on weighted performance metrics.",
                    cmp.winner_id().unwrap_or_default()
                ),
            }
            if !cmp.reasons.is_empty() {
                println!("\nWhy:");
            }
            for delta in &cmp.reasons {
                let leader = match delta.leader {
                    Side::First => n1,
                    Side::Second => n2,
                };
                println!("  {leader} leads in {}: {} vs {}", delta.stat, delta.v1, delta.v2);
            }
        }
        Command::Seasons { year } => {
            let table = assistant.team_table()?;
            match year {
                None => {
                    for y in table.years() {
                        println!("{y}");
                    }
                }
                Some(y) => {
                    for team in table.teams_in(y) {
                        println!("{team}");
                    }
                }
            }
        }
        Command::Scout {
            year,
            first,
            second,
            normalize,
        } => {
            let cmp = assistant.team_scouting(year, &[first, second], normalize)?;
            print!("{:<8}", "");
            for row in &cmp.rows {
                print!(" {:>16}", truncate(&row.team, 16));
            }
            println!();
            for (i, (key, desc)) in SCOUTING_METRICS.iter().enumerate() {
                print!("{key:<8}");
                for row in &cmp.rows {
                    let v = row.values.get(i).copied().flatten();
                    let cell = match (v, cmp.normalized) {
                        (Some(v), true) => format!("{v:.3}"),
                        (v, _) => show(v),
                    };
                    print!(" {cell:>16}");
                }
                println!("  {desc}");
            }
        }
        Command::Weakness { year, team } => {
            let profile = assistant.opponent_weakness(&team, year)?;
            println!("Weakness profile: {} ({})", profile.team, profile.year);
            for w in &profile.weaknesses {
                println!("  {:<6} {:>7.1}  {}", w.metric, w.value, w.comment);
            }
            if profile.suggestions.is_empty() {
                println!("\nNo clear weakness to exploit.");
            } else {
                println!("\nGame plan:");
                for s in &profile.suggestions {
                    println!("  - {s}");
                }
            }
        }
        Command::Similar { player, k } => {
            let similar = assistant.similar_players(&player, k)?;
            let t = &similar.target;
            println!("Target: {} | {} ({})\n", t.summary, t.school, t.year);
            for (i, m) in similar.matches.iter().enumerate() {
                println!(
                    "  {}. {:.3}  {} | {} ({})",
                    i + 1,
                    m.score,
                    m.player.summary,
                    m.player.school,
                    m.player.year
                );
            }
        }
    }
    Ok(())
}

fn print_lookup(lookup: &PlayerLookup) {
    let p = &lookup.profile;
    println!("Player:   {}", p.name);
    println!("Position: {}", p.position);
    println!("Height:   {}", p.height);
    println!("Weight:   {}", p.weight);
    println!("School:   {}", p.school);
    if !p.hometown.is_empty() {
        println!("Hometown: {}", p.hometown);
    }
    if p.stats.is_empty() {
        println!("\nNo per-game stats found.");
        return;
    }

    let columns: Vec<&str> = STAT_COLUMNS
        .into_iter()
        .filter(|c| p.stats.iter().any(|row| row.contains_key(*c)))
        .collect();
    print!("\n{:>6}", "season");
    for c in &columns {
        print!(" {c:>8}");
    }
    println!();
    for (row, season) in p.stats.iter().zip(&lookup.seasons) {
        print!("{:>6}", show(*season));
        for c in &columns {
            print!(" {:>8}", truncate(row.get(*c).map(String::as_str).unwrap_or(""), 8));
        }
        println!();
    }
    println!("\nseason: 1 = FR, 2 = SO, 3 = JR, 4 = SR, 5 = GR");
}

fn show(v: Option<f64>) -> String {
    v.map(|v| format!("{v}")).unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}
