use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use dimm_scout::config::Config;
use dimm_scout::domain::ClassifiedDimm;
use dimm_scout::logging;
use dimm_scout::pipeline::analyze_report;
use dimm_scout::pipeline::processing::parser::parse_decoder_output;
use dimm_scout::pipeline::processing::resolve::RuleDatabase;

const DEFAULT_DATABASE_PATH: &str = "die_database.json";

#[derive(Parser)]
#[command(name = "dimm_scout")]
#[command(about = "DIMM die identification from SPD decoder reports")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a decoder report and classify every module
    Analyze {
        /// Decoder output file (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Heuristic database (falls back to config.toml, then die_database.json)
        #[arg(long)]
        database: Option<PathBuf>,
        /// Emit JSON instead of a human summary
        #[arg(long)]
        json: bool,
    },
    /// Dump the raw parsed records as JSON
    Parse {
        /// Decoder output file (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Summarize the heuristic database
    Rules {
        /// Heuristic database (falls back to config.toml, then die_database.json)
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

fn read_report(input: &Option<PathBuf>) -> anyhow::Result<String> {
    match input {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn resolve_database_path(flag: &Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path.clone();
    }
    match Config::load() {
        Ok(config) => PathBuf::from(config.database.path),
        Err(_) => PathBuf::from(DEFAULT_DATABASE_PATH),
    }
}

fn load_database(path: &Path) -> anyhow::Result<RuleDatabase> {
    match RuleDatabase::load_from_path(path) {
        Ok(db) => {
            info!("loaded {} rule(s) from {}", db.len(), path.display());
            Ok(db)
        }
        Err(e) => {
            error!("failed to load rule database from {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

fn print_summary(records: &[ClassifiedDimm]) {
    println!("\n📊 Analyzed {} module(s):", records.len());
    for record in records {
        let dimm = &record.dimm;
        let slot = dimm.slot.as_deref().unwrap_or("?");
        let generation = dimm
            .generation
            .map(|g| g.as_str())
            .unwrap_or("unknown generation");
        let capacity = dimm
            .module_gb
            .as_ref()
            .map(|gb| format!("{}GB ", gb))
            .unwrap_or_default();
        let manufacturer = dimm.manufacturer.as_deref().unwrap_or("unknown vendor");
        let part = dimm.module_part_number.as_deref().unwrap_or("-");

        println!(
            "   {}: {} {}{} {} -> {}",
            slot, generation, capacity, manufacturer, part, record.classification.die_type
        );
        if let Some(notes) = &record.classification.notes {
            println!("      notes: {}", notes);
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            database,
            json,
        } => {
            let db_path = resolve_database_path(&database);
            let db = load_database(&db_path)?;
            let text = read_report(&input)?;

            let records = analyze_report(&text, &db);
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_summary(&records);
            }
        }
        Commands::Parse { input } => {
            let text = read_report(&input)?;
            let records = parse_decoder_output(&text);
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Rules { database } => {
            let db_path = resolve_database_path(&database);
            let db = load_database(&db_path)?;

            let priorities: Vec<i64> = db.rules().iter().map(|r| r.priority).collect();
            println!("📚 {} rule(s) in {}", db.len(), db_path.display());
            if let (Some(max), Some(min)) = (priorities.first(), priorities.last()) {
                println!("   priority range: {} down to {}", max, min);
            }
        }
    }
    Ok(())
}
