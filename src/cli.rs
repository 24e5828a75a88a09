use anyhow::Result;
use clap::{Parser, Subcommand};
use model_registry::config::{DATA_DIR_ENV, RegistryConfig};
use model_registry::insights::InsightsSnapshot;
use model_registry::service::ModelService;
use model_registry::store::ModelRecord;
use model_registry::utils::fmt_opt;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "model-registry", about = "Versioned metadata registry for ML models")]
pub struct Cli {
    /// Storage root; falls back to $MODEL_REGISTRY_DATA_DIR, $DATA_DIR, then ./data
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a model from a JSON file as version 1
    Create {
        /// Path to a .json submission
        file: PathBuf,
    },
    /// Register every .json file in a directory
    Ingest { dir: PathBuf },
    /// Show a model (latest version unless --version is given)
    Get {
        id: String,

        #[arg(short, long)]
        version: Option<u32>,
    },
    /// Show every stored version of a model
    History { id: String },
    /// Store a JSON file as the next version of a model
    Update { id: String, file: PathBuf },
    /// List models
    List {
        /// Include superseded versions
        #[arg(long)]
        all: bool,
    },
    /// Delete a model and all its versions
    Delete { id: String },
    /// Counts by algorithm, function, language, type and tool
    Summary,
    /// Dashboard statistics over the latest versions
    Insights {
        /// Print as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Also write exports/insights.json
        #[arg(long)]
        export: bool,
    },
    /// Regenerate the master exports
    Rebuild,
}

pub fn run_command(command: Commands, config: RegistryConfig) -> Result<()> {
    let service = ModelService::open(config)?;

    match command {
        Commands::Create { file } => {
            let record = service.create_from_file(&file)?;
            print_json(&record)
        }
        Commands::Ingest { dir } => {
            let report = service.ingest_dir(&dir)?;
            println!("Created {} model(s).", report.created.len());
            for skipped in &report.skipped {
                println!("Skipped {}: {}", skipped.file, skipped.reason);
            }
            Ok(())
        }
        Commands::Get { id, version } => print_json(&service.read(&id, version)?),
        Commands::History { id } => print_json(&service.history(&id)?),
        Commands::Update { id, file } => print_json(&service.update_from_file(&id, &file)?),
        Commands::List { all } => {
            let records = service.list(!all)?;
            print_table(&records);
            Ok(())
        }
        Commands::Delete { id } => {
            let removed = service.delete(&id)?;
            println!("Deleted {id} ({removed} version(s)).");
            Ok(())
        }
        Commands::Summary => print_json(&service.summary()?),
        Commands::Insights { json, export } => {
            let snapshot = if export {
                service.export_insights()?
            } else {
                service.insights()?
            };
            if json {
                print_json(&snapshot)
            } else {
                print_insights(&snapshot);
                Ok(())
            }
        }
        Commands::Rebuild => {
            let report = service.rebuild()?;
            println!(
                "Rebuilt exports: {} row(s) in master_all, {} in master_latest.",
                report.all_rows, report.latest_rows
            );
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_table(records: &[ModelRecord]) {
    println!("{:<38} {:>7}  {:<24} {:<20}", "ID", "VERSION", "NAME", "ALGORITHM");
    for r in records {
        println!(
            "{:<38} {:>7}  {:<24} {:<20}",
            r.id,
            r.version,
            r.name.as_deref().unwrap_or("-"),
            r.algorithm.as_deref().unwrap_or("-"),
        );
    }
}

fn print_insights(s: &InsightsSnapshot) {
    println!("Models:               {}", s.total_count);
    println!(
        "Most used algorithm:  {}",
        s.most_used_algorithm.as_deref().unwrap_or("-")
    );
    println!("Missing fields / row: {}", fmt_opt(Some(s.missing_field_rate)));

    if !s.count_by_type.is_empty() {
        println!("\nBy type:");
        for (model_type, count) in &s.count_by_type {
            println!("  {model_type:<24} {count}");
        }
    }
    if !s.top_languages.is_empty() {
        println!("\nTop languages:");
        for lang in &s.top_languages {
            println!("  {:<24} {}", lang.language, lang.count);
        }
    }
    if !s.available_metrics.is_empty() {
        println!("\nMetrics:");
        for metric in &s.available_metrics {
            let avg = s.metric_averages.get(metric).copied();
            println!("  {metric:<24} {}", fmt_opt(avg));
        }
    }
}
