use anyhow::{Context, Result};
use atlas_common::observability::{LogConfig, init_logging};
use atlas_config::AtlasConfigLoader;
use atlas_pipeline::ConvertRequest;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
mod wiring;

const DEFAULT_CONFIG_FILE: &str = "atlas.yaml";

#[derive(Parser)]
#[command(
    name = "atlas",
    about = "Collect volunteer listings and place them on a map",
    version
)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON). `atlas.yaml` is read if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl listing links for a free-text location.
    Search {
        location: String,

        /// Stop after this many links (1..=200).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Crawl, geocode and append the results to the archive.
    Convert {
        country: String,

        /// Stop after this many links (1..=200).
        #[arg(long)]
        limit: Option<usize>,

        /// Model for this run only.
        #[arg(long)]
        model: Option<String>,
    },
    /// Send a minimal prompt to the configured model.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => AtlasConfigLoader::new().with_file(path),
        None => AtlasConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };
    let cfg = loader.load().context("failed to load configuration")?;

    let log_path = init_logging(LogConfig::from(&cfg.logging))?;
    tracing::info!(log = %log_path.display(), "app.started");

    match cli.command {
        Commands::Search { location, limit } => {
            let crawler = wiring::build_crawler(&cfg);
            let result = crawler
                .search(&location, limit)
                .await
                .with_context(|| format!("search for {location:?} failed"))?;
            print_json(&result)
        }
        Commands::Convert {
            country,
            limit,
            model,
        } => {
            let orchestrator = wiring::build_orchestrator(&cfg)?;
            let response = orchestrator
                .convert(ConvertRequest {
                    country: country.clone(),
                    limit,
                    model,
                })
                .await
                .with_context(|| format!("convert for {country:?} failed"))?;
            print_json(&response)
        }
        Commands::Health => {
            let llm = wiring::build_llm(&cfg)?;
            let healthy = llm.health_check().await?;
            print_json(&serde_json::json!({
                "model": llm.model_name(),
                "healthy": healthy,
            }))?;
            if !healthy {
                anyhow::bail!("model {} did not respond", llm.model_name());
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
