//! cinerank: personalized movie ranking from a pretrained NCF model.
//!
//! Main entry point: serves recommendations over HTTP, answers one-off
//! recommendation queries, and builds the id-mapping artifacts offline.

use anyhow::Context;
use cinerank_api::ApiServer;
use cinerank_core::config::AppConfig;
use cinerank_core::ids::{AppUserId, CatalogId};
use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "cinerank")]
#[command(about = "Personalized movie recommendations from a pretrained NCF model")]
#[command(version)]
struct Cli {
    /// TOML config file (optional; environment variables override it)
    #[arg(long, global = true, env = "CINERANK_CONFIG", default_value = "cinerank.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the model and serve the HTTP API (default)
    Serve(ServeArgs),
    /// Print recommendations for one user as JSON
    Recommend(RecommendArgs),
    /// Build user_map / item_map artifacts from the training CSVs
    BuildMappings(BuildMappingsArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Bind address (overrides config)
    #[arg(long, env = "CINERANK__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CINERANK__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Start the Prometheus exporter
    #[arg(long, default_value_t = false)]
    metrics: bool,
}

#[derive(Args, Debug)]
struct RecommendArgs {
    /// Application user id
    #[arg(long)]
    user: i64,

    /// Catalog ids the user has already rated
    #[arg(long, value_delimiter = ',')]
    rated: Vec<i64>,

    /// Number of recommendations (defaults to config)
    #[arg(long)]
    top_n: Option<usize>,
}

#[derive(Args, Debug)]
struct BuildMappingsArgs {
    /// Training ratings CSV (userId, movieId, ...)
    #[arg(long)]
    ratings: PathBuf,

    /// Links CSV (movieId, imdbId, tmdbId)
    #[arg(long)]
    links: PathBuf,

    #[arg(long, default_value = "user_map.json")]
    user_map_out: PathBuf,

    #[arg(long, default_value = "item_map.json")]
    item_map_out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cinerank=info,cinerank_ncf=info,cinerank_api=info,tower_http=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load_from(Some(cli.config.as_path())).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(config, args).await,
        Command::Recommend(args) => recommend_once(config, args),
        Command::BuildMappings(args) => build_mappings(args),
    }
}

async fn serve(mut config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    info!("cinerank starting up");

    // Apply CLI overrides
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.http_port {
        config.api.http_port = port;
    }
    if args.metrics {
        config.metrics.enabled = true;
    }

    info!(
        host = %config.api.host,
        http_port = config.api.http_port,
        model_path = %config.recommender.model_path,
        top_n = config.recommender.top_n,
        "Configuration loaded"
    );

    // Load the recommender once; it is shared read-only by every request.
    let recommender = Arc::new(cinerank_ncf::load(&config.recommender));
    if !recommender.is_enabled() {
        tracing::warn!("Recommender failed to load, personalized recommendations are unavailable");
    }

    let api_server = ApiServer::new(config.clone(), recommender);

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics().await {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("cinerank is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}

fn recommend_once(config: AppConfig, args: RecommendArgs) -> anyhow::Result<()> {
    let recommender = cinerank_ncf::load(&config.recommender);
    let rated: HashSet<CatalogId> = args.rated.into_iter().map(CatalogId).collect();
    let top_n = args.top_n.unwrap_or(config.recommender.top_n);

    let recommendations = recommender.recommend(AppUserId(args.user), &rated, top_n);
    println!("{}", serde_json::to_string_pretty(&recommendations)?);
    Ok(())
}

fn build_mappings(args: BuildMappingsArgs) -> anyhow::Result<()> {
    let artifacts = cinerank_ncf::build_mappings(&args.ratings, &args.links).with_context(|| {
        format!(
            "building mappings from {} and {}",
            args.ratings.display(),
            args.links.display()
        )
    })?;
    artifacts
        .write(&args.user_map_out, &args.item_map_out)
        .context("writing mapping artifacts")?;
    Ok(())
}
