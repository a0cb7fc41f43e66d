mod app;

use std::{
    fs::{self, OpenOptions},
    sync::Mutex,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gamedice_core::{
    config::{self, AppConfig},
    Library, ScanContext,
};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Pick a random installed game and track how long you play it.
#[derive(Debug, Parser)]
#[command(name = "gamedice", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List installed games.
    List(FilterArgs),
    /// Launch a random game and track the session.
    Pick {
        #[command(flatten)]
        filter: FilterArgs,
        /// Weight picks by playtime.
        #[arg(long)]
        weighted: bool,
        /// Reuse the favourite, tag and weighting choices of the last pick.
        #[arg(long, conflicts_with_all = ["favorites", "tags", "all_tags"])]
        last: bool,
        /// Launch without tracking playtime.
        #[arg(long)]
        no_track: bool,
        /// Seed for reproducible picks.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Mark a game as favourite (`platform:id`).
    Favorite {
        key: String,
        /// Remove the mark instead.
        #[arg(long)]
        off: bool,
    },
    /// Exclude a game from random picks.
    Exclude { key: String },
    /// Include a previously excluded game.
    Include { key: String },
    /// Replace a game's tags; no tags clears them.
    Tags { key: String, tags: Vec<String> },
    /// Show launch history.
    History {
        /// Show aggregate statistics.
        #[arg(long)]
        stats: bool,
        /// Delete all history.
        #[arg(long)]
        clear: bool,
        /// Number of entries to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Steam web API features.
    #[command(subcommand)]
    Steam(SteamCommand),
}

#[derive(Debug, Subcommand)]
enum SteamCommand {
    /// Store the web API key.
    SetKey { key: String },
    /// Store the SteamID64 used for playtime.
    SetId { steam_id64: String },
    /// Show the locally signed-in SteamID64.
    DetectId,
    /// Fetch owned-games playtime.
    Playtime,
    /// Import store genres and tags for installed Steam games.
    ImportTags,
}

/// Pool constraints shared by `list` and `pick`.
#[derive(Debug, Clone, Default, Args)]
struct FilterArgs {
    /// Only favourites.
    #[arg(long)]
    favorites: bool,
    /// Name substring.
    #[arg(long, default_value = "")]
    search: String,
    /// Required tag; repeat or separate with commas.
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Require every tag instead of any.
    #[arg(long)]
    all_tags: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    config::ensure_default_config()?;
    let settings = AppConfig::load()?;
    let library = Library::open(settings, ScanContext::system())?;

    app::run(library, cli.command).await
}

fn init_logging() -> Result<()> {
    let log_dir = config::data_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let log_path = log_dir.join("gamedice.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::from_default_env();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
