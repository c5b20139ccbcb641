use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use qin_bot::config::{default_data_dir, file};
use qin_bot::db::{self, HistoryQuery, HistoryStore};
use qin_bot::{Config, Daemon, music};

/// Qin - Discord music bot
#[derive(Parser)]
#[command(name = "qin", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (database)
    #[arg(long, env = "QIN_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List a user's favorite tracks
    Favorites {
        /// User ID (Discord user ID)
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,qin_bot=info,serenity=warn",
        1 => "info,qin_bot=debug,serenity=warn",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Favorites { user }) = cli.command {
        return favorites(cli.data_dir, &user);
    }

    tracing::info!("starting qin");

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    tracing::debug!(?config, "loaded configuration");

    let daemon = Daemon::new(config)?;
    daemon.run().await?;

    Ok(())
}

/// Print a user's favorites
fn favorites(data_dir: Option<PathBuf>, user: &str) -> anyhow::Result<()> {
    let data_dir = data_dir
        .or_else(|| file::load_config_file().bot.data_dir)
        .unwrap_or_else(default_data_dir);
    let db_path = data_dir.join("qin.db");
    if !db_path.exists() {
        anyhow::bail!("no database at {}", db_path.display());
    }

    let history = HistoryStore::new(db::init(&db_path)?, music::NAME)?;
    let records = history.find(&HistoryQuery::favorites_of(user))?;

    if records.is_empty() {
        println!("No favorites for user {user}");
        return Ok(());
    }

    println!("Favorites for user {user}:");
    for record in records {
        let when = record
            .favorited_at
            .unwrap_or(record.created_at)
            .format("%Y-%m-%d %H:%M");
        println!(
            "  [{when}] {} <{}>",
            record.title.as_deref().unwrap_or("(untitled)"),
            record.url
        );
    }

    Ok(())
}
