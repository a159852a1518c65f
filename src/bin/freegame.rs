use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use pollwatch::freegame::{self, FreeGameState, announce_new, fetch_games};
use pollwatch::logging::init_logging;
use pollwatch::notifications::senders::webhook::WebhookSender;
use pollwatch::state::load_state;
use pollwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Announces temporarily free games once")]
struct Args {
    /// Path to the JSON state file (`lastrun`, `webhook`, `content`)
    #[arg(short, long, default_value = "freegame.json")]
    state: PathBuf,

    /// Storefront API base URL
    #[arg(long, default_value = freegame::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Directory for JSON log files; stdout only when omitted
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_dir.as_deref(), "freegame.log")?;
    info!(version = VERSION, "Starting free game run...");

    let mut state: FreeGameState = load_state(&args.state)?;
    let notifier = WebhookSender::new(&state.webhook, Duration::from_secs(10))?;

    let games = fetch_games(&args.endpoint).await?;
    let announced = announce_new(&games, &mut state, &args.state, &notifier, Utc::now())
        .await
        .inspect_err(|e| error!(error = %e, "Free game run failed."))?;

    info!(announced, "Free game run finished.");
    Ok(())
}
