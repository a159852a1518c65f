use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use pollwatch::cve::{self, CveFeed, CveState, poll};
use pollwatch::logging::init_logging;
use pollwatch::notifications::senders::webhook::WebhookSender;
use pollwatch::state::{load_state, save_state};
use pollwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Posts recently modified CVE advisories")]
struct Args {
    /// Path to the JSON state file (`last`, `webhook`)
    #[arg(short, long, default_value = "cve.json")]
    state: PathBuf,

    /// Advisory feed base URL
    #[arg(long, default_value = cve::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Directory for JSON log files; stdout only when omitted
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_dir.as_deref(), "cve.log")?;
    info!(version = VERSION, "Starting CVE run...");

    let mut state: CveState = load_state(&args.state)?;
    let notifier =
        WebhookSender::new(&state.webhook, Duration::from_secs(10))?.wait_for_delivery();
    let feed = CveFeed::new(&args.endpoint)?;

    let summary = poll(&mut state, &feed, &notifier, Utc::now())
        .await
        .inspect_err(|e| error!(error = %e, "CVE run failed."))?;
    save_state(&args.state, &state)?;

    info!(
        fetched = summary.fetched,
        posted = summary.posted,
        skipped = summary.skipped,
        malformed = summary.malformed,
        failed = summary.failed,
        "CVE run finished."
    );
    Ok(())
}
