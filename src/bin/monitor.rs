use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::error::Error;
use std::time::Duration;
use tracing::{error, info};

use pollwatch::config::{MonitorConfig, RegistryKind};
use pollwatch::logging::init_logging;
use pollwatch::monitor::recorder::{LogRecorder, ResultRecorder, WarehouseRecorder};
use pollwatch::monitor::registry::{ServiceRegistry, StaticRegistry, WarehouseRegistry};
use pollwatch::monitor::{CheckDispatcher, run_checks};
use pollwatch::notifications::senders::webhook::WebhookSender;
use pollwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Checks service reachability and posts an alert for failures")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "monitor.toml")]
    config: String,

    /// Directory for JSON log files; stdout only when omitted
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_dir.as_deref(), "monitor.log")?;
    info!(version = VERSION, "Starting monitor run...");

    let config = match MonitorConfig::load(Some(&args.config)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Critical error loading configuration. Exiting.");
            return Err(e.into());
        }
    };

    let (registry, recorder): (Box<dyn ServiceRegistry>, Box<dyn ResultRecorder>) =
        match config.registry {
            RegistryKind::Warehouse => {
                let database_url = config.database_url.as_deref().unwrap_or_default();
                let pool = PgPoolOptions::new()
                    .max_connections(2)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(database_url)
                    .await?;
                (
                    Box::new(WarehouseRegistry::new(pool.clone())),
                    Box::new(WarehouseRecorder::new(pool)),
                )
            }
            RegistryKind::Static => (
                Box::new(StaticRegistry::from_config(&config.services)),
                Box::new(LogRecorder),
            ),
        };

    let dispatcher = CheckDispatcher::from_config(&config)?;
    let notifier = WebhookSender::new(
        &config.webhook_url,
        Duration::from_secs(config.notify_timeout_secs),
    )?;

    let summary = run_checks(
        registry.as_ref(),
        &dispatcher,
        recorder.as_ref(),
        &notifier,
        &config.icons,
    )
    .await
    .inspect_err(|e| error!(error = %e, "Monitor run failed."))?;

    info!(
        checked = summary.checked,
        failed = summary.failed,
        notified = summary.notified,
        "Monitor run finished."
    );
    std::process::exit(summary.exit_code());
}
