use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber shared by all binaries.
///
/// Stdout gets human-readable output. When `log_dir` is set, a JSON copy is
/// written to `<log_dir>/<file_name>` with daily rotation. The filter defaults
/// to `info` and can be overridden with `RUST_LOG`. Fails when the log
/// directory cannot be created or opened.
pub fn init_logging(log_dir: Option<&str>, file_name: &str) -> Result<(), InitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let file_layer = match log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_writer(file_appender(dir, file_name)?)
                .with_ansi(false) // No ANSI colors in file
                .json(),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
    Ok(())
}

fn file_appender(dir: &str, file_name: &str) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name)
        .build(dir)
}
