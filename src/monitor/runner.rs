//! One health-check run: registry, checks, recording, alerting.
use std::time::Instant;
use thiserror::Error;
use tracing::info;

use super::alert::AlertAggregator;
use super::checks::{CheckDispatcher, Prober};
use super::recorder::{RecorderError, ResultRecorder};
use super::registry::{RegistryError, ServiceRegistry};
use super::service::CheckResult;
use crate::config::AlertIcons;
use crate::notifications::senders::{Notifier, SenderError};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to load services: {0}")]
    Registry(#[from] RegistryError),
    #[error("Failed to record result: {0}")]
    Recorder(#[from] RecorderError),
    #[error("Failed to deliver alert: {0}")]
    Notifier(#[from] SenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub checked: usize,
    pub failed: usize,
    pub notified: bool,
}

impl RunSummary {
    /// Process exit code: the number of failing services, saturated to 255.
    pub fn exit_code(&self) -> i32 {
        self.failed.min(255) as i32
    }
}

/// Checks every service in registry order, records each verdict before the
/// next check starts and sends at most one alert once all checks are done.
///
/// Check failures never abort the run; registry, recorder and notifier
/// failures do.
pub async fn run_checks<P: Prober>(
    registry: &dyn ServiceRegistry,
    dispatcher: &CheckDispatcher<P>,
    recorder: &dyn ResultRecorder,
    notifier: &dyn Notifier,
    icons: &AlertIcons,
) -> Result<RunSummary, MonitorError> {
    let services = registry.fetch_services().await?;
    let mut aggregator = AlertAggregator::new();

    for service in &services {
        info!(service = %service.name, "Running check.");
        let start_time = Instant::now();

        let status = dispatcher.check(service).await;
        let result = CheckResult::now(service.id, status);
        recorder.record(&result).await?;
        aggregator.push(service, &result);

        info!(
            service = %service.name,
            status,
            failing = aggregator.failed(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Finished check."
        );
    }

    let checked = services.len();
    let Some(batch) = aggregator.finish() else {
        info!(checked, "All services healthy.");
        return Ok(RunSummary {
            checked,
            failed: 0,
            notified: false,
        });
    };

    info!(checked, failed = batch.count, "Sending down alert.");
    notifier.notify(&batch.to_payload(icons)).await?;

    Ok(RunSummary {
        checked,
        failed: batch.count,
        notified: true,
    })
}
