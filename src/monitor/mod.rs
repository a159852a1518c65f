//! Service health-check engine.
pub mod alert;
pub mod checks;
pub mod recorder;
pub mod registry;
pub mod runner;
pub mod service;

pub use checks::{CheckDispatcher, CheckError, NetworkProber, Prober};
pub use runner::{MonitorError, RunSummary, run_checks};
pub use service::{CheckKind, CheckResult, Service, Severity};
