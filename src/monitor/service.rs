//! Data model of one health-check run.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The protocol used to probe a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Tcp,
    Ping,
    Http,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckKind::Tcp => "tcp",
            CheckKind::Ping => "ping",
            CheckKind::Http => "http",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unrecognized check kind: {0}")]
pub struct UnknownCheckKind(pub String);

impl FromStr for CheckKind {
    type Err = UnknownCheckKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "mc" => Ok(CheckKind::Tcp),
            "ping" | "icmp" => Ok(CheckKind::Ping),
            "http" | "https" | "web" => Ok(CheckKind::Http),
            _ => Err(UnknownCheckKind(s.to_string())),
        }
    }
}

/// How loud a failure of this service should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
}

/// A monitored service, immutable for the duration of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub id: i64,
    pub name: String,
    /// Parsed when the service is loaded. An unknown kind is kept so the run
    /// still records a (failed) result for it.
    pub kind: Result<CheckKind, UnknownCheckKind>,
    pub target: String,
    pub owner_id: Option<String>,
    pub severity: Severity,
}

impl Service {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        kind: &str,
        target: impl Into<String>,
        owner_id: Option<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind: kind.parse(),
            target: target.into(),
            owner_id,
            severity: Severity::Error,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Verdict of one check. Created once per service per run and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub service_id: i64,
    pub status: bool,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn now(service_id: i64, status: bool) -> Self {
        Self {
            service_id,
            status,
            timestamp: Utc::now(),
        }
    }
}
