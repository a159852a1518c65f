//! Collects the failures of one run into a single notification.
use std::collections::HashSet;

use super::service::{CheckResult, Service, Severity};
use crate::config::AlertIcons;
use crate::notifications::models::{Embed, EmbedImage, WebhookPayload};

pub const ALERT_COLOR: u32 = 16711680;

/// The failures of one run. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertBatch {
    /// Failing service names in evaluation order.
    pub failing: Vec<String>,
    /// Owner ids to mention, each at most once.
    pub mentions: Vec<String>,
    pub count: usize,
    pub worst: Severity,
}

impl AlertBatch {
    pub fn title(&self) -> String {
        format!("Services down: `{}`", self.count)
    }

    pub fn description(&self) -> String {
        self.failing.iter().map(|name| format!("{name}\n")).collect()
    }

    pub fn content(&self) -> String {
        self.mentions.iter().map(|id| format!("<@{id}> ")).collect()
    }

    pub fn to_payload(&self, icons: &AlertIcons) -> WebhookPayload {
        let icon = icons.for_severity(self.worst);
        WebhookPayload {
            content: self.content(),
            username: None,
            avatar_url: Some(icon.to_string()),
            embeds: vec![Embed {
                title: self.title(),
                description: self.description(),
                color: Some(ALERT_COLOR),
                thumbnail: Some(EmbedImage::icon(icon)),
                ..Default::default()
            }],
        }
    }
}

#[derive(Debug, Default)]
pub struct AlertAggregator {
    failing: Vec<String>,
    mentions: Vec<String>,
    mentioned: HashSet<String>,
    worst: Option<Severity>,
}

impl AlertAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for one evaluated service. Healthy results are ignored.
    pub fn push(&mut self, service: &Service, result: &CheckResult) {
        if result.status {
            return;
        }
        self.failing.push(service.name.clone());
        self.worst = self.worst.max(Some(service.severity));

        // Only error-level failures page the owner.
        if service.severity != Severity::Error {
            return;
        }
        if let Some(owner) = &service.owner_id {
            if self.mentioned.insert(owner.clone()) {
                self.mentions.push(owner.clone());
            }
        }
    }

    pub fn failed(&self) -> usize {
        self.failing.len()
    }

    /// Returns `None` when every service was healthy.
    pub fn finish(self) -> Option<AlertBatch> {
        let worst = self.worst?;
        Some(AlertBatch {
            count: self.failing.len(),
            failing: self.failing,
            mentions: self.mentions,
            worst,
        })
    }
}
