//! Sources of the monitored service list.
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use super::service::Service;
use crate::config::StaticServiceConfig;

const GET_SERVICES_QUERY: &str = "SELECT id, name, owner_discord_id, check_type, check_subject \
     FROM sla.services ORDER BY name";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Supplies the ordered list of services to check in one run.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn fetch_services(&self) -> Result<Vec<Service>, RegistryError>;
}

#[derive(sqlx::FromRow, Debug)]
struct ServiceRow {
    id: i64,
    name: String,
    owner_discord_id: Option<String>,
    check_type: String,
    check_subject: String,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service::new(
            row.id,
            row.name,
            &row.check_type,
            row.check_subject,
            row.owner_discord_id,
        )
    }
}

fn warn_on_unknown_kinds(services: &[Service]) {
    for service in services {
        if let Err(e) = &service.kind {
            warn!(service = %service.name, error = %e, "Service has an invalid check type.");
        }
    }
}

/// Reads services from the `sla.services` warehouse table.
pub struct WarehouseRegistry {
    pool: PgPool,
}

impl WarehouseRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceRegistry for WarehouseRegistry {
    async fn fetch_services(&self) -> Result<Vec<Service>, RegistryError> {
        let rows = sqlx::query_as::<_, ServiceRow>(GET_SERVICES_QUERY)
            .fetch_all(&self.pool)
            .await?;
        let services: Vec<Service> = rows.into_iter().map(Service::from).collect();
        info!(count = services.len(), "Fetched services from warehouse.");
        warn_on_unknown_kinds(&services);
        Ok(services)
    }
}

/// Fixed, in-process service mapping for the standalone variant.
#[derive(Debug, Clone)]
pub struct StaticRegistry {
    services: Vec<Service>,
}

impl StaticRegistry {
    pub fn new(services: Vec<Service>) -> Self {
        warn_on_unknown_kinds(&services);
        Self { services }
    }

    /// Ids are 1-based positions in the configured list.
    pub fn from_config(entries: &[StaticServiceConfig]) -> Self {
        let services = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                Service::new(
                    index as i64 + 1,
                    entry.name.clone(),
                    &entry.kind,
                    entry.target.clone(),
                    entry.owner_id.clone(),
                )
                .with_severity(entry.severity)
            })
            .collect();
        Self::new(services)
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn fetch_services(&self) -> Result<Vec<Service>, RegistryError> {
        Ok(self.services.clone())
    }
}
