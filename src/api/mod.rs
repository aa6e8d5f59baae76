//! Collaborators the benchmark core talks to.
//!
//! The orchestrator only sees these traits; `DashboardClient` implements all
//! of them over the dashboard's HTTP API.

mod dashboard;
#[cfg(test)]
pub(crate) mod fake;

pub(crate) use dashboard::DashboardClient;

use crate::error::ClientError;
use crate::model::{
    ApplyAck, FlagCatalog, ParamMap, RunRecord, RunStatus, ServiceDefaults, SubmitAck,
};
use async_trait::async_trait;

/// Queues benchmark runs and reports their progress.
#[async_trait]
pub(crate) trait RunExecutor: Send + Sync {
    async fn submit_run(
        &self,
        service_name: &str,
        params: &ParamMap,
    ) -> Result<SubmitAck, ClientError>;

    async fn get_run(&self, id: &str) -> Result<RunRecord, ClientError>;
}

/// Past runs, newest first.
#[async_trait]
pub(crate) trait HistoryStore: Send + Sync {
    async fn list_runs(
        &self,
        service_name: &str,
        status: Option<RunStatus>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, ClientError>;

    /// Deletes a finished run; an active run is cancelled instead.
    async fn delete_run(&self, id: &str) -> Result<(), ClientError>;
}

/// Persisted service configuration.
#[async_trait]
pub(crate) trait ConfigStore: Send + Sync {
    async fn apply_run(&self, run: &RunRecord, applicable: &ParamMap)
        -> Result<ApplyAck, ClientError>;
}

/// Read-only reference data about services and their flags.
#[async_trait]
pub(crate) trait ServiceCatalog: Send + Sync {
    async fn service_defaults(&self, service_name: &str) -> Result<ServiceDefaults, ClientError>;

    async fn flag_metadata(&self, template_type: &str) -> Result<FlagCatalog, ClientError>;
}
