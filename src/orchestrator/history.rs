//! Shared run history with refresh-after-mutation.
//!
//! The history window is only replaced by `refresh*` calls, which the
//! controller and apply projector await after terminal transitions,
//! deletions, and applies.

use super::lock;
use crate::api::HistoryStore;
use crate::error::ClientError;
use crate::model::RunRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct RunHistory {
    store: Arc<dyn HistoryStore>,
    service_name: String,
    limit: usize,
    runs: Arc<Mutex<Vec<RunRecord>>>,
}

impl RunHistory {
    pub fn new(store: Arc<dyn HistoryStore>, service_name: impl Into<String>, limit: usize) -> Self {
        Self {
            store,
            service_name: service_name.into(),
            limit,
            runs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Reload the window from the store. Returns the number of runs loaded.
    pub async fn refresh(&self) -> Result<usize, ClientError> {
        let runs = self
            .store
            .list_runs(&self.service_name, None, self.limit)
            .await?;
        Ok(self.replace(runs))
    }

    /// Like `refresh`, but drops the result if `alive` was cleared while the
    /// request was in flight. Returns `None` when dropped.
    pub async fn refresh_guarded(&self, alive: &AtomicBool) -> Result<Option<usize>, ClientError> {
        let runs = self
            .store
            .list_runs(&self.service_name, None, self.limit)
            .await?;
        if !alive.load(Ordering::SeqCst) {
            tracing::debug!("discarding history refresh after teardown");
            return Ok(None);
        }
        Ok(Some(self.replace(runs)))
    }

    fn replace(&self, runs: Vec<RunRecord>) -> usize {
        let count = runs.len();
        *lock(&self.runs) = runs;
        count
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<RunRecord> {
        lock(&self.runs).clone()
    }

    pub fn latest(&self) -> Option<RunRecord> {
        lock(&self.runs).first().cloned()
    }

    /// Look a run up in the currently loaded window only.
    pub fn find(&self, run_id: &str) -> Option<RunRecord> {
        lock(&self.runs).iter().find(|r| r.id == run_id).cloned()
    }
}
