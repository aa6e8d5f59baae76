//! Scripted in-memory collaborators for tests.

use super::{ConfigStore, HistoryStore, RunExecutor};
use crate::error::ClientError;
use crate::model::{ApplyAck, ParamMap, RunRecord, RunStatus, SubmitAck};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub(crate) const SERVICE: &str = "llama-qwen";

#[derive(Default)]
pub(crate) struct FakeDashboard {
    pub submits: Mutex<Vec<(String, ParamMap)>>,
    pub submit_errors: Mutex<VecDeque<ClientError>>,
    /// Successive `get_run` answers; once drained, the run reports `running`.
    pub polls: Mutex<VecDeque<Result<RunRecord, ClientError>>>,
    pub get_calls: AtomicU32,
    /// When set, `submit_run` waits for a permit before answering.
    pub submit_gate: Option<Arc<Notify>>,
    /// When set, `get_run` signals `poll_entered` and waits for a permit.
    pub poll_gate: Option<Arc<Notify>>,
    pub poll_entered: Arc<Notify>,
    pub history: Mutex<Vec<RunRecord>>,
    /// When set, `list_runs` signals `list_entered` and waits for a permit.
    pub list_gate: Option<Arc<Notify>>,
    pub list_entered: Arc<Notify>,
    pub list_calls: AtomicU32,
    pub deleted: Mutex<Vec<String>>,
    pub applied: Mutex<Vec<(String, ParamMap)>>,
}

impl FakeDashboard {
    pub fn with_polls(polls: Vec<Result<RunRecord, ClientError>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            ..Default::default()
        }
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }
}

pub(crate) fn record(id: &str, status: RunStatus) -> RunRecord {
    RunRecord::new(id, SERVICE, status)
}

pub(crate) fn record_with_params(id: &str, params: &[(&str, &str)]) -> RunRecord {
    let mut r = record(id, RunStatus::Completed);
    r.params = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    r
}

#[async_trait]
impl RunExecutor for FakeDashboard {
    async fn submit_run(
        &self,
        service_name: &str,
        params: &ParamMap,
    ) -> Result<SubmitAck, ClientError> {
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
        if let Some(err) = self.submit_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut submits = self.submits.lock().unwrap();
        submits.push((service_name.to_string(), params.clone()));
        let id = format!("run-{}", submits.len());
        let mut history = self.history.lock().unwrap();
        let mut rec = record(&id, RunStatus::Pending);
        rec.params = params.clone();
        history.insert(0, rec);
        Ok(SubmitAck {
            id,
            status: Some(RunStatus::Pending),
            message: Some("Benchmark queued".into()),
        })
    }

    async fn get_run(&self, id: &str) -> Result<RunRecord, ClientError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.poll_gate {
            self.poll_entered.notify_one();
            gate.notified().await;
        }
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(Ok(mut rec)) => {
                rec.id = id.to_string();
                Ok(rec)
            }
            Some(Err(e)) => Err(e),
            None => Ok(record(id, RunStatus::Running)),
        }
    }
}

#[async_trait]
impl HistoryStore for FakeDashboard {
    async fn list_runs(
        &self,
        _service_name: &str,
        status: Option<RunStatus>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.list_gate {
            self.list_entered.notify_one();
            gate.notified().await;
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_run(&self, id: &str) -> Result<(), ClientError> {
        let mut history = self.history.lock().unwrap();
        let before = history.len();
        history.retain(|r| r.id != id);
        if history.len() == before {
            return Err(ClientError::NotFound(format!("Benchmark run {id} not found")));
        }
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FakeDashboard {
    async fn apply_run(
        &self,
        run: &RunRecord,
        applicable: &ParamMap,
    ) -> Result<ApplyAck, ClientError> {
        self.applied
            .lock()
            .unwrap()
            .push((run.service_name.clone(), applicable.clone()));
        Ok(ApplyAck {
            message: format!(
                "Configuration applied to {}. Restart the service for changes to take effect.",
                run.service_name
            ),
            applied_params: applicable.clone(),
            skipped_flags: Vec::new(),
        })
    }
}
