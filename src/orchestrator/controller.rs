//! Run lifecycle controller.
//!
//! Submits a snapshot of the parameter editor to the executor and polls the
//! resulting run until it reaches a terminal status. At most one run is
//! tracked at a time.
//!
//! Every poll response is fenced twice before it may touch controller state:
//! the session's liveness flag must still be set, and the run id must still
//! be the one the controller is tracking. Aborting the poll task alone is not
//! enough, since an abort can race a response that has already arrived.

use super::history::RunHistory;
use super::lock;
use crate::api::RunExecutor;
use crate::error::{ClientError, StartError};
use crate::model::{
    ControllerEvent, InfoEvent, RunOutcome, RunRecord, RunState, RunStatus,
};
use crate::params::ParameterRowSet;
use crate::text_summary::build_run_summary;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
/// Shorter intervals are raised to this; a zero period would stall the poll task.
pub(crate) const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error text used when the optional poll ceiling is reached.
pub(crate) const POLL_TIMEOUT_MESSAGE: &str = "timed out waiting for run";

#[derive(Debug, Clone)]
pub(crate) struct ControllerSettings {
    pub poll_interval: Duration,
    /// Give up after this many polls without a terminal status. `None` polls
    /// until the executor reports one.
    pub max_polls: Option<u32>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
        }
    }
}

struct Shared {
    state: RunState,
    /// Bumped by every `start` and `stop`; a submit that returns under a
    /// different epoch is not tracked.
    epoch: u64,
    active_run: Option<String>,
    session: Option<PollSession>,
    last_status: Option<RunStatus>,
}

struct PollSession {
    alive: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PollSession {
    fn cancel(self) {
        self.alive.store(false, Ordering::SeqCst);
        self.handle.abort();
    }
}

pub(crate) struct RunController {
    service_name: String,
    settings: ControllerSettings,
    executor: Arc<dyn RunExecutor>,
    history: RunHistory,
    shared: Arc<Mutex<Shared>>,
    event_tx: UnboundedSender<ControllerEvent>,
}

impl RunController {
    pub fn new(
        settings: ControllerSettings,
        executor: Arc<dyn RunExecutor>,
        history: RunHistory,
        event_tx: UnboundedSender<ControllerEvent>,
    ) -> Self {
        Self {
            service_name: history.service_name().to_string(),
            settings,
            executor,
            history,
            shared: Arc::new(Mutex::new(Shared {
                state: RunState::Idle,
                epoch: 0,
                active_run: None,
                session: None,
                last_status: None,
            })),
            event_tx,
        }
    }

    pub fn state(&self) -> RunState {
        lock(&self.shared).state.clone()
    }

    pub fn active_run_id(&self) -> Option<String> {
        lock(&self.shared).active_run.clone()
    }

    /// Status from the most recent poll, for a "still running" indicator.
    pub fn running_indicator(&self) -> Option<RunStatus> {
        lock(&self.shared).last_status
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Submit the editor's current parameters and begin polling.
    ///
    /// Fails with `StartError::AlreadyRunning`, without submitting, while a
    /// run is starting or being polled.
    pub async fn start(&self, rows: &ParameterRowSet) -> Result<String, StartError> {
        let params = rows.to_map();
        let epoch = {
            let mut shared = lock(&self.shared);
            if shared.state.is_active() {
                return Err(StartError::AlreadyRunning);
            }
            // Only a concluded session can remain here, and all it has left is
            // its history refresh. Detach it so the refresh completes.
            drop(shared.session.take());
            shared.epoch += 1;
            shared.state = RunState::Starting;
            shared.last_status = None;
            shared.epoch
        };
        self.emit(ControllerEvent::StateChanged(RunState::Starting));
        info!(service = %self.service_name, params = params.len(), "submitting benchmark");

        let submitted = self.executor.submit_run(&self.service_name, &params).await;

        let mut shared = lock(&self.shared);
        if shared.epoch != epoch {
            if let Ok(ack) = &submitted {
                warn!(run_id = %ack.id, "run accepted after the controller was stopped; not tracking it");
            }
            return Err(StartError::Superseded);
        }

        let ack = match submitted {
            Ok(ack) => ack,
            Err(e) => {
                shared.state = RunState::Idle;
                drop(shared);
                warn!(service = %self.service_name, error = %e, "benchmark submit failed");
                self.emit(ControllerEvent::StateChanged(RunState::Idle));
                return Err(StartError::Submit(e));
            }
        };

        let run_id = ack.id;
        let alive = Arc::new(AtomicBool::new(true));
        let task = PollTask {
            run_id: run_id.clone(),
            service_name: self.service_name.clone(),
            settings: self.settings.clone(),
            alive: alive.clone(),
            executor: self.executor.clone(),
            history: self.history.clone(),
            shared: self.shared.clone(),
            event_tx: self.event_tx.clone(),
        };
        shared.active_run = Some(run_id.clone());
        shared.state = RunState::Polling {
            run_id: run_id.clone(),
        };
        shared.session = Some(PollSession {
            alive,
            handle: tokio::spawn(poll_loop(task)),
        });
        drop(shared);

        info!(%run_id, "benchmark queued, polling");
        self.emit(ControllerEvent::Info(InfoEvent::Submitted {
            run_id: run_id.clone(),
        }));
        self.emit(ControllerEvent::StateChanged(RunState::Polling {
            run_id: run_id.clone(),
        }));
        Ok(run_id)
    }

    /// Cancel polling and return to `Idle`. Safe to call at any time, any
    /// number of times.
    pub fn stop(&self) {
        let changed = {
            let mut shared = lock(&self.shared);
            shared.epoch += 1;
            if let Some(session) = shared.session.take() {
                session.cancel();
            }
            shared.active_run = None;
            shared.last_status = None;
            if shared.state == RunState::Idle {
                false
            } else {
                shared.state = RunState::Idle;
                true
            }
        };
        if changed {
            info!(service = %self.service_name, "run controller stopped");
            self.emit(ControllerEvent::StateChanged(RunState::Idle));
        }
    }

    /// Load a past run's parameters into the editor. Does not start a run.
    /// Returns `false` when the run is not in the loaded history window.
    pub fn rerun_from_history(&self, run_id: &str, rows: &mut ParameterRowSet) -> bool {
        match self.history.find(run_id) {
            Some(run) => {
                rows.load_from(run.params);
                true
            }
            None => {
                debug!(%run_id, "rerun requested for a run outside the loaded history");
                false
            }
        }
    }

    pub async fn refresh_history(&self) -> Result<usize, ClientError> {
        let count = self.history.refresh().await?;
        self.emit(ControllerEvent::HistoryRefreshed { count });
        Ok(count)
    }

    fn emit(&self, ev: ControllerEvent) {
        let _ = self.event_tx.send(ev);
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.shared).session.take() {
            session.cancel();
        }
    }
}

/// Everything the background poll loop needs, owned so it can be spawned.
struct PollTask {
    run_id: String,
    service_name: String,
    settings: ControllerSettings,
    alive: Arc<AtomicBool>,
    executor: Arc<dyn RunExecutor>,
    history: RunHistory,
    shared: Arc<Mutex<Shared>>,
    event_tx: UnboundedSender<ControllerEvent>,
}

#[derive(Debug, PartialEq)]
enum PollStep {
    Continue,
    Discarded,
    Finished,
}

async fn poll_loop(task: PollTask) {
    let period = task.settings.poll_interval.max(MIN_POLL_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    // Each fetch completes before the next tick is due.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls = 0u32;

    loop {
        ticker.tick().await;
        if !task.alive.load(Ordering::SeqCst) {
            break;
        }
        polls += 1;
        let fetched = task.executor.get_run(&task.run_id).await;
        match task.apply(fetched, polls) {
            PollStep::Continue => {}
            PollStep::Discarded => break,
            PollStep::Finished => {
                task.refresh_history().await;
                break;
            }
        }
    }
}

impl PollTask {
    fn emit(&self, ev: ControllerEvent) {
        let _ = self.event_tx.send(ev);
    }

    /// Apply one poll response to controller state, if it is still ours.
    fn apply(&self, fetched: Result<RunRecord, ClientError>, polls: u32) -> PollStep {
        let mut shared = lock(&self.shared);
        if !self.alive.load(Ordering::SeqCst)
            || shared.active_run.as_deref() != Some(self.run_id.as_str())
        {
            debug!(run_id = %self.run_id, "discarding stale poll response");
            return PollStep::Discarded;
        }

        match fetched {
            Ok(record) => match RunOutcome::from_status(record.status) {
                Some(outcome) => self.conclude(&mut shared, record, outcome),
                None => {
                    shared.last_status = Some(record.status);
                    self.emit(ControllerEvent::Progress {
                        run_id: self.run_id.clone(),
                        status: record.status,
                        polls,
                    });
                    self.check_ceiling(&mut shared, polls)
                }
            },
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "poll failed, retrying on next tick");
                self.emit(ControllerEvent::Info(InfoEvent::PollFailed {
                    run_id: self.run_id.clone(),
                    error: e.to_string(),
                }));
                self.check_ceiling(&mut shared, polls)
            }
        }
    }

    fn check_ceiling(&self, shared: &mut Shared, polls: u32) -> PollStep {
        match self.settings.max_polls {
            Some(max) if polls >= max => {
                warn!(run_id = %self.run_id, polls, "poll ceiling reached");
                let mut record = RunRecord::new(
                    self.run_id.clone(),
                    self.service_name.clone(),
                    RunStatus::Failed,
                );
                record.error_message = Some(POLL_TIMEOUT_MESSAGE.to_string());
                self.conclude(shared, record, RunOutcome::Failed)
            }
            _ => PollStep::Continue,
        }
    }

    fn conclude(&self, shared: &mut Shared, record: RunRecord, outcome: RunOutcome) -> PollStep {
        let summary = build_run_summary(&record).lines;
        shared.active_run = None;
        shared.last_status = Some(record.status);
        shared.state = RunState::Terminal(outcome);

        info!(run_id = %self.run_id, status = %record.status, "benchmark finished");
        self.emit(ControllerEvent::StateChanged(RunState::Terminal(outcome)));
        self.emit(ControllerEvent::Finished {
            record: Box::new(record),
            summary,
        });
        PollStep::Finished
    }

    async fn refresh_history(&self) {
        match self.history.refresh_guarded(&self.alive).await {
            Ok(Some(count)) => self.emit(ControllerEvent::HistoryRefreshed { count }),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "history refresh after run failed");
                self.emit(ControllerEvent::Info(InfoEvent::HistoryRefreshFailed {
                    error: e.to_string(),
                }));
            }
        }
    }
}
