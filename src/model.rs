use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Flag -> value mapping, kept in insertion order so submissions and
/// previews list flags the way the operator entered them.
pub type ParamMap = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Terminal statuses are absorbing for a run record.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One benchmark run as recorded by the executor.
///
/// The list endpoint returns a trimmed summary, so everything beyond the
/// identity and status is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    pub service_name: String,
    pub status: RunStatus,
    #[serde(default)]
    pub params: ParamMap,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub pp_avg_ts: Option<f64>,
    #[serde(default)]
    pub pp_stddev_ts: Option<f64>,
    #[serde(default)]
    pub tg_avg_ts: Option<f64>,
    #[serde(default)]
    pub tg_stddev_ts: Option<f64>,
    #[serde(default)]
    pub build_commit: Option<String>,
    #[serde(default)]
    pub gpu_info: Option<String>,
    #[serde(default)]
    pub cpu_info: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub model_size: Option<u64>,
    #[serde(default)]
    pub model_n_params: Option<u64>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub raw_output: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl RunRecord {
    /// A bare record with only identity, status, and params filled in.
    pub fn new(id: impl Into<String>, service_name: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            created_at: String::new(),
            service_name: service_name.into(),
            status,
            params: ParamMap::new(),
            model_path: None,
            pp_avg_ts: None,
            pp_stddev_ts: None,
            tg_avg_ts: None,
            tg_stddev_ts: None,
            build_commit: None,
            gpu_info: None,
            cpu_info: None,
            model_type: None,
            model_size: None,
            model_n_params: None,
            started_at: None,
            completed_at: None,
            raw_output: None,
            error_message: None,
        }
    }
}

/// Returned by the executor when a run is queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAck {
    pub id: String,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Returned by the config store after projecting a run onto a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyAck {
    pub message: String,
    #[serde(default)]
    pub applied_params: ParamMap,
    #[serde(default)]
    pub skipped_flags: Vec<String>,
}

/// Baseline parameters and model path of a configured service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefaults {
    pub service_name: String,
    #[serde(default)]
    pub model_path: String,
    #[serde(default)]
    pub params: ParamMap,
}

/// Reference data for one configurable flag of a service template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagMetadata {
    pub cli: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub tip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagCatalog {
    pub template_type: String,
    #[serde(default)]
    pub mandatory_fields: Vec<String>,
    #[serde(default)]
    pub optional_flags: IndexMap<String, FlagMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl RunOutcome {
    pub fn from_status(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Completed => Some(RunOutcome::Completed),
            RunStatus::Failed => Some(RunOutcome::Failed),
            RunStatus::Cancelled => Some(RunOutcome::Cancelled),
            RunStatus::Pending | RunStatus::Running => None,
        }
    }
}

/// Lifecycle state of the run controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Starting,
    Polling { run_id: String },
    Terminal(RunOutcome),
}

impl RunState {
    /// True while a run is being submitted or tracked.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Starting | RunState::Polling { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControllerEvent {
    StateChanged(RunState),
    /// Non-terminal poll result, drives the "still running" indicator.
    Progress {
        run_id: String,
        status: RunStatus,
        polls: u32,
    },
    Finished {
        // Boxed to keep the event small; RunRecord carries raw output.
        record: Box<RunRecord>,
        summary: Vec<String>,
    },
    HistoryRefreshed {
        count: usize,
    },
    Info(InfoEvent),
}

/// Structured info events consumed by presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Submitted { run_id: String },
    PollFailed { run_id: String, error: String },
    HistoryRefreshFailed { error: String },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Submitted { run_id } => format!("Benchmark queued: {run_id}"),
            InfoEvent::PollFailed { run_id, error } => {
                format!("Polling {run_id} failed, retrying: {error}")
            }
            InfoEvent::HistoryRefreshFailed { error } => {
                format!("History refresh failed: {error}")
            }
        }
    }
}
