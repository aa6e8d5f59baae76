//! Dashboard connection and polling settings.
//!
//! Layers, lowest first: built-in defaults, `config.json` in the user config
//! directory, environment (after `.env` is loaded), command-line flags.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::{ControllerSettings, MIN_POLL_INTERVAL};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3305";
pub const DEFAULT_TEMPLATE: &str = "llamacpp";
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
/// The dashboard rejects list requests above this.
pub const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub service: Option<String>,
    pub template_type: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub history_limit: usize,
    pub max_polls: Option<u32>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            service: None,
            template_type: DEFAULT_TEMPLATE.to_string(),
            poll_interval: ControllerSettings::default().poll_interval,
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_polls: None,
        }
    }
}

/// Values supplied on the command line; `None` leaves the lower layer in place.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub service: Option<String>,
    pub poll_interval: Option<Duration>,
    pub history_limit: Option<usize>,
    pub max_polls: Option<u32>,
}

impl DashboardConfig {
    /// Default location of the optional config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("llm-dock-bench").join("config.json"))
    }

    /// Resolve every layer into one config.
    pub fn load(file: Option<PathBuf>, overrides: &Overrides) -> Result<Self> {
        let path = file.or_else(Self::default_path);
        let mut cfg = match path {
            Some(p) if p.exists() => Self::from_file(&p)?,
            _ => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.apply_overrides(overrides);
        cfg.history_limit = cfg.history_limit.clamp(1, MAX_HISTORY_LIMIT);
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval < MIN_POLL_INTERVAL {
            bail!(
                "poll_interval must be at least {}, got {}",
                humantime::format_duration(MIN_POLL_INTERVAL),
                humantime::format_duration(self.poll_interval)
            );
        }
        Ok(())
    }

    fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("DASHBOARD_URL") {
            self.base_url = v;
        }
        if let Some(v) = var("DASHBOARD_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = var("DASHBOARD_SERVICE") {
            self.service = Some(v);
        }
    }

    fn apply_overrides(&mut self, o: &Overrides) {
        if let Some(v) = &o.base_url {
            self.base_url = v.clone();
        }
        if let Some(v) = &o.token {
            self.token = Some(v.clone());
        }
        if let Some(v) = &o.service {
            self.service = Some(v.clone());
        }
        if let Some(v) = o.poll_interval {
            self.poll_interval = v;
        }
        if let Some(v) = o.history_limit {
            self.history_limit = v;
        }
        if o.max_polls.is_some() {
            self.max_polls = o.max_polls;
        }
    }

    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("dashboard token is required (set DASHBOARD_TOKEN or pass --token)")
    }

    pub fn require_service(&self) -> Result<&str> {
        self.service
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("service name is required (set DASHBOARD_SERVICE or pass --service)")
    }

    pub(crate) fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            poll_interval: self.poll_interval,
            max_polls: self.max_polls,
        }
    }
}
