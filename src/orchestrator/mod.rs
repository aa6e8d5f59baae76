//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (start/poll/stop), projection of past
//! runs onto service configuration, and the shared history window both of them
//! refresh. UI/CLI layers call into this module to keep responsibilities separated.

mod apply;
mod controller;
mod history;

pub(crate) use apply::{ApplyPreview, ApplyProjector};
pub(crate) use controller::{ControllerSettings, RunController, MIN_POLL_INTERVAL};
pub(crate) use history::RunHistory;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
