//! Editable, ordered set of flag/value rows.
//!
//! The set always ends with exactly one placeholder row (`is_empty`). Editing
//! the placeholder promotes it to a real row and appends a fresh placeholder,
//! so the operator can keep typing without an explicit "add" step.

use crate::flags::FlagClassification;
use crate::model::{ParamMap, RunRecord};
use tokio::sync::watch;

/// Row identifier, unique within one `ParameterRowSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRow {
    pub id: RowId,
    pub flag: String,
    pub value: String,
    pub is_empty: bool,
}

pub struct ParameterRowSet {
    rows: Vec<ParameterRow>,
    next_id: u64,
    classification: FlagClassification,
    revision: watch::Sender<u64>,
}

impl ParameterRowSet {
    /// An editor holding only the placeholder row.
    pub fn new(classification: FlagClassification) -> Self {
        let (revision, _) = watch::channel(0);
        let mut set = Self {
            rows: Vec::new(),
            next_id: 0,
            classification,
            revision,
        };
        set.ensure_trailing_empty();
        set
    }

    /// Editor seeded from the most recent run, or from the safe defaults when
    /// the service has no history yet.
    pub fn initial(latest: Option<&RunRecord>, classification: FlagClassification) -> Self {
        let mut set = Self::new(classification);
        match latest {
            Some(run) if !run.params.is_empty() => set.load_from(run.params.clone()),
            _ => {
                let defaults = set.classification.safe_defaults.clone();
                set.load_from(defaults);
            }
        }
        set
    }

    pub fn rows(&self) -> &[ParameterRow] {
        &self.rows
    }

    #[cfg(test)]
    pub fn get(&self, id: RowId) -> Option<&ParameterRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// Non-empty row carrying `flag`, if any.
    pub fn find_flag(&self, flag: &str) -> Option<&ParameterRow> {
        self.rows.iter().find(|r| !r.is_empty && r.flag == flag)
    }

    #[cfg(test)]
    pub fn trailing_empty_id(&self) -> Option<RowId> {
        self.rows.last().filter(|r| r.is_empty).map(|r| r.id)
    }

    /// Flags the executor supplies itself; the operator may not set or
    /// remove them.
    pub fn is_locked(&self, flag: &str) -> bool {
        self.classification.is_auto_added(flag)
    }

    pub fn classification(&self) -> &FlagClassification {
        &self.classification
    }

    /// Watch channel bumped on every mutation.
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn set_flag(&mut self, id: RowId, flag: impl Into<String>) -> bool {
        let flag = flag.into();
        self.edit(id, |row| row.flag = flag)
    }

    pub fn set_value(&mut self, id: RowId, value: impl Into<String>) -> bool {
        let value = value.into();
        self.edit(id, |row| row.value = value)
    }

    /// Remove a row. The trailing placeholder cannot be removed.
    pub fn remove(&mut self, id: RowId) -> bool {
        let Some(idx) = self.rows.iter().position(|r| r.id == id) else {
            return false;
        };
        if self.rows[idx].is_empty {
            return false;
        }
        self.rows.remove(idx);
        self.ensure_trailing_empty();
        self.notify();
        true
    }

    /// Insert a new row before the placeholder. Returns `false` without
    /// touching the set when a non-empty row already carries `flag`.
    pub fn add(&mut self, flag: impl Into<String>, value: impl Into<String>) -> bool {
        let flag = flag.into();
        if self.find_flag(&flag).is_some() {
            return false;
        }
        let row = ParameterRow {
            id: self.mint_id(),
            flag,
            value: value.into(),
            is_empty: false,
        };
        match self.rows.last() {
            Some(last) if last.is_empty => {
                let at = self.rows.len() - 1;
                self.rows.insert(at, row);
            }
            _ => {
                self.rows.push(row);
                self.ensure_trailing_empty();
            }
        }
        self.notify();
        true
    }

    /// Replace every row. Benchmark-only flags come first, then the rest;
    /// each group keeps the input order.
    pub fn load_from<I, K, V>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (bench, other): (Vec<(String, String)>, Vec<(String, String)>) = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .partition(|(flag, _)| self.classification.is_benchmark_only(flag));

        self.rows.clear();
        for (flag, value) in bench.into_iter().chain(other) {
            let id = self.mint_id();
            self.rows.push(ParameterRow {
                id,
                flag,
                value,
                is_empty: false,
            });
        }
        self.ensure_trailing_empty();
        self.notify();
    }

    /// Flag -> value for every non-empty row. A flag duplicated through manual
    /// edits collapses to its last value.
    pub fn to_map(&self) -> ParamMap {
        self.rows
            .iter()
            .filter(|r| !r.is_empty)
            .map(|r| (r.flag.clone(), r.value.clone()))
            .collect()
    }

    fn edit(&mut self, id: RowId, apply: impl FnOnce(&mut ParameterRow)) -> bool {
        let Some(row) = self.rows.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        apply(row);
        if row.is_empty {
            row.is_empty = false;
            self.ensure_trailing_empty();
        }
        self.notify();
        true
    }

    fn ensure_trailing_empty(&mut self) {
        if self.rows.last().map(|r| r.is_empty) != Some(true) {
            let id = self.mint_id();
            self.rows.push(ParameterRow {
                id,
                flag: String::new(),
                value: String::new(),
                is_empty: true,
            });
        }
    }

    fn mint_id(&mut self) -> RowId {
        self.next_id += 1;
        RowId(self.next_id)
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}
