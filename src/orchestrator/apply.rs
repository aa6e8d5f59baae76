//! Projection of a past run's parameters onto the service configuration.

use super::history::RunHistory;
use crate::api::ConfigStore;
use crate::error::{ApplyError, ClientError};
use crate::flags::FlagClassification;
use crate::model::{ApplyAck, ParamMap, RunRecord};
use crate::text_summary::format_params;
use std::sync::Arc;
use tracing::{info, warn};

/// What `apply` would do for a run, for a confirmation prompt.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ApplyPreview {
    pub applicable: ParamMap,
    pub skipped: Vec<String>,
    pub formatted: String,
}

/// Partition `run.params` by the denylist. Pure; no collaborator calls.
pub(crate) fn apply_preview(run: &RunRecord, classification: &FlagClassification) -> ApplyPreview {
    let mut applicable = ParamMap::new();
    let mut skipped = Vec::new();
    for (flag, value) in &run.params {
        if classification.is_denylisted(flag) {
            skipped.push(flag.clone());
        } else {
            applicable.insert(flag.clone(), value.clone());
        }
    }
    let formatted = format_params(&applicable);
    ApplyPreview {
        applicable,
        skipped,
        formatted,
    }
}

pub(crate) struct ApplyProjector {
    classification: FlagClassification,
    config: Arc<dyn ConfigStore>,
    history: RunHistory,
}

impl ApplyProjector {
    pub fn new(
        classification: FlagClassification,
        config: Arc<dyn ConfigStore>,
        history: RunHistory,
    ) -> Self {
        Self {
            classification,
            config,
            history,
        }
    }

    pub fn preview(&self, run: &RunRecord) -> ApplyPreview {
        apply_preview(run, &self.classification)
    }

    /// Forward the applicable subset to the config store, keyed by the run's
    /// service. Returns the store's message verbatim.
    pub async fn apply(&self, run: &RunRecord) -> Result<ApplyAck, ApplyError> {
        let preview = self.preview(run);
        if preview.applicable.is_empty() {
            return Err(ApplyError::NoApplicableParams);
        }
        let ack = self.config.apply_run(run, &preview.applicable).await?;
        info!(
            run_id = %run.id,
            service = %run.service_name,
            applied = preview.applicable.len(),
            skipped = preview.skipped.len(),
            "applied benchmark params"
        );
        self.refresh_history().await;
        Ok(ack)
    }

    /// Delete a run from history, then refresh the loaded window.
    pub async fn delete_run(&self, run_id: &str) -> Result<(), ClientError> {
        self.history.store().delete_run(run_id).await?;
        info!(%run_id, "deleted benchmark run");
        self.refresh_history().await;
        Ok(())
    }

    async fn refresh_history(&self) {
        if let Err(e) = self.history.refresh().await {
            warn!(error = %e, "history refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{record_with_params, FakeDashboard, SERVICE};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn projector(fake: Arc<FakeDashboard>) -> ApplyProjector {
        let history = RunHistory::new(fake.clone(), SERVICE, 20);
        ApplyProjector::new(FlagClassification::default(), fake, history)
    }

    #[test]
    fn preview_partitions_by_denylist() {
        let run = record_with_params("r", &[("-p", "512"), ("-ngl", "999")]);
        let preview = apply_preview(&run, &FlagClassification::default());

        let expected: ParamMap = [("-ngl".to_string(), "999".to_string())].into_iter().collect();
        assert_eq!(preview.applicable, expected);
        assert_eq!(preview.skipped, vec!["-p".to_string()]);
        assert_eq!(preview.formatted, "-ngl 999");
    }

    #[test]
    fn preview_formats_boolean_flags_without_value() {
        let run = record_with_params("r", &[("-fa", ""), ("-b", "2048"), ("-m", "x")]);
        let preview = apply_preview(&run, &FlagClassification::default());
        assert_eq!(preview.formatted, "-fa -b 2048");
        assert_eq!(preview.skipped, vec!["-m".to_string()]);
    }

    #[test]
    fn preview_reads_only_the_denylist() {
        let mut classification = FlagClassification::default();
        classification.apply_denylist.retain(|f| f != "-r");
        let run = record_with_params("r", &[("-r", "5"), ("-p", "512")]);
        let preview = apply_preview(&run, &classification);
        assert_eq!(preview.formatted, "-r 5");
        assert_eq!(preview.skipped, vec!["-p".to_string()]);
    }

    #[tokio::test]
    async fn apply_forwards_applicable_params() {
        let fake = Arc::new(FakeDashboard::default());
        let p = projector(fake.clone());
        let run = record_with_params("r", &[("-p", "512"), ("-ngl", "999"), ("-b", "1024")]);

        let ack = p.apply(&run).await.unwrap();
        assert!(ack.message.starts_with("Configuration applied to llama-qwen"));

        let applied = fake.applied.lock().unwrap().clone();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].0, SERVICE);
        assert_eq!(
            applied[0].1.keys().cloned().collect::<Vec<_>>(),
            vec!["-ngl".to_string(), "-b".to_string()]
        );
        assert_eq!(fake.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn apply_with_only_denylisted_flags_fails_without_store_call() {
        let fake = Arc::new(FakeDashboard::default());
        let p = projector(fake.clone());
        let run = record_with_params("r", &[("-p", "512")]);

        let err = p.apply(&run).await.unwrap_err();
        assert!(matches!(err, ApplyError::NoApplicableParams));
        assert!(fake.applied.lock().unwrap().is_empty());
        assert_eq!(fake.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delete_refreshes_history() {
        let fake = Arc::new(FakeDashboard::default());
        *fake.history.lock().unwrap() = vec![
            record_with_params("keep", &[("-ngl", "1")]),
            record_with_params("gone", &[("-ngl", "2")]),
        ];
        let p = projector(fake.clone());

        p.delete_run("gone").await.unwrap();
        assert_eq!(*fake.deleted.lock().unwrap(), vec!["gone".to_string()]);
        assert!(p.history.find("gone").is_none());
        assert!(p.history.find("keep").is_some());
    }

    #[tokio::test]
    async fn delete_of_unknown_run_is_not_found() {
        let fake = Arc::new(FakeDashboard::default());
        let p = projector(fake.clone());
        let err = p.delete_run("nope").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert_eq!(fake.list_calls.load(Ordering::SeqCst), 0);
    }
}
