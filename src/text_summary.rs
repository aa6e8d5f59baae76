//! Text summary builders for CLI output.
//!
//! This module formats human-readable lines for runs, history listings, and
//! apply previews.

use crate::model::{ParamMap, RunRecord, RunStatus};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build the result summary shown when a run reaches a terminal status.
///
/// Field order: headline, prompt processing, text generation, model, build,
/// GPU, CPU. Throughput lines are omitted when the executor reported none.
pub(crate) fn build_run_summary(run: &RunRecord) -> TextSummary {
    let mut lines = Vec::new();

    match run.status {
        RunStatus::Completed => lines.push("Benchmark completed".to_string()),
        RunStatus::Failed => lines.push(format!(
            "Benchmark failed: {}",
            run.error_message.as_deref().unwrap_or("unknown error")
        )),
        RunStatus::Cancelled => match run.error_message.as_deref() {
            Some(msg) if !msg.trim().is_empty() => {
                lines.push(format!("Benchmark cancelled: {msg}"))
            }
            _ => lines.push("Benchmark cancelled".to_string()),
        },
        RunStatus::Pending | RunStatus::Running => {
            lines.push(format!("Benchmark {}", run.status))
        }
    }

    if let Some(pp) = run.pp_avg_ts {
        lines.push(format!(
            "Prompt Processing: {}",
            throughput(pp, run.pp_stddev_ts)
        ));
    }
    if let Some(tg) = run.tg_avg_ts {
        lines.push(format!(
            "Text Generation:   {}",
            throughput(tg, run.tg_stddev_ts)
        ));
    }
    if let Some(model_type) = run.model_type.as_deref() {
        lines.push(format!("Model: {model_type}"));
    }
    if let Some(commit) = run.build_commit.as_deref() {
        lines.push(format!("Build: {commit}"));
    }
    if let Some(gpu) = run.gpu_info.as_deref() {
        lines.push(format!("GPU: {gpu}"));
    }
    if let Some(cpu) = run.cpu_info.as_deref() {
        lines.push(format!("CPU: {cpu}"));
    }

    TextSummary { lines }
}

fn throughput(avg: f64, stddev: Option<f64>) -> String {
    match stddev {
        Some(sd) => format!("{avg:.2} t/s (± {sd:.2})"),
        None => format!("{avg:.2} t/s"),
    }
}

/// One line per run for history listings, newest first as given.
pub(crate) fn history_line(run: &RunRecord) -> String {
    let short_id: String = run.id.chars().take(8).collect();
    let created = display_timestamp(&run.created_at);
    let pp = run
        .pp_avg_ts
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".into());
    let tg = run
        .tg_avg_ts
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".into());
    format!(
        "{short_id}  {created}  {:<9}  pp {pp:>8}  tg {tg:>8}  {}",
        run.status,
        format_params(&run.params)
    )
}

/// `-flag value -flag2` rendering of a parameter map.
pub(crate) fn format_params(params: &ParamMap) -> String {
    params
        .iter()
        .map(|(flag, value)| {
            if value.is_empty() {
                flag.clone()
            } else {
                format!("{flag} {value}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render an RFC 3339 timestamp as `YYYY-MM-DD HH:MM`, or pass it through
/// unchanged when it does not parse.
fn display_timestamp(raw: &str) -> String {
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;

    if raw.is_empty() {
        return "-".into();
    }
    time::OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .and_then(|t| {
            t.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(pp: f64, tg: f64) -> RunRecord {
        let mut r = RunRecord::new("abc", "svc", RunStatus::Completed);
        r.pp_avg_ts = Some(pp);
        r.tg_avg_ts = Some(tg);
        r
    }

    #[test]
    fn completion_summary_lines() {
        let summary = build_run_summary(&completed(45.2, 12.1));
        assert_eq!(summary.lines[0], "Benchmark completed");
        assert!(summary
            .lines
            .iter()
            .any(|l| l.contains("Prompt Processing: 45.20 t/s")));
        assert!(summary
            .lines
            .iter()
            .any(|l| l.contains("Text Generation:   12.10 t/s")));
    }

    #[test]
    fn summary_includes_stddev_and_hardware_in_order() {
        let mut r = completed(100.0, 20.0);
        r.pp_stddev_ts = Some(1.234);
        r.build_commit = Some("a1b2c3".into());
        r.gpu_info = Some("RTX 4090".into());
        let lines = build_run_summary(&r).lines;
        assert_eq!(
            lines,
            vec![
                "Benchmark completed",
                "Prompt Processing: 100.00 t/s (± 1.23)",
                "Text Generation:   20.00 t/s",
                "Build: a1b2c3",
                "GPU: RTX 4090",
            ]
        );
    }

    #[test]
    fn failed_summary_carries_executor_message() {
        let mut r = RunRecord::new("abc", "svc", RunStatus::Failed);
        r.error_message = Some("llama-bench exited with code 1".into());
        let lines = build_run_summary(&r).lines;
        assert_eq!(lines, vec!["Benchmark failed: llama-bench exited with code 1"]);
    }

    #[test]
    fn cancelled_summary_without_message() {
        let r = RunRecord::new("abc", "svc", RunStatus::Cancelled);
        assert_eq!(build_run_summary(&r).lines, vec!["Benchmark cancelled"]);
    }

    #[test]
    fn history_line_formats_timestamp_and_params() {
        let mut r = completed(45.2, 12.1);
        r.id = "0123456789abcdef".into();
        r.created_at = "2026-03-04T05:06:07Z".into();
        r.params.insert("-ngl".into(), "99".into());
        r.params.insert("-fa".into(), String::new());
        let line = history_line(&r);
        assert!(line.starts_with("01234567  2026-03-04 05:06  completed"));
        assert!(line.ends_with("-ngl 99 -fa"));
    }

    #[test]
    fn history_line_truncates_ids_by_character() {
        let mut r = completed(1.0, 1.0);
        r.id = "ééééééééé-run".into();
        let line = history_line(&r);
        assert!(line.starts_with("éééééééé  "));

        r.id = "abc".into();
        assert!(history_line(&r).starts_with("abc  "));
    }
}
