use crate::params::ParameterRowSet;

/// Executable the dashboard runs benchmarks with.
pub const BENCH_EXECUTABLE: &str = "llama-bench";

/// Fixed arguments every benchmark gets: the service's model and JSON output.
pub fn required_args(model_path: &str) -> Vec<String> {
    vec![
        "-m".to_string(),
        model_path.to_string(),
        "-o".to_string(),
        "json".to_string(),
    ]
}

/// Render the command line a run of `rows` would execute.
///
/// Boolean flags (empty value) render without a trailing value. Nothing is
/// validated or quoted; this is a preview, not an argv.
pub fn build_command_preview(base: &str, fixed_args: &[String], rows: &ParameterRowSet) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(1 + fixed_args.len() + rows.rows().len() * 2);
    parts.push(base);
    parts.extend(fixed_args.iter().map(String::as_str));
    for row in rows.rows().iter().filter(|r| !r.is_empty) {
        parts.push(&row.flag);
        if !row.value.is_empty() {
            parts.push(&row.value);
        }
    }
    parts.join(" ")
}
