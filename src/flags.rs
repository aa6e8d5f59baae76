//! Static flag classification used by the editor and the apply projector.
//!
//! The denylist is kept as its own list rather than derived from the other
//! sets; apply-time filtering reads only `APPLY_DENYLIST`.

/// Flags meaningful only to a benchmark run.
pub const BENCHMARK_ONLY: &[&str] = &["-p", "-n", "-r"];

/// Flags the executor supplies itself (model path, output format).
pub const AUTO_ADDED: &[&str] = &["-m", "-o"];

/// Editor contents when there is no prior run for the service.
pub const SAFE_DEFAULTS: &[(&str, &str)] = &[("-p", "512"), ("-n", "128"), ("-r", "3")];

/// Flags never projected onto a persisted service configuration.
pub const APPLY_DENYLIST: &[&str] = &["-p", "-n", "-r", "-o", "-m"];

/// Instance view of the classification lists, so editors and projectors can
/// be built with alternative lists in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagClassification {
    pub benchmark_only: Vec<String>,
    pub auto_added: Vec<String>,
    pub safe_defaults: Vec<(String, String)>,
    pub apply_denylist: Vec<String>,
}

impl Default for FlagClassification {
    fn default() -> Self {
        Self {
            benchmark_only: to_owned_list(BENCHMARK_ONLY),
            auto_added: to_owned_list(AUTO_ADDED),
            safe_defaults: SAFE_DEFAULTS
                .iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect(),
            apply_denylist: to_owned_list(APPLY_DENYLIST),
        }
    }
}

impl FlagClassification {
    pub fn is_benchmark_only(&self, flag: &str) -> bool {
        self.benchmark_only.iter().any(|f| f == flag)
    }

    pub fn is_auto_added(&self, flag: &str) -> bool {
        self.auto_added.iter().any(|f| f == flag)
    }

    pub fn is_denylisted(&self, flag: &str) -> bool {
        self.apply_denylist.iter().any(|f| f == flag)
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
