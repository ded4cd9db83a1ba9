//! Metrics for the document engine: mutation counters and formula/replay
//! timings, exposed through the `metrics` crate's facade (no exporter is
//! wired up by default; host binaries add one via the `metrics-export`
//! feature).

use std::time::Duration;

use metrics::{counter, histogram};

/// Document-engine metrics interface.
pub struct DocumentMetrics;

impl DocumentMetrics {
    pub fn record_mutation(kind: &str) {
        counter!("weave_mutations_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn record_commit() {
        counter!("weave_commits_total").increment(1);
    }

    pub fn record_formula_eval(duration: Duration, errored: bool) {
        histogram!("weave_formula_eval_duration_seconds").record(duration.as_secs_f64());
        if errored {
            counter!("weave_formula_eval_errors_total").increment(1);
        }
    }

    pub fn record_replay(patch_count: usize, duration: Duration) {
        counter!("weave_replay_patches_total").increment(patch_count as u64);
        histogram!("weave_replay_duration_seconds").record(duration.as_secs_f64());
    }

    pub fn record_sync_transition(status: &str) {
        counter!("weave_sync_transitions_total", "status" => status.to_string()).increment(1);
    }
}
