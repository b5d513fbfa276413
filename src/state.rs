use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide status shared with the HTTP server.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub started_at_unix: i64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle: Option<CycleSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub started_at_unix: i64,
    pub finished_at_unix: i64,
    pub duration_ms: u64,
    /// `ok`, `skipped` (no inventory) or `failed`.
    pub outcome: String,
    pub inventory_devices: usize,
    pub polled: usize,
    pub unreachable: usize,
    pub decode_errors: usize,
    pub fetch_errors: usize,
    pub skipped_records: usize,
    pub aggregate_sent: bool,
    pub record_sent: bool,
    pub error: Option<String>,
}

impl State {
    pub fn new(now_unix: i64) -> Self {
        Self {
            started_at_unix: now_unix,
            ..Self::default()
        }
    }

    pub fn record_cycle(&mut self, summary: CycleSummary) {
        if summary.outcome == "failed" {
            self.cycles_failed += 1;
        } else {
            self.cycles_completed += 1;
        }
        self.last_cycle = Some(summary);
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_cycles_by_outcome() {
        let mut state = State::new(100);
        state.record_cycle(CycleSummary {
            outcome: "ok".to_string(),
            ..CycleSummary::default()
        });
        state.record_cycle(CycleSummary {
            outcome: "skipped".to_string(),
            ..CycleSummary::default()
        });
        state.record_cycle(CycleSummary {
            outcome: "failed".to_string(),
            error: Some("boom".to_string()),
            ..CycleSummary::default()
        });

        assert_eq!(state.started_at_unix, 100);
        assert_eq!(state.cycles_completed, 2);
        assert_eq!(state.cycles_failed, 1);
        assert_eq!(
            state.last_cycle.as_ref().and_then(|c| c.error.as_deref()),
            Some("boom")
        );
    }
}
