use crate::collectors::device::{DevicePoller, PollOutcome};
use crate::collectors::inventory::{aggregate_with_report, InventoryError};
use crate::collectors::probe::Prober;
use crate::collectors::snmp::MetricFetcher;
use crate::metrics::Metrics;
use crate::model::{AggregateResult, OutboundRecord};
use crate::record::merge_body;
use crate::state::{now_unix, CycleSummary, State};
use crate::upstream::{Delivery, Upstream};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

pub struct CycleContext<P, F> {
    pub upstream: Upstream,
    pub poller: Arc<DevicePoller<P, F>>,
    pub metrics: Arc<Metrics>,
    pub max_concurrent: usize,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// No usable inventory, nothing was polled.
    pub skipped: bool,
    pub inventory_devices: usize,
    pub aggregate: AggregateResult,
    pub outcomes: Vec<(String, PollOutcome)>,
    pub skipped_records: Vec<String>,
    pub flattened: String,
    pub aggregate_sent: bool,
    pub record: Option<OutboundRecord>,
    pub record_sent: bool,
}

impl CycleReport {
    pub fn count(&self, outcome: PollOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

/// fetch inventory → poll → post aggregate → discover → merge → post record.
pub async fn run_cycle<P, F>(ctx: &CycleContext<P, F>) -> Result<CycleReport, CycleError>
where
    P: Prober + 'static,
    F: MetricFetcher + 'static,
{
    let mut report = CycleReport::default();

    let inventory = match ctx.upstream.fetch_inventory().await {
        Ok(inventory) => {
            ctx.metrics.inc_upstream("inventory", "ok");
            inventory
        }
        Err(err) => {
            ctx.metrics.inc_upstream("inventory", "error");
            warn!(phase = "inventory", error = %err, "no inventory this cycle");
            report.skipped = true;
            return Ok(report);
        }
    };
    if inventory.as_object().is_some_and(|devices| devices.is_empty()) {
        info!(phase = "inventory", "inventory is empty, skipping cycle");
        report.skipped = true;
        return Ok(report);
    }
    report.inventory_devices = inventory.as_object().map_or(0, |devices| devices.len());

    let aggregated =
        aggregate_with_report(ctx.poller.clone(), &inventory, ctx.max_concurrent).await?;
    for (_, outcome) in &aggregated.outcomes {
        ctx.metrics.inc_device_poll(outcome.as_str());
    }
    ctx.metrics.inc_devices_skipped(aggregated.skipped.len());

    report.aggregate = aggregated.result;
    report.outcomes = aggregated.outcomes;
    report.skipped_records = aggregated.skipped;
    report.flattened = report.aggregate.flatten();
    debug!(detail = %report.flattened, "flattened aggregate");

    report.aggregate_sent = match ctx.upstream.post_aggregate(&report.aggregate).await {
        Ok(delivery) => log_delivery(&ctx.metrics, "aggregate", &delivery),
        Err(err) => {
            ctx.metrics.inc_upstream("aggregate", "error");
            warn!(phase = "aggregate", error = %err, "failed to post aggregate");
            false
        }
    };

    let endpoint = match ctx.upstream.discover_endpoint().await {
        Ok(Some(url)) => {
            ctx.metrics.inc_upstream("discovery", "ok");
            url
        }
        Ok(None) => {
            ctx.metrics.inc_upstream("discovery", "disabled");
            info!(phase = "discovery", "merged record endpoint not available");
            return Ok(report);
        }
        Err(err) => {
            ctx.metrics.inc_upstream("discovery", "error");
            warn!(phase = "discovery", error = %err, "merged record endpoint not available");
            return Ok(report);
        }
    };

    let hardware = match ctx.upstream.fetch_hardware().await {
        Ok(body) => {
            ctx.metrics.inc_upstream("hardware", "ok");
            Some(body)
        }
        Err(err) => {
            ctx.metrics.inc_upstream("hardware", "error");
            warn!(phase = "hardware", error = %err, "hardware snapshot unavailable");
            None
        }
    };

    let record = match merge_body(hardware.as_ref(), &report.flattened) {
        Ok(record) => record,
        Err(err) => {
            error!(phase = "merge", error = %err, "failed to merge hardware snapshot");
            return Ok(report);
        }
    };

    report.record_sent = match ctx.upstream.post_record(&endpoint, &record).await {
        Ok(delivery) => log_delivery(&ctx.metrics, "record", &delivery),
        Err(err) => {
            ctx.metrics.inc_upstream("record", "error");
            warn!(phase = "record", endpoint = %endpoint, error = %err, "failed to send merged record");
            false
        }
    };
    report.record = Some(record);

    Ok(report)
}

/// Runs one cycle in its own task and records how it ended.
///
/// Errors and panics of the cycle end up in the log and in `state`, never here.
pub async fn run_supervised<P, F>(
    ctx: &Arc<CycleContext<P, F>>,
    state: &Arc<RwLock<State>>,
) -> CycleSummary
where
    P: Prober + 'static,
    F: MetricFetcher + 'static,
{
    let started_at_unix = now_unix();
    let started = Instant::now();

    let task_ctx = ctx.clone();
    let joined = tokio::spawn(async move { run_cycle(&task_ctx).await }).await;

    let mut summary = match joined {
        Ok(Ok(report)) => {
            ctx.metrics
                .inc_cycle(if report.skipped { "skipped" } else { "ok" });
            summarize(&report)
        }
        Ok(Err(err)) => {
            ctx.metrics.inc_cycle("failed");
            error!(error = %err, "cycle failed");
            failed_summary(err.to_string())
        }
        Err(err) => {
            ctx.metrics.inc_cycle("failed");
            error!(error = %err, "cycle task panicked");
            failed_summary(err.to_string())
        }
    };
    summary.started_at_unix = started_at_unix;
    summary.finished_at_unix = now_unix();
    summary.duration_ms = started.elapsed().as_millis() as u64;

    info!(
        outcome = %summary.outcome,
        devices = summary.inventory_devices,
        polled = summary.polled,
        unreachable = summary.unreachable,
        duration_ms = summary.duration_ms,
        "cycle finished"
    );

    let mut guard = state.write().await;
    guard.record_cycle(summary.clone());
    ctx.metrics.update_from_state(&guard);
    summary
}

fn summarize(report: &CycleReport) -> CycleSummary {
    CycleSummary {
        outcome: if report.skipped { "skipped" } else { "ok" }.to_string(),
        inventory_devices: report.inventory_devices,
        polled: report.count(PollOutcome::Polled),
        unreachable: report.count(PollOutcome::Unreachable),
        decode_errors: report.count(PollOutcome::DecodeFailed),
        fetch_errors: report.count(PollOutcome::FetchFailed),
        skipped_records: report.skipped_records.len(),
        aggregate_sent: report.aggregate_sent,
        record_sent: report.record_sent,
        ..CycleSummary::default()
    }
}

fn failed_summary(error: String) -> CycleSummary {
    CycleSummary {
        outcome: "failed".to_string(),
        error: Some(error),
        ..CycleSummary::default()
    }
}

fn log_delivery(metrics: &Metrics, target: &str, delivery: &Delivery) -> bool {
    if delivery.is_success() {
        metrics.inc_upstream(target, "ok");
        info!(phase = target, status = delivery.status, response = %delivery.body, "upstream accepted data");
        true
    } else {
        metrics.inc_upstream(target, "rejected");
        warn!(phase = target, status = delivery.status, response = %delivery.body, "upstream rejected data");
        false
    }
}
