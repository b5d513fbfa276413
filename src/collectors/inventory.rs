use crate::collectors::device::{DevicePoll, DevicePoller, PollOutcome};
use crate::collectors::probe::Prober;
use crate::collectors::snmp::MetricFetcher;
use crate::model::{json_kind, AggregateResult, DeviceConfig, MetricResult};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("inventory must be a JSON object, got {0}")]
    NotAMapping(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct AggregateReport {
    pub result: AggregateResult,
    /// Outcome per polled device, inventory order.
    pub outcomes: Vec<(String, PollOutcome)>,
    /// Devices dropped because their record was malformed.
    pub skipped: Vec<String>,
}

pub async fn aggregate<P, F>(
    poller: Arc<DevicePoller<P, F>>,
    inventory: &Value,
    max_concurrent: usize,
) -> Result<AggregateResult, InventoryError>
where
    P: Prober + 'static,
    F: MetricFetcher + 'static,
{
    aggregate_with_report(poller, inventory, max_concurrent)
        .await
        .map(|report| report.result)
}

/// Polls every well-formed device of the inventory.
///
/// Output order follows inventory order whatever `max_concurrent` is.
pub async fn aggregate_with_report<P, F>(
    poller: Arc<DevicePoller<P, F>>,
    inventory: &Value,
    max_concurrent: usize,
) -> Result<AggregateReport, InventoryError>
where
    P: Prober + 'static,
    F: MetricFetcher + 'static,
{
    let devices = inventory
        .as_object()
        .ok_or_else(|| InventoryError::NotAMapping(json_kind(inventory)))?;

    let mut report = AggregateReport::default();
    let mut accepted: Vec<(String, DeviceConfig)> = Vec::with_capacity(devices.len());
    for (name, raw) in devices {
        match DeviceConfig::from_value(raw) {
            Ok(cfg) => accepted.push((name.clone(), cfg)),
            Err(err) => {
                warn!(device = %name, error = %err, "malformed device record, skipping");
                report.skipped.push(name.clone());
            }
        }
    }

    let polls = if max_concurrent <= 1 {
        let mut polls = Vec::with_capacity(accepted.len());
        for (name, cfg) in &accepted {
            polls.push(Some(poller.poll(name, cfg).await));
        }
        polls
    } else {
        poll_concurrently(poller, &accepted, max_concurrent).await
    };

    for ((name, _), poll) in accepted.into_iter().zip(polls) {
        let poll = poll.unwrap_or_else(|| {
            error!(device = %name, "device poll task aborted");
            DevicePoll {
                result: MetricResult::new(),
                outcome: PollOutcome::FetchFailed,
            }
        });
        report.outcomes.push((name.clone(), poll.outcome));
        report.result.insert(name, poll.result);
    }

    Ok(report)
}

async fn poll_concurrently<P, F>(
    poller: Arc<DevicePoller<P, F>>,
    devices: &[(String, DeviceConfig)],
    max_concurrent: usize,
) -> Vec<Option<DevicePoll>>
where
    P: Prober + 'static,
    F: MetricFetcher + 'static,
{
    let permits = Arc::new(Semaphore::new(max_concurrent.min(Semaphore::MAX_PERMITS)));
    let mut join_set = JoinSet::new();

    for (index, (name, cfg)) in devices.iter().enumerate() {
        let poller = poller.clone();
        let permits = permits.clone();
        let name = name.clone();
        let cfg = cfg.clone();
        join_set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            (index, poller.poll(&name, &cfg).await)
        });
    }

    let mut slots: Vec<Option<DevicePoll>> = vec![None; devices.len()];
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, poll)) => slots[index] = Some(poll),
            Err(err) => error!(error = %err, "device poll task failed"),
        }
    }
    slots
}
