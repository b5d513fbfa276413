use crate::state::{now_unix, State};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub relay_cycles_total: CounterVec,
    pub relay_device_polls_total: CounterVec,
    pub relay_devices_skipped_total: Counter,
    pub relay_fetch_errors_total: CounterVec,
    pub relay_upstream_requests_total: CounterVec,
    pub relay_inventory_devices: Gauge,
    pub relay_last_cycle_timestamp_seconds: Gauge,
    pub relay_last_cycle_duration_seconds: Gauge,
    pub relay_uptime_seconds: Gauge,
    pub relay_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let relay_cycles_total = CounterVec::new(
            opts!("relay_cycles_total", "Polling cycles by outcome"),
            &["outcome"],
        )?;
        let relay_device_polls_total = CounterVec::new(
            opts!(
                "relay_device_polls_total",
                "Device polls by outcome (polled, unreachable, decode_error, fetch_error)"
            ),
            &["outcome"],
        )?;
        let relay_devices_skipped_total = Counter::with_opts(opts!(
            "relay_devices_skipped_total",
            "Inventory entries dropped because the record was malformed"
        ))?;
        let relay_fetch_errors_total = CounterVec::new(
            opts!(
                "relay_fetch_errors_total",
                "Failed SNMP GET batches by class (transport, status, other)"
            ),
            &["class"],
        )?;
        let relay_upstream_requests_total = CounterVec::new(
            opts!(
                "relay_upstream_requests_total",
                "Requests to HTTP collaborators by target and outcome"
            ),
            &["target", "outcome"],
        )?;
        let relay_inventory_devices = Gauge::with_opts(opts!(
            "relay_inventory_devices",
            "Devices in the inventory of the last cycle"
        ))?;
        let relay_last_cycle_timestamp_seconds = Gauge::with_opts(opts!(
            "relay_last_cycle_timestamp_seconds",
            "Unix time the last cycle finished"
        ))?;
        let relay_last_cycle_duration_seconds = Gauge::with_opts(opts!(
            "relay_last_cycle_duration_seconds",
            "Wall-clock duration of the last cycle"
        ))?;
        let relay_uptime_seconds =
            Gauge::with_opts(opts!("relay_uptime_seconds", "Daemon uptime in seconds"))?;
        let relay_scrape_count_total = Counter::with_opts(opts!(
            "relay_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &relay_cycles_total)?;
        register(&registry, &relay_device_polls_total)?;
        register(&registry, &relay_devices_skipped_total)?;
        register(&registry, &relay_fetch_errors_total)?;
        register(&registry, &relay_upstream_requests_total)?;
        register(&registry, &relay_inventory_devices)?;
        register(&registry, &relay_last_cycle_timestamp_seconds)?;
        register(&registry, &relay_last_cycle_duration_seconds)?;
        register(&registry, &relay_uptime_seconds)?;
        register(&registry, &relay_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            relay_cycles_total,
            relay_device_polls_total,
            relay_devices_skipped_total,
            relay_fetch_errors_total,
            relay_upstream_requests_total,
            relay_inventory_devices,
            relay_last_cycle_timestamp_seconds,
            relay_last_cycle_duration_seconds,
            relay_uptime_seconds,
            relay_scrape_count_total,
        }))
    }

    pub fn update_from_state(&self, state: &State) {
        if let Some(last) = &state.last_cycle {
            self.relay_last_cycle_timestamp_seconds
                .set(last.finished_at_unix as f64);
            self.relay_last_cycle_duration_seconds
                .set(last.duration_ms as f64 / 1000.0);
            self.relay_inventory_devices.set(last.inventory_devices as f64);
        }
        let uptime = now_unix().saturating_sub(state.started_at_unix) as f64;
        self.relay_uptime_seconds.set(uptime);
    }

    pub fn inc_cycle(&self, outcome: &str) {
        self.relay_cycles_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_device_poll(&self, outcome: &str) {
        self.relay_device_polls_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_devices_skipped(&self, count: usize) {
        self.relay_devices_skipped_total.inc_by(count as f64);
    }

    pub fn inc_fetch_error(&self, class: &str) {
        self.relay_fetch_errors_total.with_label_values(&[class]).inc();
    }

    pub fn inc_upstream(&self, target: &str, outcome: &str) {
        self.relay_upstream_requests_total
            .with_label_values(&[target, outcome])
            .inc();
    }

    pub fn inc_scrape_count(&self) {
        self.relay_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
