use crate::collectors::probe::Prober;
use crate::collectors::snmp::MetricFetcher;
use crate::model::{DeviceConfig, IdentifierMap, MetricResult};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Polled,
    Unreachable,
    DecodeFailed,
    /// Fetcher returned nothing but absent values.
    FetchFailed,
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollOutcome::Polled => "polled",
            PollOutcome::Unreachable => "unreachable",
            PollOutcome::DecodeFailed => "decode_error",
            PollOutcome::FetchFailed => "fetch_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePoll {
    pub result: MetricResult,
    pub outcome: PollOutcome,
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub attempts: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            attempts: 1,
        }
    }
}

pub struct DevicePoller<P, F> {
    prober: P,
    fetcher: F,
    probe: ProbeSettings,
}

impl<P: Prober, F: MetricFetcher> DevicePoller<P, F> {
    pub fn new(prober: P, fetcher: F, probe: ProbeSettings) -> Self {
        Self {
            prober,
            fetcher,
            probe,
        }
    }

    pub async fn poll_device(&self, name: &str, config: &DeviceConfig) -> MetricResult {
        self.poll(name, config).await.result
    }

    /// Probe, decode the identifier map, fetch, zip. Never fails.
    pub async fn poll(&self, name: &str, config: &DeviceConfig) -> DevicePoll {
        info!(device = %name, address = %config.address, "processing device");

        let reachable = self
            .prober
            .is_reachable(&config.address, self.probe.timeout, self.probe.attempts)
            .await;
        if !reachable {
            warn!(device = %name, address = %config.address, phase = "probe", "device unreachable, skipping snmp");
            return DevicePoll {
                result: MetricResult::new(),
                outcome: PollOutcome::Unreachable,
            };
        }

        let map = match IdentifierMap::decode(&config.identifier_map_source) {
            Ok(map) => map,
            Err(err) => {
                warn!(device = %name, address = %config.address, phase = "decode", error = %err, "cannot decode identifier map");
                return DevicePoll {
                    result: MetricResult::new(),
                    outcome: PollOutcome::DecodeFailed,
                };
            }
        };

        if map.is_empty() {
            return DevicePoll {
                result: MetricResult::new(),
                outcome: PollOutcome::Polled,
            };
        }

        let names = map.names();
        let identifiers = map.identifiers();
        let mut values = self
            .fetcher
            .fetch_metrics(&config.address, config.port, &config.community, &identifiers)
            .await;
        // keep the result keyed exactly by the requested names
        values.resize(names.len(), None);

        let outcome = if values.iter().all(Option::is_none) {
            PollOutcome::FetchFailed
        } else {
            PollOutcome::Polled
        };

        DevicePoll {
            result: MetricResult::zip(names, values),
            outcome,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct MockProber {
        pub down: Vec<String>,
    }

    #[async_trait]
    impl Prober for MockProber {
        async fn is_reachable(&self, address: &str, _timeout: Duration, _attempts: u32) -> bool {
            !self.down.iter().any(|a| a == address)
        }
    }

    /// Answers from a fixed OID table; unknown addresses fail the batch.
    #[derive(Clone, Default)]
    pub struct MockFetcher {
        pub values: HashMap<String, Vec<Option<String>>>,
        pub calls: Arc<AtomicUsize>,
        pub seen: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl MockFetcher {
        pub fn answering(address: &str, values: &[&str]) -> Self {
            let mut m = Self::default();
            m.values.insert(
                address.to_string(),
                values.iter().map(|v| Some(v.to_string())).collect(),
            );
            m
        }
    }

    #[async_trait]
    impl MetricFetcher for MockFetcher {
        async fn fetch_metrics(
            &self,
            address: &str,
            _port: u16,
            _community: &str,
            identifiers: &[String],
        ) -> Vec<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(identifiers.to_vec());
            match self.values.get(address) {
                Some(values) => values.clone(),
                None => vec![None; identifiers.len()],
            }
        }
    }

    pub fn device(ip: &str, oids: &str) -> DeviceConfig {
        DeviceConfig {
            address: ip.to_string(),
            port: 161,
            community: "public".to_string(),
            identifier_map_source: oids.to_string(),
        }
    }

    #[tokio::test]
    async fn reachable_device_is_zipped_in_map_order() {
        let fetcher = MockFetcher::answering("10.0.0.1", &["12345", "sw1"]);
        let seen = fetcher.seen.clone();
        let poller = DevicePoller::new(MockProber::default(), fetcher, ProbeSettings::default());

        let poll = poller
            .poll(
                "sw1",
                &device(
                    "10.0.0.1",
                    r#"{"sysUptime":"1.3.6.1.2.1.1.3.0","sysName":"1.3.6.1.2.1.1.5.0"}"#,
                ),
            )
            .await;

        assert_eq!(poll.outcome, PollOutcome::Polled);
        assert_eq!(poll.result.get("sysUptime"), Some(Some("12345")));
        assert_eq!(poll.result.get("sysName"), Some(Some("sw1")));
        assert_eq!(
            seen.lock().unwrap()[0],
            vec!["1.3.6.1.2.1.1.3.0", "1.3.6.1.2.1.1.5.0"]
        );
    }

    #[tokio::test]
    async fn unreachable_device_never_fetches() {
        let fetcher = MockFetcher::answering("10.0.0.1", &["12345"]);
        let calls = fetcher.calls.clone();
        let prober = MockProber {
            down: vec!["10.0.0.1".to_string()],
        };
        let poller = DevicePoller::new(prober, fetcher, ProbeSettings::default());

        let poll = poller
            .poll("sw1", &device("10.0.0.1", r#"{"sysUptime":"1.3.6.1.2.1.1.3.0"}"#))
            .await;

        assert_eq!(poll.outcome, PollOutcome::Unreachable);
        assert!(poll.result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_failure_marks_every_metric_absent() {
        let fetcher = MockFetcher::default();
        let poller = DevicePoller::new(MockProber::default(), fetcher, ProbeSettings::default());

        let poll = poller
            .poll(
                "sw1",
                &device("10.0.0.9", r#"{"a":"1.3.6.1.2.1.1.3.0","b":"1.3.6.1.2.1.1.5.0"}"#),
            )
            .await;

        assert_eq!(poll.outcome, PollOutcome::FetchFailed);
        assert_eq!(poll.result.len(), 2);
        assert_eq!(poll.result.absent_count(), 2);
        assert_eq!(poll.result.get("a"), Some(None));
    }

    #[tokio::test]
    async fn malformed_identifier_map_is_isolated() {
        let fetcher = MockFetcher::answering("10.0.0.1", &["1"]);
        let calls = fetcher.calls.clone();
        let poller = DevicePoller::new(MockProber::default(), fetcher, ProbeSettings::default());

        let poll = poller.poll("sw1", &device("10.0.0.1", "{broken")).await;

        assert_eq!(poll.outcome, PollOutcome::DecodeFailed);
        assert!(poll.result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_fetch_reply_is_padded_with_absent() {
        let fetcher = MockFetcher::answering("10.0.0.1", &["only-one"]);
        let poller = DevicePoller::new(MockProber::default(), fetcher, ProbeSettings::default());

        let result = poller
            .poll_device(
                "sw1",
                &device("10.0.0.1", r#"{"a":"1.3.6.1.2.1.1.3.0","b":"1.3.6.1.2.1.1.5.0"}"#),
            )
            .await;

        assert_eq!(result.get("a"), Some(Some("only-one")));
        assert_eq!(result.get("b"), Some(None));
    }
}
