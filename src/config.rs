use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);
const MAX_PROBE_TIMEOUT_SECS: u64 = 60;
const MAX_PROBE_ATTEMPTS: u32 = 10;
const MAX_CONCURRENT_DEVICES: usize = 1024;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    /// Delay between the end of one cycle and the start of the next.
    pub interval: String,
    pub http_timeout_ms: u64,
    pub endpoints: EndpointsConfig,
    pub probe: ProbeConfig,
    pub snmp: SnmpConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub inventory_url: String,
    pub aggregate_url: String,
    pub endpoint_discovery_url: String,
    pub hardware_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Liveness probe binary, invoked with ping-style arguments.
    pub program: String,
    pub timeout_secs: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnmpConfig {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    pub max_concurrent_devices: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            interval: "5m".to_string(),
            http_timeout_ms: default_http_timeout_ms(),
            endpoints: EndpointsConfig::default(),
            probe: ProbeConfig::default(),
            snmp: SnmpConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            inventory_url: "http://localhost/api.php".to_string(),
            aggregate_url: "http://localhost/update_api.php".to_string(),
            endpoint_discovery_url: "http://localhost/getapiendpoint.php".to_string(),
            hardware_url: "http://localhost/get_hardware_values.php".to_string(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            timeout_secs: 1,
            attempts: 1,
        }
    }
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_devices: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a host:port socket address".to_string(),
            ));
        }
        match humantime::parse_duration(&self.interval) {
            Ok(d) if d >= Duration::from_secs(1) => {}
            Ok(_) => {
                return Err(ConfigError::Validation(
                    "interval must be at least 1s".to_string(),
                ))
            }
            Err(err) => {
                return Err(ConfigError::Validation(format!(
                    "interval '{}' is not a duration: {err}",
                    self.interval
                )))
            }
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "http_timeout_ms must be > 0".to_string(),
            ));
        }

        validate_endpoints(&self.endpoints)?;

        if self.probe.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "probe.program must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_PROBE_ATTEMPTS).contains(&self.probe.attempts) {
            return Err(ConfigError::Validation(format!(
                "probe.attempts must be in 1..={MAX_PROBE_ATTEMPTS}"
            )));
        }
        if !(1..=MAX_PROBE_TIMEOUT_SECS).contains(&self.probe.timeout_secs) {
            return Err(ConfigError::Validation(format!(
                "probe.timeout_secs must be in 1..={MAX_PROBE_TIMEOUT_SECS}"
            )));
        }
        if self.snmp.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "snmp.timeout_ms must be > 0".to_string(),
            ));
        }
        if !(1..=MAX_CONCURRENT_DEVICES).contains(&self.polling.max_concurrent_devices) {
            return Err(ConfigError::Validation(format!(
                "polling.max_concurrent_devices must be in 1..={MAX_CONCURRENT_DEVICES}"
            )));
        }

        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        humantime::parse_duration(&self.interval).unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_endpoints(endpoints: &EndpointsConfig) -> Result<(), ConfigError> {
    let urls = [
        ("endpoints.inventory_url", &endpoints.inventory_url),
        ("endpoints.aggregate_url", &endpoints.aggregate_url),
        (
            "endpoints.endpoint_discovery_url",
            &endpoints.endpoint_discovery_url,
        ),
        ("endpoints.hardware_url", &endpoints.hardware_url),
    ];
    for (field, url) in urls {
        let url = url.trim();
        if url.is_empty() {
            return Err(ConfigError::Validation(format!("{field} must not be empty")));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "{field} must be an http(s) URL, got '{url}'"
            )));
        }
    }
    Ok(())
}

fn default_listen() -> String {
    "127.0.0.1:9117".to_string()
}

const fn default_http_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("defaults must validate");
        assert_eq!(cfg.cycle_interval(), Duration::from_secs(300));
        assert_eq!(cfg.probe.attempts, 1);
        assert_eq!(cfg.probe.timeout_secs, 1);
    }

    #[test]
    fn example_yaml_parses() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example parses");
        cfg.validate().expect("example validates");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "interval: 30s\nendpoints:\n  inventory_url: http://inv.local/api.php\n",
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.cycle_interval(), Duration::from_secs(30));
        assert_eq!(cfg.endpoints.inventory_url, "http://inv.local/api.php");
        assert_eq!(
            cfg.endpoints.aggregate_url,
            "http://localhost/update_api.php"
        );
        assert_eq!(cfg.snmp.timeout_ms, 2000);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.listen = "nope".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = Config::default();
        cfg.interval = "soon".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.interval = "10ms".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.endpoints.hardware_url = "ftp://x".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.probe.attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.polling.max_concurrent_devices = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_values_past_upper_bounds() {
        let mut cfg = Config::default();
        cfg.probe.timeout_secs = u64::MAX;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = Config::default();
        cfg.probe.attempts = u32::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.polling.max_concurrent_devices = usize::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.probe.timeout_secs = 60;
        cfg.probe.attempts = 10;
        cfg.polling.max_concurrent_devices = 1024;
        cfg.validate().expect("upper bounds are inclusive");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load_from_file("/nonexistent/snmp-relayd.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
