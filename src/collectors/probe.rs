use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

/// Liveness check performed before any SNMP traffic is sent to a device.
#[async_trait]
pub trait Prober: Send + Sync {
    /// `true` iff at least one of `attempts` probes answered within `timeout` each.
    async fn is_reachable(&self, address: &str, timeout: Duration, attempts: u32) -> bool;
}

/// ICMP echo through the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProber {
    program: String,
}

impl Default for PingProber {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
        }
    }
}

impl PingProber {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn is_reachable(&self, address: &str, timeout: Duration, attempts: u32) -> bool {
        let address = address.trim();
        if address.is_empty() || address.starts_with('-') {
            warn!(address = %address, "refusing to ping invalid address");
            return false;
        }

        let attempts = attempts.max(1);
        let args = ping_args(address, timeout, attempts);
        let budget = probe_budget(timeout, attempts);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match time::timeout(budget, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(err)) => {
                warn!(address = %address, program = %self.program, error = %err, "ping failed to run");
                false
            }
            Err(_elapsed) => {
                debug!(address = %address, "ping timeout");
                false
            }
        }
    }
}

/// Outer bound for one `ping` run; saturates instead of overflowing.
fn probe_budget(timeout: Duration, attempts: u32) -> Duration {
    timeout
        .checked_mul(attempts)
        .and_then(|d| d.checked_add(Duration::from_secs(1)))
        .unwrap_or(Duration::MAX)
}

fn ping_args(address: &str, timeout: Duration, attempts: u32) -> Vec<String> {
    let secs = timeout.as_secs().max(1);
    if cfg!(windows) {
        vec![
            "-n".to_string(),
            attempts.to_string(),
            "-w".to_string(),
            secs.saturating_mul(1000).to_string(),
            address.to_string(),
        ]
    } else {
        vec![
            "-c".to_string(),
            attempts.to_string(),
            "-W".to_string(),
            secs.to_string(),
            address.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn unix_ping_args() {
        assert_eq!(
            ping_args("10.0.0.1", Duration::from_secs(1), 2),
            vec!["-c", "2", "-W", "1", "10.0.0.1"]
        );
    }

    #[test]
    fn sub_second_timeout_rounds_up() {
        let args = ping_args("h", Duration::from_millis(200), 1);
        assert!(args.contains(&"1".to_string()) || args.contains(&"1000".to_string()));
    }

    #[test]
    fn budget_saturates_on_huge_settings() {
        assert_eq!(
            probe_budget(Duration::from_secs(2), 3),
            Duration::from_secs(7)
        );
        assert_eq!(probe_budget(Duration::MAX, u32::MAX), Duration::MAX);
        assert_eq!(
            probe_budget(Duration::from_secs(u64::MAX), 1),
            Duration::MAX
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn huge_attempts_do_not_panic() {
        let prober = PingProber::with_program("true");
        assert!(
            prober
                .is_reachable("127.0.0.1", Duration::from_secs(u64::MAX / 2), u32::MAX)
                .await
        );
    }

    #[tokio::test]
    async fn rejects_option_like_address() {
        let prober = PingProber::default();
        assert!(!prober.is_reachable("-f", Duration::from_secs(1), 1).await);
        assert!(!prober.is_reachable("  ", Duration::from_secs(1), 1).await);
    }

    #[tokio::test]
    async fn missing_binary_maps_to_unreachable() {
        let prober = PingProber::with_program("/nonexistent/snmp-relayd-ping");
        assert!(!prober.is_reachable("127.0.0.1", Duration::from_secs(1), 1).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_decides_reachability() {
        let ok = PingProber::with_program("true");
        assert!(ok.is_reachable("127.0.0.1", Duration::from_secs(1), 1).await);
        let fail = PingProber::with_program("false");
        assert!(!fail.is_reachable("127.0.0.1", Duration::from_secs(1), 1).await);
    }
}
