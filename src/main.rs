use axum::serve;
use clap::Parser;
use reqwest::Client;
use snmp_relayd::collectors::device::{DevicePoller, ProbeSettings};
use snmp_relayd::collectors::probe::PingProber;
use snmp_relayd::collectors::snmp::SnmpFetcher;
use snmp_relayd::config::{Config, ConfigError};
use snmp_relayd::cycle::{run_supervised, CycleContext};
use snmp_relayd::http;
use snmp_relayd::metrics::Metrics;
use snmp_relayd::runtime;
use snmp_relayd::state::{now_unix, State};
use snmp_relayd::upstream::Upstream;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "snmp-relayd")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let runtime = match runtime::build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(error = %err, "failed to start tokio runtime");
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cli));
}

async fn run(cli: Cli) {
    let cfg = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    info!(
        listen = %cfg.listen,
        interval = %cfg.interval,
        inventory_url = %cfg.endpoints.inventory_url,
        "starting snmp-relayd"
    );

    let shared_state = Arc::new(RwLock::new(State::new(now_unix())));
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            std::process::exit(1);
        }
    };

    let client = Client::builder()
        .user_agent(concat!("snmp-relayd/", env!("CARGO_PKG_VERSION")))
        .timeout(cfg.http_timeout())
        .build()
        .unwrap_or_else(|_| Client::new());
    let poller = DevicePoller::new(
        PingProber::with_program(cfg.probe.program.clone()),
        SnmpFetcher::new(Duration::from_millis(cfg.snmp.timeout_ms)).with_metrics(metrics.clone()),
        ProbeSettings {
            timeout: Duration::from_secs(cfg.probe.timeout_secs),
            attempts: cfg.probe.attempts,
        },
    );
    let ctx = Arc::new(CycleContext {
        upstream: Upstream::new(client, cfg.endpoints.clone()),
        poller: Arc::new(poller),
        metrics: metrics.clone(),
        max_concurrent: cfg.polling.max_concurrent_devices,
    });

    if cli.once {
        run_supervised(&ctx, &shared_state).await;
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        let http_state = shared_state.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, http_state);
            let addr: SocketAddr = match cfg.listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %cfg.listen, "invalid listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start HTTP server");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    let scheduler_task = {
        let ctx = ctx.clone();
        let shared_state = shared_state.clone();
        let interval = cfg.cycle_interval();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                run_supervised(&ctx, &shared_state).await;

                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("shutdown requested, stopping scheduler");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("received Ctrl+C, shutting down");

    let _ = shutdown_tx.send(true);

    let _ = scheduler_task.await;
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: &str) -> Result<Config, ConfigError> {
    if !Path::new(path).exists() {
        warn!(path = %path, "config file not found, using built-in defaults");
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    Config::load_from_file(path)
}
