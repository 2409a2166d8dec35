//! Valve service binary: loads a property file, starts the relay, and
//! blocks until an interrupt or terminate signal requests shutdown.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use valve::relay::config::Properties;
use valve::relay::filter::FilterRegistry;
use valve::relay::service::Service;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("valve.properties"));

    let properties = match Properties::load(&config_path) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(path = %config_path.display(), error = %e, "failed to read configuration");
            return ExitCode::FAILURE;
        }
    };
    let config = match properties.to_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let registry = FilterRegistry::new();
    let service = match Service::start(&config, &registry) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to start valve service");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        server = %config.server_address,
        direct = config.direct_addresses.len(),
        controlled = config.controlled_addresses.len(),
        control = config.control_address.is_some(),
        "valve service started"
    );

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown_requested.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "failed to install signal handler, shutdown will require SIGKILL");
    }

    let stats_log_enabled = config.stats_log_enabled;
    while !shutdown_requested.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        if stats_log_enabled {
            log_stats_if_due(&service);
        }
    }

    tracing::info!("shutdown requested, stopping valve service");
    service.shutdown();
    ExitCode::SUCCESS
}

/// Stats logging is opt-in (`stats.log.enabled`); the interval is folded
/// into the poll loop rather than a separate timer thread.
fn log_stats_if_due(service: &Service) {
    use std::sync::atomic::AtomicU64;
    static TICKS: AtomicU64 = AtomicU64::new(0);
    // Every ~5s at the 200ms poll granularity above.
    if TICKS.fetch_add(1, Ordering::Relaxed) % 25 == 0 {
        tracing::info!(stats = ?service.stats(), "valve stats");
    }
}
