//! Service Facade (component H): wires endpoints from configuration,
//! starts/stops the reactors, and exposes stats.

use std::io;
use std::sync::Arc;

use crate::relay::config::ValveConfig;
use crate::relay::control_port::{ControlPort, ControlPortConfig};
use crate::relay::filter::{Filter, FilterRegistry};
use crate::relay::port_manager::{PortManager, PortManagerConfig, PortTlsConfig};
use crate::relay::stats::{Stats, StatsSnapshot};
use crate::relay::tls;

/// A running Valve service: zero, one, or two Port Managers (direct and/or
/// controlled) and an optional Control Port, all sharing one `Stats`.
pub struct Service {
    direct: Option<PortManager>,
    controlled: Option<Arc<PortManager>>,
    control: Option<ControlPort>,
    stats: Arc<Stats>,
}

impl Service {
    /// Build every configured endpoint and start its reactors. At least one
    /// of `direct.addresses`/`controlled.addresses` must be configured —
    /// enforced already by [`crate::relay::config::Properties::to_config`],
    /// which this constructor trusts.
    pub fn start(config: &ValveConfig, registry: &FilterRegistry) -> io::Result<Self> {
        crate::relay::buffer_pool::init(config.buffer_size, config.buffer_size);
        let stats = Arc::new(Stats::default());

        let filter: Option<Arc<dyn Filter>> = config
            .filter_class
            .as_deref()
            .and_then(|name| registry.build(name))
            .map(Arc::from);

        let upstream_client_config = tls::build_client_config(&config.server_tls)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let direct = if config.direct_addresses.is_empty() {
            None
        } else {
            let listen_server_config = tls::build_server_config(&config.direct_tls)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let pm_config = PortManagerConfig {
                listen_addresses: config.direct_addresses.clone(),
                upstream_address: config.server_address,
                upstream_server_name: None,
                tls: PortTlsConfig {
                    listen_server_config,
                    upstream_client_config: upstream_client_config.clone(),
                },
                connection_limit: config.direct_connections_limit,
                handshake_timeout: Some(config.direct_handshake_timeout),
                filter: filter.clone(),
                controlled: false,
            };
            Some(PortManager::start(pm_config, stats.clone(), false)?)
        };

        let controlled = if config.controlled_addresses.is_empty() {
            None
        } else {
            let listen_server_config = tls::build_server_config(&config.controlled_tls)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let pm_config = PortManagerConfig {
                listen_addresses: config.controlled_addresses.clone(),
                upstream_address: config.server_address,
                upstream_server_name: None,
                tls: PortTlsConfig {
                    listen_server_config,
                    upstream_client_config: upstream_client_config.clone(),
                },
                connection_limit: config.controlled_connections_limit,
                handshake_timeout: Some(config.controlled_handshake_timeout),
                filter: filter.clone(),
                controlled: true,
            };
            // Starts paused unless inverted (inverted: holding control
            // *pauses*, so the controlled port starts resumed and the
            // first control connection pauses it).
            let start_paused = !config.control_inverted;
            Some(Arc::new(PortManager::start(
                pm_config,
                stats.clone(),
                start_paused,
            )?))
        };

        let control = if let Some(control_address) = config.control_address {
            let Some(controlled_pm) = controlled.clone() else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "control.address is configured but controlled.addresses is empty",
                ));
            };
            let control_tls = tls::build_server_config(&config.control_tls)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let cp_config = ControlPortConfig {
                listen_address: control_address,
                inverted: config.control_inverted,
                handshake_timeout: Some(config.control_handshake_timeout),
                tls: control_tls,
            };
            Some(ControlPort::start(cp_config, controlled_pm)?)
        } else {
            None
        };

        Ok(Self {
            direct,
            controlled,
            control,
            stats,
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Orderly shutdown: Control Port, then controlled Port Manager, then
    /// direct Port Manager.
    pub fn shutdown(self) {
        if let Some(control) = self.control {
            control.shutdown();
        }
        if let Some(controlled) = self.controlled {
            if let Ok(pm) = Arc::try_unwrap(controlled) {
                pm.shutdown();
            }
        }
        if let Some(direct) = self.direct {
            direct.shutdown();
        }
        tracing::info!(stats = ?self.stats.snapshot(), "valve service stopped");
    }
}
