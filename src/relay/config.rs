//! Configuration loading for the Service Facade.
//!
//! A flat `key = value` property file, `#` comments and blank lines
//! ignored, booleans accepted case-insensitively
//! as `true|false|1|0|yes|no|on|off`. Durations are plain seconds or a
//! `<n><unit>` suffix (`s`, `ms`, `m`, `h`).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::relay::error::{RelayError, Result};

#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub certified: bool,
    pub keystore: Option<String>,
    pub keystore_type: Option<String>,
    pub keystore_password: Option<String>,
    pub key_password: Option<String>,
    pub truststore: Option<String>,
    pub truststore_type: Option<String>,
}

impl Default for TlsMaterial {
    fn default() -> Self {
        Self {
            certified: false,
            keystore: None,
            keystore_type: None,
            keystore_password: None,
            key_password: None,
            truststore: None,
            truststore_type: None,
        }
    }
}

impl TlsMaterial {
    /// TLS is enabled in a position when keystore or truststore material
    /// is present for it.
    pub fn is_enabled(&self) -> bool {
        self.keystore.is_some() || self.truststore.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ValveConfig {
    pub server_address: SocketAddr,
    pub direct_addresses: Vec<SocketAddr>,
    pub controlled_addresses: Vec<SocketAddr>,
    pub control_address: Option<SocketAddr>,
    pub control_inverted: bool,
    pub direct_connections_limit: Option<usize>,
    pub controlled_connections_limit: Option<usize>,
    pub direct_handshake_timeout: Duration,
    pub controlled_handshake_timeout: Duration,
    pub control_handshake_timeout: Duration,
    pub buffer_size: usize,
    pub filter_class: Option<String>,
    pub server_tls: TlsMaterial,
    pub controlled_tls: TlsMaterial,
    pub direct_tls: TlsMaterial,
    pub control_tls: TlsMaterial,
    pub stats_log_enabled: bool,
    pub memory_log_interval: Option<Duration>,
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let (num_part, unit) = s.split_at(s.find(|c: char| c.is_alphabetic())?);
    let n: u64 = num_part.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

fn parse_addresses(s: &str) -> Result<Vec<SocketAddr>> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<SocketAddr>()
                .map_err(|e| RelayError::Config(format!("bad address '{p}': {e}")))
        })
        .collect()
}

/// A flat `key = value` property map, with the loader logic split out so
/// unit tests can exercise it without touching the filesystem.
pub struct Properties(HashMap<String, String>);

impl Properties {
    pub fn parse(text: &str) -> Self {
        let mut map = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Properties(map)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    fn tls_material(&self, prefix: &str) -> TlsMaterial {
        TlsMaterial {
            certified: self
                .get(&format!("{prefix}.certified"))
                .and_then(parse_bool)
                .unwrap_or(false),
            keystore: self.get(&format!("{prefix}.keystore")).map(String::from),
            keystore_type: self
                .get(&format!("{prefix}.keystore.type"))
                .map(String::from),
            keystore_password: self
                .get(&format!("{prefix}.keystore.password"))
                .map(String::from),
            key_password: self.get(&format!("{prefix}.key.password")).map(String::from),
            truststore: self.get(&format!("{prefix}.truststore")).map(String::from),
            truststore_type: self
                .get(&format!("{prefix}.truststore.type"))
                .map(String::from),
        }
    }

    pub fn to_config(&self) -> Result<ValveConfig> {
        let server_address = self
            .get("server.address")
            .ok_or_else(|| RelayError::Config("server.address is required".into()))?
            .parse::<SocketAddr>()
            .map_err(|e| RelayError::Config(format!("bad server.address: {e}")))?;

        let direct_addresses = match self.get("direct.addresses") {
            Some(s) if !s.is_empty() => parse_addresses(s)?,
            _ => Vec::new(),
        };
        let controlled_addresses = match self.get("controlled.addresses") {
            Some(s) if !s.is_empty() => parse_addresses(s)?,
            _ => Vec::new(),
        };
        let control_address = match self.get("control.address") {
            Some(s) if !s.is_empty() => Some(
                s.parse::<SocketAddr>()
                    .map_err(|e| RelayError::Config(format!("bad control.address: {e}")))?,
            ),
            _ => None,
        };

        if direct_addresses.is_empty() && controlled_addresses.is_empty() {
            return Err(RelayError::Config(
                "at least one of direct.addresses or controlled.addresses must be configured"
                    .into(),
            ));
        }

        let default_timeout = Duration::from_secs(60);
        Ok(ValveConfig {
            server_address,
            direct_addresses,
            controlled_addresses,
            control_address,
            control_inverted: self
                .get("control.inverted")
                .and_then(parse_bool)
                .unwrap_or(false),
            direct_connections_limit: self
                .get("direct.connections.limit")
                .and_then(|s| s.parse().ok()),
            controlled_connections_limit: self
                .get("controlled.connections.limit")
                .and_then(|s| s.parse().ok()),
            direct_handshake_timeout: self
                .get("direct.handshake.timeout")
                .and_then(parse_duration)
                .unwrap_or(default_timeout),
            controlled_handshake_timeout: self
                .get("controlled.handshake.timeout")
                .and_then(parse_duration)
                .unwrap_or(default_timeout),
            control_handshake_timeout: self
                .get("control.handshake.timeout")
                .and_then(parse_duration)
                .unwrap_or(default_timeout),
            buffer_size: self
                .get("buffer.size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(2048),
            filter_class: self.get("filter.class").map(String::from),
            server_tls: self.tls_material("server"),
            controlled_tls: self.tls_material("controlled"),
            direct_tls: self.tls_material("direct"),
            control_tls: self.tls_material("control"),
            stats_log_enabled: self
                .get("stats.log.enabled")
                .and_then(parse_bool)
                .unwrap_or(false),
            memory_log_interval: self.get("memory.log.interval").and_then(parse_duration),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let props = Properties::parse(
            "server.address = 127.0.0.1:9000\n\
             direct.addresses = 127.0.0.1:9001, 127.0.0.1:9002\n\
             # a comment\n\
             buffer.size=4096\n",
        );
        let cfg = props.to_config().unwrap();
        assert_eq!(cfg.server_address.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.direct_addresses.len(), 2);
        assert_eq!(cfg.buffer_size, 4096);
        assert!(!cfg.control_inverted);
    }

    #[test]
    fn rejects_config_with_no_listen_endpoints() {
        let props = Properties::parse("server.address = 127.0.0.1:9000\n");
        assert!(props.to_config().is_err());
    }

    #[test]
    fn parses_booleans_case_insensitively() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("nope"), None);
    }

    #[test]
    fn parses_durations_with_units() {
        assert_eq!(parse_duration("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
    }
}
