//! The Valve relay core (components A–H).
//!
//! A gated TCP relay: one or more listen endpoints (direct, always open, or
//! controlled, gated by the control port) relay full-duplex bytes to a
//! single upstream. TLS may be terminated on the client side and/or
//! initiated on the server side independently per listen class; an
//! optional filter inspects/rewrites relayed payloads.

pub mod buffer_pool;
pub mod config;
pub mod connection;
pub mod control_port;
pub mod direction;
pub mod error;
pub mod filter;
pub mod port_manager;
pub mod reactor;
pub mod service;
pub mod stats;
pub mod tasks;
pub mod tls;

pub use config::ValveConfig;
pub use error::{RelayError, Result};
pub use service::Service;
pub use stats::{Stats, StatsSnapshot};
