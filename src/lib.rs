//! Valve — a gated TCP relay with TLS interposition and an out-of-band
//! control channel, plus a read-only SQL driver over a remote time-series
//! store.
//!
//! The two halves share nothing but the crate boundary: [`relay`] is the
//! event-driven byte relay (buffer pools, the per-direction state machine,
//! port admission, the control port), and [`sql`] is the tokenizer, parser
//! and result-paging engine for a narrow point-value query language.

pub mod relay;
pub mod sql;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
