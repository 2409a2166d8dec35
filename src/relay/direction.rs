//! Per-half-connection state machine (component C).
//!
//! A `Direction` is one half-duplex pipe: bytes flow
//! `input socket → [TLS unwrap] → filter → [TLS wrap] → output socket`.
//! The actual socket and TLS-engine access lives on the owning
//! [`crate::relay::connection::Connection`] (which holds both Directions of
//! a connection plus whichever TLS engines are configured); this module
//! owns the buffers, flags, and the pure bookkeeping around them, so the
//! single-in-flight-chunk discipline and the explicit state transitions
//! are in one place and unit-testable without a real socket.

use crate::relay::buffer_pool::Buffer;

/// Explicit states a Direction moves through, per the reactor-driven state
/// machine design (no host exception-based control flow).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionState {
    /// No TLS, or TLS already past its handshake: plain read/write pumping.
    ReadingPlain,
    /// A TLS handshake is in progress on this connection.
    Handshaking,
    /// Plaintext is ready and moving through filter/wrap toward the peer.
    Forwarding,
    /// The peer half-closed; draining whatever was already in flight before
    /// this Direction fully stops.
    Draining,
    /// Fully stopped; the owning Connection may now tear down.
    Stopped,
}

/// One half-duplex pipe of a Connection.
pub struct Direction {
    pub from_client: bool,
    pub state: DirectionState,

    /// Ciphertext (or, for a plain direction, the raw bytes) most recently
    /// read from the socket and not yet handed to TLS/filter.
    pub network_input: Option<Buffer>,
    /// Plaintext produced by unwrap (or aliased straight from
    /// `network_input` on a plain direction), awaiting the filter.
    pub data_input: Option<Buffer>,
    /// Plaintext that survived the filter, awaiting wrap (or aliasing) into
    /// `network_output`.
    pub data_output: Option<Buffer>,
    /// Bytes ready to write to the output socket.
    pub network_output: Option<Buffer>,

    pub stopping: bool,
    pub stopped: bool,
    pub bytes_transferred: u64,
}

impl Direction {
    pub fn new(from_client: bool) -> Self {
        Self {
            from_client,
            state: DirectionState::ReadingPlain,
            network_input: None,
            data_input: None,
            data_output: None,
            network_output: None,
            stopping: false,
            stopped: false,
            bytes_transferred: 0,
        }
    }

    /// Invariant check: at most one in-flight chunk across
    /// data_input/data_output/network_output at any time.
    pub fn at_most_one_in_flight(&self) -> bool {
        let occupied = [
            self.data_input.as_ref().map(|b| !b.is_empty()).unwrap_or(false),
            self.data_output.as_ref().map(|b| !b.is_empty()).unwrap_or(false),
            self.network_output
                .as_ref()
                .map(|b| !b.is_empty())
                .unwrap_or(false),
        ];
        occupied.iter().filter(|o| **o).count() <= 1
    }

    pub fn mark_stopping(&mut self) {
        self.stopping = true;
    }

    pub fn mark_stopped(&mut self) {
        self.stopping = true;
        self.stopped = true;
        self.state = DirectionState::Stopped;
    }

    pub fn is_idle(&self) -> bool {
        self.network_input.as_ref().map(|b| b.is_empty()).unwrap_or(true)
            && self.data_input.as_ref().map(|b| b.is_empty()).unwrap_or(true)
            && self.data_output.as_ref().map(|b| b.is_empty()).unwrap_or(true)
            && self.network_output.as_ref().map(|b| b.is_empty()).unwrap_or(true)
    }
}
