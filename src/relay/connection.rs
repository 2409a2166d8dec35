//! Connection (component D): pairs two Directions, owns the TLS engines,
//! and drives the open/close lifecycle and handshake timer.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::Token;

use crate::relay::buffer_pool::{self, Buffer};
use crate::relay::direction::{Direction, DirectionState};
use crate::relay::filter::{Filter, FilterOutcome};
use crate::relay::stats::Stats;

/// Which half of the connection an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Reads the client socket, writes the server socket.
    ClientToServer,
    /// Reads the server socket, writes the client socket.
    ServerToClient,
}

/// What a single `ready_for_*` call accomplished, for the reactor to decide
/// which interests to (re)arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// No more work without further socket readiness; re-arm READ/WRITE as
    /// appropriate and return to the selector.
    WouldBlock,
    /// The direction has fully stopped.
    Stopped,
    /// Progress was made; caller may want to immediately try the sibling
    /// direction's write (the wrap/unwrap coupling across directions).
    Progressed,
}

pub struct Connection {
    pub id: u64,
    pub client_socket: TcpStream,
    pub server_socket: TcpStream,
    pub client_token: Token,
    pub server_token: Token,

    /// Client-facing engine: this side of the connection acts as the TLS
    /// server. `None` when the client-facing listener is plain.
    pub inbound_tls: Option<rustls::Connection>,
    /// Server-facing engine: this side acts as the TLS client. `None` when
    /// the upstream connection is plain.
    pub outbound_tls: Option<rustls::Connection>,

    pub c2s: Direction,
    pub s2c: Direction,

    pub filter: Option<Arc<dyn Filter>>,
    pub controlled: bool,
    pub server_addr: SocketAddr,
    pub server_connected: bool,
    pub handshake_deadline: Option<Instant>,

    /// True while a TLS engine has been checked out to the delegated-task
    /// runner; the reactor must not touch it until it comes back.
    pub task_in_flight: bool,
}

fn uses_expanding_pool(tls_present: bool) -> bool {
    tls_present
}

fn borrow_buffer(uses_expanding: bool) -> Buffer {
    if uses_expanding {
        buffer_pool::expanding_pool().borrow()
    } else {
        buffer_pool::fixed_pool().borrow()
    }
}

fn recycle_buffer(buf: Buffer, uses_expanding: bool) {
    if uses_expanding {
        buffer_pool::expanding_pool().recycle(buf);
    } else {
        buffer_pool::fixed_pool().recycle(buf);
    }
}

fn grow_for_overflow(buf: &mut Buffer, uses_expanding: bool) {
    let bigger = buf.capacity().saturating_mul(2).max(buf.capacity() + 1);
    if uses_expanding {
        buffer_pool::expanding_pool().use_buffer_size(bigger);
    }
    buf.grow_to(bigger);
}

impl Connection {
    pub fn new(
        id: u64,
        client_socket: TcpStream,
        server_socket: TcpStream,
        client_token: Token,
        server_token: Token,
        inbound_tls: Option<rustls::Connection>,
        outbound_tls: Option<rustls::Connection>,
        filter: Option<Arc<dyn Filter>>,
        controlled: bool,
        server_addr: SocketAddr,
        handshake_timeout: Option<Duration>,
    ) -> Self {
        let has_tls = inbound_tls.is_some() || outbound_tls.is_some();
        Self {
            id,
            client_socket,
            server_socket,
            client_token,
            server_token,
            inbound_tls,
            outbound_tls,
            c2s: Direction::new(true),
            s2c: Direction::new(false),
            filter,
            controlled,
            server_addr,
            server_connected: false,
            handshake_deadline: if has_tls {
                handshake_timeout.map(|d| Instant::now() + d)
            } else {
                None
            },
            task_in_flight: false,
        }
    }

    pub fn is_handshaking(&self) -> bool {
        self.inbound_tls.as_ref().map(|t| t.is_handshaking()).unwrap_or(false)
            || self
                .outbound_tls
                .as_ref()
                .map(|t| t.is_handshaking())
                .unwrap_or(false)
    }

    pub fn handshake_expired(&self) -> bool {
        matches!(self.handshake_deadline, Some(d) if Instant::now() >= d)
    }

    pub fn both_stopped(&self) -> bool {
        self.c2s.stopped && self.s2c.stopped
    }

    fn apply_filter(&self, side: Side, data: &[u8]) -> FilterOutcome {
        match &self.filter {
            None => FilterOutcome::Unchanged,
            Some(f) => match side {
                Side::ClientToServer => f.on_client_data(data),
                Side::ServerToClient => f.on_server_data(data),
            },
        }
    }

    /// Drive the read side of `side`: socket read → (unwrap) → filter,
    /// leaving a ready-to-write chunk in `data_output` on success.
    pub fn ready_for_read(&mut self, side: Side, stats: &Stats) -> io::Result<PumpOutcome> {
        if self.task_in_flight {
            return Ok(PumpOutcome::WouldBlock);
        }
        let Connection {
            client_socket,
            server_socket,
            inbound_tls,
            outbound_tls,
            c2s,
            s2c,
            ..
        } = self;
        let (socket, unwrap_tls, direction): (&mut TcpStream, Option<&mut rustls::Connection>, &mut Direction) =
            match side {
                Side::ClientToServer => (client_socket, inbound_tls.as_mut(), c2s),
                Side::ServerToClient => (server_socket, outbound_tls.as_mut(), s2c),
            };

        if direction.stopped {
            return Ok(PumpOutcome::Stopped);
        }

        let uses_expanding = unwrap_tls.is_some();

        // The single-in-flight-chunk discipline: don't read a second
        // plaintext chunk while one is still waiting to be wrapped/written.
        if direction.data_output.is_some() || direction.network_output.as_ref().map(|b| !b.is_empty()).unwrap_or(false) {
            return Ok(PumpOutcome::WouldBlock);
        }

        if direction.data_input.is_none() {
            match unwrap_tls {
                Some(tls) => match read_and_unwrap(socket, tls) {
                    Ok(None) => return Ok(PumpOutcome::WouldBlock),
                    Ok(Some(plaintext)) => {
                        if plaintext.is_empty() {
                            return Ok(PumpOutcome::WouldBlock);
                        }
                        direction.data_input = Some(plaintext);
                    }
                    Err(ReadError::Eof) => {
                        // close_notify or peer EOF: half-close, drain what
                        // was already in flight via readyForWrite.
                        direction.mark_stopping();
                        tracing::debug!(conn = self.id, "tls peer closed without close_notify");
                        return Ok(PumpOutcome::Progressed);
                    }
                    Err(ReadError::Io(e)) => {
                        direction.mark_stopping();
                        return Err(e);
                    }
                    Err(ReadError::Tls(e)) => {
                        tracing::debug!(conn = self.id, error = %e, "tls unwrap error, stopping direction");
                        direction.mark_stopped();
                        return Ok(PumpOutcome::Stopped);
                    }
                },
                None => {
                    let mut buf = direction
                        .network_input
                        .take()
                        .unwrap_or_else(|| borrow_buffer(uses_expanding));
                    buf.compact();
                    if buf.writable_len() == 0 {
                        grow_for_overflow(&mut buf, uses_expanding);
                    }
                    match socket.read(buf.writable_mut()) {
                        Ok(0) => {
                            recycle_buffer(buf, uses_expanding);
                            direction.mark_stopping();
                            return Ok(PumpOutcome::Progressed);
                        }
                        Ok(n) => {
                            buf.advance_write(n);
                            direction.data_input = Some(buf); // dataInput := networkInput
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            direction.network_input = Some(buf);
                            return Ok(PumpOutcome::WouldBlock);
                        }
                        Err(e) => {
                            direction.mark_stopping();
                            return Err(e);
                        }
                    }
                }
            }
        }

        let Some(mut chunk) = direction.data_input.take() else {
            return Ok(PumpOutcome::WouldBlock);
        };
        if chunk.is_empty() {
            recycle_buffer(chunk, uses_expanding);
            return Ok(PumpOutcome::WouldBlock);
        }

        match self.apply_filter(side, chunk.readable()) {
            FilterOutcome::Dropped => {
                recycle_buffer(chunk, uses_expanding);
                Ok(PumpOutcome::Progressed)
            }
            FilterOutcome::Unchanged => {
                stats.add_bytes(chunk.remaining() as u64);
                let Connection { c2s, s2c, .. } = self;
                let direction = match side {
                    Side::ClientToServer => c2s,
                    Side::ServerToClient => s2c,
                };
                direction.bytes_transferred += chunk.remaining() as u64;
                direction.data_output = Some(chunk);
                Ok(PumpOutcome::Progressed)
            }
            FilterOutcome::Replaced(bytes) => {
                recycle_buffer(chunk, uses_expanding);
                let mut replacement = borrow_buffer(uses_expanding);
                if replacement.writable_len() < bytes.len() {
                    replacement.grow_to(bytes.len());
                }
                replacement.put(&bytes);
                stats.add_bytes(replacement.remaining() as u64);
                let Connection { c2s, s2c, .. } = self;
                let direction = match side {
                    Side::ClientToServer => c2s,
                    Side::ServerToClient => s2c,
                };
                direction.bytes_transferred += replacement.remaining() as u64;
                direction.data_output = Some(replacement);
                Ok(PumpOutcome::Progressed)
            }
        }
    }

    /// Drive the write side of `side`: (wrap) → socket write, flushing
    /// whatever `ready_for_read` staged in `data_output`.
    pub fn ready_for_write(&mut self, side: Side) -> io::Result<PumpOutcome> {
        if self.task_in_flight {
            return Ok(PumpOutcome::WouldBlock);
        }
        // Client→server writes wait for the upstream connect to finish.
        if side == Side::ClientToServer && !self.server_connected {
            return Ok(PumpOutcome::WouldBlock);
        }

        let Connection {
            client_socket,
            server_socket,
            inbound_tls,
            outbound_tls,
            c2s,
            s2c,
            ..
        } = self;
        // Output socket for c2s is the server socket wrapped with the
        // outbound (server-facing) engine; for s2c it's the client socket
        // wrapped with the inbound (client-facing) engine.
        let (socket, wrap_tls, direction): (&mut TcpStream, Option<&mut rustls::Connection>, &mut Direction) =
            match side {
                Side::ClientToServer => (server_socket, outbound_tls.as_mut(), c2s),
                Side::ServerToClient => (client_socket, inbound_tls.as_mut(), s2c),
            };

        if direction.stopped {
            return Ok(PumpOutcome::Stopped);
        }
        let uses_expanding = wrap_tls.is_some();

        if let Some(out) = direction.data_output.take() {
            direction.network_output = Some(out); // flip: dataInput -> dataOutput -> networkOutput
        }

        let Some(mut out) = direction.network_output.take() else {
            // No staged plaintext: still drain whatever handshake records
            // `process_new_packets` queued internally (`NEED_WRAP`). Without
            // this, a bare TLS handshake never gets its outgoing records
            // onto the wire through the reactor path.
            if let Some(tls) = wrap_tls {
                if let Err(e) = flush_handshake(socket, tls) {
                    direction.mark_stopping();
                    return Err(e);
                }
            }
            if direction.stopping {
                let _ = socket.shutdown(std::net::Shutdown::Write);
                direction.mark_stopped();
                return Ok(PumpOutcome::Stopped);
            }
            return Ok(PumpOutcome::WouldBlock);
        };

        match wrap_tls {
            Some(tls) => match wrap_and_write(socket, tls, out.readable()) {
                Ok(written) => {
                    out.advance_read(written);
                    if out.is_empty() {
                        recycle_buffer(out, uses_expanding);
                        if direction.stopping {
                            let _ = socket.shutdown(std::net::Shutdown::Write);
                            direction.mark_stopped();
                            return Ok(PumpOutcome::Stopped);
                        }
                        Ok(PumpOutcome::Progressed)
                    } else {
                        direction.network_output = Some(out);
                        Ok(PumpOutcome::WouldBlock)
                    }
                }
                Err(e) => {
                    direction.network_output = Some(out);
                    if e.kind() == io::ErrorKind::WouldBlock {
                        Ok(PumpOutcome::WouldBlock)
                    } else {
                        direction.mark_stopping();
                        Err(e)
                    }
                }
            },
            None => match socket.write(out.readable()) {
                Ok(0) => {
                    direction.network_output = Some(out);
                    Ok(PumpOutcome::WouldBlock)
                }
                Ok(n) => {
                    out.advance_read(n);
                    if out.is_empty() {
                        recycle_buffer(out, uses_expanding);
                        if direction.stopping {
                            let _ = socket.shutdown(std::net::Shutdown::Write);
                            direction.mark_stopped();
                            return Ok(PumpOutcome::Stopped);
                        }
                        Ok(PumpOutcome::Progressed)
                    } else {
                        direction.network_output = Some(out);
                        Ok(PumpOutcome::Progressed)
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    direction.network_output = Some(out);
                    Ok(PumpOutcome::WouldBlock)
                }
                Err(e) => {
                    direction.network_output = Some(out);
                    direction.mark_stopping();
                    Err(e)
                }
            },
        }
    }

    /// Check for handshake completion on either engine; cancels the
    /// handshake timer and logs at debug, per spec.
    pub fn poll_handshake_completion(&mut self) {
        let was_handshaking = self.handshake_deadline.is_some();
        if was_handshaking && !self.is_handshaking() {
            tracing::debug!(conn = self.id, "TLS handshake finished");
            self.handshake_deadline = None;
        }
    }

    pub fn close(&mut self) {
        self.c2s.mark_stopped();
        self.s2c.mark_stopped();
        let _ = self.client_socket.shutdown(std::net::Shutdown::Both);
        let _ = self.server_socket.shutdown(std::net::Shutdown::Both);
    }
}

enum ReadError {
    Eof,
    Io(io::Error),
    Tls(rustls::Error),
}

/// Pull ciphertext off the socket, run it through `process_new_packets`,
/// and drain whatever plaintext resulted into a freshly borrowed buffer.
/// Returns `Ok(None)` on a clean would-block with nothing produced.
fn read_and_unwrap(socket: &mut TcpStream, tls: &mut rustls::Connection) -> Result<Option<Buffer>, ReadError> {
    match tls.read_tls(socket) {
        Ok(0) => return Err(ReadError::Eof),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => return Err(ReadError::Io(e)),
    }

    if let Err(e) = tls.process_new_packets() {
        return Err(ReadError::Tls(e));
    }

    let mut buf = buffer_pool::expanding_pool().borrow();
    loop {
        if buf.writable_len() == 0 {
            grow_for_overflow(&mut buf, true);
        }
        match tls.reader().read(buf.writable_mut()) {
            Ok(0) => break,
            Ok(n) => buf.advance_write(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(ReadError::Io(e)),
        }
    }
    if buf.is_empty() {
        buffer_pool::expanding_pool().recycle(buf);
        Ok(None)
    } else {
        Ok(Some(buf))
    }
}

/// Drain handshake (or post-handshake alert/close_notify) records the TLS
/// engine has queued internally, with no plaintext chunk involved. This is
/// the `write_tls` call site a bare handshake needs: `process_new_packets`
/// (called from `read_and_unwrap`) advances the handshake state machine and
/// queues its reply records, but nothing drains them unless something here
/// asks the engine to write.
fn flush_handshake(socket: &mut TcpStream, tls: &mut rustls::Connection) -> io::Result<()> {
    while tls.wants_write() {
        match tls.write_tls(socket) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Feed plaintext to the TLS writer, flush ciphertext to the socket, and
/// report how many plaintext bytes were actually consumed (so the caller
/// can advance its own cursor correctly even on a partial socket write).
fn wrap_and_write(socket: &mut TcpStream, tls: &mut rustls::Connection, plaintext: &[u8]) -> io::Result<usize> {
    let consumed = tls.writer().write(plaintext)?;
    while tls.wants_write() {
        match tls.write_tls(socket) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_outcome_variants_are_distinguishable() {
        assert_ne!(PumpOutcome::WouldBlock, PumpOutcome::Stopped);
        assert_ne!(PumpOutcome::Progressed, PumpOutcome::Stopped);
    }

    #[test]
    fn direction_state_plain_by_default() {
        let d = Direction::new(true);
        assert_eq!(d.state, DirectionState::ReadingPlain);
    }
}
