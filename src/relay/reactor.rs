//! Connections Manager (component E): one reactor thread per running Port
//! Manager, selecting ready keys on a dedicated `mio::Poll` and dispatching
//! to the Connection they belong to.
//!
//! Cross-thread handoff (new connections from the Port Manager's accept
//! reactor, and shutdown) goes through a crossbeam channel paired with a
//! `mio::Waker` so the blocking `poll()` call wakes promptly instead of
//! waiting out its next timeout.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::relay::connection::{Connection, PumpOutcome, Side};
use crate::relay::filter::Filter;
use crate::relay::stats::Stats;

const WAKE_TOKEN: Token = Token(usize::MAX);

/// A client/server socket pair handed off by a Port Manager after a
/// successful accept + non-blocking upstream connect, carrying whatever TLS
/// engines and filter this listen class configures.
pub struct PendingConnection {
    pub client_socket: TcpStream,
    pub server_socket: TcpStream,
    pub inbound_tls: Option<rustls::Connection>,
    pub outbound_tls: Option<rustls::Connection>,
    pub filter: Option<Arc<dyn Filter>>,
    pub controlled: bool,
    pub server_addr: SocketAddr,
    pub handshake_timeout: Option<Duration>,
}

enum WakeMessage {
    Admit(PendingConnection),
    Shutdown,
}

/// A cheap, cloneable handle used by a Port Manager (or Control Port) to
/// push work at a running Connections Manager without touching its thread.
#[derive(Clone)]
pub struct ConnectionsManagerHandle {
    sender: Sender<WakeMessage>,
    waker: Arc<Waker>,
    active: Arc<AtomicUsize>,
}

impl ConnectionsManagerHandle {
    pub fn admit(&self, pending: PendingConnection) {
        self.active.fetch_add(1, Ordering::AcqRel);
        let _ = self.sender.send(WakeMessage::Admit(pending));
        let _ = self.waker.wake();
    }

    /// Connections currently open; used by the Port Manager's admission
    /// counter (eventually consistent — the count can lag a just-closed
    /// connection by one reactor tick).
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Owns the reactor thread. Dropping this (after calling [`Self::shutdown`])
/// joins the thread; every still-open Connection is closed first.
pub struct ConnectionsManager {
    handle: ConnectionsManagerHandle,
    join: Option<JoinHandle<()>>,
}

impl ConnectionsManager {
    pub fn start(stats: Arc<Stats>) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let (sender, receiver) = channel::unbounded();
        let active = Arc::new(AtomicUsize::new(0));
        let handle = ConnectionsManagerHandle {
            sender,
            waker,
            active: active.clone(),
        };

        let join = std::thread::Builder::new()
            .name("valve-connections-manager".into())
            .spawn(move || run(poll, receiver, stats, active))
            .expect("failed to spawn connections-manager thread");

        Ok(Self {
            handle,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> ConnectionsManagerHandle {
        self.handle.clone()
    }

    /// Stop the reactor: every in-flight Connection is closed without being
    /// drained further, matching `pause()`'s semantics.
    pub fn shutdown(mut self) {
        let _ = self.handle.sender.send(WakeMessage::Shutdown);
        let _ = self.handle.waker.wake();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ConnectionsManager {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.handle.sender.send(WakeMessage::Shutdown);
            let _ = self.handle.waker.wake();
            if let Some(join) = self.join.take() {
                let _ = join.join();
            }
        }
    }
}

fn next_handshake_timeout(connections: &HashMap<u64, Connection>) -> Option<Duration> {
    connections
        .values()
        .filter_map(|c| c.handshake_deadline)
        .min()
        .map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

/// Compute the interest set a direction currently wants registered for its
/// input/output sockets, so each readiness callback re-arms exactly what it
/// still needs rather than leaving stale interest around.
fn wants_read(stopped: bool, data_input_absent: bool, no_output_pending: bool) -> bool {
    !stopped && data_input_absent && no_output_pending
}

fn wants_write(stopped: bool, output_pending: bool, stopping: bool, tls_wants_write: bool) -> bool {
    !stopped && (output_pending || stopping || tls_wants_write)
}

/// Re-register both sockets of `conn` with whatever interest each direction
/// still needs after a readiness callback, per the explicit state-machine
/// design (no persistent edge-triggered interest left stale).
fn rearm_mut(poll: &Poll, conn: &mut Connection) {
    let c2s_output_pending = conn.c2s.data_output.is_some()
        || conn
            .c2s
            .network_output
            .as_ref()
            .map(|b| !b.is_empty())
            .unwrap_or(false);
    let s2c_output_pending = conn.s2c.data_output.is_some()
        || conn
            .s2c
            .network_output
            .as_ref()
            .map(|b| !b.is_empty())
            .unwrap_or(false);

    // The client socket is written by the s2c direction through the
    // client-facing (inbound) engine; the server socket is written by the
    // c2s direction through the server-facing (outbound) engine. A
    // handshake-only exchange has no staged plaintext but still needs
    // WRITABLE interest whenever its engine has queued outgoing records.
    let client_tls_wants_write = conn
        .inbound_tls
        .as_ref()
        .map(|t| t.wants_write())
        .unwrap_or(false);
    let server_tls_wants_write = conn
        .outbound_tls
        .as_ref()
        .map(|t| t.wants_write())
        .unwrap_or(false);

    let client_read = wants_read(conn.c2s.stopped, conn.c2s.data_input.is_none(), !c2s_output_pending);
    let client_write = wants_write(conn.s2c.stopped, s2c_output_pending, conn.s2c.stopping, client_tls_wants_write);
    let server_read = wants_read(conn.s2c.stopped, conn.s2c.data_input.is_none(), !s2c_output_pending);
    let server_write = wants_write(conn.c2s.stopped, c2s_output_pending, conn.c2s.stopping, server_tls_wants_write);

    let client_interest = match (client_read, client_write) {
        (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    };
    let server_interest = match (server_read, server_write) {
        (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    };

    if let Some(interest) = client_interest {
        let _ = poll
            .registry()
            .reregister(&mut conn.client_socket, conn.client_token, interest);
    }
    if let Some(interest) = server_interest {
        let _ = poll
            .registry()
            .reregister(&mut conn.server_socket, conn.server_token, interest);
    }
}

fn finish_connect(conn: &mut Connection, stats: &Stats) -> bool {
    match conn.server_socket.take_error() {
        Ok(None) => {
            if let Ok(sock_ref) = Ok::<_, io::Error>(socket2::SockRef::from(&conn.server_socket)) {
                let _ = sock_ref.set_nodelay(true);
                let _ = sock_ref.set_keepalive(true);
            }
            conn.server_connected = true;
            true
        }
        Ok(Some(_)) | Err(_) => {
            tracing::warn!(conn = conn.id, "upstream connect failed");
            stats.inc_failed();
            false
        }
    }
}

fn handle_ready(conn: &mut Connection, token: Token, stats: &Stats) {
    let is_client = token == conn.client_token;
    let is_server = token == conn.server_token;
    if !is_client && !is_server {
        return;
    }

    if is_server && !conn.server_connected {
        if !finish_connect(conn, stats) {
            conn.close();
            return;
        }
    }

    if is_server {
        // WRITE ready on server key: drive client→server write; if the
        // client side terminates TLS, also pump its read side (the
        // handshake may need application reads interleaved with wraps).
        let _ = conn.ready_for_write(Side::ClientToServer);
        if conn.inbound_tls.is_some() {
            let _ = conn.ready_for_read(Side::ClientToServer, stats);
        }
        let _ = conn.ready_for_read(Side::ServerToClient, stats);
    }

    if is_client {
        let _ = conn.ready_for_write(Side::ServerToClient);
        if conn.outbound_tls.is_some() {
            let _ = conn.ready_for_read(Side::ServerToClient, stats);
        }
        let _ = conn.ready_for_read(Side::ClientToServer, stats);
    }

    conn.poll_handshake_completion();
}

fn run(poll: Poll, receiver: Receiver<WakeMessage>, stats: Arc<Stats>, active: Arc<AtomicUsize>) {
    let mut events = Events::with_capacity(1024);
    let mut connections: HashMap<u64, Connection> = HashMap::new();
    let mut tokens: HashMap<Token, u64> = HashMap::new();
    let mut next_token = 0usize;
    let mut next_id = 0u64;

    loop {
        let timeout = next_handshake_timeout(&connections).or(Some(Duration::from_secs(5)));
        if let Err(e) = poll.poll(&mut events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::error!(error = %e, "connections-manager poll failed");
            break;
        }

        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            if let Some(&id) = tokens.get(&event.token()) {
                if let Some(conn) = connections.get_mut(&id) {
                    handle_ready(conn, event.token(), &stats);
                    rearm_mut(&poll, conn);
                }
            }
        }

        let mut shutting_down = false;
        while let Ok(msg) = receiver.try_recv() {
            match msg {
                WakeMessage::Admit(mut pending) => {
                    let id = next_id;
                    next_id += 1;
                    let client_token = Token(next_token);
                    next_token += 1;
                    let server_token = Token(next_token);
                    next_token += 1;

                    if poll
                        .registry()
                        .register(&mut pending.client_socket, client_token, Interest::READABLE)
                        .is_err()
                        || poll
                            .registry()
                            .register(&mut pending.server_socket, server_token, Interest::WRITABLE)
                            .is_err()
                    {
                        stats.inc_failed();
                        continue;
                    }

                    stats.inc_accepted();
                    let conn = Connection::new(
                        id,
                        pending.client_socket,
                        pending.server_socket,
                        client_token,
                        server_token,
                        pending.inbound_tls,
                        pending.outbound_tls,
                        pending.filter,
                        pending.controlled,
                        pending.server_addr,
                        pending.handshake_timeout,
                    );
                    tokens.insert(client_token, id);
                    tokens.insert(server_token, id);
                    connections.insert(id, conn);
                }
                WakeMessage::Shutdown => {
                    shutting_down = true;
                }
            }
        }
        if shutting_down {
            for (_, mut conn) in connections.drain() {
                conn.close();
            }
            break;
        }

        let now_expired: Vec<u64> = connections
            .iter()
            .filter(|(_, c)| c.handshake_expired())
            .map(|(id, _)| *id)
            .collect();
        for id in now_expired {
            if let Some(mut conn) = connections.remove(&id) {
                tracing::info!(conn = id, "handshake timeout expired, closing connection");
                tokens.remove(&conn.client_token);
                tokens.remove(&conn.server_token);
                conn.close();
                stats.inc_closed();
                active.fetch_sub(1, Ordering::AcqRel);
            }
        }

        let done: Vec<u64> = connections
            .iter()
            .filter(|(_, c)| c.both_stopped())
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            if let Some(mut conn) = connections.remove(&id) {
                tokens.remove(&conn.client_token);
                tokens.remove(&conn.server_token);
                conn.close();
                stats.inc_closed();
                active.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}
