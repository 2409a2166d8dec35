//! Port Manager (component F): a second reactor thread handling only
//! `ACCEPT` on its listen channels, admission counting, and pause/resume.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use rustls::{ClientConfig, ServerConfig};
use rustls_pki_types::ServerName;

use crate::relay::filter::Filter;
use crate::relay::reactor::{ConnectionsManager, PendingConnection};
use crate::relay::stats::Stats;
use std::time::Duration;

const WAKE_TOKEN: Token = Token(usize::MAX);

/// TLS configuration for one listen class: a server config to terminate
/// TLS on the client side, and a client config to initiate TLS toward the
/// upstream (used only by the `server.*` position in practice, but kept
/// uniform across classes).
#[derive(Clone, Default)]
pub struct PortTlsConfig {
    pub listen_server_config: Option<Arc<ServerConfig>>,
    pub upstream_client_config: Option<Arc<ClientConfig>>,
}

/// Everything a Port Manager needs to admit and hand off a connection: the
/// upstream address, per-class TLS material, the admission limit, and an
/// optional filter.
pub struct PortManagerConfig {
    pub listen_addresses: Vec<SocketAddr>,
    pub upstream_address: SocketAddr,
    pub upstream_server_name: Option<String>,
    pub tls: PortTlsConfig,
    pub connection_limit: Option<usize>,
    pub handshake_timeout: Option<Duration>,
    pub filter: Option<Arc<dyn Filter>>,
    pub controlled: bool,
}

enum ControlMessage {
    Shutdown,
}

/// Runs its own accept reactor thread. Holds a [`ConnectionsManager`] while
/// `resumed`; `pause()` tears that down (closing in-flight Connections) and
/// `resume()` starts a fresh one — accepts still happen while paused, but
/// every handoff is refused.
pub struct PortManager {
    config: Arc<PortManagerConfig>,
    stats: Arc<Stats>,
    accepted: Arc<AtomicUsize>,
    manager: Arc<Mutex<Option<ConnectionsManager>>>,
    control_tx: crossbeam::channel::Sender<ControlMessage>,
    waker: Arc<Waker>,
    join: Option<JoinHandle<()>>,
}

impl PortManager {
    /// Build and start the accept reactor. The Connections Manager starts
    /// immediately (`resumed`) unless `start_paused` is set — used for a
    /// controlled port class with a non-inverted control port, which must
    /// begin life paused until a control connection is held.
    pub fn start(
        config: PortManagerConfig,
        stats: Arc<Stats>,
        start_paused: bool,
    ) -> io::Result<Self> {
        let config = Arc::new(config);
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let (control_tx, control_rx) = crossbeam::channel::unbounded();

        let mut listeners = Vec::new();
        for (i, addr) in config.listen_addresses.iter().enumerate() {
            let mut listener = TcpListener::bind(*addr)?;
            let token = Token(i);
            poll.registry()
                .register(&mut listener, token, Interest::READABLE)?;
            listeners.push((token, listener));
        }

        let manager = if start_paused {
            None
        } else {
            Some(ConnectionsManager::start(stats.clone())?)
        };
        let manager = Arc::new(Mutex::new(manager));

        let thread_config = config.clone();
        let thread_stats = stats.clone();
        let thread_manager = manager.clone();
        let accepted = Arc::new(AtomicUsize::new(0));
        let thread_accepted = accepted.clone();

        let join = std::thread::Builder::new()
            .name("valve-port-manager".into())
            .spawn(move || {
                accept_loop(
                    poll,
                    listeners,
                    control_rx,
                    thread_config,
                    thread_stats,
                    thread_manager,
                    thread_accepted,
                )
            })
            .expect("failed to spawn port-manager thread");

        Ok(Self {
            config,
            stats,
            accepted,
            manager,
            control_tx,
            waker,
            join: Some(join),
        })
    }

    pub fn is_resumed(&self) -> bool {
        self.manager.lock().unwrap().is_some()
    }

    /// Stop the Connections Manager; accepts on this Port Manager's
    /// listeners still occur but are refused at handoff until `resume()`.
    pub fn pause(&self) {
        let mut guard = self.manager.lock().unwrap();
        if let Some(cm) = guard.take() {
            cm.shutdown();
            self.stats.inc_paused();
        }
    }

    /// Start a fresh Connections Manager.
    pub fn resume(&self) -> io::Result<()> {
        let mut guard = self.manager.lock().unwrap();
        if guard.is_none() {
            *guard = Some(ConnectionsManager::start(self.stats.clone())?);
            self.stats.inc_resumed();
        }
        Ok(())
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.load(Ordering::Acquire)
    }

    pub fn shutdown(mut self) {
        let _ = self.control_tx.send(ControlMessage::Shutdown);
        let _ = self.waker.wake();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        self.pause();
    }
}

impl Drop for PortManager {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.control_tx.send(ControlMessage::Shutdown);
            let _ = self.waker.wake();
            let _ = join.join();
        }
    }
}

fn build_tls_engines(
    config: &PortManagerConfig,
) -> (Option<rustls::Connection>, Option<rustls::Connection>) {
    let inbound = config
        .tls
        .listen_server_config
        .as_ref()
        .and_then(|sc| rustls::ServerConnection::new(sc.clone()).ok())
        .map(rustls::Connection::Server);

    let outbound = config.tls.upstream_client_config.as_ref().and_then(|cc| {
        let name = config
            .upstream_server_name
            .clone()
            .unwrap_or_else(|| config.upstream_address.ip().to_string());
        let server_name = ServerName::try_from(name).ok()?;
        rustls::ClientConnection::new(cc.clone(), server_name)
            .ok()
            .map(rustls::Connection::Client)
    });

    (inbound, outbound)
}

#[allow(clippy::too_many_arguments)]
fn accept_loop(
    poll: Poll,
    mut listeners: Vec<(Token, TcpListener)>,
    control_rx: crossbeam::channel::Receiver<ControlMessage>,
    config: Arc<PortManagerConfig>,
    stats: Arc<Stats>,
    manager: Arc<Mutex<Option<ConnectionsManager>>>,
    accepted: Arc<AtomicUsize>,
) {
    let mut events = Events::with_capacity(256);
    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::error!(error = %e, "port-manager poll failed");
            break;
        }

        let mut should_stop = false;
        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            if let Some((_, listener)) = listeners.iter_mut().find(|(t, _)| *t == event.token()) {
                loop {
                    match listener.accept() {
                        Ok((stream, peer)) => {
                            handle_accept(stream, peer, &config, &stats, &manager, &accepted);
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            break;
                        }
                    }
                }
            }
        }

        while let Ok(msg) = control_rx.try_recv() {
            match msg {
                ControlMessage::Shutdown => should_stop = true,
            }
        }
        if should_stop {
            break;
        }
    }
}

fn handle_accept(
    client_stream: TcpStream,
    peer: SocketAddr,
    config: &Arc<PortManagerConfig>,
    stats: &Arc<Stats>,
    manager: &Arc<Mutex<Option<ConnectionsManager>>>,
    accepted: &Arc<AtomicUsize>,
) {
    let guard = manager.lock().unwrap();
    let Some(cm) = guard.as_ref() else {
        // Paused: refuse at handoff.
        stats.inc_refused();
        drop(client_stream);
        return;
    };

    if let Some(limit) = config.connection_limit {
        if cm.handle().active_count() >= limit {
            stats.inc_refused();
            tracing::debug!(peer = %peer, "admission limit reached, refusing connection");
            drop(client_stream);
            return;
        }
    }

    let server_socket = match TcpStream::connect(config.upstream_address) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "non-blocking upstream connect failed to start");
            stats.inc_failed();
            return;
        }
    };

    let (inbound_tls, outbound_tls) = build_tls_engines(config);
    accepted.fetch_add(1, Ordering::AcqRel);

    let pending = PendingConnection {
        client_socket: client_stream,
        server_socket,
        inbound_tls,
        outbound_tls,
        filter: config.filter.clone(),
        controlled: config.controlled,
        server_addr: config.upstream_address,
        handshake_timeout: config.handshake_timeout,
    };
    cm.handle().admit(pending);
}
