//! Control Port (component G): a blocking listener holding at most one
//! control socket at a time, toggling a controlled Port Manager's
//! paused/resumed state on accept/EOF.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::relay::port_manager::PortManager;

/// Whether holding a control connection resumes or pauses the controlled
/// Port Manager.
#[derive(Debug, Clone, Copy)]
pub struct ControlPortConfig {
    pub listen_address: std::net::SocketAddr,
    pub inverted: bool,
    pub handshake_timeout: Option<Duration>,
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

pub struct ControlPort {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ControlPort {
    pub fn start(
        config: ControlPortConfig,
        controlled: Arc<PortManager>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_address)?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let join = std::thread::Builder::new()
            .name("valve-control-port".into())
            .spawn(move || run(listener, config, controlled, thread_shutdown))
            .expect("failed to spawn control-port thread");

        Ok(Self {
            shutdown,
            join: Some(join),
        })
    }

    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Accept blocks indefinitely with no queued connection; there is no
        // portable wakeup short of closing the listener, so shutdown is
        // best-effort and completes on the next accepted/rejected socket.
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ControlPort {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn apply_transition(controlled: &PortManager, inverted: bool, held: bool) {
    let should_resume = held != inverted;
    let result = if should_resume {
        tracing::info!(held, inverted, "control connection state change: resuming controlled port");
        controlled.resume()
    } else {
        tracing::info!(held, inverted, "control connection state change: pausing controlled port");
        controlled.pause();
        Ok(())
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "failed to resume controlled port manager");
    }
}

fn handshake(stream: &mut TcpStream, tls: &Option<Arc<rustls::ServerConfig>>, timeout: Option<Duration>) -> bool {
    let Some(tls_config) = tls else {
        return true;
    };
    let Ok(mut conn) = rustls::ServerConnection::new(tls_config.clone()) else {
        return false;
    };
    let _ = stream.set_read_timeout(timeout);
    while conn.is_handshaking() {
        if conn.wants_write() {
            if conn.write_tls(stream).is_err() {
                let _ = stream.set_read_timeout(None);
                return false;
            }
        }
        if conn.wants_read() {
            match conn.read_tls(stream) {
                Ok(0) => {
                    let _ = stream.set_read_timeout(None);
                    return false;
                }
                Ok(_) => {
                    if conn.process_new_packets().is_err() {
                        let _ = stream.set_read_timeout(None);
                        return false;
                    }
                }
                Err(e) => {
                    let _ = stream.set_read_timeout(None);
                    tracing::debug!(error = %e, "control handshake read failed or timed out");
                    return false;
                }
            }
        }
    }
    let _ = stream.set_read_timeout(None);
    true
}

fn run(
    listener: TcpListener,
    config: ControlPortConfig,
    controlled: Arc<PortManager>,
    shutdown: Arc<AtomicBool>,
) {
    // A brief accept timeout turns the blocking accept loop into a
    // periodic check of `shutdown`, without a portable cross-platform
    // wakeup for a blocking `TcpListener::accept`.
    let _ = listener.set_nonblocking(true);

    loop {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        let (mut stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "control port accept failed");
                continue;
            }
        };
        let _ = stream.set_nonblocking(false);
        tracing::debug!(peer = %peer, "control connection accepted");

        if !handshake(&mut stream, &config.tls, config.handshake_timeout) {
            tracing::debug!(peer = %peer, "control handshake failed or timed out");
            continue;
        }

        apply_transition(&controlled, config.inverted, true);

        // Block on a stream read for liveness: any byte, EOF, or I/O error
        // triggers the inverse transition and a return to accept.
        let mut buf = [0u8; 64];
        loop {
            match stream.read(&mut buf) {
                Ok(_) => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        apply_transition(&controlled, config.inverted, false);
    }
}
