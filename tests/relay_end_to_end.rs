//! Black-box relay scenarios (spec.md §8 scenarios 1-2, plus the "Byte
//! fidelity (TLS both sides)" testable property): a real upstream echo
//! server and real loopback TCP clients driven through the public
//! `relay::Service` facade. The first two scenarios run with TLS disabled
//! everywhere to exercise the plain byte path and the control-gating state
//! machine directly; the third terminates TLS on the direct listener and
//! initiates TLS toward the upstream, so the handshake must complete
//! through the reactor path on both sides of the relay.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use valve::relay::config::TlsMaterial;
use valve::relay::filter::FilterRegistry;
use valve::relay::tls::build_server_config;
use valve::relay::{Service, ValveConfig};

/// A TCP server that lower-cases whatever it reads and echoes it back,
/// matching scenario 1's literal `"HELLO\n"` -> `"hello\n"` upstream.
fn spawn_lowercasing_echo_server(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).expect("bind upstream echo listener");
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            std::thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            let lower: Vec<u8> = buf[..n].iter().map(u8::to_ascii_lowercase).collect();
                            if stream.write_all(&lower).is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
}

fn base_config(server_address: SocketAddr) -> ValveConfig {
    ValveConfig {
        server_address,
        direct_addresses: Vec::new(),
        controlled_addresses: Vec::new(),
        control_address: None,
        control_inverted: false,
        direct_connections_limit: None,
        controlled_connections_limit: None,
        direct_handshake_timeout: Duration::from_secs(5),
        controlled_handshake_timeout: Duration::from_secs(5),
        control_handshake_timeout: Duration::from_secs(5),
        buffer_size: 4096,
        filter_class: None,
        server_tls: TlsMaterial::default(),
        controlled_tls: TlsMaterial::default(),
        direct_tls: TlsMaterial::default(),
        control_tls: TlsMaterial::default(),
        stats_log_enabled: false,
        memory_log_interval: None,
    }
}

fn read_available(stream: &mut TcpStream, expected: usize) -> Vec<u8> {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    while out.len() < expected {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    out
}

/// Scenario 1: a plain-to-plain relay delivers a client write upstream and
/// the upstream's reply back to the client, byte-identical either way.
#[test]
fn plain_relay_echoes_byte_identical() {
    let upstream_addr: SocketAddr = "127.0.0.1:19301".parse().unwrap();
    let direct_addr: SocketAddr = "127.0.0.1:19302".parse().unwrap();
    spawn_lowercasing_echo_server(upstream_addr);
    std::thread::sleep(Duration::from_millis(100));

    let mut config = base_config(upstream_addr);
    config.direct_addresses = vec![direct_addr];

    let registry = FilterRegistry::default();
    let service = Service::start(&config, &registry).expect("start service");
    std::thread::sleep(Duration::from_millis(100));

    let mut client = TcpStream::connect(direct_addr).expect("connect to direct port");
    client.write_all(b"HELLO\n").unwrap();
    let reply = read_available(&mut client, 6);
    assert_eq!(reply, b"hello\n");

    drop(client);
    service.shutdown();
}

/// Scenario 2: with `control.inverted=false`, a controlled connection made
/// before any control socket is held is refused with zero bytes relayed;
/// once a control connection is open, subsequent controlled connects
/// succeed and echo normally.
#[test]
fn controlled_port_gates_on_control_connection() {
    let upstream_addr: SocketAddr = "127.0.0.1:19311".parse().unwrap();
    let controlled_addr: SocketAddr = "127.0.0.1:19312".parse().unwrap();
    let control_addr: SocketAddr = "127.0.0.1:19313".parse().unwrap();
    spawn_lowercasing_echo_server(upstream_addr);
    std::thread::sleep(Duration::from_millis(100));

    let mut config = base_config(upstream_addr);
    config.controlled_addresses = vec![controlled_addr];
    config.control_address = Some(control_addr);
    config.control_inverted = false;

    let registry = FilterRegistry::default();
    let service = Service::start(&config, &registry).expect("start service");
    std::thread::sleep(Duration::from_millis(100));

    // No control held yet: the controlled port refuses at handoff, closing
    // the socket without relaying a byte.
    let mut refused = TcpStream::connect(controlled_addr).expect("connect to controlled port");
    let _ = refused.write_all(b"HELLO\n");
    let reply = read_available(&mut refused, 1);
    assert!(reply.is_empty(), "expected zero bytes before control is held");
    drop(refused);

    // Open and hold a control connection; give the control thread time to
    // accept and resume the controlled Port Manager.
    let control = TcpStream::connect(control_addr).expect("connect to control port");
    std::thread::sleep(Duration::from_millis(200));

    let mut admitted = TcpStream::connect(controlled_addr).expect("connect to controlled port");
    admitted.write_all(b"HELLO\n").unwrap();
    let reply = read_available(&mut admitted, 6);
    assert_eq!(reply, b"hello\n");

    drop(admitted);
    drop(control);
    service.shutdown();
}

fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// Drives one TLS server-side connection to completion: handshake, then a
/// single lower-casing echo of whatever plaintext arrives, matching
/// `spawn_lowercasing_echo_server`'s plain-path behavior but over TLS.
fn run_tls_echo_connection(mut stream: TcpStream, config: Arc<rustls::ServerConfig>) {
    let Ok(mut conn) = rustls::ServerConnection::new(config) else {
        return;
    };
    while conn.is_handshaking() {
        if conn.wants_write() && conn.write_tls(&mut stream).is_err() {
            return;
        }
        if conn.wants_read() {
            match conn.read_tls(&mut stream) {
                Ok(0) => return,
                Ok(_) => {
                    if conn.process_new_packets().is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    }

    loop {
        match conn.read_tls(&mut stream) {
            Ok(0) => return,
            Ok(_) => {}
            Err(_) => return,
        }
        if conn.process_new_packets().is_err() {
            return;
        }
        let mut buf = [0u8; 4096];
        match conn.reader().read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                let lower: Vec<u8> = buf[..n].iter().map(u8::to_ascii_lowercase).collect();
                if conn.writer().write_all(&lower).is_err() {
                    return;
                }
            }
            Err(_) => continue,
        }
        while conn.wants_write() {
            if conn.write_tls(&mut stream).is_err() {
                return;
            }
        }
    }
}

fn spawn_tls_lowercasing_echo_server(addr: SocketAddr, config: Arc<rustls::ServerConfig>) {
    let listener = TcpListener::bind(addr).expect("bind tls upstream listener");
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let config = config.clone();
            std::thread::spawn(move || run_tls_echo_connection(stream, config));
        }
    });
}

/// Scenario "Byte fidelity (TLS both sides)" (spec.md §8): the relay
/// terminates TLS on the direct listener (client side) and initiates TLS
/// toward the upstream (server side). A client writing `"HELLO\n"` over TLS
/// must receive the upstream's `"hello\n"` reply byte-identical, which
/// requires both TLS handshakes to complete through the reactor path.
#[test]
fn tls_both_sides_relay_echoes_byte_identical() {
    let cert_path = fixture_path("test-cert.pem");
    let key_path = fixture_path("test-key.pem");

    let dir = tempfile::tempdir().unwrap();
    let keystore_path = dir.path().join("identity.pem");
    {
        let cert = std::fs::read_to_string(&cert_path).unwrap();
        let key = std::fs::read_to_string(&key_path).unwrap();
        std::fs::write(&keystore_path, format!("{cert}\n{key}")).unwrap();
    }
    let keystore = keystore_path.to_string_lossy().into_owned();

    let upstream_addr: SocketAddr = "127.0.0.1:19321".parse().unwrap();
    let direct_addr: SocketAddr = "127.0.0.1:19322".parse().unwrap();

    let upstream_tls_config = build_server_config(&TlsMaterial {
        keystore: Some(keystore.clone()),
        ..TlsMaterial::default()
    })
    .unwrap()
    .expect("upstream tls config");
    spawn_tls_lowercasing_echo_server(upstream_addr, upstream_tls_config);
    std::thread::sleep(Duration::from_millis(100));

    let mut config = base_config(upstream_addr);
    config.direct_addresses = vec![direct_addr];
    config.direct_tls = TlsMaterial {
        keystore: Some(keystore),
        ..TlsMaterial::default()
    };
    config.server_tls = TlsMaterial {
        truststore: Some(cert_path),
        ..TlsMaterial::default()
    };

    let registry = FilterRegistry::default();
    let service = Service::start(&config, &registry).expect("start service");
    std::thread::sleep(Duration::from_millis(100));

    let mut root_store = rustls::RootCertStore::empty();
    for cert in
        rustls_pemfile::certs(&mut BufReader::new(File::open(fixture_path("test-cert.pem")).unwrap()))
            .collect::<std::io::Result<Vec<_>>>()
            .unwrap()
    {
        root_store.add(cert).unwrap();
    }
    let client_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from("localhost").unwrap();
    let mut client_conn = rustls::ClientConnection::new(client_config, server_name).unwrap();
    let mut stream = TcpStream::connect(direct_addr).expect("connect to direct tls port");
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    while client_conn.is_handshaking() {
        if client_conn.wants_write() {
            client_conn.write_tls(&mut stream).unwrap();
        }
        if client_conn.wants_read() {
            let n = client_conn.read_tls(&mut stream).expect("client handshake read");
            assert_ne!(n, 0, "relay closed connection during handshake");
            client_conn.process_new_packets().expect("client handshake process");
        }
    }

    client_conn.writer().write_all(b"HELLO\n").unwrap();
    while client_conn.wants_write() {
        client_conn.write_tls(&mut stream).unwrap();
    }

    let mut reply = Vec::new();
    while reply.len() < 6 {
        let n = client_conn.read_tls(&mut stream).expect("client read");
        assert_ne!(n, 0, "relay closed connection before full reply arrived");
        client_conn.process_new_packets().expect("client process");
        let mut buf = [0u8; 64];
        if let Ok(n) = client_conn.reader().read(&mut buf) {
            reply.extend_from_slice(&buf[..n]);
        }
    }
    assert_eq!(reply, b"hello\n");

    drop(stream);
    service.shutdown();
}
