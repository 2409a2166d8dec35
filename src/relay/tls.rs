//! TLS configuration factory.
//!
//! Keystore/truststore construction is made concrete for four independent
//! positions
//! (server-upstream, controlled-listen, direct-listen, control-listen) by
//! building `rustls` client/server configs from PEM material. `keystore`
//! names the identity (cert chain + private key) PEM file; `truststore`
//! names a CA bundle PEM file used either for server-side client-cert
//! verification (mutual TLS) or client-side server verification.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::relay::config::TlsMaterial;
use crate::relay::error::{RelayError, Result};

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(RelayError::Io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(RelayError::Io)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(RelayError::Io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(RelayError::Io)?
        .ok_or_else(|| RelayError::Config(format!("no private key found in {path}")))
}

fn load_root_store(path: &str) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    for cert in load_certs(path)? {
        store
            .add(cert)
            .map_err(|e| RelayError::Config(format!("invalid CA certificate in {path}: {e}")))?;
    }
    Ok(store)
}

/// Build a server-side TLS acceptor config (this position terminates TLS
/// as the TLS *server*) if `material` enables TLS, else `None`.
pub fn build_server_config(material: &TlsMaterial) -> Result<Option<Arc<ServerConfig>>> {
    if !material.is_enabled() {
        return Ok(None);
    }
    let keystore = material
        .keystore
        .as_ref()
        .ok_or_else(|| RelayError::Config("server TLS position requires a keystore".into()))?;
    let certs = load_certs(keystore)?;
    let key = load_private_key(keystore)?;

    let builder = ServerConfig::builder();
    let config = if let Some(truststore) = &material.truststore {
        let roots = load_root_store(truststore)?;
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| RelayError::Config(format!("client verifier build failed: {e}")))?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(|e| RelayError::Config(format!("invalid server identity: {e}")))?
    } else {
        builder
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| RelayError::Config(format!("invalid server identity: {e}")))?
    };
    Ok(Some(Arc::new(config)))
}

/// Build a client-side TLS connector config (this position initiates TLS
/// as the TLS *client*, used for the upstream/server position) if
/// `material` enables TLS, else `None`.
pub fn build_client_config(material: &TlsMaterial) -> Result<Option<Arc<ClientConfig>>> {
    if !material.is_enabled() {
        return Ok(None);
    }
    let roots = if let Some(truststore) = &material.truststore {
        load_root_store(truststore)?
    } else {
        RootCertStore::empty()
    };
    let builder = ClientConfig::builder().with_root_certificates(roots);

    let config = if let Some(keystore) = &material.keystore {
        let certs = load_certs(keystore)?;
        let key = load_private_key(keystore)?;
        builder
            .with_client_auth_cert(certs, key)
            .map_err(|e| RelayError::Config(format!("invalid client identity: {e}")))?
    } else {
        builder.with_no_client_auth()
    };
    Ok(Some(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // A minimal self-signed cert/key pair, PEM-encoded, for load-path tests.
    // Generated offline once; exercised here purely as fixture I/O, not as
    // a cryptographic validity check.
    const TEST_CERT: &str = include_str!("../../tests/fixtures/test-cert.pem");
    const TEST_KEY: &str = include_str!("../../tests/fixtures/test-key.pem");

    #[test]
    fn disabled_material_yields_no_config() {
        let material = TlsMaterial::default();
        assert!(build_server_config(&material).unwrap().is_none());
        assert!(build_client_config(&material).unwrap().is_none());
    }

    #[test]
    fn server_config_loads_from_pem() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = dir.path().join("identity.pem");
        let mut f = File::create(&keystore).unwrap();
        write!(f, "{TEST_CERT}\n{TEST_KEY}").unwrap();

        let material = TlsMaterial {
            keystore: Some(keystore.to_string_lossy().into_owned()),
            ..TlsMaterial::default()
        };
        let config = build_server_config(&material).unwrap();
        assert!(config.is_some());
    }
}
