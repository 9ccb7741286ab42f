//! Builds a `rustls` client connector from `SslOptions`, the same
//! certificate-loading shape as a typical server-side `load_tls_config`,
//! mirrored for a client handshake.

use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsConnector;

use crate::config::SslOptions;
use crate::errors::{Error, Result};

static CRYPTO_PROVIDER: OnceLock<()> = OnceLock::new();

fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.get_or_init(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| Error::Tls(format!("failed to open '{path}': {e}")))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("failed to parse certificates in '{path}': {e}")))
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| Error::Tls(format!("failed to open '{path}': {e}")))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| Error::Tls(format!("failed to parse private key in '{path}': {e}")))?
        .ok_or_else(|| Error::Tls(format!("no private key found in '{path}'")))
}

/// Builds a [`TlsConnector`] from `opts`. `ca_cert_path` seeds the trusted
/// root store (an empty store trusts nothing, rejecting every handshake,
/// which is the safe default absent an explicit CA); a client cert/key pair
/// enables mutual TLS when both are set.
pub fn build_connector(opts: &SslOptions) -> Result<TlsConnector> {
    ensure_crypto_provider();

    let mut roots = rustls::RootCertStore::empty();
    if let Some(ca_path) = &opts.ca_cert_path {
        for cert in load_certs(ca_path)? {
            roots
                .add(cert)
                .map_err(|e| Error::Tls(format!("invalid CA certificate in '{ca_path}': {e}")))?;
        }
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

    let config = match (&opts.client_cert_path, &opts.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| Error::Tls(format!("failed to build client TLS config: {e}")))?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}
