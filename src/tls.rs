//! TLS acceptor construction
//!
//! Loads a PEM certificate chain and private key and wraps them in a
//! `TlsAcceptor`. The handshake itself happens per connection in the server.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::{Certificate, PrivateKey, ServerConfig};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use crate::error::AppError;

/// Build a TLS acceptor from PEM files
///
/// The key file may hold a PKCS#8 or an RSA private key; the first key found
/// is used.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, AppError> {
    let cert_chain = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| AppError::Tls(format!("Failed to build TLS configuration: {}", e)))?;

    info!("TLS configuration loaded from {}", cert_path.display());
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<Certificate>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::Tls(format!(
            "Failed to open certificate file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let mut reader = BufReader::new(file);

    let certs: Vec<Certificate> = rustls_pemfile::certs(&mut reader)
        .map_err(|e| {
            AppError::Tls(format!(
                "Failed to parse certificate file '{}': {}",
                path.display(),
                e
            ))
        })?
        .into_iter()
        .map(Certificate)
        .collect();

    if certs.is_empty() {
        return Err(AppError::Tls(format!(
            "No certificates found in '{}'",
            path.display()
        )));
    }
    debug!("Certificate chain contains {} certificates", certs.len());
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKey, AppError> {
    let open = || {
        File::open(path).map(BufReader::new).map_err(|e| {
            AppError::Tls(format!(
                "Failed to open private key file '{}': {}",
                path.display(),
                e
            ))
        })
    };
    let parse_err = |e: std::io::Error| {
        AppError::Tls(format!(
            "Failed to parse private key from '{}': {}",
            path.display(),
            e
        ))
    };

    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut open()?).map_err(parse_err)?;
    if keys.is_empty() {
        keys = rustls_pemfile::rsa_private_keys(&mut open()?).map_err(parse_err)?;
    }

    keys.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| AppError::Tls(format!("No private keys found in '{}'", path.display())))
}
