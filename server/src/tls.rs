//! Optional TLS listener.
//!
//! Classroom deployments terminate TLS at the relay when a self-signed
//! `localhost` certificate pair sits next to the binary. Discovery or load
//! failure is never fatal: the relay logs and keeps serving plain only.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("certificate file held no certificates")]
    EmptyCertFile,
    #[error("no private key in key file")]
    MissingKey,
    #[error("invalid certificate or key: {0}")]
    Rustls(#[from] rustls::Error),
}

/// A discovered certificate/key pair.
#[derive(Debug, Clone)]
pub struct CertPair {
    pub cert: PathBuf,
    pub key: PathBuf,
}

// =============================================================================
// DISCOVERY
// =============================================================================

/// Search a directory, then its parent, for a `localhost` PEM pair:
/// a `*-key.pem` plus a non-key `*.pem`, both with `localhost` in the name.
#[must_use]
pub fn find_cert_files(start: &Path) -> Option<CertPair> {
    let mut dirs = vec![start.to_path_buf()];
    if let Some(parent) = start.parent() {
        dirs.push(parent.to_path_buf());
    }

    for dir in dirs {
        if let Some(pair) = scan_dir(&dir) {
            return Some(pair);
        }
    }
    None
}

fn scan_dir(dir: &Path) -> Option<CertPair> {
    let entries = std::fs::read_dir(dir).ok()?;

    let mut key = None;
    let mut cert = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".pem") || !name.contains("localhost") {
            continue;
        }
        if name.contains("-key.pem") {
            key.get_or_insert_with(|| entry.path());
        } else {
            cert.get_or_insert_with(|| entry.path());
        }
    }

    match (cert, key) {
        (Some(cert), Some(key)) => Some(CertPair { cert, key }),
        _ => None,
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Build a rustls server config from a discovered pair.
///
/// # Errors
///
/// Returns a [`TlsError`] when either file is unreadable or malformed.
pub fn server_config(pair: &CertPair) -> Result<rustls::ServerConfig, TlsError> {
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(&pair.cert)?))
        .collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(TlsError::EmptyCertFile);
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(&pair.key)?))?
        .ok_or(TlsError::MissingKey)?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    // Websocket upgrades ride HTTP/1.1.
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

// =============================================================================
// SERVE
// =============================================================================

/// Accept loop for the TLS listener: handshake each connection, then hand it
/// to the router. Per-connection failures are logged and never take the
/// listener down.
pub async fn serve_tls(listener: TcpListener, config: rustls::ServerConfig, app: Router) {
    let acceptor = TlsAcceptor::from(Arc::new(config));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "tls: accept failed");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(tls_stream) => tls_stream,
                Err(e) => {
                    warn!(%peer, error = %e, "tls: handshake failed");
                    return;
                }
            };

            let service = TowerToHyperService::new(app);
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(tls_stream), service)
                .await
            {
                debug!(%peer, error = %e, "tls: connection ended with error");
            }
        });
    }
}

#[cfg(test)]
#[path = "tls_test.rs"]
mod tests;
