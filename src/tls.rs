//! TLS termination for the HTTPS listener

use crate::config::TlsMaterial;
use anyhow::{anyhow, Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Build an acceptor from PEM encoded certificate chain and key
pub fn build_acceptor(material: &TlsMaterial) -> Result<TlsAcceptor> {
    let certs = parse_certificates(&material.certificate)?;
    let key = parse_private_key(&material.key)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Invalid certificate or key")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to parse certificate")?;

    if certs.is_empty() {
        return Err(anyhow!("No certificates found in certificate file"));
    }

    Ok(certs)
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = pem;
    rustls_pemfile::private_key(&mut reader)
        .context("Failed to parse private key")?
        .ok_or_else(|| anyhow!("No private key found in key file"))
}
