//! Data-plane client certificate authentication.
//!
//! The TLS listener accepts any client certificate and records it in
//! [`PeerInfo`]; the configured [`Authenticator`] decides afterwards, so
//! rejections reach the data plane as typed HTTP errors rather than TLS
//! alerts.


use std::net::SocketAddr;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::PrivateKeyDer;
use rustls::pki_types::UnixTime;
use rustls::server::danger::ClientCertVerifier;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use tracing::debug;
use x509_parser::prelude::FromDer;
use x509_parser::prelude::X509Certificate;

use crate::AuthError;
use crate::AuthMode;
use crate::NetworkError;
use crate::TlsConfig;

/// What the listener learned about a connecting peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub remote_addr: SocketAddr,
    pub tls: bool,
    /// Client chain, end entity first
    pub certificates: Vec<CertificateDer<'static>>,
}

impl PeerInfo {
    pub fn plain(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            tls: false,
            certificates: Vec::new(),
        }
    }

    fn end_entity(&self) -> Result<&CertificateDer<'static>, AuthError> {
        if !self.tls {
            return Err(AuthError::non_tls());
        }
        self.certificates.first().ok_or_else(AuthError::no_client_certificate)
    }
}

#[cfg_attr(test, automock)]
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        peer: &PeerInfo,
    ) -> Result<(), AuthError>;
}

/// Stands in when the listener runs without TLS; nothing authenticates
#[derive(Debug, Default)]
pub struct TlsRequired;

impl Authenticator for TlsRequired {
    fn authenticate(
        &self,
        _peer: &PeerInfo,
    ) -> Result<(), AuthError> {
        Err(AuthError::non_tls())
    }
}

/// DPs must present exactly the configured shared certificate
#[derive(Debug)]
pub struct SharedTlsAuthenticator {
    certificate: CertificateDer<'static>,
}

impl SharedTlsAuthenticator {
    pub fn new(certificate: CertificateDer<'static>) -> Self {
        Self { certificate }
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, NetworkError> {
        let certificate = parse_certificates(pem)?
            .into_iter()
            .next()
            .ok_or_else(|| NetworkError::TlsConfig("shared certificate file holds no certificate".into()))?;
        Ok(Self::new(certificate))
    }
}

impl Authenticator for SharedTlsAuthenticator {
    fn authenticate(
        &self,
        peer: &PeerInfo,
    ) -> Result<(), AuthError> {
        let presented = peer.end_entity()?;
        if presented.as_ref() != self.certificate.as_ref() {
            debug!(addr = %peer.remote_addr, "client certificate differs from the shared certificate");
            return Err(AuthError::unauthorized(
                "data plane presented incorrect client certificate during handshake",
            ));
        }
        Ok(())
    }
}

/// DPs must present a certificate chaining to one of the configured CAs
pub struct PkiTlsAuthenticator {
    verifier: Arc<dyn ClientCertVerifier>,
}

impl std::fmt::Debug for PkiTlsAuthenticator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PkiTlsAuthenticator").finish_non_exhaustive()
    }
}

impl PkiTlsAuthenticator {
    /// Fails when a configured certificate is not a CA
    pub fn new(ca_certificates: Vec<CertificateDer<'static>>) -> Result<Self, NetworkError> {
        if ca_certificates.is_empty() {
            return Err(NetworkError::TlsConfig("pki mode needs at least one CA certificate".into()));
        }

        let mut roots = RootCertStore::empty();
        for der in ca_certificates {
            ensure_ca(&der)?;
            roots
                .add(der)
                .map_err(|e| NetworkError::TlsConfig(format!("failed to add CA certificate: {e}")))?;
        }

        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::new(rustls::crypto::ring::default_provider()))
                .build()
                .map_err(|e| NetworkError::TlsConfig(format!("client verifier error: {e}")))?;
        Ok(Self { verifier })
    }

    pub fn from_pems(pems: &[Vec<u8>]) -> Result<Self, NetworkError> {
        let mut certificates = Vec::new();
        for pem in pems {
            certificates.extend(parse_certificates(pem)?);
        }
        Self::new(certificates)
    }
}

impl Authenticator for PkiTlsAuthenticator {
    fn authenticate(
        &self,
        peer: &PeerInfo,
    ) -> Result<(), AuthError> {
        let end_entity = peer.end_entity()?;
        self.verifier
            .verify_client_cert(end_entity, &peer.certificates[1..], UnixTime::now())
            .map(|_| ())
            .map_err(|e| {
                debug!(addr = %peer.remote_addr, "client certificate rejected: {}", e);
                AuthError::unauthorized("data plane presented client certificate not issued by a trusted CA")
            })
    }
}

fn ensure_ca(der: &CertificateDer<'_>) -> Result<(), NetworkError> {
    let (_, cert) = X509Certificate::from_der(der.as_ref())
        .map_err(|e| NetworkError::TlsConfig(format!("unparseable CA certificate: {e}")))?;
    let is_ca = cert
        .basic_constraints()
        .map_err(|e| NetworkError::TlsConfig(format!("bad basic constraints: {e}")))?
        .is_some_and(|ext| ext.value.ca);
    if !is_ca {
        return Err(NetworkError::TlsConfig(format!(
            "certificate {} is not a CA certificate",
            cert.subject()
        )));
    }
    Ok(())
}

pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, NetworkError> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| NetworkError::TlsConfig(format!("failed to parse certificates: {e}")))
}

pub fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, NetworkError> {
    PrivateKeyDer::from_pem_slice(pem).map_err(|e| NetworkError::TlsConfig(format!("failed to parse private key: {e}")))
}

fn read_pem(path: &str) -> Result<Vec<u8>, NetworkError> {
    std::fs::read(path).map_err(|e| NetworkError::TlsConfig(format!("reading {path}: {e}")))
}

/// Builds the authenticator selected by `tls.auth_mode`
pub fn authenticator_from_config(tls: &TlsConfig) -> Result<Arc<dyn Authenticator>, NetworkError> {
    if !tls.enable_tls {
        return Ok(Arc::new(TlsRequired));
    }
    match tls.auth_mode {
        AuthMode::Shared => {
            let pem = read_pem(&tls.cluster_certificate_path)?;
            Ok(Arc::new(SharedTlsAuthenticator::from_pem(&pem)?))
        }
        AuthMode::Pki => {
            let pems = tls
                .ca_certificate_paths
                .iter()
                .map(|path| read_pem(path))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Arc::new(PkiTlsAuthenticator::from_pems(&pems)?))
        }
    }
}
