//! Accept loop for the DP listener.
//!
//! Client certificates are requested but not required during the TLS
//! handshake. Whatever the peer presented is handed to the routes in a
//! [`PeerInfo`], where the configured authenticator judges it.

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::Http;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::UnixTime;
use rustls::server::danger::ClientCertVerified;
use rustls::server::danger::ClientCertVerifier;
use rustls::DigitallySignedStruct;
use rustls::DistinguishedName;
use rustls::ServerConfig;
use rustls::SignatureScheme;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::routes;
use super::DpServerContext;
use crate::auth::parse_certificates;
use crate::auth::parse_private_key;
use crate::auth::PeerInfo;
use crate::NetworkError;
use crate::Result;
use crate::TlsConfig;

/// Offers client authentication and accepts whatever is presented
#[derive(Debug)]
struct CaptureClientCert {
    provider: Arc<CryptoProvider>,
}

impl ClientCertVerifier for CaptureClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Builds the acceptor serving the cluster certificate
pub fn tls_acceptor(tls: &TlsConfig) -> std::result::Result<TlsAcceptor, NetworkError> {
    let read = |path: &str| std::fs::read(path).map_err(|e| NetworkError::TlsConfig(format!("reading {path}: {e}")));
    let certs = parse_certificates(&read(&tls.cluster_certificate_path)?)?;
    let key = parse_private_key(&read(&tls.cluster_private_key_path)?)?;
    tls_acceptor_from_parts(certs, key)
}

pub(crate) fn tls_acceptor_from_parts(
    certs: Vec<CertificateDer<'static>>,
    key: rustls::pki_types::PrivateKeyDer<'static>,
) -> std::result::Result<TlsAcceptor, NetworkError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| NetworkError::TlsConfig(format!("protocol versions: {e}")))?
        .with_client_cert_verifier(Arc::new(CaptureClientCert { provider }))
        .with_single_cert(certs, key)
        .map_err(|e| NetworkError::TlsConfig(format!("cluster certificate: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(TlsAcceptor::from(Arc::new(config)))
}

pub async fn bind(address: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(address).await.map_err(|source| {
        NetworkError::Bind {
            address: address.to_string(),
            source,
        }
        .into()
    })
}

/// Serves DP connections until `cancel` fires. Without an acceptor every
/// connection is plain HTTP and fails authentication.
pub async fn serve(
    ctx: Arc<DpServerContext>,
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    cancel: CancellationToken,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, tls = acceptor.is_some(), "data plane listener started");
    }

    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = cancel.cancelled() => {
                info!("data plane listener stopped");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("failed to accept connection: {}", e);
                    continue;
                }
            }
        };

        tokio::spawn(handle_connection(
            ctx.clone(),
            stream,
            remote_addr,
            acceptor.clone(),
            cancel.clone(),
        ));
    }
}

async fn handle_connection(
    ctx: Arc<DpServerContext>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    cancel: CancellationToken,
) {
    let Some(acceptor) = acceptor else {
        serve_connection(ctx, stream, PeerInfo::plain(remote_addr), cancel).await;
        return;
    };

    let stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(addr = %remote_addr, "tls handshake failed: {}", e);
            return;
        }
    };
    let certificates = stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|chain| chain.iter().map(|c| c.clone().into_owned()).collect())
        .unwrap_or_default();
    let peer = PeerInfo {
        remote_addr,
        tls: true,
        certificates,
    };
    serve_connection(ctx, stream, peer, cancel).await;
}

async fn serve_connection<I>(
    ctx: Arc<DpServerContext>,
    io: I,
    peer: PeerInfo,
    cancel: CancellationToken,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let remote_addr = peer.remote_addr;
    let service = warp::service(routes(ctx, peer));
    let connection = Http::new().http1_only(true).serve_connection(io, service).with_upgrades();

    tokio::select! {
        _ = cancel.cancelled() => {}
        result = connection => {
            if let Err(e) = result {
                debug!(addr = %remote_addr, "connection closed with error: {}", e);
            }
        }
    }
}
