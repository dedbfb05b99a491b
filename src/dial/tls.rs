//! TLS dialer for the secure scheme.
//!
//! Wraps [`TcpDialer`] with a rustls handshake. Certificate policy stays with
//! rustls; the only knob plumbed through from [`DialOptions`] is the
//! trust-override flag, which swaps in a verifier that accepts any
//! certificate for callers talking to peers with self-signed certificates.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::trace;

use super::tcp::TcpDialer;
use super::{DialError, SharedOptions};
use crate::stream::TransportHandle;

/// Get a default TLS client configuration by loading the platform's native
/// certificates.
pub fn default_tls_config() -> rustls::ClientConfig {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = roots.add(cert);
    }

    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols.push(b"http/1.1".to_vec());
    config
}

/// Opens TLS-over-TCP connections for dial callbacks.
#[derive(Debug, Clone)]
pub struct TlsDialer {
    config: Arc<rustls::ClientConfig>,
    tcp: TcpDialer,
}

impl TlsDialer {
    /// Create a TLS dialer with the given client configuration.
    pub fn new(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            config,
            tcp: TcpDialer::new(),
        }
    }

    /// Connect over TCP (injecting port 443 for the secure scheme if unset),
    /// then complete the TLS handshake.
    pub async fn dial(&self, options: SharedOptions) -> Result<TransportHandle, DialError> {
        let (host, trust_override) = {
            let options = options.lock();
            (options.host.clone(), options.tls.danger_accept_invalid_certs)
        };

        let tcp = self.tcp.dial(options).await?;

        let config = if trust_override {
            Arc::new(self.trust_override_config())
        } else {
            self.config.clone()
        };
        let connector = TlsConnector::from(config);
        let server_name = ServerName::try_from(host).map_err(DialError::new)?;

        let stream = connector.connect(server_name, tcp).await?;
        trace!("tls handshake complete");
        Ok(TransportHandle::boxed(stream))
    }

    fn trust_override_config(&self) -> rustls::ClientConfig {
        let mut config = (*self.config).clone();
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(danger::NoCertificateVerification::new(
                self.config.crypto_provider().clone(),
            )));
        config
    }
}

impl tower::Service<SharedOptions> for TlsDialer {
    type Response = TransportHandle;
    type Error = DialError;
    type Future = BoxFuture<'static, Result<TransportHandle, DialError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, options: SharedOptions) -> Self::Future {
        let dialer = self.clone();
        Box::pin(async move { dialer.dial(options).await })
    }
}

mod danger {
    use std::sync::Arc;

    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::DigitallySignedStruct;

    /// Accepts any server certificate. Signature checks still run so the
    /// handshake itself stays honest.
    #[derive(Debug)]
    pub(super) struct NoCertificateVerification(Arc<CryptoProvider>);

    impl NoCertificateVerification {
        pub(super) fn new(provider: Arc<CryptoProvider>) -> Self {
            Self(provider)
        }
    }

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(TlsDialer: Send, Sync, Clone);
}
