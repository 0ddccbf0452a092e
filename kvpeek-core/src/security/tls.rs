//! TLS client configuration for data-service connections.
//!
//! # Security
//! Certificate verification is either explicitly disabled through
//! [`SecurityConfig::insecure`] or performed against a CA bundle supplied
//! with [`SecurityConfig::with_ca_file`]. There is no implicit default: the
//! insecure mode must be selected by name and logs a warning whenever a TLS
//! connection is made with it.

use crate::{KvPeekError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

/// How TLS peers are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateVerification {
    /// Accept any server certificate. Lab and test clusters only.
    Disabled,
    /// Verify the server chain against the PEM bundle at this path.
    CaFile(PathBuf),
}

/// Transport security settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    pub verification: CertificateVerification,
}

impl SecurityConfig {
    /// Disables certificate verification.
    pub fn insecure() -> Self {
        Self {
            verification: CertificateVerification::Disabled,
        }
    }

    /// Verifies server certificates against a PEM CA bundle.
    pub fn with_ca_file(path: impl Into<PathBuf>) -> Self {
        Self {
            verification: CertificateVerification::CaFile(path.into()),
        }
    }

    pub fn verifies_certificates(&self) -> bool {
        !matches!(self.verification, CertificateVerification::Disabled)
    }

    /// Builds the rustls client configuration for these settings.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| KvPeekError::tls("Failed to select TLS protocol versions", e))?;

        let config = match &self.verification {
            CertificateVerification::Disabled => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
                .with_no_client_auth(),
            CertificateVerification::CaFile(path) => builder
                .with_root_certificates(load_root_store(path)?)
                .with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }
}

fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let file = File::open(path)
        .map_err(|e| KvPeekError::tls(format!("Failed to open CA file {}", path.display()), e))?;
    let mut reader = BufReader::new(file);

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| {
            KvPeekError::tls(format!("Failed to read CA file {}", path.display()), e)
        })?;
        roots
            .add(cert)
            .map_err(|e| KvPeekError::tls(format!("Invalid CA certificate in {}", path.display()), e))?;
    }

    if roots.is_empty() {
        return Err(KvPeekError::configuration(format!(
            "No certificates found in CA file {}",
            path.display()
        )));
    }

    Ok(roots)
}

/// Parses the SNI name for a host.
pub(crate) fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| KvPeekError::tls(format!("Invalid TLS server name '{}'", host), e))
}

/// Accepts every certificate but still checks handshake signatures, so the
/// session keys belong to whoever holds the presented certificate.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
