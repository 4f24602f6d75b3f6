//! Certificate metadata lookup for https seeds
//!
//! One TLS handshake against the seed host, with chain verification turned
//! off: the goal is to report what the server presents, not to trust it.
//! Failures never propagate; they come back as an [`SslInfo`] with a status
//! tag.

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::{Host, Url};
use x509_parser::objects::{oid2sn, oid_registry};
use x509_parser::prelude::{FromDer, X509Certificate};

/// Outcome of the lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslStatus {
    Ok,
    NoCertificate,
    ConnectionError,
    Timeout,
}

/// Flat certificate metadata for the seed host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SslInfo {
    pub status: SslStatus,
    pub issuer: String,
    pub subject: String,
    pub valid_from: String,
    pub valid_to: String,
    pub serial_number: String,
    pub signature_algorithm: String,
}

impl SslInfo {
    /// Metadata for a failed lookup; the issuer field carries a readable tag
    pub fn failure(status: SslStatus) -> Self {
        let issuer = match status {
            SslStatus::Ok => "Unknown",
            SslStatus::NoCertificate => "No SSL Certificate",
            SslStatus::ConnectionError => "SSL Error",
            SslStatus::Timeout => "SSL Timeout",
        };
        Self {
            status,
            issuer: issuer.to_string(),
            subject: String::new(),
            valid_from: String::new(),
            valid_to: String::new(),
            serial_number: String::new(),
            signature_algorithm: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SslStatus::Ok
    }
}

/// Host to connect to for a URL's certificate
///
/// IPv6 literals come back without the brackets `host_str` keeps.
pub fn certificate_host(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => Some(domain.to_string()),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

/// Source of certificate metadata
#[async_trait]
pub trait CertificateInspector: Send + Sync {
    async fn inspect(&self, host: &str, port: u16) -> SslInfo;
}

/// Inspector backed by a real TLS handshake
#[derive(Debug, Clone)]
pub struct TlsInspector {
    timeout: Duration,
}

impl TlsInspector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn handshake(&self, host: &str, port: u16) -> Result<SslInfo, String> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let config = client_config().map_err(|e| e.to_string())?;
        let server_name = ServerName::try_from(host.to_string()).map_err(|e| e.to_string())?;

        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| e.to_string())?;
        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| e.to_string())?;

        let (_, connection) = stream.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first());

        Ok(match leaf {
            Some(der) => describe_certificate(der.as_ref()),
            None => SslInfo::failure(SslStatus::NoCertificate),
        })
    }
}

#[async_trait]
impl CertificateInspector for TlsInspector {
    async fn inspect(&self, host: &str, port: u16) -> SslInfo {
        match tokio::time::timeout(self.timeout, self.handshake(host, port)).await {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                tracing::warn!("SSL lookup for {}:{} failed: {}", host, port, e);
                SslInfo::failure(SslStatus::ConnectionError)
            }
            Err(_) => {
                tracing::warn!("SSL lookup for {}:{} timed out", host, port);
                SslInfo::failure(SslStatus::Timeout)
            }
        }
    }
}

fn client_config() -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(ring::default_provider());
    let verifier = Arc::new(AcceptAnyCertificate {
        provider: Arc::clone(&provider),
    });

    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

/// Parses a DER leaf certificate into flat metadata
///
/// Unparsable certificates are reported as present but with unknown fields.
fn describe_certificate(der: &[u8]) -> SslInfo {
    let Ok((_, cert)) = X509Certificate::from_der(der) else {
        let mut info = SslInfo::failure(SslStatus::Ok);
        info.subject = "Unknown".to_string();
        info.signature_algorithm = "Unknown".to_string();
        return info;
    };

    let issuer = cert
        .issuer()
        .iter_common_name()
        .chain(cert.issuer().iter_organization())
        .find_map(|attr| attr.as_str().ok())
        .unwrap_or("Unknown");
    let subject = cert
        .subject()
        .iter_common_name()
        .find_map(|attr| attr.as_str().ok())
        .unwrap_or("Unknown");

    let oid = &cert.signature_algorithm.algorithm;
    let signature_algorithm = oid2sn(oid, oid_registry())
        .map(str::to_string)
        .unwrap_or_else(|_| oid.to_id_string());

    SslInfo {
        status: SslStatus::Ok,
        issuer: issuer.to_string(),
        subject: subject.to_string(),
        valid_from: cert.validity().not_before.to_string(),
        valid_to: cert.validity().not_after.to_string(),
        serial_number: hex::encode_upper(cert.raw_serial()),
        signature_algorithm,
    }
}

/// Verifier that accepts any chain but still checks handshake signatures
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
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
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
