//! TLS client configuration
//!
//! Turns [`SslOptions`] into a rustls client config and decides whether the
//! session must, may, or must not be encrypted.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::config::SslOptions;
use crate::error::{code, XError};

/// What to do about TLS when connecting
#[derive(Clone)]
pub enum TlsPolicy {
    Disabled,
    /// Try TLS, stay plain if the server refuses
    Preferred(Arc<ClientConfig>),
    Required(Arc<ClientConfig>),
}

impl std::fmt::Debug for TlsPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TlsPolicy::Disabled => "Disabled",
            TlsPolicy::Preferred(_) => "Preferred",
            TlsPolicy::Required(_) => "Required",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verification {
    None,
    ChainOnly,
    Full,
}

/// Derive the TLS policy from the configured options
pub fn policy(ssl: &SslOptions) -> Result<TlsPolicy, XError> {
    let mode = ssl.ssl_mode.to_ascii_uppercase();
    let has_ca = !(ssl.ssl_ca.is_empty() && ssl.ssl_ca_path.is_empty());

    if ssl.ssl_cert.is_empty() != ssl.ssl_key.is_empty() {
        return Err(wrong_config("ssl-cert and ssl-key must be given together"));
    }

    let verification = match mode.as_str() {
        "VERIFY_IDENTITY" => Verification::Full,
        "VERIFY_CA" => Verification::ChainOnly,
        _ if has_ca => Verification::ChainOnly,
        _ => Verification::None,
    };
    if verification != Verification::None && !has_ca {
        return Err(wrong_config(format!(
            "ssl-mode {} requires ssl-ca or ssl-ca-path",
            mode
        )));
    }

    match mode.as_str() {
        "DISABLED" if ssl.has_material() => Err(wrong_config(
            "ssl-mode DISABLED conflicts with the given certificate options",
        )),
        "DISABLED" => Ok(TlsPolicy::Disabled),
        "" if !ssl.has_material() => Ok(TlsPolicy::Disabled),
        "PREFERRED" => Ok(TlsPolicy::Preferred(client_config(ssl, verification)?)),
        "" | "REQUIRED" | "VERIFY_CA" | "VERIFY_IDENTITY" => {
            Ok(TlsPolicy::Required(client_config(ssl, verification)?))
        }
        other => Err(wrong_config(format!("unknown ssl-mode {}", other))),
    }
}

fn client_config(ssl: &SslOptions, verification: Verification) -> Result<Arc<ClientConfig>, XError> {
    let mut provider = ring::default_provider();
    if !ssl.ssl_cipher.is_empty() {
        let wanted: Vec<&str> = ssl.ssl_cipher.split(':').map(str::trim).collect();
        provider.cipher_suites.retain(|suite| {
            let name = format!("{:?}", suite.suite());
            wanted.iter().any(|w| name.eq_ignore_ascii_case(w))
        });
        if provider.cipher_suites.is_empty() {
            return Err(wrong_config(format!(
                "none of the ciphers '{}' is supported",
                ssl.ssl_cipher
            )));
        }
    }
    let provider = Arc::new(provider);

    let versions = protocol_versions(&ssl.allowed_tls)?;
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)
        .map_err(wrong_config)?;

    let verifier: Arc<dyn ServerCertVerifier> = match verification {
        Verification::None => Arc::new(InsecureServerVerifier(provider.clone())),
        Verification::ChainOnly | Verification::Full => {
            let roots = load_roots(ssl)?;
            let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(wrong_config)?;
            if verification == Verification::Full {
                webpki
            } else {
                Arc::new(ChainOnlyVerifier { inner: webpki })
            }
        }
    };

    let builder = builder
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    let config = if ssl.ssl_cert.is_empty() {
        builder.with_no_client_auth()
    } else {
        let certs = load_certs(Path::new(&ssl.ssl_cert))?;
        let key = load_key(Path::new(&ssl.ssl_key))?;
        builder
            .with_client_auth_cert(certs, key)
            .map_err(wrong_config)?
    };

    Ok(Arc::new(config))
}

fn protocol_versions(
    allowed: &str,
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, XError> {
    if allowed.trim().is_empty() {
        return Ok(rustls::DEFAULT_VERSIONS.to_vec());
    }

    allowed
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|version| match version {
            "TLSv1.2" => Ok(&rustls::version::TLS12),
            "TLSv1.3" => Ok(&rustls::version::TLS13),
            other => Err(wrong_config(format!("unsupported TLS version {}", other))),
        })
        .collect()
}

fn load_roots(ssl: &SslOptions) -> Result<RootCertStore, XError> {
    let mut roots = RootCertStore::empty();
    let mut files = Vec::new();

    if !ssl.ssl_ca.is_empty() {
        files.push(Path::new(&ssl.ssl_ca).to_path_buf());
    }
    if !ssl.ssl_ca_path.is_empty() {
        let entries = std::fs::read_dir(&ssl.ssl_ca_path)
            .map_err(|e| wrong_config(format!("cannot read {}: {}", ssl.ssl_ca_path, e)))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("pem" | "crt")
            ) {
                files.push(path);
            }
        }
    }

    for file in files {
        for cert in load_certs(&file)? {
            roots.add(cert).map_err(wrong_config)?;
        }
    }

    if roots.is_empty() {
        return Err(wrong_config("no CA certificates found"));
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, XError> {
    let file = File::open(path)
        .map_err(|e| wrong_config(format!("cannot open {}: {}", path.display(), e)))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| wrong_config(format!("invalid certificate in {}: {}", path.display(), e)))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, XError> {
    let file = File::open(path)
        .map_err(|e| wrong_config(format!("cannot open {}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| wrong_config(format!("invalid key in {}: {}", path.display(), e)))?
        .ok_or_else(|| wrong_config(format!("no private key in {}", path.display())))
}

fn wrong_config(detail: impl std::fmt::Display) -> XError {
    XError::new(
        code::CR_X_TLS_WRONG_CONFIGURATION,
        format!("TLS was marked as wrongly configured: {}", detail),
    )
}

/// Accepts any server certificate (ssl-mode REQUIRED without a CA)
#[derive(Debug)]
struct InsecureServerVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for InsecureServerVerifier {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Verifies the chain against the CA but ignores the host name (ssl-mode VERIFY_CA)
#[derive(Debug)]
struct ChainOnlyVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            // Name mismatch variants differ across rustls releases
            Err(rustls::Error::InvalidCertificate(ref e))
                if format!("{:?}", e).starts_with("NotValidForName") =>
            {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
