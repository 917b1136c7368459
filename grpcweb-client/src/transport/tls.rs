//! rustls configuration for HTTPS and WSS connections.
//!
//! TLS support requires both a crypto provider and root certificates:
//!
//! - **Crypto providers** (choose one):
//!   - `tls-ring` - Use ring crypto (default with `tls` feature)
//!   - `tls-aws-lc` - Use AWS LC crypto
//!   - neither: a process-wide provider installed with
//!     `CryptoProvider::install_default()`
//!
//! - **Root certificates** (choose one, or pass PEM roots per call):
//!   - `tls-native-roots` - Use system root certificates (default with `tls` feature)
//!   - `tls-webpki-roots` - Use bundled Mozilla root certificates

use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::ClientError;
use crate::config::TlsOptions;

/// Check if TLS features are properly configured.
///
/// Returns true if both a crypto provider AND root certificates are available.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

/// Build a rustls client configuration from optional PEM material.
///
/// Custom roots replace the feature-gated default roots. A client key and
/// certificate enable mutual TLS.
pub fn client_config(tls: Option<&TlsOptions>) -> Result<ClientConfig, ClientError> {
    let roots = root_store(tls)?;
    let builder = config_builder()?.with_root_certificates(roots);

    match tls {
        Some(TlsOptions {
            client_key: Some(key),
            client_certificate: Some(cert),
            ..
        }) => {
            let chain = CertificateDer::pem_slice_iter(cert)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| tls_error("invalid client certificate", e))?;
            let key = PrivateKeyDer::from_pem_slice(key)
                .map_err(|e| tls_error("invalid client key", e))?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| tls_error("invalid client identity", e))
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Build an HTTPS connector around `config`.
///
/// The connector still accepts plain `http://` URIs and negotiates HTTP/1.1 or
/// HTTP/2 through ALPN.
pub(crate) fn https_connector(config: ClientConfig) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_all_versions()
        .build()
}

/// Crypto provider priority: feature-gated ring, then aws-lc, then the
/// user-installed process default.
fn config_builder()
-> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>, ClientError> {
    #[cfg(feature = "tls-ring")]
    let provider = Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    let provider = Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    let provider = rustls::crypto::CryptoProvider::get_default().cloned();

    let provider: Arc<rustls::crypto::CryptoProvider> = provider.ok_or_else(|| {
        ClientError::Transport(
            "TLS requires a crypto provider: enable `tls-ring` or `tls-aws-lc`, \
             or install one with `CryptoProvider::install_default()`"
                .into(),
        )
    })?;

    ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error("unsupported protocol versions", e))
}

fn root_store(tls: Option<&TlsOptions>) -> Result<RootCertStore, ClientError> {
    let custom = tls.map(|t| t.root_certificates.as_slice()).unwrap_or_default();
    if custom.is_empty() {
        return default_root_store();
    }

    let mut roots = RootCertStore::empty();
    for pem in custom {
        for cert in CertificateDer::pem_slice_iter(pem) {
            let cert = cert.map_err(|e| tls_error("invalid root certificate", e))?;
            roots
                .add(cert)
                .map_err(|e| tls_error("invalid root certificate", e))?;
        }
    }
    Ok(roots)
}

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn default_root_store() -> Result<RootCertStore, ClientError> {
    let mut roots = RootCertStore::empty();

    // Prefer native over webpki if both are enabled
    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            // Some certs may still have loaded
            #[cfg(feature = "tracing")]
            tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
        }
        roots.add_parsable_certificates(native_certs.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    Ok(roots)
}

#[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
fn default_root_store() -> Result<RootCertStore, ClientError> {
    Err(ClientError::Transport(
        "TLS requires root certificates: enable `tls-native-roots` or \
         `tls-webpki-roots`, or pass PEM roots with `CallOptions::tls`"
            .into(),
    ))
}

fn tls_error(context: &str, err: impl std::fmt::Display) -> ClientError {
    ClientError::Transport(format!("{context}: {err}"))
}
