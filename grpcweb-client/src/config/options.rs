//! Call options for per-request configuration.
//!
//! [`CallOptions`] values are merged in order: the dial-level defaults from
//! [`ClientBuilder::default_call_options`](crate::ClientBuilder::default_call_options)
//! first, then the per-call options. A later value always wins.

use std::sync::{Arc, Mutex};

use grpcweb_core::{Codec, Metadata};

use crate::ClientError;

/// A shared slot that receives response metadata.
///
/// Pass a clone to [`CallOptions::header`] or [`CallOptions::trailer`] and read
/// it back once the call has produced the metadata. The slot is cleared when
/// the call options are resolved, so it never carries values from an earlier
/// call.
///
/// # Example
///
/// ```
/// use grpcweb_client::{CallOptions, MetadataSlot};
///
/// let trailer = MetadataSlot::new();
/// let options = CallOptions::new().trailer(trailer.clone());
/// # let _ = options;
/// assert!(trailer.get().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetadataSlot(Arc<Mutex<Option<Metadata>>>);

impl MetadataSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The captured metadata, if any has been delivered.
    pub fn get(&self) -> Option<Metadata> {
        self.lock().clone()
    }

    /// Take the captured metadata, leaving the slot empty.
    pub fn take(&self) -> Option<Metadata> {
        self.lock().take()
    }

    pub(crate) fn set(&self, metadata: Option<Metadata>) {
        *self.lock() = metadata;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Metadata>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// TLS material for HTTPS and WSS connections.
///
/// All values are PEM encoded. With no root certificates, the platform or
/// bundled roots are used (depending on the enabled features).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    pub(crate) root_certificates: Vec<Vec<u8>>,
    pub(crate) client_certificate: Option<Vec<u8>>,
    pub(crate) client_key: Option<Vec<u8>>,
}

impl TlsOptions {
    /// Create TLS options that use the default roots and no client identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a PEM bundle of trusted root certificates.
    pub fn root_certificate(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_certificates.push(pem.into());
        self
    }

    /// Set the client identity used for mutual TLS.
    pub fn identity(mut self, key_pem: impl Into<Vec<u8>>, cert_pem: impl Into<Vec<u8>>) -> Self {
        self.client_key = Some(key_pem.into());
        self.client_certificate = Some(cert_pem.into());
        self
    }

    /// Whether a client identity is configured.
    pub fn has_identity(&self) -> bool {
        self.client_key.is_some() && self.client_certificate.is_some()
    }
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("root_certificates", &self.root_certificates.len())
            .field("identity", &self.has_identity())
            .finish()
    }
}

/// Options for configuring individual RPC calls.
///
/// # Example
///
/// ```
/// use grpcweb_client::{CallOptions, MetadataSlot};
///
/// let header = MetadataSlot::new();
/// let options = CallOptions::new()
///     .content_subtype("json")
///     .header(header.clone());
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub(crate) content_subtype: Option<String>,
    pub(crate) header: Option<MetadataSlot>,
    pub(crate) trailer: Option<MetadataSlot>,
    pub(crate) tls: Option<TlsOptions>,
}

impl CallOptions {
    /// Create new default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the payload codec by content-subtype name (`proto` or `json`).
    ///
    /// An unknown name fails the call with [`ClientError::Encode`].
    pub fn content_subtype<S: Into<String>>(mut self, subtype: S) -> Self {
        self.content_subtype = Some(subtype.into());
        self
    }

    /// Select the payload codec directly.
    pub fn codec(self, codec: Codec) -> Self {
        self.content_subtype(codec.name())
    }

    /// Capture the response header into `slot`.
    pub fn header(mut self, slot: MetadataSlot) -> Self {
        self.header = Some(slot);
        self
    }

    /// Capture the response trailer into `slot`.
    pub fn trailer(mut self, slot: MetadataSlot) -> Self {
        self.trailer = Some(slot);
        self
    }

    /// Trust the given PEM root certificates.
    pub fn tls<I, C>(mut self, trust_certificates: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let tls = trust_certificates
            .into_iter()
            .fold(TlsOptions::new(), |tls, pem| tls.root_certificate(pem));
        self.tls = Some(tls);
        self
    }

    /// Use mutual TLS with a PEM client key and certificate.
    pub fn mtls<I, C>(
        mut self,
        client_key: impl Into<Vec<u8>>,
        client_certificate: impl Into<Vec<u8>>,
        trust_certificates: I,
    ) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let tls = trust_certificates
            .into_iter()
            .fold(TlsOptions::new(), |tls, pem| tls.root_certificate(pem))
            .identity(client_key, client_certificate);
        self.tls = Some(tls);
        self
    }

    /// Set the TLS material from prepared [`TlsOptions`].
    pub fn tls_options(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Merge `other` on top of `self`. Values set in `other` win.
    pub fn merge(self, other: CallOptions) -> CallOptions {
        CallOptions {
            content_subtype: other.content_subtype.or(self.content_subtype),
            header: other.header.or(self.header),
            trailer: other.trailer.or(self.trailer),
            tls: other.tls.or(self.tls),
        }
    }

    /// Produce the immutable snapshot used for one call.
    ///
    /// Capture slots are cleared here.
    pub(crate) fn resolve(self) -> Result<ResolvedCallOptions, ClientError> {
        let codec = match self.content_subtype.as_deref() {
            Some(subtype) => Codec::from_content_subtype(subtype)?,
            None => Codec::default(),
        };
        if let Some(slot) = &self.header {
            slot.set(None);
        }
        if let Some(slot) = &self.trailer {
            slot.set(None);
        }
        Ok(ResolvedCallOptions {
            codec,
            header: self.header,
            trailer: self.trailer,
            tls: self.tls,
        })
    }
}

/// Call options after merging, ready for one call.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedCallOptions {
    pub(crate) codec: Codec,
    pub(crate) header: Option<MetadataSlot>,
    pub(crate) trailer: Option<MetadataSlot>,
    pub(crate) tls: Option<TlsOptions>,
}

impl ResolvedCallOptions {
    pub(crate) fn capture_header(&self, header: Option<&Metadata>) {
        if let Some(slot) = &self.header {
            slot.set(header.cloned());
        }
    }

    pub(crate) fn capture_trailer(&self, trailer: Option<&Metadata>) {
        if let Some(slot) = &self.trailer {
            slot.set(trailer.cloned());
        }
    }
}
