//! Configuration modules for the gRPC-Web client.
//!
//! This module contains call-level configuration:
//! - [`CallOptions`]: Codec selection, header/trailer capture and TLS material
//! - [`MetadataSlot`]: Shared slot that receives response metadata
//! - [`TlsOptions`]: PEM roots and client identity

mod options;

pub use options::{CallOptions, MetadataSlot, TlsOptions};
pub(crate) use options::ResolvedCallOptions;
