//! Core protocol types for gRPC-Web.
//!
//! This crate provides the wire-level pieces shared by the client transports
//! and by any in-process peer (such as test servers).
//!
//! ## Modules
//!
//! - [`error`]: Status codes, [`Status`], and error types
//! - [`frame`]: Length-prefixed message and trailer frames
//! - [`details`]: `grpc-status-details-bin` encoding
//! - [`codec`]: Payload codecs selected by content-subtype
//! - [`metadata`]: Header and trailer metadata

mod codec;
mod details;
mod error;
mod frame;
mod metadata;

pub use codec::*;
pub use details::*;
pub use error::*;
pub use frame::*;
pub use metadata::*;
