//! # parley-core
//!
//! Foundation types shared by every parley crate.
//!
//! - **Validation errors**: [`ValidationError`] raised by every constructor that guards an invariant
//! - **Branded IDs**: `SessionId`, `MessageId` as newtypes for type safety
//! - **Confidence**: [`Confidence`] score checked to lie in `[0, 1]`
//! - **Tolerant decoding**: [`Decoded`] values carrying [`CodecWarning`]s
//! - **Normalization**: canonical forms used for equality, never for display
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod confidence;
pub mod constants;
pub mod decode;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod normalize;

pub use confidence::Confidence;
pub use decode::{CodecWarning, CodecWarningKind, Decoded};
pub use errors::{Result, ValidationError};
pub use ids::{MessageId, SessionId};
pub use normalize::{NormalizeOptions, normalize, normalized_eq};
