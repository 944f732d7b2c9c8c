//! # parley-session
//!
//! One conversation's state in one value.
//!
//! - **Context**: [`ConversationContext`] pairs the entity aggregate with its
//!   correction ledger and keeps the two in step
//! - **Record**: [`SessionRecord`] envelope, decoded as tolerantly as its parts
//! - **Store**: [`SessionStore`] with optimistic concurrency on a revision
//!   counter, plus an in-memory implementation
//! - **Errors**: [`SessionError`] with a generic user-facing message

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod record;
pub mod store;

pub use context::{ConversationContext, TurnPlan};
pub use errors::{SessionError, StoreError};
pub use record::SessionRecord;
pub use store::{InMemorySessionStore, SessionStore, update_session};
