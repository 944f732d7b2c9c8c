//! # parley-corrections
//!
//! The correction ledger: an append-mostly audit trail of what a user
//! disputed, removed or corrected, keyed by session and independent of the
//! live entity aggregate.

#![deny(unsafe_code)]

pub mod codec;
pub mod ledger;

pub use codec::LedgerRecord;
pub use ledger::{
    CorrectionContext, CorrectionLedger, CorrectionMetadata, CorrectionRecord, LedgerParts,
    RemovalRecord,
};
