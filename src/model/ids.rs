//! Numeric identifiers shared by the store and the API.
//!
//! All local IDs come from 1-based auto-increment counters, see
//! [`crate::model::mongodb::Counter`].

pub type VoterId = u32;
pub type CandidateId = u32;
pub type ElectionId = u32;
pub type VoteId = u32;

/// An election's index in the ledger contract. The contract numbers elections
/// from zero in creation order.
pub type LedgerElectionId = u64;
