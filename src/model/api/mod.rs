//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Request bodies use the camelCase field names clients send.
//! - Datetimes are serialised as RFC 3339 strings.

pub mod auth;
pub mod election;
pub mod vote;

pub use election::{
    CandidateDescription, CandidateVotes, ElectionDescription, ElectionSpec, LedgerSync,
    ResultsView, SyncStatus, TallySource,
};
pub use vote::{VoteDescription, VoteRequest};
