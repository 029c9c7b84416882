//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g.:
//!
//! - IDs are stored as `_id`.
//! - Datetimes are serialised in MongoDB's own format.

mod candidate;
pub use candidate::{Candidate, CandidateCore, NewCandidate};

mod election;
pub use election::{Election, ElectionCore, ElectionWithCandidates, NewElection};

mod vote;
pub use vote::{NewVote, Vote, VoteCore};

mod voter;
pub use voter::{NewVoter, Voter, VoterCore};
