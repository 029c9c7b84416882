//! Persistence for voters, candidates, elections and votes.
//!
//! The [`Store`] trait is the contract the rest of the server relies on. Both
//! implementations enforce the same uniqueness constraints at insert time and
//! report violations as [`StoreError::DuplicateKey`]; callers decide what a
//! duplicate means for them.

use std::collections::HashMap;
use std::sync::Arc;

use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{
    db::{
        Candidate, Election, ElectionWithCandidates, NewCandidate, NewElection, NewVote, NewVoter,
        Vote, Voter,
    },
    ids::{CandidateId, ElectionId, LedgerElectionId, VoterId},
    wallet::WalletAddress,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write.
    #[error("Duplicate key in collection '{0}'")]
    DuplicateKey(&'static str),
    #[error(transparent)]
    Db(DbError),
    #[error(transparent)]
    Bson(#[from] mongodb::bson::de::Error),
    #[error("No document {id} in collection '{collection}'")]
    Missing { collection: &'static str, id: u32 },
}

impl StoreError {
    /// Classify a database error, recognising unique index violations.
    pub fn from_db(collection: &'static str, err: DbError) -> Self {
        if crate::model::mongodb::is_duplicate_key_error(&err) {
            Self::DuplicateKey(collection)
        } else {
            Self::Db(err)
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::Db(err)
    }
}

/// The storage contract.
#[rocket::async_trait]
pub trait Store: Send + Sync {
    async fn voter_by_wallet(&self, wallet: &WalletAddress) -> StoreResult<Option<Voter>>;

    /// Insert a voter. Fails with [`StoreError::DuplicateKey`] if the wallet
    /// address is already registered.
    async fn insert_voter(&self, voter: NewVoter) -> StoreResult<Voter>;

    async fn candidate_by_name(&self, name: &str) -> StoreResult<Option<Candidate>>;

    /// Insert a candidate. Fails with [`StoreError::DuplicateKey`] if the
    /// name is already taken.
    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Candidate>;

    async fn insert_election(&self, election: NewElection) -> StoreResult<Election>;

    /// Record the ledger-side index of an election.
    async fn set_ledger_id(
        &self,
        election_id: ElectionId,
        ledger_id: LedgerElectionId,
    ) -> StoreResult<()>;

    async fn election(&self, id: ElectionId) -> StoreResult<Option<ElectionWithCandidates>>;

    /// All elections, newest first, with their candidates attached.
    async fn elections(&self) -> StoreResult<Vec<ElectionWithCandidates>>;

    async fn vote_by(
        &self,
        election_id: ElectionId,
        voter_id: VoterId,
    ) -> StoreResult<Option<Vote>>;

    /// Insert a vote. Fails with [`StoreError::DuplicateKey`] if the voter
    /// already has a vote in the election.
    async fn insert_vote(&self, vote: NewVote) -> StoreResult<Vote>;

    /// Number of votes per candidate in the given election. Candidates with
    /// no votes are absent from the map.
    async fn vote_counts(&self, election_id: ElectionId) -> StoreResult<HashMap<CandidateId, u64>>;
}

/// Shared handle on the configured store.
pub type Storage = Arc<dyn Store>;
