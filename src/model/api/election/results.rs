use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ElectionDescription;

/// Where the reported counts came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TallySource {
    Blockchain,
    Database,
}

/// What happened when the ledger tally was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Read from the ledger for this request.
    Fresh,
    /// Served from the result cache.
    Cached,
    /// The election could not be located on the ledger.
    NotFound,
    /// The ledger did not return a usable tally.
    Missing,
    /// No ledger is configured.
    Disabled,
    /// The ledger was not consulted.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSync {
    pub status: SyncStatus,
    pub cached: bool,
    /// When the reported ledger tally was read.
    pub last_synced: Option<DateTime<Utc>>,
}

impl LedgerSync {
    /// The ledger tally was not used.
    pub fn unused(status: SyncStatus) -> Self {
        Self {
            status,
            cached: false,
            last_synced: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateVotes {
    /// Candidate name.
    pub candidate: String,
    pub votes: u64,
}

/// Results of an election, from the ledger when possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsView {
    pub election: ElectionDescription,
    pub results: Vec<CandidateVotes>,
    pub source: TallySource,
    pub blockchain: LedgerSync,
}
