use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::ids::{CandidateId, ElectionId, LedgerElectionId, VoterId};

use super::Candidate;

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    pub title: String,
    pub description: String,
    pub created_by: VoterId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    /// Candidate IDs in creation order.
    pub candidate_ids: Vec<CandidateId>,
    /// The election's index in the ledger contract, once it has been
    /// confirmed. Absent for elections that were never mirrored, or whose
    /// mirroring transaction has not been observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_id: Option<LedgerElectionId>,
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

/// An election together with its candidates, in creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionWithCandidates {
    pub election: Election,
    pub candidates: Vec<Candidate>,
}

impl ElectionWithCandidates {
    /// Join an election with candidate rows fetched in any order.
    /// Candidates are returned in the election's own order; IDs with no
    /// matching row are skipped.
    pub fn assemble(election: Election, mut candidates: Vec<Candidate>) -> Self {
        let ordered = election
            .candidate_ids
            .iter()
            .filter_map(|id| {
                candidates
                    .iter()
                    .position(|c| c.id == *id)
                    .map(|index| candidates.swap_remove(index))
            })
            .collect();
        Self {
            election,
            candidates: ordered,
        }
    }

    /// Position of the given candidate in this election's candidate list,
    /// which is also its index on the ledger ballot.
    pub fn candidate_index(&self, candidate_id: CandidateId) -> Option<usize> {
        self.candidates.iter().position(|c| c.id == candidate_id)
    }
}

impl Deref for ElectionWithCandidates {
    type Target = Election;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}
