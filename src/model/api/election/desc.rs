use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    db::{Candidate, ElectionWithCandidates},
    ids::{CandidateId, ElectionId, LedgerElectionId, VoterId},
};

/// An API-friendly election description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    pub created_by: VoterId,
    pub created_at: DateTime<Utc>,
    /// Candidates in ballot order.
    pub candidates: Vec<CandidateDescription>,
    /// Index of the election in the ledger contract, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_id: Option<LedgerElectionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: CandidateId,
    pub name: String,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.candidate.name,
        }
    }
}

impl From<ElectionWithCandidates> for ElectionDescription {
    fn from(joined: ElectionWithCandidates) -> Self {
        let election = joined.election.election;
        Self {
            id: joined.election.id,
            title: election.title,
            description: election.description,
            created_by: election.created_by,
            created_at: election.created_at,
            candidates: joined.candidates.into_iter().map(Into::into).collect(),
            ledger_id: election.ledger_id,
        }
    }
}
