use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    db::Vote,
    ids::{CandidateId, ElectionId, VoteId, VoterId},
};

/// A vote as submitted by a client. All fields are optional so that missing
/// ones can be reported with a meaningful message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub election_id: Option<ElectionId>,
    pub candidate_id: Option<CandidateId>,
    /// Reference of the ledger transaction the client submitted.
    #[serde(rename = "txHash")]
    pub tx_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDescription {
    pub id: VoteId,
    pub election_id: ElectionId,
    pub voter_id: VoterId,
    pub candidate_id: CandidateId,
    pub tx_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<Vote> for VoteDescription {
    fn from(vote: Vote) -> Self {
        Self {
            id: vote.id,
            election_id: vote.vote.election_id,
            voter_id: vote.vote.voter_id,
            candidate_id: vote.vote.candidate_id,
            tx_hash: vote.vote.tx_ref,
            created_at: vote.vote.created_at,
        }
    }
}
