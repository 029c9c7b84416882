use std::collections::HashMap;

use mongodb::{
    bson::{self, doc, Document},
    Database,
};
use rocket::futures::TryStreamExt;
use serde::Deserialize;

use crate::model::{
    db::{
        Candidate, Election, ElectionWithCandidates, NewCandidate, NewElection, NewVote, NewVoter,
        Vote, Voter,
    },
    ids::{CandidateId, ElectionId, LedgerElectionId, VoterId},
    mongodb::{
        ensure_indexes_exist, id_filter, Coll, Counter, CANDIDATES, ELECTIONS, VOTERS, VOTES,
    },
    wallet::WalletAddress,
};

use super::{Store, StoreError, StoreResult};

/// MongoDB-backed store.
///
/// Numeric IDs come from one [`Counter`] per collection. A rejected insert
/// still consumes its counter value, so IDs are increasing but may have gaps.
pub struct MongoStore {
    voters: Coll<Voter>,
    candidates: Coll<Candidate>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    counters: Coll<Counter>,
}

/// An election document joined with its candidate documents by `$lookup`.
#[derive(Deserialize)]
struct ElectionLookup {
    #[serde(flatten)]
    election: Election,
    candidates: Vec<Candidate>,
}

/// One row of the per-candidate vote count aggregation.
#[derive(Deserialize)]
struct CandidateCount {
    #[serde(rename = "_id")]
    candidate_id: CandidateId,
    votes: u64,
}

impl MongoStore {
    /// Wrap the given database, creating the required indexes.
    pub async fn connect(db: &Database) -> StoreResult<Self> {
        ensure_indexes_exist(db).await?;
        Ok(Self {
            voters: Coll::from_db(db),
            candidates: Coll::from_db(db),
            elections: Coll::from_db(db),
            votes: Coll::from_db(db),
            counters: Coll::from_db(db),
        })
    }

    /// Run an election pipeline stage list followed by the candidate lookup.
    async fn lookup_elections(
        &self,
        mut pipeline: Vec<Document>,
    ) -> StoreResult<Vec<ElectionWithCandidates>> {
        pipeline.push(doc! {
            "$lookup": {
                "from": CANDIDATES,
                "localField": "candidate_ids",
                "foreignField": "_id",
                "as": "candidates",
            }
        });
        let mut cursor = self.elections.aggregate(pipeline, None).await?;
        let mut elections = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            let lookup: ElectionLookup = bson::from_document(document)?;
            elections.push(ElectionWithCandidates::assemble(
                lookup.election,
                lookup.candidates,
            ));
        }
        Ok(elections)
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn voter_by_wallet(&self, wallet: &WalletAddress) -> StoreResult<Option<Voter>> {
        let filter = doc! { "wallet_address": wallet.as_str() };
        Ok(self.voters.find_one(filter, None).await?)
    }

    async fn insert_voter(&self, voter: NewVoter) -> StoreResult<Voter> {
        let voter = Voter {
            id: Counter::next(&self.counters, VOTERS).await?,
            voter,
        };
        self.voters
            .insert_one(&voter, None)
            .await
            .map_err(|e| StoreError::from_db(VOTERS, e))?;
        Ok(voter)
    }

    async fn candidate_by_name(&self, name: &str) -> StoreResult<Option<Candidate>> {
        let filter = doc! { "name": name };
        Ok(self.candidates.find_one(filter, None).await?)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Candidate> {
        let candidate = Candidate {
            id: Counter::next(&self.counters, CANDIDATES).await?,
            candidate,
        };
        self.candidates
            .insert_one(&candidate, None)
            .await
            .map_err(|e| StoreError::from_db(CANDIDATES, e))?;
        Ok(candidate)
    }

    async fn insert_election(&self, election: NewElection) -> StoreResult<Election> {
        let election = Election {
            id: Counter::next(&self.counters, ELECTIONS).await?,
            election,
        };
        self.elections
            .insert_one(&election, None)
            .await
            .map_err(|e| StoreError::from_db(ELECTIONS, e))?;
        Ok(election)
    }

    async fn set_ledger_id(
        &self,
        election_id: ElectionId,
        ledger_id: LedgerElectionId,
    ) -> StoreResult<()> {
        let ledger_id = i64::try_from(ledger_id)
            .map_err(|_| StoreError::Missing {
                collection: ELECTIONS,
                id: election_id,
            })?;
        let update = doc! {
            "$set": { "ledger_id": ledger_id }
        };
        let result = self
            .elections
            .update_one(id_filter(election_id), update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::Missing {
                collection: ELECTIONS,
                id: election_id,
            });
        }
        Ok(())
    }

    async fn election(&self, id: ElectionId) -> StoreResult<Option<ElectionWithCandidates>> {
        let pipeline = vec![doc! { "$match": id_filter(id) }];
        Ok(self.lookup_elections(pipeline).await?.into_iter().next())
    }

    async fn elections(&self) -> StoreResult<Vec<ElectionWithCandidates>> {
        let pipeline = vec![doc! { "$sort": { "created_at": -1, "_id": -1 } }];
        self.lookup_elections(pipeline).await
    }

    async fn vote_by(
        &self,
        election_id: ElectionId,
        voter_id: VoterId,
    ) -> StoreResult<Option<Vote>> {
        let filter = doc! {
            "election_id": election_id,
            "voter_id": voter_id,
        };
        Ok(self.votes.find_one(filter, None).await?)
    }

    async fn insert_vote(&self, vote: NewVote) -> StoreResult<Vote> {
        let vote = Vote {
            id: Counter::next(&self.counters, VOTES).await?,
            vote,
        };
        self.votes
            .insert_one(&vote, None)
            .await
            .map_err(|e| StoreError::from_db(VOTES, e))?;
        Ok(vote)
    }

    async fn vote_counts(&self, election_id: ElectionId) -> StoreResult<HashMap<CandidateId, u64>> {
        let pipeline = vec![
            doc! { "$match": { "election_id": election_id } },
            doc! { "$group": { "_id": "$candidate_id", "votes": { "$sum": 1 } } },
        ];
        let mut cursor = self.votes.aggregate(pipeline, None).await?;
        let mut counts = HashMap::new();
        while let Some(document) = cursor.try_next().await? {
            let row: CandidateCount = bson::from_document(document)?;
            counts.insert(row.candidate_id, row.votes);
        }
        Ok(counts)
    }
}
