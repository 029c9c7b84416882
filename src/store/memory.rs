use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::{
    db::{
        Candidate, Election, ElectionWithCandidates, NewCandidate, NewElection, NewVote, NewVoter,
        Vote, Voter,
    },
    ids::{CandidateId, ElectionId, LedgerElectionId, VoterId},
    mongodb::{CANDIDATES, ELECTIONS, VOTERS, VOTES},
    wallet::WalletAddress,
};

use super::{Store, StoreError, StoreResult};

/// Process-local store for development and tests.
///
/// Every operation runs under a single lock, so each insert's uniqueness
/// check and write are atomic, mirroring the unique indexes of the MongoDB
/// store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    voters: Vec<Voter>,
    candidates: Vec<Candidate>,
    elections: Vec<Election>,
    votes: Vec<Vote>,
}

/// Next 1-based ID for a table holding `len` rows. Rows are never deleted.
fn next_id(len: usize) -> u32 {
    u32::try_from(len + 1).unwrap_or(u32::MAX)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave a half-applied row,
        // since every mutation is a single push or assignment.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Tables {
    fn joined(&self, election: &Election) -> ElectionWithCandidates {
        let candidates = self
            .candidates
            .iter()
            .filter(|c| election.candidate_ids.contains(&c.id))
            .cloned()
            .collect();
        ElectionWithCandidates::assemble(election.clone(), candidates)
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn voter_by_wallet(&self, wallet: &WalletAddress) -> StoreResult<Option<Voter>> {
        let tables = self.tables();
        Ok(tables
            .voters
            .iter()
            .find(|v| &v.wallet_address == wallet)
            .cloned())
    }

    async fn insert_voter(&self, voter: NewVoter) -> StoreResult<Voter> {
        let mut tables = self.tables();
        if tables
            .voters
            .iter()
            .any(|v| v.wallet_address == voter.wallet_address)
        {
            return Err(StoreError::DuplicateKey(VOTERS));
        }
        let voter = Voter {
            id: next_id(tables.voters.len()),
            voter,
        };
        tables.voters.push(voter.clone());
        Ok(voter)
    }

    async fn candidate_by_name(&self, name: &str) -> StoreResult<Option<Candidate>> {
        let tables = self.tables();
        Ok(tables.candidates.iter().find(|c| c.name == name).cloned())
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Candidate> {
        let mut tables = self.tables();
        if tables.candidates.iter().any(|c| c.name == candidate.name) {
            return Err(StoreError::DuplicateKey(CANDIDATES));
        }
        let candidate = Candidate {
            id: next_id(tables.candidates.len()),
            candidate,
        };
        tables.candidates.push(candidate.clone());
        Ok(candidate)
    }

    async fn insert_election(&self, election: NewElection) -> StoreResult<Election> {
        let mut tables = self.tables();
        let election = Election {
            id: next_id(tables.elections.len()),
            election,
        };
        tables.elections.push(election.clone());
        Ok(election)
    }

    async fn set_ledger_id(
        &self,
        election_id: ElectionId,
        ledger_id: LedgerElectionId,
    ) -> StoreResult<()> {
        let mut tables = self.tables();
        let election = tables
            .elections
            .iter_mut()
            .find(|e| e.id == election_id)
            .ok_or(StoreError::Missing {
                collection: ELECTIONS,
                id: election_id,
            })?;
        election.election.ledger_id = Some(ledger_id);
        Ok(())
    }

    async fn election(&self, id: ElectionId) -> StoreResult<Option<ElectionWithCandidates>> {
        let tables = self.tables();
        Ok(tables
            .elections
            .iter()
            .find(|e| e.id == id)
            .map(|e| tables.joined(e)))
    }

    async fn elections(&self) -> StoreResult<Vec<ElectionWithCandidates>> {
        let tables = self.tables();
        let mut elections: Vec<_> = tables.elections.iter().map(|e| tables.joined(e)).collect();
        elections.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(elections)
    }

    async fn vote_by(
        &self,
        election_id: ElectionId,
        voter_id: VoterId,
    ) -> StoreResult<Option<Vote>> {
        let tables = self.tables();
        Ok(tables
            .votes
            .iter()
            .find(|v| v.election_id == election_id && v.voter_id == voter_id)
            .cloned())
    }

    async fn insert_vote(&self, vote: NewVote) -> StoreResult<Vote> {
        let mut tables = self.tables();
        if tables
            .votes
            .iter()
            .any(|v| v.election_id == vote.election_id && v.voter_id == vote.voter_id)
        {
            return Err(StoreError::DuplicateKey(VOTES));
        }
        let vote = Vote {
            id: next_id(tables.votes.len()),
            vote,
        };
        tables.votes.push(vote.clone());
        Ok(vote)
    }

    async fn vote_counts(&self, election_id: ElectionId) -> StoreResult<HashMap<CandidateId, u64>> {
        let tables = self.tables();
        let mut counts = HashMap::new();
        for vote in tables.votes.iter().filter(|v| v.election_id == election_id) {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::db::{CandidateCore, ElectionCore, VoteCore, VoterCore};

    fn wallet(raw: &str) -> WalletAddress {
        WalletAddress::parse(raw).unwrap()
    }

    fn new_vote(election_id: ElectionId, voter_id: VoterId, candidate_id: CandidateId) -> NewVote {
        VoteCore {
            election_id,
            voter_id,
            candidate_id,
            tx_ref: "0xref".to_string(),
            created_at: Utc::now(),
        }
    }

    #[rocket::async_test]
    async fn voter_wallet_is_unique() {
        let store = MemoryStore::new();
        let first = store
            .insert_voter(VoterCore::new(wallet("0xAAA")))
            .await
            .unwrap();
        assert_eq!(first.id, 1);

        let err = store
            .insert_voter(VoterCore::new(wallet("0xaaa")))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(
            store.voter_by_wallet(&wallet("0xAaA")).await.unwrap(),
            Some(first)
        );
    }

    #[rocket::async_test]
    async fn candidate_name_is_unique() {
        let store = MemoryStore::new();
        store.insert_candidate(CandidateCore::new("Alice")).await.unwrap();
        let err = store
            .insert_candidate(CandidateCore::new("Alice"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        // Names are matched exactly.
        store.insert_candidate(CandidateCore::new("alice")).await.unwrap();
    }

    #[rocket::async_test]
    async fn one_vote_per_voter_per_election() {
        let store = MemoryStore::new();
        store.insert_vote(new_vote(1, 1, 1)).await.unwrap();

        let err = store.insert_vote(new_vote(1, 1, 2)).await.unwrap_err();
        assert!(err.is_duplicate_key());

        // Other elections and other voters are unaffected.
        store.insert_vote(new_vote(2, 1, 1)).await.unwrap();
        store.insert_vote(new_vote(1, 2, 1)).await.unwrap();

        let counts = store.vote_counts(1).await.unwrap();
        assert_eq!(counts.get(&1), Some(&2));
        assert_eq!(counts.get(&2), None);
    }

    #[rocket::async_test]
    async fn elections_newest_first_with_candidates() {
        let store = MemoryStore::new();
        let alice = store.insert_candidate(CandidateCore::new("Alice")).await.unwrap();
        let bob = store.insert_candidate(CandidateCore::new("Bob")).await.unwrap();

        let created_at = Utc::now();
        for title in ["First", "Second"] {
            store
                .insert_election(ElectionCore {
                    title: title.to_string(),
                    description: String::new(),
                    created_by: 1,
                    created_at,
                    candidate_ids: vec![bob.id, alice.id],
                    ledger_id: None,
                })
                .await
                .unwrap();
        }

        let elections = store.elections().await.unwrap();
        let titles: Vec<_> = elections.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Second", "First"]);
        assert_eq!(elections[0].candidates, vec![bob, alice]);

        store.set_ledger_id(1, 0).await.unwrap();
        let first = store.election(1).await.unwrap().unwrap();
        assert_eq!(first.ledger_id, Some(0));
        assert!(store.election(3).await.unwrap().is_none());
    }
}
