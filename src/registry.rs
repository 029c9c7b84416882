use std::collections::HashSet;

use chrono::Utc;

use crate::{
    error::{Error, Result},
    model::{
        api::ElectionSpec,
        db::{Candidate, CandidateCore, ElectionCore, ElectionWithCandidates},
        ids::{ElectionId, LedgerElectionId},
        wallet::WalletAddress,
    },
    store::Storage,
};

/// Creates and looks up elections and their candidates.
pub struct ElectionRegistry {
    store: Storage,
}

impl ElectionRegistry {
    pub fn new(store: Storage) -> Self {
        Self { store }
    }

    /// Create an election on behalf of an existing voter.
    ///
    /// Candidates are shared between elections by exact name: an existing
    /// candidate with a requested name is reused, otherwise one is created.
    pub async fn create_election(
        &self,
        spec: ElectionSpec,
        creator: &WalletAddress,
    ) -> Result<ElectionWithCandidates> {
        let voter = self
            .store
            .voter_by_wallet(creator)
            .await?
            .ok_or_else(|| Error::not_found("Voter not found"))?;

        let title = spec.title.trim();
        let names: Vec<&str> = spec.candidates.iter().map(|name| name.trim()).collect();
        if title.is_empty() || names.is_empty() {
            return Err(Error::invalid("title and candidates are required"));
        }
        if names.iter().any(|name| name.is_empty()) {
            return Err(Error::invalid("Candidate names must not be empty"));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = names.iter().find(|name| !seen.insert(**name)) {
            return Err(Error::invalid(format!("Duplicate candidate '{duplicate}'")));
        }

        let mut candidates = Vec::with_capacity(names.len());
        for name in names {
            candidates.push(self.candidate_named(name).await?);
        }

        let election = self
            .store
            .insert_election(ElectionCore {
                title: title.to_string(),
                description: spec.description.trim().to_string(),
                created_by: voter.id,
                created_at: Utc::now(),
                candidate_ids: candidates.iter().map(|c| c.id).collect(),
                ledger_id: None,
            })
            .await?;
        info!(
            "Voter {} created election {} with {} candidates",
            voter.id,
            election.id,
            candidates.len()
        );
        Ok(ElectionWithCandidates {
            election,
            candidates,
        })
    }

    /// Find or create the candidate with this exact name.
    async fn candidate_named(&self, name: &str) -> Result<Candidate> {
        if let Some(candidate) = self.store.candidate_by_name(name).await? {
            return Ok(candidate);
        }
        match self.store.insert_candidate(CandidateCore::new(name)).await {
            Ok(candidate) => Ok(candidate),
            Err(e) if e.is_duplicate_key() => self
                .store
                .candidate_by_name(name)
                .await?
                .ok_or_else(|| e.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// All elections, newest first.
    pub async fn list_elections(&self) -> Result<Vec<ElectionWithCandidates>> {
        Ok(self.store.elections().await?)
    }

    pub async fn get_election(&self, id: ElectionId) -> Result<ElectionWithCandidates> {
        self.store
            .election(id)
            .await?
            .ok_or_else(|| Error::not_found("Election not found"))
    }

    /// Record where the election lives on the ledger.
    pub async fn record_ledger_id(
        &self,
        id: ElectionId,
        ledger_id: LedgerElectionId,
    ) -> Result<()> {
        self.store.set_ledger_id(id, ledger_id).await?;
        info!("Election {id} recorded as ledger election {ledger_id}");
        Ok(())
    }
}
