use std::sync::Arc;

use chrono::Utc;

use crate::{
    cache::{CachedTally, ResultCache},
    error::{Error, Result},
    identity::IdentityResolver,
    ledger::{LedgerGateway, ReceiptVerifier, TallyUnavailable, TransactionOutcome},
    model::{
        api::{CandidateVotes, LedgerSync, ResultsView, SyncStatus, TallySource, VoteRequest},
        db::{ElectionWithCandidates, Vote, VoteCore},
        ids::{ElectionId, LedgerElectionId},
        wallet::WalletAddress,
    },
    registry::ElectionRegistry,
    store::Storage,
};

/// A recorded vote and the ledger transaction it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    pub vote: Vote,
    pub blockchain: TransactionOutcome,
}

/// Reconciles the local store with the ledger: records votes exactly once
/// and assembles results from whichever source is available.
pub struct VoteLedgerCoordinator {
    store: Storage,
    identity: IdentityResolver,
    registry: ElectionRegistry,
    gateway: Arc<LedgerGateway>,
    cache: Arc<ResultCache>,
    verifier: Arc<dyn ReceiptVerifier>,
}

impl VoteLedgerCoordinator {
    pub fn new(
        store: Storage,
        gateway: Arc<LedgerGateway>,
        cache: Arc<ResultCache>,
        verifier: Arc<dyn ReceiptVerifier>,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(store.clone()),
            registry: ElectionRegistry::new(store.clone()),
            store,
            gateway,
            cache,
            verifier,
        }
    }

    /// Record a wallet's vote, referencing the ledger transaction the client
    /// already submitted.
    pub async fn cast_vote(&self, wallet: &WalletAddress, request: VoteRequest) -> Result<CastVote> {
        let (Some(election_id), Some(candidate_id)) = (request.election_id, request.candidate_id)
        else {
            return Err(Error::invalid("electionId and candidateId are required"));
        };

        let voter = self.identity.resolve_or_create(wallet).await?;
        let election = self.registry.get_election(election_id).await?;
        if election.candidate_index(candidate_id).is_none() {
            return Err(Error::not_found("Candidate not found"));
        }

        let tx_ref = request
            .tx_ref
            .as_deref()
            .map(str::trim)
            .filter(|tx_ref| !tx_ref.is_empty())
            .ok_or_else(|| Error::invalid("txHash is required"))?;

        let already_voted = || Error::Conflict("Wallet already voted for this election".to_string());
        if self.store.vote_by(election_id, voter.id).await?.is_some() {
            return Err(already_voted());
        }

        self.verifier.verify(tx_ref).await?;

        let vote = self
            .store
            .insert_vote(VoteCore {
                election_id,
                voter_id: voter.id,
                candidate_id,
                tx_ref: tx_ref.to_string(),
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| {
                if e.is_duplicate_key() {
                    already_voted()
                } else {
                    e.into()
                }
            })?;
        info!(
            "Voter {} voted for candidate {candidate_id} in election {election_id}",
            voter.id
        );

        Ok(CastVote {
            blockchain: TransactionOutcome::Submitted {
                tx_ref: vote.tx_ref.clone(),
            },
            vote,
        })
    }

    /// Results of an election. The local tally is always computed; when
    /// `include_ledger` is set, the ledger's tally replaces it if available.
    pub async fn get_results(
        &self,
        election_id: ElectionId,
        include_ledger: bool,
    ) -> Result<ResultsView> {
        let election = self.registry.get_election(election_id).await?;
        let counts = self.store.vote_counts(election_id).await?;
        let local = election
            .candidates
            .iter()
            .map(|candidate| CandidateVotes {
                candidate: candidate.name.clone(),
                votes: counts.get(&candidate.id).copied().unwrap_or(0),
            })
            .collect();

        let ledger = if include_ledger {
            self.ledger_tally(&election).await
        } else {
            Err(SyncStatus::Skipped)
        };

        let (results, source, blockchain) = match ledger {
            Ok((entry, status)) => {
                let results = entry
                    .tally
                    .candidates
                    .into_iter()
                    .zip(entry.tally.votes)
                    .map(|(candidate, votes)| CandidateVotes { candidate, votes })
                    .collect();
                let sync = LedgerSync {
                    status,
                    cached: status == SyncStatus::Cached,
                    last_synced: Some(entry.captured_at),
                };
                (results, TallySource::Blockchain, sync)
            }
            Err(status) => (local, TallySource::Database, LedgerSync::unused(status)),
        };

        Ok(ResultsView {
            election: election.into(),
            results,
            source,
            blockchain,
        })
    }

    /// The ledger tally, from the cache if possible, or the reason there is
    /// none.
    async fn ledger_tally(
        &self,
        election: &ElectionWithCandidates,
    ) -> std::result::Result<(CachedTally, SyncStatus), SyncStatus> {
        if let Some(entry) = self.cache.get(election.id) {
            return Ok((entry, SyncStatus::Cached));
        }
        let tally = match self.gateway.resolve_ledger_id(election).await {
            Ok(ledger_id) => self.gateway.fetch_tally(ledger_id).await,
            Err(e) => Err(e),
        };
        match tally {
            Ok(tally) => Ok((self.cache.put(election.id, tally), SyncStatus::Fresh)),
            Err(TallyUnavailable::Disabled) => Err(SyncStatus::Disabled),
            Err(TallyUnavailable::NotMirrored) => {
                debug!("Election {} is not on the ledger", election.id);
                Err(SyncStatus::NotFound)
            }
            Err(TallyUnavailable::Unavailable(e)) => {
                warn!("Ledger tally for election {} unavailable: {e}", election.id);
                Err(SyncStatus::Missing)
            }
        }
    }

    /// Submit a newly created election to the ledger. Once the transaction
    /// is mined, its ledger index is recorded in the background.
    pub async fn mirror_election(&self, election: &ElectionWithCandidates) -> TransactionOutcome {
        let names: Vec<String> = election.candidates.iter().map(|c| c.name.clone()).collect();
        let submission = self.gateway.submit_election(&election.title, &names).await;
        if let TransactionOutcome::Submitted { tx_ref } = &submission.outcome {
            rocket::tokio::spawn(record_ledger_location(
                self.gateway.clone(),
                ElectionRegistry::new(self.store.clone()),
                election.id,
                tx_ref.clone(),
                submission.expected,
                names,
            ));
        }
        submission.outcome
    }
}

/// Record where a mirrored election landed. When the reserved index cannot
/// be confirmed nothing is recorded, and reads fall back to creation order.
async fn record_ledger_location(
    gateway: Arc<LedgerGateway>,
    registry: ElectionRegistry,
    election_id: ElectionId,
    tx_ref: String,
    expected: Option<LedgerElectionId>,
    candidates: Vec<String>,
) {
    match gateway.locate_election(&tx_ref, expected, &candidates).await {
        Ok(Some(ledger_id)) => {
            if let Err(e) = registry.record_ledger_id(election_id, ledger_id).await {
                error!("Failed to record ledger election for election {election_id}: {e}");
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Could not locate election {election_id} on the ledger: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::{Duration as StdDuration, Instant};

    use chrono::Duration;
    use rocket::futures::future::join_all;
    use rocket::tokio::{runtime::Builder, time::sleep};

    use super::*;
    use crate::{
        ledger::{
            fake::FakeLedger, testing::silent_node, LedgerCredentials, LedgerReceiptVerifier,
            ReceiptStatus, RpcLedgerClient, TrustCallerVerifier,
        },
        model::{
            api::ElectionSpec,
            db::{
                Candidate, Election, NewCandidate, NewElection, NewVote, NewVoter, Voter,
            },
            ids::{CandidateId, LedgerElectionId, VoterId},
        },
        store::{MemoryStore, Store, StoreResult},
    };

    struct Harness {
        store: Storage,
        fake: Arc<FakeLedger>,
        coordinator: VoteLedgerCoordinator,
        wallet: WalletAddress,
    }

    fn coordinator(store: Storage, gateway: LedgerGateway, ttl: Duration) -> VoteLedgerCoordinator {
        VoteLedgerCoordinator::new(
            store,
            Arc::new(gateway),
            Arc::new(ResultCache::new(ttl)),
            Arc::new(TrustCallerVerifier),
        )
    }

    /// A store with one election "Test" of candidates X (1) and Y (2),
    /// mirrored on a fake ledger as ledger election 0.
    async fn harness_with(store: Storage, ttl: Duration) -> Harness {
        log4rs_test_utils::test_logging::init_logging_once_for(
            ["ledger_vote_backend"],
            None,
            None,
        );

        let wallet = WalletAddress::parse("0xAAA").unwrap();
        IdentityResolver::new(store.clone())
            .resolve_or_create(&wallet)
            .await
            .unwrap();
        ElectionRegistry::new(store.clone())
            .create_election(ElectionSpec::example(), &wallet)
            .await
            .unwrap();

        let fake = Arc::new(FakeLedger::with_elections(vec![(vec!["X", "Y"], vec![7, 3])]));
        let credentials = LedgerCredentials::Node {
            account: "0xadmin".to_string(),
            passphrase: None,
        };
        let gateway = LedgerGateway::new(fake.clone(), Some(credentials));
        Harness {
            coordinator: coordinator(store.clone(), gateway, ttl),
            store,
            fake,
            wallet,
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(MemoryStore::new()), Duration::seconds(30)).await
    }

    fn vote(election_id: ElectionId, candidate_id: CandidateId, tx_ref: &str) -> VoteRequest {
        VoteRequest {
            election_id: Some(election_id),
            candidate_id: Some(candidate_id),
            tx_ref: Some(tx_ref.to_string()),
        }
    }

    #[rocket::async_test]
    async fn vote_then_conflict() {
        let h = harness().await;

        let cast = h
            .coordinator
            .cast_vote(&h.wallet, vote(1, 1, "0xref1"))
            .await
            .unwrap();
        assert_eq!(cast.vote.candidate_id, 1);
        assert_eq!(cast.blockchain.tx_ref(), Some("0xref1"));

        let err = h
            .coordinator
            .cast_vote(&h.wallet, vote(1, 2, "0xref2"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[rocket::async_test]
    async fn rejects_bad_requests_without_writing() {
        let h = harness().await;

        let missing = VoteRequest {
            candidate_id: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            h.coordinator.cast_vote(&h.wallet, missing).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            h.coordinator.cast_vote(&h.wallet, vote(5, 1, "0xref")).await,
            Err(Error::NotFound(message)) if message == "Election not found"
        ));
        assert!(matches!(
            h.coordinator.cast_vote(&h.wallet, vote(1, 3, "0xref")).await,
            Err(Error::NotFound(message)) if message == "Candidate not found"
        ));
        assert!(matches!(
            h.coordinator.cast_vote(&h.wallet, vote(1, 1, "  ")).await,
            Err(Error::InvalidInput(_))
        ));

        assert!(h.store.vote_counts(1).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn candidate_of_another_election() {
        let h = harness().await;
        let other = ElectionSpec {
            candidates: vec!["Z".to_string()],
            ..ElectionSpec::example()
        };
        ElectionRegistry::new(h.store.clone())
            .create_election(other, &h.wallet)
            .await
            .unwrap();

        // Candidate 3 ("Z") exists, but not in election 1.
        let err = h
            .coordinator
            .cast_vote(&h.wallet, vote(1, 3, "0xref"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(h.store.vote_by(1, 1).await.unwrap().is_none());
    }

    #[test]
    fn concurrent_votes_record_once() {
        let runtime = Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let h = harness().await;
            let coordinator = Arc::new(h.coordinator);

            let attempts = (0..10).map(|i| {
                let coordinator = coordinator.clone();
                let wallet = h.wallet.clone();
                rocket::tokio::spawn(async move {
                    coordinator
                        .cast_vote(&wallet, vote(1, 1 + i % 2, &format!("0xref{i}")))
                        .await
                })
            });
            let results: Vec<_> = join_all(attempts)
                .await
                .into_iter()
                .map(|joined| joined.unwrap())
                .collect();

            let ok = results.iter().filter(|r| r.is_ok()).count();
            let conflicts = results
                .iter()
                .filter(|r| matches!(r, Err(Error::Conflict(_))))
                .count();
            assert_eq!((ok, conflicts), (1, 9));
            assert_eq!(h.store.vote_counts(1).await.unwrap().values().sum::<u64>(), 1);
        });
    }

    /// Hides existing votes from the pre-insert check, like a concurrent
    /// request that checked before this one inserted.
    struct RacingStore(MemoryStore);

    #[rocket::async_trait]
    impl Store for RacingStore {
        async fn voter_by_wallet(&self, wallet: &WalletAddress) -> StoreResult<Option<Voter>> {
            self.0.voter_by_wallet(wallet).await
        }
        async fn insert_voter(&self, voter: NewVoter) -> StoreResult<Voter> {
            self.0.insert_voter(voter).await
        }
        async fn candidate_by_name(&self, name: &str) -> StoreResult<Option<Candidate>> {
            self.0.candidate_by_name(name).await
        }
        async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Candidate> {
            self.0.insert_candidate(candidate).await
        }
        async fn insert_election(&self, election: NewElection) -> StoreResult<Election> {
            self.0.insert_election(election).await
        }
        async fn set_ledger_id(&self, id: ElectionId, ledger_id: LedgerElectionId) -> StoreResult<()> {
            self.0.set_ledger_id(id, ledger_id).await
        }
        async fn election(&self, id: ElectionId) -> StoreResult<Option<ElectionWithCandidates>> {
            self.0.election(id).await
        }
        async fn elections(&self) -> StoreResult<Vec<ElectionWithCandidates>> {
            self.0.elections().await
        }
        async fn vote_by(&self, _: ElectionId, _: VoterId) -> StoreResult<Option<Vote>> {
            Ok(None)
        }
        async fn insert_vote(&self, vote: NewVote) -> StoreResult<Vote> {
            self.0.insert_vote(vote).await
        }
        async fn vote_counts(&self, id: ElectionId) -> StoreResult<HashMap<CandidateId, u64>> {
            self.0.vote_counts(id).await
        }
    }

    #[rocket::async_test]
    async fn unique_index_violation_is_conflict() {
        let h = harness_with(Arc::new(RacingStore(MemoryStore::new())), Duration::seconds(30)).await;

        h.coordinator
            .cast_vote(&h.wallet, vote(1, 1, "0xref1"))
            .await
            .unwrap();
        let err = h
            .coordinator
            .cast_vote(&h.wallet, vote(1, 1, "0xref2"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(message) if message == "Wallet already voted for this election"));
    }

    #[rocket::async_test]
    async fn verifier_rejection_records_nothing() {
        let h = harness().await;
        *h.fake.receipt.lock().unwrap() = Some(ReceiptStatus::Reverted);
        let gateway = Arc::new(LedgerGateway::new(h.fake.clone(), None));
        let coordinator = VoteLedgerCoordinator::new(
            h.store.clone(),
            gateway.clone(),
            Arc::new(ResultCache::new(Duration::seconds(30))),
            Arc::new(LedgerReceiptVerifier::new(gateway)),
        );

        let err = coordinator
            .cast_vote(&h.wallet, vote(1, 1, "0xref1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LedgerRejected(_)));
        assert!(h.store.vote_by(1, 1).await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn results_without_ledger_never_call_it() {
        let h = harness().await;
        h.coordinator
            .cast_vote(&h.wallet, vote(1, 2, "0xref1"))
            .await
            .unwrap();

        let view = h.coordinator.get_results(1, false).await.unwrap();
        assert_eq!(h.fake.total_calls(), 0);
        assert_eq!(view.source, TallySource::Database);
        assert_eq!(view.blockchain, LedgerSync::unused(SyncStatus::Skipped));
        assert_eq!(
            view.results,
            [
                CandidateVotes { candidate: "X".to_string(), votes: 0 },
                CandidateVotes { candidate: "Y".to_string(), votes: 1 },
            ]
        );
    }

    #[rocket::async_test]
    async fn results_from_ledger_are_cached() {
        let h = harness_with(Arc::new(MemoryStore::new()), Duration::milliseconds(200)).await;

        let fresh = h.coordinator.get_results(1, true).await.unwrap();
        assert_eq!(fresh.source, TallySource::Blockchain);
        assert_eq!(fresh.blockchain.status, SyncStatus::Fresh);
        assert!(!fresh.blockchain.cached);
        assert_eq!(fresh.results[0], CandidateVotes { candidate: "X".to_string(), votes: 7 });
        assert_eq!(h.fake.result_calls(), 1);

        let cached = h.coordinator.get_results(1, true).await.unwrap();
        assert_eq!(cached.blockchain.status, SyncStatus::Cached);
        assert!(cached.blockchain.cached);
        assert_eq!(cached.blockchain.last_synced, fresh.blockchain.last_synced);
        assert_eq!(h.fake.result_calls(), 1);

        sleep(StdDuration::from_millis(250)).await;
        let refreshed = h.coordinator.get_results(1, true).await.unwrap();
        assert_eq!(refreshed.blockchain.status, SyncStatus::Fresh);
        assert_eq!(h.fake.result_calls(), 2);
    }

    #[rocket::async_test]
    async fn ledger_failures_fall_back() {
        let h = harness().await;
        h.coordinator
            .cast_vote(&h.wallet, vote(1, 1, "0xref1"))
            .await
            .unwrap();

        h.fake.fail_calls.store(true, Ordering::SeqCst);
        let view = h.coordinator.get_results(1, true).await.unwrap();
        assert_eq!(view.source, TallySource::Database);
        assert_eq!(view.blockchain.status, SyncStatus::Missing);
        assert_eq!(view.results[0].votes, 1);

        // Election 2 is past the ledger's election count.
        h.fake.fail_calls.store(false, Ordering::SeqCst);
        ElectionRegistry::new(h.store.clone())
            .create_election(ElectionSpec::example(), &h.wallet)
            .await
            .unwrap();
        let view = h.coordinator.get_results(2, true).await.unwrap();
        assert_eq!(view.blockchain.status, SyncStatus::NotFound);

        let disabled = coordinator(h.store.clone(), LedgerGateway::disabled(), Duration::seconds(30));
        let view = disabled.get_results(1, true).await.unwrap();
        assert_eq!(view.blockchain.status, SyncStatus::Disabled);

        assert!(matches!(
            h.coordinator.get_results(9, true).await,
            Err(Error::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn silent_ledger_falls_back_within_timeout() {
        let h = harness().await;
        h.coordinator
            .cast_vote(&h.wallet, vote(1, 2, "0xref1"))
            .await
            .unwrap();

        let timeout = StdDuration::from_millis(200);
        let client = RpcLedgerClient::new(silent_node().await, "0xc", timeout, timeout).unwrap();
        let silent = coordinator(
            h.store.clone(),
            LedgerGateway::new(Arc::new(client), None),
            Duration::seconds(30),
        );

        let started = Instant::now();
        let view = silent.get_results(1, true).await.unwrap();
        assert!(started.elapsed() < StdDuration::from_secs(5));
        assert_eq!(view.source, TallySource::Database);
        assert_eq!(view.blockchain.status, SyncStatus::Missing);
        assert_eq!(view.results[1].votes, 1);
    }

    async fn wait_for_ledger_id(
        registry: &ElectionRegistry,
        election_id: ElectionId,
    ) -> Option<LedgerElectionId> {
        for _ in 0..50 {
            let ledger_id = registry.get_election(election_id).await.unwrap().ledger_id;
            if ledger_id.is_some() {
                return ledger_id;
            }
            sleep(StdDuration::from_millis(10)).await;
        }
        None
    }

    #[rocket::async_test]
    async fn mirrored_election_gets_ledger_id() {
        let h = harness().await;
        let registry = ElectionRegistry::new(h.store.clone());
        let election = registry
            .create_election(ElectionSpec::example(), &h.wallet)
            .await
            .unwrap();

        let outcome = h.coordinator.mirror_election(&election).await;
        assert_eq!(outcome.tx_ref(), Some("0xtx1"));
        assert_eq!(wait_for_ledger_id(&registry, election.id).await, Some(1));

        let disabled = coordinator(h.store.clone(), LedgerGateway::disabled(), Duration::seconds(30));
        assert!(matches!(
            disabled.mirror_election(&election).await,
            TransactionOutcome::Skipped { .. }
        ));
    }

    #[rocket::async_test]
    async fn back_to_back_mirrors_get_distinct_ledger_ids() {
        let h = harness().await;
        h.fake.defer_mining.store(true, Ordering::SeqCst);
        let registry = ElectionRegistry::new(h.store.clone());
        let spec = |name: &str| ElectionSpec {
            candidates: vec![name.to_string(), "Shared".to_string()],
            ..ElectionSpec::example()
        };
        let first = registry.create_election(spec("First"), &h.wallet).await.unwrap();
        let second = registry.create_election(spec("Second"), &h.wallet).await.unwrap();

        // Neither is mined when the other is submitted.
        h.coordinator.mirror_election(&first).await;
        h.coordinator.mirror_election(&second).await;

        assert_eq!(wait_for_ledger_id(&registry, first.id).await, Some(1));
        assert_eq!(wait_for_ledger_id(&registry, second.id).await, Some(2));
    }
}
