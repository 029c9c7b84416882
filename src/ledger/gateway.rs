use std::sync::Arc;

use rocket::tokio::sync::Mutex;
use thiserror::Error;

use crate::model::{db::Election, ids::LedgerElectionId};

use super::{
    abi::{self, Function, Token},
    LedgerClient, LedgerCredentials, LedgerError, ReceiptStatus, TransactionOutcome,
};

/// Why the ledger could not provide a tally. None of these are errors from
/// the client's point of view: the local tally is used instead.
#[derive(Debug, Error)]
pub enum TallyUnavailable {
    #[error("No ledger is configured")]
    Disabled,
    #[error("Election is not on the ledger")]
    NotMirrored,
    #[error(transparent)]
    Unavailable(#[from] LedgerError),
}

/// Candidate names and vote counts as recorded by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTally {
    pub candidates: Vec<String>,
    pub votes: Vec<u64>,
}

/// Facade over the voting contract.
///
/// A gateway without a client is disabled: reads report
/// [`TallyUnavailable::Disabled`] and writes are skipped. A gateway with a
/// client but no credentials can read but never sends transactions.
pub struct LedgerGateway {
    client: Option<Arc<dyn LedgerClient>>,
    credentials: Option<LedgerCredentials>,
    /// Highest ledger index handed to a submitted election.
    reserved: Mutex<Option<LedgerElectionId>>,
}

/// A submitted election-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionSubmission {
    pub outcome: TransactionOutcome,
    /// The ledger index the election will get if nothing else creates one
    /// first. `None` when nothing was sent or the count was unreadable.
    pub expected: Option<LedgerElectionId>,
}

impl LedgerGateway {
    pub fn new(client: Arc<dyn LedgerClient>, credentials: Option<LedgerCredentials>) -> Self {
        Self {
            client: Some(client),
            credentials,
            reserved: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: None,
            credentials: None,
            reserved: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&dyn LedgerClient, TallyUnavailable> {
        self.client.as_deref().ok_or(TallyUnavailable::Disabled)
    }

    async fn call(&self, function: &Function, args: &[Token]) -> Result<Vec<u8>, TallyUnavailable> {
        Ok(self.client()?.call(function, args).await?)
    }

    /// Number of elections the contract holds.
    pub async fn election_count(&self) -> Result<u64, TallyUnavailable> {
        let data = self.call(&abi::ELECTION_COUNT, &[]).await?;
        Ok(abi::decode_uint(&data, 0)?)
    }

    /// Find the ledger index of a local election.
    ///
    /// Uses the recorded mapping if there is one, and otherwise assumes
    /// elections were mirrored in creation order (`id - 1`). The index is
    /// checked against `electionCount()`; if the count cannot be read, the
    /// computed index is returned unchecked so the following read reports
    /// the real failure.
    pub async fn resolve_ledger_id(
        &self,
        election: &Election,
    ) -> Result<LedgerElectionId, TallyUnavailable> {
        self.client()?;
        let ledger_id = match election.ledger_id {
            Some(ledger_id) => ledger_id,
            None => LedgerElectionId::from(election.id)
                .checked_sub(1)
                .ok_or(TallyUnavailable::NotMirrored)?,
        };
        match self.election_count().await {
            Ok(count) if ledger_id >= count => {
                debug!(
                    "Election {} maps to ledger election {ledger_id}, but the ledger only has {count}",
                    election.id
                );
                Err(TallyUnavailable::NotMirrored)
            }
            Ok(_) => Ok(ledger_id),
            Err(e) => {
                warn!("Could not read ledger election count, assuming {ledger_id} exists: {e}");
                Ok(ledger_id)
            }
        }
    }

    /// Read the tally of a ledger election. Arrays of different lengths are
    /// treated as an unusable answer rather than truncated.
    pub async fn fetch_tally(
        &self,
        ledger_id: LedgerElectionId,
    ) -> Result<LedgerTally, TallyUnavailable> {
        let data = self.call(&abi::GET_RESULTS, &[Token::Uint(ledger_id)]).await?;
        let (candidates, votes) = abi::decode_results(&data)?;
        if candidates.len() != votes.len() {
            return Err(LedgerError::Decode(format!(
                "{} candidates but {} vote counts",
                candidates.len(),
                votes.len()
            ))
            .into());
        }
        Ok(LedgerTally { candidates, votes })
    }

    async fn submit(&self, function: &Function, args: &[Token]) -> TransactionOutcome {
        let (Some(client), Some(credentials)) = (&self.client, &self.credentials) else {
            return TransactionOutcome::Skipped {
                reason: "No ledger signing account is configured".to_string(),
            };
        };
        match client.send(function, args, credentials).await {
            Ok(tx_ref) => {
                info!("Submitted `{}` as {tx_ref}", function.signature);
                TransactionOutcome::Submitted { tx_ref }
            }
            Err(e) => {
                warn!("Failed to submit `{}`: {e}", function.signature);
                TransactionOutcome::Error {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub async fn submit_vote(
        &self,
        ledger_id: LedgerElectionId,
        candidate_index: usize,
    ) -> TransactionOutcome {
        let args = [Token::Uint(ledger_id), Token::Uint(candidate_index as u64)];
        self.submit(&abi::VOTE, &args).await
    }

    /// Submit an election and reserve the ledger index it should land at.
    ///
    /// Submissions through this gateway are serialized from the count read
    /// until the node accepts the transaction, and each one reserves the
    /// index after the previous reservation. Elections submitted back to
    /// back therefore get distinct indices even though neither is mined yet.
    pub async fn submit_election(&self, title: &str, candidates: &[String]) -> ElectionSubmission {
        let args = [
            Token::String(title.to_string()),
            Token::StringArray(candidates.to_vec()),
        ];
        if self.client.is_none() || self.credentials.is_none() {
            return ElectionSubmission {
                outcome: self.submit(&abi::CREATE_ELECTION, &args).await,
                expected: None,
            };
        }

        let mut reserved = self.reserved.lock().await;
        let expected = match self.election_count().await {
            Ok(count) => Some(reserved.map_or(count, |last| count.max(last.saturating_add(1)))),
            Err(e) => {
                warn!("Could not read ledger election count before creating an election: {e}");
                None
            }
        };
        let outcome = self.submit(&abi::CREATE_ELECTION, &args).await;
        let expected = expected.filter(|_| outcome.tx_ref().is_some());
        if expected.is_some() {
            *reserved = expected;
        }
        ElectionSubmission { outcome, expected }
    }

    /// Give back a reservation whose transaction did not create an election.
    async fn release(&self, ledger_id: LedgerElectionId) {
        let mut reserved = self.reserved.lock().await;
        if *reserved == Some(ledger_id) {
            *reserved = ledger_id.checked_sub(1);
        }
    }

    /// Wait (bounded by the client) for a transaction's receipt.
    pub async fn receipt_status(&self, tx_ref: &str) -> Result<ReceiptStatus, TallyUnavailable> {
        Ok(self.client()?.wait_for_receipt(tx_ref).await?)
    }

    /// Once an election-creation transaction has been mined successfully,
    /// confirm that the reserved index `expected` holds an election with
    /// the submitted `candidates` and return it.
    ///
    /// Returns `None` if the transaction reverted or was not mined in time,
    /// if there was no reservation, or if the index holds something else.
    pub async fn locate_election(
        &self,
        tx_ref: &str,
        expected: Option<LedgerElectionId>,
        candidates: &[String],
    ) -> Result<Option<LedgerElectionId>, TallyUnavailable> {
        let status = self.receipt_status(tx_ref).await?;
        if status != ReceiptStatus::Success {
            warn!("Election transaction {tx_ref} was not mined successfully: {status:?}");
            if status == ReceiptStatus::Reverted {
                if let Some(ledger_id) = expected {
                    self.release(ledger_id).await;
                }
            }
            return Ok(None);
        }
        let Some(ledger_id) = expected else {
            return Ok(None);
        };
        if ledger_id >= self.election_count().await? {
            warn!("Election transaction {tx_ref} was mined but ledger election {ledger_id} does not exist");
            return Ok(None);
        }
        let tally = self.fetch_tally(ledger_id).await?;
        if tally.candidates != candidates {
            warn!("Ledger election {ledger_id} does not hold the ballot submitted in {tx_ref}");
            return Ok(None);
        }
        Ok(Some(ledger_id))
    }
}
