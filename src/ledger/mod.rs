//! Everything that talks to the on-chain voting contract.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

pub mod abi;
mod gateway;
pub mod keys;
mod rpc;
mod signer;
mod verifier;

pub use gateway::{ElectionSubmission, LedgerGateway, LedgerTally, TallyUnavailable};
pub use keys::TransactionSigner;
pub use rpc::RpcLedgerClient;
#[cfg(test)]
pub(crate) use rpc::testing;
#[cfg(test)]
pub use signer::EchoSignatureVerifier;
pub use signer::{login_message, LocalSignatureVerifier, SignatureVerifier, Signatures};
pub use verifier::{LedgerReceiptVerifier, ReceiptVerifier, TrustCallerVerifier, VerificationMode};

use abi::{Function, Token};

/// Errors from the ledger transport or from decoding its answers.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Ledger node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Could not decode ledger response: {0}")]
    Decode(String),
    #[error("Signature error: {0}")]
    Signature(String),
}

/// Outcome of a mined transaction, as reported by its receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
    /// No receipt appeared within the wait window.
    Pending,
}

/// How transactions are signed.
#[derive(Debug, Clone)]
pub enum LedgerCredentials {
    /// Signed here and relayed with `eth_sendRawTransaction`.
    Key(Arc<TransactionSigner>),
    /// Signed by an account held on the node.
    Node {
        account: String,
        /// Keystore passphrase. Without one, the account must already be
        /// unlocked on the node.
        passphrase: Option<String>,
    },
}

impl LedgerCredentials {
    /// The sending account.
    pub fn account(&self) -> &str {
        match self {
            Self::Key(signer) => signer.address(),
            Self::Node { account, .. } => account,
        }
    }
}

/// Result of submitting a transaction through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionOutcome {
    Submitted { tx_ref: String },
    /// No signing credentials are configured; nothing was sent.
    Skipped { reason: String },
    Error { reason: String },
}

impl TransactionOutcome {
    pub fn tx_ref(&self) -> Option<&str> {
        match self {
            Self::Submitted { tx_ref } => Some(tx_ref),
            _ => None,
        }
    }
}

/// Low-level access to the contract.
#[rocket::async_trait]
pub trait LedgerClient: Send + Sync {
    /// Call a view function and return the raw ABI-encoded result.
    async fn call(&self, function: &Function, args: &[Token]) -> Result<Vec<u8>, LedgerError>;

    /// Send a state-changing transaction, returning its reference.
    async fn send(
        &self,
        function: &Function,
        args: &[Token],
        credentials: &LedgerCredentials,
    ) -> Result<String, LedgerError>;

    /// Wait for the transaction's receipt, up to the client's receipt timeout.
    async fn wait_for_receipt(&self, tx_ref: &str) -> Result<ReceiptStatus, LedgerError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! An in-process contract for tests.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeLedger {
        /// `(candidate names, votes)` per ledger election.
        pub elections: Mutex<Vec<(Vec<String>, Vec<u64>)>>,
        pub fail_calls: AtomicBool,
        pub fail_count: AtomicBool,
        pub receipt: Mutex<Option<ReceiptStatus>>,
        pub count_calls: AtomicUsize,
        pub result_calls: AtomicUsize,
        pub sends: Mutex<Vec<(&'static str, Vec<Token>)>>,
        /// Hold created elections back until a receipt is awaited, like a
        /// node that has not mined them yet. A reverted receipt drops them.
        pub defer_mining: AtomicBool,
        pending: Mutex<Vec<(Vec<String>, Vec<u64>)>>,
    }

    impl FakeLedger {
        pub fn with_elections(elections: Vec<(Vec<&str>, Vec<u64>)>) -> Self {
            let elections = elections
                .into_iter()
                .map(|(names, votes)| (names.into_iter().map(String::from).collect(), votes))
                .collect();
            Self {
                elections: Mutex::new(elections),
                ..Default::default()
            }
        }

        pub fn result_calls(&self) -> usize {
            self.result_calls.load(Ordering::SeqCst)
        }

        pub fn total_calls(&self) -> usize {
            self.result_calls() + self.count_calls.load(Ordering::SeqCst)
        }
    }

    #[rocket::async_trait]
    impl LedgerClient for FakeLedger {
        async fn call(&self, function: &Function, args: &[Token]) -> Result<Vec<u8>, LedgerError> {
            let unavailable = || LedgerError::Rpc {
                code: -32000,
                message: "unavailable".to_string(),
            };
            if function == &abi::ELECTION_COUNT {
                self.count_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_count.load(Ordering::SeqCst) || self.fail_calls.load(Ordering::SeqCst) {
                    return Err(unavailable());
                }
                let count = self.elections.lock().unwrap().len() as u64;
                Ok(abi::uint_word(count).to_vec())
            } else if function == &abi::GET_RESULTS {
                self.result_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_calls.load(Ordering::SeqCst) {
                    return Err(unavailable());
                }
                let Some(Token::Uint(id)) = args.first() else {
                    return Err(LedgerError::Decode("bad args".to_string()));
                };
                let elections = self.elections.lock().unwrap();
                let (names, votes) = elections.get(*id as usize).ok_or(LedgerError::Rpc {
                    code: 3,
                    message: "execution reverted".to_string(),
                })?;
                Ok(abi::encode_results(names, votes))
            } else {
                Err(LedgerError::Decode(format!("unexpected call {}", function.signature)))
            }
        }

        async fn send(
            &self,
            function: &Function,
            args: &[Token],
            _credentials: &LedgerCredentials,
        ) -> Result<String, LedgerError> {
            let mut sends = self.sends.lock().unwrap();
            sends.push((function.signature, args.to_vec()));
            if function == &abi::CREATE_ELECTION {
                if let Some(Token::StringArray(names)) = args.get(1) {
                    let created = (names.clone(), vec![0; names.len()]);
                    if self.defer_mining.load(Ordering::SeqCst) {
                        self.pending.lock().unwrap().push(created);
                    } else {
                        self.elections.lock().unwrap().push(created);
                    }
                }
            }
            Ok(format!("0xtx{}", sends.len()))
        }

        async fn wait_for_receipt(&self, _tx_ref: &str) -> Result<ReceiptStatus, LedgerError> {
            let status = self.receipt.lock().unwrap().unwrap_or(ReceiptStatus::Success);
            let mined: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
            if status == ReceiptStatus::Success {
                self.elections.lock().unwrap().extend(mined);
            }
            Ok(status)
        }
    }
}
