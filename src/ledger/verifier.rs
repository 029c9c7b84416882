use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};

use super::{LedgerGateway, ReceiptStatus};

/// How caller-supplied transaction references are checked before a vote is
/// recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Accept any non-empty reference.
    #[default]
    Trust,
    /// Require a mined, successful receipt on the ledger.
    Receipt,
}

/// Checks a transaction reference that a client claims records its vote.
#[rocket::async_trait]
pub trait ReceiptVerifier: Send + Sync {
    async fn verify(&self, tx_ref: &str) -> Result<()>;
}

/// Accepts every reference. Emptiness is checked by the caller.
pub struct TrustCallerVerifier;

#[rocket::async_trait]
impl ReceiptVerifier for TrustCallerVerifier {
    async fn verify(&self, _tx_ref: &str) -> Result<()> {
        Ok(())
    }
}

/// Accepts a reference only once the ledger reports a successful receipt.
pub struct LedgerReceiptVerifier {
    gateway: Arc<LedgerGateway>,
}

impl LedgerReceiptVerifier {
    pub fn new(gateway: Arc<LedgerGateway>) -> Self {
        Self { gateway }
    }
}

#[rocket::async_trait]
impl ReceiptVerifier for LedgerReceiptVerifier {
    async fn verify(&self, tx_ref: &str) -> Result<()> {
        match self.gateway.receipt_status(tx_ref).await {
            Ok(ReceiptStatus::Success) => Ok(()),
            Ok(ReceiptStatus::Reverted) => Err(Error::LedgerRejected(format!(
                "Transaction {tx_ref} was reverted"
            ))),
            Ok(ReceiptStatus::Pending) => Err(Error::LedgerRejected(format!(
                "Transaction {tx_ref} has not been mined"
            ))),
            Err(e) => {
                warn!("Could not check receipt for {tx_ref}: {e}");
                Err(Error::LedgerRejected(format!(
                    "Transaction {tx_ref} could not be verified"
                )))
            }
        }
    }
}
