use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use rocket::serde::json::{json, Value};
use rocket::tokio::sync::Mutex;
use rocket::tokio::time::{sleep, Instant};
use serde::{de::DeserializeOwned, Deserialize};

use super::{
    abi::{self, Function, Token},
    keys::{LegacyTransaction, TransactionSigner},
    LedgerClient, LedgerCredentials, LedgerError, ReceiptStatus,
};

/// How often to poll for a receipt while waiting.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A JSON-RPC client for an Ethereum-compatible node hosting the voting
/// contract.
///
/// Every request is bounded by the configured timeout and is never retried.
pub struct RpcLedgerClient {
    http: Client,
    url: String,
    contract: String,
    receipt_timeout: Duration,
    /// Chain to sign for. Asked of the node when not configured.
    chain_id: Option<u64>,
    next_id: AtomicU64,
    /// Held from reading the account nonce until the signed transaction is
    /// accepted, so concurrent sends get consecutive nonces.
    nonce_lock: Mutex<()>,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Receipt {
    status: Option<String>,
}

impl RpcLedgerClient {
    pub fn new(
        url: impl Into<String>,
        contract: impl Into<String>,
        timeout: Duration,
        receipt_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            contract: contract.into(),
            receipt_timeout,
            chain_id: None,
            next_id: AtomicU64::new(1),
            nonce_lock: Mutex::new(()),
        })
    }

    pub fn with_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Perform one JSON-RPC request. A `null` result is returned as `None`.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!("ledger rpc #{id} {method}");
        let response: RpcResponse<T> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }

    /// Like [`Self::request`], but a missing result is an error.
    async fn request_some<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        self.request(method, params)
            .await?
            .ok_or_else(|| LedgerError::Decode(format!("`{method}` returned no result")))
    }

    /// Read a hex quantity such as the result of `eth_gasPrice`.
    async fn quantity(&self, method: &str, params: Value) -> Result<u128, LedgerError> {
        let hex: String = self.request_some(method, params).await?;
        parse_quantity(&hex)
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        if let Some(chain_id) = self.chain_id {
            return Ok(chain_id);
        }
        let chain_id = self.quantity("eth_chainId", json!([])).await?;
        u64::try_from(chain_id).map_err(|_| LedgerError::Decode(format!("chain id {chain_id}")))
    }

    /// Sign the call locally and relay it as a raw transaction.
    async fn send_signed(
        &self,
        signer: &TransactionSigner,
        data: Vec<u8>,
        gas: u64,
    ) -> Result<String, LedgerError> {
        let to = abi::decode_hex(&self.contract)?;
        if to.len() != 20 {
            return Err(LedgerError::Decode(format!(
                "contract address {} is not 20 bytes",
                self.contract
            )));
        }
        let chain_id = self.chain_id().await?;
        let gas_price = self.quantity("eth_gasPrice", json!([])).await?;

        let _guard = self.nonce_lock.lock().await;
        let nonce = self
            .quantity("eth_getTransactionCount", json!([signer.address(), "pending"]))
            .await?;
        let transaction = LegacyTransaction {
            nonce: u64::try_from(nonce).map_err(|_| LedgerError::Decode(format!("nonce {nonce}")))?,
            gas_price,
            gas,
            to,
            value: 0,
            data,
        };
        let raw = signer.sign(&transaction, chain_id)?;
        let raw = format!("0x{}", data_encoding::HEXLOWER.encode(&raw));
        self.request_some("eth_sendRawTransaction", json!([raw])).await
    }
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(hex: &str) -> Result<u128, LedgerError> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Decode(format!("invalid quantity {hex}: {e}")))
}

#[rocket::async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn call(&self, function: &Function, args: &[Token]) -> Result<Vec<u8>, LedgerError> {
        let call = json!({
            "to": self.contract,
            "data": abi::encode_call(function, args),
        });
        let result: String = self.request_some("eth_call", json!([call, "latest"])).await?;
        abi::decode_hex(&result)
    }

    async fn send(
        &self,
        function: &Function,
        args: &[Token],
        credentials: &LedgerCredentials,
    ) -> Result<String, LedgerError> {
        debug!("Sending `{}` from {}", function.signature, credentials.account());
        let data = abi::encode_call(function, args);
        match credentials {
            LedgerCredentials::Key(signer) => {
                let data = abi::decode_hex(&data)?;
                self.send_signed(signer, data, function.gas).await
            }
            LedgerCredentials::Node { account, passphrase } => {
                let transaction = json!({
                    "from": account,
                    "to": self.contract,
                    "data": data,
                    "gas": format!("{:#x}", function.gas),
                });
                match passphrase {
                    Some(passphrase) => {
                        self.request_some("personal_sendTransaction", json!([transaction, passphrase]))
                            .await
                    }
                    None => self.request_some("eth_sendTransaction", json!([transaction])).await,
                }
            }
        }
    }

    async fn wait_for_receipt(&self, tx_ref: &str) -> Result<ReceiptStatus, LedgerError> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let receipt: Option<Receipt> = self
                .request("eth_getTransactionReceipt", json!([tx_ref]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(match receipt.status.as_deref() {
                    Some("0x1") => ReceiptStatus::Success,
                    _ => ReceiptStatus::Reverted,
                });
            }
            if Instant::now() + RECEIPT_POLL_INTERVAL > deadline {
                return Ok(ReceiptStatus::Pending);
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}
