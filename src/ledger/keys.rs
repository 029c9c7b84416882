//! secp256k1 keys: recovering who signed a login message, and signing
//! transactions locally so any RPC endpoint can relay them.

use data_encoding::HEXLOWER;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rlp::RlpStream;
use sha3::{Digest, Keccak256};

use super::{abi::decode_hex, LedgerError};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// The digest a wallet signs for `personal_sign` (EIP-191, version `0x45`).
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message.as_bytes());
    keccak256(&data)
}

/// The lowercase `0x` address of a public key.
pub fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", HEXLOWER.encode(&hash[12..]))
}

fn invalid(reason: impl Into<String>) -> LedgerError {
    LedgerError::Signature(reason.into())
}

/// Recover the address that produced a 65-byte `personal_sign` signature
/// over `message`. Both `27/28` and `0/1` recovery bytes are accepted.
pub fn recover_personal_signer(message: &str, signature: &str) -> Result<String, LedgerError> {
    let bytes = decode_hex(signature)?;
    if bytes.len() != 65 {
        return Err(invalid(format!("expected 65 bytes, got {}", bytes.len())));
    }
    let v = match bytes[64] {
        v @ 27..=28 => v - 27,
        v @ 0..=1 => v,
        v => return Err(invalid(format!("bad recovery byte {v}"))),
    };
    let signature = Signature::from_slice(&bytes[..64]).map_err(|e| invalid(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(v).ok_or_else(|| invalid("bad recovery id"))?;
    let key = VerifyingKey::recover_from_prehash(
        &personal_message_hash(message),
        &signature,
        recovery_id,
    )
    .map_err(|e| invalid(e.to_string()))?;
    Ok(address_of(&key))
}

/// A pre-EIP-2718 transaction, signed with EIP-155 replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas: u64,
    /// 20-byte contract address.
    pub to: Vec<u8>,
    pub value: u128,
    pub data: Vec<u8>,
}

/// Big-endian integer bytes without leading zeros, as RLP expects.
fn strip_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

impl LegacyTransaction {
    fn rlp(&self, v: u64, r: &[u8], s: &[u8]) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        stream
            .append(&self.nonce)
            .append(&self.gas_price)
            .append(&self.gas)
            .append(&self.to)
            .append(&self.value)
            .append(&self.data)
            .append(&v)
            .append(&strip_zeros(r))
            .append(&strip_zeros(s));
        stream.out().to_vec()
    }

    /// The payload whose hash is signed: the fields followed by
    /// `(chain_id, 0, 0)`.
    pub fn signing_payload(&self, chain_id: u64) -> Vec<u8> {
        self.rlp(chain_id, &[], &[])
    }
}

/// A private key held by the server, used to sign ledger transactions.
pub struct TransactionSigner {
    key: SigningKey,
    address: String,
}

impl std::fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TransactionSigner {
    /// Load a key from 32 hex-encoded bytes, with or without `0x`.
    pub fn from_hex(private_key: &str) -> Result<Self, LedgerError> {
        let bytes = decode_hex(private_key.trim())?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| invalid("invalid private key"))?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    /// The account this key controls.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign `transaction` for `chain_id`, returning the raw bytes to pass to
    /// `eth_sendRawTransaction`.
    pub fn sign(&self, transaction: &LegacyTransaction, chain_id: u64) -> Result<Vec<u8>, LedgerError> {
        let hash = keccak256(&transaction.signing_payload(chain_id));
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| invalid(e.to_string()))?;
        let v = u64::from(recovery_id.to_byte()) + chain_id * 2 + 35;
        let bytes = signature.to_bytes();
        let (r, s) = bytes.split_at(32);
        Ok(transaction.rlp(v, r, s))
    }

    #[cfg(test)]
    pub fn sign_personal(&self, message: &str) -> String {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&personal_message_hash(message))
            .unwrap();
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        format!("0x{}", HEXLOWER.encode(&bytes))
    }
}
