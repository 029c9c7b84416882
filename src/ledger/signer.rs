use std::sync::Arc;

use super::{keys, LedgerError};

/// The message a wallet signs to log in.
pub fn login_message(nonce: &str) -> String {
    format!("Login nonce: {nonce}")
}

/// Recovers the account that signed a message with `personal_sign`.
#[rocket::async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn recover(&self, message: &str, signature: &str) -> Result<String, LedgerError>;
}

/// Recovers signers with secp256k1 public key recovery, without a node.
pub struct LocalSignatureVerifier;

#[rocket::async_trait]
impl SignatureVerifier for LocalSignatureVerifier {
    async fn recover(&self, message: &str, signature: &str) -> Result<String, LedgerError> {
        keys::recover_personal_signer(message, signature)
    }
}

/// The signature verifier used for login.
#[derive(Clone)]
pub struct Signatures(pub Arc<dyn SignatureVerifier>);

/// Treats the signature as the signer's address. Only for tests.
#[cfg(test)]
pub struct EchoSignatureVerifier;

#[cfg(test)]
#[rocket::async_trait]
impl SignatureVerifier for EchoSignatureVerifier {
    async fn recover(&self, _message: &str, signature: &str) -> Result<String, LedgerError> {
        Ok(signature.to_string())
    }
}
