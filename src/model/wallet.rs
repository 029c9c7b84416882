use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A wallet address in canonical (trimmed, lowercase) form.
///
/// Addresses are compared case-insensitively everywhere, so the only way to
/// obtain one is through [`WalletAddress::parse`], which canonicalises.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Wallet address must not be empty or contain whitespace")]
pub struct InvalidWalletAddress;

impl WalletAddress {
    pub fn parse(raw: &str) -> Result<Self, InvalidWalletAddress> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(InvalidWalletAddress);
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WalletAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = InvalidWalletAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(wallet: WalletAddress) -> Self {
        wallet.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalises_case_and_whitespace() {
        let upper = WalletAddress::parse("  0xABCdef  ").unwrap();
        let lower = WalletAddress::parse("0xabcdef").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "0xabcdef");
    }

    #[test]
    fn rejects_empty_and_embedded_whitespace() {
        assert_eq!(WalletAddress::parse("   "), Err(InvalidWalletAddress));
        assert_eq!(WalletAddress::parse("0xab cd"), Err(InvalidWalletAddress));
    }

    #[test]
    fn deserializes_canonically() {
        let wallet: WalletAddress =
            rocket::serde::json::serde_json::from_str("\"0xAAA\"").unwrap();
        assert_eq!(wallet.as_str(), "0xaaa");
    }
}
