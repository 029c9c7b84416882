use serde::{Deserialize, Serialize};

use crate::model::{db::Voter, ids::VoterId, wallet::WalletAddress};

/// Proof of control of a wallet: a signature over `"Login nonce: {nonce}"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub wallet_address: Option<String>,
    pub signature: Option<String>,
    pub nonce: Option<String>,
}

#[cfg(test)]
impl LoginRequest {
    /// A request that the test signature verifier accepts.
    pub fn example(wallet: &str) -> Self {
        Self {
            wallet_address: Some(wallet.to_string()),
            signature: Some(wallet.to_string()),
            nonce: Some("1234".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescription {
    pub id: VoterId,
    pub wallet_address: WalletAddress,
    pub is_admin: bool,
}

impl From<Voter> for UserDescription {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id,
            wallet_address: voter.voter.wallet_address,
            is_admin: voter.voter.is_admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserDescription,
}
