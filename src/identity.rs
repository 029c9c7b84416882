use crate::{
    error::Result,
    model::{
        db::{Voter, VoterCore},
        wallet::WalletAddress,
    },
    store::Storage,
};

/// Maps wallet addresses to voter records.
pub struct IdentityResolver {
    store: Storage,
}

impl IdentityResolver {
    pub fn new(store: Storage) -> Self {
        Self { store }
    }

    /// Look up a voter without creating one.
    pub async fn resolve(&self, wallet: &WalletAddress) -> Result<Option<Voter>> {
        Ok(self.store.voter_by_wallet(wallet).await?)
    }

    /// Look up a voter, registering a non-admin voter on first sight.
    ///
    /// If another request registers the same wallet concurrently, the unique
    /// index rejects one insert and that request reads the winner's row.
    pub async fn resolve_or_create(&self, wallet: &WalletAddress) -> Result<Voter> {
        if let Some(voter) = self.resolve(wallet).await? {
            return Ok(voter);
        }
        match self.store.insert_voter(VoterCore::new(wallet.clone())).await {
            Ok(voter) => {
                info!("Registered voter {} for wallet {wallet}", voter.id);
                Ok(voter)
            }
            Err(e) if e.is_duplicate_key() => {
                debug!("Wallet {wallet} registered concurrently, re-reading");
                self.store
                    .voter_by_wallet(wallet)
                    .await?
                    .ok_or_else(|| e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
