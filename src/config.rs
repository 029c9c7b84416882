use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::{
    cache::ResultCache,
    coordinator::VoteLedgerCoordinator,
    identity::IdentityResolver,
    ledger::{
        LedgerCredentials, LedgerError, LedgerGateway, LedgerReceiptVerifier, ReceiptVerifier,
        RpcLedgerClient, SignatureVerifier, Signatures, TransactionSigner, TrustCallerVerifier,
        VerificationMode,
    },
    registry::ElectionRegistry,
    store::{MemoryStore, MongoStore, Storage},
};

/// Which store backs the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Mongodb,
    /// Process-local, lost on restart.
    Memory,
}

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "defaults::auth_ttl")]
    auth_ttl: u32,
    #[serde(default)]
    storage: StorageKind,
    #[serde(default = "defaults::db_name")]
    db_name: String,
    ledger_rpc_url: Option<String>,
    ledger_contract_address: Option<String>,
    ledger_account: Option<String>,
    ledger_chain_id: Option<u64>,
    #[serde(default = "defaults::ledger_cache_ttl")]
    ledger_cache_ttl: u32,
    #[serde(default = "defaults::ledger_timeout")]
    ledger_timeout: u32,
    #[serde(default = "defaults::ledger_receipt_timeout")]
    ledger_receipt_timeout: u32,
    #[serde(default)]
    ledger_verification: VerificationMode,
    // secrets
    jwt_secret: String,
    db_uri: Option<String>,
    ledger_passphrase: Option<String>,
    ledger_private_key: Option<String>,
}

mod defaults {
    pub fn auth_ttl() -> u32 {
        3600
    }

    pub fn db_name() -> String {
        "ledger_vote".to_string()
    }

    pub fn ledger_cache_ttl() -> u32 {
        30
    }

    pub fn ledger_timeout() -> u32 {
        10
    }

    pub fn ledger_receipt_timeout() -> u32 {
        60
    }
}

impl Config {
    /// Valid lifetime of auth tokens.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    /// How long a ledger tally is served from the cache.
    pub fn ledger_cache_ttl(&self) -> Duration {
        Duration::seconds(self.ledger_cache_ttl.into())
    }

    /// Bound on every ledger request.
    pub fn ledger_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.ledger_timeout.into())
    }

    /// Bound on waiting for a transaction to be mined.
    pub fn ledger_receipt_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.ledger_receipt_timeout.into())
    }

    pub fn ledger_verification(&self) -> VerificationMode {
        self.ledger_verification
    }

    /// How to sign ledger transactions, if at all. A private key takes
    /// precedence over a node account, and must match `ledger_account` when
    /// both are set.
    pub fn ledger_credentials(&self) -> Result<Option<LedgerCredentials>, LedgerError> {
        if let Some(private_key) = &self.ledger_private_key {
            let signer = TransactionSigner::from_hex(private_key)?;
            if let Some(account) = &self.ledger_account {
                if !account.eq_ignore_ascii_case(signer.address()) {
                    return Err(LedgerError::Signature(format!(
                        "private key controls {}, not {account}",
                        signer.address()
                    )));
                }
            }
            return Ok(Some(LedgerCredentials::Key(Arc::new(signer))));
        }
        Ok(self
            .ledger_account
            .as_ref()
            .map(|account| LedgerCredentials::Node {
                account: account.clone(),
                passphrase: self.ledger_passphrase.clone(),
            }))
    }

    /// Build a ledger client, if a node and contract are configured.
    pub fn ledger_client(&self) -> Option<Result<RpcLedgerClient, LedgerError>> {
        let url = self.ledger_rpc_url.as_ref()?;
        let contract = self.ledger_contract_address.as_ref()?;
        Some(
            RpcLedgerClient::new(
                url.clone(),
                contract.clone(),
                self.ledger_timeout(),
                self.ledger_receipt_timeout(),
            )
            .map(|client| client.with_chain_id(self.ledger_chain_id)),
        )
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// A fairing that opens the configured store, performs any setup necessary,
/// and places a [`Storage`] into managed state.
pub struct StorageFairing;

#[rocket::async_trait]
impl Fairing for StorageFairing {
    fn info(&self) -> Info {
        Info {
            name: "Storage",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>() else {
            error!("Storage fairing requires the config fairing");
            return Err(rocket);
        };
        let db_uri = config.db_uri.clone();
        let db_name = config.db_name.clone();

        let storage: Storage = match config.storage {
            StorageKind::Memory => {
                warn!("Using in-memory storage, nothing will persist");
                Arc::new(MemoryStore::new())
            }
            StorageKind::Mongodb => {
                let Some(db_uri) = db_uri else {
                    error!("`db_uri` must be set when `storage` is `mongodb`");
                    return Err(rocket);
                };
                info!("Connecting to database...");
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                // Ensures the required indexes exist.
                match MongoStore::connect(&client.database(&db_name)).await {
                    Ok(store) => {
                        info!("...database connection online!");
                        Arc::new(store)
                    }
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
        };

        Ok(rocket.manage(storage))
    }
}

/// A fairing that connects to the ledger node, if configured, and places the
/// [`LedgerGateway`], [`ResultCache`] and [`Signatures`] into managed state.
pub struct LedgerFairing;

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>() else {
            error!("Ledger fairing requires the config fairing");
            return Err(rocket);
        };

        let client = match config.ledger_client() {
            Some(Ok(client)) => Some(client),
            Some(Err(e)) => {
                error!("Failed to create ledger client: {e}");
                return Err(rocket);
            }
            None => {
                warn!("No ledger configured, results come from the database only");
                None
            }
        };

        let gateway = match client {
            Some(client) => {
                let credentials = match config.ledger_credentials() {
                    Ok(credentials) => credentials,
                    Err(e) => {
                        error!("Invalid ledger signing config: {e}");
                        return Err(rocket);
                    }
                };
                if credentials.is_none() {
                    info!("No ledger account configured, ledger writes are skipped");
                }
                LedgerGateway::new(Arc::new(client), credentials)
            }
            None => LedgerGateway::disabled(),
        };
        let gateway = Arc::new(gateway);

        let verifier: Arc<dyn ReceiptVerifier> = match config.ledger_verification() {
            VerificationMode::Trust => Arc::new(TrustCallerVerifier),
            VerificationMode::Receipt => Arc::new(LedgerReceiptVerifier::new(gateway.clone())),
        };
        info!(
            "Loaded ledger config, verification mode {:?}",
            config.ledger_verification()
        );

        let signatures = Signatures(signature_verifier());
        let cache = Arc::new(ResultCache::new(config.ledger_cache_ttl()));

        Ok(rocket
            .manage(gateway)
            .manage(cache)
            .manage(verifier)
            .manage(signatures))
    }
}

/// Login signatures are recovered locally.
#[cfg(not(test))]
fn signature_verifier() -> Arc<dyn SignatureVerifier> {
    Arc::new(crate::ledger::LocalSignatureVerifier)
}

/// Tests log in with made-up wallets, so signatures name their signer directly.
#[cfg(test)]
fn signature_verifier() -> Arc<dyn SignatureVerifier> {
    Arc::new(crate::ledger::EchoSignatureVerifier)
}

/// A fairing that assembles the services used by the endpoints from the
/// storage and ledger state, and places them into managed state.
pub struct ServicesFairing;

#[rocket::async_trait]
impl Fairing for ServicesFairing {
    fn info(&self) -> Info {
        Info {
            name: "Services",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let parts = (
            rocket.state::<Storage>().cloned(),
            rocket.state::<Arc<LedgerGateway>>().cloned(),
            rocket.state::<Arc<ResultCache>>().cloned(),
            rocket.state::<Arc<dyn ReceiptVerifier>>().cloned(),
        );
        let (Some(storage), Some(gateway), Some(cache), Some(verifier)) = parts else {
            error!("Services fairing requires the storage and ledger fairings");
            return Err(rocket);
        };

        let coordinator = VoteLedgerCoordinator::new(storage.clone(), gateway, cache, verifier);
        Ok(rocket
            .manage(IdentityResolver::new(storage.clone()))
            .manage(ElectionRegistry::new(storage))
            .manage(coordinator))
    }
}

#[cfg(test)]
mod tests {
    use rocket::figment::Figment;

    use super::*;

    #[test]
    fn defaults_apply() {
        let config: Config = Figment::new()
            .merge(("jwt_secret", "secret"))
            .extract()
            .unwrap();
        assert_eq!(config.auth_ttl(), Duration::seconds(3600));
        assert_eq!(config.storage(), StorageKind::Mongodb);
        assert_eq!(config.db_name, "ledger_vote");
        assert_eq!(config.ledger_cache_ttl(), Duration::seconds(30));
        assert_eq!(config.ledger_timeout(), StdDuration::from_secs(10));
        assert_eq!(config.ledger_verification(), VerificationMode::Trust);
        assert!(config.ledger_client().is_none());
        assert!(config.ledger_credentials().unwrap().is_none());
    }

    #[test]
    fn ledger_settings() {
        let config: Config = Figment::new()
            .merge(("jwt_secret", "secret"))
            .merge(("storage", "memory"))
            .merge(("ledger_rpc_url", "http://127.0.0.1:8545"))
            .merge(("ledger_contract_address", "0xcontract"))
            .merge(("ledger_account", "0xadmin"))
            .merge(("ledger_verification", "receipt"))
            .extract()
            .unwrap();
        assert_eq!(config.storage(), StorageKind::Memory);
        assert!(matches!(config.ledger_client(), Some(Ok(_))));
        assert!(matches!(
            config.ledger_credentials(),
            Ok(Some(LedgerCredentials::Node { account, passphrase: None })) if account == "0xadmin"
        ));
        assert_eq!(config.ledger_verification(), VerificationMode::Receipt);
    }

    #[test]
    fn private_key_signs_locally() {
        let key = "0x4646464646464646464646464646464646464646464646464646464646464646";
        let config: Config = Figment::new()
            .merge(("jwt_secret", "secret"))
            .merge(("ledger_private_key", key))
            .merge(("ledger_account", "0x9D8A62F656A8D1615C1294FD71E9CFB3E4855A4F"))
            .extract()
            .unwrap();
        let Ok(Some(LedgerCredentials::Key(signer))) = config.ledger_credentials() else {
            panic!("expected a local key");
        };
        assert_eq!(signer.address(), "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f");

        let mismatched: Config = Figment::new()
            .merge(("jwt_secret", "secret"))
            .merge(("ledger_private_key", key))
            .merge(("ledger_account", "0xadmin"))
            .extract()
            .unwrap();
        assert!(mismatched.ledger_credentials().is_err());
    }
}
