#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment::Figment, Build, Rocket};

use crate::config::{ConfigFairing, LedgerFairing, ServicesFairing, StorageFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod registry;
pub mod store;

/// Build the server from `Rocket.toml` and `ROCKET_*` environment variables.
pub fn build() -> Rocket<Build> {
    rocket_for_figment(rocket::Config::figment())
}

fn rocket_for_figment(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .mount(api::BASE, api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StorageFairing)
        .attach(LedgerFairing)
        .attach(ServicesFairing)
}

/// A server with in-memory storage and no ledger, independent of any local
/// configuration files.
#[cfg(test)]
pub(crate) fn rocket_for_tests() -> Rocket<Build> {
    let figment = Figment::from(rocket::Config::debug_default())
        .merge(("log_level", "off"))
        .merge(("jwt_secret", "test-secret"))
        .merge(("storage", "memory"));
    rocket_for_figment(figment)
}
