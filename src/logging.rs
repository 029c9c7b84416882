//! Request logging. Every request gets a tag, which names the wallet it acts
//! for when it carries a valid token.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    Data, Orbit, Request, Response, Rocket,
};

use crate::{
    api::BASE,
    model::{api::auth::presented_wallet, wallet::WalletAddress},
};

/// Identifies the log lines of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTag {
    seq: usize,
    wallet: Option<WalletAddress>,
}

impl RequestTag {
    /// Tag a new request. The sequence wraps around to zero on overflow.
    fn next(wallet: Option<WalletAddress>) -> Self {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        Self {
            seq: SEQ.fetch_add(1, Ordering::Relaxed),
            wallet,
        }
    }

    fn of<'a>(req: &'a Request<'_>) -> &'a Self {
        req.local_cache(|| Self::next(presented_wallet(req)))
    }
}

impl Display for RequestTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.wallet {
            Some(wallet) => write!(f, "req{} [{wallet}]", self.seq),
            None => write!(f, "req{} [anonymous]", self.seq),
        }
    }
}

/// The part of the API a request path falls in.
fn area(path: &str) -> &'static str {
    let Some(rest) = path.strip_prefix(BASE) else {
        return "outside api";
    };
    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.nth(1)) {
        (Some("auth"), _) => "auth",
        (Some("votes"), _) => "ballot",
        (Some("elections"), Some("results")) => "results",
        (Some("elections"), _) => "elections",
        (Some("health"), _) => "health",
        _ => "unknown",
    }
}

struct Arrival(Instant);

/// Logs each request and response with its tag, API area and latency.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let scheme = if config.tls_enabled() { "https" } else { "http" };
        info!(
            "Voting API listening on {scheme}://{}:{}{BASE}",
            config.address, config.port
        );
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        req.local_cache(|| Arrival(Instant::now()));
        let tag = RequestTag::of(req);
        info!("->{tag} {} {}", req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let tag = RequestTag::of(req);
        let elapsed = req.local_cache(|| Arrival(Instant::now())).0.elapsed();
        let status = res.status();
        let area = area(req.uri().path().as_str());
        let line = format!("<-{tag} {status} {area} in {}ms", elapsed.as_millis());
        match status.class() {
            StatusClass::ServerError => error!("{line}"),
            StatusClass::ClientError => warn!("{line}"),
            _ => info!("{line}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutting down the voting API");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_api_areas() {
        assert_eq!(area("/api/v1/auth/login"), "auth");
        assert_eq!(area("/api/v1/votes"), "ballot");
        assert_eq!(area("/api/v1/elections"), "elections");
        assert_eq!(area("/api/v1/elections/3"), "elections");
        assert_eq!(area("/api/v1/elections/3/results"), "results");
        assert_eq!(area("/api/v1/health"), "health");
        assert_eq!(area("/api/v1/nothing"), "unknown");
        assert_eq!(area("/favicon.ico"), "outside api");
    }

    #[test]
    fn tags_name_the_wallet() {
        let wallet = WalletAddress::parse("0xAAA").ok();
        let tagged = RequestTag { seq: 4, wallet };
        assert_eq!(tagged.to_string(), "req4 [0xaaa]");
        assert_eq!(RequestTag { seq: 5, wallet: None }.to_string(), "req5 [anonymous]");
    }
}
