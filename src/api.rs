use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::error::ErrorBody;

pub mod auth;
mod elections;
mod public;
mod votes;

/// Mount point of every route.
pub const BASE: &str = "/api/v1";

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(public::routes());
    routes.extend(auth::routes());
    routes.extend(elections::routes());
    routes.extend(votes::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// Render errors that never reached a handler (failed guards, unmatched
/// routes, malformed bodies) like handler errors.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<ErrorBody>) {
    let message = match status.code {
        401 => "Authentication required",
        404 => "Not found",
        _ => status.reason_lossy(),
    };
    (status, Json(ErrorBody::new(status, message)))
}
