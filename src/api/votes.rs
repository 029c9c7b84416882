use rocket::{
    serde::json::{json, Json, Value},
    Route, State,
};

use crate::{
    coordinator::VoteLedgerCoordinator,
    error::Result,
    model::api::{auth::AuthToken, VoteDescription, VoteRequest},
};

pub fn routes() -> Vec<Route> {
    routes![vote]
}

#[post("/vote", data = "<request>", format = "json")]
async fn vote(
    token: AuthToken,
    request: Json<VoteRequest>,
    coordinator: &State<VoteLedgerCoordinator>,
) -> Result<Value> {
    let cast = coordinator
        .cast_vote(&token.wallet, request.into_inner())
        .await?;
    Ok(json!({
        "status": "ok",
        "vote": VoteDescription::from(cast.vote),
        "blockchain": cast.blockchain,
    }))
}
