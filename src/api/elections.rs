use rocket::{
    http::Status,
    serde::json::{json, Json, Value},
    Route, State,
};

use crate::{
    coordinator::VoteLedgerCoordinator,
    error::Result,
    model::{
        api::{auth::AuthToken, ElectionDescription, ElectionSpec, ResultsView},
        ids::ElectionId,
    },
    registry::ElectionRegistry,
};

pub fn routes() -> Vec<Route> {
    routes![elections, create_election, election, results]
}

#[get("/elections")]
async fn elections(_token: AuthToken, registry: &State<ElectionRegistry>) -> Result<Value> {
    let elections: Vec<ElectionDescription> = registry
        .list_elections()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(json!({ "elections": elections }))
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken,
    spec: Json<ElectionSpec>,
    registry: &State<ElectionRegistry>,
    coordinator: &State<VoteLedgerCoordinator>,
) -> Result<(Status, Value)> {
    let election = registry
        .create_election(spec.into_inner(), &token.wallet)
        .await?;
    let blockchain = coordinator.mirror_election(&election).await;

    let mut description = json!(ElectionDescription::from(election));
    description["blockchain"] = json!(blockchain);
    Ok((Status::Created, json!({ "election": description })))
}

#[get("/elections/<election_id>")]
async fn election(
    _token: AuthToken,
    election_id: ElectionId,
    registry: &State<ElectionRegistry>,
) -> Result<Value> {
    let election = ElectionDescription::from(registry.get_election(election_id).await?);
    Ok(json!({ "election": election }))
}

/// Results from the ledger unless `blockchain=false`.
#[get("/elections/<election_id>/results?<blockchain>")]
async fn results(
    _token: AuthToken,
    election_id: ElectionId,
    blockchain: Option<bool>,
    coordinator: &State<VoteLedgerCoordinator>,
) -> Result<Json<ResultsView>> {
    let view = coordinator
        .get_results(election_id, blockchain.unwrap_or(true))
        .await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use rocket::{http::ContentType, local::asynchronous::Client};

    use super::*;
    use crate::config::Config;
    use crate::model::{
        api::{SyncStatus, TallySource},
        wallet::WalletAddress,
    };
    use crate::store::Storage;

    async fn create(client: &Client, spec: Value) -> (Status, Value) {
        let response = client
            .post("/api/v1/elections")
            .header(ContentType::JSON)
            .body(spec.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json().await.unwrap())
    }

    #[backend_test(voter)]
    async fn create_and_fetch(client: Client) {
        let (status, body) = create(&client, json!(ElectionSpec::example())).await;
        assert_eq!(Status::Created, status);
        let election = &body["election"];
        assert_eq!(election["title"], "Test");
        assert_eq!(election["candidates"][0]["name"], "X");
        assert_eq!(election["candidates"][1]["name"], "Y");
        // No ledger in tests.
        assert_eq!(election["blockchain"]["status"], "skipped");

        let id = election["id"].as_u64().unwrap();
        let response = client.get(format!("/api/v1/elections/{id}")).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let fetched = response.into_json::<Value>().await.unwrap();
        assert_eq!(fetched["election"]["title"], "Test");

        let response = client.get("/api/v1/elections").dispatch().await;
        let list = response.into_json::<Value>().await.unwrap();
        assert_eq!(list["elections"].as_array().unwrap().len(), 1);
    }

    #[backend_test(voter)]
    async fn create_validates(client: Client, storage: Storage) {
        let (status, body) = create(&client, json!({ "title": "Test", "candidates": [] })).await;
        assert_eq!(Status::BadRequest, status);
        assert_eq!(body["message"], "title and candidates are required");

        let (status, _) = create(&client, json!({ "title": "Test", "candidates": ["X", "X"] })).await;
        assert_eq!(Status::BadRequest, status);

        assert!(storage.elections().await.unwrap().is_empty());
    }

    #[backend_test(voter)]
    async fn shared_candidates(client: Client) {
        let spec = json!({ "title": "A", "candidates": ["Alice", "Bob"] });
        let (_, first) = create(&client, spec).await;
        let spec = json!({ "title": "B", "candidates": ["Alice", "Bob"] });
        let (_, second) = create(&client, spec).await;
        assert_eq!(
            first["election"]["candidates"],
            second["election"]["candidates"]
        );
    }

    #[backend_test(voter)]
    async fn missing_election(client: Client) {
        let response = client.get("/api/v1/elections/42").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["message"], "Election not found");

        let response = client.get("/api/v1/elections/42/results").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(voter)]
    async fn results_fall_back_to_database(client: Client) {
        create(&client, json!(ElectionSpec::example())).await;

        let response = client.get("/api/v1/elections/1/results").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let view = response.into_json::<ResultsView>().await.unwrap();
        assert_eq!(view.source, TallySource::Database);
        assert_eq!(view.blockchain.status, SyncStatus::Disabled);
        assert!(view.results.iter().all(|r| r.votes == 0));

        let response = client
            .get("/api/v1/elections/1/results?blockchain=false")
            .dispatch()
            .await;
        let view = response.into_json::<ResultsView>().await.unwrap();
        assert_eq!(view.blockchain.status, SyncStatus::Skipped);
    }

    #[backend_test]
    async fn unregistered_creator_is_not_found(client: Client, storage: Storage) {
        let config = client.rocket().state::<Config>().unwrap();
        let wallet = WalletAddress::parse("0xBBB").unwrap();
        let jwt = AuthToken::new(wallet.clone()).encode(config).unwrap();

        let response = client
            .post("/api/v1/elections")
            .header(ContentType::JSON)
            .header(rocket::http::Header::new("Authorization", format!("Bearer {jwt}")))
            .body(json!(ElectionSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["message"], "Voter not found");

        assert!(storage.voter_by_wallet(&wallet).await.unwrap().is_none());
        assert!(storage.elections().await.unwrap().is_empty());
    }

    #[backend_test]
    async fn elections_require_auth(client: Client) {
        let response = client.get("/api/v1/elections").dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["code"], 401);
    }
}
