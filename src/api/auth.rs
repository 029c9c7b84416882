use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    identity::IdentityResolver,
    ledger::{login_message, Signatures},
    model::{
        api::auth::{AuthToken, LoginRequest, LoginResponse, AUTH_TOKEN_COOKIE},
        wallet::WalletAddress,
    },
};

pub fn routes() -> Vec<Route> {
    routes![login, logout]
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

#[post("/auth/login", data = "<request>", format = "json")]
pub async fn login(
    request: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    identity: &State<IdentityResolver>,
    signatures: &State<Signatures>,
    config: &State<Config>,
) -> Result<Json<LoginResponse>> {
    let request = request.into_inner();
    let (Some(wallet), Some(signature), Some(nonce)) = (
        required(request.wallet_address),
        required(request.signature),
        required(request.nonce),
    ) else {
        return Err(Error::invalid("walletAddress, signature and nonce are required"));
    };
    let wallet = WalletAddress::parse(&wallet).map_err(|e| Error::invalid(e.to_string()))?;

    let invalid = || Error::Unauthorized("Invalid signature".to_string());
    let signer = signatures
        .0
        .recover(&login_message(&nonce), &signature)
        .await
        .map_err(|e| {
            warn!("Could not recover signer for {wallet}: {e}");
            invalid()
        })?;
    if WalletAddress::parse(&signer).ok().as_ref() != Some(&wallet) {
        debug!("Login for {wallet} was signed by {signer}");
        return Err(invalid());
    }

    let voter = identity.resolve_or_create(&wallet).await?;
    let access_token = AuthToken::new(wallet).encode(config)?;
    cookies.add(AuthToken::cookie(access_token.clone(), config));
    info!("Voter {} logged in", voter.id);

    Ok(Json(LoginResponse {
        access_token,
        user: voter.into(),
    }))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar<'_>) -> Status {
    cookies.remove(Cookie::from(AUTH_TOKEN_COOKIE));
    Status::Ok
}
