use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::wallet::WalletAddress;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token for the holder of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "sub")]
    pub wallet: WalletAddress,
}

impl AuthToken {
    pub fn new(wallet: WalletAddress) -> Self {
        Self { wallet }
    }

    /// Sign this token as a JWT that expires after the configured lifetime.
    pub fn encode(&self, config: &Config) -> Result<String> {
        let claims = Claims {
            token: self.clone(),
            expire_at: Utc::now() + config.auth_ttl(),
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?)
    }

    /// Verify and decode a JWT.
    pub fn decode(jwt: &str, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            jwt,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }

    /// Wrap an encoded token in an HTTP-only cookie.
    pub fn cookie(jwt: String, config: &Config) -> Cookie<'static> {
        let mut cookie = Cookie::new(AUTH_TOKEN_COOKIE, jwt);
        cookie.set_max_age(Duration::seconds(config.auth_ttl().num_seconds()));
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Strict);
        cookie
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// The raw token from the cookie, or else from an `Authorization: Bearer`
/// header.
fn presented_token(req: &Request<'_>) -> Option<String> {
    if let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get_one("Authorization")
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|jwt| jwt.trim().to_string())
}

/// The wallet of a valid token presented with `req`, if any.
pub fn presented_wallet(req: &Request<'_>) -> Option<WalletAddress> {
    let config = req.rocket().state::<Config>()?;
    let jwt = presented_token(req)?;
    AuthToken::decode(&jwt, config).ok().map(|token| token.wallet)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            return Outcome::Error((
                Status::InternalServerError,
                Error::Unavailable("Configuration is not loaded".to_string()),
            ));
        };

        let Some(jwt) = presented_token(req) else {
            return Outcome::Error((
                Status::Unauthorized,
                Error::Unauthorized("Authentication required".to_string()),
            ));
        };

        match Self::decode(&jwt, config) {
            Ok(token) => Outcome::Success(token),
            Err(e) => {
                debug!("Rejected auth token: {e}");
                Outcome::Error((
                    Status::Unauthorized,
                    Error::Unauthorized("Invalid or expired token".to_string()),
                ))
            }
        }
    }
}
