mod request;
mod token;

pub use request::{LoginRequest, LoginResponse, UserDescription};
pub use token::{presented_wallet, AuthToken, AUTH_TOKEN_COOKIE};
