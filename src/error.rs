use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Unavailable(String),
    /// A transaction reference that failed verification.
    #[error("{0}")]
    LedgerRejected(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidInput(what.into())
    }

    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::Conflict(_) => Status::Conflict,
            Self::InvalidInput(_) | Self::LedgerRejected(_) => Status::BadRequest,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::Unavailable(_) => Status::ServiceUnavailable,
            Self::Store(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature
                | JwtErrorKind::ImmatureSignature
                | JwtErrorKind::InvalidSignature => Status::Unauthorized,
                _ => Status::BadRequest,
            },
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    status: &'static str,
    pub message: String,
    pub code: u16,
}

impl ErrorBody {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            code: status.code,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let message = match (&self, status.class()) {
            // Storage details stay in the log.
            (Self::Store(_), _) => {
                error!("{self}");
                status.reason_lossy().to_string()
            }
            (_, StatusClass::ServerError) => {
                warn!("{self}");
                self.to_string()
            }
            _ => {
                debug!("{self}");
                self.to_string()
            }
        };
        (status, Json(ErrorBody::new(status, message))).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(Error::not_found("x").status(), Status::NotFound);
        assert_eq!(Error::Conflict("x".into()).status(), Status::Conflict);
        assert_eq!(Error::LedgerRejected("x".into()).status(), Status::BadRequest);
        assert_eq!(Error::Unavailable("x".into()).status(), Status::ServiceUnavailable);
        assert_eq!(
            Error::Store(StoreError::DuplicateKey("votes")).status(),
            Status::InternalServerError
        );
        let expired = JwtError::from(JwtErrorKind::ExpiredSignature);
        assert_eq!(Error::from(expired).status(), Status::Unauthorized);
    }
}
