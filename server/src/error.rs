use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marketcore::MarketError;
use serde::Serialize;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Market(#[from] MarketError),
    #[error("could not validate credentials")]
    Unauthorized,
    #[error("not allowed for this account")]
    Forbidden,
    #[error("too many attempts, try again later")]
    RateLimited,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: &'static str) -> Self {
        AppError::Market(MarketError::NotFound(what))
    }

    pub fn conflict(reason: &'static str) -> Self {
        AppError::Market(MarketError::Conflict(reason))
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        AppError::Market(MarketError::invalid(reason))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Market(e) => match e {
                MarketError::NotFound(_) => StatusCode::NOT_FOUND,
                MarketError::Conflict(_) => StatusCode::CONFLICT,
                MarketError::InvalidTransition { .. } | MarketError::Invalid(_) => {
                    StatusCode::BAD_REQUEST
                }
                MarketError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
                MarketError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Db(_) | AppError::Pool(_) | AppError::Join(_) | AppError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// True when `err` is a UNIQUE/CHECK constraint violation.
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

#[derive(Serialize)]
struct ErrorResp {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "internal_error".to_string()
        } else {
            self.to_string()
        };
        let mut resp = (status, Json(ErrorResp { error: message })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            resp.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        resp
    }
}
