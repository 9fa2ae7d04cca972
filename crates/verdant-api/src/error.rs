use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Business-rule failures, mapped to structured `{"error": ...}`
/// responses at the boundary. Anything unexpected lands in `Internal`
/// and surfaces as a generic 500 without leaking details.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    /// Login with correct credentials but an unverified email. Carries
    /// the user id so the client can route to the OTP screen.
    #[error("Email not verified")]
    Unverified { user_id: Uuid },

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate username/email/membership, including unique-constraint
    /// races. Reported as 400 like the other input rejections.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(msg) | ApiError::Conflict(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            ApiError::Authentication(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            ApiError::Unverified { user_id } => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Email not verified", "user_id": user_id }),
            ),
            ApiError::Authorization(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::Internal(err) => {
                error!("Internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::Conflict("dup".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::Authentication("nope".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Unverified {
                    user_id: Uuid::new_v4(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::Authorization("denied".into()),
                StatusCode::FORBIDDEN,
            ),
            (ApiError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                ApiError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
