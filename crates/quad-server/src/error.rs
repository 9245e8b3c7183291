use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quad_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServerError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Invalid(msg) => ServerError::BadRequest(msg),
            StoreError::NotFound(msg) => ServerError::NotFound(msg),
            StoreError::Conflict(msg) => ServerError::Conflict(msg),
            StoreError::Forbidden(msg) => ServerError::Forbidden(msg),
            other => {
                tracing::error!(error = %other, "storage failure");
                ServerError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.public_message(),
        });

        (self.status(), axum::Json(body)).into_response()
    }
}

/// `axum::Json` whose rejection is a [`ServerError::BadRequest`], so missing
/// or malformed fields get the same `{"error": ...}` body as everything else.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with the same rejection mapping as [`ApiJson`].
#[derive(axum::extract::FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct ApiQuery<T>(pub T);

/// `axum::extract::Path` with the same rejection mapping as [`ApiJson`].
#[derive(axum::extract::FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServerError))]
pub struct ApiPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_status_codes() {
        let cases = [
            (StoreError::Invalid("x".into()), StatusCode::BAD_REQUEST),
            (StoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (StoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (StoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (StoreError::NoDataDir, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (store_err, status) in cases {
            assert_eq!(ServerError::from(store_err).status(), status);
        }
    }

    #[test]
    fn test_internal_message_is_redacted() {
        let err = ServerError::Internal("disk on fire".into());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(
            ServerError::Conflict("already friends".into()).public_message(),
            "already friends"
        );
    }
}
