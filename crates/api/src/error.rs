//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use lifecycle::LifecycleError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request that never reached the engine.
    BadRequest(String),
    /// Error returned by the lifecycle engine.
    Lifecycle(LifecycleError),
}

impl ApiError {
    /// Returns the HTTP status and the stable error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            ApiError::Lifecycle(err) => {
                let status = match err {
                    LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
                    LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
                    LifecycleError::InvalidTransition { .. } | LifecycleError::Conflict { .. } => {
                        StatusCode::CONFLICT
                    }
                    LifecycleError::Indeterminate { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    LifecycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Lifecycle(err) => err.to_string(),
        };

        metrics::counter!("http_errors_total", "code" => code).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, code, "request failed");
        }

        let body = serde_json::json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Lifecycle(err.into())
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, Version};
    use domain::OrderStatus;

    use super::*;

    #[test]
    fn test_lifecycle_errors_map_to_status() {
        let cases = [
            (
                ApiError::from(OrderError::NoLines),
                StatusCode::BAD_REQUEST,
                "VALIDATION",
            ),
            (
                ApiError::from(OrderError::IdempotencyKeyReused {
                    key: "checkout-1".to_string(),
                }),
                StatusCode::BAD_REQUEST,
                "VALIDATION",
            ),
            (
                LifecycleError::NotFound(OrderId::new()).into(),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                LifecycleError::InvalidTransition {
                    from: OrderStatus::Pending,
                    to: OrderStatus::Shipped,
                }
                .into(),
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
            ),
            (
                LifecycleError::Conflict {
                    order_id: OrderId::new(),
                    expected: Version::first(),
                    actual: Version::new(2),
                }
                .into(),
                StatusCode::CONFLICT,
                "CONFLICT",
            ),
            (
                LifecycleError::Indeterminate { operation: "create" }.into(),
                StatusCode::SERVICE_UNAVAILABLE,
                "INDETERMINATE",
            ),
            (
                ApiError::BadRequest("bad id".to_string()),
                StatusCode::BAD_REQUEST,
                "VALIDATION",
            ),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status_and_code(), (status, code));
        }
    }
}
