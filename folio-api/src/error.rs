use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use folio_core::CoreError;
use serde_json::json;

/// Seconds a client is asked to wait after the payment provider was unreachable
pub const GATEWAY_RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug)]
pub enum AppError {
    Core(CoreError),
    /// Request could not be decoded into the expected shape
    Malformed(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Malformed(_) => StatusCode::BAD_REQUEST,
            AppError::Core(err) => match err {
                CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                CoreError::InsufficientStock { .. } | CoreError::InvalidState { .. } => {
                    StatusCode::CONFLICT
                }
                CoreError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CoreError::GatewayRejected(_) => StatusCode::PAYMENT_REQUIRED,
                CoreError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
                CoreError::PersistenceFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, message) = match &self {
            AppError::Malformed(msg) => ("invalid_request", msg.clone()),
            AppError::Core(err @ CoreError::PersistenceFailure { .. }) => {
                tracing::error!(error = ?err, "Internal Server Error: {}", err);
                (err.kind(), "Internal Server Error".to_string())
            }
            AppError::Core(err) => (err.kind(), err.to_string()),
        };

        let mut body = json!({
            "error": kind,
            "message": message,
        });
        if let AppError::Core(CoreError::InsufficientStock { item_id, requested, available, .. }) = &self {
            body["item_id"] = json!(item_id);
            body["requested"] = json!(requested);
            body["available"] = json!(available);
        }

        let mut response = (status, Json(body)).into_response();
        if matches!(self, AppError::Core(CoreError::GatewayUnavailable(_))) {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(GATEWAY_RETRY_AFTER_SECS),
            );
        }
        response
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_shared::{ItemId, OrderId, OrderStatus};
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (CoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CoreError::not_found("order", OrderId(1)), StatusCode::NOT_FOUND),
            (
                CoreError::InvalidState {
                    order_id: OrderId(1),
                    current: OrderStatus::Shipped,
                    expected: OrderStatus::Pending,
                },
                StatusCode::CONFLICT,
            ),
            (CoreError::GatewayRejected("x".into()), StatusCode::PAYMENT_REQUIRED),
            (CoreError::DeadlineExceeded(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_gateway_outage_sets_retry_after() {
        let response = AppError::from(CoreError::GatewayUnavailable("open".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }

    #[test]
    fn test_insufficient_stock_is_conflict() {
        let err = CoreError::InsufficientStock {
            item_id: ItemId(3),
            title: "Dune".into(),
            requested: 2,
            available: 0,
        };
        assert_eq!(AppError::from(err).into_response().status(), StatusCode::CONFLICT);
    }
}
