use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

use crate::subscriptions::SubscriptionError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Subscription(err) => match err {
                SubscriptionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                SubscriptionError::NotFound(_) => StatusCode::NOT_FOUND,
                SubscriptionError::Conflict(_) => StatusCode::CONFLICT,
                SubscriptionError::InvalidDuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                SubscriptionError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(?self);
        // Catalog corruption is an operator problem; keep its details in the logs.
        let body = match &self {
            AppError::Subscription(SubscriptionError::InvalidDuration { .. }) => {
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::{DurationError, StoreError};
    use uuid::Uuid;

    #[test]
    fn subscription_errors_map_to_transport_statuses() {
        let cases = [
            (
                SubscriptionError::InvalidInput("user id must not be empty".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                SubscriptionError::NotFound("plan not found".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                SubscriptionError::Conflict("user already has an active subscription".into()),
                StatusCode::CONFLICT,
            ),
            (
                SubscriptionError::InvalidDuration {
                    plan_id: Uuid::new_v4(),
                    source: DurationError::UnsupportedUnit("hour".into()),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                SubscriptionError::StoreUnavailable(StoreError::Database(
                    sqlx::Error::PoolTimedOut,
                )),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn boundary_errors_keep_their_statuses() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::BadRequest("planId is required".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
