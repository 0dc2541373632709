//! HTTP mapping of the service error taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mkt_schemas::ServiceError;
use tracing::{error, warn};

use crate::api_types::ErrorBody;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No usable bearer credential.
    Unauthenticated(&'static str),
    Service(ServiceError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Service(e) => match e {
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
                ServiceError::Conflict(_) => StatusCode::CONFLICT,
                ServiceError::InvalidTransition { .. } | ServiceError::UnknownStatus { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Service(e) => e.code(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ApiError::Service(ServiceError::InvalidArgument(msg.into()))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthenticated(msg) => write!(f, "UNAUTHENTICATED: {msg}"),
            ApiError::Service(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            if status == StatusCode::SERVICE_UNAVAILABLE {
                warn!(error = %self, "request failed: store unavailable");
            } else {
                error!(error = %self, "request failed");
            }
        }
        let body = ErrorBody {
            code: self.code().to_string(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mkt_schemas::OrderStatus;

    #[test]
    fn taxonomy_maps_to_distinct_statuses() {
        let cases = [
            (ServiceError::NotFound("x".into()), 404),
            (ServiceError::Forbidden("x".into()), 403),
            (ServiceError::Conflict("x".into()), 409),
            (
                ServiceError::InvalidTransition {
                    from: OrderStatus::Delivered,
                    to: OrderStatus::New,
                },
                422,
            ),
            (ServiceError::InvalidArgument("x".into()), 400),
            (ServiceError::Unavailable("x".into()), 503),
            (ServiceError::Internal("x".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).status().as_u16(), code);
        }
        assert_eq!(ApiError::Unauthenticated("no").status().as_u16(), 401);
    }
}
