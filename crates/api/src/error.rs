// SPDX-License-Identifier: MIT

//! API-level errors: the union of broker failures and request-boundary
//! validation, mapped to HTTP status codes at the response layer
//! rather than inside any handler body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jobmesh_broker::BrokerError;
use jobmesh_core::InvalidJob;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("malformed request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Broker(BrokerError::InvalidJob(_)) => (StatusCode::BAD_REQUEST, "invalid_job"),
            ApiError::Broker(BrokerError::JobNotFound(_)) => (StatusCode::NOT_FOUND, "job_not_found"),
            ApiError::Broker(BrokerError::WorkerNotFound(_)) => (StatusCode::NOT_FOUND, "worker_not_found"),
            ApiError::Broker(BrokerError::Store(_)) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            ApiError::Broker(BrokerError::Domain(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "domain_invariant"),
            ApiError::Broker(BrokerError::CorruptRecord(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_record"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(json!({ "error": code, "message": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<InvalidJob> for ApiError {
    fn from(e: InvalidJob) -> Self {
        ApiError::Broker(BrokerError::InvalidJob(e))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
