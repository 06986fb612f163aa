// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the abuse guard.
//!
//! Routine denials (rate limited, blocked, locked out) travel as structured
//! results, not errors; the variants here are the genuine faults, and the
//! `IntoResponse` impl is how they reach the wire from a handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Guard fault taxonomy.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("credential hash error: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error response body for the HTTP edge.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GuardError::Hash(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            GuardError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GuardError>;
