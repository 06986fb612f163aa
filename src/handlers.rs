// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the guarded endpoints.
//!
//! The handlers carry no business logic beyond wiring guard outcomes to
//! user-facing responses. Failure messages are deliberately generic: a wrong
//! password and an unknown account read identically, while a locked account
//! tells its owner when to retry.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use crate::clock::Clock;
use crate::config::Config;
use crate::limiter::RateLimiter;
use crate::lockout::{AccountLockoutManager, VerifyOutcome};
use crate::metrics::Metrics;
use crate::middleware::ClientKey;
use crate::store::KeyValueStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub limiters: Limiters,
    pub lockout: AccountLockoutManager,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
}

/// The named limiters the service runs, one per policy.
pub struct Limiters {
    pub admin_login: Arc<RateLimiter>,
    pub two_factor: Arc<RateLimiter>,
    pub general_api: Arc<RateLimiter>,
    pub contact_form: Arc<RateLimiter>,
    pub password_reset: Arc<RateLimiter>,
}

impl Limiters {
    pub fn new(
        policies: &crate::config::LimiterPolicies,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        fail_policy: crate::config::FailPolicy,
    ) -> Self {
        let build = |policy: &crate::config::RateLimitPolicy| {
            Arc::new(RateLimiter::new(
                policy.clone(),
                store.clone(),
                clock.clone(),
                fail_policy,
            ))
        };
        Self {
            admin_login: build(&policies.admin_login),
            two_factor: build(&policies.two_factor),
            general_api: build(&policies.general_api),
            contact_form: build(&policies.contact_form),
            password_reset: build(&policies.password_reset),
        }
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub secret: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Login response body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
}

/// Contact form submission. Content handling lives elsewhere; this endpoint
/// only exists to be guarded.
#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "abuse-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn lock_minutes(retry_after: std::time::Duration) -> u64 {
    (retry_after.as_secs() + 59) / 60
}

/// Credential check guarded by the account lockout manager. The route-level
/// limiter has already admitted this request. Verifier and store faults
/// propagate as [`GuardError`](crate::error::GuardError) and take its wire
/// mapping.
pub async fn login(
    State(state): State<Arc<AppState>>,
    client: Option<Extension<ClientKey>>,
    Json(req): Json<LoginRequest>,
) -> crate::error::Result<(StatusCode, Json<LoginResponse>)> {
    let outcome = state.lockout.verify(&req.email, &req.secret).await?;

    Ok(match outcome {
        VerifyOutcome::Success => {
            if let Some(Extension(ClientKey(key))) = client {
                state.limiters.admin_login.record_success(&key).await;
            }
            if req.remember_me {
                debug!("extended session requested");
            }
            (
                StatusCode::OK,
                Json(LoginResponse {
                    success: true,
                    message: "Login successful.".to_string(),
                }),
            )
        }
        VerifyOutcome::Rejected { .. } => (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                success: false,
                message: "Invalid email or password.".to_string(),
            }),
        ),
        VerifyOutcome::NowLocked { retry_after } => {
            state.metrics.lockouts_total.inc();
            (
                StatusCode::UNAUTHORIZED,
                Json(LoginResponse {
                    success: false,
                    message: format!(
                        "Too many failed attempts. Account locked for {} minutes.",
                        lock_minutes(retry_after)
                    ),
                }),
            )
        }
        VerifyOutcome::Locked { retry_after } => (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                success: false,
                message: format!(
                    "Account temporarily locked. Try again in {} minutes.",
                    lock_minutes(retry_after).max(1)
                ),
            }),
        ),
    })
}

/// Contact-form endpoint; the route-level limiter is the whole guard here.
pub async fn contact(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<ContactRequest>,
) -> (StatusCode, Json<LoginResponse>) {
    debug!(from = %req.email, name = %req.name, "contact submission accepted");
    (
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            message: "Message received.".to_string(),
        }),
    )
}

/// Prometheus exposition endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.export() {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            error!(%err, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_minutes_rounds_up() {
        assert_eq!(lock_minutes(std::time::Duration::from_secs(900)), 15);
        assert_eq!(lock_minutes(std::time::Duration::from_secs(61)), 2);
        assert_eq!(lock_minutes(std::time::Duration::from_secs(59)), 1);
    }
}
