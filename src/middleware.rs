// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP adapter for the rate limiter.
//!
//! Sits in front of a guarded route, derives the client fingerprint, and
//! turns the limiter's decision into an HTTP response: a 429 with a retry
//! hint on denial, quota headers on everything it checks. It decides nothing
//! beyond allow/deny.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::config::FingerprintStrategy;
use crate::fingerprint::client_fingerprint;
use crate::limiter::{RateLimitDecision, RateLimiter};
use crate::metrics::Metrics;

static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
static X_RATELIMIT_BLOCKED: HeaderName = HeaderName::from_static("x-ratelimit-blocked");

/// Per-route state for [`rate_limit`]: which limiter guards the route and
/// how requesters are identified.
#[derive(Clone)]
pub struct RouteGuard {
    pub limiter: Arc<RateLimiter>,
    pub strategy: FingerprintStrategy,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
}

/// Fingerprint of the checked client, inserted into request extensions so
/// handlers can report successes back to the limiter.
#[derive(Debug, Clone)]
pub struct ClientKey(pub String);

/// Rejection body for denied requests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRejection {
    pub error: &'static str,
    pub message: &'static str,
    pub retry_after: u64,
    pub blocked: bool,
}

/// Middleware: check the route's limiter before running the handler.
pub async fn rate_limit(
    State(guard): State<RouteGuard>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let key = client_fingerprint(&guard.strategy, addr.ip(), user_agent);

    let decision = guard.limiter.is_allowed(&key).await;
    let policy = guard.limiter.policy();
    if decision.degraded {
        guard.metrics.store_failures_total.inc();
    }

    if !decision.allowed {
        guard
            .metrics
            .denied_total
            .with_label_values(&[policy.name.as_str()])
            .inc();
        if decision.blocked {
            guard.metrics.blocks_total.inc();
        }
        let retry_after = decision.retry_after(guard.clock.now());
        info!(
            policy = %policy.name,
            client = %key,
            blocked = decision.blocked,
            retry_after,
            "request denied"
        );

        // The message says whether this is a cooldown or an escalated
        // block, without naming which subsystem or key produced it.
        let message = if decision.blocked {
            "Blocked due to repeated violations. Try again later."
        } else {
            "Too many requests. Please slow down and retry shortly."
        };
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RateLimitRejection {
                error: "Too many requests",
                message,
                retry_after,
                blocked: decision.blocked,
            }),
        )
            .into_response();
        stamp_quota_headers(response.headers_mut(), policy.max_attempts, &decision);
        if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, v);
        }
        return response;
    }

    guard
        .metrics
        .allowed_total
        .with_label_values(&[policy.name.as_str()])
        .inc();
    req.extensions_mut().insert(ClientKey(key));

    let mut response = next.run(req).await;
    stamp_quota_headers(response.headers_mut(), policy.max_attempts, &decision);
    response
}

/// Annotate a response with quota metadata for client-side backoff.
fn stamp_quota_headers(headers: &mut HeaderMap, limit: u32, decision: &RateLimitDecision) {
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert(X_RATELIMIT_LIMIT.clone(), v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert(X_RATELIMIT_REMAINING.clone(), v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset_at.timestamp().to_string()) {
        headers.insert(X_RATELIMIT_RESET.clone(), v);
    }
    if decision.blocked {
        headers.insert(X_RATELIMIT_BLOCKED.clone(), HeaderValue::from_static("true"));
    }
}
