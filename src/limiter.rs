// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter with escalating block.
//!
//! Each attempt is counted inside a window of fixed length; exceeding the
//! quota escalates the client into a separate, longer block rather than
//! re-evaluating it against a fresh window. Counting goes through the
//! store's atomic [`incr_window`](crate::store::KeyValueStore::incr_window)
//! primitive, so concurrent attempts for one client each see a distinct
//! post-increment count and cannot overshoot the quota together.
//!
//! The quota decision itself is a pure function over that count
//! ([`evaluate`]); all I/O sits at the edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{FailPolicy, RateLimitPolicy};
use crate::store::{KeyValueStore, StoreError};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitDecision {
    /// Whether the attempt may proceed
    pub allowed: bool,
    /// Attempts left in the current window (0 when denied)
    pub remaining: u32,
    /// When the window or block expires
    pub reset_at: DateTime<Utc>,
    /// Whether the denial comes from the escalated block state
    pub blocked: bool,
    /// Whether this decision was produced by the fail policy because the
    /// store was unreachable
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Seconds until the client may retry, measured from `now`.
    pub fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_at - now).num_seconds().max(0) as u64
    }
}

/// Read-only projection of a client's current state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitStatus {
    pub count: u64,
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
    pub blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Escalation record persisted alongside the counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct BlockState {
    blocked_until: DateTime<Utc>,
}

/// Pure quota verdict over a post-increment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Allowed { remaining: u32 },
    Escalate,
}

pub(crate) fn evaluate(count: u64, policy: &RateLimitPolicy) -> Verdict {
    if count > u64::from(policy.max_attempts) {
        Verdict::Escalate
    } else {
        Verdict::Allowed {
            remaining: policy.max_attempts - count as u32,
        }
    }
}

/// Fixed-window rate limiter for one named policy.
///
/// Safe to share across tasks; every operation takes `&self` and the only
/// suspension points are store calls.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    fail_policy: FailPolicy,
}

impl RateLimiter {
    pub fn new(
        policy: RateLimitPolicy,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        fail_policy: FailPolicy,
    ) -> Self {
        Self {
            policy,
            store,
            clock,
            fail_policy,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn counter_key(&self, client_id: &str) -> String {
        format!("rl:{}:{}", self.policy.name, client_id)
    }

    fn block_key(&self, client_id: &str) -> String {
        format!("rl:{}:{}:block", self.policy.name, client_id)
    }

    /// Check and record an attempt.
    pub async fn is_allowed(&self, client_id: &str) -> RateLimitDecision {
        match self.check(client_id).await {
            Ok(decision) => decision,
            Err(err) => self.degraded_decision(client_id, err),
        }
    }

    async fn check(&self, client_id: &str) -> Result<RateLimitDecision, StoreError> {
        let now = self.clock.now();

        // An unexpired block denies without touching the counter. An expired
        // one is ignored; the counter was dropped at escalation time, so the
        // next attempt below starts a fresh window.
        if let Some(block) = self.load_block(client_id).await? {
            if now < block.blocked_until {
                debug!(
                    policy = %self.policy.name,
                    client = client_id,
                    until = %block.blocked_until,
                    "client still blocked"
                );
                return Ok(RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: block.blocked_until,
                    blocked: true,
                    degraded: false,
                });
            }
        }

        let counted = self
            .store
            .incr_window(&self.counter_key(client_id), self.policy.window())
            .await?;

        match evaluate(counted.count, &self.policy) {
            Verdict::Allowed { remaining } => {
                debug!(
                    policy = %self.policy.name,
                    client = client_id,
                    count = counted.count,
                    remaining,
                    "attempt allowed"
                );
                Ok(RateLimitDecision {
                    allowed: true,
                    remaining,
                    reset_at: counted.expires_at,
                    blocked: false,
                    degraded: false,
                })
            }
            Verdict::Escalate => {
                let blocked_until = now
                    + chrono::Duration::milliseconds(
                        self.policy.block_duration().as_millis() as i64
                    );
                let state = BlockState { blocked_until };
                self.store
                    .set(
                        &self.block_key(client_id),
                        &serde_json::to_string(&state)?,
                        self.policy.block_duration(),
                    )
                    .await?;
                self.store.delete(&self.counter_key(client_id)).await?;
                warn!(
                    policy = %self.policy.name,
                    client = client_id,
                    attempts = counted.count,
                    until = %blocked_until,
                    "quota exceeded, client blocked"
                );
                Ok(RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: blocked_until,
                    blocked: true,
                    degraded: false,
                })
            }
        }
    }

    /// Forgive prior failures after a successful attempt. Only meaningful
    /// for policies with `skip_counter_on_success`.
    pub async fn record_success(&self, client_id: &str) {
        if !self.policy.skip_counter_on_success {
            return;
        }
        let counter = self.store.delete(&self.counter_key(client_id)).await;
        let block = self.store.delete(&self.block_key(client_id)).await;
        if let Err(err) = counter.and(block) {
            warn!(
                policy = %self.policy.name,
                client = client_id,
                %err,
                "failed to clear counters after success"
            );
        } else {
            debug!(
                policy = %self.policy.name,
                client = client_id,
                "counters cleared after success"
            );
        }
    }

    /// Administrative override: force a client into the blocked state
    /// regardless of its count.
    pub async fn block_client(
        &self,
        client_id: &str,
        duration: Duration,
    ) -> Result<(), StoreError> {
        let blocked_until =
            self.clock.now() + chrono::Duration::milliseconds(duration.as_millis() as i64);
        let state = BlockState { blocked_until };
        self.store
            .set(
                &self.block_key(client_id),
                &serde_json::to_string(&state)?,
                duration,
            )
            .await?;
        info!(
            policy = %self.policy.name,
            client = client_id,
            until = %blocked_until,
            "client blocked by override"
        );
        Ok(())
    }

    /// Current state of a client without consuming quota.
    pub async fn status(&self, client_id: &str) -> Result<RateLimitStatus, StoreError> {
        let now = self.clock.now();
        let block = self
            .load_block(client_id)
            .await?
            .filter(|b| now < b.blocked_until);
        let window = self.store.window(&self.counter_key(client_id)).await?;

        let count = window.map(|w| w.count).unwrap_or(0);
        let remaining = u64::from(self.policy.max_attempts).saturating_sub(count) as u32;
        Ok(RateLimitStatus {
            count,
            remaining,
            reset_at: window.map(|w| w.expires_at),
            blocked: block.is_some(),
            blocked_until: block.map(|b| b.blocked_until),
        })
    }

    async fn load_block(&self, client_id: &str) -> Result<Option<BlockState>, StoreError> {
        let raw = self.store.get(&self.block_key(client_id)).await?;
        // A corrupt record is treated as absent rather than wedging the
        // client one way or the other.
        Ok(raw.and_then(|v| serde_json::from_str(&v).ok()))
    }

    fn degraded_decision(&self, client_id: &str, err: StoreError) -> RateLimitDecision {
        let now = self.clock.now();
        let reset_at =
            now + chrono::Duration::milliseconds(self.policy.window().as_millis() as i64);
        error!(
            policy = %self.policy.name,
            client = client_id,
            %err,
            fail_policy = ?self.fail_policy,
            "store unavailable, applying fail policy"
        );
        match self.fail_policy {
            FailPolicy::Open => RateLimitDecision {
                allowed: true,
                remaining: self.policy.max_attempts,
                reset_at,
                blocked: false,
                degraded: true,
            },
            FailPolicy::Closed => RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at,
                blocked: false,
                degraded: true,
            },
        }
    }
}
