// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Abuse Guard
//!
//! Abuse-protection core for credential-checking endpoints:
//!
//! - Fixed-window rate limiting with escalating blocks, per named policy
//! - Per-account lockout independent of client address
//! - Pluggable key-value backend (in-process or Redis) with TTL semantics
//! - Configurable client fingerprinting (IP, or IP plus user-agent digest)
//! - Explicit fail-open/fail-closed behavior when the backend is down

pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod handlers;
pub mod limiter;
pub mod lockout;
pub mod metrics;
pub mod middleware;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, FailPolicy, FingerprintStrategy, LockoutPolicy, RateLimitPolicy};
pub use error::GuardError;
pub use limiter::{RateLimitDecision, RateLimitStatus, RateLimiter};
pub use lockout::{
    AccountLockoutManager, Argon2Verifier, CredentialCheck, CredentialVerifier, HashLookup,
    StaticHashLookup, VerifyOutcome,
};
pub use store::{KeyValueStore, MemoryStore, RedisStore, StoreError};
