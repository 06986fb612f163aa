// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the abuse guard.
//!
//! All knobs are deploy-time values: serde structs with per-field defaults,
//! overridable from the environment in `main`. Nothing here mutates at
//! runtime.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Key-value backend selection and fail policy
    #[serde(default)]
    pub store: StoreConfig,

    /// Named rate-limiter policies
    #[serde(default)]
    pub limiters: LimiterPolicies,

    /// Per-account lockout policy
    #[serde(default)]
    pub lockout: LockoutPolicy,

    /// Client identity derivation
    #[serde(default)]
    pub fingerprint: FingerprintStrategy,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Store backend selection.
///
/// The in-process backend enforces limits per instance only: a fleet of N
/// replicas effectively multiplies every limit by N. Deployments running
/// more than one instance must select `redis`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Redis { url: String },
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Memory
    }
}

/// How a guard decision resolves when the store is unreachable.
///
/// This is an explicit deployment choice; degraded decisions are logged and
/// counted either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    /// Treat the attempt as allowed.
    Open,
    /// Treat the attempt as denied.
    Closed,
}

impl Default for FailPolicy {
    fn default() -> Self {
        FailPolicy::Open
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default)]
    pub fail_policy: FailPolicy,
}

/// A single fixed-window rate-limiting policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Namespace for this policy's keys; policies cannot interfere.
    pub name: String,

    /// Counting window length in seconds
    pub window_secs: u64,

    /// Attempts permitted per window
    pub max_attempts: u32,

    /// Escalated block length in seconds once the quota is exceeded
    pub block_duration_secs: u64,

    /// Whether a successful attempt forgives prior failures in the window
    #[serde(default)]
    pub skip_counter_on_success: bool,
}

impl RateLimitPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }

    /// Admin login: 3 attempts per 15 minutes, 60 minute block, forgiving.
    pub fn admin_login() -> Self {
        Self {
            name: "admin-login".to_string(),
            window_secs: 15 * 60,
            max_attempts: 3,
            block_duration_secs: 60 * 60,
            skip_counter_on_success: true,
        }
    }

    /// Two-factor code entry: 3 attempts per 5 minutes, 30 minute block.
    pub fn two_factor() -> Self {
        Self {
            name: "two-factor".to_string(),
            window_secs: 5 * 60,
            max_attempts: 3,
            block_duration_secs: 30 * 60,
            skip_counter_on_success: true,
        }
    }

    /// General API traffic: 60 requests per minute, 5 minute block.
    pub fn general_api() -> Self {
        Self {
            name: "general-api".to_string(),
            window_secs: 60,
            max_attempts: 60,
            block_duration_secs: 5 * 60,
            skip_counter_on_success: false,
        }
    }

    /// Contact form: 3 submissions per 10 minutes, 30 minute block.
    pub fn contact_form() -> Self {
        Self {
            name: "contact-form".to_string(),
            window_secs: 10 * 60,
            max_attempts: 3,
            block_duration_secs: 30 * 60,
            skip_counter_on_success: false,
        }
    }

    /// Password reset: 3 attempts per hour, 24 hour block.
    pub fn password_reset() -> Self {
        Self {
            name: "password-reset".to_string(),
            window_secs: 60 * 60,
            max_attempts: 3,
            block_duration_secs: 24 * 60 * 60,
            skip_counter_on_success: false,
        }
    }
}

/// The named limiter policies the service runs with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterPolicies {
    #[serde(default = "RateLimitPolicy::admin_login")]
    pub admin_login: RateLimitPolicy,

    #[serde(default = "RateLimitPolicy::two_factor")]
    pub two_factor: RateLimitPolicy,

    #[serde(default = "RateLimitPolicy::general_api")]
    pub general_api: RateLimitPolicy,

    #[serde(default = "RateLimitPolicy::contact_form")]
    pub contact_form: RateLimitPolicy,

    #[serde(default = "RateLimitPolicy::password_reset")]
    pub password_reset: RateLimitPolicy,
}

impl Default for LimiterPolicies {
    fn default() -> Self {
        Self {
            admin_login: RateLimitPolicy::admin_login(),
            two_factor: RateLimitPolicy::two_factor(),
            general_api: RateLimitPolicy::general_api(),
            contact_form: RateLimitPolicy::contact_form(),
            password_reset: RateLimitPolicy::password_reset(),
        }
    }
}

/// Per-account lockout policy, independent of any client-keyed limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Verified-wrong-secret failures before the account locks (default: 5)
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// Lockout length in seconds (default: 15 minutes)
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,

    /// How long a failure streak is remembered in seconds (default: 15 minutes)
    #[serde(default = "default_failure_ttl_secs")]
    pub failure_ttl_secs: u64,
}

impl LockoutPolicy {
    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_secs)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl_secs)
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            lockout_secs: default_lockout_secs(),
            failure_ttl_secs: default_failure_ttl_secs(),
        }
    }
}

/// How a requester is identified for rate limiting.
///
/// Whether user-agent granularity is worth the collision trade-off behind
/// NAT is deployment-specific, so it stays configurable rather than
/// hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FingerprintStrategy {
    /// Network address only.
    IpOnly,
    /// Network address plus a truncated SHA-256 of the user-agent string,
    /// reducing false sharing between distinct clients behind one address.
    IpAndUserAgent {
        #[serde(default = "default_hash_len")]
        hash_len: usize,
    },
}

impl Default for FingerprintStrategy {
    fn default() -> Self {
        FingerprintStrategy::IpAndUserAgent {
            hash_len: default_hash_len(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_failures() -> u32 {
    5
}

fn default_lockout_secs() -> u64 {
    15 * 60
}

fn default_failure_ttl_secs() -> u64 {
    15 * 60
}

fn default_hash_len() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            store: StoreConfig::default(),
            limiters: LimiterPolicies::default(),
            lockout: LockoutPolicy::default(),
            fingerprint: FingerprintStrategy::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
