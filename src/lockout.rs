// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-account lockout.
//!
//! Counts verified-wrong-secret failures per credential identity, not per
//! client, so credential stuffing against one account is stopped regardless
//! of how many source addresses it comes from. The failure counter only
//! moves on a confirmed mismatch: unknown identities never increment it, and
//! the verifier burns an equivalent hash comparison for them so account
//! existence is not observable through verification cost.
//!
//! Per-identity state machine: Active -> (failure below max) -> Active;
//! Active -> (failure at max) -> Locked; Locked -> (deadline passes) ->
//! Active, lazily on the next attempt; success resets all counters.

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{FailPolicy, LockoutPolicy};
use crate::error::GuardError;
use crate::store::KeyValueStore;

/// Retry hint handed out when fail-closed degrades a verification.
const DEGRADED_RETRY: Duration = Duration::from_secs(60);

/// A syntactically valid Argon2id hash used to equalize timing for unknown
/// identities. Matches no real secret.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$MDEyMzQ1Njc4OWFiY2RlZg$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// What the credential check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialCheck {
    /// Secret matches the stored hash.
    Match,
    /// Identity exists but the secret is wrong.
    Mismatch,
    /// No such identity. Callers decide the existence-leak policy; the
    /// lockout counter is never touched for this case.
    UnknownIdentity,
}

/// Credential-verification capability consumed by the lockout manager.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, identity: &str, secret: &str) -> Result<CredentialCheck, GuardError>;
}

/// Source of stored password hashes for [`Argon2Verifier`].
#[async_trait]
pub trait HashLookup: Send + Sync {
    async fn password_hash(&self, identity: &str) -> Result<Option<String>, GuardError>;
}

/// Fixed identity-to-hash table, loaded at startup.
#[derive(Debug, Default)]
pub struct StaticHashLookup {
    hashes: HashMap<String, String>,
}

impl StaticHashLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: &str, phc_hash: impl Into<String>) {
        self.hashes.insert(normalize_identity(identity), phc_hash.into());
    }
}

#[async_trait]
impl HashLookup for StaticHashLookup {
    async fn password_hash(&self, identity: &str) -> Result<Option<String>, GuardError> {
        Ok(self.hashes.get(&normalize_identity(identity)).cloned())
    }
}

/// Argon2id verifier over a pluggable hash source.
pub struct Argon2Verifier<L> {
    lookup: L,
}

impl<L: HashLookup> Argon2Verifier<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl<L: HashLookup> CredentialVerifier for Argon2Verifier<L> {
    async fn verify(&self, identity: &str, secret: &str) -> Result<CredentialCheck, GuardError> {
        match self.lookup.password_hash(identity).await? {
            Some(hash) => {
                let parsed =
                    PasswordHash::new(&hash).map_err(|e| GuardError::Hash(e.to_string()))?;
                if Argon2::default()
                    .verify_password(secret.as_bytes(), &parsed)
                    .is_ok()
                {
                    Ok(CredentialCheck::Match)
                } else {
                    Ok(CredentialCheck::Mismatch)
                }
            }
            None => {
                // Keep the cost of "no such account" in line with a real
                // comparison.
                if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
                    let _ = Argon2::default().verify_password(secret.as_bytes(), &parsed);
                }
                Ok(CredentialCheck::UnknownIdentity)
            }
        }
    }
}

/// Outcome of a lockout-guarded verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Secret matched; counters cleared.
    Success,
    /// Attempt rejected; account still active.
    Rejected {
        failed_attempts: u32,
        remaining_attempts: u32,
    },
    /// This attempt crossed the failure threshold and locked the account.
    NowLocked { retry_after: Duration },
    /// Lock was already active; no secret comparison was performed.
    Locked { retry_after: Duration },
}

impl VerifyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VerifyOutcome::Success)
    }

    /// Remaining lock time, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            VerifyOutcome::NowLocked { retry_after } | VerifyOutcome::Locked { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct LockoutEntry {
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    #[serde(default)]
    last_success_at: Option<DateTime<Utc>>,
}

/// Credential-identity-scoped failure counter with lockout.
pub struct AccountLockoutManager {
    policy: LockoutPolicy,
    store: Arc<dyn KeyValueStore>,
    verifier: Arc<dyn CredentialVerifier>,
    clock: Arc<dyn Clock>,
    fail_policy: FailPolicy,
}

impl AccountLockoutManager {
    pub fn new(
        policy: LockoutPolicy,
        store: Arc<dyn KeyValueStore>,
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
        fail_policy: FailPolicy,
    ) -> Self {
        Self {
            policy,
            store,
            verifier,
            clock,
            fail_policy,
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    fn key(identity: &str) -> String {
        format!("lock:{identity}")
    }

    /// Verify a secret for an identity under the lockout policy.
    pub async fn verify(&self, identity: &str, secret: &str) -> Result<VerifyOutcome, GuardError> {
        let identity = normalize_identity(identity);
        let now = self.clock.now();

        let entry = match self.load(&identity).await {
            Ok(entry) => entry,
            Err(err) => return self.degraded_verify(&identity, secret, err).await,
        };

        if let Some(until) = entry.locked_until {
            if now < until {
                let retry_after = to_std(until - now);
                info!(identity = %identity, until = %until, "attempt while locked, secret not checked");
                return Ok(VerifyOutcome::Locked { retry_after });
            }
        }

        // An elapsed lock means the account is active again with a clean
        // slate; otherwise keep the streak.
        let entry = match entry.locked_until {
            Some(until) if now >= until => LockoutEntry::default(),
            _ => entry,
        };

        match self.verifier.verify(&identity, secret).await? {
            CredentialCheck::Match => {
                // Success resets the streak and is remembered; the login
                // itself does not fail if the bookkeeping write does.
                let record = LockoutEntry {
                    failed_attempts: 0,
                    locked_until: None,
                    last_success_at: Some(now),
                };
                if let Err(err) = self
                    .persist(&identity, record, self.policy.failure_ttl())
                    .await
                {
                    warn!(identity = %identity, %err, "failed to record success");
                }
                info!(identity = %identity, "credential verified, counters cleared");
                Ok(VerifyOutcome::Success)
            }
            CredentialCheck::Mismatch => {
                let failed_attempts = entry.failed_attempts + 1;
                if failed_attempts >= self.policy.max_failures {
                    let locked_until = now
                        + chrono::Duration::milliseconds(
                            self.policy.lockout_duration().as_millis() as i64,
                        );
                    let outcome = VerifyOutcome::NowLocked {
                        retry_after: self.policy.lockout_duration(),
                    };
                    if let Err(err) = self
                        .persist(
                            &identity,
                            LockoutEntry {
                                failed_attempts,
                                locked_until: Some(locked_until),
                                last_success_at: entry.last_success_at,
                            },
                            self.policy.lockout_duration(),
                        )
                        .await
                    {
                        return self.degraded_record(&identity, outcome, err);
                    }
                    warn!(
                        identity = %identity,
                        failed_attempts,
                        until = %locked_until,
                        "account locked after repeated failures"
                    );
                    Ok(outcome)
                } else {
                    let outcome = VerifyOutcome::Rejected {
                        failed_attempts,
                        remaining_attempts: self.policy.max_failures - failed_attempts,
                    };
                    if let Err(err) = self
                        .persist(
                            &identity,
                            LockoutEntry {
                                failed_attempts,
                                locked_until: None,
                                last_success_at: entry.last_success_at,
                            },
                            self.policy.failure_ttl(),
                        )
                        .await
                    {
                        return self.degraded_record(&identity, outcome, err);
                    }
                    debug!(identity = %identity, failed_attempts, "wrong secret recorded");
                    Ok(outcome)
                }
            }
            CredentialCheck::UnknownIdentity => {
                debug!(identity = %identity, "unknown identity, counter untouched");
                Ok(VerifyOutcome::Rejected {
                    failed_attempts: entry.failed_attempts,
                    remaining_attempts: self.policy.max_failures - entry.failed_attempts,
                })
            }
        }
    }

    async fn load(&self, identity: &str) -> Result<LockoutEntry, GuardError> {
        let raw = self.store.get(&Self::key(identity)).await?;
        Ok(raw
            .and_then(|v| serde_json::from_str(&v).ok())
            .unwrap_or_default())
    }

    async fn persist(
        &self,
        identity: &str,
        entry: LockoutEntry,
        ttl: Duration,
    ) -> Result<(), GuardError> {
        let value = serde_json::to_string(&entry).map_err(crate::store::StoreError::from)?;
        self.store.set(&Self::key(identity), &value, ttl).await?;
        Ok(())
    }

    /// When the identity last verified successfully, if the streak entry is
    /// still live.
    pub async fn last_success_at(
        &self,
        identity: &str,
    ) -> Result<Option<DateTime<Utc>>, GuardError> {
        let entry = self.load(&normalize_identity(identity)).await?;
        Ok(entry.last_success_at)
    }

    /// An attempt was judged but its bookkeeping write failed: resolve the
    /// outcome through the configured fail policy, loudly.
    fn degraded_record(
        &self,
        identity: &str,
        outcome: VerifyOutcome,
        err: GuardError,
    ) -> Result<VerifyOutcome, GuardError> {
        error!(
            identity = %identity,
            %err,
            fail_policy = ?self.fail_policy,
            "store unavailable while recording a failed attempt"
        );
        match self.fail_policy {
            FailPolicy::Open => Ok(outcome),
            FailPolicy::Closed => Ok(VerifyOutcome::Locked {
                retry_after: DEGRADED_RETRY,
            }),
        }
    }

    /// Store was unreachable before the lock state could be read: resolve
    /// through the configured fail policy, loudly.
    async fn degraded_verify(
        &self,
        identity: &str,
        secret: &str,
        err: GuardError,
    ) -> Result<VerifyOutcome, GuardError> {
        error!(
            identity = %identity,
            %err,
            fail_policy = ?self.fail_policy,
            "store unavailable during lockout check"
        );
        match self.fail_policy {
            FailPolicy::Open => {
                // Verification proceeds without lockout bookkeeping.
                match self.verifier.verify(identity, secret).await? {
                    CredentialCheck::Match => Ok(VerifyOutcome::Success),
                    _ => Ok(VerifyOutcome::Rejected {
                        failed_attempts: 0,
                        remaining_attempts: self.policy.max_failures,
                    }),
                }
            }
            FailPolicy::Closed => Ok(VerifyOutcome::Locked {
                retry_after: DEGRADED_RETRY,
            }),
        }
    }
}

pub(crate) fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

fn to_std(d: chrono::Duration) -> Duration {
    d.to_std().unwrap_or(Duration::ZERO)
}
