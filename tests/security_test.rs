// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Security tests for the abuse guard.
//!
//! These tests simulate attack patterns against the limiter and lockout
//! manager and validate that the guard mitigates them. Time is driven by
//! the manual clock, so simulated minutes cost nothing.

mod harness;

use harness::{
    attacks::AttackConfig,
    generators,
    metrics::{AttackMetrics, Outcome},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use abuse_guard::{
    clock::ManualClock,
    config::{FailPolicy, LockoutPolicy, RateLimitPolicy},
    error::GuardError,
    limiter::RateLimiter,
    lockout::{AccountLockoutManager, CredentialCheck, CredentialVerifier, VerifyOutcome},
    store::MemoryStore,
};
use async_trait::async_trait;

/// Always-wrong verifier that counts how many comparisons actually ran.
struct CountingVerifier {
    calls: AtomicUsize,
}

impl CountingVerifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialVerifier for CountingVerifier {
    async fn verify(&self, _: &str, _: &str) -> Result<CredentialCheck, GuardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CredentialCheck::Mismatch)
    }
}

struct Simulation {
    clock: Arc<ManualClock>,
    limiter: RateLimiter,
    lockout: AccountLockoutManager,
    verifier: Arc<CountingVerifier>,
}

fn simulation(policy: RateLimitPolicy) -> Simulation {
    let clock = Arc::new(ManualClock::from_system());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let verifier = CountingVerifier::new();
    let limiter = RateLimiter::new(policy, store.clone(), clock.clone(), FailPolicy::Open);
    let lockout = AccountLockoutManager::new(
        LockoutPolicy::default(),
        store,
        verifier.clone(),
        clock.clone(),
        FailPolicy::Open,
    );
    Simulation {
        clock,
        limiter,
        lockout,
        verifier,
    }
}

/// Run an attack: every attempt goes through the limiter first, and only
/// admitted attempts reach the credential check, mirroring the HTTP layer.
async fn run_attack(sim: &Simulation, config: &AttackConfig) -> AttackMetrics {
    let clients = generators::generate_ips(config.unique_clients);
    let identities = generators::generate_identities(config.unique_identities);
    let passwords = generators::generate_passwords(config.total_attempts);

    let mut metrics = AttackMetrics::new();
    for i in 0..config.total_attempts {
        sim.clock
            .advance(Duration::from_millis(config.attempt_spacing_ms));
        let client = clients[i % clients.len()].to_string();
        let identity = &identities[i % identities.len()];

        let decision = sim.limiter.is_allowed(&client).await;
        if !decision.allowed {
            let outcome = if decision.blocked {
                Outcome::Blocked
            } else {
                Outcome::RateLimited
            };
            metrics.record(outcome, &client, Some(identity));
            continue;
        }

        match sim.lockout.verify(identity, &passwords[i]).await.unwrap() {
            VerifyOutcome::Locked { .. } => {
                metrics.record(Outcome::LockedOut, &client, Some(identity));
            }
            _ => metrics.record(Outcome::Attempted, &client, Some(identity)),
        }
    }
    metrics
}

#[tokio::test]
async fn single_client_flood_is_cut_off_at_the_quota() {
    let sim = simulation(RateLimitPolicy::general_api());
    let config = AttackConfig::single_client_flood();

    let metrics = run_attack(&sim, &config).await;
    let report = metrics.report();
    println!("{report}");

    // 60 per minute get through, everything after the escalation is served
    // from the block state.
    assert_eq!(report.attempted + report.locked_out, 60);
    assert_eq!(report.blocked, config.total_attempts - 60);
    assert!(report.mitigation_rate >= 0.7);
}

#[tokio::test]
async fn credential_stuffing_is_stopped_by_the_account_lock() {
    let sim = simulation(RateLimitPolicy::admin_login());
    let config = AttackConfig::credential_stuffing();

    let metrics = run_attack(&sim, &config).await;
    let report = metrics.report();
    println!("{report}");

    // Every attempt comes from a fresh client, so the client limiter never
    // fires; the per-account counter is what stops the attack.
    assert_eq!(report.rate_limited + report.blocked, 0);
    assert_eq!(report.attempted, 5);
    assert_eq!(report.locked_out, config.total_attempts - 5);

    // Only the first five attempts ever reached a secret comparison.
    assert_eq!(sim.verifier.calls(), 5);
}

#[tokio::test]
async fn distributed_probe_locks_every_targeted_account() {
    let sim = simulation(RateLimitPolicy::admin_login());
    let config = AttackConfig::distributed_probe();

    let metrics = run_attack(&sim, &config).await;
    let report = metrics.report();
    println!("{report}");

    assert_eq!(report.unique_clients, config.unique_clients);
    assert_eq!(report.unique_identities, config.unique_identities);

    // Low and slow stays under the client limiter, but five failures per
    // account is five failures per account.
    for identity in generators::generate_identities(config.unique_identities) {
        let outcome = sim.lockout.verify(&identity, "one-more-try").await.unwrap();
        assert!(
            matches!(outcome, VerifyOutcome::Locked { .. }),
            "{identity} should be locked after the probe"
        );
    }
}
