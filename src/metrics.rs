// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for guard outcomes.
//!
//! Registered on an explicitly constructed registry carried in application
//! state; nothing here is process-global.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    /// Requests allowed, by policy name
    pub allowed_total: IntCounterVec,
    /// Requests denied, by policy name
    pub denied_total: IntCounterVec,
    /// Denials served from the escalated block state
    pub blocks_total: IntCounter,
    /// Accounts locked after repeated credential failures
    pub lockouts_total: IntCounter,
    /// Decisions resolved by the fail policy because the store was down
    pub store_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let allowed_total = IntCounterVec::new(
            Opts::new(
                "abuse_guard_requests_allowed_total",
                "Requests allowed by the rate limiter",
            ),
            &["policy"],
        )?;
        registry.register(Box::new(allowed_total.clone()))?;

        let denied_total = IntCounterVec::new(
            Opts::new(
                "abuse_guard_requests_denied_total",
                "Requests denied by the rate limiter",
            ),
            &["policy"],
        )?;
        registry.register(Box::new(denied_total.clone()))?;

        let blocks_total = IntCounter::new(
            "abuse_guard_blocks_total",
            "Denials served from the escalated block state",
        )?;
        registry.register(Box::new(blocks_total.clone()))?;

        let lockouts_total = IntCounter::new(
            "abuse_guard_lockouts_total",
            "Accounts locked after repeated credential failures",
        )?;
        registry.register(Box::new(lockouts_total.clone()))?;

        let store_failures_total = IntCounter::new(
            "abuse_guard_store_failures_total",
            "Guard decisions degraded by store unavailability",
        )?;
        registry.register(Box::new(store_failures_total.clone()))?;

        Ok(Self {
            registry,
            allowed_total,
            denied_total,
            blocks_total,
            lockouts_total,
            store_failures_total,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
