// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Attack simulation patterns for security testing.

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of attempts to send
    pub total_attempts: usize,
    /// Number of unique client fingerprints to simulate
    pub unique_clients: usize,
    /// Number of unique account identities to target
    pub unique_identities: usize,
    /// Milliseconds of simulated time between attempts
    pub attempt_spacing_ms: u64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_attempts: 100,
            unique_clients: 1,
            unique_identities: 1,
            attempt_spacing_ms: 100,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Single client flood - basic brute force from one source.
    pub fn single_client_flood() -> Self {
        Self {
            total_attempts: 200,
            unique_clients: 1,
            unique_identities: 1,
            attempt_spacing_ms: 10,
        }
    }

    /// Credential stuffing - many sources, one target account.
    pub fn credential_stuffing() -> Self {
        Self {
            total_attempts: 100,
            unique_clients: 100,
            unique_identities: 1,
            attempt_spacing_ms: 200,
        }
    }

    /// Distributed probe - many sources, many accounts, low and slow.
    pub fn distributed_probe() -> Self {
        Self {
            total_attempts: 150,
            unique_clients: 50,
            unique_identities: 30,
            attempt_spacing_ms: 2_000,
        }
    }
}
