// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Metrics collection for attack simulation results.

use std::collections::HashMap;

/// Possible outcomes for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Limiter admitted the attempt and the credential check ran
    Attempted,
    /// Limiter denied from the counting window
    RateLimited,
    /// Limiter denied from the escalated block state
    Blocked,
    /// Lockout manager refused without a secret comparison
    LockedOut,
}

/// Collects outcomes during attack simulation.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    outcomes: HashMap<Outcome, usize>,
    attempts_per_client: HashMap<String, usize>,
    attempts_per_identity: HashMap<String, usize>,
}

impl AttackMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt outcome.
    pub fn record(&mut self, outcome: Outcome, client: &str, identity: Option<&str>) {
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        *self
            .attempts_per_client
            .entry(client.to_string())
            .or_insert(0) += 1;
        if let Some(id) = identity {
            *self
                .attempts_per_identity
                .entry(id.to_string())
                .or_insert(0) += 1;
        }
    }

    /// Get total attempt count.
    pub fn total_attempts(&self) -> usize {
        self.outcomes.values().sum()
    }

    /// Get count for a specific outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Ratio of attempts that never reached a credential check.
    pub fn mitigation_rate(&self) -> f64 {
        let total = self.total_attempts();
        if total == 0 {
            return 0.0;
        }
        let through = self.count(Outcome::Attempted);
        (total - through) as f64 / total as f64
    }

    /// Get number of unique clients that made attempts.
    pub fn unique_clients(&self) -> usize {
        self.attempts_per_client.len()
    }

    /// Get number of unique identities targeted.
    pub fn unique_identities(&self) -> usize {
        self.attempts_per_identity.len()
    }

    /// Generate a summary report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            total_attempts: self.total_attempts(),
            attempted: self.count(Outcome::Attempted),
            rate_limited: self.count(Outcome::RateLimited),
            blocked: self.count(Outcome::Blocked),
            locked_out: self.count(Outcome::LockedOut),
            mitigation_rate: self.mitigation_rate(),
            unique_clients: self.unique_clients(),
            unique_identities: self.unique_identities(),
        }
    }
}

/// Summary report of attack metrics.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub total_attempts: usize,
    pub attempted: usize,
    pub rate_limited: usize,
    pub blocked: usize,
    pub locked_out: usize,
    pub mitigation_rate: f64,
    pub unique_clients: usize,
    pub unique_identities: usize,
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Attack Metrics Report ===")?;
        writeln!(f, "Total Attempts:    {}", self.total_attempts)?;
        writeln!(f)?;
        writeln!(f, "--- Outcomes ---")?;
        writeln!(
            f,
            "Reached check:     {} ({:.1}%)",
            self.attempted,
            self.attempted as f64 / self.total_attempts as f64 * 100.0
        )?;
        writeln!(f, "Rate Limited:      {}", self.rate_limited)?;
        writeln!(f, "Blocked:           {}", self.blocked)?;
        writeln!(f, "Locked Out:        {}", self.locked_out)?;
        writeln!(f, "Mitigation Rate:   {:.1}%", self.mitigation_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "--- Distribution ---")?;
        writeln!(f, "Unique Clients:    {}", self.unique_clients)?;
        writeln!(f, "Unique Identities: {}", self.unique_identities)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        let mut metrics = AttackMetrics::new();

        metrics.record(Outcome::Attempted, "10.0.0.1", Some("a@example.com"));
        metrics.record(Outcome::Attempted, "10.0.0.1", Some("b@example.com"));
        metrics.record(Outcome::RateLimited, "10.0.0.1", Some("c@example.com"));

        assert_eq!(metrics.total_attempts(), 3);
        assert_eq!(metrics.count(Outcome::Attempted), 2);
        assert_eq!(metrics.count(Outcome::RateLimited), 1);
        assert_eq!(metrics.unique_clients(), 1);
        assert_eq!(metrics.unique_identities(), 3);
    }

    #[test]
    fn test_mitigation_rate() {
        let mut metrics = AttackMetrics::new();
        for _ in 0..3 {
            metrics.record(Outcome::Attempted, "10.0.0.1", None);
        }
        for _ in 0..7 {
            metrics.record(Outcome::Blocked, "10.0.0.1", None);
        }

        assert!((metrics.mitigation_rate() - 0.7).abs() < 0.01);
    }
}
