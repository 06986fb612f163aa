// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test data generators for attack simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Generate a pool of account identities for testing.
pub fn generate_identities(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("user-{}@victim-{}.example.com", i % 10, i / 10))
        .collect()
}

/// Generate a pool of user-agent strings for fingerprint testing.
pub fn generate_user_agents(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("AttackBot/{}.{} (simulation)", i / 10, i % 10))
        .collect()
}

/// Generate wrong-password candidates the way a dictionary attack would.
pub fn generate_passwords(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("hunter{i}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_generate_identities() {
        let identities = generate_identities(100);
        assert_eq!(identities.len(), 100);
        let unique: std::collections::HashSet<_> = identities.iter().collect();
        assert_eq!(unique.len(), 100);
    }
}
