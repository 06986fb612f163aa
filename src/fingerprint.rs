// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client identity derivation.
//!
//! Produces the key a limiter counts against. The default strategy combines
//! the network address with a truncated user-agent digest; this is a
//! heuristic to tell apart clients sharing an address, not a strong
//! identity.

use sha2::{Digest, Sha256};
use std::net::IpAddr;

use crate::config::FingerprintStrategy;

/// Derive the rate-limiting key for a requester.
pub fn client_fingerprint(
    strategy: &FingerprintStrategy,
    ip: IpAddr,
    user_agent: Option<&str>,
) -> String {
    match strategy {
        FingerprintStrategy::IpOnly => ip.to_string(),
        FingerprintStrategy::IpAndUserAgent { hash_len } => {
            let ua = user_agent.unwrap_or("unknown");
            let digest = Sha256::digest(ua.as_bytes());
            let hex = format!("{digest:x}");
            let take = (*hash_len).min(hex.len());
            format!("{}-{}", ip, &hex[..take])
        }
    }
}
