// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for abuse-guard attack simulation.
//!
//! This module provides utilities for simulating brute-force and
//! credential-stuffing patterns against the guard to validate security
//! controls.

pub mod attacks;
pub mod generators;
pub mod metrics;
