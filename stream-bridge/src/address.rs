/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Address naming: service base addresses, method tags and session addresses.

use rand::Rng;

/// Address a service consumes at: the override when given, otherwise the
/// fully-qualified interface name.
pub fn base_address(interface: &str, override_address: Option<&str>) -> String {
    override_address.unwrap_or(interface).to_string()
}

/// Tag identifying one method of a service, `::name(T1,T2)`.
pub fn method_tag(method: &str, param_types: &[&str]) -> String {
    format!("::{method}({})", param_types.join(","))
}

/// Source of ephemeral per-session addresses.
pub trait AddressGenerator: Send + Sync {
    /// Returns a fresh address under `base`, unique among live sessions.
    fn session_address(&self, base: &str) -> String;
}

/// Appends the lowercase hex form of a random 64-bit value to the base address.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomAddressGenerator;

impl AddressGenerator for RandomAddressGenerator {
    fn session_address(&self, base: &str) -> String {
        let suffix: u64 = rand::thread_rng().gen();
        format!("{base}{suffix:x}")
    }
}
