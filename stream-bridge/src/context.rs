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

//! Per-process wiring handed to every bridge.

use crate::address::{AddressGenerator, RandomAddressGenerator};
use crate::bus::EventBus;
use crate::config::BridgeConfig;
use std::sync::Arc;

/// Bus handle, tunables and address source shared by the bridges of one process.
#[derive(Clone)]
pub struct BridgeContext {
    bus: Arc<dyn EventBus>,
    config: BridgeConfig,
    addresses: Arc<dyn AddressGenerator>,
}

impl BridgeContext {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            bus,
            config: BridgeConfig::default(),
            addresses: Arc::new(RandomAddressGenerator),
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_address_generator(mut self, addresses: Arc<dyn AddressGenerator>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn session_address(&self, base: &str) -> String {
        self.addresses.session_address(base)
    }
}
