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

//! Tunables shared by every bridge in a process.

use crate::bus::DeliveryOptions;
use crate::credit::{CreditWindow, ACK_WINDOW};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WRITE_QUEUE_MAX_SIZE: u64 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BridgeConfig {
    /// Unacknowledged items a producer may have in flight.
    pub credit_window: u64,
    /// Initial queue limit of a caller-side write stream.
    pub write_queue_max_size: u64,
    /// Timeout applied to handshake and call requests.
    pub request_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn window(&self) -> CreditWindow {
        CreditWindow::new(self.credit_window)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions::new().with_timeout(self.request_timeout())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            credit_window: ACK_WINDOW,
            write_queue_max_size: DEFAULT_WRITE_QUEUE_MAX_SIZE,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}
