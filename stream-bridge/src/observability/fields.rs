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

//! Canonical structured field keys and value-format helpers.

use crate::envelope::Envelope;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const ADDRESS: &str = "address";
pub const DATA_ADDRESS: &str = "data_address";
pub const CONTROL_ADDRESS: &str = "control_address";
pub const TAG: &str = "tag";
pub const SENT: &str = "sent";
pub const ACKED: &str = "acked";
pub const RECEIVED: &str = "received";
pub const ERR: &str = "err";

pub const NONE: &str = "none";

/// Returns the envelope tag, trimmed to the method name for signature tags.
pub fn format_tag(envelope: &Envelope) -> &str {
    envelope
        .tag
        .strip_prefix("::")
        .and_then(|signature| signature.split('(').next())
        .unwrap_or(envelope.tag.as_str())
}

pub fn format_optional_address(address: Option<&str>) -> &str {
    address.unwrap_or(NONE)
}
