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

//! Method-call glue on top of the bridges.
//!
//! A service lives at one base address. Callers address a method by its tag
//! (see [`method_tag`](crate::address::method_tag)) and pass its parameters as
//! the envelope payload. Methods come in four shapes:
//!
//! - notifications, fire-and-forget, delivered point-to-point or broadcast;
//! - calls, answered with one reply;
//! - read streams, where the service produces items for the caller;
//! - write streams, where the caller produces items for a sink owned by the
//!   service.

mod client;
mod receiver;

pub use client::ServiceClient;
pub use receiver::{ReceiverRegistration, ServiceReceiver};

use crate::bridges::decode_item;
use crate::status::{Code, Status};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decodes the parameter at `index` of a method call.
pub fn param<T: DeserializeOwned>(params: &[Value], index: usize) -> Result<T, Status> {
    let value = params.get(index).cloned().ok_or_else(|| {
        Status::fail_with_code(
            Code::InvalidArgument,
            format!("missing parameter {index}"),
        )
    })?;
    decode_item(value)
}
