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

//! The four halves of a bridged stream.
//!
//! A read stream pairs a [`SendingReadStream`] (next to the producer) with a
//! [`ReceivingReadStream`] (next to the consumer). A write stream pairs a
//! [`SendingWriteStream`] (next to the caller writing items) with a
//! [`ReceivingWriteStream`] (next to the local sink). Each pair shares one data
//! address, carrying items toward the consumer or sink, and one control address,
//! carrying credit back.

pub(crate) mod receiving_read_stream;
pub(crate) mod receiving_write_stream;
pub(crate) mod sending_read_stream;
pub(crate) mod sending_write_stream;

pub use receiving_read_stream::ReceivingReadStream;
pub use receiving_write_stream::ReceivingWriteStream;
pub use sending_read_stream::SendingReadStream;
pub use sending_write_stream::SendingWriteStream;

use crate::bus::EventBus;
use crate::envelope::ControlMessage;
use crate::observability::events;
use crate::status::Status;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Notifications a local sink raises on its own schedule.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    /// The sink went from full to not full.
    Drained,
    /// The sink failed and accepts no further items.
    Failed(Status),
}

/// A local sink fed by a [`ReceivingWriteStream`].
///
/// The writer only gets credit back when the sink reports room: on
/// `SetQueueSize` while not full, and on every [`SinkEvent::Drained`]. Items
/// written without a drain are never acknowledged, so a sink that keeps the
/// `is_full` and `next_event` defaults stalls its writer once the writer's queue
/// limit is reached.
#[async_trait]
pub trait WriteStream<T: Send + 'static>: Send {
    async fn write(&mut self, item: T) -> Result<(), Status>;

    async fn end(&mut self) -> Result<(), Status>;

    fn is_full(&self) -> bool {
        false
    }

    fn set_max_queue_size(&mut self, _max_size: u64) {}

    /// Resolves with the next drain or failure. The default never resolves and
    /// therefore never returns credit to the writer.
    async fn next_event(&mut self) -> SinkEvent {
        futures::future::pending().await
    }
}

pub(crate) fn encode_item<T: Serialize>(item: &T) -> Result<Value, Status> {
    serde_json::to_value(item).map_err(|e| Status::from_serde("item does not serialize", e))
}

pub(crate) fn decode_item<T: DeserializeOwned>(value: Value) -> Result<T, Status> {
    serde_json::from_value(value).map_err(|e| Status::from_serde("item does not deserialize", e))
}

/// Sends one control message. Bus failures are logged, not returned.
pub(crate) fn send_control(
    bus: &dyn EventBus,
    component: &str,
    address: &str,
    message: ControlMessage,
) {
    let tag = message.tag();
    if let Err(err) = bus.send(address, message.into()) {
        warn!(
            event = events::BUS_SEND_FAILED,
            component,
            address,
            tag,
            err = %err,
            "control message send failed"
        );
    }
}
