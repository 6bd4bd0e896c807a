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

//! Sink-owner half of a write stream: feeds items from the data address into a
//! local [`WriteStream`] and returns credit as the sink drains.

use crate::bridges::{decode_item, send_control, SinkEvent, WriteStream};
use crate::bus::{EventBus, MessageConsumer, ReplyHandle};
use crate::context::BridgeContext;
use crate::envelope::{ControlMessage, Reply};
use crate::observability::events;
use crate::status::Status;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "receiving_write_stream";

/// Handle to the task feeding a local sink from a remote writer.
pub struct ReceivingWriteStream {
    data_address: String,
    control_address: String,
    task: JoinHandle<()>,
}

struct Feeder<T, W> {
    bus: Arc<dyn EventBus>,
    data_address: String,
    control_address: String,
    sink: W,
    received: u64,
    paused: bool,
    _item: PhantomData<fn(T)>,
}

impl ReceivingWriteStream {
    /// Registers `data_address`, then answers the handshake `reply` with it, or
    /// with the registration failure.
    pub fn spawn<T, W>(
        context: &BridgeContext,
        data_address: impl Into<String>,
        control_address: impl Into<String>,
        reply: ReplyHandle,
        sink: W,
    ) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        W: WriteStream<T> + 'static,
    {
        let feeder = Feeder {
            bus: context.bus().clone(),
            data_address: data_address.into(),
            control_address: control_address.into(),
            sink,
            received: 0,
            paused: false,
            _item: PhantomData,
        };
        let data_address = feeder.data_address.clone();
        let control_address = feeder.control_address.clone();
        let task = tokio::spawn(feeder.run(reply));

        Self {
            data_address,
            control_address,
            task,
        }
    }

    pub fn data_address(&self) -> &str {
        &self.data_address
    }

    pub fn control_address(&self) -> &str {
        &self.control_address
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the writer ended or the sink failed.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(
                event = events::SINK_FAILED,
                component = COMPONENT,
                data_address = self.data_address.as_str(),
                err = %err,
                "write stream task did not complete"
            );
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl<T, W> Feeder<T, W>
where
    T: DeserializeOwned + Send + 'static,
    W: WriteStream<T> + 'static,
{
    async fn run(mut self, reply: ReplyHandle) {
        let mut consumer = match self.bus.consumer(&self.data_address).await {
            Ok(consumer) => consumer,
            Err(status) => {
                warn!(
                    event = events::SINK_REGISTER_FAILED,
                    component = COMPONENT,
                    data_address = self.data_address.as_str(),
                    err = %status,
                    "data consumer registration failed"
                );
                let _ = reply.reply(Reply::Err(status));
                return;
            }
        };

        self.paused = self.sink.is_full();
        if let Err(err) = reply.reply(Reply::Ok(Value::from(self.data_address.as_str()))) {
            warn!(
                event = events::SERVICE_REPLY_FAILED,
                component = COMPONENT,
                data_address = self.data_address.as_str(),
                err = %err,
                "writer left before the handshake completed"
            );
            consumer.unregister();
            return;
        }
        debug!(
            event = events::SINK_REGISTER_OK,
            component = COMPONENT,
            data_address = self.data_address.as_str(),
            control_address = self.control_address.as_str(),
            paused = self.paused,
            "sink ready for writes"
        );

        loop {
            tokio::select! {
                delivery = consumer.next(), if !self.paused => {
                    let Some(delivery) = delivery else {
                        info!(
                            event = events::SINK_END,
                            component = COMPONENT,
                            data_address = self.data_address.as_str(),
                            received = self.received,
                            "data address closed without End"
                        );
                        return;
                    };
                    if self.on_message(&mut consumer, delivery.envelope.try_into()).await.is_break() {
                        return;
                    }
                },
                event = self.sink.next_event() => match event {
                    SinkEvent::Drained => self.resume(),
                    SinkEvent::Failed(status) => {
                        self.fail(&mut consumer, status);
                        return;
                    }
                },
            }
        }
    }

    async fn on_message(
        &mut self,
        consumer: &mut MessageConsumer,
        message: Result<ControlMessage, Status>,
    ) -> std::ops::ControlFlow<()> {
        use std::ops::ControlFlow::{Break, Continue};

        match message {
            Ok(ControlMessage::Data(value)) => {
                self.received += 1;
                let written = match decode_item::<T>(value) {
                    Ok(item) => self.sink.write(item).await,
                    Err(status) => Err(status),
                };
                if let Err(status) = written {
                    self.fail(consumer, status);
                    return Break(());
                }
                if self.sink.is_full() {
                    self.pause();
                }
            }
            Ok(ControlMessage::SetQueueSize(max_size)) => {
                self.sink.set_max_queue_size(max_size);
                if self.sink.is_full() {
                    self.pause();
                } else {
                    self.resume();
                }
            }
            Ok(ControlMessage::End) => {
                if let Err(status) = self.sink.end().await {
                    warn!(
                        event = events::SINK_FAILED,
                        component = COMPONENT,
                        data_address = self.data_address.as_str(),
                        err = %status,
                        "sink failed to end"
                    );
                }
                consumer.unregister();
                debug!(
                    event = events::SINK_END,
                    component = COMPONENT,
                    data_address = self.data_address.as_str(),
                    received = self.received,
                    "writer ended"
                );
                return Break(());
            }
            Ok(other) => {
                debug!(
                    event = events::CONTROL_MESSAGE_UNEXPECTED,
                    component = COMPONENT,
                    data_address = self.data_address.as_str(),
                    tag = other.tag(),
                    "ignoring message on data address"
                );
            }
            Err(err) => {
                warn!(
                    event = events::CONTROL_MESSAGE_UNEXPECTED,
                    component = COMPONENT,
                    data_address = self.data_address.as_str(),
                    err = %err,
                    "ignoring malformed message on data address"
                );
            }
        }
        Continue(())
    }

    fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(
                event = events::SINK_PAUSED,
                component = COMPONENT,
                data_address = self.data_address.as_str(),
                received = self.received,
                "sink full; pausing data address"
            );
        }
    }

    /// Resumes delivery and acknowledges everything received so far.
    fn resume(&mut self) {
        self.paused = false;
        send_control(
            self.bus.as_ref(),
            COMPONENT,
            &self.control_address,
            ControlMessage::Ack(self.received),
        );
        debug!(
            event = events::SINK_RESUMED,
            component = COMPONENT,
            data_address = self.data_address.as_str(),
            received = self.received,
            "sink has room; credit returned"
        );
    }

    fn fail(&mut self, consumer: &mut MessageConsumer, status: Status) {
        info!(
            event = events::SINK_FAILED,
            component = COMPONENT,
            data_address = self.data_address.as_str(),
            err = %status,
            "sink failed; notifying writer"
        );
        send_control(
            self.bus.as_ref(),
            COMPONENT,
            &self.control_address,
            ControlMessage::Exception(status),
        );
        consumer.unregister();
    }
}
