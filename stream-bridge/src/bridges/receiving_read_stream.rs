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

//! Consumer half of a read stream.

use crate::bridges::{decode_item, send_control};
use crate::bus::{EventBus, MessageConsumer};
use crate::context::BridgeContext;
use crate::credit::CreditWindow;
use crate::envelope::{ControlMessage, Envelope, DATA_ADDRESS_HEADER};
use crate::observability::events;
use crate::status::{Code, Status};
use futures::future::BoxFuture;
use futures::{ready, FutureExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

const COMPONENT: &str = "receiving_read_stream";

type Handshake = BoxFuture<'static, Result<(MessageConsumer, String), Status>>;

/// Items pushed by a remote producer, as a local [`Stream`].
///
/// Registration of the data consumer and the handshake request are driven by
/// the first polls. Not polling the stream pauses the inbound flow, and credit
/// goes back to the producer in batches of half a window as items are taken.
///
/// The stream yields `None` after the producer's `End`. A producer exception or
/// a failed handshake is yielded as exactly one `Err`, followed by `None`.
pub struct ReceivingReadStream<T> {
    bus: Arc<dyn EventBus>,
    window: CreditWindow,
    data_address: String,
    state: State,
    _item: PhantomData<fn() -> T>,
}

enum State {
    Handshaking(Handshake),
    Streaming(Session),
    Closed,
}

struct Session {
    consumer: MessageConsumer,
    control_address: String,
    received: u64,
    acked: u64,
}

enum Step {
    Item(Value),
    End,
    Failed(Status),
    Skip,
}

impl<T> ReceivingReadStream<T> {
    /// Opens a read stream by asking the producer at `remote_address` to push
    /// items to `data_address`. `request` is the method call that selects the
    /// source on the remote side.
    pub fn open(
        context: &BridgeContext,
        data_address: impl Into<String>,
        remote_address: impl Into<String>,
        request: Envelope,
    ) -> Self {
        let bus = context.bus().clone();
        let data_address = data_address.into();
        let handshake = Self::handshake(
            bus.clone(),
            data_address.clone(),
            remote_address.into(),
            request,
            context,
        );

        Self {
            bus,
            window: context.config().window(),
            data_address,
            state: State::Handshaking(handshake),
            _item: PhantomData,
        }
    }

    pub fn data_address(&self) -> &str {
        &self.data_address
    }

    fn handshake(
        bus: Arc<dyn EventBus>,
        data_address: String,
        remote_address: String,
        request: Envelope,
        context: &BridgeContext,
    ) -> Handshake {
        let options = context
            .config()
            .delivery_options()
            .add_header(DATA_ADDRESS_HEADER, data_address.clone());

        async move {
            debug!(
                event = events::READ_HANDSHAKE_START,
                component = COMPONENT,
                data_address = data_address.as_str(),
                address = remote_address.as_str(),
                "opening read stream"
            );
            let consumer = bus.consumer(&data_address).await?;
            let reply = bus.request(&remote_address, request, options).await?;
            let control_address = reply.into_result()?;
            let control_address = control_address.as_str().map(str::to_owned).ok_or_else(|| {
                Status::fail_with_code(
                    Code::InvalidArgument,
                    format!("handshake reply from {remote_address} is not an address"),
                )
            })?;
            Ok((consumer, control_address))
        }
        .boxed()
    }
}

impl Session {
    fn on_delivery(
        &mut self,
        bus: &dyn EventBus,
        window: CreditWindow,
        envelope: Envelope,
    ) -> Step {
        match ControlMessage::try_from(envelope) {
            Ok(ControlMessage::Data(value)) => {
                self.received += 1;
                if let Some(ack) = window.batched_ack(self.received, self.acked) {
                    self.acked = ack;
                    send_control(bus, COMPONENT, &self.control_address, ControlMessage::Ack(ack));
                    debug!(
                        event = events::READ_ACK_SENT,
                        component = COMPONENT,
                        control_address = self.control_address.as_str(),
                        received = self.received,
                        acked = self.acked,
                        "credit returned"
                    );
                }
                Step::Item(value)
            }
            Ok(ControlMessage::End) => {
                self.finish(bus);
                Step::End
            }
            Ok(ControlMessage::Exception(status)) => {
                self.finish(bus);
                Step::Failed(status)
            }
            Ok(other) => {
                debug!(
                    event = events::CONTROL_MESSAGE_UNEXPECTED,
                    component = COMPONENT,
                    data_address = self.consumer.address(),
                    tag = other.tag(),
                    "ignoring message on data address"
                );
                Step::Skip
            }
            Err(err) => {
                warn!(
                    event = events::CONTROL_MESSAGE_UNEXPECTED,
                    component = COMPONENT,
                    data_address = self.consumer.address(),
                    err = %err,
                    "ignoring malformed message on data address"
                );
                Step::Skip
            }
        }
    }

    /// Final acknowledgement of everything received, then unregistration.
    fn finish(&mut self, bus: &dyn EventBus) {
        send_control(
            bus,
            COMPONENT,
            &self.control_address,
            ControlMessage::Ack(self.received),
        );
        self.consumer.unregister();
    }
}

impl<T: DeserializeOwned> Stream for ReceivingReadStream<T> {
    type Item = Result<T, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let step = match &mut this.state {
                State::Closed => return Poll::Ready(None),
                State::Handshaking(handshake) => match ready!(handshake.poll_unpin(cx)) {
                    Ok((consumer, control_address)) => {
                        debug!(
                            event = events::READ_HANDSHAKE_OK,
                            component = COMPONENT,
                            data_address = this.data_address.as_str(),
                            control_address = control_address.as_str(),
                            "read stream open"
                        );
                        this.state = State::Streaming(Session {
                            consumer,
                            control_address,
                            received: 0,
                            acked: 0,
                        });
                        continue;
                    }
                    Err(status) => {
                        info!(
                            event = events::READ_HANDSHAKE_FAILED,
                            component = COMPONENT,
                            data_address = this.data_address.as_str(),
                            err = %status,
                            "read stream handshake failed"
                        );
                        Step::Failed(status)
                    }
                },
                State::Streaming(session) => match ready!(session.consumer.poll_next_unpin(cx)) {
                    Some(delivery) => {
                        session.on_delivery(this.bus.as_ref(), this.window, delivery.envelope)
                    }
                    None => Step::Failed(Status::fail_with_code(
                        Code::Unavailable,
                        format!("data address {} closed before End", this.data_address),
                    )),
                },
            };

            match step {
                Step::Item(value) => return Poll::Ready(Some(decode_item(value))),
                Step::Skip => continue,
                Step::End => {
                    debug!(
                        event = events::READ_REMOTE_END,
                        component = COMPONENT,
                        data_address = this.data_address.as_str(),
                        "producer ended"
                    );
                    this.state = State::Closed;
                    return Poll::Ready(None);
                }
                Step::Failed(status) => {
                    if matches!(this.state, State::Streaming(_)) {
                        info!(
                            event = events::READ_REMOTE_EXCEPTION,
                            component = COMPONENT,
                            data_address = this.data_address.as_str(),
                            err = %status,
                            "read stream closed exceptionally"
                        );
                    }
                    this.state = State::Closed;
                    return Poll::Ready(Some(Err(status)));
                }
            }
        }
    }
}
