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

//! Caller half of a write stream.

use crate::bridges::{encode_item, send_control};
use crate::bus::{EventBus, MessageConsumer};
use crate::context::BridgeContext;
use crate::envelope::{ControlMessage, Envelope, CONTROL_ADDRESS_HEADER};
use crate::observability::{events, fields};
use crate::status::{Code, Status};
use futures::future::{poll_fn, BoxFuture};
use futures::{FutureExt, Sink, StreamExt};
use serde::Serialize;
use std::marker::PhantomData;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

const COMPONENT: &str = "sending_write_stream";

type Handshake = BoxFuture<'static, Result<(MessageConsumer, String), Status>>;

/// Writes items to a sink owned by a remote service.
///
/// The stream is usable once the remote side has answered the handshake with
/// its data address; until then [`is_full`](Self::is_full) reports `true` and
/// writes fail with `FailedPrecondition`. [`ready`](Self::ready) resolves when
/// the handshake is done and the queue has room, which makes it the drain
/// signal as well.
///
/// The queue limit is advisory: writes past it are still sent.
pub struct SendingWriteStream<T> {
    bus: Arc<dyn EventBus>,
    control_address: String,
    data_address: Option<String>,
    max_queue_size: u64,
    sent: u64,
    acked: u64,
    state: State,
    _item: PhantomData<fn(T)>,
}

enum State {
    Handshaking(Handshake),
    Open(MessageConsumer),
    Failed(Status),
    Ended,
}

impl<T: Serialize> SendingWriteStream<T> {
    /// Asks the service at `remote_address` for a sink, announcing
    /// `control_address` as the place credit comes back to.
    pub fn open(
        context: &BridgeContext,
        control_address: impl Into<String>,
        remote_address: impl Into<String>,
        request: Envelope,
    ) -> Self {
        let bus = context.bus().clone();
        let control_address = control_address.into();
        let remote_address = remote_address.into();
        let options = context
            .config()
            .delivery_options()
            .add_header(CONTROL_ADDRESS_HEADER, control_address.clone());

        let handshake_bus = bus.clone();
        let handshake_control = control_address.clone();
        let handshake = async move {
            debug!(
                event = events::WRITE_HANDSHAKE_START,
                component = COMPONENT,
                control_address = handshake_control.as_str(),
                address = remote_address.as_str(),
                "opening write stream"
            );
            let control = handshake_bus.consumer(&handshake_control).await?;
            let reply = handshake_bus
                .request(&remote_address, request, options)
                .await?;
            let data_address = reply.into_result()?;
            let data_address = data_address.as_str().map(str::to_owned).ok_or_else(|| {
                Status::fail_with_code(
                    Code::InvalidArgument,
                    format!("handshake reply from {remote_address} is not an address"),
                )
            })?;
            Ok((control, data_address))
        }
        .boxed();

        Self {
            bus,
            control_address,
            data_address: None,
            max_queue_size: context.config().write_queue_max_size,
            sent: 0,
            acked: 0,
            state: State::Handshaking(handshake),
            _item: PhantomData,
        }
    }

    pub fn control_address(&self) -> &str {
        &self.control_address
    }

    /// Data address learnt from the handshake reply.
    pub fn data_address(&self) -> Option<&str> {
        self.data_address.as_deref()
    }

    /// Status that closed the stream, if the handshake failed or the sink
    /// reported an exception.
    pub fn failure(&mut self) -> Option<&Status> {
        self.pump_now();
        match &self.state {
            State::Failed(status) => Some(status),
            _ => None,
        }
    }

    pub fn write(&mut self, item: T) -> Result<(), Status> {
        self.pump_now();
        let data_address = self.writable_address()?;
        let value = encode_item(&item)?;
        self.sent += 1;
        send_control(
            self.bus.as_ref(),
            COMPONENT,
            &data_address,
            ControlMessage::Data(value),
        );
        Ok(())
    }

    /// Stops listening for credit and tells the sink no more items follow.
    pub fn end(&mut self) -> Result<(), Status> {
        self.pump_now();
        let data_address = self.writable_address()?;
        if let State::Open(mut control) = mem::replace(&mut self.state, State::Ended) {
            control.unregister();
        }
        send_control(
            self.bus.as_ref(),
            COMPONENT,
            &data_address,
            ControlMessage::End,
        );
        debug!(
            event = events::WRITE_END,
            component = COMPONENT,
            data_address = data_address.as_str(),
            sent = self.sent,
            "write stream ended"
        );
        Ok(())
    }

    /// `true` until the data address is known, then whenever the unacknowledged
    /// count has reached the queue limit.
    pub fn is_full(&self) -> bool {
        self.data_address.is_none() || self.sent.saturating_sub(self.acked) >= self.max_queue_size
    }

    pub fn set_max_queue_size(&mut self, max_size: u64) {
        self.max_queue_size = max_size;
        if let Some(data_address) = &self.data_address {
            send_control(
                self.bus.as_ref(),
                COMPONENT,
                data_address,
                ControlMessage::SetQueueSize(max_size),
            );
        }
    }

    pub fn max_queue_size(&self) -> u64 {
        self.max_queue_size
    }

    /// Resolves once the stream is open and not full, or with the status that
    /// closed it.
    pub async fn ready(&mut self) -> Result<(), Status> {
        poll_fn(|cx| self.poll_writable(cx)).await
    }

    fn writable_address(&self) -> Result<String, Status> {
        match &self.state {
            State::Failed(status) => Err(status.clone()),
            State::Ended => Err(Status::fail_with_code(
                Code::FailedPrecondition,
                "WriteStream already ended",
            )),
            State::Handshaking(_) | State::Open(_) => {
                self.data_address.clone().ok_or_else(Status::not_ready)
            }
        }
    }

    fn poll_writable(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Status>> {
        self.pump(cx);
        match &self.state {
            State::Failed(status) => Poll::Ready(Err(status.clone())),
            State::Ended => Poll::Ready(Err(Status::fail_with_code(
                Code::FailedPrecondition,
                "WriteStream already ended",
            ))),
            State::Handshaking(_) => Poll::Pending,
            State::Open(_) if self.is_full() => Poll::Pending,
            State::Open(_) => Poll::Ready(Ok(())),
        }
    }

    fn pump_now(&mut self) {
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        self.pump(&mut cx);
    }

    /// Advances the handshake and applies every control message already queued.
    /// Returns with wakers registered on whatever is still pending.
    fn pump(&mut self, cx: &mut Context<'_>) {
        if let State::Handshaking(handshake) = &mut self.state {
            match handshake.poll_unpin(cx) {
                Poll::Pending => return,
                Poll::Ready(Ok((control, data_address))) => {
                    debug!(
                        event = events::WRITE_HANDSHAKE_OK,
                        component = COMPONENT,
                        control_address = self.control_address.as_str(),
                        data_address = data_address.as_str(),
                        max_queue_size = self.max_queue_size,
                        "write stream open"
                    );
                    send_control(
                        self.bus.as_ref(),
                        COMPONENT,
                        &data_address,
                        ControlMessage::SetQueueSize(self.max_queue_size),
                    );
                    self.data_address = Some(data_address);
                    self.state = State::Open(control);
                }
                Poll::Ready(Err(status)) => {
                    info!(
                        event = events::WRITE_HANDSHAKE_FAILED,
                        component = COMPONENT,
                        control_address = self.control_address.as_str(),
                        err = %status,
                        "write stream handshake failed"
                    );
                    self.state = State::Failed(status);
                    return;
                }
            }
        }

        loop {
            let State::Open(control) = &mut self.state else {
                return;
            };
            let delivery = match control.poll_next_unpin(cx) {
                Poll::Pending => return,
                Poll::Ready(Some(delivery)) => delivery,
                Poll::Ready(None) => {
                    self.close_exceptionally(Status::fail_with_code(
                        Code::Unavailable,
                        format!("control address {} closed", self.control_address),
                    ));
                    return;
                }
            };

            match ControlMessage::try_from(delivery.envelope) {
                Ok(ControlMessage::Ack(count)) => self.on_ack(count),
                Ok(ControlMessage::Exception(status)) => {
                    self.close_exceptionally(status);
                    return;
                }
                Ok(other) => {
                    debug!(
                        event = events::CONTROL_MESSAGE_UNEXPECTED,
                        component = COMPONENT,
                        control_address = self.control_address.as_str(),
                        tag = other.tag(),
                        "ignoring control message"
                    );
                }
                Err(err) => {
                    warn!(
                        event = events::CONTROL_MESSAGE_UNEXPECTED,
                        component = COMPONENT,
                        control_address = self.control_address.as_str(),
                        err = %err,
                        "ignoring malformed control message"
                    );
                }
            }
        }
    }

    fn on_ack(&mut self, count: u64) {
        let was_full = self.is_full();
        self.acked = count;
        if was_full && !self.is_full() {
            debug!(
                event = events::WRITE_DRAINED,
                component = COMPONENT,
                control_address = self.control_address.as_str(),
                data_address = fields::format_optional_address(self.data_address()),
                sent = self.sent,
                acked = self.acked,
                "write queue drained"
            );
        }
    }

    fn close_exceptionally(&mut self, status: Status) {
        info!(
            event = events::WRITE_REMOTE_EXCEPTION,
            component = COMPONENT,
            control_address = self.control_address.as_str(),
            data_address = fields::format_optional_address(self.data_address()),
            err = %status,
            "write stream closed exceptionally"
        );
        if let State::Open(mut control) = mem::replace(&mut self.state, State::Failed(status)) {
            control.unregister();
        }
    }
}

impl<T: Serialize> Sink<T> for SendingWriteStream<T> {
    type Error = Status;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.get_mut().poll_writable(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        self.get_mut().write(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        this.pump(cx);
        match &this.state {
            State::Failed(status) => Poll::Ready(Err(status.clone())),
            _ => Poll::Ready(Ok(())),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        this.pump(cx);
        match &this.state {
            State::Ended => Poll::Ready(Ok(())),
            State::Failed(status) => Poll::Ready(Err(status.clone())),
            State::Handshaking(_) => Poll::Pending,
            State::Open(_) => Poll::Ready(this.end()),
        }
    }
}
