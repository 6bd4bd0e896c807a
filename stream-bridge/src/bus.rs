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

//! Event bus seam.
//!
//! The bus is an external collaborator: it moves [`Envelope`]s to addresses,
//! answers one-shot requests and registers consumers. Everything in this crate
//! talks to it through `Arc<dyn EventBus>`, so any transport that can provide
//! these primitives can carry the stream protocol.

use crate::envelope::{Envelope, Reply};
use crate::status::{Code, Status};
use async_trait::async_trait;
use futures::Stream;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub type Headers = BTreeMap<String, String>;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Address-keyed publish/subscribe plus one-shot request/reply.
///
/// Messages sent to one address reach that address's consumer in send order.
/// Nothing is guaranteed across two different addresses.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Fire-and-forget delivery to one consumer of `address`.
    fn send(&self, address: &str, envelope: Envelope) -> Result<(), Status>;

    /// Fire-and-forget delivery to every consumer of `address`.
    fn publish(&self, address: &str, envelope: Envelope) -> Result<(), Status>;

    /// Delivers `envelope` with a reply handle and waits for the single reply.
    async fn request(
        &self,
        address: &str,
        envelope: Envelope,
        options: DeliveryOptions,
    ) -> Result<Reply, Status>;

    /// Registers a consumer. The returned future resolving is the completion
    /// signal of the registration.
    async fn consumer(&self, address: &str) -> Result<MessageConsumer, Status>;
}

/// Per-request headers and timeout.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryOptions {
    headers: Headers,
    timeout: Duration,
}

impl DeliveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_headers(self) -> Headers {
        self.headers
    }
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            headers: Headers::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Answers one request exactly once.
///
/// Dropping the handle without answering replies with a `Cancelled` status so
/// the requester never waits on a reply that cannot come.
pub struct ReplyHandle {
    address: String,
    sender: Option<oneshot::Sender<Reply>>,
}

impl ReplyHandle {
    pub fn new(address: impl Into<String>, sender: oneshot::Sender<Reply>) -> Self {
        Self {
            address: address.into(),
            sender: Some(sender),
        }
    }

    pub fn reply(mut self, reply: Reply) -> Result<(), Status> {
        let Some(sender) = self.sender.take() else {
            return Err(Status::fail_with_code(
                Code::FailedPrecondition,
                "request already answered",
            ));
        };
        sender.send(reply).map_err(|_| {
            Status::fail_with_code(
                Code::Unavailable,
                format!("requester on {} is gone", self.address),
            )
        })
    }
}

impl Drop for ReplyHandle {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Reply::Err(Status::fail_with_code(
                Code::Cancelled,
                format!("request to {} dropped without a reply", self.address),
            )));
        }
    }
}

impl Debug for ReplyHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("address", &self.address)
            .field("answered", &self.sender.is_none())
            .finish()
    }
}

/// One message handed to a consumer.
#[derive(Debug)]
pub struct Delivery {
    pub address: String,
    pub envelope: Envelope,
    pub headers: Headers,
    reply: Option<ReplyHandle>,
}

impl Delivery {
    pub fn new(address: impl Into<String>, envelope: Envelope, headers: Headers) -> Self {
        Self {
            address: address.into(),
            envelope,
            headers,
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: ReplyHandle) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn is_request(&self) -> bool {
        self.reply.is_some()
    }

    pub fn take_reply(&mut self) -> Option<ReplyHandle> {
        self.reply.take()
    }

    pub fn reply(&mut self, reply: Reply) -> Result<(), Status> {
        match self.reply.take() {
            Some(handle) => handle.reply(reply),
            None => Err(Status::fail_with_code(
                Code::FailedPrecondition,
                format!("message on {} is not a request", self.address),
            )),
        }
    }
}

/// Bus-side bookkeeping removed when a consumer unregisters.
pub trait Registration: Send + Sync {
    fn unregister(&self);
}

/// A registered consumer of one address.
///
/// Deliveries are pulled as a [`Stream`]. Not polling is how a bridge pauses the
/// inbound flow: the bus keeps queueing for the address while nobody pulls.
pub struct MessageConsumer {
    address: String,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    registration: Arc<dyn Registration>,
    registered: bool,
}

impl MessageConsumer {
    pub fn new(
        address: impl Into<String>,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
        registration: Arc<dyn Registration>,
    ) -> Self {
        Self {
            address: address.into(),
            deliveries,
            registration,
            registered: true,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Removes the consumer from the bus. Calling it again does nothing.
    pub fn unregister(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        self.registration.unregister();
        self.deliveries.close();
    }
}

impl Stream for MessageConsumer {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.deliveries.poll_recv(cx)
    }
}

impl Drop for MessageConsumer {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl Debug for MessageConsumer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageConsumer")
            .field("address", &self.address)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}
