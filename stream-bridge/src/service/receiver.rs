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

//! Service side: dispatches method envelopes arriving at the base address.

use crate::bridges::{
    encode_item, ReceivingWriteStream, SendingReadStream, WriteStream,
};
use crate::bus::{Delivery, MessageConsumer, ReplyHandle};
use crate::context::BridgeContext;
use crate::envelope::{Reply, CONTROL_ADDRESS_HEADER, DATA_ADDRESS_HEADER};
use crate::observability::{events, fields};
use crate::status::{Code, Status};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "service_receiver";

type CallHandler = Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Status>> + Send + Sync>;
type NotifyHandler = Box<dyn Fn(Vec<Value>) + Send + Sync>;
type StreamHandler = Box<dyn Fn(&BridgeContext, StreamSession) + Send + Sync>;

enum Handler {
    Call(CallHandler),
    Notify(NotifyHandler),
    ReadStream(StreamHandler),
    WriteStream(StreamHandler),
}

/// One accepted stream handshake.
struct StreamSession {
    params: Vec<Value>,
    /// Address the caller announced in the handshake header.
    remote_address: String,
    /// Address allocated on this side for the counterpart direction.
    local_address: String,
    reply: ReplyHandle,
}

/// Collects method handlers for one service, then registers them on the bus.
pub struct ServiceReceiver {
    context: BridgeContext,
    address: String,
    handlers: HashMap<String, Handler>,
}

/// A registered service. Dropping it also stops dispatching, without waiting
/// for the consumer to be removed.
pub struct ReceiverRegistration {
    address: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServiceReceiver {
    pub fn new(context: BridgeContext, address: impl Into<String>) -> Self {
        Self {
            context,
            address: address.into(),
            handlers: HashMap::new(),
        }
    }

    /// Handles a method answered with one reply.
    pub fn on_call<R, Fut, F>(mut self, tag: impl Into<String>, handler: F) -> Self
    where
        R: Serialize + 'static,
        Fut: Future<Output = Result<R, Status>> + Send + 'static,
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    {
        let call: CallHandler = Box::new(move |params| {
            let result = handler(params);
            async move { encode_item(&result.await?) }.boxed()
        });
        self.handlers.insert(tag.into(), Handler::Call(call));
        self
    }

    /// Handles a fire-and-forget method.
    pub fn on_notify<F>(mut self, tag: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.handlers
            .insert(tag.into(), Handler::Notify(Box::new(handler)));
        self
    }

    /// Handles a method whose result is a stream of items pushed to the caller.
    pub fn on_read_stream<T, S, F>(mut self, tag: impl Into<String>, handler: F) -> Self
    where
        T: Serialize + Send + 'static,
        S: Stream<Item = Result<T, Status>> + Send + 'static,
        F: Fn(Vec<Value>) -> Result<S, Status> + Send + Sync + 'static,
    {
        let open: StreamHandler = Box::new(move |context: &BridgeContext, session: StreamSession| {
            let StreamSession {
                params,
                remote_address,
                local_address,
                reply,
            } = session;
            let source = match handler(params) {
                Ok(source) => source,
                Err(status) => {
                    answer(reply, Reply::Err(status));
                    return;
                }
            };
            answer(reply, Reply::Ok(Value::from(local_address.as_str())));
            SendingReadStream::spawn(context, remote_address, local_address, source);
        });
        self.handlers.insert(tag.into(), Handler::ReadStream(open));
        self
    }

    /// Handles a method whose result is a sink the caller writes into.
    pub fn on_write_stream<T, W, F>(mut self, tag: impl Into<String>, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        W: WriteStream<T> + 'static,
        F: Fn(Vec<Value>) -> Result<W, Status> + Send + Sync + 'static,
    {
        let open: StreamHandler = Box::new(move |context: &BridgeContext, session: StreamSession| {
            let StreamSession {
                params,
                remote_address,
                local_address,
                reply,
            } = session;
            match handler(params) {
                Ok(sink) => {
                    ReceivingWriteStream::spawn(context, local_address, remote_address, reply, sink);
                }
                Err(status) => answer(reply, Reply::Err(status)),
            }
        });
        self.handlers.insert(tag.into(), Handler::WriteStream(open));
        self
    }

    /// Registers the service consumer and starts dispatching.
    pub async fn register(self) -> Result<ReceiverRegistration, Status> {
        let consumer = match self.context.bus().consumer(&self.address).await {
            Ok(consumer) => consumer,
            Err(status) => {
                warn!(
                    event = events::SERVICE_REGISTER_FAILED,
                    component = COMPONENT,
                    address = self.address.as_str(),
                    err = %status,
                    "service registration failed"
                );
                return Err(status);
            }
        };
        info!(
            event = events::SERVICE_REGISTER_OK,
            component = COMPONENT,
            address = self.address.as_str(),
            methods = self.handlers.len(),
            "service registered"
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dispatcher = Dispatcher {
            context: self.context,
            address: self.address.clone(),
            handlers: Arc::new(self.handlers),
        };
        let task = tokio::spawn(dispatcher.run(consumer, shutdown_rx));

        Ok(ReceiverRegistration {
            address: self.address,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

impl ReceiverRegistration {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stops dispatching and removes the service consumer. Streams already
    /// opened keep running.
    pub async fn unregister(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.task).await {
            warn!(
                event = events::SERVICE_UNREGISTER,
                component = COMPONENT,
                address = self.address.as_str(),
                err = %err,
                "dispatch task did not complete"
            );
        }
    }
}

struct Dispatcher {
    context: BridgeContext,
    address: String,
    handlers: Arc<HashMap<String, Handler>>,
}

impl Dispatcher {
    async fn run(self, mut consumer: MessageConsumer, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                delivery = consumer.next() => match delivery {
                    Some(delivery) => self.dispatch(delivery),
                    None => break,
                },
            }
        }
        consumer.unregister();
        info!(
            event = events::SERVICE_UNREGISTER,
            component = COMPONENT,
            address = self.address.as_str(),
            "service unregistered"
        );
    }

    fn dispatch(&self, mut delivery: Delivery) {
        debug!(
            event = events::SERVICE_DISPATCH,
            component = COMPONENT,
            address = self.address.as_str(),
            method = fields::format_tag(&delivery.envelope),
            request = delivery.is_request(),
            "dispatching method"
        );
        let tag = std::mem::take(&mut delivery.envelope.tag);

        let Some(handler) = self.handlers.get(&tag) else {
            warn!(
                event = events::SERVICE_UNKNOWN_METHOD,
                component = COMPONENT,
                address = self.address.as_str(),
                tag = tag.as_str(),
                "no handler for method"
            );
            if let Some(reply) = delivery.take_reply() {
                answer(
                    reply,
                    Reply::Err(Status::fail_with_code(
                        Code::NotFound,
                        format!("Method implementation is not provided: {tag}"),
                    )),
                );
            }
            return;
        };

        match handler {
            Handler::Notify(notify) => notify(delivery.envelope.payload),
            Handler::Call(call) => {
                let reply = delivery.take_reply();
                let result = call(delivery.envelope.payload);
                tokio::spawn(async move {
                    let result = result.await;
                    if let Some(reply) = reply {
                        answer(reply, result.into());
                    }
                });
            }
            Handler::ReadStream(open) => {
                self.open_stream(open, DATA_ADDRESS_HEADER, &tag, delivery)
            }
            Handler::WriteStream(open) => {
                self.open_stream(open, CONTROL_ADDRESS_HEADER, &tag, delivery)
            }
        }
    }

    /// Accepts a stream handshake announcing the caller's address in `header`.
    fn open_stream(
        &self,
        open: &StreamHandler,
        header: &'static str,
        tag: &str,
        mut delivery: Delivery,
    ) {
        let Some(reply) = delivery.take_reply() else {
            warn!(
                event = events::SERVICE_MISSING_HEADER,
                component = COMPONENT,
                address = self.address.as_str(),
                tag,
                "stream method sent without a reply handle"
            );
            return;
        };
        let Some(remote_address) = delivery.header(header).map(str::to_owned) else {
            warn!(
                event = events::SERVICE_MISSING_HEADER,
                component = COMPONENT,
                address = self.address.as_str(),
                tag,
                header,
                "stream handshake without session address"
            );
            answer(
                reply,
                Reply::Err(Status::fail_with_code(
                    Code::InvalidArgument,
                    format!("{tag} requires the {header} header"),
                )),
            );
            return;
        };

        let session = StreamSession {
            params: delivery.envelope.payload,
            remote_address,
            local_address: self.context.session_address(&self.address),
            reply,
        };
        open(&self.context, session);
    }
}

fn answer(reply: ReplyHandle, response: Reply) {
    if let Err(err) = reply.reply(response) {
        debug!(
            event = events::SERVICE_REPLY_FAILED,
            component = COMPONENT,
            err = %err,
            "caller no longer waits for the reply"
        );
    }
}
