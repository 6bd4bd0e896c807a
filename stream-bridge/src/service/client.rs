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

//! Caller side of a service.

use crate::bridges::{decode_item, ReceivingReadStream, SendingWriteStream};
use crate::context::BridgeContext;
use crate::envelope::Envelope;
use crate::status::Status;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Invokes the methods of the service at one base address.
#[derive(Clone)]
pub struct ServiceClient {
    context: BridgeContext,
    address: String,
}

impl ServiceClient {
    pub fn new(context: BridgeContext, address: impl Into<String>) -> Self {
        Self {
            context,
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Notifies one instance of the service.
    pub fn send(&self, tag: &str, params: Vec<Value>) -> Result<(), Status> {
        self.context
            .bus()
            .send(&self.address, Envelope::new(tag, params))
    }

    /// Notifies every instance of the service.
    pub fn publish(&self, tag: &str, params: Vec<Value>) -> Result<(), Status> {
        self.context
            .bus()
            .publish(&self.address, Envelope::new(tag, params))
    }

    /// Calls a method and decodes its result.
    pub async fn call<R: DeserializeOwned>(
        &self,
        tag: &str,
        params: Vec<Value>,
    ) -> Result<R, Status> {
        let reply = self
            .context
            .bus()
            .request(
                &self.address,
                Envelope::new(tag, params),
                self.context.config().delivery_options(),
            )
            .await?;
        decode_item(reply.into_result()?)
    }

    /// Opens a stream of the items a method produces. Nothing is sent until the
    /// returned stream is first polled.
    pub fn read_stream<T: DeserializeOwned>(
        &self,
        tag: &str,
        params: Vec<Value>,
    ) -> ReceivingReadStream<T> {
        let data_address = self.context.session_address(&self.address);
        ReceivingReadStream::open(
            &self.context,
            data_address,
            self.address.as_str(),
            Envelope::new(tag, params),
        )
    }

    /// Opens a stream into the sink a method hands out.
    pub fn write_stream<T: Serialize>(
        &self,
        tag: &str,
        params: Vec<Value>,
    ) -> SendingWriteStream<T> {
        let control_address = self.context.session_address(&self.address);
        SendingWriteStream::open(
            &self.context,
            control_address,
            self.address.as_str(),
            Envelope::new(tag, params),
        )
    }
}
