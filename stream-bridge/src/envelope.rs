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

//! Tagged envelopes, replies and the stream control vocabulary.

use crate::status::{Code, Status};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const TAG_DATA: &str = "Data";
pub const TAG_END: &str = "End";
pub const TAG_EXCEPTION: &str = "Exception";
pub const TAG_ACK: &str = "Ack";
pub const TAG_SET_QUEUE_SIZE: &str = "SetQueueSize";

/// Header a stream consumer uses to announce where it receives pushed items.
pub const DATA_ADDRESS_HEADER: &str = "DataAddress";
/// Header a sink-side caller uses to announce where it receives credit.
pub const CONTROL_ADDRESS_HEADER: &str = "ControlAddress";

/// A tagged message: a method signature or one of the stream control tags,
/// followed by an ordered list of opaque values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub tag: String,
    pub payload: Vec<Value>,
}

impl Envelope {
    pub fn new(tag: impl Into<String>, payload: Vec<Value>) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    pub fn parameters_count(&self) -> usize {
        self.payload.len()
    }
}

/// Result of a one-shot request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Ok(Value),
    Err(Status),
}

impl Reply {
    pub fn is_exceptional(&self) -> bool {
        matches!(self, Reply::Err(_))
    }

    pub fn into_result(self) -> Result<Value, Status> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Err(status) => Err(status),
        }
    }
}

impl From<Result<Value, Status>> for Reply {
    fn from(result: Result<Value, Status>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(status) => Reply::Err(status),
        }
    }
}

/// Stream control messages exchanged on session data and control addresses.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlMessage {
    Data(Value),
    End,
    Exception(Status),
    Ack(u64),
    SetQueueSize(u64),
}

impl ControlMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            ControlMessage::Data(_) => TAG_DATA,
            ControlMessage::End => TAG_END,
            ControlMessage::Exception(_) => TAG_EXCEPTION,
            ControlMessage::Ack(_) => TAG_ACK,
            ControlMessage::SetQueueSize(_) => TAG_SET_QUEUE_SIZE,
        }
    }
}

impl From<ControlMessage> for Envelope {
    fn from(message: ControlMessage) -> Self {
        let tag = message.tag();
        let payload = match message {
            ControlMessage::Data(item) => vec![item],
            ControlMessage::End => Vec::new(),
            ControlMessage::Exception(status) => {
                vec![json!({ "code": status.code, "message": status.message })]
            }
            ControlMessage::Ack(count) => vec![Value::from(count)],
            ControlMessage::SetQueueSize(max_size) => vec![Value::from(max_size)],
        };
        Envelope::new(tag, payload)
    }
}

impl TryFrom<Envelope> for ControlMessage {
    type Error = Status;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let Envelope { tag, payload } = envelope;
        let mut payload = payload.into_iter();

        match tag.as_str() {
            TAG_DATA => Ok(ControlMessage::Data(payload.next().unwrap_or(Value::Null))),
            TAG_END => Ok(ControlMessage::End),
            TAG_EXCEPTION => {
                let value = payload.next().ok_or_else(|| missing_payload(TAG_EXCEPTION))?;
                serde_json::from_value(value)
                    .map(ControlMessage::Exception)
                    .map_err(|e| Status::from_serde("malformed Exception payload", e))
            }
            TAG_ACK => counter_payload(TAG_ACK, payload.next()).map(ControlMessage::Ack),
            TAG_SET_QUEUE_SIZE => counter_payload(TAG_SET_QUEUE_SIZE, payload.next())
                .map(ControlMessage::SetQueueSize),
            other => Err(Status::fail_with_code(
                Code::InvalidArgument,
                format!("unknown control tag: {other}"),
            )),
        }
    }
}

fn missing_payload(tag: &str) -> Status {
    Status::fail_with_code(Code::InvalidArgument, format!("{tag} carries no payload"))
}

fn counter_payload(tag: &str, value: Option<Value>) -> Result<u64, Status> {
    value
        .as_ref()
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            Status::fail_with_code(
                Code::InvalidArgument,
                format!("{tag} payload must be an unsigned count"),
            )
        })
}
