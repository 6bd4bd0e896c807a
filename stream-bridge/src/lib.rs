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

//! # stream-bridge
//!
//! `stream-bridge` carries flow-controlled read and write streams between two
//! parties that only share an address-based event bus.
//!
//! The bus offers fire-and-forget sends, one-shot requests and consumer
//! registration (see [`EventBus`]). On top of that, a stream session uses two
//! ephemeral addresses: a data address carrying items toward the consuming side
//! and a control address carrying credit back. A handshake request exchanges the
//! two, then credit keeps at most a window of items in flight.
//!
//! ## Read stream, consumer side
//!
//! ```
//! use futures::StreamExt;
//! use local_bus::LocalBus;
//! use std::sync::Arc;
//! use stream_bridge::{BridgeContext, ServiceClient, ServiceReceiver, Status};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let context = BridgeContext::new(Arc::new(LocalBus::new()));
//!
//! let _numbers = ServiceReceiver::new(context.clone(), "org.example.Numbers")
//!     .on_read_stream("::count(Integer)", |params| {
//!         let upto: u32 = stream_bridge::service::param(&params, 0)?;
//!         Ok(futures::stream::iter((1..=upto).map(Ok::<_, Status>)))
//!     })
//!     .register()
//!     .await
//!     .unwrap();
//!
//! let client = ServiceClient::new(context, "org.example.Numbers");
//! let items: Vec<Result<u32, Status>> = client
//!     .read_stream("::count(Integer)", vec![3.into()])
//!     .collect()
//!     .await;
//! assert_eq!(items, vec![Ok(1), Ok(2), Ok(3)]);
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - Wire vocabulary: [`envelope`] and [`status`]
//! - Flow control: [`credit`]
//! - Bus seam: [`bus`], [`context`], [`address`]
//! - Stream halves: [`bridges`]
//! - Method-call glue: [`service`]
//!
//! ## Observability model
//!
//! The crate emits `tracing` events with an `event` name from
//! [`observability::events`] and a `component` field. It never installs a
//! subscriber; binaries and tests do that at their process boundary.

pub mod address;
pub mod bridges;
pub mod bus;
pub mod config;
pub mod context;
pub mod credit;
pub mod envelope;
pub mod observability;
pub mod service;
pub mod status;

pub use address::{base_address, method_tag, AddressGenerator, RandomAddressGenerator};
pub use bridges::{
    ReceivingReadStream, ReceivingWriteStream, SendingReadStream, SendingWriteStream,
    SinkEvent, WriteStream,
};
pub use bus::{Delivery, DeliveryOptions, EventBus, MessageConsumer, Registration, ReplyHandle};
pub use config::BridgeConfig;
pub use context::BridgeContext;
pub use credit::CreditWindow;
pub use envelope::{ControlMessage, Envelope, Reply};
pub use service::{ReceiverRegistration, ServiceClient, ServiceReceiver};
pub use status::{Code, Status};
