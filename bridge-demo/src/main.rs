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

mod config;

use crate::config::Config;
use async_trait::async_trait;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use local_bus::LocalBus;
use std::fs::File;
use std::io::Read;
use std::sync::{Arc, Mutex};
use stream_bridge::config::DEFAULT_WRITE_QUEUE_MAX_SIZE;
use stream_bridge::service::param;
use stream_bridge::{
    BridgeContext, Code, ServiceClient, ServiceReceiver, SinkEvent, Status, WriteStream,
};
use tokio::sync::oneshot;
use tracing::{debug, info};

const COUNT: &str = "::count(Integer)";
const COLLECT: &str = "::collect()";

#[derive(Parser)]
#[command()]
struct DemoArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
    /// Overrides `demo.items` from the config file.
    #[arg(short, long)]
    items: Option<u32>,
}

/// Sums what the caller writes in batches of the negotiated queue size and
/// reports the totals once the caller ends.
struct SummingSink {
    buffered: Vec<u32>,
    max_queue_size: u64,
    received: u64,
    total: u64,
    done: Option<oneshot::Sender<(u64, u64)>>,
}

impl SummingSink {
    fn new(done: oneshot::Sender<(u64, u64)>) -> Self {
        Self {
            buffered: Vec::new(),
            max_queue_size: DEFAULT_WRITE_QUEUE_MAX_SIZE,
            received: 0,
            total: 0,
            done: Some(done),
        }
    }

    fn sum_batch(&mut self) {
        self.received += self.buffered.len() as u64;
        self.total += self.buffered.drain(..).map(u64::from).sum::<u64>();
    }
}

#[async_trait]
impl WriteStream<u32> for SummingSink {
    async fn write(&mut self, item: u32) -> Result<(), Status> {
        self.buffered.push(item);
        Ok(())
    }

    async fn end(&mut self) -> Result<(), Status> {
        self.sum_batch();
        if let Some(done) = self.done.take() {
            let _ = done.send((self.received, self.total));
        }
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.buffered.len() as u64 >= self.max_queue_size
    }

    fn set_max_queue_size(&mut self, max_size: u64) {
        self.max_queue_size = max_size.max(1);
    }

    async fn next_event(&mut self) -> SinkEvent {
        if !self.is_full() {
            return futures::future::pending().await;
        }
        self.sum_batch();
        debug!(received = self.received, "demo sink drained a batch");
        SinkEvent::Drained
    }
}

/// What both streams of one demo run carried.
#[derive(Debug, Eq, PartialEq)]
struct Summary {
    read_items: u64,
    read_total: u64,
    written_items: u64,
    written_total: u64,
}

fn load_config(path: &str) -> Result<Config, Status> {
    let mut file = File::open(path)
        .map_err(|e| Status::fail_with_code(Code::NotFound, format!("File not found: {e:?}")))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(|e| {
        Status::fail_with_code(Code::Internal, format!("Unable to read config file: {e:?}"))
    })?;

    json5::from_str(&contents).map_err(|e| {
        Status::fail_with_code(Code::Internal, format!("Unable to parse config file: {e:?}"))
    })
}

#[tokio::main]
async fn main() -> Result<(), Status> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started bridge-demo");

    let args = DemoArgs::parse();
    let mut config = load_config(&args.config)?;
    if let Some(items) = args.items {
        config.demo.items = items;
    }

    let summary = run(config).await?;
    info!(
        read_items = summary.read_items,
        read_total = summary.read_total,
        written_items = summary.written_items,
        written_total = summary.written_total,
        "bridge-demo finished"
    );
    Ok(())
}

/// Registers the demo service on a fresh local bus, then reads and writes
/// `demo.items` numbers through it.
async fn run(config: Config) -> Result<Summary, Status> {
    let bus = LocalBus::new();
    let context = BridgeContext::new(Arc::new(bus)).with_config(config.bridge.clone());
    let address = config.demo.service_address.as_str();

    let (done_tx, done_rx) = oneshot::channel();
    let done = Mutex::new(Some(done_tx));
    let service = ServiceReceiver::new(context.clone(), address)
        .on_read_stream(COUNT, |params| {
            let upto: u32 = param(&params, 0)?;
            Ok(futures::stream::iter((1..=upto).map(Ok::<_, Status>)))
        })
        .on_write_stream::<u32, _, _>(COLLECT, move |_params| {
            match done.lock().ok().and_then(|mut done| done.take()) {
                Some(done) => Ok(SummingSink::new(done)),
                None => Err(Status::fail_with_code(
                    Code::AlreadyExists,
                    "the demo sink accepts one writer",
                )),
            }
        })
        .register()
        .await?;

    let client = ServiceClient::new(context, address);

    let mut read = client.read_stream::<u32>(COUNT, vec![config.demo.items.into()]);
    let mut read_total = 0u64;
    let mut read_items = 0u64;
    while let Some(item) = read.next().await {
        read_total += u64::from(item?);
        read_items += 1;
    }
    info!(items = read_items, total = read_total, "read stream finished");

    let mut write = client.write_stream::<u32>(COLLECT, vec![]);
    let mut items = futures::stream::iter((1..=config.demo.items).map(Ok::<_, Status>));
    write.send_all(&mut items).await?;
    write.close().await?;

    let (written_items, written_total) = done_rx.await.map_err(|_| {
        Status::fail_with_code(Code::Cancelled, "sink dropped before the writer ended")
    })?;
    info!(
        items = written_items,
        total = written_total,
        "write stream finished"
    );

    service.unregister().await;
    Ok(Summary {
        read_items,
        read_total,
        written_items,
        written_total,
    })
}
