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

#![allow(dead_code)]

use async_trait::async_trait;
use local_bus::LocalBus;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_bridge::{
    AddressGenerator, BridgeConfig, BridgeContext, ControlMessage, Envelope, SinkEvent, Status,
    WriteStream,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub(crate) const SERVICE: &str = "org.example.Numbers";
pub(crate) const WAIT: Duration = Duration::from_secs(5);

pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Hands out `base0`, `base1`, ... in allocation order.
#[derive(Default)]
pub(crate) struct CountingAddresses {
    next: AtomicUsize,
}

impl AddressGenerator for CountingAddresses {
    fn session_address(&self, base: &str) -> String {
        format!("{base}{}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) fn session_address(n: usize) -> String {
    format!("{SERVICE}{n}")
}

pub(crate) fn context(bus: &LocalBus, config: BridgeConfig) -> BridgeContext {
    BridgeContext::new(Arc::new(bus.clone()))
        .with_config(config)
        .with_address_generator(Arc::new(CountingAddresses::default()))
}

pub(crate) fn control_messages(envelopes: Vec<Envelope>) -> Vec<ControlMessage> {
    envelopes
        .into_iter()
        .map(|envelope| ControlMessage::try_from(envelope).expect("control envelope"))
        .collect()
}

pub(crate) fn data_count(messages: &[ControlMessage]) -> usize {
    messages
        .iter()
        .filter(|message| matches!(message, ControlMessage::Data(_)))
        .count()
}

pub(crate) async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("finished in time")
}

pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
}

/// Shared view of the sinks a service hands out.
#[derive(Clone)]
pub(crate) struct SinkProbe {
    state: Arc<ProbeState>,
}

struct ProbeState {
    items: Mutex<Vec<String>>,
    end_count: AtomicUsize,
    full: AtomicBool,
    capacity: Option<usize>,
    pending: AtomicUsize,
    drain_count: AtomicUsize,
    max_size: Mutex<Option<u64>>,
    events_tx: mpsc::UnboundedSender<SinkEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SinkEvent>>>,
}

impl SinkProbe {
    pub(crate) fn new() -> Self {
        Self::build(None)
    }

    /// A probe whose sink fills after `capacity` undrained items and drains
    /// itself as soon as it is full.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self::build(Some(capacity))
    }

    fn build(capacity: Option<usize>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(ProbeState {
                items: Mutex::new(Vec::new()),
                end_count: AtomicUsize::new(0),
                full: AtomicBool::new(false),
                capacity,
                pending: AtomicUsize::new(0),
                drain_count: AtomicUsize::new(0),
                max_size: Mutex::new(None),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        }
    }

    /// A sink reporting into this probe. Only the first sink receives events.
    pub(crate) fn sink(&self) -> ProbeSink {
        let events = self
            .state
            .events_rx
            .lock()
            .expect("lock")
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        ProbeSink {
            state: self.state.clone(),
            events,
        }
    }

    pub(crate) fn items(&self) -> Vec<String> {
        self.state.items.lock().expect("lock").clone()
    }

    pub(crate) fn end_count(&self) -> usize {
        self.state.end_count.load(Ordering::Relaxed)
    }

    pub(crate) fn drain_count(&self) -> usize {
        self.state.drain_count.load(Ordering::Relaxed)
    }

    pub(crate) fn max_size(&self) -> Option<u64> {
        *self.state.max_size.lock().expect("lock")
    }

    pub(crate) fn set_full(&self, full: bool) {
        self.state.full.store(full, Ordering::Relaxed);
    }

    /// Empties the sink and raises its drain notification.
    pub(crate) fn drain(&self) {
        self.set_full(false);
        self.state
            .events_tx
            .send(SinkEvent::Drained)
            .expect("sink alive");
    }

    pub(crate) fn fail(&self, status: Status) {
        self.state
            .events_tx
            .send(SinkEvent::Failed(status))
            .expect("sink alive");
    }
}

impl ProbeState {
    fn at_capacity(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.pending.load(Ordering::Relaxed) >= capacity)
    }
}

pub(crate) struct ProbeSink {
    state: Arc<ProbeState>,
    events: mpsc::UnboundedReceiver<SinkEvent>,
}

#[async_trait]
impl WriteStream<String> for ProbeSink {
    async fn write(&mut self, item: String) -> Result<(), Status> {
        self.state.items.lock().expect("lock").push(item);
        self.state.pending.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn end(&mut self) -> Result<(), Status> {
        self.state.end_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.state.full.load(Ordering::Relaxed) || self.state.at_capacity()
    }

    fn set_max_queue_size(&mut self, max_size: u64) {
        *self.state.max_size.lock().expect("lock") = Some(max_size);
    }

    async fn next_event(&mut self) -> SinkEvent {
        if self.state.at_capacity() {
            self.state.pending.store(0, Ordering::Relaxed);
            self.state.drain_count.fetch_add(1, Ordering::Relaxed);
            return SinkEvent::Drained;
        }
        match self.events.recv().await {
            Some(event) => event,
            None => futures::future::pending().await,
        }
    }
}
