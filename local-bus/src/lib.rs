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

//! # local-bus
//!
//! In-process [`EventBus`]: an address map of consumers fed through tokio
//! channels. Point-to-point sends rotate over the consumers of an address,
//! publishes reach all of them, and requests wait for one reply under the
//! delivery timeout.
//!
//! Tests can make registrations fail on chosen addresses and can record every
//! message the bus carries.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use stream_bridge::bus::{
    Delivery, DeliveryOptions, EventBus, Headers, MessageConsumer, Registration, ReplyHandle,
};
use stream_bridge::envelope::{Envelope, Reply};
use stream_bridge::status::{Code, Status};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const COMPONENT: &str = "local_bus";

mod events {
    pub const NO_CONSUMER: &str = "local_bus_no_consumer";
    pub const CONSUMER_REGISTER: &str = "local_bus_consumer_register";
    pub const CONSUMER_REGISTER_REFUSED: &str = "local_bus_consumer_register_refused";
    pub const CONSUMER_UNREGISTER: &str = "local_bus_consumer_unregister";
    pub const REQUEST_TIMEOUT: &str = "local_bus_request_timeout";
}

type RegistrationFault = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// How a recorded message entered the bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrafficKind {
    Send,
    Publish,
    Request,
}

/// One message seen by a bus created with [`LocalBus::with_traffic_log`].
#[derive(Clone, Debug, PartialEq)]
pub struct Traffic {
    pub kind: TrafficKind,
    pub address: String,
    pub envelope: Envelope,
    pub headers: Headers,
}

#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    addresses: Mutex<HashMap<String, AddressSlots>>,
    next_consumer_id: AtomicU64,
    faults: Mutex<Vec<RegistrationFault>>,
    traffic: Option<Mutex<Vec<Traffic>>>,
}

#[derive(Default)]
struct AddressSlots {
    next: usize,
    slots: Vec<Slot>,
}

struct Slot {
    id: u64,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

struct LocalRegistration {
    id: u64,
    address: String,
    inner: Weak<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AddressSlots {
    /// Hands `delivery` to the next live consumer in rotation, skipping and
    /// dropping consumers whose receiving side is gone.
    fn deliver_one(&mut self, mut delivery: Delivery) -> Result<(), Delivery> {
        while !self.slots.is_empty() {
            let index = self.next % self.slots.len();
            match self.slots[index].deliveries.send(delivery) {
                Ok(()) => {
                    self.next = index + 1;
                    return Ok(());
                }
                Err(mpsc::error::SendError(returned)) => {
                    self.slots.remove(index);
                    delivery = returned;
                }
            }
        }
        Err(delivery)
    }

    fn deliver_all(&mut self, address: &str, envelope: &Envelope) {
        self.slots.retain(|slot| {
            slot.deliveries
                .send(Delivery::new(address, envelope.clone(), Headers::new()))
                .is_ok()
        });
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that records every send, publish and request.
    pub fn with_traffic_log() -> Self {
        Self {
            inner: Arc::new(Inner {
                traffic: Some(Mutex::new(Vec::new())),
                ..Inner::default()
            }),
        }
    }

    /// Makes every later registration of an address matching `fault` fail.
    pub fn fail_registrations<F>(&self, fault: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        lock(&self.inner.faults).push(Box::new(fault));
    }

    pub fn fail_registrations_with_prefix(&self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        self.fail_registrations(move |address| address.starts_with(&prefix));
    }

    pub fn clear_faults(&self) {
        lock(&self.inner.faults).clear();
    }

    pub fn consumer_count(&self, address: &str) -> usize {
        lock(&self.inner.addresses)
            .get(address)
            .map_or(0, |slots| slots.slots.len())
    }

    /// Recorded traffic, oldest first. Empty unless the bus was created with
    /// [`with_traffic_log`](Self::with_traffic_log).
    pub fn traffic(&self) -> Vec<Traffic> {
        self.inner
            .traffic
            .as_ref()
            .map(|traffic| lock(traffic).clone())
            .unwrap_or_default()
    }

    pub fn traffic_to(&self, address: &str) -> Vec<Envelope> {
        self.traffic()
            .into_iter()
            .filter(|traffic| traffic.address == address)
            .map(|traffic| traffic.envelope)
            .collect()
    }

    fn record(&self, kind: TrafficKind, address: &str, envelope: &Envelope, headers: &Headers) {
        if let Some(traffic) = &self.inner.traffic {
            lock(traffic).push(Traffic {
                kind,
                address: address.to_string(),
                envelope: envelope.clone(),
                headers: headers.clone(),
            });
        }
    }

    fn is_refused(&self, address: &str) -> bool {
        lock(&self.inner.faults).iter().any(|fault| fault(address))
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }
}

#[async_trait]
impl EventBus for LocalBus {
    fn send(&self, address: &str, envelope: Envelope) -> Result<(), Status> {
        self.record(TrafficKind::Send, address, &envelope, &Headers::new());

        let mut addresses = lock(&self.inner.addresses);
        let delivered = addresses.get_mut(address).map(|slots| {
            slots
                .deliver_one(Delivery::new(address, envelope, Headers::new()))
                .is_ok()
        });
        if delivered != Some(true) {
            debug!(
                event = events::NO_CONSUMER,
                component = COMPONENT,
                address,
                "send dropped; no consumer"
            );
        }
        Ok(())
    }

    fn publish(&self, address: &str, envelope: Envelope) -> Result<(), Status> {
        self.record(TrafficKind::Publish, address, &envelope, &Headers::new());

        if let Some(slots) = lock(&self.inner.addresses).get_mut(address) {
            slots.deliver_all(address, &envelope);
        }
        Ok(())
    }

    async fn request(
        &self,
        address: &str,
        envelope: Envelope,
        options: DeliveryOptions,
    ) -> Result<Reply, Status> {
        let timeout = options.timeout();
        let headers = options.into_headers();
        self.record(TrafficKind::Request, address, &envelope, &headers);

        let (reply_tx, reply_rx) = oneshot::channel();
        let delivery = Delivery::new(address, envelope, headers)
            .with_reply(ReplyHandle::new(address, reply_tx));
        let delivered = lock(&self.inner.addresses)
            .get_mut(address)
            .map(|slots| slots.deliver_one(delivery).is_ok())
            .unwrap_or(false);
        if !delivered {
            return Err(Status::fail_with_code(
                Code::NotFound,
                format!("No handlers for address {address}"),
            ));
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Status::fail_with_code(
                Code::Cancelled,
                format!("reply to {address} was dropped"),
            )),
            Err(_) => {
                warn!(
                    event = events::REQUEST_TIMEOUT,
                    component = COMPONENT,
                    address,
                    timeout_ms = timeout.as_millis() as u64,
                    "request timed out"
                );
                Err(Status::fail_with_code(
                    Code::DeadlineExceeded,
                    format!(
                        "Timed out after waiting {}(ms) for a reply from {address}",
                        timeout.as_millis()
                    ),
                ))
            }
        }
    }

    async fn consumer(&self, address: &str) -> Result<MessageConsumer, Status> {
        if self.is_refused(address) {
            debug!(
                event = events::CONSUMER_REGISTER_REFUSED,
                component = COMPONENT,
                address,
                "registration refused"
            );
            return Err(Status::fail_with_code(
                Code::Unavailable,
                format!("registration refused for {address}"),
            ));
        }

        let id = self.inner.next_consumer_id.fetch_add(1, Ordering::Relaxed);
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
        lock(&self.inner.addresses)
            .entry(address.to_string())
            .or_default()
            .slots
            .push(Slot {
                id,
                deliveries: deliveries_tx,
            });
        debug!(
            event = events::CONSUMER_REGISTER,
            component = COMPONENT,
            address,
            consumer_id = id,
            "consumer registered"
        );

        let registration = Arc::new(LocalRegistration {
            id,
            address: address.to_string(),
            inner: Arc::downgrade(&self.inner),
        });
        Ok(MessageConsumer::new(address, deliveries_rx, registration))
    }
}

impl Registration for LocalRegistration {
    fn unregister(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut addresses = lock(&inner.addresses);
        if let Some(slots) = addresses.get_mut(&self.address) {
            slots.slots.retain(|slot| slot.id != self.id);
            if slots.slots.is_empty() {
                addresses.remove(&self.address);
            }
        }
        debug!(
            event = events::CONSUMER_UNREGISTER,
            component = COMPONENT,
            address = self.address.as_str(),
            consumer_id = self.id,
            "consumer unregistered"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalBus, TrafficKind};
    use futures::StreamExt;
    use std::time::Duration;
    use stream_bridge::bus::{DeliveryOptions, EventBus};
    use stream_bridge::envelope::{Envelope, Reply};
    use stream_bridge::status::Code;

    fn envelope(tag: &str, n: u64) -> Envelope {
        Envelope::new(tag, vec![n.into()])
    }

    #[tokio::test]
    async fn send_rotates_over_consumers_in_order() {
        let bus = LocalBus::new();
        let mut first = bus.consumer("svc").await.expect("registered");
        let mut second = bus.consumer("svc").await.expect("registered");

        for n in 0..4 {
            bus.send("svc", envelope("Data", n)).expect("sent");
        }

        let first_got: Vec<_> = vec![
            first.next().await.expect("delivery").envelope,
            first.next().await.expect("delivery").envelope,
        ];
        let second_got: Vec<_> = vec![
            second.next().await.expect("delivery").envelope,
            second.next().await.expect("delivery").envelope,
        ];
        assert_eq!(first_got, vec![envelope("Data", 0), envelope("Data", 2)]);
        assert_eq!(second_got, vec![envelope("Data", 1), envelope("Data", 3)]);
    }

    #[tokio::test]
    async fn publish_reaches_every_consumer() {
        let bus = LocalBus::new();
        let mut first = bus.consumer("svc").await.expect("registered");
        let mut second = bus.consumer("svc").await.expect("registered");

        bus.publish("svc", envelope("::tick()", 1)).expect("published");

        assert_eq!(first.next().await.expect("delivery").envelope, envelope("::tick()", 1));
        assert_eq!(second.next().await.expect("delivery").envelope, envelope("::tick()", 1));
    }

    #[tokio::test]
    async fn request_without_consumer_is_not_found() {
        let bus = LocalBus::new();

        let err = bus
            .request("nobody", envelope("::ping()", 0), DeliveryOptions::new())
            .await
            .expect_err("no consumer");
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn request_gets_the_reply() {
        let bus = LocalBus::new();
        let mut service = bus.consumer("svc").await.expect("registered");
        let responder = tokio::spawn(async move {
            let mut delivery = service.next().await.expect("request");
            assert_eq!(delivery.header("DataAddress"), Some("svc.1"));
            delivery.reply(Reply::Ok("svc.2".into())).expect("replied");
        });

        let reply = bus
            .request(
                "svc",
                envelope("::numbers()", 0),
                DeliveryOptions::new().add_header("DataAddress", "svc.1"),
            )
            .await
            .expect("reply");
        responder.await.expect("responder finished");

        assert_eq!(reply, Reply::Ok("svc.2".into()));
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let bus = LocalBus::new();
        let _silent = bus.consumer("svc").await.expect("registered");

        let err = bus
            .request(
                "svc",
                envelope("::ping()", 0),
                DeliveryOptions::new().with_timeout(Duration::from_millis(20)),
            )
            .await
            .expect_err("no reply");
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert_eq!(
            err.message(),
            "Timed out after waiting 20(ms) for a reply from svc"
        );
    }

    #[tokio::test]
    async fn dropped_request_is_cancelled() {
        let bus = LocalBus::new();
        let mut service = bus.consumer("svc").await.expect("registered");
        tokio::spawn(async move {
            drop(service.next().await);
        });

        let reply = bus
            .request("svc", envelope("::ping()", 0), DeliveryOptions::new())
            .await
            .expect("broken promise still replies");
        match reply {
            Reply::Err(status) => assert_eq!(status.code(), Code::Cancelled),
            Reply::Ok(value) => panic!("unexpected reply {value}"),
        }
    }

    #[tokio::test]
    async fn unregistered_consumer_gets_nothing() {
        let bus = LocalBus::new();
        let mut consumer = bus.consumer("svc").await.expect("registered");
        consumer.unregister();

        bus.send("svc", envelope("Data", 1)).expect("send never fails");

        assert_eq!(bus.consumer_count("svc"), 0);
        assert!(consumer.next().await.is_none());
    }

    #[tokio::test]
    async fn registration_faults_match_by_prefix() {
        let bus = LocalBus::new();
        bus.fail_registrations_with_prefix("svc.ctl");

        let err = bus.consumer("svc.ctl.1").await.expect_err("refused");
        assert_eq!(err.code(), Code::Unavailable);
        assert!(bus.consumer("svc.data.1").await.is_ok());

        bus.clear_faults();
        assert!(bus.consumer("svc.ctl.1").await.is_ok());
    }

    #[tokio::test]
    async fn traffic_log_records_every_entry_point() {
        let bus = LocalBus::with_traffic_log();
        let _consumer = bus.consumer("svc").await.expect("registered");

        bus.send("svc", envelope("Data", 1)).expect("sent");
        bus.publish("svc", envelope("::tick()", 2)).expect("published");
        let _ = bus
            .request(
                "nobody",
                envelope("::ping()", 3),
                DeliveryOptions::new(),
            )
            .await;

        let kinds: Vec<_> = bus.traffic().iter().map(|traffic| traffic.kind).collect();
        assert_eq!(
            kinds,
            vec![TrafficKind::Send, TrafficKind::Publish, TrafficKind::Request]
        );
        assert_eq!(
            bus.traffic_to("svc"),
            vec![envelope("Data", 1), envelope("::tick()", 2)]
        );
        assert!(LocalBus::new().traffic().is_empty());
    }
}
