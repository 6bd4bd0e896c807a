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

//! Producer half of a read stream: pumps a local source onto the data address
//! while credit allows.

use crate::bridges::{encode_item, send_control};
use crate::bus::{EventBus, MessageConsumer};
use crate::context::BridgeContext;
use crate::credit::CreditWindow;
use crate::envelope::ControlMessage;
use crate::observability::events;
use crate::status::Status;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "sending_read_stream";

/// Handle to the task forwarding a local source to a remote consumer.
///
/// The source is polled only while fewer than a window of items is
/// unacknowledged, so an unpolled source is a paused source.
pub struct SendingReadStream {
    data_address: String,
    control_address: String,
    task: JoinHandle<()>,
}

struct Pump {
    bus: Arc<dyn EventBus>,
    window: CreditWindow,
    data_address: String,
    control_address: String,
    sent: u64,
    acked: u64,
    paused: bool,
}

impl SendingReadStream {
    /// Starts forwarding `source` to `data_address` and listening for credit on
    /// `control_address`.
    ///
    /// If the control consumer cannot be registered, the source is drained and
    /// its items are discarded without reaching the consumer.
    pub fn spawn<T, S>(
        context: &BridgeContext,
        data_address: impl Into<String>,
        control_address: impl Into<String>,
        source: S,
    ) -> Self
    where
        T: Serialize + Send + 'static,
        S: Stream<Item = Result<T, Status>> + Send + 'static,
    {
        let pump = Pump {
            bus: context.bus().clone(),
            window: context.config().window(),
            data_address: data_address.into(),
            control_address: control_address.into(),
            sent: 0,
            acked: 0,
            paused: false,
        };
        let data_address = pump.data_address.clone();
        let control_address = pump.control_address.clone();
        let task = tokio::spawn(pump.run(source));

        Self {
            data_address,
            control_address,
            task,
        }
    }

    pub fn data_address(&self) -> &str {
        &self.data_address
    }

    pub fn control_address(&self) -> &str {
        &self.control_address
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the source ended, failed or was discarded.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(
                event = events::READ_SOURCE_FAILED,
                component = COMPONENT,
                data_address = self.data_address.as_str(),
                err = %err,
                "read stream task did not complete"
            );
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Pump {
    async fn run<T, S>(mut self, source: S)
    where
        T: Serialize,
        S: Stream<Item = Result<T, Status>>,
    {
        tokio::pin!(source);

        let mut control = match self.bus.consumer(&self.control_address).await {
            Ok(control) => control,
            Err(err) => {
                warn!(
                    event = events::READ_SOURCE_CONTROL_REGISTER_FAILED,
                    component = COMPONENT,
                    control_address = self.control_address.as_str(),
                    err = %err,
                    "control consumer registration failed"
                );
                let discarded = source.count().await;
                debug!(
                    event = events::READ_SOURCE_DISCARD,
                    component = COMPONENT,
                    data_address = self.data_address.as_str(),
                    discarded,
                    "source drained without forwarding"
                );
                return;
            }
        };

        debug!(
            event = events::READ_SOURCE_START,
            component = COMPONENT,
            data_address = self.data_address.as_str(),
            control_address = self.control_address.as_str(),
            window = self.window.size(),
            "forwarding read stream"
        );

        loop {
            let has_credit = self.window.may_resume(self.sent, self.acked);

            tokio::select! {
                biased;

                delivery = control.next() => match delivery {
                    Some(delivery) => self.on_control(delivery.envelope.try_into()),
                    None => {
                        info!(
                            event = events::READ_SOURCE_FAILED,
                            component = COMPONENT,
                            control_address = self.control_address.as_str(),
                            sent = self.sent,
                            "control address closed; stopping read stream"
                        );
                        return;
                    }
                },
                item = source.next(), if has_credit => match item {
                    Some(Ok(item)) => {
                        if let Err(status) = self.forward(&item) {
                            self.fail(&mut control, status);
                            return;
                        }
                    }
                    Some(Err(status)) => {
                        self.fail(&mut control, status);
                        return;
                    }
                    None => {
                        self.end(&mut control);
                        return;
                    }
                },
            }
        }
    }

    fn forward<T: Serialize>(&mut self, item: &T) -> Result<(), Status> {
        let value = encode_item(item)?;
        self.sent += 1;
        send_control(
            self.bus.as_ref(),
            COMPONENT,
            &self.data_address,
            ControlMessage::Data(value),
        );

        if self.window.must_pause(self.sent, self.acked) && !self.paused {
            self.paused = true;
            debug!(
                event = events::READ_SOURCE_PAUSED,
                component = COMPONENT,
                data_address = self.data_address.as_str(),
                sent = self.sent,
                acked = self.acked,
                "window exhausted; pausing source"
            );
        }
        Ok(())
    }

    fn on_control(&mut self, message: Result<ControlMessage, Status>) {
        match message {
            Ok(ControlMessage::Ack(count)) => {
                self.acked = count;
                if self.paused && self.window.may_resume(self.sent, self.acked) {
                    self.paused = false;
                    debug!(
                        event = events::READ_SOURCE_RESUMED,
                        component = COMPONENT,
                        data_address = self.data_address.as_str(),
                        sent = self.sent,
                        acked = self.acked,
                        "credit returned; resuming source"
                    );
                }
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

    fn end(&mut self, control: &mut MessageConsumer) {
        self.sent += 1;
        send_control(
            self.bus.as_ref(),
            COMPONENT,
            &self.data_address,
            ControlMessage::End,
        );
        control.unregister();
        debug!(
            event = events::READ_SOURCE_END,
            component = COMPONENT,
            data_address = self.data_address.as_str(),
            sent = self.sent,
            "source ended"
        );
    }

    fn fail(&mut self, control: &mut MessageConsumer, status: Status) {
        self.sent += 1;
        info!(
            event = events::READ_SOURCE_FAILED,
            component = COMPONENT,
            data_address = self.data_address.as_str(),
            err = %status,
            "source failed; forwarding exception"
        );
        send_control(
            self.bus.as_ref(),
            COMPONENT,
            &self.data_address,
            ControlMessage::Exception(status),
        );
        control.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::SendingReadStream;
    use crate::bridges::test_support::ScriptedBus;
    use crate::config::BridgeConfig;
    use crate::context::BridgeContext;
    use crate::envelope::ControlMessage;
    use crate::status::{Code, Status};
    use futures::stream;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const DATA: &str = "svc.data";
    const CONTROL: &str = "svc.control";

    fn context(bus: &Arc<ScriptedBus>, credit_window: u64) -> BridgeContext {
        BridgeContext::new(bus.clone()).with_config(BridgeConfig {
            credit_window,
            ..BridgeConfig::default()
        })
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition reached in time");
    }

    fn data_count(bus: &ScriptedBus) -> usize {
        bus.sent_to(DATA)
            .iter()
            .filter(|message| matches!(message, ControlMessage::Data(_)))
            .count()
    }

    #[tokio::test]
    async fn forwards_items_then_end_and_unregisters() {
        let bus = Arc::new(ScriptedBus::default());
        let source = stream::iter(vec![Ok::<_, Status>(1), Ok(2), Ok(3)]);

        SendingReadStream::spawn(&context(&bus, 100), DATA, CONTROL, source)
            .join()
            .await;

        assert_eq!(
            bus.sent_to(DATA),
            vec![
                ControlMessage::Data(json!(1)),
                ControlMessage::Data(json!(2)),
                ControlMessage::Data(json!(3)),
                ControlMessage::End,
            ]
        );
        assert!(!bus.is_registered(CONTROL));
        assert_eq!(bus.unregister_count(), 1);
    }

    #[tokio::test]
    async fn pauses_at_window_and_resumes_on_ack() {
        let bus = Arc::new(ScriptedBus::default());
        let source = stream::iter((0..10).map(Ok::<_, Status>));

        let stream = SendingReadStream::spawn(&context(&bus, 4), DATA, CONTROL, source);

        wait_until(|| data_count(&bus) == 4).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(data_count(&bus), 4);

        bus.inject(CONTROL, ControlMessage::Ack(2));
        wait_until(|| data_count(&bus) == 6).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(data_count(&bus), 6);

        bus.inject(CONTROL, ControlMessage::Ack(6));
        wait_until(|| data_count(&bus) == 10).await;
        assert!(!stream.is_finished());

        // End is held back by the window like any other item.
        bus.inject(CONTROL, ControlMessage::Ack(10));
        stream.join().await;

        assert_eq!(bus.sent_to(DATA).len(), 11);
        assert_eq!(bus.sent_to(DATA).last(), Some(&ControlMessage::End));
    }

    #[tokio::test]
    async fn source_error_is_forwarded_once_as_exception() {
        let bus = Arc::new(ScriptedBus::default());
        let failure = Status::fail_with_code(Code::Internal, "disk gone");
        let source = stream::iter(vec![Ok(1), Err(failure.clone()), Ok(2)]);

        SendingReadStream::spawn(&context(&bus, 100), DATA, CONTROL, source)
            .join()
            .await;

        assert_eq!(
            bus.sent_to(DATA),
            vec![
                ControlMessage::Data(json!(1)),
                ControlMessage::Exception(failure),
            ]
        );
        assert!(!bus.is_registered(CONTROL));
    }

    #[tokio::test]
    async fn failed_control_registration_discards_the_source() {
        let bus = Arc::new(ScriptedBus::default());
        bus.refuse_registration(CONTROL);
        let pulled = Arc::new(AtomicUsize::new(0));
        let pulled_by_source = pulled.clone();
        let source = stream::iter(0..5).map(move |item| {
            pulled_by_source.fetch_add(1, Ordering::Relaxed);
            Ok::<_, Status>(item)
        });

        SendingReadStream::spawn(&context(&bus, 100), DATA, CONTROL, source)
            .join()
            .await;

        assert_eq!(pulled.load(Ordering::Relaxed), 5);
        assert!(bus.sent().is_empty());
    }
}
