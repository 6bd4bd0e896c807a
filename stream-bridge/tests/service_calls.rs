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

mod support;

use local_bus::LocalBus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stream_bridge::service::param;
use stream_bridge::{BridgeConfig, Code, ServiceClient, ServiceReceiver, Status};
use support::{context, init_logging, wait_until, within, SERVICE};

const ADD: &str = "::add(Integer,Integer)";
const PING: &str = "::ping()";

fn calculator(context: &stream_bridge::BridgeContext) -> ServiceReceiver {
    ServiceReceiver::new(context.clone(), SERVICE).on_call(ADD, |params| async move {
        let a: i64 = param(&params, 0)?;
        let b: i64 = param(&params, 1)?;
        Ok::<_, Status>(a + b)
    })
}

fn counting(context: &stream_bridge::BridgeContext, pings: &Arc<AtomicUsize>) -> ServiceReceiver {
    let pings = pings.clone();
    ServiceReceiver::new(context.clone(), SERVICE).on_notify(PING, move |_params| {
        pings.fetch_add(1, Ordering::Relaxed);
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn call_returns_the_decoded_result() {
    init_logging();
    let bus = LocalBus::new();
    let context = context(&bus, BridgeConfig::default());
    let _service = calculator(&context).register().await.expect("registers");

    let client = ServiceClient::new(context, SERVICE);
    let sum: i64 = within(client.call(ADD, vec![2.into(), 3.into()]))
        .await
        .expect("call answered");
    assert_eq!(sum, 5);

    let err = within(client.call::<i64>(ADD, vec!["two".into(), 3.into()]))
        .await
        .expect_err("bad parameter");
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_method_is_rejected() {
    init_logging();
    let bus = LocalBus::new();
    let context = context(&bus, BridgeConfig::default());
    let _service = calculator(&context).register().await.expect("registers");

    let err = within(
        ServiceClient::new(context, SERVICE).call::<i64>("::subtract(Integer,Integer)", vec![]),
    )
    .await
    .expect_err("no such method");
    assert_eq!(err.code(), Code::NotFound);
    assert!(err
        .message()
        .starts_with("Method implementation is not provided"));
}

#[tokio::test(flavor = "multi_thread")]
async fn call_without_a_service_is_not_found() {
    init_logging();
    let bus = LocalBus::new();
    let client = ServiceClient::new(context(&bus, BridgeConfig::default()), SERVICE);

    let err = within(client.call::<i64>(ADD, vec![1.into(), 1.into()]))
        .await
        .expect_err("nobody listens");
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_call_hits_the_request_timeout() {
    init_logging();
    let bus = LocalBus::new();
    let context = context(
        &bus,
        BridgeConfig {
            request_timeout_ms: 50,
            ..BridgeConfig::default()
        },
    );
    let _service = ServiceReceiver::new(context.clone(), SERVICE)
        .on_call("::slow()", |_params| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, Status>(0u8)
        })
        .register()
        .await
        .expect("registers");

    let err = within(ServiceClient::new(context, SERVICE).call::<u8>("::slow()", vec![]))
        .await
        .expect_err("too slow");
    assert_eq!(err.code(), Code::DeadlineExceeded);
}

#[tokio::test(flavor = "multi_thread")]
async fn send_reaches_one_instance_and_publish_reaches_all() {
    init_logging();
    let bus = LocalBus::new();
    let context = context(&bus, BridgeConfig::default());
    let first_pings = Arc::new(AtomicUsize::new(0));
    let second_pings = Arc::new(AtomicUsize::new(0));
    let _first = counting(&context, &first_pings).register().await.expect("registers");
    let _second = counting(&context, &second_pings).register().await.expect("registers");
    let total = || first_pings.load(Ordering::Relaxed) + second_pings.load(Ordering::Relaxed);

    let client = ServiceClient::new(context, SERVICE);
    client.send(PING, vec![]).expect("sent");
    wait_until(|| total() == 1).await;

    client.publish(PING, vec![]).expect("published");
    wait_until(|| total() == 3).await;
    assert!(first_pings.load(Ordering::Relaxed) >= 1);
    assert!(second_pings.load(Ordering::Relaxed) >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unregistered_service_stops_answering() {
    init_logging();
    let bus = LocalBus::new();
    let context = context(&bus, BridgeConfig::default());
    let registration = calculator(&context).register().await.expect("registers");
    assert_eq!(registration.address(), SERVICE);

    registration.unregister().await;
    assert_eq!(bus.consumer_count(SERVICE), 0);

    let err = within(ServiceClient::new(context, SERVICE).call::<i64>(ADD, vec![1.into(), 2.into()]))
        .await
        .expect_err("service gone");
    assert_eq!(err.code(), Code::NotFound);
}
