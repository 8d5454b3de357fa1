// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::fixtures::{console_config, page_load, SERVER_SPAN_ID, SERVER_TRACE_ID};
use mockito::Matcher;
use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry::Value;
use page_transaction_plugin::{PluginConfig, TracingPlugin};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_page_transaction_reaches_collector() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/spans")
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(SERVER_TRACE_ID.to_string()),
            Matcher::Regex("\"application\"".to_string()),
        ]))
        .with_status(200)
        .expect_at_least(1)
        .create_async()
        .await;

    let mut config = PluginConfig {
        common_attributes: HashMap::from([("application".to_string(), "shop".to_string())]),
        service_name: "shop-frontend".to_string(),
        ..console_config(true)
    };
    config.console_only = false;

    let mut plugin = TracingPlugin::new(config);
    plugin.set_beacon_url(&format!("{}/beacon", server.url()));
    plugin.set_page_url("https://shop.example/cart").unwrap();
    plugin.register().unwrap();

    let document_load = plugin.document_load().unwrap().record(&page_load());
    assert_eq!(
        document_load.span_context().trace_id(),
        TraceId::from_hex(SERVER_TRACE_ID).unwrap()
    );
    assert_eq!(
        document_load.span_context().span_id(),
        SpanId::from_hex(SERVER_SPAN_ID).unwrap()
    );
    assert!(!document_load.is_ended());

    let fetch = plugin.fetch().unwrap();
    let request = fetch.start("/api/cart", "GET");
    assert_eq!(
        request.parent_span_id(),
        Some(SpanId::from_hex(SERVER_SPAN_ID).unwrap())
    );
    fetch.finish(&request, 200);

    plugin.on_unload();
    assert!(document_load.is_ended());
    assert!(plugin.transaction_span().is_none());

    plugin.shutdown().await.unwrap();
    assert!(!plugin.is_initialized());
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unload_delivers_spans_before_shutdown() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/spans")
        .match_body(Matcher::Regex(SERVER_TRACE_ID.to_string()))
        .with_status(200)
        .expect_at_least(1)
        .create_async()
        .await;

    let mut config = console_config(true);
    config.console_only = false;
    let mut plugin = TracingPlugin::new(config);
    plugin.set_beacon_url(&format!("{}/beacon", server.url()));
    plugin.register().unwrap();

    plugin.document_load().unwrap().record(&page_load());
    plugin.on_unload();

    let delivered = tokio::time::timeout(Duration::from_secs(2), async {
        while !mock.matched_async().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "unload flush never reached the collector");
    mock.assert_async().await;

    plugin.shutdown().await.unwrap();
}

#[test]
fn test_console_only_page_without_transactions() {
    let mut plugin = TracingPlugin::new(console_config(false));
    plugin.register().unwrap();
    plugin.add_var_to_spans("release", "1.4.2");

    let document_load = plugin.document_load().unwrap().record(&page_load());
    assert!(document_load.is_ended());
    assert_ne!(
        document_load.span_context().trace_id(),
        TraceId::from_hex(SERVER_TRACE_ID).unwrap()
    );
    assert_eq!(document_load.attribute("release"), Some(Value::from("1.4.2")));
    assert!(plugin.start_new_transaction("checkout").is_none());

    let click = plugin
        .user_interaction()
        .unwrap()
        .start("click", "//button[@id='buy']");
    assert_eq!(click.parent_span_id(), None);
    click.end();

    plugin.on_unload();
}

#[test]
fn test_new_transaction_after_page_load() {
    let mut plugin = TracingPlugin::new(console_config(true));
    plugin.register().unwrap();

    let document_load = plugin.document_load().unwrap().record(&page_load());
    let checkout = plugin.start_new_transaction("checkout").unwrap();

    assert!(document_load.is_ended());
    assert!(!checkout.is_ended());
    assert_ne!(
        checkout.span_context().trace_id(),
        document_load.span_context().trace_id()
    );
    assert_eq!(checkout.parent_span_id(), None);

    let xhr = plugin.xhr().unwrap();
    let request = xhr.start("https://shop.example/api/pay", "post");
    assert_eq!(request.name(), "HTTP POST");
    assert_eq!(
        request.span_context().trace_id(),
        checkout.span_context().trace_id()
    );
    assert_eq!(
        request.parent_span_id(),
        Some(checkout.span_context().span_id())
    );

    let mut headers: HashMap<String, String> = HashMap::new();
    assert!(!xhr.inject_headers(&request, "https://shop.example/api/pay", &mut headers));

    plugin.set_page_url("https://shop.example/checkout").unwrap();
    let xhr = plugin.xhr().unwrap();
    assert!(xhr.inject_headers(&request, "https://shop.example/api/pay", &mut headers));
    assert!(headers["b3"].starts_with(&checkout.span_context().trace_id().to_string()));

    plugin.on_unload();
    assert!(checkout.is_ended());
}

#[test]
fn test_negative_sampling_rate_records_nothing() {
    let mut plugin = TracingPlugin::new(PluginConfig {
        sampling_rate: -1.0,
        ..console_config(false)
    });
    plugin.register().unwrap();

    let tracer = plugin.tracer("manual", None).unwrap();
    let span = tracer.start_span("work", Default::default());

    assert!(!span.is_recording());
    assert!(!span.span_context().is_sampled());
}
