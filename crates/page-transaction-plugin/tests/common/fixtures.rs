// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Page loads and configurations shared by the plugin tests

use std::time::{Duration, SystemTime};

use page_transaction::ServerTimingEntry;
use page_transaction_plugin::config::DocumentLoadConfig;
use page_transaction_plugin::instrumentation::{PageLoad, PerformanceEntries, ResourceEntry};
use page_transaction_plugin::PluginConfig;

pub const SERVER_TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const SERVER_SPAN_ID: &str = "00f067aa0ba902b7";
pub const PAGE_URL: &str = "https://shop.example/?campaign=fall";

/// A finished page load whose navigation record carries the server's traceparent
pub fn page_load() -> PageLoad {
    let start = SystemTime::now() - Duration::from_secs(3);
    let navigation = PerformanceEntries::new(start)
        .with_response(
            start + Duration::from_millis(80),
            start + Duration::from_millis(250),
        )
        .with_load_event_end(start + Duration::from_millis(1_200))
        .with_server_timing(vec![
            ServerTimingEntry::new("cache", "miss"),
            ServerTimingEntry::new(
                "traceparent",
                &format!("00-{SERVER_TRACE_ID}-{SERVER_SPAN_ID}-01"),
            ),
        ]);

    PageLoad {
        resources: vec![ResourceEntry {
            url: "https://shop.example/app.js".to_string(),
            initiator_type: "script".to_string(),
            entries: PerformanceEntries::new(start + Duration::from_millis(300)).with_response(
                start + Duration::from_millis(320),
                start + Duration::from_millis(450),
            ),
        }],
        ..PageLoad::new(PAGE_URL, navigation)
    }
}

#[allow(dead_code)]
pub fn console_config(record_transaction: bool) -> PluginConfig {
    let mut config = PluginConfig {
        console_only: true,
        ..Default::default()
    };
    config.plugins_config.instrument_document_load = DocumentLoadConfig {
        record_transaction,
        exporter_delay: 5,
    };
    config
}
