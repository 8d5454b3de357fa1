// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Spans for the initial page load.
//!
//! `documentLoad` covers the whole load, `documentFetch` the HTML request and one `resourceFetch`
//! span covers each resource. When transactions are recorded, `documentLoad` becomes the page's
//! transaction span: it continues the server's trace and stays open until the page unloads.

use std::sync::Arc;
use std::time::SystemTime;

use opentelemetry::{Context, KeyValue};
use page_transaction::{
    capture_traceparent, ContextExt, RootSpanGuard, Span, SpanOptions, Tracer, TransactionState,
    DOCUMENT_LOAD_SPAN_NAME,
};
use tracing::debug;

use crate::config::{DocumentLoadConfig, RequestParameterConfig};
use crate::instrumentation::beacon::BeaconVars;
use crate::instrumentation::performance::{PageLoad, PerformanceEntries};
use crate::instrumentation::url_params::add_url_params;

pub const INSTRUMENTATION_NAME: &str = "document-load-server-timing";

pub const DOCUMENT_FETCH_SPAN_NAME: &str = "documentFetch";
pub const RESOURCE_FETCH_SPAN_NAME: &str = "resourceFetch";

#[derive(Debug)]
pub struct DocumentLoadInstrumentation {
    tracer: Tracer,
    state: Arc<TransactionState>,
    guard: RootSpanGuard,
    record_transaction: bool,
    request_parameter: RequestParameterConfig,
    beacon: Arc<dyn BeaconVars>,
}

impl DocumentLoadInstrumentation {
    pub fn new(
        tracer: Tracer,
        state: Arc<TransactionState>,
        config: &DocumentLoadConfig,
        request_parameter: RequestParameterConfig,
        beacon: Arc<dyn BeaconVars>,
    ) -> Self {
        Self {
            tracer,
            guard: RootSpanGuard::new(state.clone()),
            state,
            record_transaction: config.record_transaction,
            request_parameter,
            beacon,
        }
    }

    /// Records the spans of a finished page load and returns the `documentLoad` span.
    ///
    /// The server correlation is captured once, right before `documentLoad` starts, so only that
    /// span takes the server's span id. A transaction span left open from earlier is ended first.
    pub fn record(&self, page: &PageLoad) -> Span {
        if self.record_transaction {
            if let Some(previous) = self.state.take_span() {
                debug!("Ending transaction span {} before page load", previous.name());
                previous.end();
            }
            let server_timing = if page.navigation.server_timing.is_empty() {
                &page.navigation_server_timing
            } else {
                &page.navigation.server_timing
            };
            capture_traceparent(server_timing, &self.state);
        }

        let document_load = self.start_span(
            DOCUMENT_LOAD_SPAN_NAME,
            &page.navigation,
            &Context::current(),
            vec![KeyValue::new("http.url", page.url.clone())],
        );
        if self.record_transaction {
            self.state.set_span(Some(document_load.clone()));
        }
        if self.request_parameter.enabled {
            add_url_params(
                &document_load,
                &page.url,
                &self.request_parameter.exclude_keys_from_beacons,
                self.beacon.as_ref(),
            );
        }

        let cx = Context::current().with_active_span(document_load.clone());

        let document_fetch = self.start_span(
            DOCUMENT_FETCH_SPAN_NAME,
            &page.navigation,
            &cx,
            vec![KeyValue::new("http.url", page.url.clone())],
        );
        self.end_span(&document_fetch, page.navigation.response_end);

        for resource in &page.resources {
            let span = self.start_span(
                RESOURCE_FETCH_SPAN_NAME,
                &resource.entries,
                &cx,
                vec![
                    KeyValue::new("http.url", resource.url.clone()),
                    KeyValue::new("http.initiator_type", resource.initiator_type.clone()),
                ],
            );
            self.end_span(&span, resource.entries.response_end);
        }

        self.end_span(&document_load, page.navigation.load_event_end);
        document_load
    }

    fn start_span(
        &self,
        name: &str,
        entries: &PerformanceEntries,
        cx: &Context,
        attributes: Vec<KeyValue>,
    ) -> Span {
        let options = SpanOptions::default()
            .with_start_time(entries.fetch_start)
            .with_attributes(attributes);
        self.tracer.start_span_with_context(name, options, cx)
    }

    fn end_span(&self, span: &Span, end_time: Option<SystemTime>) {
        let end_time = end_time.unwrap_or_else(SystemTime::now);
        if self.record_transaction {
            if !self.guard.guarded_end_with_timestamp(span, end_time) {
                debug!("{} stays open until the page unloads", span.name());
            }
        } else {
            span.end_with_timestamp(end_time);
        }
    }
}
