// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use opentelemetry::KeyValue;
use page_transaction::{Span, SpanOptions, Tracer};

use crate::config::RequestParameterConfig;
use crate::instrumentation::beacon::BeaconVars;
use crate::instrumentation::url_params::add_url_params;

pub const INSTRUMENTATION_NAME: &str = "user-interaction";

/// Spans for clicks and other DOM events the page listens to.
#[derive(Debug)]
pub struct UserInteractionInstrumentation {
    tracer: Tracer,
    request_parameter: RequestParameterConfig,
    page_url: Option<String>,
    beacon: Arc<dyn BeaconVars>,
}

impl UserInteractionInstrumentation {
    pub fn new(
        tracer: Tracer,
        request_parameter: RequestParameterConfig,
        beacon: Arc<dyn BeaconVars>,
    ) -> Self {
        Self {
            tracer,
            request_parameter,
            page_url: None,
            beacon,
        }
    }

    pub fn set_page_url(&mut self, page_url: &str) {
        self.page_url = Some(page_url.to_string());
    }

    /// Starts the span of one event. The caller ends it once the event's handlers are done.
    pub fn start(&self, event_name: &str, target_xpath: &str) -> Span {
        let mut attributes = vec![
            KeyValue::new("component", INSTRUMENTATION_NAME),
            KeyValue::new("event_type", event_name.to_string()),
            KeyValue::new("target_xpath", target_xpath.to_string()),
        ];
        if let Some(page_url) = &self.page_url {
            attributes.push(KeyValue::new("http.url", page_url.clone()));
        }

        let span = self.tracer.start_span(
            event_name,
            SpanOptions::default().with_attributes(attributes),
        );

        if self.request_parameter.enabled {
            if let Some(page_url) = &self.page_url {
                add_url_params(
                    &span,
                    page_url,
                    &self.request_parameter.exclude_keys_from_beacons,
                    self.beacon.as_ref(),
                );
            }
        }
        span
    }
}
