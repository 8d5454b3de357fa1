// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client spans for `fetch` and `XMLHttpRequest` calls.

use std::sync::Arc;

use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use page_transaction::{Span, SpanOptions, Tracer};
use regex::Regex;
use reqwest::Url;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::PluginError;
use crate::instrumentation::beacon::BeaconVars;
use crate::instrumentation::url_params::add_url_params;
use crate::propagation::{B3Propagator, Injector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkApi {
    Fetch,
    Xhr,
}

impl NetworkApi {
    pub fn instrumentation_name(&self) -> &'static str {
        match self {
            NetworkApi::Fetch => "fetch",
            NetworkApi::Xhr => "xml-http-request",
        }
    }
}

#[derive(Debug)]
pub struct NetworkInstrumentation {
    api: NetworkApi,
    tracer: Tracer,
    exclude_keys: Vec<String>,
    cors_urls: Vec<Regex>,
    page_url: Option<Url>,
    propagator: B3Propagator,
    beacon: Arc<dyn BeaconVars>,
}

impl NetworkInstrumentation {
    pub fn new(
        api: NetworkApi,
        tracer: Tracer,
        config: &NetworkConfig,
        cors_urls: &[String],
        beacon: Arc<dyn BeaconVars>,
    ) -> Result<Self, PluginError> {
        let cors_urls = cors_urls
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    PluginError::InvalidConfig(format!("Invalid corsUrls pattern '{pattern}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            api,
            tracer,
            exclude_keys: config.exclude_parameter_keys.clone(),
            cors_urls,
            page_url: None,
            propagator: B3Propagator,
            beacon,
        })
    }

    /// Sets the page URL that relative request URLs resolve against.
    pub fn set_page_url(&mut self, page_url: &str) -> Result<(), PluginError> {
        let url = Url::parse(page_url)
            .map_err(|e| PluginError::InvalidConfig(format!("Invalid page URL {page_url}: {e}")))?;
        self.page_url = Some(url);
        Ok(())
    }

    pub fn api(&self) -> NetworkApi {
        self.api
    }

    pub fn start(&self, url: &str, method: &str) -> Span {
        let method = method.to_uppercase();
        let options = SpanOptions::default()
            .with_kind(SpanKind::Client)
            .with_attributes([
                KeyValue::new("component", self.api.instrumentation_name()),
                KeyValue::new("http.method", method.clone()),
                KeyValue::new("http.url", self.resolve(url)),
            ]);
        let span = self.tracer.start_span(&format!("HTTP {method}"), options);
        add_url_params(&span, url, &self.exclude_keys, self.beacon.as_ref());
        span
    }

    /// Adds the trace header for `url` when the request may carry it. Returns whether it was added.
    pub fn inject_headers(&self, span: &Span, url: &str, headers: &mut dyn Injector) -> bool {
        if !self.should_propagate(url) {
            debug!("Not propagating trace headers to {url}");
            return false;
        }
        self.propagator.inject(span.span_context(), headers);
        true
    }

    pub fn finish(&self, span: &Span, status_code: u16) {
        span.set_attribute(KeyValue::new("http.status_code", i64::from(status_code)));
        span.end();
    }

    fn resolve(&self, url: &str) -> String {
        match &self.page_url {
            Some(base) => base
                .join(url)
                .map(String::from)
                .unwrap_or_else(|_| url.to_string()),
            None => url.to_string(),
        }
    }

    fn should_propagate(&self, url: &str) -> bool {
        let resolved = self.resolve(url);
        if let (Some(page_url), Ok(target)) = (&self.page_url, Url::parse(&resolved)) {
            if page_url.origin() == target.origin() {
                return true;
            }
        }
        self.cors_urls
            .iter()
            .any(|pattern| pattern.is_match(&resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrumentation::beacon::InMemoryBeacon;
    use opentelemetry::Value;
    use page_transaction::TracerProvider;
    use std::collections::HashMap;

    fn instrumentation(api: NetworkApi, cors_urls: &[String]) -> NetworkInstrumentation {
        let tracer = TracerProvider::builder()
            .build()
            .tracer(api.instrumentation_name(), None);
        let config = NetworkConfig {
            exclude_parameter_keys: vec!["token".to_string()],
        };
        let mut instrumentation = NetworkInstrumentation::new(
            api,
            tracer,
            &config,
            cors_urls,
            Arc::new(InMemoryBeacon::new()),
        )
        .unwrap();
        instrumentation
            .set_page_url("https://shop.example/cart")
            .unwrap();
        instrumentation
    }

    #[test]
    fn test_client_span() {
        let fetch = instrumentation(NetworkApi::Fetch, &[]);

        let span = fetch.start("/api/items?page=2&token=secret", "get");
        fetch.finish(&span, 200);

        assert_eq!(span.name(), "HTTP GET");
        assert_eq!(*span.kind(), SpanKind::Client);
        assert!(span.is_ended());
        assert_eq!(span.attribute("component"), Some(Value::from("fetch")));
        assert_eq!(
            span.attribute("http.url"),
            Some(Value::from("https://shop.example/api/items?page=2&token=secret"))
        );
        assert_eq!(span.attribute("http.status_code"), Some(Value::I64(200)));
        assert_eq!(span.attribute("page"), Some(Value::from("2")));
        assert_eq!(span.attribute("token"), Some(Value::from("secret")));
    }

    #[test]
    fn test_excluded_params_stay_out_of_beacon() {
        let tracer = TracerProvider::builder().build().tracer("xhr", None);
        let beacon = Arc::new(InMemoryBeacon::new());
        let xhr = NetworkInstrumentation::new(
            NetworkApi::Xhr,
            tracer,
            &NetworkConfig {
                exclude_parameter_keys: vec!["token".to_string()],
            },
            &[],
            beacon.clone(),
        )
        .unwrap();

        xhr.start("https://shop.example/api?page=2&token=secret", "POST");

        assert_eq!(beacon.var("page").as_deref(), Some("2"));
        assert_eq!(beacon.var("token"), None);
    }

    #[test]
    fn test_same_origin_requests_get_b3_header() {
        let xhr = instrumentation(NetworkApi::Xhr, &[]);
        let span = xhr.start("/api/items", "POST");
        let mut headers: HashMap<String, String> = HashMap::new();

        assert!(xhr.inject_headers(&span, "/api/items", &mut headers));

        let context = span.span_context();
        assert_eq!(
            headers["b3"],
            format!("{}-{}-1", context.trace_id(), context.span_id())
        );
    }

    #[test]
    fn test_cross_origin_requests_need_cors_pattern() {
        let fetch = instrumentation(
            NetworkApi::Fetch,
            &[r"^https://api\.partner\.example/.*".to_string()],
        );
        let span = fetch.start("https://api.partner.example/orders", "GET");

        let mut headers: HashMap<String, String> = HashMap::new();
        assert!(fetch.inject_headers(&span, "https://api.partner.example/orders", &mut headers));
        assert!(headers.contains_key("b3"));

        let mut headers: HashMap<String, String> = HashMap::new();
        assert!(!fetch.inject_headers(&span, "https://tracker.example/pixel", &mut headers));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_invalid_cors_pattern() {
        let tracer = TracerProvider::builder().build().tracer("fetch", None);
        let result = NetworkInstrumentation::new(
            NetworkApi::Fetch,
            tracer,
            &NetworkConfig::default(),
            &["(".to_string()],
            Arc::new(InMemoryBeacon::new()),
        );
        assert!(matches!(result, Err(PluginError::InvalidConfig(_))));
    }
}
