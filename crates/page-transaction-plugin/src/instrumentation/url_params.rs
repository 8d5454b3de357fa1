// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use opentelemetry::KeyValue;
use page_transaction::Span;

use crate::instrumentation::beacon::BeaconVars;

/// Tags `span` with every `key=value` pair of the query string of `url`.
///
/// Pairs whose key is not in `exclude_keys` are also added to the beacon. Values are kept as they
/// appear in the URL, a key without `=` gets an empty value.
pub fn add_url_params(span: &Span, url: &str, exclude_keys: &[String], beacon: &dyn BeaconVars) {
    let Some(query) = query_string(url) else {
        return;
    };

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            continue;
        }
        span.set_attribute(KeyValue::new(key.to_string(), value.to_string()));

        if !exclude_keys.iter().any(|excluded| excluded == key) {
            beacon.add_var(key, value);
        }
    }
}

fn query_string(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once('?')?;
    let query = rest.split('#').next().unwrap_or(rest);
    (!query.is_empty()).then_some(query)
}
