// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Correlation with the server through `Server-Timing`.
//!
//! A server that wants the page to continue its trace answers with
//! `Server-Timing: traceparent;desc="00-<trace-id>-<span-id>-01"`. The browser exposes the entry on
//! the navigation and resource timing records.

use lazy_static::lazy_static;
use opentelemetry::trace::{SpanId, TraceId};
use regex::Regex;
use tracing::debug;

use crate::transaction::state::TransactionState;

pub const TRACEPARENT_ENTRY_NAME: &str = "traceparent";

lazy_static! {
    /// Sampled version-00 traceparent: `00-<32 hex trace id>-<16 hex span id>-01`.
    static ref TRACEPARENT_DESCRIPTION_REGEX: Regex =
        Regex::new(r"^00-([0-9a-f]{32})-([0-9a-f]{16})-01$").expect("failed creating regex");
}

/// One `Server-Timing` entry as exposed by the browser.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerTimingEntry {
    pub name: String,
    pub description: String,
    pub duration: f64,
}

impl ServerTimingEntry {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            duration: 0.0,
        }
    }
}

/// Trace and span id of the first well-formed `traceparent` entry.
///
/// Malformed descriptions and all-zero ids are skipped.
pub fn extract(entries: &[ServerTimingEntry]) -> Option<(TraceId, SpanId)> {
    entries
        .iter()
        .filter(|entry| entry.name == TRACEPARENT_ENTRY_NAME)
        .find_map(|entry| parse_description(&entry.description))
}

fn parse_description(description: &str) -> Option<(TraceId, SpanId)> {
    let Some(captures) = TRACEPARENT_DESCRIPTION_REGEX.captures(description) else {
        debug!("Ignoring malformed traceparent server timing: {description}");
        return None;
    };
    let trace_id = TraceId::from_hex(captures.get(1)?.as_str()).ok()?;
    let span_id = SpanId::from_hex(captures.get(2)?.as_str()).ok()?;
    if trace_id == TraceId::INVALID || span_id == SpanId::INVALID {
        debug!("Ignoring all-zero traceparent server timing");
        return None;
    }
    Some((trace_id, span_id))
}

/// Extracts the correlation and stores it in the transaction state.
///
/// Must run before the `documentLoad` span is created.
pub fn capture_traceparent(
    entries: &[ServerTimingEntry],
    state: &TransactionState,
) -> Option<(TraceId, SpanId)> {
    let (trace_id, span_id) = extract(entries)?;
    debug!("Captured server traceparent {trace_id}-{span_id}");
    state.set_trace_id(Some(trace_id));
    state.set_span_id(Some(span_id));
    Some((trace_id, span_id))
}
