// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! B3 single-header propagation: `b3: {trace_id}-{span_id}-{sampled}`.

use lazy_static::lazy_static;
use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use regex::Regex;
use tracing::debug;

use crate::propagation::carrier::{Extractor, Injector};

pub const B3_SINGLE_HEADER: &str = "b3";

lazy_static! {
    static ref B3_SINGLE_REGEX: Regex =
        Regex::new(r"^([0-9a-f]{16}|[0-9a-f]{32})-([0-9a-f]{16})(?:-([01d]))?(?:-[0-9a-f]{16})?$")
            .expect("failed creating regex");
}

#[derive(Debug, Clone, Copy, Default)]
pub struct B3Propagator;

impl B3Propagator {
    /// Writes the `b3` header. Invalid contexts are not propagated.
    pub fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector) {
        if !context.is_valid() {
            debug!("Not injecting b3 header: invalid span context");
            return;
        }
        let sampled = if context.is_sampled() { "1" } else { "0" };
        carrier.set(
            B3_SINGLE_HEADER,
            format!("{}-{}-{sampled}", context.trace_id(), context.span_id()),
        );
    }

    pub fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContext> {
        let header = carrier.get(B3_SINGLE_HEADER)?;
        let caps = B3_SINGLE_REGEX.captures(header.trim())?;

        // 64-bit trace ids are left-padded
        let trace_id = format!("{:0>32}", &caps[1]);
        let trace_id = TraceId::from_hex(&trace_id).ok()?;
        let span_id = SpanId::from_hex(&caps[2]).ok()?;
        let flags = match caps.get(3).map(|m| m.as_str()) {
            Some("1") | Some("d") => TraceFlags::SAMPLED,
            _ => TraceFlags::default(),
        };

        let context = SpanContext::new(trace_id, span_id, flags, true, TraceState::default());
        context.is_valid().then_some(context)
    }
}
