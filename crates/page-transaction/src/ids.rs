// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Random trace and span identifiers.
//!
//! Identifiers are filled with process randomness. An all-zero identifier is the W3C "invalid"
//! value and cannot be told apart from "unset", so a zero draw gets its last byte forced to `0x01`
//! instead of being redrawn.

use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry_sdk::trace::IdGenerator;
use rand::RngCore;

pub const TRACE_ID_BYTES: usize = 16;
pub const SPAN_ID_BYTES: usize = 8;

/// Forces the last byte to `0x01` when every byte is zero.
pub fn ensure_non_zero(bytes: &mut [u8]) {
    if bytes.iter().all(|b| *b == 0) {
        if let Some(last) = bytes.last_mut() {
            *last = 1;
        }
    }
}

pub fn random_trace_id() -> TraceId {
    let mut bytes = [0u8; TRACE_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    ensure_non_zero(&mut bytes);
    TraceId::from_bytes(bytes)
}

pub fn random_span_id() -> SpanId {
    let mut bytes = [0u8; SPAN_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    ensure_non_zero(&mut bytes);
    SpanId::from_bytes(bytes)
}

/// Random generator that never yields the invalid all-zero identifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonZeroIdGenerator;

impl IdGenerator for NonZeroIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        random_trace_id()
    }

    fn new_span_id(&self) -> SpanId {
        random_span_id()
    }
}
