// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry_sdk::trace::IdGenerator;

use crate::ids::NonZeroIdGenerator;
use crate::transaction::state::TransactionState;

/// Reuses the transaction's trace id for every new trace while one is stored.
///
/// Span ids are always random. The captured server span id is applied by the tracer, not here.
#[derive(Debug, Clone)]
pub struct CorrelatedIdGenerator {
    state: Arc<TransactionState>,
    random: NonZeroIdGenerator,
}

impl CorrelatedIdGenerator {
    pub fn new(state: Arc<TransactionState>) -> Self {
        Self {
            state,
            random: NonZeroIdGenerator,
        }
    }
}

impl IdGenerator for CorrelatedIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        self.state
            .trace_id()
            .unwrap_or_else(|| self.random.new_trace_id())
    }

    fn new_span_id(&self) -> SpanId {
        self.random.new_span_id()
    }
}
