// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry_sdk::trace::IdGenerator;
use tracing::{debug, warn};

use crate::ids::NonZeroIdGenerator;
use crate::trace::span::Span;
use crate::trace::tracer::{SpanOptions, Tracer};

/// The page's transaction: correlated ids and the long-lived transaction span.
///
/// One instance is shared (`Arc`) by every component of a page. It starts disabled and empty;
/// while disabled every setter is a no-op.
#[derive(Default)]
pub struct TransactionState {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    enabled: bool,
    trace_id: Option<TraceId>,
    span_id: Option<SpanId>,
    span: Option<Span>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

impl TransactionState {
    pub fn new(enabled: bool) -> Self {
        let state = Self::default();
        state.initialize(enabled, Arc::new(NonZeroIdGenerator));
        state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the state. Calling it again replaces the configuration.
    ///
    /// `id_generator` produces the trace id of transactions started with `start_new_transaction`.
    pub fn initialize(&self, enabled: bool, id_generator: Arc<dyn IdGenerator>) {
        debug!("Transaction recording enabled: {enabled}");
        let mut inner = self.lock();
        inner.enabled = enabled;
        inner.id_generator = Some(id_generator);
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn trace_id(&self) -> Option<TraceId> {
        self.lock().trace_id
    }

    pub fn span_id(&self) -> Option<SpanId> {
        self.lock().span_id
    }

    pub fn span(&self) -> Option<Span> {
        self.lock().span.clone()
    }

    pub fn set_trace_id(&self, trace_id: Option<TraceId>) {
        let mut inner = self.lock();
        if inner.enabled {
            inner.trace_id = trace_id;
        }
    }

    pub fn set_span_id(&self, span_id: Option<SpanId>) {
        let mut inner = self.lock();
        if inner.enabled {
            inner.span_id = span_id;
        }
    }

    pub fn set_span(&self, span: Option<Span>) {
        let mut inner = self.lock();
        if inner.enabled {
            inner.span = span;
        }
    }

    /// Removes the captured span id so it is applied to a single span.
    pub fn take_span_id(&self) -> Option<SpanId> {
        self.lock().span_id.take()
    }

    /// Removes the transaction span, handing it to the caller.
    pub fn take_span(&self) -> Option<Span> {
        self.lock().span.take()
    }

    /// Whether `span` is the registered transaction span.
    pub fn is_transaction_span(&self, span: &Span) -> bool {
        self.lock()
            .span
            .as_ref()
            .is_some_and(|transaction| transaction.ptr_eq(span))
    }

    /// Ends the current transaction span and starts a new root span with a fresh trace id.
    ///
    /// Spans that already took the previous transaction span as parent keep it.
    pub fn start_new_transaction(&self, name: &str, tracer: &Tracer) -> Option<Span> {
        let previous = {
            let mut inner = self.lock();
            if !inner.enabled {
                drop(inner);
                warn!("No transaction started: transaction recording is disabled");
                return None;
            }
            inner.trace_id = None;
            inner.span_id = None;
            let trace_id = inner
                .id_generator
                .get_or_insert_with(|| Arc::new(NonZeroIdGenerator))
                .new_trace_id();
            inner.trace_id = Some(trace_id);
            inner.span.take()
        };

        if let Some(previous) = previous {
            debug!("Ending transaction span {}", previous.name());
            previous.end();
        }

        let span = tracer.start_span(name, SpanOptions::default().root());
        debug!(
            "Started transaction {name} with trace id {}",
            span.span_context().trace_id()
        );
        self.set_span(Some(span.clone()));
        Some(span)
    }
}

impl fmt::Debug for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("TransactionState")
            .field("enabled", &inner.enabled)
            .field("trace_id", &inner.trace_id)
            .field("span_id", &inner.span_id)
            .field("has_span", &inner.span.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessorError;
    use crate::trace::processor::SpanProcessor;
    use crate::trace::provider::TracerProvider;
    use crate::trace::span::SpanData;
    use async_trait::async_trait;
    use opentelemetry::Context;
    use tracing_test::traced_test;

    #[derive(Debug, Default)]
    struct Recorder {
        ended: Mutex<Vec<SpanData>>,
    }

    #[async_trait]
    impl SpanProcessor for Recorder {
        fn on_start(&self, _span: &Span, _parent_cx: &Context) {}

        fn on_end(&self, span: &SpanData) {
            self.ended.lock().unwrap().push(span.clone());
        }

        async fn force_flush(&self) -> Result<(), ProcessorError> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn trace_id() -> TraceId {
        TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
    }

    fn span_id() -> SpanId {
        SpanId::from_hex("00f067aa0ba902b7").unwrap()
    }

    fn tracer(state: &Arc<TransactionState>, recorder: Arc<Recorder>) -> Tracer {
        TracerProvider::builder()
            .with_span_processor(recorder)
            .with_transactions(state.clone())
            .build()
            .tracer("test", None)
    }

    #[test]
    fn test_disabled_setters_are_noops() {
        let state = Arc::new(TransactionState::new(false));
        let tracer = tracer(&state, Arc::new(Recorder::default()));
        let span = tracer.start_span("documentLoad", SpanOptions::default());

        state.set_trace_id(Some(trace_id()));
        state.set_span_id(Some(span_id()));
        state.set_span(Some(span));

        assert!(state.trace_id().is_none());
        assert!(state.span_id().is_none());
        assert!(state.span().is_none());
    }

    #[test]
    fn test_enabled_setters_store_values() {
        let state = TransactionState::new(true);
        state.set_trace_id(Some(trace_id()));
        state.set_span_id(Some(span_id()));

        assert_eq!(state.trace_id(), Some(trace_id()));
        assert_eq!(state.span_id(), Some(span_id()));
        assert_eq!(state.take_span_id(), Some(span_id()));
        assert_eq!(state.span_id(), None);

        state.set_trace_id(None);
        assert_eq!(state.trace_id(), None);
    }

    #[test]
    fn test_reinitialize_replaces_configuration() {
        let state = TransactionState::new(true);
        state.initialize(false, Arc::new(NonZeroIdGenerator));
        state.set_trace_id(Some(trace_id()));

        assert!(!state.is_enabled());
        assert!(state.trace_id().is_none());
    }

    #[test]
    #[traced_test]
    fn test_start_new_transaction_disabled_warns() {
        let state = Arc::new(TransactionState::new(false));
        let tracer = tracer(&state, Arc::new(Recorder::default()));

        assert!(state.start_new_transaction("nav-2", &tracer).is_none());
        assert!(state.span().is_none());
        assert!(logs_contain(
            "No transaction started: transaction recording is disabled"
        ));
    }

    #[test]
    fn test_start_new_transaction_replaces_span() {
        let state = Arc::new(TransactionState::new(true));
        let recorder = Arc::new(Recorder::default());
        let tracer = tracer(&state, recorder.clone());

        let first = state
            .start_new_transaction("nav-1", &tracer)
            .expect("transaction started");
        let second = state
            .start_new_transaction("nav-2", &tracer)
            .expect("transaction started");

        assert!(first.is_ended());
        assert!(!second.is_ended());
        assert!(second.parent_span_id().is_none());
        assert!(state.is_transaction_span(&second));
        assert!(!state.is_transaction_span(&first));
        assert_ne!(
            first.span_context().trace_id(),
            second.span_context().trace_id()
        );
        assert_eq!(state.trace_id(), Some(second.span_context().trace_id()));

        let ended = recorder.ended.lock().unwrap();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].name, "nav-1");
    }

    #[test]
    fn test_take_span_empties_the_slot() {
        let state = Arc::new(TransactionState::new(true));
        let tracer = tracer(&state, Arc::new(Recorder::default()));
        let span = state
            .start_new_transaction("page", &tracer)
            .expect("transaction started");

        let taken = state.take_span().expect("span registered");
        assert!(taken.ptr_eq(&span));
        assert!(state.span().is_none());
    }
}
