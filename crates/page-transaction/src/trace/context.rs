// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use opentelemetry::Context;

use crate::trace::span::Span;

/// Active span slot. `None` marks a context whose span was explicitly removed.
#[derive(Clone, Debug)]
struct ActiveSpan(Option<Span>);

#[derive(Clone, Copy, Debug)]
struct SuppressTracing(bool);

/// Span bookkeeping on top of `opentelemetry::Context`.
pub trait ContextExt {
    fn with_active_span(&self, span: Span) -> Context;
    fn without_active_span(&self) -> Context;
    fn active_span(&self) -> Option<Span>;
    fn with_tracing_suppressed(&self) -> Context;
    fn is_tracing_suppressed(&self) -> bool;
}

impl ContextExt for Context {
    fn with_active_span(&self, span: Span) -> Context {
        self.with_value(ActiveSpan(Some(span)))
    }

    fn without_active_span(&self) -> Context {
        self.with_value(ActiveSpan(None))
    }

    fn active_span(&self) -> Option<Span> {
        self.get::<ActiveSpan>().and_then(|active| active.0.clone())
    }

    fn with_tracing_suppressed(&self) -> Context {
        self.with_value(SuppressTracing(true))
    }

    fn is_tracing_suppressed(&self) -> bool {
        self.get::<SuppressTracing>()
            .is_some_and(|suppressed| suppressed.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

    fn span() -> Span {
        Span::non_recording(
            "parent",
            SpanContext::new(
                TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                SpanId::from_hex("00f067aa0ba902b7").unwrap(),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            ),
        )
    }

    #[test]
    fn test_active_span_round_trip() {
        let parent = span();
        let cx = Context::new().with_active_span(parent.clone());

        assert!(cx.active_span().is_some_and(|active| active.ptr_eq(&parent)));
        assert!(cx.without_active_span().active_span().is_none());
        assert!(Context::new().active_span().is_none());
    }

    #[test]
    fn test_suppression_is_inherited() {
        let cx = Context::new().with_tracing_suppressed();
        assert!(cx.is_tracing_suppressed());
        assert!(cx.with_active_span(span()).is_tracing_suppressed());
        assert!(!Context::new().is_tracing_suppressed());
    }
}
