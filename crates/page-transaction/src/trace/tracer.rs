// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span creation.
//!
//! There is a single creation algorithm. The two places where transaction-aware tracing differs
//! from plain tracing (where a missing parent is looked up, and which span id the `documentLoad`
//! span receives) are strategies injected by the provider.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use opentelemetry::trace::{
    Link, SamplingDecision, SpanContext, SpanId, SpanKind, TraceContextExt as _, TraceFlags,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{IdGenerator, ShouldSample};
use tracing::debug;

use crate::trace::context::ContextExt;
use crate::trace::processor::{MultiSpanProcessor, SpanProcessor};
use crate::trace::span::{sanitize_attributes, RecordingSpan, Span};
use crate::transaction::state::TransactionState;

/// Name of the span that becomes the page's transaction span.
pub const DOCUMENT_LOAD_SPAN_NAME: &str = "documentLoad";

/// Where a span without a contextual parent looks for one.
#[derive(Clone, Debug, Default)]
pub enum ParentStrategy {
    /// Only the active context. A span without one starts a new trace.
    #[default]
    ContextOnly,
    /// Falls back to the registered transaction span.
    TransactionFallback(Arc<TransactionState>),
}

impl ParentStrategy {
    fn fallback_parent(&self) -> Option<Span> {
        match self {
            ParentStrategy::ContextOnly => None,
            ParentStrategy::TransactionFallback(state) => state.span(),
        }
    }
}

/// Which span id a new span receives.
#[derive(Clone, Debug, Default)]
pub enum SpanIdStrategy {
    #[default]
    Generated,
    /// The `documentLoad` span takes the span id captured from the server, once.
    DocumentLoadOverride(Arc<TransactionState>),
}

impl SpanIdStrategy {
    fn span_id(&self, name: &str, id_generator: &dyn IdGenerator) -> SpanId {
        let generated = id_generator.new_span_id();
        match self {
            SpanIdStrategy::DocumentLoadOverride(state) if name == DOCUMENT_LOAD_SPAN_NAME => {
                match state.take_span_id() {
                    Some(captured) => {
                        debug!("Using captured span id {captured} for {name}");
                        captured
                    }
                    None => generated,
                }
            }
            _ => generated,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SpanOptions {
    pub kind: SpanKind,
    pub attributes: Vec<KeyValue>,
    pub links: Vec<Link>,
    pub start_time: Option<SystemTime>,
    /// Ignore any parent carried by the context.
    pub root: bool,
}

impl Default for SpanOptions {
    fn default() -> Self {
        Self {
            kind: SpanKind::Internal,
            attributes: Vec::new(),
            links: Vec::new(),
            start_time: None,
            root: false,
        }
    }
}

impl SpanOptions {
    #[must_use]
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    #[must_use]
    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = links;
        self
    }

    #[must_use]
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    #[must_use]
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }
}

/// Everything a tracer needs to build spans, shared by all tracers of one provider.
#[derive(Debug)]
pub(crate) struct Pipeline {
    pub sampler: Arc<dyn ShouldSample>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub parent_strategy: ParentStrategy,
    pub span_id_strategy: SpanIdStrategy,
    pub processor: Arc<MultiSpanProcessor>,
}

#[derive(Clone)]
pub struct Tracer {
    name: String,
    version: Option<String>,
    pipeline: Arc<Pipeline>,
}

impl Tracer {
    pub(crate) fn new(name: String, version: Option<String>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            name,
            version,
            pipeline,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Starts a span parented by the currently attached context.
    pub fn start_span(&self, name: &str, options: SpanOptions) -> Span {
        self.start_span_with_context(name, options, &Context::current())
    }

    pub fn start_span_with_context(&self, name: &str, options: SpanOptions, cx: &Context) -> Span {
        let pipeline = &self.pipeline;

        let contextual_parent = if options.root {
            None
        } else {
            cx.active_span()
        };
        let parent = contextual_parent.or_else(|| pipeline.parent_strategy.fallback_parent());

        if cx.is_tracing_suppressed() {
            debug!("Tracing suppressed, {name} will not be recorded");
            return Span::non_recording(name, SpanContext::empty_context());
        }

        let span_id = pipeline
            .span_id_strategy
            .span_id(name, pipeline.id_generator.as_ref());

        let parent_span_context = parent
            .as_ref()
            .map(|p| p.span_context().clone())
            .filter(SpanContext::is_valid);
        let (trace_id, parent_span_id, sampler_cx) = match &parent_span_context {
            Some(parent) => (
                parent.trace_id(),
                Some(parent.span_id()),
                Context::new().with_remote_span_context(parent.clone()),
            ),
            None => (pipeline.id_generator.new_trace_id(), None, Context::new()),
        };

        let result = pipeline.sampler.should_sample(
            Some(&sampler_cx),
            trace_id,
            name,
            &options.kind,
            &options.attributes,
            &options.links,
        );

        let trace_state = match &parent_span_context {
            Some(parent) if result.trace_state.header().is_empty() => parent.trace_state().clone(),
            _ => result.trace_state,
        };
        let trace_flags = if result.decision == SamplingDecision::RecordAndSample {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        let span_context = SpanContext::new(trace_id, span_id, trace_flags, false, trace_state);

        if result.decision == SamplingDecision::Drop {
            debug!("Span {name} dropped by sampler");
            return Span::non_recording(name, span_context);
        }

        let attributes = sanitize_attributes(
            options
                .attributes
                .into_iter()
                .chain(result.attributes)
                .collect(),
        );

        let processor: Arc<dyn SpanProcessor> = pipeline.processor.clone();
        let span = Span::recording(RecordingSpan {
            name: name.to_string(),
            span_context,
            parent_span_id,
            kind: options.kind,
            attributes,
            links: options.links,
            start_time: options.start_time.unwrap_or_else(SystemTime::now),
            instrumentation_scope: self.name.clone(),
            processor,
        });
        pipeline.processor.on_start(&span, cx);
        span
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("parent_strategy", &self.pipeline.parent_strategy)
            .field("span_id_strategy", &self.pipeline.span_id_strategy)
            .finish()
    }
}
