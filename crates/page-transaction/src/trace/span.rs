// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use opentelemetry::trace::{Link, SpanContext, SpanId, SpanKind};
use opentelemetry::{KeyValue, Value};
use tracing::debug;

use crate::trace::processor::SpanProcessor;

/// Immutable record of a finished span, as delivered to `SpanProcessor::on_end`.
#[derive(Clone, Debug)]
pub struct SpanData {
    pub name: String,
    pub span_context: SpanContext,
    pub parent_span_id: Option<SpanId>,
    pub kind: SpanKind,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub attributes: Vec<KeyValue>,
    pub links: Vec<Link>,
    pub instrumentation_scope: String,
}

impl SpanData {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }
}

/// Handle to a span. Clones share the same underlying span.
///
/// Spans created without a processor are non-recording: attributes are ignored and ending them
/// reports nothing.
#[derive(Clone)]
pub struct Span {
    inner: Arc<SpanInner>,
}

struct SpanInner {
    span_context: SpanContext,
    parent_span_id: Option<SpanId>,
    kind: SpanKind,
    links: Vec<Link>,
    start_time: SystemTime,
    instrumentation_scope: String,
    processor: Option<Arc<dyn SpanProcessor>>,
    state: Mutex<SpanState>,
}

struct SpanState {
    name: String,
    attributes: Vec<KeyValue>,
    end_time: Option<SystemTime>,
}

pub(crate) struct RecordingSpan {
    pub name: String,
    pub span_context: SpanContext,
    pub parent_span_id: Option<SpanId>,
    pub kind: SpanKind,
    pub attributes: Vec<KeyValue>,
    pub links: Vec<Link>,
    pub start_time: SystemTime,
    pub instrumentation_scope: String,
    pub processor: Arc<dyn SpanProcessor>,
}

impl Span {
    pub(crate) fn recording(span: RecordingSpan) -> Self {
        Self {
            inner: Arc::new(SpanInner {
                span_context: span.span_context,
                parent_span_id: span.parent_span_id,
                kind: span.kind,
                links: span.links,
                start_time: span.start_time,
                instrumentation_scope: span.instrumentation_scope,
                processor: Some(span.processor),
                state: Mutex::new(SpanState {
                    name: span.name,
                    attributes: span.attributes,
                    end_time: None,
                }),
            }),
        }
    }

    /// A span that only propagates its context.
    pub fn non_recording(name: &str, span_context: SpanContext) -> Self {
        Self {
            inner: Arc::new(SpanInner {
                span_context,
                parent_span_id: None,
                kind: SpanKind::Internal,
                links: Vec::new(),
                start_time: SystemTime::now(),
                instrumentation_scope: String::new(),
                processor: None,
                state: Mutex::new(SpanState {
                    name: name.to_string(),
                    attributes: Vec::new(),
                    end_time: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SpanState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn span_context(&self) -> &SpanContext {
        &self.inner.span_context
    }

    pub fn name(&self) -> String {
        self.state().name.clone()
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.inner.parent_span_id
    }

    pub fn kind(&self) -> &SpanKind {
        &self.inner.kind
    }

    pub fn start_time(&self) -> SystemTime {
        self.inner.start_time
    }

    pub fn is_ended(&self) -> bool {
        self.state().end_time.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.processor.is_some() && !self.is_ended()
    }

    /// Whether both handles point to the same span.
    pub fn ptr_eq(&self, other: &Span) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        if self.inner.processor.is_none() {
            return;
        }
        let mut state = self.state();
        if state.end_time.is_some() {
            debug!(
                "Ignoring attribute {} on ended span {}",
                attribute.key.as_str(),
                state.name
            );
            return;
        }
        if attribute.key.as_str().is_empty() {
            return;
        }
        upsert(&mut state.attributes, attribute);
    }

    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.state()
            .attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    pub fn end(&self) {
        self.end_with_timestamp(SystemTime::now());
    }

    /// Ends the span. Only the first call has an effect.
    pub fn end_with_timestamp(&self, end_time: SystemTime) {
        let Some(processor) = self.inner.processor.as_ref() else {
            return;
        };

        let data = {
            let mut state = self.state();
            if state.end_time.is_some() {
                debug!("Span {} already ended", state.name);
                return;
            }
            let end_time = end_time.max(self.inner.start_time);
            state.end_time = Some(end_time);
            SpanData {
                name: state.name.clone(),
                span_context: self.inner.span_context.clone(),
                parent_span_id: self.inner.parent_span_id,
                kind: self.inner.kind.clone(),
                start_time: self.inner.start_time,
                end_time,
                attributes: state.attributes.clone(),
                links: self.inner.links.clone(),
                instrumentation_scope: self.inner.instrumentation_scope.clone(),
            }
        };

        processor.on_end(&data);
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("name", &self.name())
            .field("trace_id", &self.inner.span_context.trace_id())
            .field("span_id", &self.inner.span_context.span_id())
            .field("parent_span_id", &self.inner.parent_span_id)
            .field("recording", &self.is_recording())
            .finish()
    }
}

/// Drops attributes with an empty key and keeps the last value of duplicated keys.
pub fn sanitize_attributes(attributes: Vec<KeyValue>) -> Vec<KeyValue> {
    let mut sanitized: Vec<KeyValue> = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        if attribute.key.as_str().is_empty() {
            debug!("Dropping attribute with empty key");
            continue;
        }
        upsert(&mut sanitized, attribute);
    }
    sanitized
}

fn upsert(attributes: &mut Vec<KeyValue>, attribute: KeyValue) {
    match attributes.iter_mut().find(|kv| kv.key == attribute.key) {
        Some(existing) => existing.value = attribute.value,
        None => attributes.push(attribute),
    }
}
