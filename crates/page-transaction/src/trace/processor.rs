// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::future::join_all;
use opentelemetry::{Context, KeyValue};
use tracing::{debug, error};

use crate::error::ProcessorError;
use crate::trace::span::{Span, SpanData};

/// Consumer of span start and end events.
///
/// `on_start` and `on_end` run synchronously on the thread that starts or ends the span and must
/// not block.
#[async_trait]
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    fn on_start(&self, span: &Span, parent_cx: &Context);

    fn on_end(&self, span: &SpanData);

    async fn force_flush(&self) -> Result<(), ProcessorError>;

    async fn shutdown(&self) -> Result<(), ProcessorError>;
}

/// Sink for failures that must not propagate to the caller.
pub type ErrorHandler = Arc<dyn Fn(&ProcessorError) + Send + Sync>;

pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|e: &ProcessorError| error!("Span processor failed: {e}"))
}

/// Fans every event out to an ordered list of processors.
///
/// A failing flush is handed to the error handler and the aggregate flush still succeeds. A failing
/// shutdown is returned to the caller.
pub struct MultiSpanProcessor {
    processors: Vec<Arc<dyn SpanProcessor>>,
    error_handler: ErrorHandler,
}

impl MultiSpanProcessor {
    pub fn new(processors: Vec<Arc<dyn SpanProcessor>>) -> Self {
        Self {
            processors,
            error_handler: default_error_handler(),
        }
    }

    #[must_use]
    pub fn with_error_handler(mut self, error_handler: ErrorHandler) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn processors(&self) -> &[Arc<dyn SpanProcessor>] {
        &self.processors
    }
}

impl fmt::Debug for MultiSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiSpanProcessor")
            .field("processors", &self.processors)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SpanProcessor for MultiSpanProcessor {
    fn on_start(&self, span: &Span, parent_cx: &Context) {
        for processor in &self.processors {
            processor.on_start(span, parent_cx);
        }
    }

    fn on_end(&self, span: &SpanData) {
        for processor in &self.processors {
            processor.on_end(span);
        }
    }

    async fn force_flush(&self) -> Result<(), ProcessorError> {
        let results = join_all(self.processors.iter().map(|p| p.force_flush())).await;
        for e in results.into_iter().filter_map(Result::err) {
            (self.error_handler)(&e);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ProcessorError> {
        let results = join_all(self.processors.iter().map(|p| p.shutdown())).await;
        let mut errors: Vec<ProcessorError> =
            results.into_iter().filter_map(Result::err).collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ProcessorError::Multiple(errors)),
        }
    }
}

/// Injects a mutable set of attributes into every span at start.
///
/// Attributes added later only reach spans started afterwards.
#[derive(Debug, Default)]
pub struct CustomAttributeProcessor {
    attributes: RwLock<HashMap<String, String>>,
}

impl CustomAttributeProcessor {
    pub fn new(attributes: HashMap<String, String>) -> Self {
        Self {
            attributes: RwLock::new(attributes),
        }
    }

    pub fn add_custom_attribute(&self, key: &str, value: &str) {
        debug!("Adding custom span attribute {key}");
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    pub fn attributes(&self) -> HashMap<String, String> {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SpanProcessor for CustomAttributeProcessor {
    fn on_start(&self, span: &Span, _parent_cx: &Context) {
        let attributes = self.attributes();
        span.set_attributes(
            attributes
                .into_iter()
                .map(|(key, value)| KeyValue::new(key, value)),
        );
    }

    fn on_end(&self, _span: &SpanData) {}

    async fn force_flush(&self) -> Result<(), ProcessorError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ProcessorError> {
        Ok(())
    }
}
