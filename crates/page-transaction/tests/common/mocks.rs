// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock span processors for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use opentelemetry::Context;
use page_transaction::{ProcessorError, Span, SpanData, SpanProcessor};

/// Records every started span name and every ended span, counts flushes
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    started: Mutex<Vec<String>>,
    ended: Mutex<Vec<SpanData>>,
    flushes: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingProcessor {
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn ended(&self) -> Vec<SpanData> {
        self.ended.lock().unwrap().clone()
    }

    pub fn ended_named(&self, name: &str) -> usize {
        self.ended
            .lock()
            .unwrap()
            .iter()
            .filter(|span| span.name == name)
            .count()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpanProcessor for RecordingProcessor {
    fn on_start(&self, span: &Span, _parent_cx: &Context) {
        self.started.lock().unwrap().push(span.name());
    }

    fn on_end(&self, span: &SpanData) {
        self.ended.lock().unwrap().push(span.clone());
    }

    async fn force_flush(&self) -> Result<(), ProcessorError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ProcessorError> {
        Ok(())
    }
}

/// Processor whose flush always fails
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct FailingProcessor {
    flushes: AtomicUsize,
}

#[allow(dead_code)]
impl FailingProcessor {
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpanProcessor for FailingProcessor {
    fn on_start(&self, _span: &Span, _parent_cx: &Context) {}

    fn on_end(&self, _span: &SpanData) {}

    async fn force_flush(&self) -> Result<(), ProcessorError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Err(ProcessorError::ExportFailed("collector unreachable".to_string()))
    }

    async fn shutdown(&self) -> Result<(), ProcessorError> {
        Err(ProcessorError::ExportFailed("collector unreachable".to_string()))
    }
}
