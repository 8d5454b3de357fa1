// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::Context;
use page_transaction::{ProcessorError, Span, SpanData, SpanProcessor};
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::export::SpanExporter;

/// Exports every sampled span as soon as it ends.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Arc<dyn SpanExporter>,
    is_shutdown: AtomicBool,
}

impl SimpleSpanProcessor {
    pub fn new(exporter: Arc<dyn SpanExporter>) -> Self {
        Self {
            exporter,
            is_shutdown: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SpanProcessor for SimpleSpanProcessor {
    fn on_start(&self, _span: &Span, _parent_cx: &Context) {}

    fn on_end(&self, span: &SpanData) {
        if self.is_shutdown.load(Ordering::SeqCst) {
            debug!("Dropping span {}: processor shut down", span.name);
            return;
        }
        if !span.span_context.is_sampled() {
            return;
        }

        let exporter = self.exporter.clone();
        let batch = vec![span.clone()];
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = exporter.export(batch).await {
                        error!("Failed to export span: {e}");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = futures::executor::block_on(exporter.export(batch)) {
                    error!("Failed to export span: {e}");
                }
            }
        }
    }

    async fn force_flush(&self) -> Result<(), ProcessorError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ProcessorError> {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Err(ProcessorError::AlreadyShutdown);
        }
        self.exporter.shutdown().await
    }
}
