// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use page_transaction::{ProcessorError, SpanData};
use tracing::info;

use crate::export::SpanExporter;

/// Logs finished spans instead of sending them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleExporter;

impl ConsoleExporter {
    pub fn describe(span: &SpanData) -> String {
        let duration_ms = span
            .end_time
            .duration_since(span.start_time)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or_default();
        let parent = span
            .parent_span_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let attributes = span
            .attributes
            .iter()
            .map(|kv| format!("{}={}", kv.key.as_str(), kv.value.as_str()))
            .collect::<Vec<String>>()
            .join(",");
        format!(
            "{} trace_id={} span_id={} parent_id={} kind={:?} duration_ms={:.3} attributes=[{}]",
            span.name,
            span.span_context.trace_id(),
            span.span_context.span_id(),
            parent,
            span.kind,
            duration_ms,
            attributes
        )
    }
}

#[async_trait]
impl SpanExporter for ConsoleExporter {
    async fn export(&self, batch: Vec<SpanData>) -> Result<(), ProcessorError> {
        for span in &batch {
            info!("{}", Self::describe(span));
        }
        Ok(())
    }
}
