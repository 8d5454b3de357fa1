// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of finished spans.
//!
//! Exporters ship batches of `SpanData`. The simple and batch processors plug exporters into the
//! span pipeline.

use std::fmt;

use async_trait::async_trait;
use page_transaction::{ProcessorError, SpanData};

pub mod batch;
pub mod collector;
pub mod console;
pub mod simple;

pub use batch::{BatchConfig, BatchSpanProcessor, BatchWorker};
pub use collector::{CollectorExporter, CollectorExporterConfig};
pub use console::ConsoleExporter;
pub use simple::SimpleSpanProcessor;

#[async_trait]
pub trait SpanExporter: Send + Sync + fmt::Debug {
    async fn export(&self, batch: Vec<SpanData>) -> Result<(), ProcessorError>;

    async fn shutdown(&self) -> Result<(), ProcessorError> {
        Ok(())
    }
}
