// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use opentelemetry_sdk::trace::{IdGenerator, Sampler, ShouldSample};

use crate::error::ProcessorError;
use crate::ids::NonZeroIdGenerator;
use crate::trace::processor::{ErrorHandler, MultiSpanProcessor, SpanProcessor};
use crate::trace::tracer::{ParentStrategy, Pipeline, SpanIdStrategy, Tracer};
use crate::transaction::id_generator::CorrelatedIdGenerator;
use crate::transaction::state::TransactionState;

/// Owns the span pipeline shared by every tracer it hands out.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    pipeline: Arc<Pipeline>,
}

impl TracerProvider {
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    pub fn tracer(&self, name: &str, version: Option<&str>) -> Tracer {
        Tracer::new(
            name.to_string(),
            version.map(str::to_string),
            self.pipeline.clone(),
        )
    }

    /// The fan-out every span of this provider reports to.
    pub fn processor(&self) -> Arc<MultiSpanProcessor> {
        self.pipeline.processor.clone()
    }

    pub async fn force_flush(&self) -> Result<(), ProcessorError> {
        self.pipeline.processor.force_flush().await
    }

    pub async fn shutdown(&self) -> Result<(), ProcessorError> {
        self.pipeline.processor.shutdown().await
    }
}

pub struct TracerProviderBuilder {
    sampler: Arc<dyn ShouldSample>,
    id_generator: Arc<dyn IdGenerator>,
    processors: Vec<Arc<dyn SpanProcessor>>,
    error_handler: Option<ErrorHandler>,
    parent_strategy: ParentStrategy,
    span_id_strategy: SpanIdStrategy,
}

impl Default for TracerProviderBuilder {
    fn default() -> Self {
        Self {
            sampler: Arc::new(Sampler::AlwaysOn),
            id_generator: Arc::new(NonZeroIdGenerator),
            processors: Vec::new(),
            error_handler: None,
            parent_strategy: ParentStrategy::default(),
            span_id_strategy: SpanIdStrategy::default(),
        }
    }
}

impl TracerProviderBuilder {
    #[must_use]
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Arc::new(sampler);
        self
    }

    #[must_use]
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Arc::new(id_generator);
        self
    }

    /// Appends a processor. Processors are invoked in insertion order.
    #[must_use]
    pub fn with_span_processor(mut self, processor: Arc<dyn SpanProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    #[must_use]
    pub fn with_error_handler(mut self, error_handler: ErrorHandler) -> Self {
        self.error_handler = Some(error_handler);
        self
    }

    #[must_use]
    pub fn with_parent_strategy(mut self, parent_strategy: ParentStrategy) -> Self {
        self.parent_strategy = parent_strategy;
        self
    }

    #[must_use]
    pub fn with_span_id_strategy(mut self, span_id_strategy: SpanIdStrategy) -> Self {
        self.span_id_strategy = span_id_strategy;
        self
    }

    /// Makes every tracer transaction-aware: the transaction span is the fallback parent, the
    /// stored trace id is reused and `documentLoad` takes the captured span id.
    #[must_use]
    pub fn with_transactions(mut self, state: Arc<TransactionState>) -> Self {
        self.id_generator = Arc::new(CorrelatedIdGenerator::new(state.clone()));
        self.parent_strategy = ParentStrategy::TransactionFallback(state.clone());
        self.span_id_strategy = SpanIdStrategy::DocumentLoadOverride(state);
        self
    }

    pub fn build(self) -> TracerProvider {
        let mut processor = MultiSpanProcessor::new(self.processors);
        if let Some(error_handler) = self.error_handler {
            processor = processor.with_error_handler(error_handler);
        }
        TracerProvider {
            pipeline: Arc::new(Pipeline {
                sampler: self.sampler,
                id_generator: self.id_generator,
                parent_strategy: self.parent_strategy,
                span_id_strategy: self.span_id_strategy,
                processor: Arc::new(processor),
            }),
        }
    }
}
