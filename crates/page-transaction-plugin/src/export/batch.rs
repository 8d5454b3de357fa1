// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batched span export.
//!
//! `BatchSpanProcessor` is a handle that forwards finished spans to a `BatchWorker` over an
//! unbounded channel. The worker owns the buffer and the exporter, and exports when a batch is full,
//! on every scheduled tick, on flush and on shutdown.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::Context;
use page_transaction::{ProcessorError, Span, SpanData, SpanProcessor};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::config::ExporterConfig;
use crate::export::SpanExporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Spans beyond this many waiting spans are dropped
    pub max_queue_size: usize,
    pub max_export_batch_size: usize,
    pub scheduled_delay: Duration,
    pub export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from(&ExporterConfig::default())
    }
}

impl From<&ExporterConfig> for BatchConfig {
    fn from(config: &ExporterConfig) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            max_export_batch_size: config.max_export_batch_size,
            scheduled_delay: Duration::from_millis(config.scheduled_delay_millis),
            export_timeout: Duration::from_millis(config.export_timeout_millis),
        }
    }
}

#[derive(Debug)]
pub enum BatchCommand {
    Export(SpanData),
    Flush(oneshot::Sender<Result<(), ProcessorError>>),
    Shutdown(oneshot::Sender<Result<(), ProcessorError>>),
}

#[derive(Debug)]
pub struct BatchSpanProcessor {
    tx: mpsc::UnboundedSender<BatchCommand>,
    queued: Arc<AtomicUsize>,
    max_queue_size: usize,
    is_shutdown: AtomicBool,
}

impl BatchSpanProcessor {
    /// Creates the processor and the worker that must be spawned for spans to be exported.
    pub fn new(exporter: Arc<dyn SpanExporter>, config: BatchConfig) -> (Self, BatchWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));

        let processor = Self {
            tx,
            queued: queued.clone(),
            max_queue_size: config.max_queue_size,
            is_shutdown: AtomicBool::new(false),
        };
        let worker = BatchWorker {
            exporter,
            config,
            rx,
            buffer: VecDeque::new(),
            queued,
            pending_shutdown: None,
        };
        (processor, worker)
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), ProcessorError>>) -> BatchCommand,
    ) -> Result<(), ProcessorError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx.send(command(response_tx)).map_err(|e| {
            ProcessorError::ChannelClosed(format!("Failed to send command: {e}"))
        })?;
        response_rx.await.map_err(|e| {
            ProcessorError::ChannelClosed(format!("Failed to receive response: {e}"))
        })?
    }
}

#[async_trait]
impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &Span, _parent_cx: &Context) {}

    fn on_end(&self, span: &SpanData) {
        if self.is_shutdown.load(Ordering::SeqCst) || !span.span_context.is_sampled() {
            return;
        }
        if self.queued.fetch_add(1, Ordering::SeqCst) >= self.max_queue_size {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            warn!("Span queue full, dropping span {}", span.name);
            return;
        }
        if self.tx.send(BatchCommand::Export(span.clone())).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            debug!("Batch worker stopped, dropping span {}", span.name);
        }
    }

    async fn force_flush(&self) -> Result<(), ProcessorError> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(ProcessorError::AlreadyShutdown);
        }
        self.request(BatchCommand::Flush).await
    }

    async fn shutdown(&self) -> Result<(), ProcessorError> {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Err(ProcessorError::AlreadyShutdown);
        }
        self.request(BatchCommand::Shutdown).await
    }
}

pub struct BatchWorker {
    exporter: Arc<dyn SpanExporter>,
    config: BatchConfig,
    rx: mpsc::UnboundedReceiver<BatchCommand>,
    buffer: VecDeque<SpanData>,
    queued: Arc<AtomicUsize>,
    // shutdown received while draining for a flush
    pending_shutdown: Option<oneshot::Sender<Result<(), ProcessorError>>>,
}

impl BatchWorker {
    pub async fn run(mut self) {
        debug!("Batch span worker started");

        let mut ticker = tokio::time::interval(self.config.scheduled_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(BatchCommand::Export(span)) => {
                        self.buffer.push_back(span);
                        if self.buffer.len() >= self.config.max_export_batch_size {
                            if let Err(e) = self.export_batch().await {
                                error!("{e}");
                            }
                        }
                    }
                    Some(BatchCommand::Flush(response_tx)) => {
                        let result = self.drain().await;
                        if response_tx.send(result.clone()).is_err() {
                            error!("Failed to send flush response - receiver dropped");
                        }
                        if let Some(response_tx) = self.pending_shutdown.take() {
                            self.shutdown(response_tx, result).await;
                            break;
                        }
                    }
                    Some(BatchCommand::Shutdown(response_tx)) => {
                        let result = self.drain().await;
                        self.shutdown(response_tx, result).await;
                        break;
                    }
                    None => {
                        if let Err(e) = self.drain().await {
                            error!("{e}");
                        }
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        if let Err(e) = self.export_batch().await {
                            error!("{e}");
                        }
                    }
                }
            }
        }

        debug!("Batch span worker stopped");
    }

    /// Shuts the exporter down and answers every shutdown request with the combined result.
    async fn shutdown(
        &mut self,
        response_tx: oneshot::Sender<Result<(), ProcessorError>>,
        drained: Result<(), ProcessorError>,
    ) {
        debug!("Batch span worker shutting down");
        let result = drained.and(self.exporter.shutdown().await);
        for response_tx in std::iter::once(response_tx).chain(self.pending_shutdown.take()) {
            if response_tx.send(result.clone()).is_err() {
                error!("Failed to send shutdown response - receiver dropped");
            }
        }
    }

    /// Exports at most one batch from the front of the buffer.
    async fn export_batch(&mut self) -> Result<(), ProcessorError> {
        let count = self.buffer.len().min(self.config.max_export_batch_size);
        let batch: Vec<SpanData> = self.buffer.drain(..count).collect();
        self.queued.fetch_sub(count, Ordering::SeqCst);

        match tokio::time::timeout(self.config.export_timeout, self.exporter.export(batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProcessorError::Timeout(self.config.export_timeout)),
        }
    }

    /// Receives every span already sent and exports the whole buffer.
    ///
    /// A shutdown found on the way is kept in `pending_shutdown` for the caller to complete.
    async fn drain(&mut self) -> Result<(), ProcessorError> {
        // flushes queued behind the current one share its result
        let mut waiting = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            match command {
                BatchCommand::Export(span) => self.buffer.push_back(span),
                BatchCommand::Flush(response_tx) => waiting.push(response_tx),
                BatchCommand::Shutdown(response_tx) => {
                    self.pending_shutdown = Some(response_tx);
                    break;
                }
            }
        }

        let mut first_error = None;
        while !self.buffer.is_empty() {
            if let Err(e) = self.export_batch().await {
                error!("{e}");
                first_error.get_or_insert(e);
            }
        }

        let result = first_error.map_or(Ok(()), Err);
        for response_tx in waiting {
            let _ = response_tx.send(result.clone());
        }
        result
    }
}
