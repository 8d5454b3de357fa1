// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, SystemTime};

use futures::task::noop_waker_ref;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, error};

use crate::error::ProcessorError;

use crate::trace::processor::SpanProcessor;
use crate::trace::span::Span;
use crate::transaction::state::TransactionState;

/// Time the unload handler blocks after starting the final flush.
pub const DEFAULT_EXPORTER_DELAY: Duration = Duration::from_millis(20);

/// Keeps the transaction span open when an instrumentation tries to end it.
#[derive(Clone, Debug)]
pub struct RootSpanGuard {
    state: Arc<TransactionState>,
}

impl RootSpanGuard {
    pub fn new(state: Arc<TransactionState>) -> Self {
        Self { state }
    }

    /// Ends `span` unless it is the transaction span. Returns whether the span was ended.
    pub fn guarded_end(&self, span: &Span) -> bool {
        self.guarded_end_with_timestamp(span, SystemTime::now())
    }

    pub fn guarded_end_with_timestamp(&self, span: &Span, end_time: SystemTime) -> bool {
        if self.state.is_transaction_span(span) {
            debug!("Keeping transaction span {} open", span.name());
            return false;
        }
        span.end_with_timestamp(end_time);
        true
    }
}

/// Closes the transaction when the page goes away.
#[derive(Clone, Debug)]
pub struct UnloadHandler {
    state: Arc<TransactionState>,
    processor: Arc<dyn SpanProcessor>,
    exporter_delay: Duration,
}

impl UnloadHandler {
    pub fn new(state: Arc<TransactionState>, processor: Arc<dyn SpanProcessor>) -> Self {
        Self {
            state,
            processor,
            exporter_delay: DEFAULT_EXPORTER_DELAY,
        }
    }

    #[must_use]
    pub fn with_exporter_delay(mut self, exporter_delay: Duration) -> Self {
        self.exporter_delay = exporter_delay;
        self
    }

    pub fn exporter_delay(&self) -> Duration {
        self.exporter_delay
    }

    /// Ends the transaction span, starts one flush of every processor and blocks the calling thread
    /// for the exporter delay.
    ///
    /// The flush is polled once on this thread before the delay starts, so every processor has
    /// received its flush request by then. Inside a tokio runtime the rest of the flush runs as a
    /// task, otherwise it is driven to completion first. Flush failures are logged.
    pub fn on_unload(&self) {
        if let Some(span) = self.state.take_span() {
            debug!("Ending transaction span {} on unload", span.name());
            span.end();
        }

        let processor = self.processor.clone();
        let mut flush: Pin<Box<dyn Future<Output = Result<(), ProcessorError>> + Send>> =
            Box::pin(async move { processor.force_flush().await });

        match Handle::try_current() {
            Ok(handle) => {
                let mut cx = TaskContext::from_waker(noop_waker_ref());
                match flush.as_mut().poll(&mut cx) {
                    Poll::Ready(result) => log_flush_result(result),
                    Poll::Pending => {
                        handle.spawn(async move { log_flush_result(flush.await) });
                    }
                }
                if handle.runtime_flavor() == RuntimeFlavor::MultiThread {
                    tokio::task::block_in_place(|| std::thread::sleep(self.exporter_delay));
                    return;
                }
            }
            Err(_) => log_flush_result(futures::executor::block_on(flush)),
        }

        std::thread::sleep(self.exporter_delay);
    }
}

fn log_flush_result(result: Result<(), ProcessorError>) {
    if let Err(e) = result {
        error!("Failed to flush spans on unload: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NonZeroIdGenerator;
    use crate::trace::provider::TracerProvider;
    use crate::trace::span::SpanData;
    use crate::trace::tracer::{SpanOptions, DOCUMENT_LOAD_SPAN_NAME};
    use async_trait::async_trait;
    use opentelemetry::Context;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tracing_test::traced_test;

    #[derive(Debug, Default)]
    struct Counting {
        ended: AtomicUsize,
        flushed: AtomicUsize,
        fail_flush: bool,
    }

    #[async_trait]
    impl SpanProcessor for Counting {
        fn on_start(&self, _span: &Span, _parent_cx: &Context) {}

        fn on_end(&self, _span: &SpanData) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }

        async fn force_flush(&self) -> Result<(), ProcessorError> {
            self.flushed.fetch_add(1, Ordering::SeqCst);
            if self.fail_flush {
                return Err(ProcessorError::ChannelClosed("worker gone".to_string()));
            }
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn setup(counting: Arc<Counting>) -> (Arc<TransactionState>, TracerProvider) {
        let state = Arc::new(TransactionState::default());
        state.initialize(true, Arc::new(NonZeroIdGenerator));
        let provider = TracerProvider::builder()
            .with_span_processor(counting)
            .with_transactions(state.clone())
            .build();
        (state, provider)
    }

    #[test]
    fn test_guard_keeps_transaction_span_open() {
        let counting = Arc::new(Counting::default());
        let (state, provider) = setup(counting.clone());
        let tracer = provider.tracer("test", None);
        let guard = RootSpanGuard::new(state.clone());

        let document_load =
            tracer.start_span(DOCUMENT_LOAD_SPAN_NAME, SpanOptions::default().root());
        state.set_span(Some(document_load.clone()));
        let fetch = tracer.start_span("documentFetch", SpanOptions::default());

        assert!(!guard.guarded_end(&document_load));
        assert!(!document_load.is_ended());
        assert_eq!(counting.ended.load(Ordering::SeqCst), 0);

        assert!(guard.guarded_end(&fetch));
        assert!(fetch.is_ended());
        assert_eq!(counting.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_ends_everything_when_disabled() {
        let counting = Arc::new(Counting::default());
        let state = Arc::new(TransactionState::new(false));
        let tracer = TracerProvider::builder()
            .with_span_processor(counting.clone())
            .with_transactions(state.clone())
            .build()
            .tracer("test", None);
        let guard = RootSpanGuard::new(state.clone());

        let document_load = tracer.start_span(DOCUMENT_LOAD_SPAN_NAME, SpanOptions::default());
        state.set_span(Some(document_load.clone()));

        assert!(guard.guarded_end(&document_load));
        assert_eq!(counting.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unload_ends_flushes_and_blocks() {
        let counting = Arc::new(Counting::default());
        let (state, provider) = setup(counting.clone());
        let tracer = provider.tracer("test", None);
        let transaction = tracer.start_span(DOCUMENT_LOAD_SPAN_NAME, SpanOptions::default().root());
        state.set_span(Some(transaction.clone()));

        let handler = UnloadHandler::new(state.clone(), provider.processor());
        let started = Instant::now();
        handler.on_unload();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(transaction.is_ended());
        assert!(state.span().is_none());
        assert_eq!(counting.ended.load(Ordering::SeqCst), 1);
        assert_eq!(counting.flushed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unload_without_transaction_still_flushes() {
        let counting = Arc::new(Counting::default());
        let (state, provider) = setup(counting.clone());
        let handler = UnloadHandler::new(state, provider.processor())
            .with_exporter_delay(Duration::from_millis(5));

        let started = Instant::now();
        handler.on_unload();

        assert!(started.elapsed() >= Duration::from_millis(5));
        assert_eq!(counting.ended.load(Ordering::SeqCst), 0);
        assert_eq!(counting.flushed.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn test_unload_logs_flush_failure() {
        let counting = Arc::new(Counting {
            fail_flush: true,
            ..Default::default()
        });
        let state = Arc::new(TransactionState::new(true));
        let handler = UnloadHandler::new(state, counting.clone())
            .with_exporter_delay(Duration::from_millis(1));

        handler.on_unload();

        assert_eq!(counting.flushed.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Failed to flush spans on unload"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unload_inside_multi_thread_runtime_flushes() {
        let counting = Arc::new(Counting::default());
        let (state, provider) = setup(counting.clone());
        let handler = UnloadHandler::new(state, provider.processor());

        let started = Instant::now();
        handler.on_unload();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(counting.flushed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unload_inside_current_thread_runtime_flushes_before_returning() {
        let counting = Arc::new(Counting::default());
        let (state, provider) = setup(counting.clone());
        let handler = UnloadHandler::new(state, provider.processor())
            .with_exporter_delay(Duration::from_millis(5));

        handler.on_unload();

        assert_eq!(counting.flushed.load(Ordering::SeqCst), 1);
    }

    #[derive(Debug, Default)]
    struct Acknowledged {
        requested: AtomicUsize,
        acknowledged: AtomicUsize,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl SpanProcessor for Acknowledged {
        fn on_start(&self, _span: &Span, _parent_cx: &Context) {}

        fn on_end(&self, _span: &SpanData) {}

        async fn force_flush(&self) -> Result<(), ProcessorError> {
            self.requested.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.acknowledged.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pending_flush_completes_after_unload() {
        let processor = Arc::new(Acknowledged::default());
        let state = Arc::new(TransactionState::new(true));
        let handler = UnloadHandler::new(state, processor.clone())
            .with_exporter_delay(Duration::from_millis(1));

        handler.on_unload();
        assert_eq!(processor.requested.load(Ordering::SeqCst), 1);
        assert_eq!(processor.acknowledged.load(Ordering::SeqCst), 0);

        processor.release.notify_one();
        tokio::time::timeout(Duration::from_secs(1), async {
            while processor.acknowledged.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(processor.requested.load(Ordering::SeqCst), 1);
    }
}
