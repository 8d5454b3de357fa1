// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transaction correlation and root-span lifecycle for page tracing.
//!
//! A page keeps one long-lived "transaction" span open for its whole lifetime. Every span created
//! without an explicit parent (network calls, user interactions) attaches to it, and its identity
//! can be seeded from a `traceparent` entry the server echoed back through `Server-Timing`.
//!
//! ```text
//! Server-Timing: traceparent;desc="00-<trace-id>-<span-id>-01"
//!   ↓ server_timing::capture_traceparent
//! TransactionState (trace id + span id)
//!   ↓ Tracer::start_span("documentLoad")      (CorrelatedIdGenerator + span id override)
//! transaction span  ←─ parent of every later span without contextual parent
//!   ↓ RootSpanGuard keeps it open
//! UnloadHandler::on_unload → end + force flush + bounded block
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod error;
pub mod ids;
pub mod trace;
pub mod transaction;

pub use error::ProcessorError;
pub use trace::{
    context::ContextExt,
    processor::{CustomAttributeProcessor, ErrorHandler, MultiSpanProcessor, SpanProcessor},
    provider::{TracerProvider, TracerProviderBuilder},
    span::{Span, SpanData},
    tracer::{ParentStrategy, SpanIdStrategy, SpanOptions, Tracer, DOCUMENT_LOAD_SPAN_NAME},
};
pub use transaction::{
    id_generator::CorrelatedIdGenerator,
    lifecycle::{RootSpanGuard, UnloadHandler, DEFAULT_EXPORTER_DELAY},
    server_timing::{capture_traceparent, extract, ServerTimingEntry},
    state::TransactionState,
};
