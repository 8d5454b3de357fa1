// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span model and span creation.
//!
//! - `span` - shared span handles and the immutable record handed to processors on end
//! - `context` - active span and tracing suppression carried in an `opentelemetry::Context`
//! - `processor` - the span processor seam, the fan-out and the attribute injector
//! - `tracer` - the span-creation algorithm and its parent/span-id strategies
//! - `provider` - wiring of sampler, id generator, strategies and processors

pub mod context;
pub mod processor;
pub mod provider;
pub mod span;
pub mod tracer;
