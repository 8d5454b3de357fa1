// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Page tracing plugin.
//!
//! Wires the `page-transaction` core into a page: configuration, log output, span export to the
//! console or an OpenTelemetry collector, and the document load, network and user interaction
//! instrumentations.
//!
//! ```text
//! PluginConfig ─→ TracingPlugin::register
//!                   ├─ TracerProvider [CustomAttributeProcessor, Batch(Collector) | Simple(Console)]
//!                   ├─ TransactionState + UnloadHandler
//!                   └─ DocumentLoad / Fetch / Xhr / UserInteraction instrumentations
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod export;
pub mod instrumentation;
pub mod logger;
pub mod plugin;
pub mod propagation;

pub use config::PluginConfig;
pub use error::PluginError;
pub use plugin::TracingPlugin;
