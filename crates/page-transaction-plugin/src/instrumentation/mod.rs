// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Instrumentations that turn page activity into spans.

pub mod beacon;
pub mod document_load;
pub mod network;
pub mod performance;
pub mod url_params;
pub mod user_interaction;

pub use beacon::{BeaconVars, InMemoryBeacon};
pub use document_load::DocumentLoadInstrumentation;
pub use network::{NetworkApi, NetworkInstrumentation};
pub use performance::{PageLoad, PerformanceEntries, ResourceEntry};
pub use url_params::add_url_params;
pub use user_interaction::UserInteractionInstrumentation;
