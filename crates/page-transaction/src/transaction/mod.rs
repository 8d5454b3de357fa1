// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The page transaction: shared state, trace id reuse, server correlation and the lifecycle of the
//! transaction span.

pub mod id_generator;
pub mod lifecycle;
pub mod server_timing;
pub mod state;
