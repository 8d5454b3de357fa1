// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod b3;
pub mod carrier;

pub use b3::{B3Propagator, B3_SINGLE_HEADER};
pub use carrier::{Extractor, Injector};
