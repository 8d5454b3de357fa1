// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors surfaced by span processors and exporters.
///
/// None of these ever cross the instrumentation boundary: flush failures are handed to the
/// fan-out's error handler, only shutdown failures reach the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessorError {
    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Export timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Processor channel closed: {0}")]
    ChannelClosed(String),

    #[error("Processor already shut down")]
    AlreadyShutdown,

    #[error("{} span processors failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<ProcessorError>),
}

fn join_errors(errors: &[ProcessorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>()
        .join("; ")
}
