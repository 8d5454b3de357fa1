// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use page_transaction::ProcessorError;

/// Errors that can occur when configuring or running the tracing plugin
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}
