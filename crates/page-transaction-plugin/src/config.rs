// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Plugin configuration.
//!
//! The JSON shape mirrors the init object a page passes to the plugin, so keys are camelCase except
//! for the per-instrumentation tables, which are keyed by instrumentation name.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PluginError;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration of the tracing plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginConfig {
    /// Ratio of sampled traces. Below 0 samples nothing, above 1 samples everything
    pub sampling_rate: f64,
    /// Patterns of cross-origin URLs that receive trace headers
    pub cors_urls: Vec<String>,
    pub collector_configuration: Option<CollectorConfiguration>,
    /// Log finished spans instead of sending them to the collector
    pub console_only: bool,
    pub plugins: PluginToggles,
    pub plugins_config: PluginsConfig,
    pub global_instrumentation: GlobalInstrumentation,
    pub exporter: ExporterConfig,
    /// Attributes added to every span
    pub common_attributes: HashMap<String, String>,
    pub service_name: String,
    pub log_level: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 1.0,
            cors_urls: Vec::new(),
            collector_configuration: None,
            console_only: false,
            plugins: PluginToggles::default(),
            plugins_config: PluginsConfig::default(),
            global_instrumentation: GlobalInstrumentation::default(),
            exporter: ExporterConfig::default(),
            common_attributes: HashMap::new(),
            service_name: "unknown_service".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectorConfiguration {
    /// Overrides the URL derived from the beacon URL
    pub url: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_millis: u64,
}

impl Default for CollectorConfiguration {
    fn default() -> Self {
        Self {
            url: None,
            headers: HashMap::new(),
            timeout_millis: 10_000,
        }
    }
}

/// Which instrumentations are installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginToggles {
    pub instrument_fetch: bool,
    pub instrument_xhr: bool,
    pub instrument_document_load: bool,
    pub instrument_user_interaction: bool,
}

impl Default for PluginToggles {
    fn default() -> Self {
        Self {
            instrument_fetch: true,
            instrument_xhr: true,
            instrument_document_load: true,
            instrument_user_interaction: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub instrument_document_load: DocumentLoadConfig,
    pub instrument_fetch: NetworkConfig,
    pub instrument_xhr: NetworkConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentLoadConfig {
    /// Keep the `documentLoad` span open as the page's transaction span
    pub record_transaction: bool,
    /// Milliseconds the unload handler blocks after flushing
    pub exporter_delay: u64,
}

impl Default for DocumentLoadConfig {
    fn default() -> Self {
        Self {
            record_transaction: false,
            exporter_delay: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkConfig {
    /// URL parameters that are tagged on spans but not sent as beacon variables
    pub exclude_parameter_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalInstrumentation {
    pub request_parameter: RequestParameterConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestParameterConfig {
    pub enabled: bool,
    pub exclude_keys_from_beacons: Vec<String>,
}

/// Batch export settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExporterConfig {
    /// Spans beyond this many queued spans are dropped
    pub max_queue_size: usize,
    pub max_export_batch_size: usize,
    pub scheduled_delay_millis: u64,
    pub export_timeout_millis: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            max_export_batch_size: 10,
            scheduled_delay_millis: 500,
            export_timeout_millis: 30_000,
        }
    }
}

impl PluginConfig {
    /// Parses the page's init object. Missing keys take their default value.
    pub fn from_json(json: &str) -> Result<Self, PluginError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration overridden by `PAGE_TRACE_*` environment variables
    pub fn from_env() -> Result<Self, PluginError> {
        let mut config = Self::default();

        if let Some(sampling_rate) = env::var("PAGE_TRACE_SAMPLING_RATE")
            .ok()
            .and_then(|val| val.parse::<f64>().ok())
        {
            config.sampling_rate = sampling_rate;
        }
        if let Ok(val) = env::var("PAGE_TRACE_CONSOLE_ONLY") {
            config.console_only = val.to_lowercase() == "true";
        }
        if let Ok(service_name) = env::var("PAGE_TRACE_SERVICE_NAME") {
            config.service_name = service_name;
        }
        if let Ok(val) = env::var("PAGE_TRACE_RECORD_TRANSACTION") {
            config.plugins_config.instrument_document_load.record_transaction =
                val.to_lowercase() == "true";
        }
        if let Some(delay) = env::var("PAGE_TRACE_EXPORTER_DELAY_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
        {
            config.plugins_config.instrument_document_load.exporter_delay = delay;
        }
        if let Ok(url) = env::var("PAGE_TRACE_COLLECTOR_URL") {
            config
                .collector_configuration
                .get_or_insert_with(CollectorConfiguration::default)
                .url = Some(url);
        }
        if let Ok(log_level) = env::var("PAGE_TRACE_LOG_LEVEL") {
            config.log_level = log_level.to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.sampling_rate.is_nan() {
            return Err(PluginError::InvalidConfig(
                "samplingRate must be a number".to_string(),
            ));
        }

        if self.exporter.max_queue_size == 0 || self.exporter.max_export_batch_size == 0 {
            return Err(PluginError::InvalidConfig(
                "maxQueueSize and maxExportBatchSize must be greater than 0".to_string(),
            ));
        }

        if self.exporter.max_export_batch_size > self.exporter.max_queue_size {
            return Err(PluginError::InvalidConfig(format!(
                "maxExportBatchSize ({}) must not exceed maxQueueSize ({})",
                self.exporter.max_export_batch_size, self.exporter.max_queue_size
            )));
        }

        if self.service_name.trim().is_empty() {
            return Err(PluginError::InvalidConfig(
                "serviceName cannot be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(PluginError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        for pattern in &self.cors_urls {
            Regex::new(pattern).map_err(|e| {
                PluginError::InvalidConfig(format!("Invalid corsUrls pattern '{pattern}': {e}"))
            })?;
        }

        Ok(())
    }

    pub fn exporter_delay(&self) -> Duration {
        Duration::from_millis(self.plugins_config.instrument_document_load.exporter_delay)
    }

    pub fn record_transaction(&self) -> bool {
        self.plugins_config.instrument_document_load.record_transaction
    }
}
