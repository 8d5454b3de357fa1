// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OTLP/JSON export to an OpenTelemetry collector.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use opentelemetry::trace::SpanKind;
use opentelemetry::{KeyValue, Value};
use page_transaction::{ProcessorError, SpanData};
use serde::Serialize;
use tracing::debug;

use crate::error::PluginError;
use crate::export::SpanExporter;

#[derive(Debug, Clone)]
pub struct CollectorExporterConfig {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct CollectorExporter {
    client: reqwest::Client,
    config: CollectorExporterConfig,
}

impl CollectorExporter {
    pub fn new(config: CollectorExporterConfig) -> Result<Self, PluginError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PluginError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl SpanExporter for CollectorExporter {
    async fn export(&self, batch: Vec<SpanData>) -> Result<(), ProcessorError> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let payload = ExportTraceRequest::new(&self.config.service_name, &batch);

        let mut request = self.client.post(&self.config.url).json(&payload);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProcessorError::ExportFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::ExportFailed(format!(
                "collector returned {status}: {body}"
            )));
        }

        debug!("Exported {count} spans to {}", self.config.url);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportTraceRequest {
    resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpans {
    resource: Resource,
    scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Serialize)]
struct Resource {
    attributes: Vec<Attribute>,
}

#[derive(Debug, Serialize)]
struct ScopeSpans {
    scope: Scope,
    spans: Vec<OtlpSpan>,
}

#[derive(Debug, Serialize)]
struct Scope {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OtlpSpan {
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    name: String,
    kind: u8,
    start_time_unix_nano: String,
    end_time_unix_nano: String,
    attributes: Vec<Attribute>,
}

#[derive(Debug, Serialize)]
struct Attribute {
    key: String,
    value: AnyValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum AnyValue {
    StringValue(String),
    BoolValue(bool),
    // OTLP/JSON encodes 64-bit integers as strings
    IntValue(String),
    DoubleValue(f64),
}

impl ExportTraceRequest {
    pub(crate) fn new(service_name: &str, batch: &[SpanData]) -> Self {
        let mut by_scope: BTreeMap<&str, Vec<OtlpSpan>> = BTreeMap::new();
        for span in batch {
            by_scope
                .entry(span.instrumentation_scope.as_str())
                .or_default()
                .push(OtlpSpan::from(span));
        }

        Self {
            resource_spans: vec![ResourceSpans {
                resource: Resource {
                    attributes: vec![Attribute::from(&KeyValue::new(
                        "service.name",
                        service_name.to_string(),
                    ))],
                },
                scope_spans: by_scope
                    .into_iter()
                    .map(|(name, spans)| ScopeSpans {
                        scope: Scope {
                            name: name.to_string(),
                        },
                        spans,
                    })
                    .collect(),
            }],
        }
    }
}

impl From<&SpanData> for OtlpSpan {
    fn from(span: &SpanData) -> Self {
        Self {
            trace_id: span.span_context.trace_id().to_string(),
            span_id: span.span_context.span_id().to_string(),
            parent_span_id: span.parent_span_id.map(|id| id.to_string()),
            name: span.name.clone(),
            kind: kind_code(&span.kind),
            start_time_unix_nano: unix_nanos(span.start_time),
            end_time_unix_nano: unix_nanos(span.end_time),
            attributes: span.attributes.iter().map(Attribute::from).collect(),
        }
    }
}

impl From<&KeyValue> for Attribute {
    fn from(kv: &KeyValue) -> Self {
        let value = match &kv.value {
            Value::Bool(b) => AnyValue::BoolValue(*b),
            Value::I64(i) => AnyValue::IntValue(i.to_string()),
            Value::F64(f) => AnyValue::DoubleValue(*f),
            other => AnyValue::StringValue(other.as_str().into_owned()),
        };
        Self {
            key: kv.key.as_str().to_string(),
            value,
        }
    }
}

fn kind_code(kind: &SpanKind) -> u8 {
    match kind {
        SpanKind::Internal => 1,
        SpanKind::Server => 2,
        SpanKind::Client => 3,
        SpanKind::Producer => 4,
        SpanKind::Consumer => 5,
    }
}

fn unix_nanos(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
        .to_string()
}
