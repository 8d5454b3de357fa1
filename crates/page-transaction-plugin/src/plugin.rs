// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Entry point a page talks to.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::Context;
use opentelemetry_sdk::trace::Sampler;
use page_transaction::ids::NonZeroIdGenerator;
use page_transaction::{
    ContextExt, CustomAttributeProcessor, Span, SpanProcessor, Tracer, TracerProvider,
    TransactionState, UnloadHandler,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::{CollectorConfiguration, PluginConfig};
use crate::error::PluginError;
use crate::export::{
    BatchConfig, BatchSpanProcessor, CollectorExporter, CollectorExporterConfig, ConsoleExporter,
    SimpleSpanProcessor,
};
use crate::instrumentation::{
    document_load, user_interaction, BeaconVars, DocumentLoadInstrumentation, InMemoryBeacon,
    NetworkApi, NetworkInstrumentation, UserInteractionInstrumentation,
};

/// Collector endpoint used when neither the configuration nor the beacon URL name one.
pub const DEFAULT_COLLECTOR_URL: &str = "http://localhost:55681/v1/trace";

const TRANSACTION_TRACER_NAME: &str = "page-transaction";

#[derive(Debug)]
pub struct TracingPlugin {
    config: PluginConfig,
    beacon_url: Option<String>,
    page_url: Option<String>,
    beacon: Arc<dyn BeaconVars>,
    state: Arc<TransactionState>,
    registered: Option<Registered>,
}

#[derive(Debug)]
struct Registered {
    provider: TracerProvider,
    custom_attributes: Arc<CustomAttributeProcessor>,
    unload: UnloadHandler,
    transaction_tracer: Tracer,
    document_load: Option<DocumentLoadInstrumentation>,
    fetch: Option<NetworkInstrumentation>,
    xhr: Option<NetworkInstrumentation>,
    user_interaction: Option<UserInteractionInstrumentation>,
    batch_worker: Option<JoinHandle<()>>,
}

impl TracingPlugin {
    pub fn new(config: PluginConfig) -> Self {
        Self::with_beacon(config, Arc::new(InMemoryBeacon::new()))
    }

    pub fn with_beacon(config: PluginConfig, beacon: Arc<dyn BeaconVars>) -> Self {
        Self {
            config,
            beacon_url: None,
            page_url: None,
            beacon,
            state: Arc::new(TransactionState::default()),
            registered: None,
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// URL the page's monitoring beacon is sent to. The collector URL is derived from it.
    pub fn set_beacon_url(&mut self, url: &str) {
        self.beacon_url = Some(url.to_string());
    }

    /// Current `location.href`. Used for URL parameters and same-origin checks.
    pub fn set_page_url(&mut self, url: &str) -> Result<(), PluginError> {
        if let Some(registered) = self.registered.as_mut() {
            for network in [registered.fetch.as_mut(), registered.xhr.as_mut()]
                .into_iter()
                .flatten()
            {
                network.set_page_url(url)?;
            }
            if let Some(user_interaction) = registered.user_interaction.as_mut() {
                user_interaction.set_page_url(url);
            }
        }
        self.page_url = Some(url.to_string());
        Ok(())
    }

    /// Builds the tracing pipeline. Calling it again has no effect.
    ///
    /// Collector export runs on a background task, so it needs a tokio runtime.
    pub fn register(&mut self) -> Result<(), PluginError> {
        if self.registered.is_some() {
            debug!("Tracing plugin already registered");
            return Ok(());
        }
        self.config.validate()?;

        self.state.initialize(
            self.config.record_transaction(),
            Arc::new(NonZeroIdGenerator),
        );

        let custom_attributes = Arc::new(CustomAttributeProcessor::new(
            self.config.common_attributes.clone(),
        ));
        let (export_processor, batch_worker) = self.export_processor()?;

        let provider = TracerProvider::builder()
            .with_sampler(resolve_sampler(self.config.sampling_rate))
            .with_transactions(self.state.clone())
            .with_span_processor(custom_attributes.clone())
            .with_span_processor(export_processor)
            .build();

        let unload = UnloadHandler::new(self.state.clone(), provider.processor())
            .with_exporter_delay(self.config.exporter_delay());

        let mut registered = Registered {
            transaction_tracer: provider.tracer(TRANSACTION_TRACER_NAME, None),
            document_load: None,
            fetch: None,
            xhr: None,
            user_interaction: None,
            provider,
            custom_attributes,
            unload,
            batch_worker,
        };
        self.build_instrumentations(&mut registered)?;

        debug!(
            "Tracing plugin registered for {} (transactions: {})",
            self.config.service_name,
            self.config.record_transaction()
        );
        self.registered = Some(registered);
        Ok(())
    }

    fn export_processor(
        &self,
    ) -> Result<(Arc<dyn SpanProcessor>, Option<JoinHandle<()>>), PluginError> {
        if self.config.console_only {
            return Ok((
                Arc::new(SimpleSpanProcessor::new(Arc::new(ConsoleExporter))),
                None,
            ));
        }

        let handle = Handle::try_current().map_err(|e| {
            PluginError::Runtime(format!("Collector export needs a tokio runtime: {e}"))
        })?;

        let collector = self
            .config
            .collector_configuration
            .clone()
            .unwrap_or_default();
        let exporter = CollectorExporter::new(CollectorExporterConfig {
            url: self.collector_url(&collector),
            headers: collector.headers,
            timeout: Duration::from_millis(collector.timeout_millis),
            service_name: self.config.service_name.clone(),
        })?;
        debug!("Exporting spans to {}", exporter.url());

        let (processor, worker) =
            BatchSpanProcessor::new(Arc::new(exporter), BatchConfig::from(&self.config.exporter));
        let worker = handle.spawn(worker.run());
        Ok((Arc::new(processor), Some(worker)))
    }

    fn collector_url(&self, collector: &CollectorConfiguration) -> String {
        if let Some(url) = &collector.url {
            return url.clone();
        }
        self.beacon_url
            .as_deref()
            .and_then(collector_url_from_beacon_url)
            .unwrap_or_else(|| DEFAULT_COLLECTOR_URL.to_string())
    }

    fn build_instrumentations(&self, registered: &mut Registered) -> Result<(), PluginError> {
        let plugins = self.config.plugins;
        let request_parameter = &self.config.global_instrumentation.request_parameter;

        if plugins.instrument_document_load {
            registered.document_load = Some(DocumentLoadInstrumentation::new(
                registered.provider.tracer(document_load::INSTRUMENTATION_NAME, None),
                self.state.clone(),
                &self.config.plugins_config.instrument_document_load,
                request_parameter.clone(),
                self.beacon.clone(),
            ));
        }

        for (enabled, api) in [
            (plugins.instrument_fetch, NetworkApi::Fetch),
            (plugins.instrument_xhr, NetworkApi::Xhr),
        ] {
            if !enabled {
                continue;
            }
            let network_config = match api {
                NetworkApi::Fetch => &self.config.plugins_config.instrument_fetch,
                NetworkApi::Xhr => &self.config.plugins_config.instrument_xhr,
            };
            let mut network = NetworkInstrumentation::new(
                api,
                registered.provider.tracer(api.instrumentation_name(), None),
                network_config,
                &self.config.cors_urls,
                self.beacon.clone(),
            )?;
            if let Some(page_url) = &self.page_url {
                network.set_page_url(page_url)?;
            }
            match api {
                NetworkApi::Fetch => registered.fetch = Some(network),
                NetworkApi::Xhr => registered.xhr = Some(network),
            }
        }

        if plugins.instrument_user_interaction {
            let mut user_interaction = UserInteractionInstrumentation::new(
                registered
                    .provider
                    .tracer(user_interaction::INSTRUMENTATION_NAME, None),
                request_parameter.clone(),
                self.beacon.clone(),
            );
            if let Some(page_url) = &self.page_url {
                user_interaction.set_page_url(page_url);
            }
            registered.user_interaction = Some(user_interaction);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.registered.is_some()
    }

    pub fn tracer(&self, name: &str, version: Option<&str>) -> Option<Tracer> {
        self.registered
            .as_ref()
            .map(|registered| registered.provider.tracer(name, version))
    }

    /// Runs `f` with `span` as the active span.
    pub fn with_span<T>(&self, span: &Span, f: impl FnOnce() -> T) -> T {
        let _guard = Context::current().with_active_span(span.clone()).attach();
        f()
    }

    /// Ends the current transaction and starts a new one named `name`.
    pub fn start_new_transaction(&self, name: &str) -> Option<Span> {
        let Some(registered) = self.registered.as_ref() else {
            warn!("No transaction started: tracing plugin is not registered");
            return None;
        };
        self.state
            .start_new_transaction(name, &registered.transaction_tracer)
    }

    /// Adds an attribute to every span started from now on.
    pub fn add_var_to_spans(&self, key: &str, value: &str) {
        match self.registered.as_ref() {
            Some(registered) => registered.custom_attributes.add_custom_attribute(key, value),
            None => warn!("Ignoring span variable {key}: tracing plugin is not registered"),
        }
    }

    pub fn transaction_span(&self) -> Option<Span> {
        self.state.span()
    }

    pub fn transaction_state(&self) -> Arc<TransactionState> {
        self.state.clone()
    }

    pub fn document_load(&self) -> Option<&DocumentLoadInstrumentation> {
        self.registered.as_ref()?.document_load.as_ref()
    }

    pub fn fetch(&self) -> Option<&NetworkInstrumentation> {
        self.registered.as_ref()?.fetch.as_ref()
    }

    pub fn xhr(&self) -> Option<&NetworkInstrumentation> {
        self.registered.as_ref()?.xhr.as_ref()
    }

    pub fn user_interaction(&self) -> Option<&UserInteractionInstrumentation> {
        self.registered.as_ref()?.user_interaction.as_ref()
    }

    /// Page `beforeunload`: ends the transaction, flushes and blocks for the exporter delay.
    pub fn on_unload(&self) {
        if let Some(registered) = self.registered.as_ref() {
            registered.unload.on_unload();
        }
    }

    pub async fn force_flush(&self) -> Result<(), PluginError> {
        if let Some(registered) = self.registered.as_ref() {
            registered.provider.force_flush().await?;
        }
        Ok(())
    }

    /// Flushes and stops every processor. The plugin can be registered again afterwards.
    pub async fn shutdown(&mut self) -> Result<(), PluginError> {
        let Some(registered) = self.registered.take() else {
            return Ok(());
        };
        let result = registered.provider.shutdown().await;
        if let Some(worker) = registered.batch_worker {
            if let Err(e) = worker.await {
                error!("Batch span worker failed: {e}");
            }
        }
        result.map_err(PluginError::from)
    }
}

fn resolve_sampler(sampling_rate: f64) -> Sampler {
    if sampling_rate < 0.0 {
        Sampler::AlwaysOff
    } else if sampling_rate > 1.0 {
        Sampler::AlwaysOn
    } else {
        Sampler::TraceIdRatioBased(sampling_rate)
    }
}

/// `https://host/path/beacon/...` → `https://host/path/spans`
fn collector_url_from_beacon_url(beacon_url: &str) -> Option<String> {
    let index = beacon_url.rfind("/beacon")?;
    Some(format!("{}/spans", &beacon_url[..index]))
}
