// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Browser timing records the instrumentations turn into spans.

use std::time::SystemTime;

use page_transaction::ServerTimingEntry;

/// Timestamps of one navigation or resource timing record.
#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceEntries {
    pub fetch_start: SystemTime,
    pub response_start: Option<SystemTime>,
    pub response_end: Option<SystemTime>,
    pub dom_content_loaded_event_end: Option<SystemTime>,
    pub load_event_end: Option<SystemTime>,
    /// Empty when the record carries no `Server-Timing` data
    pub server_timing: Vec<ServerTimingEntry>,
}

impl PerformanceEntries {
    pub fn new(fetch_start: SystemTime) -> Self {
        Self {
            fetch_start,
            response_start: None,
            response_end: None,
            dom_content_loaded_event_end: None,
            load_event_end: None,
            server_timing: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_response(mut self, response_start: SystemTime, response_end: SystemTime) -> Self {
        self.response_start = Some(response_start);
        self.response_end = Some(response_end);
        self
    }

    #[must_use]
    pub fn with_load_event_end(mut self, load_event_end: SystemTime) -> Self {
        self.load_event_end = Some(load_event_end);
        self
    }

    #[must_use]
    pub fn with_server_timing(mut self, server_timing: Vec<ServerTimingEntry>) -> Self {
        self.server_timing = server_timing;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceEntry {
    pub url: String,
    /// `script`, `img`, `link`, ...
    pub initiator_type: String,
    pub entries: PerformanceEntries,
}

/// Everything known about the page once it finished loading.
#[derive(Clone, Debug, PartialEq)]
pub struct PageLoad {
    pub url: String,
    pub navigation: PerformanceEntries,
    /// `Server-Timing` of the navigation timing record, used when `navigation` has none
    pub navigation_server_timing: Vec<ServerTimingEntry>,
    pub resources: Vec<ResourceEntry>,
}

impl PageLoad {
    pub fn new(url: &str, navigation: PerformanceEntries) -> Self {
        Self {
            url: url.to_string(),
            navigation,
            navigation_server_timing: Vec::new(),
            resources: Vec::new(),
        }
    }
}
