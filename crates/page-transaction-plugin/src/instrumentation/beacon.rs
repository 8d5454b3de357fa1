// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Variables attached to the page's monitoring beacon.
pub trait BeaconVars: Send + Sync + fmt::Debug {
    fn add_var(&self, key: &str, value: &str);
}

/// Keeps beacon variables in memory until the beacon is sent.
#[derive(Debug, Default)]
pub struct InMemoryBeacon {
    vars: RwLock<HashMap<String, String>>,
}

impl InMemoryBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(&self, key: &str) -> Option<String> {
        self.vars
            .read()
            .ok()
            .and_then(|vars| vars.get(key).cloned())
    }

    pub fn vars(&self) -> HashMap<String, String> {
        self.vars
            .read()
            .map(|vars| vars.clone())
            .unwrap_or_default()
    }
}

impl BeaconVars for InMemoryBeacon {
    fn add_var(&self, key: &str, value: &str) {
        if let Ok(mut vars) = self.vars.write() {
            vars.insert(key.to_string(), value.to_string());
        }
    }
}
