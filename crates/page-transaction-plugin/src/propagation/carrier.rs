// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Header carriers for trace propagation.
//!
//! Header names are case-insensitive, so carriers store and look up keys in lowercase.

use std::collections::HashMap;

pub trait Injector {
    /// Sets a header. The key is stored lowercased.
    fn set(&mut self, key: &str, value: String);
}

pub trait Extractor {
    fn get(&self, key: &str) -> Option<&str>;

    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}
