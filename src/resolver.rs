// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;

use log::warn;

use crate::{
    config::HistoryConfig,
    types::{BackendKind, ValueType},
};

pub const SEARCH_ACTION: &str = "_search";
pub const DELETE_ACTION: &str = "_delete_by_query";

/// Maps value types to their physical backend and, for document-routed
/// types, to the base URL of their index. Built once from read-only
/// configuration; both maps are plain fields, so lookups never race.
#[derive(Clone, Debug)]
pub struct Resolver {
    backends: BTreeMap<ValueType, BackendKind>,
    urls: BTreeMap<ValueType, String>,
}

impl Resolver {
    pub fn new(config: &HistoryConfig) -> Self {
        let mut backends = BTreeMap::new();
        let mut urls = BTreeMap::new();

        for value_type in ValueType::ALL {
            let routed = config
                .document_types
                .iter()
                .any(|name| name == value_type.name());
            if !routed {
                backends.insert(value_type, BackendKind::Relational);
                continue;
            }
            backends.insert(value_type, BackendKind::Document);

            let url = config
                .document_urls
                .as_ref()
                .and_then(|urls| urls.for_type(value_type.name()));
            match url {
                Some(url) => {
                    let mut base = url.as_str().to_string();
                    if !base.ends_with('/') {
                        base.push('/');
                    }
                    urls.insert(value_type, base);
                }
                // The type stays document-routed but contributes nothing to
                // document queries until a URL is configured.
                None => warn!(
                    "document store URL is not set for type {}",
                    value_type.name()
                ),
            }
        }

        Self { backends, urls }
    }

    pub fn backend_for(&self, value_type: ValueType) -> BackendKind {
        self.backends[&value_type]
    }

    /// Resolves the document endpoint for a single value type, or `None` if
    /// the type is relational or its URL is missing from configuration.
    pub fn endpoint(&self, value_type: ValueType, action: &str) -> Option<String> {
        self.urls
            .get(&value_type)
            .map(|base| format!("{base}{}*/values/{action}", value_type.name()))
    }

    /// Resolves document endpoints for each distinct document-routed value
    /// type among `value_types`. Types without a configured URL are absent.
    pub fn endpoints(&self, value_types: &[ValueType], action: &str) -> BTreeMap<ValueType, String> {
        let mut endpoints = BTreeMap::new();
        for &value_type in value_types {
            if let Some(endpoint) = self.endpoint(value_type, action) {
                endpoints.insert(value_type, endpoint);
            }
        }
        endpoints
    }
}
