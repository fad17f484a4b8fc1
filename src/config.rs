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

use url::Url;

use crate::{error::HistoryError, types::ValueType};

/// Deployment-level storage routing, read-only at query time. Value types
/// whose short names appear in `document_types` are served by the document
/// backend; everything else stays relational.
#[derive(Clone, Debug, Default)]
pub struct HistoryConfig {
    /// Short value-type names (`dbl`, `str`, `log`, `uint`, `text`) routed
    /// to the document backend.
    pub document_types: Vec<String>,
    /// Base URL(s) of the document store. `None` with a non-empty
    /// `document_types` is a configuration gap: affected types are logged
    /// and excluded from document queries.
    pub document_urls: Option<DocumentUrls>,
}

impl HistoryConfig {
    /// Rejects document type names that match no known value type. Routing
    /// itself ignores unknown names, so a typo here would otherwise go
    /// unnoticed until queries start missing data.
    pub fn validate(&self) -> Result<(), HistoryError> {
        for name in &self.document_types {
            if !ValueType::ALL.iter().any(|vt| vt.name() == name.as_str()) {
                return Err(HistoryError::Config(format!(
                    "unknown document store type name: {name}"
                )));
            }
        }
        Ok(())
    }
}

/// Either one shared base URL for all document-routed types or one URL per
/// type name.
#[derive(Clone, Debug)]
pub enum DocumentUrls {
    Shared(Url),
    PerType(BTreeMap<String, Url>),
}

impl DocumentUrls {
    pub fn for_type(&self, name: &str) -> Option<&Url> {
        match self {
            DocumentUrls::Shared(url) => Some(url),
            DocumentUrls::PerType(urls) => urls.get(name),
        }
    }
}
