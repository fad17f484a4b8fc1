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

//! Read-side adapter for historical metric values split across a relational
//! store (per-type history tables plus hourly trend tables) and an optional
//! Elasticsearch-style document store. [`HistoryManager`] routes each
//! request by value type, renders the backend-specific query, and merges
//! the per-metric results; read failures degrade to missing data rather
//! than errors.

mod bucket;
mod config;
mod document;
mod error;
mod manager;
mod relational;
mod resolver;
mod retention;
mod sql;
mod types;

pub use config::{DocumentUrls, HistoryConfig};
pub use error::HistoryError;
pub use manager::HistoryManager;
pub use resolver::Resolver;
pub use retention::time_unit_to_seconds;
pub use sql::{SqlExecutor, SqlRow, SqlValue};
pub use types::{
    Aggregation, BackendKind, Bucket, GraphMetric, GraphSource, HistoryPoint, HistoryValue,
    IntervalFunction, IntervalValue, Metric, RetainedMetric, ValueType,
};
