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

use std::fmt::Display;

/// Discriminator deciding where a metric's values are stored and which
/// aggregations apply to them. Only numeric types have a downsampled
/// trend representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Float,
    Str,
    Log,
    UInt64,
    Text,
}

impl ValueType {
    pub const ALL: [ValueType; 5] = [
        ValueType::Float,
        ValueType::Str,
        ValueType::Log,
        ValueType::UInt64,
        ValueType::Text,
    ];

    /// Canonical short name, also used as the document-store index name.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Float => "dbl",
            ValueType::Str => "str",
            ValueType::Log => "log",
            ValueType::UInt64 => "uint",
            ValueType::Text => "text",
        }
    }

    /// Resolves a short name back to a value type. Unrecognized names fall
    /// back to `Float` rather than erroring.
    pub fn from_name(name: &str) -> ValueType {
        match name {
            "dbl" => ValueType::Float,
            "str" => ValueType::Str,
            "log" => ValueType::Log,
            "uint" => ValueType::UInt64,
            "text" => ValueType::Text,
            _ => ValueType::Float,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Float | ValueType::UInt64)
    }

    /// Relational table holding the raw history of this value type.
    pub fn history_table(self) -> &'static str {
        match self {
            ValueType::Float => "history",
            ValueType::Str => "history_str",
            ValueType::Log => "history_log",
            ValueType::UInt64 => "history_uint",
            ValueType::Text => "history_text",
        }
    }

    /// Relational table holding the hourly trend tier, numeric types only.
    pub fn trend_table(self) -> Option<&'static str> {
        match self {
            ValueType::Float => Some("trends"),
            ValueType::UInt64 => Some("trends_uint"),
            _ => None,
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical storage engine a value type is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendKind {
    Relational,
    Document,
}

/// A metric as seen by this layer: an id plus the value type that decides
/// its storage location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Metric {
    pub id: u64,
    pub value_type: ValueType,
}

impl Metric {
    pub fn new(id: u64, value_type: ValueType) -> Self {
        Self { id, value_type }
    }
}

/// A stored value, typed per the owning metric's value type.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoryValue {
    Float(f64),
    UInt(u64),
    Text(String),
}

impl HistoryValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HistoryValue::Float(value) => Some(*value),
            HistoryValue::UInt(value) => Some(*value as f64),
            HistoryValue::Text(text) => text.parse().ok(),
        }
    }
}

/// One raw history point. The ordering key is `(clock, ns)`.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryPoint {
    pub metric_id: u64,
    pub clock: i64,
    pub ns: i32,
    pub value: HistoryValue,
}

/// One graph-ready aggregation bucket. `index` is `None` for the
/// whole-window aggregate used by summary/pie displays; `clock` is the
/// greatest clock seen among the contributing points.
#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
    pub metric_id: u64,
    pub index: Option<i64>,
    pub count: u64,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub clock: i64,
}

/// Scalar aggregation functions supported over a time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    Min,
    Max,
    Avg,
}

impl Aggregation {
    pub(crate) fn sql_name(self) -> &'static str {
        match self {
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
            Aggregation::Avg => "AVG",
        }
    }

    pub(crate) fn document_name(self) -> &'static str {
        match self {
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Avg => "avg",
        }
    }
}

/// Aggregation functions for per-interval series. A superset of the scalar
/// [`Aggregation`] set: `First` and `Last` select one stored point per
/// interval instead of folding the interval's values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalFunction {
    Min,
    Max,
    Avg,
    Count,
    Sum,
    First,
    Last,
}

/// One row of a per-interval aggregated series. `tick` is the interval
/// start the row belongs to (`clock - clock mod interval`); `count` is the
/// number of contributing points where the function tracks one, otherwise
/// zero; `ns` is only meaningful for `First`/`Last` rows.
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalValue {
    pub metric_id: u64,
    pub tick: i64,
    pub value: f64,
    pub count: u64,
    pub clock: i64,
    pub ns: i32,
}

/// Which tier a graph query reads for a metric. The choice is supplied by
/// the caller and not validated here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphSource {
    History,
    Trends,
}

/// A metric tagged with the tier its graph data should come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphMetric {
    pub metric: Metric,
    pub source: GraphSource,
}

/// A metric together with its configured retention expressions. The trend
/// expression is only meaningful for numeric value types.
#[derive(Clone, Debug)]
pub struct RetainedMetric {
    pub metric: Metric,
    pub history: String,
    pub trends: String,
}
