use std::future::Future;

use crate::error::HistoryError;

/// One cell of a relational row. Adapters parse positionally and leniently:
/// engines disagree on whether aggregates come back as integers, decimals
/// or text, so every accessor coerces where it safely can.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(value) => Some(*value),
            SqlValue::UInt(value) => i64::try_from(*value).ok(),
            SqlValue::Float(value) => Some(*value as i64),
            SqlValue::Text(text) => text.parse().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SqlValue::UInt(value) => Some(*value),
            SqlValue::Int(value) => u64::try_from(*value).ok(),
            SqlValue::Float(value) if *value >= 0.0 => Some(*value as u64),
            SqlValue::Text(text) => text.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(value) => Some(*value),
            SqlValue::Int(value) => Some(*value as f64),
            SqlValue::UInt(value) => Some(*value as f64),
            SqlValue::Text(text) => text.parse().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Text(text) => Some(text.clone()),
            SqlValue::Int(value) => Some(value.to_string()),
            SqlValue::UInt(value) => Some(value.to_string()),
            SqlValue::Float(value) => Some(value.to_string()),
            SqlValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// A positional row set entry returned by the relational store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlRow(Vec<SqlValue>);

impl SqlRow {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.0.get(index)
    }
}

/// Boundary to the relational store: textual queries in, row sets or a
/// success/failure outcome back. Identifier and value escaping is the
/// query builder's responsibility; builders here only interpolate numeric
/// ids and clocks.
pub trait SqlExecutor: Send + Sync {
    fn query(&self, sql: &str) -> impl Future<Output = Result<Vec<SqlRow>, HistoryError>> + Send;

    fn execute(&self, sql: &str) -> impl Future<Output = Result<(), HistoryError>> + Send;
}

/// Renders an `itemid` membership condition; a single id collapses to an
/// equality comparison.
pub(crate) fn ids_condition(ids: &[u64]) -> String {
    match ids {
        [id] => format!("itemid={id}"),
        _ => {
            let list = ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            format!("itemid IN ({list})")
        }
    }
}
