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

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    bucket::BucketSpec,
    error::HistoryError,
    resolver::{Resolver, SEARCH_ACTION},
    types::{
        Aggregation, Bucket, HistoryPoint, HistoryValue, IntervalFunction, IntervalValue, Metric,
        ValueType,
    },
};

/// Slow or unresponsive endpoints count as failed queries.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter translating the history operations into `_search` and
/// `_delete_by_query` calls against the document store. Responses are
/// walked leniently: malformed buckets and hits are skipped, and a failed
/// endpoint call degrades that group's contribution to nothing.
pub struct DocumentAdapter {
    client: reqwest::Client,
}

impl Default for DocumentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, HistoryError> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Up to `limit` newest points per metric, one batched query per
    /// value-type group.
    pub async fn last_values(
        &self,
        resolver: &Resolver,
        groups: &BTreeMap<ValueType, Vec<u64>>,
        limit: usize,
        period_from: Option<i64>,
    ) -> HashMap<u64, Vec<HistoryPoint>> {
        let mut results = HashMap::new();
        for (value_type, ids) in groups {
            let endpoint = match resolver.endpoint(*value_type, SEARCH_ACTION) {
                Some(endpoint) => endpoint,
                None => continue,
            };
            let body = last_values_body(ids, limit, period_from);
            match self.post(&endpoint, &body).await {
                Ok(data) => results.extend(parse_last_values(&data, *value_type)),
                Err(err) => warn!("document last-values query for {value_type} failed: {err}"),
            }
        }
        results
    }

    /// The value visible at or immediately before `(clock, ns)`: the same
    /// fallback chain as the relational adapter, expressed as two ordered
    /// search bodies.
    pub async fn value_at(
        &self,
        resolver: &Resolver,
        metric: &Metric,
        clock: i64,
        ns: i32,
    ) -> Option<HistoryPoint> {
        let endpoint = resolver.endpoint(metric.value_type, SEARCH_ACTION)?;
        let bodies = [
            value_at_same_clock_body(metric.id, clock, ns),
            value_at_earlier_clock_body(metric.id, clock),
        ];
        for body in &bodies {
            match self.post(&endpoint, body).await {
                Ok(data) => {
                    if let Some(point) = parse_first_hit(&data, metric) {
                        return Some(point);
                    }
                }
                // The next query of the chain still stands a chance.
                Err(err) => {
                    warn!("document value-at query for metric {} failed: {err}", metric.id);
                }
            }
        }
        None
    }

    /// Pixel-bucketed (or whole-window) aggregation per metric. Document
    /// metrics are always read from raw history; the trend tier lives only
    /// in the relational store.
    pub async fn graph_aggregate(
        &self,
        resolver: &Resolver,
        groups: &BTreeMap<ValueType, Vec<u64>>,
        time_from: i64,
        time_to: i64,
        spec: Option<BucketSpec>,
    ) -> HashMap<u64, Vec<Bucket>> {
        let mut results = HashMap::new();
        for (value_type, ids) in groups {
            let endpoint = match resolver.endpoint(*value_type, SEARCH_ACTION) {
                Some(endpoint) => endpoint,
                None => continue,
            };
            let body = graph_body(ids, time_from, time_to, spec.as_ref());
            match self.post(&endpoint, &body).await {
                Ok(data) => results.extend(parse_graph(&data, spec.is_some())),
                Err(err) => warn!("document graph query for {value_type} failed: {err}"),
            }
        }
        results
    }

    /// Per-interval aggregation per metric, always over raw history.
    pub async fn aggregation_by_interval(
        &self,
        resolver: &Resolver,
        groups: &BTreeMap<ValueType, Vec<u64>>,
        time_from: i64,
        time_to: i64,
        function: IntervalFunction,
        interval: i64,
    ) -> HashMap<u64, Vec<IntervalValue>> {
        let mut results = HashMap::new();
        for (value_type, ids) in groups {
            let endpoint = match resolver.endpoint(*value_type, SEARCH_ACTION) {
                Some(endpoint) => endpoint,
                None => continue,
            };
            let body = interval_body(ids, time_from, time_to, function, interval);
            match self.post(&endpoint, &body).await {
                Ok(data) => results.extend(parse_intervals(&data, function)),
                Err(err) => warn!("document interval query for {value_type} failed: {err}"),
            }
        }
        results
    }

    /// Scalar aggregate guarded by an explicit match count, so an empty
    /// window yields `None` rather than the store's empty-aggregate
    /// placeholder.
    pub async fn aggregated_value(
        &self,
        resolver: &Resolver,
        metric: &Metric,
        aggregation: Aggregation,
        time_from: i64,
    ) -> Option<f64> {
        let endpoint = resolver.endpoint(metric.value_type, SEARCH_ACTION)?;
        let body = aggregated_value_body(metric.id, aggregation, time_from);
        match self.post(&endpoint, &body).await {
            Ok(data) => parse_aggregated_value(&data),
            Err(err) => {
                warn!("document aggregate query for metric {} failed: {err}", metric.id);
                None
            }
        }
    }

    /// Earliest clock among `ids` behind `endpoint`. Zero and negative
    /// clocks are treated as corrupted and reported as absent.
    pub async fn min_clock(&self, endpoint: &str, ids: &[u64]) -> Option<i64> {
        let body = min_clock_body(ids);
        match self.post(endpoint, &body).await {
            Ok(data) => parse_min_clock(&data),
            Err(err) => {
                warn!("document min-clock query failed: {err}");
                None
            }
        }
    }

    /// One delete-by-query per endpoint; true only when every call
    /// succeeded.
    pub async fn delete_history(
        &self,
        endpoints: &BTreeMap<ValueType, String>,
        ids: &[u64],
    ) -> bool {
        let body = delete_body(ids);
        for (value_type, endpoint) in endpoints {
            if let Err(err) = self.post(endpoint, &body).await {
                warn!("document history delete for {value_type} failed: {err}");
                return false;
            }
        }
        true
    }
}

fn must_filter(ids: &[u64], period_from: Option<i64>) -> Vec<Value> {
    let mut must = vec![json!({ "terms": { "itemid": ids } })];
    if let Some(clock) = period_from {
        must.push(json!({ "range": { "clock": { "gt": clock } } }));
    }
    must
}

fn last_values_body(ids: &[u64], limit: usize, period_from: Option<i64>) -> Value {
    json!({
        "query": { "bool": { "must": must_filter(ids, period_from) } },
        "aggs": {
            "group_by_itemid": {
                // The terms size matches the id count so every requested
                // metric gets an aggregation bucket.
                "terms": { "field": "itemid", "size": ids.len() },
                "aggs": {
                    "group_by_docs": {
                        "top_hits": {
                            "size": limit,
                            "sort": [{ "clock": "desc" }, { "ns": "desc" }]
                        }
                    }
                }
            }
        },
        "size": 0
    })
}

fn value_at_same_clock_body(id: u64, clock: i64, ns: i32) -> Value {
    json!({
        "query": {
            "bool": {
                "must": [
                    { "term": { "itemid": id } },
                    { "term": { "clock": clock } },
                    { "range": { "ns": { "lte": ns } } }
                ]
            }
        },
        "sort": [{ "clock": "desc" }, { "ns": "desc" }],
        "size": 1
    })
}

fn value_at_earlier_clock_body(id: u64, clock: i64) -> Value {
    json!({
        "query": {
            "bool": {
                "must": [
                    { "term": { "itemid": id } },
                    { "range": { "clock": { "lt": clock } } }
                ]
            }
        },
        "sort": [{ "clock": "desc" }, { "ns": "desc" }],
        "size": 1
    })
}

fn graph_body(ids: &[u64], time_from: i64, time_to: i64, spec: Option<&BucketSpec>) -> Value {
    let must = json!([
        { "terms": { "itemid": ids } },
        { "range": { "clock": { "gte": time_from, "lte": time_to } } }
    ]);

    let stats = json!({
        "min_value": { "min": { "field": "value" } },
        "avg_value": { "avg": { "field": "value" } },
        "max_value": { "max": { "field": "value" } },
        "max_clock": { "max": { "field": "clock" } }
    });

    let per_item = match spec {
        // The shared bucket formula as a server-side script key. All
        // operands are longs, so the division floors exactly like the SQL
        // rendering.
        Some(spec) => json!({
            "group_by_bucket": {
                "terms": {
                    "size": spec.width,
                    "script": {
                        "source":
                            "params.width*((doc['clock'].value+params.delta)%params.size)/params.size",
                        "params": {
                            "width": spec.width,
                            "delta": spec.delta,
                            "size": spec.size
                        }
                    }
                },
                "aggs": stats
            }
        }),
        None => stats,
    };

    json!({
        "query": { "bool": { "must": must } },
        "aggs": {
            "group_by_itemid": {
                "terms": { "field": "itemid", "size": ids.len() },
                "aggs": per_item
            }
        },
        "size": 0
    })
}

fn interval_body(
    ids: &[u64],
    time_from: i64,
    time_to: i64,
    function: IntervalFunction,
    interval: i64,
) -> Value {
    let mut aggs = serde_json::Map::new();
    // `First` anchors the bucket clock at its oldest point; every other
    // function reports the newest.
    let clock_agg = if function == IntervalFunction::First {
        json!({ "min": { "field": "clock" } })
    } else {
        json!({ "max": { "field": "clock" } })
    };
    aggs.insert("clock".to_string(), clock_agg);
    match function {
        IntervalFunction::Min => {
            aggs.insert("value".to_string(), json!({ "min": { "field": "value" } }));
        }
        IntervalFunction::Max => {
            aggs.insert("value".to_string(), json!({ "max": { "field": "value" } }));
        }
        IntervalFunction::Avg => {
            aggs.insert("value".to_string(), json!({ "avg": { "field": "value" } }));
        }
        IntervalFunction::Sum => {
            aggs.insert("value".to_string(), json!({ "sum": { "field": "value" } }));
        }
        IntervalFunction::First => {
            aggs.insert(
                "value".to_string(),
                json!({ "top_hits": { "size": 1, "sort": [{ "clock": "asc" }, { "ns": "asc" }] } }),
            );
        }
        IntervalFunction::Last => {
            aggs.insert(
                "value".to_string(),
                json!({ "top_hits": { "size": 1, "sort": [{ "clock": "desc" }, { "ns": "desc" }] } }),
            );
        }
        // The bucket doc_count already is the value.
        IntervalFunction::Count => {}
    }

    json!({
        "query": { "bool": { "must": [
            { "terms": { "itemid": ids } },
            { "range": { "clock": { "gte": time_from, "lte": time_to } } }
        ] } },
        "aggs": {
            "group_by_itemid": {
                "terms": { "field": "itemid", "size": ids.len() },
                "aggs": {
                    "group_by_interval": {
                        "terms": {
                            // One term per interval of the window.
                            "size": (time_to - time_from) / interval + 1,
                            "script": {
                                "source": "doc['clock'].value-doc['clock'].value%params.interval",
                                "params": { "interval": interval }
                            }
                        },
                        "aggs": aggs
                    }
                }
            }
        },
        "size": 0
    })
}

fn aggregated_value_body(id: u64, aggregation: Aggregation, time_from: i64) -> Value {
    let mut value_agg = serde_json::Map::new();
    value_agg.insert(
        aggregation.document_name().to_string(),
        json!({ "field": "value" }),
    );
    json!({
        "query": {
            "bool": {
                "must": [
                    { "term": { "itemid": id } },
                    { "range": { "clock": { "gt": time_from } } }
                ]
            }
        },
        "aggs": {
            "matched": { "value_count": { "field": "clock" } },
            "value": value_agg
        },
        "size": 0
    })
}

fn min_clock_body(ids: &[u64]) -> Value {
    json!({
        "query": { "bool": { "must": [{ "terms": { "itemid": ids } }] } },
        "aggs": { "min_clock": { "min": { "field": "clock" } } },
        "size": 0
    })
}

fn delete_body(ids: &[u64]) -> Value {
    json!({ "query": { "terms": { "itemid": ids } } })
}

#[derive(Deserialize)]
struct DocSource {
    itemid: u64,
    clock: i64,
    #[serde(default)]
    ns: i32,
    value: Value,
}

fn history_value(raw: &Value, value_type: ValueType) -> Option<HistoryValue> {
    match value_type {
        ValueType::Float => json_f64(raw).map(HistoryValue::Float),
        ValueType::UInt64 => raw
            .as_u64()
            .or_else(|| raw.as_str().and_then(|text| text.parse().ok()))
            .map(HistoryValue::UInt),
        ValueType::Str | ValueType::Log | ValueType::Text => match raw {
            Value::String(text) => Some(HistoryValue::Text(text.clone())),
            Value::Null => None,
            other => Some(HistoryValue::Text(other.to_string())),
        },
    }
}

fn point_from_source(source: &Value, value_type: ValueType) -> Option<HistoryPoint> {
    let source: DocSource = serde_json::from_value(source.clone()).ok()?;
    let value = history_value(&source.value, value_type)?;
    Some(HistoryPoint {
        metric_id: source.itemid,
        clock: source.clock,
        ns: source.ns,
        value,
    })
}

fn parse_last_values(data: &Value, value_type: ValueType) -> HashMap<u64, Vec<HistoryPoint>> {
    let mut results = HashMap::new();
    for bucket in term_buckets(data, "group_by_itemid") {
        let id = match bucket.get("key").and_then(json_u64) {
            Some(id) => id,
            None => continue,
        };
        let hits = bucket
            .pointer("/group_by_docs/hits/hits")
            .and_then(Value::as_array);
        let points: Vec<HistoryPoint> = hits
            .into_iter()
            .flatten()
            .filter_map(|hit| hit.get("_source"))
            .filter_map(|source| point_from_source(source, value_type))
            .collect();
        if !points.is_empty() {
            results.insert(id, points);
        }
    }
    results
}

fn parse_first_hit(data: &Value, metric: &Metric) -> Option<HistoryPoint> {
    data.pointer("/hits/hits/0/_source")
        .and_then(|source| point_from_source(source, metric.value_type))
}

fn parse_graph(data: &Value, with_index: bool) -> HashMap<u64, Vec<Bucket>> {
    let mut results: HashMap<u64, Vec<Bucket>> = HashMap::new();
    for item in term_buckets(data, "group_by_itemid") {
        let id = match item.get("key").and_then(json_u64) {
            Some(id) => id,
            None => continue,
        };
        if with_index {
            let buckets = item
                .pointer("/group_by_bucket/buckets")
                .and_then(Value::as_array);
            for point in buckets.into_iter().flatten() {
                let index = point.get("key").and_then(json_i64);
                if let Some(bucket) = stats_bucket(point, id, index) {
                    results.entry(id).or_default().push(bucket);
                }
            }
        } else if let Some(bucket) = stats_bucket(item, id, None) {
            results.entry(id).or_default().push(bucket);
        }
    }
    results
}

fn stats_bucket(stats: &Value, metric_id: u64, index: Option<i64>) -> Option<Bucket> {
    let count = stats.get("doc_count").and_then(json_u64)?;
    let min = stats.pointer("/min_value/value").and_then(json_f64)?;
    let avg = stats.pointer("/avg_value/value").and_then(json_f64)?;
    let max = stats.pointer("/max_value/value").and_then(json_f64)?;
    let clock = stats.pointer("/max_clock/value").and_then(json_i64)?;
    Some(Bucket {
        metric_id,
        index,
        count,
        min,
        avg,
        max,
        clock,
    })
}

/// Walks a per-interval response; malformed interval buckets are skipped.
fn parse_intervals(data: &Value, function: IntervalFunction) -> HashMap<u64, Vec<IntervalValue>> {
    let mut results: HashMap<u64, Vec<IntervalValue>> = HashMap::new();
    for item in term_buckets(data, "group_by_itemid") {
        let id = match item.get("key").and_then(json_u64) {
            Some(id) => id,
            None => continue,
        };
        let buckets = item
            .pointer("/group_by_interval/buckets")
            .and_then(Value::as_array);
        for point in buckets.into_iter().flatten() {
            let tick = match point.get("key").and_then(json_i64) {
                Some(tick) => tick,
                None => continue,
            };
            let count = point.get("doc_count").and_then(json_u64).unwrap_or(0);
            let clock = match point.pointer("/clock/value").and_then(json_i64) {
                Some(clock) => clock,
                None => continue,
            };
            let (value, ns) = match function {
                IntervalFunction::Count => (count as f64, 0),
                IntervalFunction::First | IntervalFunction::Last => {
                    let source = point.pointer("/value/hits/hits/0/_source");
                    let value = source
                        .and_then(|source| source.get("value"))
                        .and_then(json_f64);
                    let ns = source
                        .and_then(|source| source.get("ns"))
                        .and_then(json_i64)
                        .unwrap_or(0) as i32;
                    match value {
                        Some(value) => (value, ns),
                        None => continue,
                    }
                }
                _ => match point.pointer("/value/value").and_then(json_f64) {
                    Some(value) => (value, 0),
                    None => continue,
                },
            };
            results.entry(id).or_default().push(IntervalValue {
                metric_id: id,
                tick,
                value,
                count,
                clock,
                ns,
            });
        }
    }
    results
}

fn parse_aggregated_value(data: &Value) -> Option<f64> {
    let matched = data
        .pointer("/aggregations/matched/value")
        .and_then(json_u64)
        .unwrap_or(0);
    if matched == 0 {
        return None;
    }
    data.pointer("/aggregations/value/value").and_then(json_f64)
}

fn parse_min_clock(data: &Value) -> Option<i64> {
    data.pointer("/aggregations/min_clock/value")
        .and_then(json_i64)
        .filter(|clock| *clock > 0)
}

fn term_buckets<'a>(data: &'a Value, name: &str) -> impl Iterator<Item = &'a Value> {
    data.pointer(&format!("/aggregations/{name}/buckets"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn json_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
        .or_else(|| value.as_str().and_then(|text| text.parse().ok()))
}

fn json_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|v| v as i64))
        .or_else(|| value.as_str().and_then(|text| text.parse().ok()))
}

fn json_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|text| text.parse().ok()))
}
