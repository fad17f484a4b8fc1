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

use chrono::Utc;
use log::warn;

use crate::{
    bucket::BucketSpec,
    config::HistoryConfig,
    document::DocumentAdapter,
    relational::RelationalAdapter,
    resolver::{Resolver, DELETE_ACTION, SEARCH_ACTION},
    retention::retention_window,
    sql::SqlExecutor,
    types::{
        Aggregation, BackendKind, Bucket, GraphMetric, GraphSource, HistoryPoint,
        IntervalFunction, IntervalValue, Metric, RetainedMetric, ValueType,
    },
};

/// The query router: groups requested metrics by backend kind and value
/// type, dispatches to the relational and document adapters, and merges
/// their contributions per metric id.
///
/// Read operations degrade on backend failure: the affected group's
/// contribution is logged and omitted, never surfaced as an error. Deletion
/// is conjunctive across both backend phases.
pub struct HistoryManager<S> {
    db: S,
    resolver: Resolver,
    document: DocumentAdapter,
}

impl<S: SqlExecutor> HistoryManager<S> {
    pub fn new(config: &HistoryConfig, db: S) -> Self {
        Self {
            db,
            resolver: Resolver::new(config),
            document: DocumentAdapter::new(),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn relational(&self) -> RelationalAdapter<'_, S> {
        RelationalAdapter::new(&self.db)
    }

    fn group_metrics<'m>(
        &self,
        metrics: &'m [Metric],
    ) -> BTreeMap<(BackendKind, ValueType), Vec<&'m Metric>> {
        let mut groups: BTreeMap<(BackendKind, ValueType), Vec<&Metric>> = BTreeMap::new();
        for metric in metrics {
            let kind = self.resolver.backend_for(metric.value_type);
            groups.entry((kind, metric.value_type)).or_default().push(metric);
        }
        groups
    }

    /// The last `limit` points per metric, newest first; metrics without
    /// points are absent from the map.
    pub async fn last_values(
        &self,
        metrics: &[Metric],
        limit: usize,
        period: Option<i64>,
    ) -> HashMap<u64, Vec<HistoryPoint>> {
        self.last_values_at(metrics, limit, period, now()).await
    }

    async fn last_values_at(
        &self,
        metrics: &[Metric],
        limit: usize,
        period: Option<i64>,
        now: i64,
    ) -> HashMap<u64, Vec<HistoryPoint>> {
        let period_from = period.map(|period| now - period);
        let groups = self.group_metrics(metrics);

        let mut results = HashMap::new();

        let document_groups = document_ids(&groups);
        if !document_groups.is_empty() {
            results.extend(
                self.document
                    .last_values(&self.resolver, &document_groups, limit, period_from)
                    .await,
            );
        }

        let relational = relational_metrics(&groups);
        if !relational.is_empty() {
            match self
                .relational()
                .last_values(&relational, limit, period_from)
                .await
            {
                Ok(map) => results.extend(map),
                Err(err) => warn!("relational last-values query failed: {err}"),
            }
        }

        results
    }

    /// The subset of `metrics` that have at least one stored point within
    /// `period`.
    pub async fn items_having_values(
        &self,
        metrics: &[Metric],
        period: Option<i64>,
    ) -> Vec<Metric> {
        let now = now();
        let period_from = period.map(|period| now - period);
        let groups = self.group_metrics(metrics);

        let mut found: std::collections::HashSet<u64> = std::collections::HashSet::new();

        let document_groups = document_ids(&groups);
        if !document_groups.is_empty() {
            // A one-value fetch is the cheapest existence probe the
            // document store offers.
            let values = self
                .document
                .last_values(&self.resolver, &document_groups, 1, period_from)
                .await;
            found.extend(values.into_keys());
        }

        let mut relational_groups = BTreeMap::new();
        for ((kind, value_type), group) in &groups {
            if *kind == BackendKind::Relational {
                relational_groups.insert(
                    *value_type,
                    group.iter().map(|metric| metric.id).collect::<Vec<_>>(),
                );
            }
        }
        if !relational_groups.is_empty() {
            match self
                .relational()
                .items_having_values(&relational_groups, period_from)
                .await
            {
                Ok(ids) => found.extend(ids),
                Err(err) => warn!("relational existence query failed: {err}"),
            }
        }

        metrics
            .iter()
            .filter(|metric| found.contains(&metric.id))
            .copied()
            .collect()
    }

    /// The value visible at or immediately before `(clock, ns)`, or `None`.
    pub async fn value_at(&self, metric: &Metric, clock: i64, ns: i32) -> Option<HistoryPoint> {
        match self.resolver.backend_for(metric.value_type) {
            BackendKind::Document => {
                self.document
                    .value_at(&self.resolver, metric, clock, ns)
                    .await
            }
            BackendKind::Relational => {
                match self.relational().value_at(metric, clock, ns).await {
                    Ok(point) => point,
                    Err(err) => {
                        warn!("relational value-at query failed: {err}");
                        None
                    }
                }
            }
        }
    }

    /// Graph-ready buckets per metric over `[time_from, time_to]`. With a
    /// `width` the window is split into pixel-aligned buckets; without one
    /// each metric collapses into a single whole-window aggregate. Output is
    /// sparse: empty buckets and metrics without points are absent.
    pub async fn graph_aggregate(
        &self,
        items: &[GraphMetric],
        time_from: i64,
        time_to: i64,
        width: Option<i64>,
    ) -> HashMap<u64, Vec<Bucket>> {
        if time_to <= time_from {
            warn!("graph aggregation window [{time_from}, {time_to}] is empty");
            return HashMap::new();
        }
        let spec = match width {
            Some(width) if width > 0 => Some(BucketSpec::new(time_from, time_to, width)),
            Some(width) => {
                warn!("graph width {width} is not positive, aggregating the whole window");
                None
            }
            None => None,
        };

        let mut document_groups: BTreeMap<ValueType, Vec<u64>> = BTreeMap::new();
        let mut relational: Vec<&GraphMetric> = Vec::new();
        for item in items {
            match self.resolver.backend_for(item.metric.value_type) {
                BackendKind::Document => document_groups
                    .entry(item.metric.value_type)
                    .or_default()
                    .push(item.metric.id),
                BackendKind::Relational => relational.push(item),
            }
        }

        let mut results = HashMap::new();
        if !document_groups.is_empty() {
            results.extend(
                self.document
                    .graph_aggregate(&self.resolver, &document_groups, time_from, time_to, spec)
                    .await,
            );
        }
        if !relational.is_empty() {
            match self
                .relational()
                .graph_aggregate(&relational, time_from, time_to, spec)
                .await
            {
                Ok(map) => results.extend(map),
                Err(err) => warn!("relational graph query failed: {err}"),
            }
        }
        results
    }

    /// Per-interval aggregated series per metric over `[time_from,
    /// time_to]`, keyed by the interval start. Relational `Count` series are
    /// dense; everything else is sparse. Non-numeric metrics have no
    /// defined interval aggregate and are skipped.
    pub async fn aggregation_by_interval(
        &self,
        items: &[GraphMetric],
        time_from: i64,
        time_to: i64,
        function: IntervalFunction,
        interval: i64,
    ) -> HashMap<u64, Vec<IntervalValue>> {
        if interval <= 0 {
            warn!("aggregation interval {interval} is not positive");
            return HashMap::new();
        }
        if time_to < time_from {
            warn!("aggregation window [{time_from}, {time_to}] is empty");
            return HashMap::new();
        }

        let mut document_groups: BTreeMap<ValueType, Vec<u64>> = BTreeMap::new();
        let mut relational: Vec<&GraphMetric> = Vec::new();
        for item in items {
            if !item.metric.value_type.is_numeric() {
                warn!(
                    "metric {} is not numeric, skipping interval aggregation",
                    item.metric.id
                );
                continue;
            }
            match self.resolver.backend_for(item.metric.value_type) {
                BackendKind::Document => document_groups
                    .entry(item.metric.value_type)
                    .or_default()
                    .push(item.metric.id),
                BackendKind::Relational => relational.push(item),
            }
        }

        let mut results = HashMap::new();
        if !document_groups.is_empty() {
            results.extend(
                self.document
                    .aggregation_by_interval(
                        &self.resolver,
                        &document_groups,
                        time_from,
                        time_to,
                        function,
                        interval,
                    )
                    .await,
            );
        }
        if !relational.is_empty() {
            match self
                .relational()
                .aggregation_by_interval(&relational, time_from, time_to, function, interval)
                .await
            {
                Ok(map) => results.extend(map),
                Err(err) => warn!("relational interval query failed: {err}"),
            }
        }
        results
    }

    /// Scalar min/max/avg over all points after `time_from`, or `None` when
    /// nothing matches. Non-numeric metrics have no defined scalar
    /// aggregate and always yield `None`.
    pub async fn aggregated_value(
        &self,
        metric: &Metric,
        aggregation: Aggregation,
        time_from: i64,
    ) -> Option<f64> {
        if !metric.value_type.is_numeric() {
            return None;
        }
        match self.resolver.backend_for(metric.value_type) {
            BackendKind::Document => {
                self.document
                    .aggregated_value(&self.resolver, metric, aggregation, time_from)
                    .await
            }
            BackendKind::Relational => {
                match self
                    .relational()
                    .aggregated_value(metric, aggregation, time_from)
                    .await
                {
                    Ok(value) => value,
                    Err(err) => {
                        warn!("relational aggregate query failed: {err}");
                        None
                    }
                }
            }
        }
    }

    /// The earliest retained timestamp across `metrics`, bounding how far
    /// back a graph may be zoomed. Never zero and never in the future: when
    /// the stores report no usable minimum, an explicit retention-derived
    /// fallback is substituted.
    pub async fn min_clock(&self, metrics: &[RetainedMetric]) -> i64 {
        self.min_clock_at(metrics, now()).await
    }

    async fn min_clock_at(&self, metrics: &[RetainedMetric], now: i64) -> i64 {
        let window = retention_window(metrics);
        let source = window.source();

        // The trend tier lives only in the relational store; when it is the
        // wider tier, numeric metrics read it regardless of where their raw
        // history is routed.
        let mut tables: BTreeMap<&'static str, Vec<u64>> = BTreeMap::new();
        let mut document_groups: BTreeMap<ValueType, Vec<u64>> = BTreeMap::new();
        for retained in metrics {
            let metric = retained.metric;
            if source == GraphSource::Trends && metric.value_type.is_numeric() {
                if let Some(table) = metric.value_type.trend_table() {
                    tables.entry(table).or_default().push(metric.id);
                    continue;
                }
            }
            match self.resolver.backend_for(metric.value_type) {
                BackendKind::Document => document_groups
                    .entry(metric.value_type)
                    .or_default()
                    .push(metric.id),
                BackendKind::Relational => tables
                    .entry(metric.value_type.history_table())
                    .or_default()
                    .push(metric.id),
            }
        }

        let mut min: Option<i64> = None;
        for (table, ids) in &tables {
            match self.relational().min_clock(table, ids).await {
                Ok(Some(clock)) => min = Some(min.map_or(clock, |current| current.min(clock))),
                Ok(None) => {}
                Err(err) => warn!("relational min-clock query on {table} failed: {err}"),
            }
        }
        for (value_type, ids) in &document_groups {
            if let Some(endpoint) = self.resolver.endpoint(*value_type, SEARCH_ACTION) {
                if let Some(clock) = self.document.min_clock(&endpoint, ids).await {
                    min = Some(min.map_or(clock, |current| current.min(clock)));
                }
            }
        }

        match min {
            Some(clock) => clock.min(now),
            None => window.fallback_min_clock(now),
        }
    }

    /// Purges all stored values for `ids` from both backends. The
    /// relational phase targets every history and trend table and runs to
    /// completion even on failure; the document phase only runs when the
    /// relational phase fully succeeded. True only when every step
    /// succeeded; partial deletion is a possible terminal state on failure.
    pub async fn delete_history(&self, ids: &[u64]) -> bool {
        if ids.is_empty() {
            return true;
        }
        if !self.relational().delete_history(ids).await {
            return false;
        }
        let endpoints = self.resolver.endpoints(&ValueType::ALL, DELETE_ACTION);
        if endpoints.is_empty() {
            return true;
        }
        self.document.delete_history(&endpoints, ids).await
    }
}

fn document_ids(
    groups: &BTreeMap<(BackendKind, ValueType), Vec<&Metric>>,
) -> BTreeMap<ValueType, Vec<u64>> {
    let mut ids = BTreeMap::new();
    for ((kind, value_type), group) in groups {
        if *kind == BackendKind::Document {
            ids.insert(
                *value_type,
                group.iter().map(|metric| metric.id).collect::<Vec<_>>(),
            );
        }
    }
    ids
}

fn relational_metrics<'m>(
    groups: &BTreeMap<(BackendKind, ValueType), Vec<&'m Metric>>,
) -> Vec<&'m Metric> {
    groups
        .iter()
        .filter(|((kind, _), _)| *kind == BackendKind::Relational)
        .flat_map(|(_, group)| group.iter().copied())
        .collect()
}

fn now() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::{ready, Future};
    use std::sync::Mutex;

    use url::Url;

    use super::*;
    use crate::config::DocumentUrls;
    use crate::error::HistoryError;
    use crate::sql::{SqlRow, SqlValue};

    #[derive(Default)]
    struct FakeDb {
        queries: Mutex<Vec<String>>,
        query_results: Mutex<VecDeque<Result<Vec<SqlRow>, HistoryError>>>,
        executes: Mutex<Vec<String>>,
        execute_results: Mutex<VecDeque<Result<(), HistoryError>>>,
    }

    impl FakeDb {
        fn with_query_results(results: Vec<Result<Vec<SqlRow>, HistoryError>>) -> Self {
            Self {
                query_results: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl SqlExecutor for FakeDb {
        fn query(
            &self,
            sql: &str,
        ) -> impl Future<Output = Result<Vec<SqlRow>, HistoryError>> + Send {
            self.queries.lock().unwrap().push(sql.to_string());
            let next = self
                .query_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            ready(next)
        }

        fn execute(&self, sql: &str) -> impl Future<Output = Result<(), HistoryError>> + Send {
            self.executes.lock().unwrap().push(sql.to_string());
            let next = self
                .execute_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()));
            ready(next)
        }
    }

    fn manager(db: FakeDb) -> HistoryManager<FakeDb> {
        let _ = env_logger::builder().is_test(true).try_init();
        HistoryManager::new(&HistoryConfig::default(), db)
    }

    fn point_row(clock: i64, ns: i64, value: f64) -> SqlRow {
        SqlRow::new(vec![
            SqlValue::Int(clock),
            SqlValue::Int(ns),
            SqlValue::Float(value),
        ])
    }

    fn float_metric(id: u64) -> Metric {
        Metric::new(id, ValueType::Float)
    }

    #[tokio::test]
    async fn value_at_returns_the_exact_point() {
        let db = FakeDb::with_query_results(vec![Ok(vec![point_row(100, 0, 1.0)])]);
        let mgr = manager(db);
        let point = mgr.value_at(&float_metric(1), 100, 0).await.unwrap();
        assert_eq!(point.clock, 100);
        assert_eq!(point.value.as_f64(), Some(1.0));

        let queries = mgr.db.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("clock=100 AND ns<=0"));
    }

    #[tokio::test]
    async fn value_at_falls_back_to_the_previous_clock() {
        // Points at 100 and 200; the lookup at 150 must land on 100.
        let db = FakeDb::with_query_results(vec![
            Ok(Vec::new()),
            Ok(vec![point_row(100, 0, 1.0)]),
        ]);
        let mgr = manager(db);
        let point = mgr.value_at(&float_metric(1), 150, 0).await.unwrap();
        assert_eq!(point.clock, 100);

        let queries = mgr.db.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].contains("clock=150"));
        assert!(queries[1].contains("clock<150"));
    }

    #[tokio::test]
    async fn value_at_before_all_data_is_none() {
        let db = FakeDb::with_query_results(vec![Ok(Vec::new()), Ok(Vec::new())]);
        let mgr = manager(db);
        assert!(mgr.value_at(&float_metric(1), 50, 0).await.is_none());
    }

    #[tokio::test]
    async fn last_values_omits_metrics_without_points() {
        let db = FakeDb::with_query_results(vec![
            Ok(vec![point_row(200, 0, 2.0), point_row(100, 0, 1.0)]),
            Ok(Vec::new()),
        ]);
        let mgr = manager(db);
        let metrics = [float_metric(1), float_metric(2)];
        let results = mgr.last_values_at(&metrics, 2, None, 1_000).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[&1].len(), 2);
        assert_eq!(results[&1][0].clock, 200);
        assert!(!results.contains_key(&2));
    }

    #[tokio::test]
    async fn last_values_period_is_anchored_at_now() {
        let db = FakeDb::default();
        let mgr = manager(db);
        let metrics = [float_metric(1)];
        mgr.last_values_at(&metrics, 1, Some(300), 1_000).await;
        assert!(mgr.db.queries()[0].contains("clock>700"));
    }

    #[tokio::test]
    async fn items_having_values_filters_to_metrics_with_data() {
        let db = FakeDb::with_query_results(vec![Ok(vec![SqlRow::new(vec![SqlValue::UInt(2)])])]);
        let mgr = manager(db);
        let metrics = [float_metric(1), float_metric(2)];
        let having = mgr.items_having_values(&metrics, None).await;
        assert_eq!(having, vec![float_metric(2)]);
        assert!(mgr.db.queries()[0].starts_with("SELECT DISTINCT itemid"));
    }

    #[tokio::test]
    async fn aggregated_value_of_an_empty_window_is_none() {
        let db = FakeDb::with_query_results(vec![Ok(vec![SqlRow::new(vec![
            SqlValue::Int(0),
            SqlValue::Null,
        ])])]);
        let mgr = manager(db);
        let value = mgr
            .aggregated_value(&float_metric(1), Aggregation::Avg, 1_000)
            .await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn aggregated_value_returns_the_scalar() {
        let db = FakeDb::with_query_results(vec![Ok(vec![SqlRow::new(vec![
            SqlValue::Int(3),
            SqlValue::Float(2.5),
        ])])]);
        let mgr = manager(db);
        let value = mgr
            .aggregated_value(&float_metric(1), Aggregation::Max, 1_000)
            .await;
        assert_eq!(value, Some(2.5));
    }

    #[tokio::test]
    async fn aggregated_value_of_non_numeric_metrics_is_none() {
        let mgr = manager(FakeDb::default());
        let metric = Metric::new(1, ValueType::Text);
        let value = mgr.aggregated_value(&metric, Aggregation::Min, 0).await;
        assert_eq!(value, None);
        assert!(mgr.db.queries().is_empty());
    }

    #[tokio::test]
    async fn graph_aggregate_merges_bucket_rows() {
        let row = SqlRow::new(vec![
            SqlValue::UInt(5),
            SqlValue::Int(12),
            SqlValue::Float(0.5),
            SqlValue::Float(1.5),
            SqlValue::Float(3.0),
            SqlValue::Int(190),
            SqlValue::Int(5),
        ]);
        let db = FakeDb::with_query_results(vec![Ok(vec![row])]);
        let mgr = manager(db);
        let items = [GraphMetric {
            metric: float_metric(5),
            source: GraphSource::History,
        }];
        let results = mgr.graph_aggregate(&items, 100, 200, Some(10)).await;
        assert_eq!(results[&5][0].index, Some(5));
        assert!(mgr.db.queries()[0].contains("FLOOR(10*MOD(clock+100,100)/100)"));
    }

    #[tokio::test]
    async fn graph_aggregate_of_an_empty_window_is_empty() {
        let mgr = manager(FakeDb::default());
        let items = [GraphMetric {
            metric: float_metric(5),
            source: GraphSource::History,
        }];
        let results = mgr.graph_aggregate(&items, 200, 200, Some(10)).await;
        assert!(results.is_empty());
        assert!(mgr.db.queries().is_empty());
    }

    #[tokio::test]
    async fn min_clock_prefers_the_wider_trend_tier() {
        let db = FakeDb::with_query_results(vec![Ok(vec![SqlRow::new(vec![SqlValue::Int(
            1_600_000_000,
        )])])]);
        let mgr = manager(db);
        let metrics = [RetainedMetric {
            metric: float_metric(1),
            history: "7d".into(),
            trends: "365d".into(),
        }];
        let clock = mgr.min_clock_at(&metrics, 1_700_000_000).await;
        assert_eq!(clock, 1_600_000_000);
        assert_eq!(
            mgr.db.queries(),
            vec!["SELECT MIN(clock) AS clock FROM trends WHERE itemid=1"]
        );
    }

    #[tokio::test]
    async fn min_clock_falls_back_to_retention_for_numeric_metrics() {
        // The store reports NULL: substitute now - max(history, trends).
        let db = FakeDb::with_query_results(vec![Ok(vec![SqlRow::new(vec![SqlValue::Null])])]);
        let mgr = manager(db);
        let metrics = [RetainedMetric {
            metric: Metric::new(1, ValueType::UInt64),
            history: "1d".into(),
            trends: "7d".into(),
        }];
        let now = 1_700_000_000;
        assert_eq!(mgr.min_clock_at(&metrics, now).await, now - 7 * 86_400);
    }

    #[tokio::test]
    async fn min_clock_fallback_never_goes_negative() {
        let mgr = manager(FakeDb::default());
        let metrics = [RetainedMetric {
            metric: float_metric(1),
            history: "365d".into(),
            trends: "0".into(),
        }];
        assert_eq!(mgr.min_clock_at(&metrics, 3_600).await, 0);
    }

    #[tokio::test]
    async fn min_clock_falls_back_to_a_year_without_numeric_metrics() {
        let mgr = manager(FakeDb::default());
        let metrics = [RetainedMetric {
            metric: Metric::new(1, ValueType::Log),
            history: "{$KEEP_PERIOD}".into(),
            trends: String::new(),
        }];
        let now = 1_700_000_000;
        assert_eq!(mgr.min_clock_at(&metrics, now).await, now - 365 * 86_400);
    }

    #[tokio::test]
    async fn min_clock_never_exceeds_now() {
        let db = FakeDb::with_query_results(vec![Ok(vec![SqlRow::new(vec![SqlValue::Int(
            2_000_000_000,
        )])])]);
        let mgr = manager(db);
        let metrics = [RetainedMetric {
            metric: Metric::new(1, ValueType::Str),
            history: "31d".into(),
            trends: String::new(),
        }];
        assert_eq!(mgr.min_clock_at(&metrics, 1_700_000_000).await, 1_700_000_000);
    }

    #[tokio::test]
    async fn delete_history_targets_all_seven_tables() {
        let mgr = manager(FakeDb::default());
        assert!(mgr.delete_history(&[4, 8]).await);
        let statements = mgr.db.executes.lock().unwrap().clone();
        assert_eq!(statements.len(), 7);
        for table in crate::relational::ALL_TABLES {
            assert!(statements
                .iter()
                .any(|sql| sql.starts_with(&format!("DELETE FROM {table} "))));
        }
    }

    #[tokio::test]
    async fn delete_history_attempts_every_table_despite_failures() {
        let db = FakeDb {
            execute_results: Mutex::new(
                vec![
                    Ok(()),
                    Err(HistoryError::Sql("gone away".into())),
                    Ok(()),
                    Ok(()),
                    Ok(()),
                    Ok(()),
                    Ok(()),
                ]
                .into(),
            ),
            ..FakeDb::default()
        };
        let mgr = manager(db);
        assert!(!mgr.delete_history(&[4]).await);
        assert_eq!(mgr.db.executes.lock().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn failed_relational_delete_skips_the_document_store() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let db = FakeDb {
            execute_results: Mutex::new(vec![Err(HistoryError::Sql("gone away".into()))].into()),
            ..FakeDb::default()
        };
        let config = HistoryConfig {
            document_types: vec!["uint".into()],
            document_urls: Some(DocumentUrls::Shared(Url::parse(&base).unwrap())),
        };
        let mgr = HistoryManager::new(&config, db);

        assert!(!mgr.delete_history(&[4]).await);
        assert_eq!(mgr.db.executes.lock().unwrap().len(), 7);
        // No connection was ever attempted against the document endpoint.
        let pending = listener.accept();
        assert!(
            matches!(pending, Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock),
            "document store was contacted after a relational failure"
        );
    }

    #[tokio::test]
    async fn interval_aggregation_groups_rows_by_tick() {
        let row = SqlRow::new(vec![
            SqlValue::UInt(5),
            SqlValue::Int(1_200),
            SqlValue::Float(2.5),
            SqlValue::Int(1_450),
            SqlValue::Int(12),
        ]);
        let db = FakeDb::with_query_results(vec![Ok(vec![row])]);
        let mgr = manager(db);
        let items = [GraphMetric {
            metric: float_metric(5),
            source: GraphSource::History,
        }];
        let results = mgr
            .aggregation_by_interval(&items, 1_000, 2_000, IntervalFunction::Avg, 300)
            .await;
        let series = &results[&5];
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].tick, 1_200);
        assert_eq!(series[0].count, 12);
        assert!(mgr.db.queries()[0].contains("clock-MOD(clock,300)"));
    }

    #[tokio::test]
    async fn interval_count_series_cover_empty_windows() {
        let mgr = manager(FakeDb::default());
        let items = [GraphMetric {
            metric: float_metric(5),
            source: GraphSource::History,
        }];
        let results = mgr
            .aggregation_by_interval(&items, 0, 900, IntervalFunction::Count, 300)
            .await;
        let series = &results[&5];
        assert_eq!(series.len(), 4);
        assert!(series.iter().all(|row| row.value == 0.0 && row.count == 0));
    }

    #[tokio::test]
    async fn interval_aggregation_skips_non_numeric_metrics() {
        let mgr = manager(FakeDb::default());
        let items = [GraphMetric {
            metric: Metric::new(7, ValueType::Text),
            source: GraphSource::History,
        }];
        let results = mgr
            .aggregation_by_interval(&items, 0, 900, IntervalFunction::Last, 300)
            .await;
        assert!(results.is_empty());
        assert!(mgr.db.queries().is_empty());
    }

    #[tokio::test]
    async fn interval_aggregation_rejects_a_bad_interval() {
        let mgr = manager(FakeDb::default());
        let items = [GraphMetric {
            metric: float_metric(5),
            source: GraphSource::History,
        }];
        let results = mgr
            .aggregation_by_interval(&items, 0, 900, IntervalFunction::Min, 0)
            .await;
        assert!(results.is_empty());
        assert!(mgr.db.queries().is_empty());
    }

    #[tokio::test]
    async fn deleting_nothing_succeeds_without_statements() {
        let mgr = manager(FakeDb::default());
        assert!(mgr.delete_history(&[]).await);
        assert!(mgr.db.executes.lock().unwrap().is_empty());
    }
}
