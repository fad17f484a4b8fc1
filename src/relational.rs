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

use std::collections::{BTreeMap, HashMap, HashSet};

use log::warn;

use crate::{
    bucket::BucketSpec,
    error::HistoryError,
    sql::{ids_condition, SqlExecutor, SqlRow},
    types::{
        Aggregation, Bucket, GraphMetric, GraphSource, HistoryPoint, HistoryValue,
        IntervalFunction, IntervalValue, Metric, ValueType,
    },
};

/// Every table a metric may have left rows in over its lifetime: the five
/// raw history tables plus both trend tiers. Deletion targets all of them
/// because a metric's value type may have changed since ingestion.
pub(crate) const ALL_TABLES: [&str; 7] = [
    "history",
    "history_uint",
    "history_str",
    "history_log",
    "history_text",
    "trends",
    "trends_uint",
];

/// Adapter translating the history operations into textual SQL against the
/// relational store.
pub struct RelationalAdapter<'a, S> {
    db: &'a S,
}

impl<'a, S: SqlExecutor> RelationalAdapter<'a, S> {
    pub fn new(db: &'a S) -> Self {
        Self { db }
    }

    /// Up to `limit` newest points per metric, newest first. Metrics without
    /// matching points are absent from the map.
    pub async fn last_values(
        &self,
        metrics: &[&Metric],
        limit: usize,
        period_from: Option<i64>,
    ) -> Result<HashMap<u64, Vec<HistoryPoint>>, HistoryError> {
        let mut results = HashMap::new();
        for metric in metrics {
            let sql = last_values_sql(metric, limit, period_from);
            let rows = self.db.query(&sql).await?;
            let mut points = Vec::with_capacity(rows.len());
            for row in &rows {
                points.push(history_point_from_row(metric, row)?);
            }
            if !points.is_empty() {
                results.insert(metric.id, points);
            }
        }
        Ok(results)
    }

    /// Ids of metrics that have at least one point, optionally within the
    /// period starting at `period_from`.
    pub async fn items_having_values(
        &self,
        groups: &BTreeMap<ValueType, Vec<u64>>,
        period_from: Option<i64>,
    ) -> Result<HashSet<u64>, HistoryError> {
        let mut found = HashSet::new();
        for (value_type, ids) in groups {
            let sql = having_values_sql(*value_type, ids, period_from);
            for row in self.db.query(&sql).await? {
                if let Some(id) = row.get(0).and_then(|cell| cell.as_u64()) {
                    found.insert(id);
                }
            }
        }
        Ok(found)
    }

    /// The value visible at or immediately before `(clock, ns)`. Two bounded
    /// queries, in order: same clock with a nanosecond at or below the given
    /// one, then the latest point of any earlier clock.
    pub async fn value_at(
        &self,
        metric: &Metric,
        clock: i64,
        ns: i32,
    ) -> Result<Option<HistoryPoint>, HistoryError> {
        let same_clock = value_at_same_clock_sql(metric, clock, ns);
        if let Some(row) = self.db.query(&same_clock).await?.first() {
            return Ok(Some(history_point_from_row(metric, row)?));
        }

        let earlier = value_at_earlier_clock_sql(metric, clock);
        match self.db.query(&earlier).await?.first() {
            Some(row) => Ok(Some(history_point_from_row(metric, row)?)),
            None => Ok(None),
        }
    }

    /// Per-bucket count/min/avg/max/latest-clock for each metric, read from
    /// the tier the caller tagged the metric with. Without a `spec` the
    /// whole window collapses into one bucket per metric.
    pub async fn graph_aggregate(
        &self,
        items: &[&GraphMetric],
        time_from: i64,
        time_to: i64,
        spec: Option<BucketSpec>,
    ) -> Result<HashMap<u64, Vec<Bucket>>, HistoryError> {
        let mut results: HashMap<u64, Vec<Bucket>> = HashMap::new();
        for item in items {
            let sql = graph_sql(item, time_from, time_to, spec.as_ref());
            for row in self.db.query(&sql).await? {
                let bucket = bucket_from_row(&row, spec.is_some())?;
                results.entry(bucket.metric_id).or_default().push(bucket);
            }
        }
        Ok(results)
    }

    /// Per-interval aggregated series over `[time_from, time_to]`, one per
    /// metric, read from the tier the caller tagged the metric with.
    /// `Count` series are dense: intervals without points get zero-valued
    /// rows. Other functions return sparse series.
    pub async fn aggregation_by_interval(
        &self,
        items: &[&GraphMetric],
        time_from: i64,
        time_to: i64,
        function: IntervalFunction,
        interval: i64,
    ) -> Result<HashMap<u64, Vec<IntervalValue>>, HistoryError> {
        let mut results: HashMap<u64, Vec<IntervalValue>> = HashMap::new();
        for item in items {
            let sql = interval_sql(item, time_from, time_to, function, interval);
            for row in self.db.query(&sql).await? {
                let value = interval_value_from_row(&row, function)?;
                results.entry(value.metric_id).or_default().push(value);
            }
            if function == IntervalFunction::Count {
                fill_empty_count_intervals(
                    results.entry(item.metric.id).or_default(),
                    item.metric.id,
                    time_from,
                    time_to,
                    interval,
                );
            }
        }
        Ok(results)
    }

    /// Scalar aggregate over all points after `time_from`, or `None` when no
    /// points match. The row count is selected alongside the aggregate so an
    /// empty window never leaks an engine-specific placeholder.
    pub async fn aggregated_value(
        &self,
        metric: &Metric,
        aggregation: Aggregation,
        time_from: i64,
    ) -> Result<Option<f64>, HistoryError> {
        let sql = aggregated_value_sql(metric, aggregation, time_from);
        let rows = self.db.query(&sql).await?;
        let row = match rows.first() {
            Some(row) => row,
            None => return Ok(None),
        };
        let count = row.get(0).and_then(|cell| cell.as_u64()).unwrap_or(0);
        if count == 0 {
            return Ok(None);
        }
        Ok(row.get(1).and_then(|cell| cell.as_f64()))
    }

    /// Earliest clock among `ids` in `table`. Zero and negative clocks are
    /// treated as corrupted and reported as absent.
    pub async fn min_clock(&self, table: &str, ids: &[u64]) -> Result<Option<i64>, HistoryError> {
        let sql = min_clock_sql(table, ids);
        let min = self
            .db
            .query(&sql)
            .await?
            .first()
            .and_then(|row| row.get(0))
            .and_then(|cell| cell.as_i64());
        Ok(min.filter(|clock| *clock > 0))
    }

    /// Deletes `ids` from every history and trend table. All statements are
    /// attempted even after a failure; the result is true only when every
    /// statement succeeded.
    pub async fn delete_history(&self, ids: &[u64]) -> bool {
        let mut ok = true;
        for table in ALL_TABLES {
            let sql = delete_sql(table, ids);
            if let Err(err) = self.db.execute(&sql).await {
                warn!("history delete from {table} failed: {err}");
                ok = false;
            }
        }
        ok
    }
}

fn last_values_sql(metric: &Metric, limit: usize, period_from: Option<i64>) -> String {
    format!(
        "SELECT clock,ns,value FROM {table} WHERE itemid={id}{period} ORDER BY clock DESC,ns DESC LIMIT {limit}",
        table = metric.value_type.history_table(),
        id = metric.id,
        period = period_condition(period_from),
    )
}

fn having_values_sql(value_type: ValueType, ids: &[u64], period_from: Option<i64>) -> String {
    format!(
        "SELECT DISTINCT itemid FROM {table} WHERE {cond}{period}",
        table = value_type.history_table(),
        cond = ids_condition(ids),
        period = period_condition(period_from),
    )
}

fn value_at_same_clock_sql(metric: &Metric, clock: i64, ns: i32) -> String {
    format!(
        "SELECT clock,ns,value FROM {table} WHERE itemid={id} AND clock={clock} AND ns<={ns} ORDER BY ns DESC LIMIT 1",
        table = metric.value_type.history_table(),
        id = metric.id,
    )
}

fn value_at_earlier_clock_sql(metric: &Metric, clock: i64) -> String {
    format!(
        "SELECT clock,ns,value FROM {table} WHERE itemid={id} AND clock<{clock} ORDER BY clock DESC,ns DESC LIMIT 1",
        table = metric.value_type.history_table(),
        id = metric.id,
    )
}

/// The shared bucketing arithmetic rendered as SQL. `FLOOR` keeps the result
/// identical across engines that differ on integer division.
fn bucket_expr(spec: &BucketSpec) -> String {
    format!(
        "FLOOR({width}*MOD(clock+{delta},{size})/{size})",
        width = spec.width,
        delta = spec.delta,
        size = spec.size,
    )
}

/// Trend table for metrics tagged with the trend tier, or `None` when the
/// raw history table must be read instead. Non-numeric metrics have no
/// trend tier, so a `Trends` tag on one falls back to raw history, columns
/// included.
fn source_trend_table(item: &GraphMetric) -> Option<&'static str> {
    match item.source {
        GraphSource::Trends => item.metric.value_type.trend_table(),
        GraphSource::History => None,
    }
}

fn graph_sql(item: &GraphMetric, time_from: i64, time_to: i64, spec: Option<&BucketSpec>) -> String {
    let (table, columns) = match source_trend_table(item) {
        Some(table) => (
            table,
            "SUM(num) AS num,MIN(value_min) AS value_min,AVG(value_avg) AS value_avg,MAX(value_max) AS value_max",
        ),
        None => (
            item.metric.value_type.history_table(),
            "COUNT(*) AS num,MIN(value) AS value_min,AVG(value) AS value_avg,MAX(value) AS value_max",
        ),
    };

    let (select_extra, group_extra) = match spec {
        Some(spec) => {
            let expr = bucket_expr(spec);
            (format!(",{expr} AS i"), format!(",{expr}"))
        }
        None => (String::new(), String::new()),
    };

    format!(
        "SELECT itemid,{columns},MAX(clock) AS clock{select_extra} FROM {table} \
         WHERE itemid={id} AND clock>={time_from} AND clock<={time_to} \
         GROUP BY itemid{group_extra}",
        id = item.metric.id,
    )
}

/// Interval start of a clock value, rendered as SQL.
fn interval_expr(interval: i64) -> String {
    format!("clock-MOD(clock,{interval})")
}

fn interval_sql(
    item: &GraphMetric,
    time_from: i64,
    time_to: i64,
    function: IntervalFunction,
    interval: i64,
) -> String {
    let trend_table = source_trend_table(item);
    let (table, columns) = match trend_table {
        Some(table) => (
            table,
            match function {
                IntervalFunction::Min => "MIN(value_min) AS value,MAX(clock) AS clock",
                IntervalFunction::Max => "MAX(value_max) AS value,MAX(clock) AS clock",
                IntervalFunction::Avg => "AVG(value_avg) AS value,MAX(clock) AS clock,SUM(num) AS num",
                IntervalFunction::Count => "SUM(num) AS value,MAX(clock) AS clock",
                IntervalFunction::Sum => "SUM(value_avg*num) AS value,MAX(clock) AS clock",
                IntervalFunction::First => "MIN(clock) AS clock",
                IntervalFunction::Last => "MAX(clock) AS clock",
            },
        ),
        None => (
            item.metric.value_type.history_table(),
            match function {
                IntervalFunction::Min => "MIN(value) AS value,MAX(clock) AS clock",
                IntervalFunction::Max => "MAX(value) AS value,MAX(clock) AS clock",
                IntervalFunction::Avg => "AVG(value) AS value,MAX(clock) AS clock,COUNT(*) AS num",
                IntervalFunction::Count => "COUNT(*) AS value,MAX(clock) AS clock",
                IntervalFunction::Sum => "SUM(value) AS value,MAX(clock) AS clock",
                IntervalFunction::First => "MIN(clock) AS clock",
                IntervalFunction::Last => "MAX(clock) AS clock",
            },
        ),
    };

    let expr = interval_expr(interval);
    let base = format!(
        "SELECT itemid,{expr} AS tick,{columns} FROM {table} \
         WHERE itemid={id} AND clock>={time_from} AND clock<={time_to} \
         GROUP BY itemid,{expr}",
        id = item.metric.id,
    );

    // First/Last need the stored point itself, so the grouped query becomes
    // a subquery joined back against the table on the picked clock.
    match function {
        IntervalFunction::First | IntervalFunction::Last if trend_table.is_some() => format!(
            "SELECT DISTINCT h.itemid,h.value_avg AS value,h.clock,0 AS ns,s.tick \
             FROM {table} h JOIN ({base}) s ON h.itemid=s.itemid AND h.clock=s.clock"
        ),
        IntervalFunction::First | IntervalFunction::Last => {
            let pick = if function == IntervalFunction::First {
                "MIN"
            } else {
                "MAX"
            };
            format!(
                "SELECT h.itemid,h.value,h.clock,h.ns,s.tick FROM {table} h JOIN (\
                 SELECT h2.itemid,h2.clock,{pick}(h2.ns) AS ns,s2.tick FROM {table} h2 \
                 JOIN ({base}) s2 ON h2.itemid=s2.itemid AND h2.clock=s2.clock \
                 GROUP BY h2.itemid,h2.clock,s2.tick\
                 ) s ON h.itemid=s.itemid AND h.clock=s.clock AND h.ns=s.ns"
            )
        }
        _ => base,
    }
}

fn aggregated_value_sql(metric: &Metric, aggregation: Aggregation, time_from: i64) -> String {
    format!(
        "SELECT COUNT(*) AS num,{agg}(value) AS value FROM {table} WHERE itemid={id} AND clock>{time_from}",
        agg = aggregation.sql_name(),
        table = metric.value_type.history_table(),
        id = metric.id,
    )
}

fn min_clock_sql(table: &str, ids: &[u64]) -> String {
    format!(
        "SELECT MIN(clock) AS clock FROM {table} WHERE {cond}",
        cond = ids_condition(ids),
    )
}

fn delete_sql(table: &str, ids: &[u64]) -> String {
    format!(
        "DELETE FROM {table} WHERE {cond}",
        cond = ids_condition(ids),
    )
}

fn period_condition(period_from: Option<i64>) -> String {
    match period_from {
        Some(clock) => format!(" AND clock>{clock}"),
        None => String::new(),
    }
}

/// Parses a `clock,ns,value` row, typing the value per the metric.
fn history_point_from_row(metric: &Metric, row: &SqlRow) -> Result<HistoryPoint, HistoryError> {
    let clock = cell_i64(row, 0, "clock")?;
    let ns = cell_i64(row, 1, "ns")? as i32;
    let raw = row
        .get(2)
        .ok_or_else(|| HistoryError::Sql("history row is missing the value column".into()))?;

    let value = match metric.value_type {
        ValueType::Float => HistoryValue::Float(
            raw.as_f64()
                .ok_or_else(|| HistoryError::Sql("history value is not a float".into()))?,
        ),
        ValueType::UInt64 => HistoryValue::UInt(
            raw.as_u64()
                .ok_or_else(|| HistoryError::Sql("history value is not an unsigned int".into()))?,
        ),
        ValueType::Str | ValueType::Log | ValueType::Text => HistoryValue::Text(
            raw.as_text()
                .ok_or_else(|| HistoryError::Sql("history value is not text".into()))?,
        ),
    };

    Ok(HistoryPoint {
        metric_id: metric.id,
        clock,
        ns,
        value,
    })
}

/// Parses a graph aggregation row: `itemid,num,min,avg,max,clock` plus the
/// bucket index when the query was pixel-bucketed.
fn bucket_from_row(row: &SqlRow, with_index: bool) -> Result<Bucket, HistoryError> {
    let metric_id = row
        .get(0)
        .and_then(|cell| cell.as_u64())
        .ok_or_else(|| HistoryError::Sql("aggregation row is missing itemid".into()))?;
    let count = row.get(1).and_then(|cell| cell.as_u64()).unwrap_or(0);
    let min = cell_f64(row, 2, "min")?;
    let avg = cell_f64(row, 3, "avg")?;
    let max = cell_f64(row, 4, "max")?;
    let clock = cell_i64(row, 5, "clock")?;
    let index = if with_index {
        Some(cell_i64(row, 6, "bucket index")?)
    } else {
        None
    };

    Ok(Bucket {
        metric_id,
        index,
        count,
        min,
        avg,
        max,
        clock,
    })
}

/// Parses a per-interval aggregation row. `First`/`Last` rows come from the
/// joined point query (`itemid,value,clock,ns,tick`); everything else from
/// the grouped query (`itemid,tick,value,clock[,num]`).
fn interval_value_from_row(
    row: &SqlRow,
    function: IntervalFunction,
) -> Result<IntervalValue, HistoryError> {
    let metric_id = row
        .get(0)
        .and_then(|cell| cell.as_u64())
        .ok_or_else(|| HistoryError::Sql("interval row is missing itemid".into()))?;

    match function {
        IntervalFunction::First | IntervalFunction::Last => Ok(IntervalValue {
            metric_id,
            value: cell_f64(row, 1, "value")?,
            clock: cell_i64(row, 2, "clock")?,
            ns: cell_i64(row, 3, "ns")? as i32,
            tick: cell_i64(row, 4, "tick")?,
            count: 0,
        }),
        _ => {
            let tick = cell_i64(row, 1, "tick")?;
            let value = cell_f64(row, 2, "value")?;
            let clock = cell_i64(row, 3, "clock")?;
            let count = match function {
                IntervalFunction::Avg => row.get(4).and_then(|cell| cell.as_u64()).unwrap_or(0),
                IntervalFunction::Count => value as u64,
                _ => 0,
            };
            Ok(IntervalValue {
                metric_id,
                tick,
                value,
                count,
                clock,
                ns: 0,
            })
        }
    }
}

/// Pads a `Count` series with zero-valued rows for every interval of the
/// window that has no stored points.
fn fill_empty_count_intervals(
    series: &mut Vec<IntervalValue>,
    metric_id: u64,
    time_from: i64,
    time_to: i64,
    interval: i64,
) {
    let present: HashSet<i64> = series.iter().map(|row| row.tick).collect();
    let mut tick = time_from - time_from.rem_euclid(interval);
    while tick <= time_to {
        if !present.contains(&tick) {
            series.push(IntervalValue {
                metric_id,
                tick,
                value: 0.0,
                count: 0,
                clock: tick,
                ns: 0,
            });
        }
        tick += interval;
    }
}

fn cell_i64(row: &SqlRow, index: usize, what: &str) -> Result<i64, HistoryError> {
    row.get(index)
        .and_then(|cell| cell.as_i64())
        .ok_or_else(|| HistoryError::Sql(format!("aggregation row has no usable {what} column")))
}

fn cell_f64(row: &SqlRow, index: usize, what: &str) -> Result<f64, HistoryError> {
    row.get(index)
        .and_then(|cell| cell.as_f64())
        .ok_or_else(|| HistoryError::Sql(format!("aggregation row has no usable {what} column")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlValue;

    fn float_metric(id: u64) -> Metric {
        Metric::new(id, ValueType::Float)
    }

    #[test]
    fn last_values_query_orders_by_clock_then_ns() {
        let sql = last_values_sql(&float_metric(10), 2, None);
        assert_eq!(
            sql,
            "SELECT clock,ns,value FROM history WHERE itemid=10 ORDER BY clock DESC,ns DESC LIMIT 2"
        );
    }

    #[test]
    fn last_values_query_applies_the_period_bound() {
        let sql = last_values_sql(&Metric::new(7, ValueType::Text), 1, Some(1_600_000_000));
        assert_eq!(
            sql,
            "SELECT clock,ns,value FROM history_text WHERE itemid=7 AND clock>1600000000 \
             ORDER BY clock DESC,ns DESC LIMIT 1"
        );
    }

    #[test]
    fn value_at_queries_follow_the_fallback_chain() {
        let metric = Metric::new(3, ValueType::UInt64);
        assert_eq!(
            value_at_same_clock_sql(&metric, 100, 500),
            "SELECT clock,ns,value FROM history_uint WHERE itemid=3 AND clock=100 AND ns<=500 \
             ORDER BY ns DESC LIMIT 1"
        );
        assert_eq!(
            value_at_earlier_clock_sql(&metric, 100),
            "SELECT clock,ns,value FROM history_uint WHERE itemid=3 AND clock<100 \
             ORDER BY clock DESC,ns DESC LIMIT 1"
        );
    }

    #[test]
    fn graph_query_renders_the_shared_bucket_formula() {
        let item = GraphMetric {
            metric: float_metric(5),
            source: GraphSource::History,
        };
        let spec = BucketSpec::new(100, 200, 10);
        let sql = graph_sql(&item, 100, 200, Some(&spec));
        assert_eq!(
            sql,
            "SELECT itemid,COUNT(*) AS num,MIN(value) AS value_min,AVG(value) AS value_avg,\
             MAX(value) AS value_max,MAX(clock) AS clock,\
             FLOOR(10*MOD(clock+100,100)/100) AS i \
             FROM history WHERE itemid=5 AND clock>=100 AND clock<=200 \
             GROUP BY itemid,FLOOR(10*MOD(clock+100,100)/100)"
        );
    }

    #[test]
    fn graph_query_reads_the_trend_tier_when_tagged() {
        let item = GraphMetric {
            metric: Metric::new(9, ValueType::UInt64),
            source: GraphSource::Trends,
        };
        let sql = graph_sql(&item, 0, 3600, None);
        assert_eq!(
            sql,
            "SELECT itemid,SUM(num) AS num,MIN(value_min) AS value_min,\
             AVG(value_avg) AS value_avg,MAX(value_max) AS value_max,MAX(clock) AS clock \
             FROM trends_uint WHERE itemid=9 AND clock>=0 AND clock<=3600 GROUP BY itemid"
        );
    }

    #[test]
    fn trend_source_on_non_numeric_metrics_reads_raw_history() {
        // Text metrics have no trend tables; the fallback must switch the
        // column list together with the table.
        let item = GraphMetric {
            metric: Metric::new(7, ValueType::Text),
            source: GraphSource::Trends,
        };
        let sql = graph_sql(&item, 0, 3600, None);
        assert_eq!(
            sql,
            "SELECT itemid,COUNT(*) AS num,MIN(value) AS value_min,\
             AVG(value) AS value_avg,MAX(value) AS value_max,MAX(clock) AS clock \
             FROM history_text WHERE itemid=7 AND clock>=0 AND clock<=3600 GROUP BY itemid"
        );
    }

    #[test]
    fn interval_query_groups_by_interval_start() {
        let item = GraphMetric {
            metric: float_metric(5),
            source: GraphSource::History,
        };
        let sql = interval_sql(&item, 1_000, 2_000, IntervalFunction::Avg, 300);
        assert_eq!(
            sql,
            "SELECT itemid,clock-MOD(clock,300) AS tick,\
             AVG(value) AS value,MAX(clock) AS clock,COUNT(*) AS num \
             FROM history WHERE itemid=5 AND clock>=1000 AND clock<=2000 \
             GROUP BY itemid,clock-MOD(clock,300)"
        );
    }

    #[test]
    fn interval_sum_over_trends_weights_by_row_count() {
        let item = GraphMetric {
            metric: Metric::new(9, ValueType::UInt64),
            source: GraphSource::Trends,
        };
        let sql = interval_sql(&item, 0, 3600, IntervalFunction::Sum, 600);
        assert_eq!(
            sql,
            "SELECT itemid,clock-MOD(clock,600) AS tick,\
             SUM(value_avg*num) AS value,MAX(clock) AS clock \
             FROM trends_uint WHERE itemid=9 AND clock>=0 AND clock<=3600 \
             GROUP BY itemid,clock-MOD(clock,600)"
        );
    }

    #[test]
    fn interval_first_joins_back_for_the_stored_point() {
        let item = GraphMetric {
            metric: float_metric(5),
            source: GraphSource::History,
        };
        let sql = interval_sql(&item, 0, 600, IntervalFunction::First, 300);
        assert_eq!(
            sql,
            "SELECT h.itemid,h.value,h.clock,h.ns,s.tick FROM history h JOIN (\
             SELECT h2.itemid,h2.clock,MIN(h2.ns) AS ns,s2.tick FROM history h2 \
             JOIN (SELECT itemid,clock-MOD(clock,300) AS tick,MIN(clock) AS clock \
             FROM history WHERE itemid=5 AND clock>=0 AND clock<=600 \
             GROUP BY itemid,clock-MOD(clock,300)) s2 \
             ON h2.itemid=s2.itemid AND h2.clock=s2.clock \
             GROUP BY h2.itemid,h2.clock,s2.tick\
             ) s ON h.itemid=s.itemid AND h.clock=s.clock AND h.ns=s.ns"
        );
    }

    #[test]
    fn interval_last_over_trends_takes_the_hour_average() {
        let item = GraphMetric {
            metric: Metric::new(9, ValueType::UInt64),
            source: GraphSource::Trends,
        };
        let sql = interval_sql(&item, 0, 7200, IntervalFunction::Last, 3600);
        assert_eq!(
            sql,
            "SELECT DISTINCT h.itemid,h.value_avg AS value,h.clock,0 AS ns,s.tick \
             FROM trends_uint h JOIN (\
             SELECT itemid,clock-MOD(clock,3600) AS tick,MAX(clock) AS clock \
             FROM trends_uint WHERE itemid=9 AND clock>=0 AND clock<=7200 \
             GROUP BY itemid,clock-MOD(clock,3600)) s \
             ON h.itemid=s.itemid AND h.clock=s.clock"
        );
    }

    #[test]
    fn interval_rows_parse_per_function_layout() {
        let avg_row = SqlRow::new(vec![
            SqlValue::UInt(5),
            SqlValue::Int(1_200),
            SqlValue::Float(2.5),
            SqlValue::Int(1_450),
            SqlValue::Int(12),
        ]);
        let value = interval_value_from_row(&avg_row, IntervalFunction::Avg).unwrap();
        assert_eq!(value.tick, 1_200);
        assert_eq!(value.count, 12);
        assert_eq!(value.ns, 0);

        let first_row = SqlRow::new(vec![
            SqlValue::UInt(5),
            SqlValue::Float(1.25),
            SqlValue::Int(1_210),
            SqlValue::Int(40),
            SqlValue::Int(1_200),
        ]);
        let value = interval_value_from_row(&first_row, IntervalFunction::First).unwrap();
        assert_eq!(value.value, 1.25);
        assert_eq!(value.clock, 1_210);
        assert_eq!(value.ns, 40);
        assert_eq!(value.tick, 1_200);
    }

    #[test]
    fn count_series_are_padded_with_empty_intervals() {
        let mut series = vec![IntervalValue {
            metric_id: 5,
            tick: 300,
            value: 4.0,
            count: 4,
            clock: 420,
            ns: 0,
        }];
        fill_empty_count_intervals(&mut series, 5, 100, 900, 300);
        let ticks: Vec<i64> = series.iter().map(|row| row.tick).collect();
        assert_eq!(ticks, vec![300, 0, 600, 900]);
        assert_eq!(series[1].value, 0.0);
        assert_eq!(series[1].clock, 0);
    }

    #[test]
    fn aggregated_value_query_counts_matching_rows() {
        let sql = aggregated_value_sql(&float_metric(2), Aggregation::Avg, 1_500);
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS num,AVG(value) AS value FROM history WHERE itemid=2 AND clock>1500"
        );
    }

    #[test]
    fn delete_statements_cover_all_seven_tables() {
        assert_eq!(ALL_TABLES.len(), 7);
        assert_eq!(
            delete_sql("trends_uint", &[4, 8]),
            "DELETE FROM trends_uint WHERE itemid IN (4,8)"
        );
    }

    #[test]
    fn history_points_are_typed_per_metric() {
        let row = SqlRow::new(vec![
            SqlValue::Int(100),
            SqlValue::Int(5),
            SqlValue::Text("2.25".into()),
        ]);
        let point = history_point_from_row(&float_metric(1), &row).unwrap();
        assert_eq!(point.value, HistoryValue::Float(2.25));

        let point =
            history_point_from_row(&Metric::new(1, ValueType::Log), &row).unwrap();
        assert_eq!(point.value, HistoryValue::Text("2.25".into()));
    }

    #[test]
    fn bucket_rows_parse_with_and_without_an_index() {
        let row = SqlRow::new(vec![
            SqlValue::UInt(5),
            SqlValue::Int(12),
            SqlValue::Float(0.5),
            SqlValue::Float(1.5),
            SqlValue::Float(3.0),
            SqlValue::Int(190),
            SqlValue::Int(7),
        ]);
        let bucket = bucket_from_row(&row, true).unwrap();
        assert_eq!(bucket.index, Some(7));
        assert_eq!(bucket.count, 12);
        assert_eq!(bucket.clock, 190);

        let row = SqlRow::new(vec![
            SqlValue::UInt(5),
            SqlValue::Int(12),
            SqlValue::Float(0.5),
            SqlValue::Float(1.5),
            SqlValue::Float(3.0),
            SqlValue::Int(190),
        ]);
        assert_eq!(bucket_from_row(&row, false).unwrap().index, None);
    }
}
