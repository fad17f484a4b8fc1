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

use crate::types::{GraphSource, RetainedMetric};

const SEC_PER_YEAR: i64 = 365 * 86_400;

/// Converts a duration expression such as `7d` or `90m` into seconds. A bare
/// number is seconds. Templated or otherwise unparseable expressions yield
/// `None` and simply do not contribute to retention maxima.
pub fn time_unit_to_seconds(expr: &str) -> Option<i64> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }
    let (digits, multiplier) = match expr.as_bytes()[expr.len() - 1] {
        b's' => (&expr[..expr.len() - 1], 1),
        b'm' => (&expr[..expr.len() - 1], 60),
        b'h' => (&expr[..expr.len() - 1], 3_600),
        b'd' => (&expr[..expr.len() - 1], 86_400),
        b'w' => (&expr[..expr.len() - 1], 604_800),
        _ => (expr, 1),
    };
    let value: i64 = digits.parse().ok()?;
    value.checked_mul(multiplier)
}

/// The widest history and trend retention across a set of metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetentionWindow {
    pub history: i64,
    pub trends: i64,
    pub has_numeric: bool,
}

impl RetentionWindow {
    /// The tier assumed to hold the oldest data.
    pub fn source(&self) -> GraphSource {
        if self.trends > self.history {
            GraphSource::Trends
        } else {
            GraphSource::History
        }
    }

    /// Minimum-clock substitute when the stores report no usable minimum.
    /// Always plausible and non-zero; never negative for oversized
    /// retention windows.
    pub fn fallback_min_clock(&self, now: i64) -> i64 {
        if self.has_numeric {
            (now - self.history.max(self.trends)).max(0)
        } else {
            now - SEC_PER_YEAR
        }
    }
}

/// Folds retention expressions across metrics. Trend expressions only count
/// for numeric metrics; other value types have no trend tier.
pub fn retention_window(metrics: &[RetainedMetric]) -> RetentionWindow {
    let mut window = RetentionWindow::default();
    for metric in metrics {
        if let Some(seconds) = time_unit_to_seconds(&metric.history) {
            window.history = window.history.max(seconds);
        }
        if metric.metric.value_type.is_numeric() {
            window.has_numeric = true;
            if let Some(seconds) = time_unit_to_seconds(&metric.trends) {
                window.trends = window.trends.max(seconds);
            }
        }
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metric, ValueType};

    fn retained(value_type: ValueType, history: &str, trends: &str) -> RetainedMetric {
        RetainedMetric {
            metric: Metric::new(1, value_type),
            history: history.to_string(),
            trends: trends.to_string(),
        }
    }

    #[test]
    fn parses_suffixed_durations() {
        assert_eq!(time_unit_to_seconds("7d"), Some(604_800));
        assert_eq!(time_unit_to_seconds("2h"), Some(7_200));
        assert_eq!(time_unit_to_seconds("90m"), Some(5_400));
        assert_eq!(time_unit_to_seconds("1w"), Some(604_800));
        assert_eq!(time_unit_to_seconds("30s"), Some(30));
        assert_eq!(time_unit_to_seconds("3600"), Some(3_600));
    }

    #[test]
    fn templated_expressions_do_not_contribute() {
        assert_eq!(time_unit_to_seconds("{$HISTORY_PERIOD}"), None);
        assert_eq!(time_unit_to_seconds(""), None);
        assert_eq!(time_unit_to_seconds("d"), None);
    }

    #[test]
    fn window_tracks_maxima_and_numeric_presence() {
        let window = retention_window(&[
            retained(ValueType::Float, "7d", "365d"),
            retained(ValueType::UInt64, "14d", "90d"),
            retained(ValueType::Text, "31d", "365d"),
        ]);
        assert_eq!(window.history, 31 * 86_400);
        // The text metric's trend expression must be ignored.
        assert_eq!(window.trends, 365 * 86_400);
        assert!(window.has_numeric);
        assert_eq!(window.source(), GraphSource::Trends);
    }

    #[test]
    fn history_wins_source_ties() {
        let window = retention_window(&[retained(ValueType::Float, "7d", "7d")]);
        assert_eq!(window.source(), GraphSource::History);
    }

    #[test]
    fn numeric_fallback_is_clamped_to_zero() {
        let window = retention_window(&[retained(ValueType::UInt64, "1d", "7d")]);
        assert_eq!(window.fallback_min_clock(1_000_000), 1_000_000 - 604_800);
        // Retention wider than "now since epoch" must not go negative.
        assert_eq!(window.fallback_min_clock(3_600), 0);
    }

    #[test]
    fn non_numeric_fallback_is_one_year() {
        let window = retention_window(&[retained(ValueType::Log, "{$KEEP}", "")]);
        assert!(!window.has_numeric);
        let now = 1_700_000_000;
        assert_eq!(window.fallback_min_clock(now), now - 365 * 86_400);
    }
}
