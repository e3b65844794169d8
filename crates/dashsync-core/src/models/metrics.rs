use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::downsample;

/// A single-valued tile (latency percentile, throughput, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarMetric {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub ts: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesSeries {
    pub metric: String,
    #[serde(default)]
    pub points: Vec<TimeseriesPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl TimeseriesSeries {
    /// First and last timestamp, if the series has points.
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.ts, last.ts)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeseriesResponse {
    #[serde(default)]
    pub series: Vec<TimeseriesSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl TimeseriesResponse {
    /// Total points across all series.
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }

    /// Largest single series, the quantity bounded by downsampling.
    pub fn max_series_len(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).max().unwrap_or(0)
    }

    /// Reduce every series to at most `max_points` points.
    pub fn downsampled(mut self, max_points: usize) -> Self {
        for series in &mut self.series {
            if series.points.len() > max_points {
                series.points = downsample(&series.points, max_points);
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Ok,
    Warn,
    Crit,
}

impl HealthStatus {
    /// Unknown status strings read as healthy, as the health endpoint only
    /// reports the three levels.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" | "warning" => HealthStatus::Warn,
            "crit" | "critical" => HealthStatus::Crit,
            _ => HealthStatus::Ok,
        }
    }
}

/// Aggregate system health for the status tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthAggregate {
    pub status: HealthStatus,
    pub ok: u32,
    pub warn: u32,
    pub crit: u32,
}

impl HealthAggregate {
    /// Expand a single health status into the aggregate counters.
    pub fn from_status(status: HealthStatus) -> Self {
        Self {
            status,
            ok: u32::from(status == HealthStatus::Ok),
            warn: u32::from(status == HealthStatus::Warn),
            crit: u32::from(status == HealthStatus::Crit),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn series(n: usize) -> TimeseriesSeries {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        TimeseriesSeries {
            metric: "rps".to_string(),
            points: (0..n)
                .map(|i| TimeseriesPoint {
                    ts: start + Duration::seconds(i as i64),
                    value: i as f64,
                })
                .collect(),
            unit: None,
        }
    }

    #[test]
    fn test_parse_timeseries_response() {
        let json = r#"{"series":[{"metric":"loss","points":[{"ts":"2026-01-01T00:00:00Z","value":0.5}]}],"range":"7d"}"#;
        let parsed: TimeseriesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.range.as_deref(), Some("7d"));
        assert_eq!(parsed.point_count(), 1);
        assert_eq!(parsed.series[0].points[0].value, 0.5);
    }

    #[test]
    fn test_downsampled_bounds_each_series_and_keeps_span() {
        let original = series(10_000);
        let span = original.span();
        let response = TimeseriesResponse {
            series: vec![original, series(10)],
            range: None,
        }
        .downsampled(2000);

        assert!(response.series[0].points.len() <= 2000);
        assert_eq!(response.series[0].span(), span);
        assert_eq!(response.series[0].points[0].value, 0.0);
        // Short series are untouched
        assert_eq!(response.series[1].points.len(), 10);
        assert!(response.max_series_len() <= 2000);
    }

    #[test]
    fn test_health_from_status() {
        let agg = HealthAggregate::from_status(HealthStatus::parse("warn"));
        assert_eq!(agg, HealthAggregate { status: HealthStatus::Warn, ok: 0, warn: 1, crit: 0 });
        assert_eq!(HealthStatus::parse("CRIT"), HealthStatus::Crit);
        assert_eq!(HealthStatus::parse("anything"), HealthStatus::Ok);
    }

    #[test]
    fn test_scalar_metric_optional_fields() {
        let m: ScalarMetric = serde_json::from_str(r#"{"value": 12.5}"#).unwrap();
        assert_eq!(m.value, 12.5);
        assert!(m.unit.is_none());
        assert_eq!(serde_json::to_string(&m).unwrap(), r#"{"value":12.5}"#);
    }
}
