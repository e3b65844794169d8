//! Observability proxy client.
//!
//! The proxy fronts Prometheus under its own base URL. It is authenticated
//! with a static API key header rather than the bearer credential, so its
//! requests skip credential attachment and 401 replay. Prometheus answers are
//! mapped onto the same [`TimeseriesResponse`] and [`ScalarMetric`] shapes the
//! main API returns.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::api::client::join_url;
use crate::api::{ApiClient, ApiError, RequestDescriptor};
use crate::models::{ScalarMetric, TimeseriesPoint, TimeseriesResponse, TimeseriesSeries};

/// Header carrying the proxy API key.
pub const OBS_API_KEY_HEADER: &str = "x-obs-api-key";

pub const PROM_RANGE_PATH: &str = "/obs/prom/range";
pub const PROM_QUERY_PATH: &str = "/obs/prom/query";

pub const RPS_QUERY: &str = "sum(rate(http_requests_total[1m]))";
pub const ERROR_RATE_QUERY: &str =
    "sum(rate(http_requests_total{status=~\"4..|5..\"}[5m])) / sum(rate(http_requests_total[5m]))";
pub const LOSS_QUERY: &str = "avg_over_time(ml_training_loss[5m])";

/// Request-latency quantile over the last five minutes.
pub fn latency_query(percentile: u8) -> String {
    format!(
        "histogram_quantile({}, sum(rate(http_request_duration_seconds_bucket[5m])) by (le))",
        f64::from(percentile) / 100.0
    )
}

/// `[start, end]` in unix seconds plus the query step for a named range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub start: i64,
    pub end: i64,
    pub step: &'static str,
}

impl RangeWindow {
    /// Unknown ranges get the 24h window.
    pub fn ending_at(range: &str, end: DateTime<Utc>) -> Self {
        let (seconds, step) = match range {
            "2h" => (2 * 3600, "30s"),
            "7d" => (7 * 24 * 3600, "1h"),
            "30d" => (30 * 24 * 3600, "2h"),
            _ => (24 * 3600, "2m"),
        };
        let end = end.timestamp();
        Self {
            start: end - seconds,
            end,
            step,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PromResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: Option<PromData>,
}

#[derive(Debug, Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromResult>,
}

#[derive(Debug, Deserialize)]
struct PromResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<(Value, String)>,
    #[serde(default)]
    value: Option<(Value, String)>,
}

/// Successful result vectors only; anything else reads as no data.
fn prom_results(body: &Value) -> Vec<PromResult> {
    match serde_json::from_value::<PromResponse>(body.clone()) {
        Ok(PromResponse {
            status,
            data: Some(data),
        }) if status == "success" => data.result,
        Ok(_) => Vec::new(),
        Err(e) => {
            debug!(error = %e, "Unrecognized Prometheus response");
            Vec::new()
        }
    }
}

fn timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    let seconds = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
}

/// Map a range-query answer to series, one per result vector.
///
/// Series are named by `__name__`, falling back to `fallback_metric`. Samples
/// with an unreadable timestamp or value are skipped.
pub fn timeseries_from_prom(body: &Value, fallback_metric: &str) -> TimeseriesResponse {
    let series = prom_results(body)
        .into_iter()
        .map(|result| {
            let metric = result
                .metric
                .get("__name__")
                .cloned()
                .unwrap_or_else(|| fallback_metric.to_string());
            let points = result
                .values
                .iter()
                .filter_map(|(ts, value)| {
                    Some(TimeseriesPoint {
                        ts: timestamp(ts)?,
                        value: value.parse().ok()?,
                    })
                })
                .collect();
            TimeseriesSeries {
                metric,
                points,
                unit: None,
            }
        })
        .collect();
    TimeseriesResponse {
        series,
        range: None,
    }
}

/// First sample of an instant-query answer; 0 when absent or not finite.
pub fn scalar_from_prom(body: &Value) -> ScalarMetric {
    let value = prom_results(body)
        .into_iter()
        .next()
        .and_then(|result| result.value)
        .and_then(|(_, raw)| raw.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);
    ScalarMetric {
        value,
        unit: None,
        at: None,
    }
}

/// Where the proxy lives and how to authenticate to it.
#[derive(Debug, Clone)]
pub struct ObsProxy {
    base_url: String,
    api_key: Option<String>,
}

impl ObsProxy {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, path: &str) -> RequestDescriptor {
        let request = RequestDescriptor::get(join_url(&self.base_url, path)).skip_auth();
        match &self.api_key {
            Some(key) => request.header(OBS_API_KEY_HEADER, key.as_str()),
            None => request,
        }
    }

    pub fn range_request(&self, query: &str, window: RangeWindow) -> RequestDescriptor {
        self.request(PROM_RANGE_PATH)
            .query("query", query)
            .query("start", window.start.to_string())
            .query("end", window.end.to_string())
            .query("step", window.step)
    }

    pub fn instant_request(&self, query: &str) -> RequestDescriptor {
        self.request(PROM_QUERY_PATH).query("query", query)
    }

    /// Range query over the window named by `range`, ending now.
    pub async fn range(
        &self,
        client: &ApiClient,
        query: &str,
        range: &str,
        fallback_metric: &str,
    ) -> Result<TimeseriesResponse, ApiError> {
        let window = RangeWindow::ending_at(range, Utc::now());
        let body: Value = client.get_json(self.range_request(query, window)).await?;
        let mut response = timeseries_from_prom(&body, fallback_metric);
        response.range = Some(range.to_string());
        Ok(response)
    }

    pub async fn instant(&self, client: &ApiClient, query: &str) -> Result<ScalarMetric, ApiError> {
        let body: Value = client.get_json(self.instant_request(query)).await?;
        Ok(scalar_from_prom(&body))
    }
}
