//! The dashboard context: one client, one credential slot, the caches, and
//! the poller, created together and handed to whoever renders them.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError, FailureBus, HttpTransport, ReqwestTransport, RequestDescriptor};
use crate::auth::{CredentialManager, FileTokenStore, TokenStore, TransportTokenSource};
use crate::cache::{CacheKey, CacheStore, SeriesStore};
use crate::config::Config;
use crate::models::{HealthAggregate, HealthStatus, ScalarMetric, TimeseriesResponse};
use crate::obs::{self, ObsProxy};
use crate::poll::{PollTask, Poller};

pub const HEALTH_PATH: &str = "/v1/health";
pub const METRICS_PATH: &str = "/v1/metrics";

/// Poll key of the declared health target.
pub const HEALTH_TARGET: &str = "metrics.health";
/// Poll key of the declared request-rate target.
pub const RPS_TARGET: &str = "metrics.rps.7d";

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: Option<String>,
}

pub fn health_key() -> CacheKey {
    CacheKey::new("health")
}

pub fn scalar_key(metric: &str) -> CacheKey {
    CacheKey::new(metric)
}

pub fn series_key(metric: &str, range: &str) -> CacheKey {
    CacheKey::with_params(metric, [("range", range)])
}

pub fn latency_key(percentile: u8) -> CacheKey {
    CacheKey::with_params("latency", [("p", percentile.to_string())])
}

pub fn throughput_key(run_id: &str) -> CacheKey {
    CacheKey::with_params("throughput", [("run", run_id)])
}

/// Key of one training metric of one run; a missing range is its own key.
pub fn training_key(run_id: &str, metric: &str, range: Option<&str>) -> CacheKey {
    CacheKey::with_params(
        "train",
        [("run", run_id), ("metric", metric), ("range", range.unwrap_or(""))],
    )
}

/// Everything a poll run needs, cheap to clone into a task.
#[derive(Clone)]
struct SyncState {
    client: ApiClient,
    scalars: CacheStore<ScalarMetric>,
    series: SeriesStore,
    health: CacheStore<HealthAggregate>,
    obs: Option<ObsProxy>,
}

impl SyncState {
    async fn fetch_health(&self) -> Result<HealthAggregate, ApiError> {
        let client = self.client.clone();
        self.health
            .fetch(health_key(), async move {
                let body: HealthBody = client.get_json(RequestDescriptor::get(HEALTH_PATH)).await?;
                let status = body
                    .status
                    .as_deref()
                    .map(HealthStatus::parse)
                    .unwrap_or_default();
                Ok(HealthAggregate::from_status(status))
            })
            .await
    }

    async fn fetch_metric_series(&self, metric: &str, range: &str) -> Result<TimeseriesResponse, ApiError> {
        let request = RequestDescriptor::get(format!("{}/{}", METRICS_PATH, metric)).query("range", range);
        self.fetch_series_from(series_key(metric, range), request).await
    }

    async fn fetch_metric_scalar(&self, metric: &str) -> Result<ScalarMetric, ApiError> {
        let request = RequestDescriptor::get(format!("{}/{}", METRICS_PATH, metric));
        self.fetch_scalar_from(scalar_key(metric), request).await
    }

    async fn fetch_scalar_from(&self, key: CacheKey, request: RequestDescriptor) -> Result<ScalarMetric, ApiError> {
        let client = self.client.clone();
        self.scalars
            .fetch(key, async move { client.get_json(request).await })
            .await
    }

    async fn fetch_series_from(&self, key: CacheKey, request: RequestDescriptor) -> Result<TimeseriesResponse, ApiError> {
        let client = self.client.clone();
        self.series
            .fetch(key, async move { client.get_json(request).await })
            .await
    }

    /// A Prometheus-backed series: through the proxy when one is configured,
    /// otherwise `GET /v1/metrics/{metric}?range={range}`.
    async fn fetch_prom_series(&self, metric: &str, query: &str, range: &str) -> Result<TimeseriesResponse, ApiError> {
        let Some(proxy) = self.obs.clone() else {
            return self.fetch_metric_series(metric, range).await;
        };
        let client = self.client.clone();
        let (query, range_name, fallback) = (query.to_string(), range.to_string(), metric.to_string());
        self.series
            .fetch(series_key(metric, range), async move {
                proxy.range(&client, &query, &range_name, &fallback).await
            })
            .await
    }

    async fn fetch_rps(&self, range: &str) -> Result<TimeseriesResponse, ApiError> {
        self.fetch_prom_series("rps", obs::RPS_QUERY, range).await
    }

    /// Latency percentile: an instant query through the proxy, otherwise
    /// `GET /v1/metrics/latency?p={percentile}`.
    async fn fetch_latency(&self, percentile: u8) -> Result<ScalarMetric, ApiError> {
        let key = latency_key(percentile);
        let Some(proxy) = self.obs.clone() else {
            let request = RequestDescriptor::get(format!("{}/latency", METRICS_PATH)).query("p", percentile.to_string());
            return self.fetch_scalar_from(key, request).await;
        };
        let client = self.client.clone();
        let query = obs::latency_query(percentile);
        self.scalars
            .fetch(key, async move { proxy.instant(&client, &query).await })
            .await
    }
}

pub struct Dashboard {
    config: Config,
    state: SyncState,
    poller: Poller,
}

impl Dashboard {
    /// Production wiring: reqwest transport and a session file in the cache dir.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())
            .context("Failed to create HTTP client")?;
        let store = FileTokenStore::new(config.cache_dir()?);
        Ok(Self::with_transport(config, Arc::new(transport), Arc::new(store)))
    }

    pub fn with_transport(config: Config, transport: Arc<dyn HttpTransport>, store: Arc<dyn TokenStore>) -> Self {
        let source = TransportTokenSource::new(Arc::clone(&transport), config.auth_url(), config.login());
        let credentials = CredentialManager::new(Arc::new(source), store, config.refresh_cooldown());
        if credentials.load() {
            debug!("Restored stored credential");
        }

        let client = ApiClient::new(
            transport,
            config.api_base_url.clone(),
            config.auth_path.clone(),
            config.retry_policy(),
            credentials,
        );
        let state = SyncState {
            client,
            scalars: CacheStore::new(),
            series: SeriesStore::new(config.series_max_keys, config.series_max_points),
            health: CacheStore::new(),
            obs: config.obs_proxy(),
        };
        if let Some(obs) = &state.obs {
            debug!(base = obs.base_url(), "Prometheus metrics read through the observability proxy");
        }
        let poller = Poller::with_auto_pause(config.auto_pause_on_hidden);

        Self { config, state, poller }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.state.client
    }

    pub fn credentials(&self) -> &CredentialManager {
        self.state.client.credentials()
    }

    pub fn failures(&self) -> &FailureBus {
        self.state.client.failures()
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn scalars(&self) -> &CacheStore<ScalarMetric> {
        &self.state.scalars
    }

    pub fn series(&self) -> &SeriesStore {
        &self.state.series
    }

    pub fn health(&self) -> &CacheStore<HealthAggregate> {
        &self.state.health
    }

    pub fn obs(&self) -> Option<&ObsProxy> {
        self.state.obs.as_ref()
    }

    pub async fn fetch_health(&self) -> Result<HealthAggregate, ApiError> {
        self.state.fetch_health().await
    }

    /// Fetch a scalar through any loader and store it under `key`.
    pub async fn fetch_scalar<F>(&self, key: CacheKey, loader: F) -> Result<ScalarMetric, ApiError>
    where
        F: Future<Output = Result<ScalarMetric, ApiError>>,
    {
        self.state.scalars.fetch(key, loader).await
    }

    /// Fetch a series through any loader; it is downsampled before storing.
    pub async fn fetch_series<F>(&self, key: CacheKey, loader: F) -> Result<TimeseriesResponse, ApiError>
    where
        F: Future<Output = Result<TimeseriesResponse, ApiError>>,
    {
        self.state.series.fetch(key, loader).await
    }

    /// `GET /v1/metrics/{metric}`, stored under [`scalar_key`].
    pub async fn fetch_metric_scalar(&self, metric: &str) -> Result<ScalarMetric, ApiError> {
        self.state.fetch_metric_scalar(metric).await
    }

    /// `GET /v1/metrics/{metric}?range={range}`, stored under [`series_key`].
    pub async fn fetch_metric_series(&self, metric: &str, range: &str) -> Result<TimeseriesResponse, ApiError> {
        self.state.fetch_metric_series(metric, range).await
    }

    /// Training loss series, stored under `series_key("loss", range)`.
    pub async fn fetch_loss(&self, range: &str) -> Result<TimeseriesResponse, ApiError> {
        self.state.fetch_prom_series("loss", obs::LOSS_QUERY, range).await
    }

    /// Request rate series, stored under `series_key("rps", range)`.
    pub async fn fetch_rps(&self, range: &str) -> Result<TimeseriesResponse, ApiError> {
        self.state.fetch_rps(range).await
    }

    /// 4xx+5xx share of requests, stored under `series_key("error_rate", range)`.
    pub async fn fetch_error_rate(&self, range: &str) -> Result<TimeseriesResponse, ApiError> {
        self.state
            .fetch_prom_series("error_rate", obs::ERROR_RATE_QUERY, range)
            .await
    }

    pub async fn fetch_latency_p50(&self) -> Result<ScalarMetric, ApiError> {
        self.state.fetch_latency(50).await
    }

    pub async fn fetch_latency_p95(&self) -> Result<ScalarMetric, ApiError> {
        self.state.fetch_latency(95).await
    }

    /// Moves per second, stored under `scalar_key("mps")`.
    pub async fn fetch_mps(&self) -> Result<ScalarMetric, ApiError> {
        self.state.fetch_metric_scalar("mps").await
    }

    pub async fn fetch_elo(&self, range: &str) -> Result<TimeseriesResponse, ApiError> {
        self.state.fetch_metric_series("elo", range).await
    }

    /// `GET /v1/metrics/throughput?runId={run_id}`, stored under [`throughput_key`].
    pub async fn fetch_throughput(&self, run_id: &str) -> Result<ScalarMetric, ApiError> {
        let request = RequestDescriptor::get(format!("{}/throughput", METRICS_PATH)).query("runId", run_id);
        self.state.fetch_scalar_from(throughput_key(run_id), request).await
    }

    /// `GET /v1/metrics/training/{run_id}?m={metric}[&range={range}]`, stored
    /// under [`training_key`].
    pub async fn fetch_training_series(
        &self,
        run_id: &str,
        metric: &str,
        range: Option<&str>,
    ) -> Result<TimeseriesResponse, ApiError> {
        let mut request =
            RequestDescriptor::get(format!("{}/training/{}", METRICS_PATH, run_id)).query("m", metric);
        if let Some(range) = range {
            request = request.query("range", range);
        }
        self.state
            .fetch_series_from(training_key(run_id, metric, range), request)
            .await
    }

    pub fn select_scalar(&self, key: &CacheKey) -> Option<ScalarMetric> {
        self.state.scalars.select(key)
    }

    pub fn select_series(&self, key: &CacheKey) -> Option<TimeseriesResponse> {
        self.state.series.select(key)
    }

    pub fn select_health(&self) -> Option<HealthAggregate> {
        self.state.health.select(&health_key())
    }

    /// The declared default targets. Declaring them starts nothing.
    pub fn poll_targets(&self) -> Vec<PollTask> {
        let interval = self.config.poll_interval();

        let health = self.state.clone();
        let rps = self.state.clone();
        vec![
            PollTask::new(HEALTH_TARGET, interval, move || {
                let state = health.clone();
                async move {
                    let _ = state.fetch_health().await;
                }
            }),
            PollTask::new(RPS_TARGET, interval, move || {
                let state = rps.clone();
                async move {
                    let _ = state.fetch_rps("7d").await;
                }
            }),
        ]
    }

    /// Schedule [`Dashboard::poll_targets`]; returns how many were newly started.
    pub fn start_polling(&self) -> usize {
        self.poller.start_many(self.poll_targets())
    }

    /// Acquire a credential up front when automatic bootstrap is configured.
    ///
    /// Returns whether a credential is available afterwards.
    pub async fn bootstrap(&self) -> bool {
        let credentials = self.credentials();
        if !self.config.auto_credential_bootstrap || credentials.is_authenticated() {
            return credentials.is_authenticated();
        }
        let acquired = credentials.acquire().await.is_some();
        if acquired {
            info!("Credential acquired at start-up");
        } else {
            debug!("Start-up credential acquisition failed");
        }
        acquired
    }

    /// Stop every poll task and drop all cached data.
    pub fn reset(&self) {
        self.poller.stop(None);
        self.state.scalars.clear();
        self.state.series.clear();
        self.state.health.clear();
        debug!("Dashboard state reset");
    }

    /// Forget the credential (and its stored copy), then reset.
    pub fn logout(&self) {
        self.credentials().clear();
        self.reset();
        info!("Logged out");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::transport::testing::ScriptedTransport;
    use crate::api::{ErrorCode, RawResponse, TransportError};
    use crate::auth::{Credential, MemoryTokenStore};

    const TOKEN: &str = "aaa.bbb.ccc";

    fn config() -> Config {
        Config {
            api_base_url: "http://api.test".to_string(),
            series_max_keys: 2,
            series_max_points: 100,
            ..Config::default()
        }
    }

    fn respond(request: &crate::api::OutgoingRequest) -> Result<RawResponse, TransportError> {
        if let Some(path) = request.url.strip_prefix("http://obs.test") {
            let body = match path {
                "/obs/prom/range" => r#"{"status":"success","data":{"resultType":"matrix","result":[
                    {"metric":{"__name__":"http_rps"},"values":[[1767225600,"1.5"],[1767225660,"2"]]}]}}"#,
                _ => r#"{"status":"success","data":{"resultType":"vector","result":[
                    {"metric":{},"value":[1767225600,"0.184"]}]}}"#,
            };
            return Ok(RawResponse::new(200, body));
        }
        let path = request.url.trim_start_matches("http://api.test");
        let body = match path {
            "/v1/health" => r#"{"status":"warn"}"#.to_string(),
            "/auth/token" => format!(r#"{{"token":"{}"}}"#, TOKEN),
            "/v1/metrics/mps" => r#"{"value": 41.5, "unit": "moves/s"}"#.to_string(),
            "/v1/metrics/latency" | "/v1/metrics/throughput" => r#"{"value": 0.25}"#.to_string(),
            p if p.starts_with("/v1/metrics/") => {
                let points: Vec<String> = (0..1_000)
                    .map(|i| format!(r#"{{"ts":"2026-01-01T00:{:02}:{:02}Z","value":{}}}"#, i / 60 % 60, i % 60, i))
                    .collect();
                format!(r#"{{"series":[{{"metric":"rps","points":[{}]}}],"range":"7d"}}"#, points.join(","))
            }
            _ => return Ok(RawResponse::new(404, r#"{"message":"no such route"}"#)),
        };
        Ok(RawResponse::new(200, body))
    }

    fn dashboard(config: Config) -> (Dashboard, Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new(|req, _| respond(req));
        let store = Arc::new(MemoryTokenStore::with_credential(Credential::new(TOKEN)));
        (Dashboard::with_transport(config, transport.clone(), store), transport)
    }

    #[tokio::test]
    async fn test_fetch_health_maps_status() {
        let (dash, transport) = dashboard(config());
        let health = dash.fetch_health().await.unwrap();

        assert_eq!(health, HealthAggregate { status: HealthStatus::Warn, ok: 0, warn: 1, crit: 0 });
        assert_eq!(dash.select_health(), Some(health));
        let sent = transport.requests_to("/v1/health");
        assert_eq!(sent[0].authorization(), Some("Bearer aaa.bbb.ccc"));
    }

    #[tokio::test]
    async fn test_series_are_bounded_and_keyed_by_range() {
        let (dash, transport) = dashboard(config());
        dash.fetch_metric_series("rps", "7d").await.unwrap();

        let key = series_key("rps", "7d");
        assert!(dash.series().point_count(&key).unwrap() <= 100);
        assert_eq!(dash.select_series(&key).unwrap().range.as_deref(), Some("7d"));

        let sent = transport.requests_to("/v1/metrics/rps");
        assert_eq!(sent[0].request.query, vec![("range".to_string(), "7d".to_string())]);
    }

    #[tokio::test]
    async fn test_series_keys_are_lru_bounded() {
        let (dash, _) = dashboard(config());
        dash.fetch_metric_series("rps", "7d").await.unwrap();
        dash.fetch_metric_series("rps", "24h").await.unwrap();
        dash.fetch_metric_series("loss", "7d").await.unwrap();

        assert!(dash.select_series(&series_key("rps", "7d")).is_none());
        assert!(dash.select_series(&series_key("loss", "7d")).is_some());
        assert_eq!(dash.series().store().len(), 2);
    }

    #[tokio::test]
    async fn test_scalar_and_errors_are_per_key() {
        let (dash, _) = dashboard(config());
        let mps = dash.fetch_metric_scalar("mps").await.unwrap();
        assert_eq!(mps.value, 41.5);

        let err = dash
            .fetch_scalar(scalar_key("broken"), async {
                Err(ApiError::new(ErrorCode::Validation, "bad range"))
            })
            .await
            .unwrap_err();

        assert_eq!(dash.scalars().error(&scalar_key("broken")), Some(err));
        assert!(dash.scalars().error(&scalar_key("mps")).is_none());
        assert_eq!(dash.select_scalar(&scalar_key("mps")), Some(mps));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_targets_fill_caches_and_reset_stops_them() {
        let (dash, transport) = dashboard(config());
        let targets = dash.poll_targets();
        assert_eq!(
            targets.iter().map(|t| t.key()).collect::<Vec<_>>(),
            vec![HEALTH_TARGET, RPS_TARGET]
        );
        assert!(targets.iter().all(|t| t.interval() == Duration::from_secs(5)));
        // Declaring targets doesn't start them
        assert!(dash.poller().scheduled().is_empty());

        assert_eq!(dash.start_polling(), 2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(dash.select_health().is_some());
        assert!(dash.select_series(&series_key("rps", "7d")).is_some());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.requests_to("/v1/health").len(), 2);

        dash.reset();
        assert!(dash.poller().scheduled().is_empty());
        assert!(dash.select_health().is_none());
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(transport.requests_to("/v1/health").len(), 2);
    }

    #[tokio::test]
    async fn test_bootstrap_acquires_when_enabled() {
        let transport = ScriptedTransport::new(|req, _| respond(req));
        let dash = Dashboard::with_transport(
            Config {
                auto_credential_bootstrap: true,
                ..config()
            },
            transport.clone(),
            Arc::new(MemoryTokenStore::new()),
        );
        assert!(!dash.credentials().is_authenticated());

        assert!(dash.bootstrap().await);
        assert_eq!(dash.credentials().current().unwrap().token, TOKEN);
        assert_eq!(transport.requests_to("/auth/token").len(), 1);
        assert!(transport.requests_to("/auth/token")[0].authorization().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_disabled_does_not_call_auth() {
        let transport = ScriptedTransport::new(|req, _| respond(req));
        let dash = Dashboard::with_transport(config(), transport.clone(), Arc::new(MemoryTokenStore::new()));

        assert!(!dash.bootstrap().await);
        assert!(transport.requests_to("/auth/token").is_empty());
    }

    #[tokio::test]
    async fn test_prometheus_metrics_go_through_proxy() {
        let (dash, transport) = dashboard(Config {
            obs_base_url: Some("http://obs.test".to_string()),
            obs_api_key: Some("k-1".to_string()),
            ..config()
        });
        assert_eq!(dash.obs().map(|o| o.base_url()), Some("http://obs.test"));

        let rps = dash.fetch_rps("7d").await.unwrap();
        assert_eq!(rps.series[0].metric, "http_rps");
        assert_eq!(rps.range.as_deref(), Some("7d"));
        assert_eq!(dash.select_series(&series_key("rps", "7d")), Some(rps));

        let p95 = dash.fetch_latency_p95().await.unwrap();
        assert_eq!(p95.value, 0.184);
        assert_eq!(dash.select_scalar(&latency_key(95)), Some(p95));

        let range = transport.requests_to("/obs/prom/range");
        assert_eq!(range.len(), 1);
        let sent = &range[0];
        assert!(sent.authorization().is_none());
        assert_eq!(sent.request.header(obs::OBS_API_KEY_HEADER), Some("k-1"));
        let param = |name: &str| {
            sent.request
                .query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(param("query"), obs::RPS_QUERY);
        assert_eq!(param("step"), "1h");
        let span = param("end").parse::<i64>().unwrap() - param("start").parse::<i64>().unwrap();
        assert_eq!(span, 7 * 24 * 3600);

        let instant = transport.requests_to("/obs/prom/query");
        assert_eq!(instant[0].request.query[0].1, obs::latency_query(95));
        assert!(transport.requests_to("/v1/metrics/rps").is_empty());
    }

    #[tokio::test]
    async fn test_named_fetchers_without_proxy_use_main_api() {
        let (dash, transport) = dashboard(Config {
            series_max_keys: 10,
            ..config()
        });
        assert!(dash.obs().is_none());

        dash.fetch_error_rate("24h").await.unwrap();
        dash.fetch_loss("7d").await.unwrap();
        dash.fetch_elo("30d").await.unwrap();
        assert_eq!(dash.fetch_latency_p50().await.unwrap().value, 0.25);
        assert_eq!(dash.fetch_mps().await.unwrap().value, 41.5);
        assert_eq!(dash.fetch_throughput("run-1").await.unwrap().value, 0.25);
        dash.fetch_training_series("run-1", "loss", None).await.unwrap();
        dash.fetch_training_series("run-1", "loss", Some("7d")).await.unwrap();

        for key in [
            series_key("error_rate", "24h"),
            series_key("loss", "7d"),
            series_key("elo", "30d"),
            training_key("run-1", "loss", None),
            training_key("run-1", "loss", Some("7d")),
        ] {
            assert!(dash.select_series(&key).is_some(), "missing {}", key);
        }
        assert!(dash.select_scalar(&latency_key(50)).is_some());
        assert!(dash.select_scalar(&scalar_key("mps")).is_some());
        assert!(dash.select_scalar(&throughput_key("run-1")).is_some());
        assert_ne!(training_key("run-1", "loss", None), training_key("run-1", "loss", Some("7d")));

        let query = |path: &str| transport.requests_to(path)[0].request.query.clone();
        let pair = |k: &str, v: &str| (k.to_string(), v.to_string());
        assert_eq!(query("/v1/metrics/error_rate"), vec![pair("range", "24h")]);
        assert_eq!(query("/v1/metrics/latency"), vec![pair("p", "50")]);
        assert_eq!(query("/v1/metrics/throughput"), vec![pair("runId", "run-1")]);
        assert_eq!(query("/v1/metrics/training/run-1"), vec![pair("m", "loss")]);
        assert!(transport
            .requests()
            .iter()
            .all(|r| r.authorization() == Some("Bearer aaa.bbb.ccc")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_discards_poll_run_in_flight() {
        let transport =
            ScriptedTransport::with_delay(|req, _| respond(req), "/v1/health", Duration::from_millis(100));
        let store = Arc::new(MemoryTokenStore::with_credential(Credential::new(TOKEN)));
        let dash = Dashboard::with_transport(config(), transport.clone(), store);

        dash.start_polling();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(dash.health().is_loading(&health_key()));
        assert!(dash.select_series(&series_key("rps", "7d")).is_some());

        dash.logout();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The health response landed after logout and was not stored
        assert_eq!(transport.requests_to("/v1/health").len(), 1);
        assert!(dash.select_health().is_none());
        assert!(!dash.health().is_loading(&health_key()));
        assert!(dash.select_series(&series_key("rps", "7d")).is_none());
        assert!(dash.poller().scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_credential_and_caches() {
        let store = Arc::new(MemoryTokenStore::with_credential(Credential::new(TOKEN)));
        let transport = ScriptedTransport::new(|req, _| respond(req));
        let dash = Dashboard::with_transport(config(), transport, store.clone());
        dash.fetch_health().await.unwrap();

        dash.logout();

        assert!(!dash.credentials().is_authenticated());
        assert!(store.load().unwrap().is_none());
        assert!(dash.select_health().is_none());
    }
}
