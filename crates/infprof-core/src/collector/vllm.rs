//! vLLM inference server collector.
//!
//! Scrapes the server's Prometheus endpoint once per tick. The body is parsed
//! by [`parse_vllm_metrics`], which maps known gauges, counters and latency
//! summaries to fixed `vllm*` keys and reassembles histograms into a single
//! JSON document under `vllmHistogramsJson`.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use tracing::{debug, trace};

use super::{CollectError, Collector};
use crate::exposition::{self, Histogram, Suffix};
use crate::record::Record;
use crate::util::now_nanos;

/// Environment variable overriding the metrics URL.
pub const URL_ENV: &str = "VLLM_METRICS_URL";
pub const DEFAULT_URL: &str = "http://localhost:8000/metrics";

const FETCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Metric base name (without `vllm:` and `_total`) → output key.
const GAUGES: &[(&str, &str)] = &[
    ("num_requests_running", "vllmRequestsRunning"),
    ("num_requests_waiting", "vllmRequestsWaiting"),
    ("engine_sleep_state", "vllmEngineSleepState"),
    ("num_preemptions", "vllmPreemptionsTotal"),
    ("kv_cache_usage_perc", "vllmKvCacheUsagePercent"),
    ("prefix_cache_hits", "vllmPrefixCacheHits"),
    ("prefix_cache_queries", "vllmPrefixCacheQueries"),
    ("request_success", "vllmRequestsFinishedTotal"),
    ("corrupted_requests", "vllmRequestsCorruptedTotal"),
    ("prompt_tokens", "vllmTokensPromptTotal"),
    ("generation_tokens", "vllmTokensGenerationTotal"),
];

/// Histogram base name → name inside `vllmHistogramsJson`.
const HISTOGRAMS: &[(&str, &str)] = &[
    ("time_to_first_token_seconds", "latencyTtft"),
    ("e2e_request_latency_seconds", "latencyE2e"),
    ("request_queue_time_seconds", "latencyQueue"),
    ("request_inference_time_seconds", "latencyInference"),
    ("request_prefill_time_seconds", "latencyPrefill"),
    ("request_decode_time_seconds", "latencyDecode"),
    ("inter_token_latency_seconds", "latencyInterToken"),
    ("request_prompt_tokens", "reqSizePromptTokens"),
    ("request_generation_tokens", "reqSizeGenerationTokens"),
    ("iteration_tokens", "tokensPerStep"),
    ("request_params_max_tokens", "reqParamsMaxTokens"),
    ("request_params_n", "reqParamsN"),
];

/// Latency histograms whose `_sum`/`_count` get dedicated keys:
/// `vllmLatency<Stem>Sum` and `vllmLatency<Stem>Count`.
const LATENCY_SUMMARIES: &[(&str, &str)] = &[
    ("time_to_first_token_seconds", "Ttft"),
    ("e2e_request_latency_seconds", "E2e"),
    ("request_queue_time_seconds", "Queue"),
    ("request_inference_time_seconds", "Inference"),
    ("request_prefill_time_seconds", "Prefill"),
    ("request_decode_time_seconds", "Decode"),
];

fn lookup(table: &'static [(&'static str, &'static str)], name: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
}

/// Parses one scrape body.
///
/// Every gauge and latency summary key is present in the result, zero when
/// the server did not report it. `vllmAvailable` is true only when at least
/// one line was recognised.
pub fn parse_vllm_metrics(body: &str, scraped_at: i64) -> Record {
    let mut scalars: BTreeMap<String, f64> = BTreeMap::new();
    for (_, key) in GAUGES {
        scalars.insert((*key).to_string(), 0.0);
    }
    for (_, stem) in LATENCY_SUMMARIES {
        scalars.insert(format!("vllmLatency{stem}Sum"), 0.0);
        scalars.insert(format!("vllmLatency{stem}Count"), 0.0);
    }

    let mut histograms: BTreeMap<&'static str, Histogram> = BTreeMap::new();
    let mut recognised = 0usize;

    for line in body.lines() {
        let Some(metric) = exposition::parse_metric_line(line) else {
            continue;
        };
        let name = metric.name.strip_prefix("vllm:").unwrap_or(&metric.name);
        let value = exposition::sanitize(metric.value);

        let (base, suffix) = exposition::classify(name);
        let matched = match suffix {
            Suffix::Bucket => match (lookup(HISTOGRAMS, base), metric.labels.get("le")) {
                (Some(hist_name), Some(le)) => {
                    histograms.entry(hist_name).or_default().set_bucket(le, value);
                    true
                }
                _ => false,
            },
            Suffix::Sum | Suffix::Count => match lookup(LATENCY_SUMMARIES, base) {
                Some(stem) => {
                    let tail = if suffix == Suffix::Sum { "Sum" } else { "Count" };
                    scalars.insert(format!("vllmLatency{stem}{tail}"), value);
                    true
                }
                None => false,
            },
            Suffix::Total => set_gauge(&mut scalars, base, value),
            Suffix::None => set_gauge(&mut scalars, name, value),
        };
        if matched {
            recognised += 1;
        } else {
            trace!(metric = name, "unrecognised vllm metric");
        }
    }

    let mut record: Record = scalars.into_iter().collect();
    record.insert("vllmAvailable", recognised > 0);
    record.insert("vllmTimestamp", scraped_at);

    histograms.retain(|_, h| !h.is_empty());
    if !histograms.is_empty() {
        match serde_json::to_string(&histograms) {
            Ok(json) => record.insert("vllmHistogramsJson", json),
            Err(e) => debug!(error = %e, "failed to encode vllm histograms"),
        }
    }
    record
}

fn set_gauge(scalars: &mut BTreeMap<String, f64>, name: &str, value: f64) -> bool {
    match lookup(GAUGES, name) {
        Some(key) => {
            scalars.insert(key.to_string(), value);
            true
        }
        None => false,
    }
}

/// Record reported when the endpoint cannot be scraped.
fn unavailable(scraped_at: i64) -> Record {
    let mut record = Record::new();
    record.insert("vllmAvailable", false);
    record.insert("vllmTimestamp", scraped_at);
    record
}

/// Collector scraping a vLLM `/metrics` endpoint.
pub struct VllmCollector {
    client: reqwest::blocking::Client,
    url: String,
}

impl VllmCollector {
    pub fn new(url: impl Into<String>) -> Result<Self, CollectError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| CollectError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Uses `VLLM_METRICS_URL` when set, otherwise the default local URL.
    pub fn from_env() -> Result<Self, CollectError> {
        let url = env::var(URL_ENV)
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        Self::new(url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> Option<String> {
        let response = match self.client.get(&self.url).send() {
            Ok(r) => r,
            Err(e) => {
                trace!(url = %self.url, error = %e, "vllm endpoint unreachable");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(url = %self.url, status = %response.status(), "vllm endpoint returned error status");
            return None;
        }
        match response.text() {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(url = %self.url, error = %e, "failed to read vllm response body");
                None
            }
        }
    }
}

impl Collector for VllmCollector {
    fn name(&self) -> &str {
        "vllm"
    }

    fn collect_static(&self) -> Record {
        Record::new()
    }

    fn collect_dynamic(&self) -> Record {
        let scraped_at = now_nanos();
        match self.fetch() {
            Some(body) => parse_vllm_metrics(&body, scraped_at),
            None => unavailable(scraped_at),
        }
    }
}
