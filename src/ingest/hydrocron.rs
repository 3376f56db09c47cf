/// Hydrocron timeseries API client.
///
/// Hydrocron serves SWOT RiverSP / LakeSP attributes per feature as CSV
/// wrapped in a JSON envelope:
///
/// ```text
/// GET {base}?feature=Reach&feature_id=74267100011
///           &start_time=2023-01-01T00:00:00Z&end_time=2024-01-01T00:00:00Z
///           &output=csv&fields=reach_id,time,time_str,wse,...
/// -> {"status": "200 OK", "hits": 12, "results": {"csv": "reach_id,time,...\n..."}}
/// ```
///
/// A 400 answer means the feature id is unknown to Hydrocron (or has no
/// passes in the window); it is reported as `NoDataAvailable` and not
/// retried.
///
/// API documentation: https://podaac.github.io/hydrocron/

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::fields::{NODE_FIELDS, Product, request_columns};
use crate::ingest::retry::RetryPolicy;
use crate::ingest::{RecordSource, TimeRange, parse_csv_records};
use crate::model::{FeatureId, InputError, NodeId, ObservationRecord};

pub const HYDROCRON_BASE_URL: &str = "https://soto.podaac.earthdatacloud.nasa.gov/hydrocron/v1/timeseries";

/// Header carrying the optional Hydrocron API key.
pub const API_KEY_HEADER: &str = "x-hydrocron-key";

/// Earliest SWOT science-orbit data; used when no start time is configured.
pub const DEFAULT_START: &str = "2023-07-28T00:00:00Z";

// ============================================================================
// Response structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TimeseriesResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub hits: Option<u64>,
    pub results: TimeseriesResults,
}

#[derive(Debug, Deserialize)]
pub struct TimeseriesResults {
    pub csv: String,
}

// ============================================================================
// URL construction and parsing
// ============================================================================

/// Builds a timeseries request URL.
pub fn build_timeseries_url(
    base_url: &str,
    feature: &str,
    feature_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    fields: &[String],
) -> String {
    format!(
        "{}?feature={}&feature_id={}&start_time={}&end_time={}&output=csv&fields={}",
        base_url,
        feature,
        feature_id,
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true),
        fields.join(",")
    )
}

/// Parses a JSON-wrapped CSV timeseries response into records.
pub fn parse_timeseries_response(body: &str) -> Result<Vec<ObservationRecord>, InputError> {
    let response: TimeseriesResponse = serde_json::from_str(body)?;
    if response.hits == Some(0) {
        return Ok(Vec::new());
    }
    parse_csv_records(&response.results.csv)
}

// ============================================================================
// Client
// ============================================================================

/// Blocking Hydrocron client implementing `RecordSource`.
pub struct HydrocronSource {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    range: TimeRange,
    retry: RetryPolicy,
}

impl HydrocronSource {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        api_key: Option<String>,
        range: TimeRange,
        retry: RetryPolicy,
    ) -> Result<HydrocronSource, InputError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InputError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(HydrocronSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            range,
            retry,
        })
    }

    fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), InputError> {
        let start = match self.range.start {
            Some(s) => s,
            None => DateTime::parse_from_rfc3339(DEFAULT_START)
                .map_err(|e| InputError::Config(e.to_string()))?
                .with_timezone(&Utc),
        };
        Ok((start, self.range.end.unwrap_or_else(Utc::now)))
    }

    fn fetch(&self, feature: &str, feature_id: &str, fields: &[String]) -> Result<Vec<ObservationRecord>, InputError> {
        let (start, end) = self.window()?;
        let url = build_timeseries_url(&self.base_url, feature, feature_id, start, end, fields);

        let body = self.retry.run(|attempt| {
            tracing::trace!(%url, attempt, "hydrocron request");
            let mut request = self.client.get(&url).header("Accept", "application/json");
            if let Some(key) = &self.api_key {
                request = request.header(API_KEY_HEADER, key);
            }
            let response = request.send()?;
            let status = response.status();
            if status.as_u16() == 400 {
                return Err(InputError::NoDataAvailable(feature_id.to_string()));
            }
            if !status.is_success() {
                return Err(InputError::HttpError(status.as_u16()));
            }
            Ok(response.text()?)
        })?;

        let records = parse_timeseries_response(&body)?;
        Ok(self.range.filter(records))
    }
}

impl RecordSource for HydrocronSource {
    fn feature_series(
        &self,
        product: Product,
        id: FeatureId,
    ) -> Result<Vec<ObservationRecord>, InputError> {
        let fields = request_columns(product.id_name(), product.primary_fields());
        self.fetch(product.feature_name(), &id.to_string(), &fields)
    }

    fn node_series(&self, id: NodeId) -> Result<Vec<ObservationRecord>, InputError> {
        let fields = request_columns("node_id", NODE_FIELDS);
        self.fetch("Node", &id.to_string(), &fields)
    }
}

// ============================================================================
// Tests
// ============================================================================
