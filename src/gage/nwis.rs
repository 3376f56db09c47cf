/// USGS NWIS daily-values client.
///
/// Requests mean daily discharge (parameter `00060`, statistic `00003`) in
/// the WaterML-JSON format:
///
/// ```text
/// {"value": {"timeSeries": [{
///     "sourceInfo": {"siteCode": [{"value": "05568500"}]},
///     "variable": {"variableCode": [{"value": "00060"}], "noDataValue": -999999.0},
///     "values": [{"value": [{"value": "1234", "qualifiers": ["A"], "dateTime": "2024-01-01T00:00:00.000"}]}]
/// }]}}
/// ```
///
/// API documentation: https://waterservices.usgs.gov/docs/dv-service/

use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::gage::stats::DateWindow;
use crate::ingest::retry::RetryPolicy;
use crate::model::InputError;

pub const NWIS_DV_URL: &str = "https://waterservices.usgs.gov/nwis/dv/";

/// USGS parameter code for discharge, in cubic feet per second.
pub const PARAM_DISCHARGE: &str = "00060";

/// USGS statistic code for the daily mean.
pub const STAT_MEAN: &str = "00003";

/// Sentinel NWIS uses for "no value".
const NWIS_NO_DATA: f64 = -999_999.0;

// ============================================================================
// Response structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DvResponse {
    pub value: DvValue,
}

#[derive(Debug, Deserialize)]
pub struct DvValue {
    #[serde(rename = "timeSeries", default)]
    pub time_series: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize)]
pub struct TimeSeries {
    #[serde(rename = "sourceInfo")]
    pub source_info: SourceInfo,
    #[serde(default)]
    pub variable: Option<Variable>,
    #[serde(default)]
    pub values: Vec<ValueSet>,
}

#[derive(Debug, Deserialize)]
pub struct SourceInfo {
    #[serde(rename = "siteCode")]
    pub site_code: Vec<CodeValue>,
}

#[derive(Debug, Deserialize)]
pub struct CodeValue {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct Variable {
    #[serde(rename = "noDataValue", default)]
    pub no_data_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ValueSet {
    #[serde(default)]
    pub value: Vec<RawValue>,
}

#[derive(Debug, Deserialize)]
pub struct RawValue {
    pub value: String,
    #[serde(default)]
    pub qualifiers: Vec<String>,
    #[serde(rename = "dateTime")]
    pub date_time: String,
}

/// One daily mean discharge value, in cubic feet per second.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyValue {
    pub site: String,
    pub date: NaiveDate,
    /// `None` when NWIS reported its no-data sentinel or a non-number.
    pub value_cfs: Option<f64>,
    pub qualifiers: Vec<String>,
}

// ============================================================================
// URL construction and parsing
// ============================================================================

/// Builds a daily-values request for mean discharge.
pub fn build_dv_url(base_url: &str, sites: &[&str], start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}?format=json&sites={}&parameterCd={}&statCd={}&startDT={}&endDT={}&siteStatus=all",
        base_url,
        sites.join(","),
        PARAM_DISCHARGE,
        STAT_MEAN,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

/// Parses a daily-values response into per-day readings.
pub fn parse_dv_response(body: &str) -> Result<Vec<DailyValue>, InputError> {
    let response: DvResponse = serde_json::from_str(body)?;
    let mut out = Vec::new();

    for series in response.value.time_series {
        let site = series
            .source_info
            .site_code
            .first()
            .map(|c| c.value.clone())
            .ok_or_else(|| InputError::ParseError("timeSeries without siteCode".to_string()))?;
        let no_data = series
            .variable
            .and_then(|v| v.no_data_value)
            .unwrap_or(NWIS_NO_DATA);

        for raw in series.values.into_iter().flat_map(|set| set.value) {
            // "2024-01-01T00:00:00.000" or "2024-01-01"
            let day = raw.date_time.get(..10).unwrap_or(&raw.date_time);
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
                InputError::ParseError(format!("bad dateTime '{}': {e}", raw.date_time))
            })?;
            let value_cfs = raw
                .value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v != no_data);
            out.push(DailyValue {
                site: site.clone(),
                date,
                value_cfs,
                qualifiers: raw.qualifiers,
            });
        }
    }
    Ok(out)
}

// ============================================================================
// Client
// ============================================================================

pub struct NwisClient {
    client: reqwest::blocking::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl NwisClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<NwisClient, InputError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InputError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(NwisClient {
            client,
            base_url: base_url.to_string(),
            retry,
        })
    }

    /// Daily mean discharge for one site over the window.
    pub fn fetch_daily(&self, site: &str, window: &DateWindow) -> Result<Vec<DailyValue>, InputError> {
        let url = build_dv_url(&self.base_url, &[site], window.start(), window.end());
        let body = self.retry.run(|attempt| {
            tracing::trace!(%url, attempt, "nwis request");
            let response = self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .send()?;
            let status = response.status();
            // NWIS answers 404 when the site has no data for the request.
            if status.as_u16() == 404 {
                return Err(InputError::NoDataAvailable(site.to_string()));
            }
            if !status.is_success() {
                return Err(InputError::HttpError(status.as_u16()));
            }
            Ok(response.text()?)
        })?;
        parse_dv_response(&body)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "ns1:timeSeriesResponseType",
        "value": {
            "queryInfo": {},
            "timeSeries": [{
                "sourceInfo": {"siteName": "ILLINOIS RIVER AT KINGSTON MINES, IL", "siteCode": [{"value": "05568500", "agencyCode": "USGS"}]},
                "variable": {"variableCode": [{"value": "00060"}], "noDataValue": -999999.0},
                "values": [{
                    "value": [
                        {"value": "10400", "qualifiers": ["A"], "dateTime": "2024-01-01T00:00:00.000"},
                        {"value": "-999999", "qualifiers": ["A"], "dateTime": "2024-01-02T00:00:00.000"},
                        {"value": "9870", "qualifiers": ["P", "Ice"], "dateTime": "2024-01-03T00:00:00.000"}
                    ],
                    "qualifier": [{"qualifierCode": "A"}]
                }]
            }]
        }
    }"#;

    #[test]
    fn test_build_dv_url() {
        let url = build_dv_url(
            NWIS_DV_URL,
            &["05568500"],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert!(url.starts_with("https://waterservices.usgs.gov/nwis/dv/?format=json"));
        assert!(url.contains("sites=05568500"));
        assert!(url.contains("parameterCd=00060"));
        assert!(url.contains("statCd=00003"));
        assert!(url.contains("startDT=2024-01-01"));
        assert!(url.contains("endDT=2024-01-31"));
    }

    #[test]
    fn test_parse_dv_response() {
        let values = parse_dv_response(SAMPLE).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].site, "05568500");
        assert_eq!(values[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(values[0].value_cfs, Some(10400.0));
        assert_eq!(values[1].value_cfs, None);
        assert_eq!(values[2].qualifiers, vec!["P", "Ice"]);
    }

    #[test]
    fn test_parse_empty_series() {
        let values = parse_dv_response(r#"{"value": {"timeSeries": []}}"#).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(
            parse_dv_response("<html>Service unavailable</html>"),
            Err(InputError::ParseError(_))
        ));
    }
}
