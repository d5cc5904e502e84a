//! SolaX Cloud realtime API client
//!
//! Fetches `getRealtimeInfo` for one inverter and turns the JSON payload into a
//! [`RawCloudReading`]. Rate limiting is the caller's concern; every call to
//! [`CloudApi::fetch`] issues exactly one request.

use crate::config::CloudConfig;
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Values extracted from one successful cloud response
#[derive(Debug, Clone, PartialEq)]
pub struct RawCloudReading {
    /// W
    pub ac_power: f64,
    /// kWh
    pub yield_total: f64,
    /// Vendor `inverterStatus`
    pub status_code: i64,
    pub serial: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CloudResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    exception: Option<String>,
    #[serde(default)]
    result: Option<CloudResult>,
}

#[derive(Debug, Deserialize)]
struct CloudResult {
    #[serde(rename = "inverterSN", default)]
    inverter_sn: Option<String>,
    #[serde(default)]
    acpower: Option<f64>,
    #[serde(default)]
    yieldtotal: Option<f64>,
    #[serde(rename = "inverterStatus", default)]
    inverter_status: Option<serde_json::Value>,
}

/// Build the request URL, rejecting empty credentials before any I/O
pub fn build_url(config: &CloudConfig) -> Result<Url> {
    let endpoint = config.endpoint.trim();
    if endpoint.is_empty() {
        return Err(HeliosError::config("SolaX Cloud endpoint is not set/empty"));
    }
    if config.token_id.trim().is_empty() {
        return Err(HeliosError::config("SolaX Cloud tokenId is not set/empty"));
    }
    if config.registration_number.trim().is_empty() {
        return Err(HeliosError::config("SolaX Cloud regNo is not set/empty"));
    }

    let mut url = Url::parse(endpoint).map_err(|e| {
        HeliosError::config(format!("Invalid SolaX Cloud endpoint '{}': {}", endpoint, e))
    })?;
    url.query_pairs_mut()
        .append_pair("tokenId", config.token_id.trim())
        .append_pair("sn", config.registration_number.trim());
    Ok(url)
}

fn parse_status(value: Option<&serde_json::Value>) -> Result<i64> {
    let missing = || HeliosError::protocol("Response does not contain 'inverterStatus'");
    match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(missing),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            HeliosError::protocol(format!("Non-numeric 'inverterStatus': {}", s))
        }),
        _ => Err(missing()),
    }
}

/// Decode a response body
pub fn parse_response(body: &str) -> Result<RawCloudReading> {
    let response: CloudResponse = serde_json::from_str(body).map_err(|e| {
        HeliosError::protocol(format!("Converting response to JSON failed: {}", e))
    })?;

    if response.success != Some(true) {
        return Err(HeliosError::protocol(format!(
            "Response is not ok - 'success'={} 'exception'={}",
            response
                .success
                .map_or_else(|| "null".to_string(), |b| b.to_string()),
            response.exception.as_deref().unwrap_or("")
        )));
    }

    let result = response
        .result
        .ok_or_else(|| HeliosError::protocol("Response does not contain 'result'"))?;
    let status_code = parse_status(result.inverter_status.as_ref())?;

    Ok(RawCloudReading {
        ac_power: result.acpower.unwrap_or(0.0),
        yield_total: result.yieldtotal.unwrap_or(0.0),
        status_code,
        serial: result.inverter_sn.unwrap_or_default().trim().to_string(),
        fetched_at: Utc::now(),
    })
}

/// One realtime query against the cloud
#[async_trait::async_trait]
pub trait CloudApi: Send {
    async fn fetch(&mut self) -> Result<RawCloudReading>;
}

/// HTTP client for the SolaX Cloud
pub struct CloudClient {
    config: CloudConfig,
    http: reqwest::Client,
    logger: StructuredLogger,
}

impl CloudClient {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .user_agent(concat!("helios/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HeliosError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config: config.clone(),
            http,
            logger: get_logger("cloud"),
        })
    }
}

#[async_trait::async_trait]
impl CloudApi for CloudClient {
    async fn fetch(&mut self) -> Result<RawCloudReading> {
        let url = build_url(&self.config)?;
        self.logger
            .debug(&format!("Querying SolaX Cloud at {}", self.config.endpoint));

        let response = self.http.get(url).send().await.map_err(|e| {
            HeliosError::connection(format!(
                "No response from SolaX Cloud - {}: {}",
                self.config.endpoint, e
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HeliosError::connection(format!(
                "SolaX Cloud returned HTTP {}",
                status
            )));
        }

        let body = response.text().await.map_err(|e| {
            HeliosError::connection(format!("Failed to read SolaX Cloud response: {}", e))
        })?;
        let reading = parse_response(&body)?;
        self.logger.debug(&format!(
            "Cloud update - status {} power {} W yield {} kWh",
            reading.status_code, reading.ac_power, reading.yield_total
        ));
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CloudConfig {
        CloudConfig {
            token_id: "tok en".to_string(),
            registration_number: "SW&123".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn url_carries_encoded_credentials() {
        let url = build_url(&config()).unwrap();
        assert!(url.as_str().starts_with(
            "https://www.solaxcloud.com/proxyApp/proxy/api/getRealtimeInfo.do?"
        ));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("tokenId".to_string(), "tok en".to_string()),
                ("sn".to_string(), "SW&123".to_string())
            ]
        );
    }

    #[test]
    fn empty_credentials_are_configuration_errors() {
        let mutations: [fn(&mut CloudConfig); 3] = [
            |c| c.endpoint.clear(),
            |c| c.token_id.clear(),
            |c| c.registration_number = "  ".to_string(),
        ];
        for mutate in mutations {
            let mut c = config();
            mutate(&mut c);
            assert!(matches!(build_url(&c), Err(HeliosError::Config { .. })));
        }
    }

    #[test]
    fn parses_successful_response() {
        let body = r#"{"success":true,"exception":"Query success!","result":
            {"inverterSN":"XB3022","acpower":1520.0,"yieldtotal":4321.7,"inverterStatus":"102"}}"#;
        let reading = parse_response(body).unwrap();
        assert_eq!(reading.ac_power, 1520.0);
        assert_eq!(reading.yield_total, 4321.7);
        assert_eq!(reading.status_code, 102);
        assert_eq!(reading.serial, "XB3022");
    }

    #[test]
    fn null_numerics_read_as_zero() {
        let body = r#"{"success":true,"result":
            {"inverterSN":"X","acpower":null,"inverterStatus":109}}"#;
        let reading = parse_response(body).unwrap();
        assert_eq!(reading.ac_power, 0.0);
        assert_eq!(reading.yield_total, 0.0);
        assert_eq!(reading.status_code, 109);
    }

    #[test]
    fn failure_flag_carries_exception() {
        let body = r#"{"success":false,"exception":"Invalid token","result":null}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, HeliosError::Protocol { .. }));
        assert!(err.to_string().contains("Invalid token"));
    }

    #[test]
    fn malformed_payloads_are_protocol_errors() {
        for body in [
            "<html>",
            r#"{"success":true}"#,
            r#"{"success":true,"result":{"acpower":1.0}}"#,
            r#"{"success":true,"result":{"inverterStatus":"abc"}}"#,
        ] {
            assert!(matches!(
                parse_response(body),
                Err(HeliosError::Protocol { .. })
            ));
        }
    }
}
