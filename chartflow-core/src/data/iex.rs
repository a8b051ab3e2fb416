//! IEX Cloud `/chart` client.
//!
//! `GET {endpoint}/stock/{symbol}/chart/{range}` with close-only,
//! change-from-close semantics. No retries: a failed call fails this fetch
//! and the invoking infrastructure decides whether to run it again.

use super::provider::{ApiResponse, ChartApi};
use crate::error::{IngestError, Result};
use crate::range::ChartRange;
use tracing::info;

/// Blocking client for the chart endpoint.
pub struct IexClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: String,
}

impl IexClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("chartflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Build the chart URL for a symbol and range (query string excluded).
    pub fn chart_url(&self, symbol: &str, range: ChartRange) -> String {
        format!("{}/stock/{symbol}/chart/{range}", self.endpoint)
    }
}

impl ChartApi for IexClient {
    fn name(&self) -> &str {
        "iex_cloud"
    }

    fn chart(&self, symbol: &str, range: ChartRange) -> Result<ApiResponse> {
        info!(symbol, range = %range, "retrieving /chart data");

        let resp = self
            .client
            .get(self.chart_url(symbol, range))
            .query(&[
                ("token", self.token.as_str()),
                ("chartCloseOnly", "true"),
                ("changeFromClose", "true"),
            ])
            .send()
            .map_err(|e| IngestError::NetworkUnreachable(format!("{symbol}: {e}")))?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .map_err(|e| IngestError::NetworkUnreachable(format!("{symbol}: reading body: {e}")))?
            .to_vec();

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn chart_url_shape() {
        let client = IexClient::new("https://cloud.example.com/v1/", "t").unwrap();
        assert_eq!(
            client.chart_url("AAPL", ChartRange::YearToDate),
            "https://cloud.example.com/v1/stock/AAPL/chart/ytd"
        );
    }

    #[test]
    fn sends_fixed_query_and_returns_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/stock/SPY/chart/5d")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("token".into(), "secret".into()),
                Matcher::UrlEncoded("chartCloseOnly".into(), "true".into()),
                Matcher::UrlEncoded("changeFromClose".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"date":"2023-06-15","changePercent":1.23,"volume":1000000}]"#)
            .create();

        let client = IexClient::new(server.url(), "secret").unwrap();
        let resp = client.chart("SPY", ChartRange::FiveDays).unwrap();

        mock.assert();
        assert!(resp.is_success());
        assert!(resp.body.starts_with(b"[{\"date\""));
    }

    #[test]
    fn error_status_still_returns_body() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/stock/NOPE/chart/max")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("Unknown symbol")
            .create();

        let client = IexClient::new(server.url(), "secret").unwrap();
        let resp = client.chart("NOPE", ChartRange::Max).unwrap();

        assert_eq!(resp.status, 404);
        assert!(!resp.is_success());
        assert_eq!(resp.body, b"Unknown symbol");
    }

    #[test]
    fn unreachable_endpoint_is_network_error() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let client = IexClient::new("http://127.0.0.1:9", "secret").unwrap();
        match client.chart("SPY", ChartRange::FiveDays) {
            Err(IngestError::NetworkUnreachable(_)) => {}
            other => panic!("expected NetworkUnreachable, got: {other:?}"),
        }
    }
}
