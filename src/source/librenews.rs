//! LibreNews server source.
//!
//! A LibreNews server answers `GET <server_url>` with a JSON document of the
//! form:
//!
//! ```json
//! {
//!   "server": "LibreNews Central",
//!   "channels": [ ... ],
//!   "latest": [ { "id": "...", "channel": "...", "source": "...",
//!                 "text": "...", "link": "...", "date": "..." } ]
//! }
//! ```
//!
//! Only `server` and `latest` are read; anything else is ignored.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{FetchError, FetchedBatch, Flash, FlashSource};

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    latest: Vec<Flash>,
}

/// Fetches flashes from a LibreNews server over HTTP using [`reqwest`].
#[derive(Debug, Clone)]
pub struct LibreNewsSource {
    client: reqwest::Client,
}

impl LibreNewsSource {
    /// Create a source whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("librenews-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Parse an already-fetched response body.
    ///
    /// Pure function (no I/O) so that tests can exercise the decoding
    /// without a server.  When the server does not name itself, the URL's
    /// host stands in as its display name.
    pub fn parse_response(body: &str, url: &Url) -> Result<FetchedBatch, FetchError> {
        let response: ApiResponse = serde_json::from_str(body)?;
        let server_name = response
            .server
            .filter(|name| !name.trim().is_empty())
            .or_else(|| url.host_str().map(String::from))
            .unwrap_or_else(|| url.to_string());

        Ok(FetchedBatch {
            items: response.latest,
            server_name,
        })
    }
}

#[async_trait]
impl FlashSource for LibreNewsSource {
    async fn fetch(&self, server_url: &str) -> Result<FetchedBatch, FetchError> {
        let url = Url::parse(server_url).map_err(|source| FetchError::InvalidUrl {
            url: server_url.to_string(),
            source,
        })?;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        let batch = Self::parse_response(&body, &url)?;
        debug!(count = batch.items.len(), server = %batch.server_name, "fetched flashes");
        Ok(batch)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_url() -> Url {
        Url::parse("https://librenews.io/api").unwrap()
    }

    #[test]
    fn parse_response_extracts_latest_and_server() {
        let body = r#"{
            "server": "LibreNews Central",
            "channels": [["Breaking", "Important news"]],
            "latest": [
                {"id": "1", "channel": "Breaking", "source": "AP",
                 "text": "First", "link": "https://example.com/1",
                 "date": "2024-01-01T00:00:00Z"},
                {"id": "2", "channel": "Breaking", "source": "Reuters",
                 "text": "Second", "link": "https://example.com/2",
                 "date": "Tue, 02 Jan 2024 12:00:00 +0000"}
            ]
        }"#;

        let batch = LibreNewsSource::parse_response(body, &api_url()).unwrap();

        assert_eq!(batch.server_name, "LibreNews Central");
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.items[0].id, "1");
        assert_eq!(batch.items[0].source, "AP");
        assert_eq!(batch.items[1].text, "Second");
    }

    #[test]
    fn falls_back_to_host_when_server_unnamed() {
        let batch = LibreNewsSource::parse_response(r#"{"latest": []}"#, &api_url()).unwrap();
        assert_eq!(batch.server_name, "librenews.io");
        assert!(batch.items.is_empty());
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = LibreNewsSource::parse_response("<html>oops</html>", &api_url()).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn fetch_reads_server_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "server": "Test Server",
                "latest": [{
                    "id": "99", "channel": "World", "source": "BBC",
                    "text": "Hello", "link": "https://example.com/99",
                    "date": "2025-06-01T12:00:00Z"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = LibreNewsSource::new(Duration::from_secs(5)).unwrap();
        let batch = source.fetch(&format!("{}/api", server.uri())).await.unwrap();

        assert_eq!(batch.server_name, "Test Server");
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].id, "99");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = LibreNewsSource::new(Duration::from_secs(5)).unwrap();
        let err = source.fetch(&server.uri()).await.unwrap_err();

        assert!(matches!(err, FetchError::Status(s) if s.as_u16() == 503));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_any_request() {
        let source = LibreNewsSource::new(Duration::from_secs(5)).unwrap();
        let err = source.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
