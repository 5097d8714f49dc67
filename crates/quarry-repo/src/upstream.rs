//! Upstream fetch client for proxy repositories
//!
//! The resolver talks to remote repositories through the `UpstreamFetcher`
//! trait; `HttpUpstream` is the reqwest-backed implementation. Upstreams may
//! advertise a content digest via the `X-Checksum-Sha256` header, which the
//! resolver verifies before populating the cache.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{ResolveError, Result};

/// Header carrying the upstream-advertised SHA256 digest
pub const CHECKSUM_HEADER: &str = "x-checksum-sha256";

/// What an upstream returned for a path
#[derive(Debug, Clone)]
pub enum UpstreamResponse {
    Found {
        data: Vec<u8>,
        /// Digest advertised by the upstream, when present
        checksum: Option<String>,
    },
    /// The upstream confirmed the path does not exist
    Missing,
}

/// Fetches content from a proxy repository's upstream
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch(&self, base_url: &str, path: &str) -> Result<UpstreamResponse>;
}

/// HTTP(S) upstream client
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    /// Build a client whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolveError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn join(base_url: &str, path: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl UpstreamFetcher for HttpUpstream {
    async fn fetch(&self, base_url: &str, path: &str) -> Result<UpstreamResponse> {
        let url = Self::join(base_url, path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(UpstreamResponse::Missing);
        }
        if !response.status().is_success() {
            return Err(ResolveError::UpstreamUnavailable {
                url,
                message: format!("unexpected status {}", response.status()),
            });
        }

        let checksum = response
            .headers()
            .get(CHECKSUM_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let data = response
            .bytes()
            .await
            .map_err(|e| map_request_error(&url, e))?
            .to_vec();

        Ok(UpstreamResponse::Found { data, checksum })
    }
}

fn map_request_error(url: &str, e: reqwest::Error) -> ResolveError {
    let message = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    ResolveError::UpstreamUnavailable {
        url: url.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_join() {
        assert_eq!(
            HttpUpstream::join("https://repo.example.com/maven/", "/com/acme/app.jar"),
            "https://repo.example.com/maven/com/acme/app.jar"
        );
    }

    #[tokio::test]
    async fn test_fetch_found_with_checksum() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maven/com/acme/app.jar"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"jarbytes".to_vec())
                    .insert_header("X-Checksum-Sha256", "sha256:abc"),
            )
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(Duration::from_secs(5)).unwrap();
        let base = format!("{}/maven", server.uri());
        match upstream.fetch(&base, "com/acme/app.jar").await.unwrap() {
            UpstreamResponse::Found { data, checksum } => {
                assert_eq!(data, b"jarbytes");
                assert_eq!(checksum.as_deref(), Some("sha256:abc"));
            }
            UpstreamResponse::Missing => panic!("expected Found"),
        }
    }

    #[tokio::test]
    async fn test_fetch_404_is_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(Duration::from_secs(5)).unwrap();
        let response = upstream.fetch(&server.uri(), "missing.jar").await.unwrap();
        assert!(matches!(response, UpstreamResponse::Missing));
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(Duration::from_secs(5)).unwrap();
        let result = upstream.fetch(&server.uri(), "app.jar").await;
        match result {
            Err(e @ ResolveError::UpstreamUnavailable { .. }) => assert!(e.is_retryable()),
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
    }
}
