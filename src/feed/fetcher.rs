use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Default request timeout for one feed download
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_USER_AGENT: &str = "gator";
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while downloading a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, client construction)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Knobs for the shared HTTP client, filled from [`crate::config::Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Downloads feed documents with one reusable client.
///
/// Each [`fetch`](Fetcher::fetch) is a single GET. Failures are returned to
/// the caller, which decides whether the feed is tried again on a later tick.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl Fetcher {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// [`FetchError::Network`] if the TLS backend or resolver cannot be set up.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            max_body_bytes: settings.max_body_bytes,
        })
    }

    /// Fetches `url` and returns the raw body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] - Request exceeded the client timeout
    /// - [`FetchError::Network`] - Connection, DNS or TLS errors
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Body over `max_body_bytes`
    /// - [`FetchError::IncompleteResponse`] - Body shorter than Content-Length
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, self.max_body_bytes).await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Feed downloaded");
        Ok(bytes)
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Test</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    fn fetcher_with(timeout: Duration, max_body_bytes: usize) -> Fetcher {
        Fetcher::new(&FetchSettings {
            timeout,
            max_body_bytes,
            ..FetchSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_settings() {
        let settings = FetchSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(300));
        assert_eq!(settings.user_agent, "gator");
        assert_eq!(settings.max_body_bytes, 10 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(&FetchSettings::default()).unwrap();
        let body = fetcher
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(body, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "gator"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(&FetchSettings::default()).unwrap();
        assert!(fetcher.fetch(&mock_server.uri()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(&FetchSettings::default()).unwrap();
        match fetcher.fetch(&mock_server.uri()).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(&FetchSettings::default()).unwrap();
        match fetcher.fetch(&mock_server.uri()).await {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_with(Duration::from_millis(100), DEFAULT_MAX_BODY_BYTES);
        match fetcher.fetch(&mock_server.uri()).await {
            Err(FetchError::Timeout) => {}
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_body_over_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_with(DEFAULT_TIMEOUT, 1024);
        match fetcher.fetch(&mock_server.uri()).await {
            Err(FetchError::ResponseTooLarge) => {}
            other => panic!("Expected ResponseTooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        // Nothing listens on port 1
        let uri = "http://127.0.0.1:1/feed";

        let fetcher = fetcher_with(Duration::from_secs(5), DEFAULT_MAX_BODY_BYTES);
        match fetcher.fetch(uri).await {
            Err(FetchError::Network(_)) => {}
            other => panic!("Expected Network error, got {:?}", other),
        }
    }
}
