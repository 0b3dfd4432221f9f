use crate::config::UpstreamConfig;
use crate::metrics_defs::{UPSTREAM_REQUEST_DURATION, UPSTREAM_REQUEST_ERROR};
use crate::types::{ProjectId, ReleaseMetadata, ResolveError};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, InvalidHeaderValue, USER_AGENT};
use serde::Deserialize;
use shared::{counter, histogram};
use std::time::{Duration, Instant};
use url::Url;

const RELEASE_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// Upper bound on an upstream response body. Release listings with hundreds
/// of assets stay well below it.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum UpstreamClientError {
    #[error("invalid user agent: {0}")]
    InvalidUserAgent(#[from] InvalidHeaderValue),
    #[error("invalid API URL: {0}")]
    InvalidApiUrl(#[from] url::ParseError),
    #[error("could not build HTTP client: {0}")]
    ReqwestError(#[from] reqwest::Error),
}

/// Looks up the download URL of the newest release asset of a project.
///
/// Implementations make exactly one upstream call per invocation and keep
/// no state between calls; caching and retries are the caller's concern.
#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    async fn fetch_latest_asset_url(&self, project: &ProjectId) -> Result<String, ResolveError>;
}

/// Resolves projects against the GitHub releases API.
pub struct GitHubReleases {
    client: reqwest::Client,
    api_url: String,
}

impl GitHubReleases {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamClientError> {
        let api_url = Url::parse(&config.api_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(RELEASE_MEDIA_TYPE));
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(GitHubReleases {
            client,
            api_url: api_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn release_url(&self, project: &ProjectId) -> String {
        format!("{}/repos/{}/releases/latest", self.api_url, project)
    }

    async fn fetch_release(&self, url: &str) -> Result<ReleaseMetadata, ResolveError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ResolveError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        let body = read_body(response).await?;

        if !status.is_success() {
            return Err(ResolveError::UpstreamUnavailable(describe_status(
                status, &body,
            )));
        }

        parse_release(&body)
    }
}

#[async_trait]
impl UpstreamResolver for GitHubReleases {
    async fn fetch_latest_asset_url(&self, project: &ProjectId) -> Result<String, ResolveError> {
        let url = self.release_url(project);
        let start = Instant::now();

        let result = self
            .fetch_release(&url)
            .await
            .and_then(|release| first_asset_url(&release));

        let elapsed = start.elapsed();
        histogram!(UPSTREAM_REQUEST_DURATION).record(elapsed.as_secs_f64());

        match &result {
            Ok(asset_url) => {
                tracing::debug!(%project, ?elapsed, %asset_url, "Fetched latest release");
            }
            Err(e) => {
                counter!(UPSTREAM_REQUEST_ERROR, "kind" => e.kind()).increment(1);
                tracing::warn!(%project, ?elapsed, error = %e, "Failed to fetch latest release");
            }
        }

        result
    }
}

async fn read_body(mut response: reqwest::Response) -> Result<Vec<u8>, ResolveError> {
    let too_large =
        || ResolveError::MalformedResponse(format!("body exceeds {MAX_BODY_BYTES} bytes"));

    if response
        .content_length()
        .is_some_and(|len| len > MAX_BODY_BYTES as u64)
    {
        return Err(too_large());
    }

    // Content-Length may be absent (chunked), so the limit is enforced while reading too
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ResolveError::UpstreamUnavailable(e.to_string()))?
    {
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

pub fn parse_release(body: &[u8]) -> Result<ReleaseMetadata, ResolveError> {
    serde_json::from_slice(body).map_err(|e| ResolveError::MalformedResponse(e.to_string()))
}

/// Picks the first asset in upstream order. No filtering by name or platform.
pub fn first_asset_url(release: &ReleaseMetadata) -> Result<String, ResolveError> {
    release
        .assets
        .first()
        .map(|asset| asset.browser_download_url.clone())
        .ok_or_else(|| ResolveError::NoAssets {
            tag: release.tag_name.clone(),
        })
}

// GitHub error bodies look like {"message": "Not Found", ...}
fn describe_status(status: StatusCode, body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(error) => format!("{status}: {}", error.message),
        Err(_) => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::start_release_server;
    use crate::types::Asset;

    fn release(tag: &str, urls: &[&str]) -> ReleaseMetadata {
        ReleaseMetadata {
            tag_name: tag.into(),
            assets: urls
                .iter()
                .map(|url| Asset {
                    browser_download_url: url.to_string(),
                })
                .collect(),
        }
    }

    fn client_for(port: u16) -> GitHubReleases {
        let config = UpstreamConfig {
            api_url: format!("http://127.0.0.1:{port}/"),
            timeout_secs: 2,
            ..Default::default()
        };
        GitHubReleases::new(&config).unwrap()
    }

    fn project(id: &str) -> ProjectId {
        ProjectId::parse(id).unwrap()
    }

    #[test]
    fn test_first_asset_wins() {
        let rel = release(
            "v2.0",
            &[
                "https://cdn.example/tool-v2.0.tar.gz",
                "https://cdn.example/tool-v2.0.bin",
            ],
        );
        assert_eq!(
            first_asset_url(&rel),
            Ok("https://cdn.example/tool-v2.0.tar.gz".into())
        );
    }

    #[test]
    fn test_no_assets() {
        assert_eq!(
            first_asset_url(&release("v0.1", &[])),
            Err(ResolveError::NoAssets { tag: "v0.1".into() })
        );
    }

    #[test]
    fn test_parse_release() {
        let body = br#"{
            "tag_name": "v2.0",
            "name": "Release 2.0",
            "assets": [
                {"name": "tool.bin", "browser_download_url": "https://cdn.example/tool-v2.0.bin"}
            ]
        }"#;
        assert_eq!(
            parse_release(body),
            Ok(release("v2.0", &["https://cdn.example/tool-v2.0.bin"]))
        );

        assert!(matches!(
            parse_release(b"<html>rate limited</html>"),
            Err(ResolveError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_release(br#"{"tag_name": "v1", "assets": [{"name": "x"}]}"#),
            Err(ResolveError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_release_url() {
        let client = client_for(8080);
        assert_eq!(
            client.release_url(&project("acme/tool")),
            "http://127.0.0.1:8080/repos/acme/tool/releases/latest"
        );
    }

    #[test]
    fn test_describe_status() {
        assert_eq!(
            describe_status(StatusCode::NOT_FOUND, br#"{"message": "Not Found"}"#),
            "404 Not Found: Not Found"
        );
        assert_eq!(
            describe_status(StatusCode::BAD_GATEWAY, b"oops"),
            "502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_fetch_latest_asset_url() {
        let port = start_release_server().await;
        let client = client_for(port);

        // The test server rejects requests without the expected headers.
        assert_eq!(
            client.fetch_latest_asset_url(&project("acme/tool")).await,
            Ok("https://cdn.example/tool-v2.0.bin".into())
        );

        assert_eq!(
            client.fetch_latest_asset_url(&project("acme/empty")).await,
            Err(ResolveError::NoAssets { tag: "v0.1".into() })
        );

        assert!(matches!(
            client.fetch_latest_asset_url(&project("acme/garbage")).await,
            Err(ResolveError::MalformedResponse(_))
        ));

        assert_eq!(
            client.fetch_latest_asset_url(&project("acme/huge")).await,
            Err(ResolveError::MalformedResponse(format!(
                "body exceeds {MAX_BODY_BYTES} bytes"
            )))
        );
        assert_eq!(
            client.fetch_latest_asset_url(&project("acme/endless")).await,
            Err(ResolveError::MalformedResponse(format!(
                "body exceeds {MAX_BODY_BYTES} bytes"
            )))
        );

        assert_eq!(
            client.fetch_latest_asset_url(&project("acme/missing")).await,
            Err(ResolveError::UpstreamUnavailable(
                "404 Not Found: Not Found".into()
            ))
        );
    }

    #[test]
    fn test_invalid_api_url() {
        let config = UpstreamConfig {
            api_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            GitHubReleases::new(&config),
            Err(UpstreamClientError::InvalidApiUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_upstream() {
        // Nothing listens on port 1
        let client = client_for(1);
        assert!(matches!(
            client.fetch_latest_asset_url(&project("acme/tool")).await,
            Err(ResolveError::UpstreamUnavailable(_))
        ));
    }
}
