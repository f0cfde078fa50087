use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::credentials::Credentials;
use crate::error::SourceError;

/// Minimum spacing between catalog API requests. CDN asset fetches are not
/// subject to this interval.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(250);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a conditional snapshot fetch.
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// The prior freshness token still matches; no body was transferred.
    NotModified,
    /// A fresh snapshot and its freshness token, when the source sent one.
    Fetched {
        body: Value,
        etag: Option<String>,
    },
}

/// The external catalog, as the sync engine sees it.
///
/// Failures must distinguish a needs-fresh-credentials condition
/// ([`SourceError::NeedsCredentials`]) from generic failure; the implementor
/// owns credential refresh, callers only ever see the final outcome.
pub trait CatalogSource {
    /// Fetch one JSON snapshot, conditional on a prior freshness token.
    fn fetch(
        &self,
        path: &str,
        prior_etag: Option<&str>,
    ) -> impl Future<Output = Result<FetchResult, SourceError>> + Send;

    /// Freshness probe: current token for a remote path, without a body.
    fn probe(&self, path: &str) -> impl Future<Output = Result<Option<String>, SourceError>> + Send;

    /// Fetch a binary asset and its freshness token.
    fn fetch_bytes(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<(Vec<u8>, Option<String>), SourceError>> + Send;
}

/// HTTP client for the catalog API with rate limiting and one-shot
/// credential re-load on auth failure.
pub struct CatalogClient {
    http: reqwest::Client,
    creds: Mutex<Credentials>,
    last_request: Mutex<Instant>,
}

impl CatalogClient {
    pub fn new(creds: Credentials) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            creds: Mutex::new(creds),
            last_request: Mutex::new(Instant::now() - MIN_REQUEST_INTERVAL),
        })
    }

    async fn url_for(&self, path: &str) -> String {
        let creds = self.creds.lock().await;
        format!("{}/{}", creds.host.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Issue one request with auth headers. On 401/403, re-load credentials
    /// once and retry; a second rejection surfaces as `NeedsCredentials`.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        prior_etag: Option<&str>,
    ) -> Result<reqwest::Response, SourceError> {
        self.rate_limit().await;

        let mut refreshed = false;
        loop {
            let url = self.url_for(path).await;
            let mut req = self.http.request(method.clone(), &url);
            {
                let creds = self.creds.lock().await;
                req = req.header("x-api-key", creds.api_key.clone());
                if let Some(ref token) = creds.user_token {
                    req = req.bearer_auth(token.clone());
                }
            }
            if let Some(etag) = prior_etag {
                req = req.header(reqwest::header::IF_NONE_MATCH, etag);
            }

            let resp = req.send().await?;
            let status = resp.status();

            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                if refreshed {
                    return Err(SourceError::NeedsCredentials(format!(
                        "catalog rejected credentials for '{path}' (HTTP {status})"
                    )));
                }
                refreshed = true;
                let fresh = Credentials::load().map_err(|e| {
                    SourceError::NeedsCredentials(format!("credential re-load failed: {e}"))
                })?;
                let sources = Credentials::sources();
                log::info!(
                    "Re-loaded catalog credentials after HTTP {} (api_key from {})",
                    status,
                    sources.api_key,
                );
                *self.creds.lock().await = fresh;
                continue;
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(SourceError::RateLimit);
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(SourceError::NotFound {
                    path: path.to_string(),
                });
            }
            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                return Err(SourceError::ServerClosed(
                    "catalog API is temporarily unavailable".to_string(),
                ));
            }
            if !status.is_success() && status != reqwest::StatusCode::NOT_MODIFIED {
                return Err(SourceError::ServerError {
                    status: status.as_u16(),
                    message: format!("unexpected status for '{path}'"),
                });
            }

            return Ok(resp);
        }
    }

    /// Enforce rate limiting: wait until at least MIN_REQUEST_INTERVAL has
    /// passed since the last API request.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
        }
        *last = Instant::now();
    }
}

fn etag_of(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

impl CatalogSource for CatalogClient {
    async fn fetch(
        &self,
        path: &str,
        prior_etag: Option<&str>,
    ) -> Result<FetchResult, SourceError> {
        let resp = self
            .request(reqwest::Method::GET, path, prior_etag)
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchResult::NotModified);
        }

        let etag = etag_of(&resp);
        let text = resp.text().await?;
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            SourceError::Api(format!(
                "Failed to parse snapshot at '{path}': {e}. Response: {}",
                &text[..text.len().min(200)]
            ))
        })?;

        Ok(FetchResult::Fetched { body, etag })
    }

    async fn probe(&self, path: &str) -> Result<Option<String>, SourceError> {
        let resp = self.request(reqwest::Method::HEAD, path, None).await?;
        Ok(etag_of(&resp))
    }

    async fn fetch_bytes(&self, path: &str) -> Result<(Vec<u8>, Option<String>), SourceError> {
        let resp = self.request(reqwest::Method::GET, path, None).await?;
        let etag = etag_of(&resp);
        let bytes = resp.bytes().await?;
        Ok((bytes.to_vec(), etag))
    }
}
