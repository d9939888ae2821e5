//! Reqwest-backed HTTP client
//!
//! Implements the `HttpClient` seam for the lightweight probes. Transport
//! failures are classified into `HttpErrorKind` so the connectivity probe can
//! tell a handshake failure from a target that is not there at all.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use webaudit_core::{CoreError, CoreResult, HttpClient, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse};

use crate::models::settings::HttpSettings;

/// Bodies beyond this size are truncated (2MB)
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

pub struct ReqwestHttpClient {
    /// Follows up to `max_redirects` hops
    following: reqwest::Client,
    /// Never follows redirects
    direct: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(settings: &HttpSettings) -> CoreResult<Self> {
        let build = |policy: reqwest::redirect::Policy| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.timeout_secs))
                .user_agent(settings.user_agent.as_str())
                .redirect(policy)
                .build()
                .map_err(|e| CoreError::config(format!("failed to build HTTP client: {}", e)))
        };

        Ok(Self {
            following: build(reqwest::redirect::Policy::limited(settings.max_redirects))?,
            direct: build(reqwest::redirect::Policy::none())?,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(&self, request: HttpRequest) -> CoreResult<HttpResponse> {
        let client = if request.follow_redirects {
            &self.following
        } else {
            &self.direct
        };

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Head => client.head(&request.url),
        }
        .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();

        let body = if request.method == HttpMethod::Head {
            String::new()
        } else {
            let bytes = response.bytes().await.map_err(classify)?;
            let end = bytes.len().min(MAX_BODY_SIZE);
            String::from_utf8_lossy(&bytes[..end]).to_string()
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
            final_url,
        })
    }
}

/// Map a reqwest error to a classified `CoreError::Http`.
fn classify(err: reqwest::Error) -> CoreError {
    let kind = if err.is_timeout() {
        HttpErrorKind::Timeout
    } else if looks_like_tls(&err) {
        HttpErrorKind::Tls
    } else if err.is_connect() {
        HttpErrorKind::Connect
    } else if err.is_status() {
        HttpErrorKind::Status
    } else {
        HttpErrorKind::Other
    };
    CoreError::http(kind, error_chain(&err))
}

fn looks_like_tls(err: &reqwest::Error) -> bool {
    let chain = error_chain(err).to_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| chain.contains(needle))
}

/// Flatten an error and its sources into one message.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
