use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::ACCEPT;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; articlepress/0.1)";
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{method} {url}: {source}")]
    Request {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("{url} exceeded max size of {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("decode JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Transport failures and 429/5xx are worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::TooLarge { .. } | Self::Decode { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub user_agent: String,
    pub verify_tls: bool,
    pub max_bytes: u64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            verify_tls: true,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Thin wrapper over a shared `reqwest::Client`; cheap to clone into worker tasks.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpClient {
    pub fn new(options: &HttpOptions) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()
            .context("build http client")?;

        Ok(Self {
            client,
            max_bytes: options.max_bytes,
        })
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| request_error("GET", url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(FetchError::TooLarge {
                url: url.to_owned(),
                limit: self.max_bytes,
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| request_error("GET", url, source))?
        {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_owned(),
                    limit: self.max_bytes,
                });
            }
        }

        Ok(body)
    }

    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| request_error("GET", url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let raw = response
            .bytes()
            .await
            .map_err(|source| request_error("GET", url, source))?;
        serde_json::from_slice(&raw).map_err(|source| FetchError::Decode {
            url: url.to_owned(),
            source,
        })
    }

    /// Follows redirects with a HEAD request and returns the final URL. Once a redirect
    /// happened the destination's status is ignored.
    pub async fn resolve_redirects(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|source| request_error("HEAD", url, source))?;

        let redirected = reqwest::Url::parse(url).ok().as_ref() != Some(response.url());
        if redirected {
            return Ok(response.url().as_str().to_owned());
        }

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        Ok(response.url().as_str().to_owned())
    }
}

fn request_error(method: &'static str, url: &str, source: reqwest::Error) -> FetchError {
    FetchError::Request {
        method,
        url: url.to_owned(),
        source,
    }
}
