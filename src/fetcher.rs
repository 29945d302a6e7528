use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode, header::HeaderMap, redirect::Policy};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Redirect hops allowed for source lists and liveness probes
pub const SHORT_REDIRECTS: usize = 3;
/// Redirect hops allowed for playlist bodies
pub const LONG_REDIRECTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Get,
    Head,
}

/// Which redirect budget a request is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    Short,
    Long,
}

#[derive(Debug)]
pub enum Fetched {
    Body(String),
    Head { status: StatusCode, headers: HeaderMap },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("access denied ({0})")]
    Denied(StatusCode),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("unable to read body: {0}")]
    Body(#[source] reqwest::Error),
}

impl FetchError {
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e)
        }
    }
}

/// Performs single-attempt HTTP requests with a fixed user agent.
///
/// reqwest only lets the redirect policy be set per client, so one client is
/// kept per redirect budget. Both share the same headers.
#[derive(Debug, Clone)]
pub struct Fetcher {
    short: Client,
    long: Client,
}

impl Fetcher {
    /// # Errors
    /// Errors when the TLS backend can't be initialized
    pub fn new() -> Result<Self> {
        Ok(Self {
            short: build_client(SHORT_REDIRECTS).context("Building list HTTP client")?,
            long: build_client(LONG_REDIRECTS).context("Building playlist HTTP client")?,
        })
    }

    /// Issues one request. Never retries.
    ///
    /// GET succeeds only on exactly `200 OK` and yields the decoded body.
    /// HEAD succeeds on any 2xx / 3xx and yields the status and headers.
    /// `401` and `403` are reported as [`FetchError::Denied`].
    ///
    /// # Errors
    /// See [`FetchError`]
    pub async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        mode: FetchMode,
        redirects: Redirects,
    ) -> Result<Fetched, FetchError> {
        let res = self.send(url, timeout, mode, redirects).await?;
        match mode {
            FetchMode::Get => read_body(url, res).await.map(Fetched::Body),
            FetchMode::Head => Ok(Fetched::Head {
                status: res.status(),
                headers: res.headers().clone(),
            }),
        }
    }

    /// GETs `url` and returns its body as text
    ///
    /// # Errors
    /// See [`FetchError`]
    pub async fn get_text(
        &self,
        url: &str,
        timeout: Duration,
        redirects: Redirects,
    ) -> Result<String, FetchError> {
        let res = self.send(url, timeout, FetchMode::Get, redirects).await?;
        read_body(url, res).await
    }

    /// Sends the request and applies the status rules of `mode`
    #[instrument(skip(self))]
    async fn send(
        &self,
        url: &str,
        timeout: Duration,
        mode: FetchMode,
        redirects: Redirects,
    ) -> Result<Response, FetchError> {
        let client = match redirects {
            Redirects::Short => &self.short,
            Redirects::Long => &self.long,
        };
        let req = match mode {
            FetchMode::Get => client.get(url),
            FetchMode::Head => client.head(url),
        };

        let res = req
            .timeout(timeout)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("Access denied by {url} ({status})");
            return Err(FetchError::Denied(status));
        }

        let accepted = match mode {
            FetchMode::Get => status == StatusCode::OK,
            FetchMode::Head => status.is_success() || status.is_redirection(),
        };
        if !accepted {
            return Err(FetchError::Status(status));
        }

        Ok(res)
    }
}

async fn read_body(url: &str, res: Response) -> Result<String, FetchError> {
    let body = res.text().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Body(e)
        }
    })?;
    debug!("Fetched {} bytes from {url}", body.len());
    Ok(body)
}

#[must_use]
pub fn user_agent() -> String {
    format!(
        "{}/{} (+{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_REPOSITORY")
    )
}

fn build_client(max_redirects: usize) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent())
        .redirect(Policy::limited(max_redirects))
        .connect_timeout(Duration::from_secs(10))
        .build()
}
