use crate::{config::ClientConfig, error::DataError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use std::time::Duration;
use url::Url;

/// Raw HTTP response handed back to the retry loop.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single authenticated GET. Retrying, spacing and timeouts are applied by the
/// caller, so an implementation only reports what happened on the wire.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse, DataError>;
}

/// [`HttpTransport`] over one pooled [`reqwest::Client`], held for the lifetime of the
/// gateway client and released when it is dropped.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    access_token: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            timeout: config.request_timeout,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse, DataError> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|error| self.map_error(error))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| self.map_error(error))?;

        Ok(HttpResponse { status, body })
    }
}

impl ReqwestTransport {
    fn map_error(&self, error: reqwest::Error) -> DataError {
        if error.is_timeout() {
            DataError::Timeout(self.timeout)
        } else {
            DataError::Transport(error.without_url().to_string())
        }
    }
}
