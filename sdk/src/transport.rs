//! HTTP transport for the rategate SDK.
//!
//! One POST, one classified outcome. There is deliberately no retry here:
//! retrying denials is the admission gate's job, and a transport failure
//! must surface immediately so the gate can switch to its local pacer.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin JSON-over-HTTP client for the arbiter endpoints.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// POST a JSON body and parse a JSON response.
    ///
    /// A per-request timeout overrides the client default when given. A
    /// non-success status is returned as [`Error::Status`] without reading
    /// the body; a success body that does not parse is
    /// [`Error::Serialization`].
    pub async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<R, Error>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let transport =
            HttpTransport::new("http://127.0.0.1:8787/", DEFAULT_TIMEOUT).expect("client builds");
        assert_eq!(transport.base_url(), "http://127.0.0.1:8787");
    }
}
