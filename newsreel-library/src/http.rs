//! Shared HTTP client wrapper
//!
//! Thin wrapper around `reqwest::blocking::Client` that centralizes the user
//! agent and timeouts.

use serde::Serialize;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("newsreel/", env!("CARGO_PKG_VERSION"));
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Shared HTTP client with standard configuration
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new() -> reqwest::Result<Self> {
        Self::with_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> reqwest::Result<Self> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { inner })
    }

    /// GET a URL
    pub fn get(&self, url: &str) -> reqwest::Result<reqwest::blocking::Response> {
        self.inner.get(url).send()
    }

    /// POST a JSON body with extra headers
    pub fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> reqwest::Result<reqwest::blocking::Response> {
        let mut request = self.inner.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.send()
    }
}
