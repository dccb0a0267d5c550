use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/94.0.4606.81 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    PostForm,
}

/// A single outbound request to one of the scraped sites.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_form(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::PostForm,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam for every upstream call. Non-2xx statuses are returned as
/// pages, only transport failures are errors.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, request: PageRequest) -> Result<FetchedPage>;
}

#[derive(Clone, Debug)]
pub struct ReqwestFetcher {
    http: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(false)
            .use_rustls_tls()
            .build()?;

        Ok(Self { http })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch(&self, request: PageRequest) -> Result<FetchedPage> {
        debug!("{:?} {}", request.method, request.url);

        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::PostForm => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        debug!("Received {} bytes with status {}", body.len(), status);

        Ok(FetchedPage { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_builders() {
        let req = PageRequest::post_form("https://example.test/form", "a=1".to_string())
            .header("accept", "*/*");
        assert_eq!(req.method, Method::PostForm);
        assert_eq!(req.body.as_deref(), Some("a=1"));
        assert_eq!(req.headers, vec![("accept", "*/*".to_string())]);

        let req = PageRequest::get("https://example.test/search?q=x");
        assert_eq!(req.method, Method::Get);
        assert!(req.body.is_none());
    }

    #[test]
    fn test_fetched_page_success_range() {
        let ok = FetchedPage { status: 200, body: String::new() };
        let moved = FetchedPage { status: 302, body: String::new() };
        let err = FetchedPage { status: 500, body: String::new() };
        assert!(ok.is_success());
        assert!(!moved.is_success());
        assert!(!err.is_success());
    }

    #[test]
    fn test_reqwest_fetcher_builds() {
        assert!(ReqwestFetcher::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS)).is_ok());
    }
}
