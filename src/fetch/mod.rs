// src/fetch/mod.rs
//! Transport: GET a URL with query parameters and hand back the body text.
//! A non-success status is a fetch error; there are no retries here.

use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::Error;

pub trait Fetch {
    fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

fn fetch_err(url: &str, reason: impl ToString) -> Error {
    Error::Fetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Any non-success status fails the fetch.
fn check_status(url: &str, status: StatusCode) -> Result<(), Error> {
    if status.is_success() {
        Ok(())
    } else {
        Err(fetch_err(url, format!("HTTP {status}")))
    }
}

/// Live HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(concat!("bayscraper/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Fetch for HttpFetcher {
    fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, Error>> + Send {
        let request = self.client.get(url).query(query);
        let url = url.to_string();
        async move {
            debug!(%url, "GET");
            let resp = request.send().await.map_err(|e| fetch_err(&url, e))?;
            check_status(&url, resp.status())?;
            resp.text()
                .await
                .map_err(|e| fetch_err(&url, format!("reading body: {e}")))
        }
    }
}

/// Canned responses keyed by URL plus encoded query, for offline runs and
/// tests. Unregistered requests fail like an HTTP 404.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    responses: HashMap<String, Result<String, u16>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(url: &str, query: &[(&str, &str)]) -> String {
        match Url::parse_with_params(url, query) {
            Ok(u) => u.to_string(),
            Err(_) => url.to_string(),
        }
    }

    pub fn with_body(mut self, url: &str, query: &[(&str, &str)], body: impl Into<String>) -> Self {
        self.responses.insert(Self::key(url, query), Ok(body.into()));
        self
    }

    pub fn with_status(mut self, url: &str, query: &[(&str, &str)], status: u16) -> Self {
        self.responses.insert(Self::key(url, query), Err(status));
        self
    }
}

impl Fetch for StaticFetcher {
    fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, Error>> + Send {
        let key = Self::key(url, query);
        let res = match self.responses.get(&key) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(fetch_err(&key, format!("HTTP {status}"))),
            None => Err(fetch_err(&key, "HTTP 404 (no canned response)")),
        };
        debug!(%key, ok = res.is_ok(), "static GET");
        std::future::ready(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn static_fetcher_matches_url_and_query() {
        let f = StaticFetcher::new()
            .with_body("https://x.test/a.json", &[("$order", "date")], "[]")
            .with_status("https://x.test/b.json", &[], 503);

        assert_eq!(
            f.get_text("https://x.test/a.json", &[("$order", "date")])
                .await
                .unwrap(),
            "[]"
        );
        // different query, different resource
        let err = f.get_text("https://x.test/a.json", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);

        let err = f.get_text("https://x.test/b.json", &[]).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn non_success_status_is_fetch_error() {
        assert!(check_status("https://x.test/", StatusCode::OK).is_ok());
        for status in [
            StatusCode::NOT_FOUND,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::NOT_MODIFIED,
        ] {
            let err = check_status("https://x.test/", status).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Fetch);
            assert!(err.to_string().contains(status.as_str()), "{err}");
        }
    }

    /// Local server that answers a single request with `status_line`.
    async fn serve_once(status_line: &'static str) -> std::io::Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok"
                );
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });
        Ok(format!("http://{addr}/data.json"))
    }

    #[tokio::test]
    async fn http_fetcher_fails_on_server_error() -> anyhow::Result<()> {
        let url = serve_once("503 Service Unavailable").await?;
        let err = HttpFetcher::new()?.get_text(&url, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(err.to_string().contains("503"));
        Ok(())
    }

    #[tokio::test]
    async fn http_fetcher_returns_body_on_success() -> anyhow::Result<()> {
        let url = serve_once("200 OK").await?;
        assert_eq!(HttpFetcher::new()?.get_text(&url, &[]).await?, "ok");
        Ok(())
    }

    #[test]
    fn http_fetcher_builds() {
        assert!(HttpFetcher::new().is_ok());
    }
}
