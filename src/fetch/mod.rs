// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client,
};
use std::time::Duration;
use tracing::{debug, error, trace};
use url::Url;

use crate::config::Config;
use crate::error::FetchError;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Headers a desktop browser would send; the timing host is picky about them.
fn browser_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    h.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    h.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    h
}

/// Build the shared client. Certificate checks are off: the live-timing
/// host serves a self-signed certificate.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .default_headers(browser_headers())
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()
        .context("building HTTP client")
}

/// Single-shot GET of the timing page.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    url: Url,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            url: config.timing_url()?,
        })
    }

    pub fn with_client(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch the configured timing page.
    pub async fn fetch(&self) -> Result<String, FetchError> {
        fetch_url(&self.client, &self.url).await
    }
}

/// One attempt, no retries. Any non-2xx status is a failure.
pub async fn fetch_url(client: &Client, url: &Url) -> Result<String, FetchError> {
    debug!(%url, "fetching timing page");
    let wrap = |source: reqwest::Error| FetchError {
        url: url.to_string(),
        source,
    };

    let result = async {
        let resp = client.get(url.clone()).send().await?.error_for_status()?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok::<_, reqwest::Error>((status, body))
    }
    .await;

    match result {
        Ok((status, body)) => {
            debug!(%url, %status, bytes = body.len(), "fetched timing page");
            trace!(prefix = %body.chars().take(500).collect::<String>(), "response body");
            Ok(body)
        }
        Err(e) => {
            let e = wrap(e);
            error!(%url, error = %e, timeout = e.is_timeout(), status = ?e.status(), "error fetching timing page");
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    /// Serve `(status line, body)` responses in order, one per connection.
    pub async fn serve(responses: Vec<(&'static str, String)>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        Url::parse(&format!("http://{addr}/timing-full.php")).expect("url")
    }

    /// Accepts connections and never answers.
    pub async fn silent() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });
        Url::parse(&format!("http://{addr}/timing-full.php")).expect("url")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_body_on_success() {
        let url = test_server::serve(vec![("200 OK", "<table></table>".to_string())]).await;
        let fetcher = Fetcher::with_client(build_client(Duration::from_secs(5)).unwrap(), url);
        assert_eq!(fetcher.fetch().await.unwrap(), "<table></table>");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let url = test_server::serve(vec![("503 Service Unavailable", "busy".to_string())]).await;
        let fetcher = Fetcher::with_client(build_client(Duration::from_secs(5)).unwrap(), url);
        let err = fetcher.fetch().await.unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.url.ends_with("/timing-full.php"));
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let url = test_server::silent().await;
        let fetcher = Fetcher::with_client(build_client(Duration::from_millis(200)).unwrap(), url);
        let err = fetcher.fetch().await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn connection_refused_is_an_error() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/timing-full.php")).unwrap();
        let fetcher = Fetcher::with_client(build_client(Duration::from_secs(2)).unwrap(), url);
        assert!(fetcher.fetch().await.is_err());
    }

    #[test]
    fn fetcher_uses_configured_url() {
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        assert_eq!(
            fetcher.url().as_str(),
            "https://www.livetiming.pedalcarracing.info/timing-full.php"
        );
    }
}
