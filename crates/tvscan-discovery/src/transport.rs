//! Network access used by liveness and classification probes
//!
//! Every probe goes through [`ProbeTransport`] so the scan pipeline can be
//! driven by a fake network in tests.

use async_trait::async_trait;
use std::net::SocketAddrV4;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
}

/// Status and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Body of a 200 reply, anything else is [`ProbeError::Status`]
    pub fn into_ok_body(self) -> Result<String, ProbeError> {
        if self.status == 200 {
            Ok(self.body)
        } else {
            Err(ProbeError::Status(self.status))
        }
    }
}

/// Connection primitives available to probes
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Open a TCP connection and close it immediately without sending data.
    /// Any failure, including the timeout elapsing, is `false`.
    async fn connect(&self, target: SocketAddrV4, timeout: Duration) -> bool;

    /// GET a URL, bounded by `timeout` end to end
    async fn http_get(&self, url: &str, timeout: Duration) -> Result<HttpReply, ProbeError>;
}

/// Real network transport
#[derive(Debug, Clone)]
pub struct NetTransport {
    client: reqwest::Client,
}

impl NetTransport {
    /// Probes talk to LAN devices directly, so proxy settings from the
    /// environment are ignored
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeTransport for NetTransport {
    async fn connect(&self, target: SocketAddrV4, limit: Duration) -> bool {
        match timeout(limit, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                trace!(target = %target, error = %e, "Connect failed");
                false
            }
            Err(_) => {
                trace!(target = %target, "Connect timed out");
                false
            }
        }
    }

    async fn http_get(&self, url: &str, limit: Duration) -> Result<HttpReply, ProbeError> {
        let response = self
            .client
            .get(url)
            .timeout(limit)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest)?;
        Ok(HttpReply { status, body })
    }
}

fn map_reqwest(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Http(e)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local(listener: &TcpListener) -> SocketAddrV4 {
        match listener.local_addr().unwrap() {
            std::net::SocketAddr::V4(addr) => addr,
            other => panic!("unexpected address {other}"),
        }
    }

    #[tokio::test]
    async fn test_connect_open_and_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = local(&listener);
        let transport = NetTransport::new().unwrap();

        assert!(transport.connect(addr, Duration::from_millis(500)).await);

        drop(listener);
        assert!(!transport.connect(addr, Duration::from_millis(500)).await);
    }

    /// Answer a single request with a fixed JSON body
    async fn serve_once(body: &'static str) -> SocketAddrV4 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = local(&listener);

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        addr
    }

    #[tokio::test]
    async fn test_http_get_reads_status_and_body() {
        let addr = serve_once(r#"{"name":"Den"}"#).await;

        let url = format!("http://{}/setup/eureka_info", addr);
        let reply = NetTransport::new()
            .unwrap()
            .http_get(&url, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, HttpReply::ok(r#"{"name":"Den"}"#));
    }

    #[tokio::test]
    async fn test_http_get_ignores_environment_proxy() {
        let addr = serve_once(r#"{"name":"Den"}"#).await;
        // Nothing listens on the discard port
        std::env::set_var("http_proxy", "http://127.0.0.1:9");
        std::env::set_var("HTTP_PROXY", "http://127.0.0.1:9");

        let transport = NetTransport::new().unwrap();
        let url = format!("http://{}/setup/eureka_info", addr);
        let reply = transport.http_get(&url, Duration::from_secs(2)).await;

        std::env::remove_var("http_proxy");
        std::env::remove_var("HTTP_PROXY");
        assert_eq!(reply.unwrap(), HttpReply::ok(r#"{"name":"Den"}"#));
    }

    #[test]
    fn test_non_200_reply_is_status_error() {
        let reply = HttpReply {
            status: 503,
            body: String::new(),
        };
        assert!(matches!(reply.into_ok_body(), Err(ProbeError::Status(503))));
        assert_eq!(HttpReply::ok("{}").into_ok_body().unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_http_get_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = local(&listener);
        drop(listener);

        let url = format!("http://{}:{}/", Ipv4Addr::LOCALHOST, addr.port());
        assert!(NetTransport::new()
            .unwrap()
            .http_get(&url, Duration::from_millis(500))
            .await
            .is_err());
    }
}
