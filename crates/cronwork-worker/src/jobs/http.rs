//! Job unit that calls an HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing;

use cronwork_core::error::{AppError, ErrorKind};
use cronwork_core::result::AppResult;

use crate::job::{JobError, JobUnit};

/// Issues a GET request; any 2xx response is success.
#[derive(Debug, Clone)]
pub struct HttpJob {
    client: Client,
    url: String,
}

impl HttpJob {
    /// Create a unit calling `url`, with an optional request timeout.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> AppResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
        })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl JobUnit for HttpJob {
    async fn run(&self) -> Result<bool, JobError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| JobError::failed(format!("GET {} failed: {}", self.url, e)))?;

        let status = response.status();
        tracing::debug!(url = %self.url, %status, "HTTP job response");

        if status.is_success() {
            Ok(true)
        } else {
            Err(JobError::failed(format!("GET {} returned {}", self.url, status)))
        }
    }

    fn label(&self) -> &str {
        "HttpJob"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned response and return the URL to hit.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response =
                    format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}/ping")
    }

    #[tokio::test]
    async fn test_success_status() {
        let url = serve_once("200 OK").await;
        let job = HttpJob::new(url, Some(Duration::from_secs(5))).expect("client");
        assert!(job.run().await.expect("run"));
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let url = serve_once("503 Service Unavailable").await;
        let job = HttpJob::new(url, Some(Duration::from_secs(5))).expect("client");
        let err = job.run().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_connection_refused_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let job = HttpJob::new(format!("http://{addr}/"), Some(Duration::from_secs(5)))
            .expect("client");
        assert!(job.run().await.is_err());
    }
}
