//! Direct retriever: streams an HTTP resource to disk.

use super::temp_path::{remove_quietly, TempPathAllocator};
use super::{RetrievalRequest, RetrievalResult, Retriever, Strategy};
use crate::config::{Settings, DIRECT_CHUNK_SIZE};
use crate::error::RelayError;
use crate::utils::{format_bytes, random_proxy, random_user_agent};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Streams URLs to freshly allocated local files
pub struct DirectRetriever {
    allocator: TempPathAllocator,
    proxies: Vec<String>,
    timeout: Duration,
    max_file_size: u64,
}

impl DirectRetriever {
    /// Create a retriever
    #[must_use]
    pub const fn new(
        allocator: TempPathAllocator,
        proxies: Vec<String>,
        timeout: Duration,
        max_file_size: u64,
    ) -> Self {
        Self {
            allocator,
            proxies,
            timeout,
            max_file_size,
        }
    }

    /// Create a retriever from settings
    #[must_use]
    pub fn from_settings(settings: &Settings, allocator: TempPathAllocator) -> Self {
        Self::new(
            allocator,
            settings.proxies(),
            settings.direct_timeout(),
            settings.max_file_size,
        )
    }

    /// Build a client with a fresh user agent and, if configured, a random proxy
    fn build_client(&self) -> Result<reqwest::Client, RelayError> {
        let user_agent = random_user_agent();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(self.timeout);
        debug!(user_agent, "Selected user agent");

        if let Some(proxy) = random_proxy(&self.proxies) {
            info!(proxy = %proxy, "Using proxy");
            let proxy = reqwest::Proxy::all(&proxy)
                .map_err(|e| RelayError::Upstream(format!("Invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| RelayError::Upstream(format!("HTTP client error: {e}")))
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        path: &Path,
    ) -> Result<u64, RelayError> {
        let file = tokio::fs::File::create(path).await?;
        let mut writer = BufWriter::with_capacity(DIRECT_CHUNK_SIZE, file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RelayError::Upstream(format!("Download interrupted: {e}")))?;
            written += chunk.len() as u64;
            if written > self.max_file_size {
                return Err(RelayError::TooLarge {
                    size: written,
                    limit: self.max_file_size,
                });
            }
            writer.write_all(&chunk).await?;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl Retriever for DirectRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RelayError> {
        let client = self.build_client()?;
        info!(url = %request.url, "Direct download started");

        let response = client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("Request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Upstream(format!("HTTP {}", status.as_u16())));
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_file_size {
                return Err(RelayError::TooLarge {
                    size: declared,
                    limit: self.max_file_size,
                });
            }
            info!(size = %format_bytes(declared), "Declared file size");
        }

        let path = self.allocator.allocate("download");
        match self.stream_to_file(response, &path).await {
            Ok(size) => {
                info!(path = %path.display(), size = %format_bytes(size), "Downloaded");
                Ok(RetrievalResult {
                    path,
                    size,
                    strategy: Strategy::Direct,
                })
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Direct download failed, removing partial file");
                remove_quietly(&path).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MAX: u64 = 64 * 1024;

    fn retriever(dir: &Path) -> DirectRetriever {
        DirectRetriever::new(
            TempPathAllocator::new(dir),
            Vec::new(),
            Duration::from_secs(30),
            MAX,
        )
    }

    async fn serve(body: Vec<u8>, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
            .mount(&server)
            .await;
        server
    }

    /// One-shot server answering with a chunked body and no `Content-Length`
    async fn serve_chunked(chunks: Vec<Vec<u8>>) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let head = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for chunk in chunks {
                let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
                frame.extend_from_slice(&chunk);
                frame.extend_from_slice(b"\r\n");
                if socket.write_all(&frame).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/file.bin")
    }

    async fn files_in(dir: &Path) -> usize {
        let mut entries = tokio::fs::read_dir(dir).await.expect("read_dir");
        let mut count = 0;
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_reports_bytes_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let body: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let server = serve(body.clone(), 200).await;

        let request = RetrievalRequest::new(format!("{}/file.bin", server.uri()), None);
        let result = retriever(dir.path())
            .retrieve(&request)
            .await
            .expect("download succeeds");

        assert_eq!(result.size, body.len() as u64);
        assert_eq!(result.strategy, Strategy::Direct);
        let on_disk = tokio::fs::read(&result.path).await.expect("read back");
        assert_eq!(on_disk, body);
    }

    #[tokio::test]
    async fn test_declared_size_at_limit_proceeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = serve(vec![1u8; MAX as usize], 200).await;

        let request = RetrievalRequest::new(format!("{}/file.bin", server.uri()), None);
        let result = retriever(dir.path())
            .retrieve(&request)
            .await
            .expect("exactly MAX bytes is allowed");
        assert_eq!(result.size, MAX);
    }

    #[tokio::test]
    async fn test_declared_size_over_limit_aborts_before_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = serve(vec![1u8; MAX as usize + 1], 200).await;

        let request = RetrievalRequest::new(format!("{}/file.bin", server.uri()), None);
        let err = retriever(dir.path())
            .retrieve(&request)
            .await
            .expect_err("MAX + 1 is rejected");

        assert!(matches!(err, RelayError::TooLarge { size, limit } if size == MAX + 1 && limit == MAX));
        assert_eq!(files_in(dir.path()).await, 0);
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = serve(b"gone".to_vec(), 404).await;

        let request = RetrievalRequest::new(format!("{}/file.bin", server.uri()), None);
        let err = retriever(dir.path())
            .retrieve(&request)
            .await
            .expect_err("404 fails");

        assert_eq!(err.to_string(), "HTTP 404");
        assert_eq!(files_in(dir.path()).await, 0);
    }

    #[tokio::test]
    async fn test_chunked_body_reports_actual_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunks: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i; 1000]).collect();
        let expected: Vec<u8> = chunks.concat();
        let url = serve_chunked(chunks).await;

        let result = retriever(dir.path())
            .retrieve(&RetrievalRequest::new(url, None))
            .await
            .expect("download succeeds");

        assert_eq!(result.size, 3000);
        let on_disk = tokio::fs::read(&result.path).await.expect("read back");
        assert_eq!(on_disk, expected);
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_removes_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = serve_chunked(vec![vec![7u8; 1000]; 3]).await;
        let retriever = DirectRetriever::new(
            TempPathAllocator::new(dir.path()),
            Vec::new(),
            Duration::from_secs(30),
            2500,
        );

        let err = retriever
            .retrieve(&RetrievalRequest::new(url, None))
            .await
            .expect_err("3000 bytes exceed the limit");

        assert!(matches!(err, RelayError::TooLarge { size, limit } if size > 2500 && size <= 3000 && limit == 2500));
        assert_eq!(files_in(dir.path()).await, 0);
    }
}
