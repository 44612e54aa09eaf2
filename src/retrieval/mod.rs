//! Retrieval pipeline: URL classification, strategy selection and the two
//! strategies (plain HTTP streaming and media extraction).
//!
//! The router owns the only retry policy of the relay: an `Unknown` URL gets one
//! extraction attempt and, if that fails, one direct download.

pub mod classify;
pub mod direct;
pub mod extractor;
pub mod profile;
pub mod temp_path;

use crate::config::Settings;
use crate::error::RelayError;
use async_trait::async_trait;
use classify::{classify, UrlClass};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub use classify::Platform;
pub use direct::DirectRetriever;
pub use extractor::YtDlpExtractor;
pub use temp_path::TempPathAllocator;

/// What to retrieve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    /// Source URL
    pub url: String,
    /// Display name requested by the user, if any
    pub file_name: Option<String>,
}

impl RetrievalRequest {
    /// Create a request for `url`
    pub fn new(url: impl Into<String>, file_name: Option<String>) -> Self {
        Self {
            url: url.into(),
            file_name,
        }
    }
}

/// Which strategy produced a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Plain streaming HTTP GET
    Direct,
    /// External media extractor
    Extractor,
}

/// A file retrieved to local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalResult {
    /// Local path of the file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Strategy that produced the file
    pub strategy: Strategy,
}

impl RetrievalResult {
    /// Basename of the local file
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string())
    }

    /// Extension of the local file, lowercase
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Metadata returned by a no-download probe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// Title of the media
    pub title: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// Uploader or channel
    pub uploader: Option<String>,
}

/// A strategy that fetches a URL into a local file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve the resource, returning the local file
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RelayError>;
}

/// Capability surface of the external media extraction tool
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Query metadata without downloading. Never fails: `None` on any problem.
    async fn probe(&self, url: &str) -> Option<MediaInfo>;

    /// Download the media into a local file
    async fn extract(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RelayError>;
}

/// Chooses between direct download and extraction based on classification
#[derive(Clone)]
pub struct RetrievalRouter {
    direct: Arc<dyn Retriever>,
    extractor: Arc<dyn MediaExtractor>,
}

impl RetrievalRouter {
    /// Create a router from two strategies
    #[must_use]
    pub fn new(direct: Arc<dyn Retriever>, extractor: Arc<dyn MediaExtractor>) -> Self {
        Self { direct, extractor }
    }

    /// Build the production router (reqwest + yt-dlp) from settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let allocator = TempPathAllocator::new(settings.download_path());
        Self::new(
            Arc::new(DirectRetriever::from_settings(settings, allocator.clone())),
            Arc::new(YtDlpExtractor::from_settings(settings, allocator)),
        )
    }

    /// Classify the URL and retrieve it
    ///
    /// # Errors
    ///
    /// Propagates the strategy error for classified URLs and returns
    /// `RelayError::Retrieval` when both attempts for an unknown URL fail.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RelayError> {
        self.retrieve_as(classify(&request.url), request).await
    }

    /// Retrieve using an already computed classification
    ///
    /// # Errors
    ///
    /// See [`RetrievalRouter::retrieve`].
    pub async fn retrieve_as(
        &self,
        class: UrlClass,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResult, RelayError> {
        match class {
            UrlClass::ExtractorEligible(platform) => {
                info!(platform = platform.id(), "Retrieving via extractor");
                self.extractor.extract(request).await
            }
            UrlClass::DirectLink => {
                info!("Retrieving via direct download");
                self.direct.retrieve(request).await
            }
            UrlClass::Unknown => self.retrieve_unknown(request).await,
        }
    }

    async fn retrieve_unknown(
        &self,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResult, RelayError> {
        info!("Unrecognized URL, trying extractor first");
        let extractor_error = match self.extractor.extract(request).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        warn!(error = %extractor_error, "Extractor failed, falling back to direct download");
        match self.direct.retrieve(request).await {
            Ok(result) => Ok(result),
            // A size violation is final on its own terms
            Err(e @ RelayError::TooLarge { .. }) => Err(e),
            Err(direct_error) => Err(RelayError::Retrieval(format!(
                "Direct download failed: {direct_error} (extractor: {extractor_error})"
            ))),
        }
    }

    /// Probe metadata for extractor-eligible URLs; `None` otherwise
    pub async fn probe(&self, url: &str) -> Option<MediaInfo> {
        match classify(url) {
            UrlClass::ExtractorEligible(_) => self.extractor.probe(url).await,
            UrlClass::DirectLink | UrlClass::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(strategy: Strategy) -> RetrievalResult {
        RetrievalResult {
            path: PathBuf::from("/tmp/downloads/download_1_abcdefgh"),
            size: 42,
            strategy,
        }
    }

    fn router(direct: MockRetriever, extractor: MockMediaExtractor) -> RetrievalRouter {
        RetrievalRouter::new(Arc::new(direct), Arc::new(extractor))
    }

    #[tokio::test]
    async fn test_extractor_eligible_never_falls_back() {
        let mut direct = MockRetriever::new();
        direct.expect_retrieve().never();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(|_| Err(RelayError::Extraction("Video unavailable".into())));

        let request = RetrievalRequest::new("https://youtu.be/abc", None);
        let err = router(direct, extractor)
            .retrieve(&request)
            .await
            .expect_err("extractor failure is terminal");
        assert!(matches!(err, RelayError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_direct_link_uses_direct_only() {
        let mut direct = MockRetriever::new();
        direct
            .expect_retrieve()
            .times(1)
            .returning(|_| Err(RelayError::Upstream("HTTP 404".into())));
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract().never();

        let request = RetrievalRequest::new("https://example.com/video.mp4", None);
        let err = router(direct, extractor)
            .retrieve(&request)
            .await
            .expect_err("no fallback for direct links");
        assert!(matches!(err, RelayError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_unknown_falls_back_to_direct_once() {
        let mut direct = MockRetriever::new();
        direct
            .expect_retrieve()
            .times(1)
            .returning(|_| Ok(file(Strategy::Direct)));
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(|_| Err(RelayError::Extraction("Unsupported URL".into())));

        let request = RetrievalRequest::new("https://example.com/download?id=7", None);
        let result = router(direct, extractor)
            .retrieve(&request)
            .await
            .expect("fallback succeeds");
        assert_eq!(result.strategy, Strategy::Direct);
    }

    #[tokio::test]
    async fn test_unknown_extractor_success_skips_direct() {
        let mut direct = MockRetriever::new();
        direct.expect_retrieve().never();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(|_| Ok(file(Strategy::Extractor)));

        let request = RetrievalRequest::new("https://some-video-site.net/v/123", None);
        let result = router(direct, extractor)
            .retrieve(&request)
            .await
            .expect("extractor succeeds");
        assert_eq!(result.strategy, Strategy::Extractor);
    }

    #[tokio::test]
    async fn test_unknown_both_fail_is_retrieval_error() {
        let mut direct = MockRetriever::new();
        direct
            .expect_retrieve()
            .times(1)
            .returning(|_| Err(RelayError::Upstream("HTTP 403".into())));
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(|_| Err(RelayError::Extraction("Unsupported URL".into())));

        let request = RetrievalRequest::new("https://example.com/page", None);
        let err = router(direct, extractor)
            .retrieve(&request)
            .await
            .expect_err("policy exhausted");
        let RelayError::Retrieval(message) = err else {
            panic!("expected retrieval error, got {err:?}");
        };
        assert!(message.contains("HTTP 403"));
        assert!(message.contains("Unsupported URL"));
    }

    #[tokio::test]
    async fn test_probe_only_for_platform_urls() {
        let direct = MockRetriever::new();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_probe().times(1).returning(|_| {
            Some(MediaInfo {
                title: Some("Song".into()),
                ..MediaInfo::default()
            })
        });
        let router = router(direct, extractor);

        assert!(router.probe("https://example.com/video.mp4").await.is_none());
        let info = router
            .probe("https://soundcloud.com/artist/song")
            .await
            .expect("probed");
        assert_eq!(info.title.as_deref(), Some("Song"));
    }
}
