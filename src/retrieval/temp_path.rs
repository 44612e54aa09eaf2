//! Collision-free paths for in-flight downloads.

use rand::distributions::{Alphanumeric, DistString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Length of the random suffix of an allocated name
const RANDOM_SUFFIX_LEN: usize = 8;

/// Hands out unique file paths inside the download directory.
#[derive(Debug, Clone)]
pub struct TempPathAllocator {
    dir: PathBuf,
}

impl TempPathAllocator {
    /// Create an allocator rooted at `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the allocator writes into
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocate `{dir}/{prefix}_{unix_millis}_{random}`.
    ///
    /// Nothing is created on disk; the caller owns the returned path.
    #[must_use]
    pub fn allocate(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let random = Alphanumeric
            .sample_string(&mut rand::thread_rng(), RANDOM_SUFFIX_LEN)
            .to_lowercase();
        self.dir.join(format!("{prefix}_{timestamp}_{random}"))
    }
}

/// Create the download directory if it does not exist.
///
/// # Errors
///
/// Returns the underlying IO error when the directory cannot be created.
pub async fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

/// Delete a local file, ignoring a missing file and swallowing other errors.
///
/// Returns `true` when a file was actually removed.
pub async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Cleaned up local file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to remove local file");
            false
        }
    }
}

/// Remove every file in `dir` whose name starts with the file name of `base`.
///
/// Used to drop partial artifacts (`.part`, `.ytdl`, intermediate formats) of a
/// failed extraction. Returns the number of files removed.
pub async fn remove_with_prefix(base: &Path) -> usize {
    let (Some(dir), Some(stem)) = (base.parent(), base.file_name().and_then(|n| n.to_str()))
    else {
        return 0;
    };

    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return 0;
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(stem));
        if matches && remove_quietly(&entry.path()).await {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_is_unique_and_prefixed() {
        let allocator = TempPathAllocator::new("/tmp/downloads");
        let paths: HashSet<PathBuf> = (0..500).map(|_| allocator.allocate("download")).collect();
        assert_eq!(paths.len(), 500);

        for path in &paths {
            assert_eq!(path.parent(), Some(Path::new("/tmp/downloads")));
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .expect("utf-8 file name");
            assert!(name.starts_with("download_"));
            let suffix = name.rsplit('_').next().expect("random suffix");
            assert_eq!(suffix.len(), RANDOM_SUFFIX_LEN);
            assert!(suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_remove_quietly_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("file.bin");
        tokio::fs::write(&path, b"data").await.expect("write");

        assert!(remove_quietly(&path).await);
        assert!(!path.exists());
        // Second delete of an absent file is a no-op
        assert!(!remove_quietly(&path).await);
    }

    #[tokio::test]
    async fn test_remove_with_prefix_only_touches_matching_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("ytdlp_youtube_1_abc");
        for name in ["ytdlp_youtube_1_abc.mp4.part", "ytdlp_youtube_1_abc.f137.mp4", "other.mp4"] {
            tokio::fs::write(dir.path().join(name), b"x").await.expect("write");
        }

        assert_eq!(remove_with_prefix(&base).await, 2);
        assert!(dir.path().join("other.mp4").exists());
    }
}
