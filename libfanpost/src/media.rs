//! Local image handling around a publish
//!
//! [`ImageSource`] turns image names into in-memory [`MediaImage`]s before
//! the orchestrator runs; [`ImageCleanup`] disposes of the originals once
//! every adapter is done with them. Both are traits so deployments that keep
//! images elsewhere can plug in their own storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{FanpostError, Result};
use crate::types::{MediaImage, MAX_POST_IMAGES};

/// Resolves image names to image bytes
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Load the named images, in order
    ///
    /// Names that cannot be loaded are skipped with a warning.
    async fn load(&self, names: &[String]) -> Result<Vec<MediaImage>>;
}

/// Removes source images after publishing
#[async_trait]
pub trait ImageCleanup: Send + Sync {
    /// Best effort; failures are logged, never returned
    async fn cleanup(&self, names: &[String]);
}

/// Reads images from a local directory
pub struct LocalImageSource {
    root: PathBuf,
}

impl LocalImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Resolve `name` under `root`; absolute names are used as-is
fn resolve(root: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// File name component of `name`, used as the image label
fn display_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

#[async_trait]
impl ImageSource for LocalImageSource {
    async fn load(&self, names: &[String]) -> Result<Vec<MediaImage>> {
        if names.len() > MAX_POST_IMAGES {
            return Err(FanpostError::InvalidInput(format!(
                "A post may carry at most {} images, got {}",
                MAX_POST_IMAGES,
                names.len()
            )));
        }

        let mut images = Vec::with_capacity(names.len());
        for name in names {
            let path = resolve(&self.root, name);
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    debug!("Loaded image {} ({} bytes)", path.display(), data.len());
                    images.push(MediaImage::new(display_name(name), data));
                }
                Err(e) => warn!("Skipping image {}: {}", path.display(), e),
            }
        }

        Ok(images)
    }
}

/// Deletes the source files from a local directory
pub struct LocalImageCleanup {
    root: PathBuf,
}

impl LocalImageCleanup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ImageCleanup for LocalImageCleanup {
    async fn cleanup(&self, names: &[String]) {
        for name in names {
            let path = resolve(&self.root, name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Deleted image {}", path.display()),
                Err(e) => warn!("Failed to delete image {}: {}", path.display(), e),
            }
        }
    }
}

/// Keeps every file
pub struct NoCleanup;

#[async_trait]
impl ImageCleanup for NoCleanup {
    async fn cleanup(&self, _names: &[String]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageMimeType;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_load_reads_files_in_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"jpeg bytes").unwrap();
        std::fs::write(dir.path().join("a.png"), b"png bytes").unwrap();

        let source = LocalImageSource::new(dir.path());
        let images = source.load(&names(&["b.jpg", "a.png"])).await.unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].file_name, "b.jpg");
        assert_eq!(images[0].mime_type, Some(ImageMimeType::Jpeg));
        assert_eq!(images[0].data, b"jpeg bytes");
        assert_eq!(images[1].file_name, "a.png");
    }

    #[tokio::test]
    async fn test_missing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("present.png"), b"x").unwrap();

        let source = LocalImageSource::new(dir.path());
        let images = source
            .load(&names(&["missing.png", "present.png"]))
            .await
            .unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name, "present.png");
    }

    #[tokio::test]
    async fn test_absolute_names_bypass_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abs.png");
        std::fs::write(&path, b"x").unwrap();

        let source = LocalImageSource::new("/nonexistent-root");
        let images = source
            .load(&[path.to_string_lossy().into_owned()])
            .await
            .unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name, "abs.png");
    }

    #[tokio::test]
    async fn test_too_many_images_rejected() {
        let source = LocalImageSource::new("/tmp");
        let many: Vec<String> = (0..11).map(|i| format!("{}.png", i)).collect();

        let error = source.load(&many).await.unwrap_err();
        assert_eq!(error.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_cleanup_removes_files_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.png");
        std::fs::write(&path, b"x").unwrap();

        LocalImageCleanup::new(dir.path())
            .cleanup(&names(&["gone.png", "never-existed.png"]))
            .await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_no_cleanup_keeps_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kept.png");
        std::fs::write(&path, b"x").unwrap();

        NoCleanup.cleanup(&names(&["kept.png"])).await;

        assert!(path.exists());
    }
}
