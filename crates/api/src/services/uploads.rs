//! Product image storage on local disk.
//!
//! Files are written under `UPLOAD_DIR` with a fresh UUID name and served
//! by `ServeDir` at `/uploads`.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Largest accepted image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// URL prefix the upload directory is mounted at.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Errors that can occur while storing an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Writing to disk failed.
    #[error("upload storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Content type is not an accepted image type.
    #[error("Only image files are allowed (got {0})")]
    UnsupportedType(String),

    /// Empty file part.
    #[error("Uploaded file is empty")]
    Empty,

    /// File is larger than [`MAX_IMAGE_BYTES`].
    #[error("Image exceeds the 5 MB limit")]
    TooLarge,

    /// Malformed multipart body or field.
    #[error("{0}")]
    Malformed(String),
}

impl From<axum::extract::multipart::MultipartError> for UploadError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::Malformed(err.body_text())
    }
}

/// File extension for an accepted image content type.
#[must_use]
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

/// Writes images to disk and builds their public URLs.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    public_base: String,
}

impl ImageStore {
    /// Store files in `dir`, publicly reachable under `{base_url}/uploads`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_base: format!("{}{PUBLIC_PREFIX}", base_url.trim_end_matches('/')),
        }
    }

    /// Directory files are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the upload directory if it is missing.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Io` if the directory cannot be created.
    pub async fn ensure_dir(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Validate and save one image, returning its public URL.
    ///
    /// # Errors
    ///
    /// Returns `UploadError` if the file is not an image, empty, too large,
    /// or cannot be written.
    pub async fn save(&self, content_type: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let ext = extension_for(content_type)
            .ok_or_else(|| UploadError::UnsupportedType(content_type.to_owned()))?;
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(UploadError::TooLarge);
        }

        let file_name = format!("{}.{ext}", Uuid::new_v4().simple());
        tokio::fs::write(self.dir.join(&file_name), bytes).await?;

        tracing::debug!(file = %file_name, size = bytes.len(), "Stored product image");
        Ok(format!("{}/{file_name}", self.public_base))
    }

    /// Delete files saved by [`ImageStore::save`] that ended up unused.
    ///
    /// Failures are logged, not returned: the caller is already on an
    /// error path. URLs that do not point into this store are ignored.
    pub async fn discard(&self, urls: &[String]) {
        for url in urls {
            let Some(file_name) = self.file_name(url) else {
                tracing::warn!(url = %url, "Not a stored image, not deleting");
                continue;
            };
            match tokio::fs::remove_file(self.dir.join(file_name)).await {
                Ok(()) => tracing::debug!(file = %file_name, "Discarded unused product image"),
                Err(e) => tracing::warn!(file = %file_name, error = %e, "Failed to discard product image"),
            }
        }
    }

    /// File name inside the upload directory for one of our public URLs.
    fn file_name<'u>(&self, url: &'u str) -> Option<&'u str> {
        let name = url.strip_prefix(&self.public_base)?.strip_prefix('/')?;
        let plain = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\']);
        plain.then_some(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("IMAGE/JPEG; charset=binary"), Some("jpg"));
        assert_eq!(extension_for("image/svg+xml"), None);
        assert_eq!(extension_for("application/pdf"), None);
    }

    #[tokio::test]
    async fn test_save_writes_file() {
        let dir = std::env::temp_dir().join(format!("tp-uploads-{}", Uuid::new_v4().simple()));
        let store = ImageStore::new(&dir, "https://api.example.com/");
        store.ensure_dir().await.unwrap();

        let url = store.save("image/png", b"\x89PNG fake").await.unwrap();
        assert!(url.starts_with("https://api.example.com/uploads/"));
        assert!(url.ends_with(".png"));

        let file_name = url.rsplit('/').next().unwrap();
        let written = tokio::fs::read(dir.join(file_name)).await.unwrap();
        assert_eq!(written, b"\x89PNG fake");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_removes_saved_files_only() {
        let dir = std::env::temp_dir().join(format!("tp-uploads-{}", Uuid::new_v4().simple()));
        let store = ImageStore::new(&dir, "https://api.example.com");
        store.ensure_dir().await.unwrap();

        let first = store.save("image/png", b"one").await.unwrap();
        let second = store.save("image/webp", b"two").await.unwrap();
        store
            .discard(&[
                first.clone(),
                second.clone(),
                "https://api.example.com/uploads/../secret".to_owned(),
                "https://elsewhere.example/uploads/x.png".to_owned(),
            ])
            .await;

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn test_file_name_rejects_foreign_and_nested_paths() {
        let store = ImageStore::new("/tmp/uploads", "https://api.example.com");
        assert_eq!(
            store.file_name("https://api.example.com/uploads/abc.png"),
            Some("abc.png")
        );
        assert_eq!(store.file_name("https://api.example.com/uploads/../etc/passwd"), None);
        assert_eq!(store.file_name("https://api.example.com/uploads/.hidden"), None);
        assert_eq!(store.file_name("https://cdn.example.com/uploads/abc.png"), None);
    }

    #[tokio::test]
    async fn test_save_rejects_non_images_and_empty_files() {
        let store = ImageStore::new(std::env::temp_dir(), "http://localhost:8080");
        assert!(matches!(
            store.save("text/html", b"<script>").await,
            Err(UploadError::UnsupportedType(_))
        ));
        assert!(matches!(
            store.save("image/gif", b"").await,
            Err(UploadError::Empty)
        ));
    }
}
