use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Image extensions accepted by the `photos` upload set.
pub const IMAGES: &[&str] = &["jpg", "jpe", "jpeg", "png", "gif", "bmp"];

/// An uploaded file as received from a form, before it is stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub original_filename: String,
    pub data: Vec<u8>,
}

/// A file written to the upload set.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedFile {
    pub filename: String,
    pub url: String,
}

/// Named on-disk storage area for user uploads.
///
/// Files are stored flat at `{dir}/{filename}` and served from
/// `{base_url}/{filename}`. Stored names are generated, never taken from the
/// client.
pub struct UploadSet {
    name: String,
    dir: PathBuf,
    base_url: String,
    extensions: &'static [&'static str],
}

impl UploadSet {
    pub async fn new(
        name: &str,
        dir: PathBuf,
        base_url: &str,
        extensions: &'static [&'static str],
    ) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload set '{}' stored in {}", name, dir.display());
        Ok(Self {
            name: name.to_string(),
            dir,
            base_url: base_url.trim_end_matches('/').to_string(),
            extensions,
        })
    }

    pub async fn photos(dir: PathBuf, base_url: &str) -> Result<Self> {
        Self::new("photos", dir, base_url, IMAGES).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lower-cased extension of `filename` if this set accepts it.
    pub fn allowed_extension(&self, filename: &str) -> Option<String> {
        let extension = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        self.extensions
            .contains(&extension.as_str())
            .then_some(extension)
    }

    /// Public URL of a stored file.
    pub fn url(&self, filename: &str) -> String {
        format!("{}/{}", self.base_url, filename)
    }

    /// On-disk path of a stored file. Directory components in `filename`
    /// are dropped.
    pub fn path(&self, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        self.dir.join(name)
    }

    /// Store `data` under a freshly generated name that keeps the original
    /// extension.
    pub async fn save(&self, original_filename: &str, data: &[u8]) -> Result<SavedFile> {
        let Some(extension) = self.allowed_extension(original_filename) else {
            bail!(
                "File type of '{}' is not allowed in upload set '{}'",
                original_filename,
                self.name
            );
        };

        let filename = generate_file_name(&extension);
        let path = self.path(&filename);
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        info!("Saved upload {} ({} bytes)", filename, data.len());
        Ok(SavedFile {
            url: self.url(&filename),
            filename,
        })
    }

    /// Delete a stored file. A file that is already gone is not an error.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let path = self.path(filename);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted upload {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Upload {} already gone", filename);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, filename: &str) -> bool {
        fs::try_exists(self.path(filename)).await.unwrap_or(false)
    }
}

fn generate_file_name(extension: &str) -> String {
    format!("{}.{}", Uuid::new_v4().simple(), extension)
}
