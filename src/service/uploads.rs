use log::warn;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{GateError, GateResult};

/// Saved gate images, one flat directory.
pub struct UploadStore {
    dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SavedImage {
    pub path: PathBuf,
    pub file_name: String,
}

impl SavedImage {
    /// Forward-slash form stored in previews and log entries.
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> GateResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an upload under a fresh name. Rejects bytes that are not a
    /// recognizable image before touching the disk.
    pub async fn save(&self, prefix: &str, bytes: &[u8]) -> GateResult<SavedImage> {
        if bytes.is_empty() {
            return Err(GateError::Validation("No image selected".to_string()));
        }
        let format = image::guess_format(bytes).map_err(|_| {
            GateError::Validation("uploaded file is not a supported image".to_string())
        })?;
        let ext = format.extensions_str().first().copied().unwrap_or("img");

        let file_name = format!("{}_{}.{}", prefix, Uuid::new_v4().simple(), ext);
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(SavedImage { path, file_name })
    }

    /// Best effort; a leftover file is only logged.
    pub async fn remove(&self, image: &SavedImage) {
        self.remove_path(&image.path).await;
    }

    /// Remove an image by the path recorded in a preview.
    pub async fn remove_path(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("could not remove upload {}: {}", path.display(), e);
        }
    }

    /// Path of a stored file, refusing anything that could leave the directory.
    pub fn resolve(&self, file_name: &str) -> GateResult<PathBuf> {
        let plain = !file_name.is_empty()
            && !file_name.contains(['/', '\\'])
            && file_name != "."
            && file_name != ".."
            && !file_name.contains("..");
        if !plain {
            return Err(GateError::Validation("invalid file name".to_string()));
        }
        let path = self.dir.join(file_name);
        if !path.is_file() {
            return Err(GateError::MissingFile(format!("{} not found", file_name)));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn temp_store() -> (TempDir, UploadStore) {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn saves_and_removes_images() {
        let (_dir, store) = temp_store();
        let saved = store.save("check", PNG).await.unwrap();
        assert!(saved.file_name.starts_with("check_"));
        assert!(saved.file_name.ends_with(".png"));
        assert!(saved.path.is_file());
        assert_eq!(store.resolve(&saved.file_name).unwrap(), saved.path);

        store.remove(&saved).await;
        assert!(!saved.path.exists());
    }

    #[tokio::test]
    async fn removes_by_recorded_path() {
        let (_dir, store) = temp_store();
        let saved = store.save("preview", PNG).await.unwrap();
        store.remove_path(Path::new(&saved.display_path())).await;
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);

        // already gone: only logged
        store.remove_path(&saved.path).await;
    }

    #[tokio::test]
    async fn rejects_non_images() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.save("check", b"hello world").await,
            Err(GateError::Validation(_))
        ));
        assert!(matches!(store.save("check", b"").await, Err(GateError::Validation(_))));
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);
    }

    #[test]
    fn resolve_refuses_traversal() {
        let (_dir, store) = temp_store();
        for bad in ["../secret", "a/b.png", "..", "", "x\\y.png"] {
            assert!(matches!(store.resolve(bad), Err(GateError::Validation(_))), "{}", bad);
        }
        assert!(matches!(store.resolve("missing.png"), Err(GateError::MissingFile(_))));
    }
}
