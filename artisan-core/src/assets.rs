use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// URL prefix under which stored assets are served to previews.
pub const ASSET_URL_PREFIX: &str = "/assets/";

/// Subdirectory of the store root that holds uploads still being written.
const PARTIAL_DIR: &str = ".partial";

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("invalid asset filename {0:?}")]
    InvalidFilename(String),
    #[error("asset {0:?} not found")]
    NotFound(String),
    #[error("asset store I/O failed at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AssetError {
    fn io(path: &Path, source: io::Error) -> Self {
        AssetError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Flat store of user-uploaded files that generated pages may reference.
pub trait AssetStore: Send + Sync {
    /// URLs of every stored asset, sorted by name.
    fn list(&self) -> Result<Vec<String>, AssetError>;
    /// Stores `bytes` under `name`, replacing any previous file. Returns the URL.
    fn upload(&self, name: &str, bytes: &[u8]) -> Result<String, AssetError>;
    fn delete(&self, name: &str) -> Result<(), AssetError>;
    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError>;
}

/// Rejects names that could escape the store root.
pub fn validate_asset_name(name: &str) -> Result<(), AssetError> {
    if name.is_empty()
        || name == PARTIAL_DIR
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(AssetError::InvalidFilename(name.to_owned()));
    }
    Ok(())
}

pub fn asset_url(name: &str) -> String {
    format!("{ASSET_URL_PREFIX}{name}")
}

pub struct FileAssetStore {
    root: PathBuf,
}

impl FileAssetStore {
    /// The root directory is created lazily on first use.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<(), AssetError> {
        fs::create_dir_all(&self.root).map_err(|err| AssetError::io(&self.root, err))
    }

    fn asset_path(&self, name: &str) -> Result<PathBuf, AssetError> {
        validate_asset_name(name)?;
        Ok(self.root.join(name))
    }
}

impl AssetStore for FileAssetStore {
    fn list(&self) -> Result<Vec<String>, AssetError> {
        self.ensure_root()?;
        let entries = fs::read_dir(&self.root).map_err(|err| AssetError::io(&self.root, err))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| AssetError::io(&self.root, err))?;
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names.iter().map(|name| asset_url(name)).collect())
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    fn upload(&self, name: &str, bytes: &[u8]) -> Result<String, AssetError> {
        let path = self.asset_path(name)?;
        self.ensure_root()?;
        let partial = self.root.join(PARTIAL_DIR);
        fs::create_dir_all(&partial).map_err(|err| AssetError::io(&partial, err))?;
        let mut tmp =
            NamedTempFile::new_in(&partial).map_err(|err| AssetError::io(&partial, err))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.flush())
            .map_err(|err| AssetError::io(tmp.path(), err))?;
        tmp.persist(&path)
            .map_err(|err| AssetError::io(&path, err.error))?;
        debug!(path = %path.display(), "stored asset");
        Ok(asset_url(name))
    }

    #[instrument(skip(self))]
    fn delete(&self, name: &str) -> Result<(), AssetError> {
        let path = self.asset_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(name.to_owned()))
            }
            Err(err) => Err(AssetError::io(&path, err)),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.asset_path(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(name.to_owned()))
            }
            Err(err) => Err(AssetError::io(&path, err)),
        }
    }
}

pub struct MemoryAssetStore {
    inner: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetStore for MemoryAssetStore {
    fn list(&self) -> Result<Vec<String>, AssetError> {
        Ok(self.inner.lock().keys().map(|name| asset_url(name)).collect())
    }

    fn upload(&self, name: &str, bytes: &[u8]) -> Result<String, AssetError> {
        validate_asset_name(name)?;
        self.inner.lock().insert(name.to_owned(), bytes.to_vec());
        Ok(asset_url(name))
    }

    fn delete(&self, name: &str) -> Result<(), AssetError> {
        validate_asset_name(name)?;
        self.inner
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AssetError::NotFound(name.to_owned()))
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        validate_asset_name(name)?;
        self.inner
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn file_store_lists_uploads_sorted_as_urls() {
        let dir = tempdir().unwrap();
        let store = FileAssetStore::new(dir.path().join("assets"));

        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.upload("logo.png", b"png").unwrap(), "/assets/logo.png");
        store.upload("hero.jpg", b"jpg").unwrap();

        assert_eq!(
            store.list().unwrap(),
            vec!["/assets/hero.jpg".to_owned(), "/assets/logo.png".to_owned()]
        );
        assert_eq!(store.read("logo.png").unwrap(), b"png");
    }

    #[test]
    fn file_store_lists_every_stored_name() {
        let dir = tempdir().unwrap();
        let store = FileAssetStore::new(dir.path().join("assets"));
        store.upload("notes.tmp", b"x").unwrap();
        store.upload("photo.png", b"p").unwrap();

        assert_eq!(
            store.list().unwrap(),
            vec!["/assets/notes.tmp".to_owned(), "/assets/photo.png".to_owned()]
        );
        assert_eq!(store.read("notes.tmp").unwrap(), b"x");
        assert!(matches!(
            store.upload(".partial", b"x"),
            Err(AssetError::InvalidFilename(_))
        ));
    }

    #[test]
    fn file_store_delete_removes_file() {
        let dir = tempdir().unwrap();
        let store = FileAssetStore::new(dir.path().to_path_buf());
        store.upload("a.txt", b"a").unwrap();

        store.delete("a.txt").unwrap();
        assert!(!dir.path().join("a.txt").exists());
        assert!(matches!(store.delete("a.txt"), Err(AssetError::NotFound(_))));
        assert!(matches!(store.read("a.txt"), Err(AssetError::NotFound(_))));
    }

    #[test]
    fn traversal_names_are_rejected_before_touching_disk() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, b"keep").unwrap();
        let store = FileAssetStore::new(dir.path().join("assets"));

        for name in ["../secret.txt", "..", "nested/file.png", "back\\slash", ""] {
            assert!(
                matches!(store.delete(name), Err(AssetError::InvalidFilename(_))),
                "{name:?} should be rejected"
            );
            assert!(matches!(
                store.upload(name, b"x"),
                Err(AssetError::InvalidFilename(_))
            ));
        }
        assert!(outside.exists());
        assert!(!dir.path().join("assets").exists());
    }

    #[test]
    fn memory_store_mirrors_file_store_rules() {
        let store = MemoryAssetStore::new();
        store.upload("b.css", b"b").unwrap();
        store.upload("a.css", b"a").unwrap();
        assert_eq!(
            store.list().unwrap(),
            vec!["/assets/a.css".to_owned(), "/assets/b.css".to_owned()]
        );
        assert!(matches!(
            store.delete("../a.css"),
            Err(AssetError::InvalidFilename(_))
        ));
        store.delete("a.css").unwrap();
        assert!(matches!(store.read("a.css"), Err(AssetError::NotFound(_))));
    }
}
