//! Object storage capability: keyed byte blobs with get, put, and prefix list.
//!
//! Keys are `/`-separated strings. Listing returns every key that starts with
//! the given prefix, recursively, in lexicographic order.

use crate::error::{IngestError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Storage operations the pipeline depends on.
pub trait ObjectStore: Send + Sync {
    /// Read a whole object.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Create or replace an object.
    fn put(&self, key: &str, body: &[u8]) -> Result<()>;

    /// All keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-process store backed by a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self
            .objects
            .read()
            .map_err(|e| IngestError::Storage(format!("lock poisoned: {e}")))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| IngestError::ObjectNotFound {
                key: key.to_string(),
            })
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let mut objects = self
            .objects
            .write()
            .map_err(|e| IngestError::Storage(format!("lock poisoned: {e}")))?;
        objects.insert(key.to_string(), body.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self
            .objects
            .read()
            .map_err(|e| IngestError::Storage(format!("lock poisoned: {e}")))?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Store rooted at a local directory; a key maps to `{root}/{key}`.
///
/// Writes are atomic: write to `.tmp`, then rename into place.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

const TMP_SUFFIX: &str = ".tmp";

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(IngestError::Storage(format!("invalid object key '{key}'")));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

impl ObjectStore for LocalStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IngestError::ObjectNotFound {
                    key: key.to_string(),
                }
            } else {
                IngestError::Storage(format!("read {}: {e}", path.display()))
            }
        })
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| IngestError::Storage(format!("failed to create dir: {e}")))?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, body)
            .map_err(|e| IngestError::Storage(format!("write {}: {e}", tmp_path.display())))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            IngestError::Storage(format!("atomic rename failed: {e}"))
        })
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Only descend into the deepest directory the prefix fully names.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.path_for(dir_part)?
        };

        let mut keys = Vec::new();
        if start.is_dir() {
            collect_keys(&start, dir_part, &mut keys)?;
        }
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(dir: &Path, key_prefix: &str, out: &mut Vec<String>) -> Result<()> {
    let entries =
        fs::read_dir(dir).map_err(|e| IngestError::Storage(format!("read dir: {e}")))?;

    for entry in entries {
        let entry = entry.map_err(|e| IngestError::Storage(format!("dir entry: {e}")))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if key_prefix.is_empty() {
            name.clone()
        } else {
            format!("{key_prefix}/{name}")
        };

        let file_type = entry
            .file_type()
            .map_err(|e| IngestError::Storage(format!("file type: {e}")))?;
        if file_type.is_dir() {
            collect_keys(&entry.path(), &key, out)?;
        } else if !name.ends_with(TMP_SUFFIX) {
            out.push(key);
        }
    }
    Ok(())
}
