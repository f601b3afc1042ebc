use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::node::{timestamp, Node, NodeKind, NodeMetadata};
use crate::storage_traits::{
    validate_key, SearchFilter, StorageBackend, META_SUFFIX, TEMP_PREFIX, VERSIONS_DIR,
};
use crate::StateResult;

/// File-tree backend with sidecar metadata and on-disk revision history.
///
/// Layout:
/// - `<root>/<rel>`: content
/// - `<root>/<rel>.meta.json`: metadata, node kind and absolute path
/// - `<root>/.versions/<rel>/v<N>` + `v<N>.meta.json`: revision N
///
/// Every file is written to a temp file in the target directory and then
/// renamed into place, so readers never see a partially written file.
pub struct FsBackend {
    root: PathBuf,
}

/// On-disk shape of a metadata sidecar: the metadata fields flattened next
/// to the node's kind and absolute path.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    path: String,
    #[serde(default = "default_kind")]
    node_type: NodeKind,
    #[serde(flatten)]
    metadata: NodeMetadata,
}

fn default_kind() -> NodeKind {
    NodeKind::File
}

impl Sidecar {
    fn from_node(node: &Node) -> Self {
        Self {
            path: node.path.clone(),
            node_type: node.kind,
            metadata: node.metadata.clone(),
        }
    }

    fn into_node(self, content: Option<String>) -> Node {
        Node {
            path: self.path,
            kind: self.node_type,
            metadata: self.metadata,
            content,
        }
    }
}

impl FsBackend {
    /// Create a new `FsBackend` rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> StateResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{META_SUFFIX}"))
    }

    fn version_dir(&self, key: &str) -> PathBuf {
        self.root.join(VERSIONS_DIR).join(key)
    }

    fn atomic_write(path: &Path, data: &[u8]) -> StateResult<()> {
        let dir = match path.parent() {
            Some(dir) => dir,
            None => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // validate_key reserves this prefix
        let mut tmp = Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn load(meta_path: &Path, content_path: &Path) -> StateResult<Option<Node>> {
        if !meta_path.is_file() {
            return Ok(None);
        }
        let sidecar: Sidecar = serde_json::from_slice(&fs::read(meta_path)?)?;
        let content = if content_path.is_file() {
            Some(fs::read_to_string(content_path)?)
        } else {
            None
        };
        Ok(Some(sidecar.into_node(content)))
    }

    fn write_pair(content_path: &Path, meta_path: &Path, node: &Node) -> StateResult<()> {
        match &node.content {
            Some(content) => Self::atomic_write(content_path, content.as_bytes())?,
            None => {
                if content_path.is_file() {
                    fs::remove_file(content_path)?;
                }
            }
        }
        let meta = serde_json::to_vec_pretty(&Sidecar::from_node(node))?;
        Self::atomic_write(meta_path, &meta)
    }

    /// Copy the current node into the revision directory, keyed by its version.
    fn snapshot(&self, key: &str, existing: &Node) -> StateResult<()> {
        let vdir = self.version_dir(key);
        let version = existing.metadata.version;
        let content_path = vdir.join(format!("v{version}"));
        let meta_path = vdir.join(format!("v{version}{META_SUFFIX}"));
        Self::write_pair(&content_path, &meta_path, existing)?;
        debug!(key = %key, version, "revision snapshot written");
        Ok(())
    }

    /// Remove now-empty directories between `start` and the root.
    fn prune_empty_dirs(&self, start: Option<&Path>) {
        let mut current = start.map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // remove_dir only succeeds on empty directories
            if fs::remove_dir(&dir).is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }

    fn key_of(&self, meta_file: &Path) -> Option<String> {
        let rel = meta_file.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let joined = segments.join("/");
        joined.strip_suffix(META_SUFFIX).map(str::to_string)
    }

    /// Read the revision keyed by `version` at `path`.
    pub fn read_version_at(&self, path: &str, version: u64) -> StateResult<Option<Node>> {
        let key = validate_key(path, false)?;
        let vdir = self.version_dir(&key);
        Self::load(
            &vdir.join(format!("v{version}{META_SUFFIX}")),
            &vdir.join(format!("v{version}")),
        )
    }
}

impl StorageBackend for FsBackend {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    fn read(&self, path: &str) -> StateResult<Option<Node>> {
        let key = validate_key(path, true)?;
        if key.is_empty() {
            return Ok(None);
        }
        Self::load(&self.meta_path(&key), &self.content_path(&key))
    }

    fn write(&self, path: &str, node: &Node) -> StateResult<()> {
        let key = validate_key(path, false)?;

        if let Some(existing) = self.read(&key)? {
            if node.metadata.version <= existing.metadata.version {
                warn!(
                    key = %key,
                    existing = existing.metadata.version,
                    incoming = node.metadata.version,
                    "non-increasing version write; revision will be overwritten later"
                );
            }
            self.snapshot(&key, &existing)?;
        }

        Self::write_pair(&self.content_path(&key), &self.meta_path(&key), node)?;
        debug!(key = %key, version = node.metadata.version, "node written");
        Ok(())
    }

    fn list(&self, path: &str) -> StateResult<Vec<String>> {
        let key = validate_key(path, true)?;
        let target = if key.is_empty() {
            self.root.clone()
        } else {
            self.content_path(&key)
        };
        if !target.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&target)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) || (key.is_empty() && name == VERSIONS_DIR) {
                continue;
            }
            if let Some(stem) = name.strip_suffix(META_SUFFIX) {
                names.insert(stem.to_string());
            } else if entry.file_type()?.is_dir() {
                names.insert(name);
            }
        }
        Ok(names.into_iter().collect())
    }

    fn delete(&self, path: &str) -> StateResult<bool> {
        let key = validate_key(path, true)?;
        if key.is_empty() {
            return Ok(false);
        }
        let content_path = self.content_path(&key);
        let meta_path = self.meta_path(&key);
        let mut deleted = false;
        if content_path.is_file() {
            fs::remove_file(&content_path)?;
            deleted = true;
        }
        if meta_path.is_file() {
            fs::remove_file(&meta_path)?;
            deleted = true;
        }
        if deleted {
            self.prune_empty_dirs(meta_path.parent());
            debug!(key = %key, "node deleted");
        }
        Ok(deleted)
    }

    fn search(&self, path: &str, filter: &SearchFilter) -> StateResult<Vec<Node>> {
        let key = validate_key(path, true)?;
        let target = if key.is_empty() {
            self.root.clone()
        } else {
            self.content_path(&key)
        };
        if !target.is_dir() {
            return Ok(Vec::new());
        }

        let versions_root = self.root.join(VERSIONS_DIR);
        let mut keys = Vec::new();
        for entry in WalkDir::new(&target)
            .into_iter()
            .filter_entry(|e| e.path() != versions_root)
        {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => io,
                None => std::io::Error::other("directory walk failed"),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with(TEMP_PREFIX) || !name.ends_with(META_SUFFIX) {
                continue;
            }
            if let Some(k) = self.key_of(entry.path()) {
                keys.push(k);
            }
        }
        keys.sort();

        let mut results = Vec::new();
        for k in keys {
            if let Some(node) = self.read(&k)? {
                if filter.matches(&node) {
                    results.push(node);
                }
            }
        }
        Ok(results)
    }

    fn versions(&self, path: &str) -> StateResult<Vec<u64>> {
        let key = validate_key(path, false)?;
        let vdir = self.version_dir(&key);
        if !vdir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&vdir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            let Some(stem) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            if let Some(Ok(v)) = stem.strip_prefix('v').map(str::parse::<u64>) {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn read_version(&self, path: &str, version: u64) -> StateResult<Option<Node>> {
        self.read_version_at(path, version)
    }
}
