// Content-addressed transcode cache
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the hidden cache folder inside the application directory
pub const CACHE_DIR_NAME: &str = ".phonograph_cache";

/// Extension of cached artifacts
pub const ARTIFACT_EXTENSION: &str = "opus";

/// Number of hex digits of the path hash kept in artifact names
const HASH_LEN: usize = 32;

/// Maps source files to their cached artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache rooted in the hidden folder of `app_dir`
    pub fn in_app_dir(app_dir: &Path) -> Self {
        Self::new(app_dir.join(CACHE_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact path for `source`.
    ///
    /// Named `<hash>_<filename>.opus`, where the hash covers the absolute
    /// source path, so same-named files in different folders never collide
    /// and the name stays stable across restarts.
    pub fn cache_path_for(&self, source: &Path) -> PathBuf {
        let absolute = std::path::absolute(source).unwrap_or_else(|_| source.to_path_buf());
        let hash = blake3::hash(absolute.to_string_lossy().as_bytes()).to_hex();
        let filename = absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.root.join(format!(
            "{}_{}.{}",
            &hash.as_str()[..HASH_LEN],
            filename,
            ARTIFACT_EXTENSION
        ))
    }

    /// True when a fresh artifact exists for `source`.
    ///
    /// Fresh means the artifact was modified at or after the source. Any
    /// filesystem error counts as not optimized.
    pub fn is_optimized(&self, source: &Path) -> bool {
        let artifact = self.cache_path_for(source);
        let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified());

        match (modified(&artifact), modified(source)) {
            (Ok(artifact_time), Ok(source_time)) => artifact_time >= source_time,
            _ => false,
        }
    }

    /// Create the cache root if needed and return it
    pub fn ensure_cache_directory(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        Ok(self.root.clone())
    }
}
