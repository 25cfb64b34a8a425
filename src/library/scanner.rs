use std::path::Path;
use walkdir::WalkDir;

/// List of supported audio file extensions
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a"];

/// Scanner for finding audio files in a single directory
pub struct DirectoryScanner;

impl DirectoryScanner {
    /// List the audio files directly inside `directory`, by file name.
    ///
    /// The result is sorted. A missing or unreadable directory yields an
    /// empty list.
    pub fn scan<P: AsRef<Path>>(directory: P) -> Vec<String> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            tracing::debug!("Not a directory, nothing to scan: {}", directory.display());
            return Vec::new();
        }

        let mut audio_files: Vec<String> = WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| Self::is_supported(entry.path()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();

        audio_files.sort();
        audio_files
    }

    /// Check if file has a supported extension (case-insensitive)
    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.MP3", "a.flac", "notes.txt", "c.m4a", "d.Wav", "cover.jpg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.mp3")).unwrap();

        let files = DirectoryScanner::scan(dir.path());
        assert_eq!(files, vec!["a.flac", "b.MP3", "c.m4a", "d.Wav"]);
    }

    #[test]
    fn test_scan_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("deep.mp3"), b"x").unwrap();
        fs::write(dir.path().join("top.mp3"), b"x").unwrap();

        assert_eq!(DirectoryScanner::scan(dir.path()), vec!["top.mp3"]);
    }

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(DirectoryScanner::scan(&missing).is_empty());
    }
}
