// Application directory resolution
use directories::ProjectDirs;
use std::path::PathBuf;

/// Root directory for settings, logs and the transcode cache.
///
/// `PHONOGRAPH_HOME` overrides the platform data directory.
pub fn app_root() -> anyhow::Result<PathBuf> {
    if let Some(home) = std::env::var_os("PHONOGRAPH_HOME") {
        return Ok(PathBuf::from(home));
    }
    let dirs = ProjectDirs::from("", "", "phonograph")
        .ok_or_else(|| anyhow::anyhow!("No suitable data directory available"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn logs_dir(app_root: &std::path::Path) -> PathBuf {
    app_root.join("logs")
}
