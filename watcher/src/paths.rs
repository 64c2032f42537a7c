/// Canonical file locations for the watcher.
///
/// The config file lives in the platform config directory:
///   - Linux:   $XDG_CONFIG_HOME/aw-watcher-camera/config.toml
///   - macOS:   ~/Library/Application Support/aw-watcher-camera/config.toml
///   - Windows: %APPDATA%\aw-watcher-camera\config.toml
use std::path::PathBuf;

const APP_DIR_NAME: &str = "aw-watcher-camera";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns the watcher's config directory, falling back to the working
/// directory when the platform does not report one.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Returns the full path to the default config file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_ends_with_app_name() {
        let dir = config_dir();
        assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
    }

    #[test]
    fn config_file_path_has_correct_name() {
        let path = config_file_path();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
        assert_eq!(path.parent(), Some(config_dir().as_path()));
    }
}
