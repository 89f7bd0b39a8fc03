//! Platform-specific paths for patches and configuration.
//!
//! - **User config**: `~/.config/rill/` (Linux), `~/Library/Application Support/rill/` (macOS), `%APPDATA%\rill\` (Windows)
//! - **User patches**: the `patches/` subdirectory of the user config directory

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::factory_patches::get_factory_patch;
use crate::patch::Patch;

/// Application name used for directory paths.
const APP_NAME: &str = "rill";

/// Subdirectory name for patches.
const PATCHES_SUBDIR: &str = "patches";

/// File name of the engine settings inside the user config directory.
const CONFIG_FILE: &str = "config.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the user-specific patches directory.
pub fn user_patches_dir() -> PathBuf {
    user_config_dir().join(PATCHES_SUBDIR)
}

/// Path of the user's engine settings file.
pub fn config_file_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// Ensure the user patches directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_patches_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_patches_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Find a patch file by name.
///
/// `name` may be a path to a TOML file, or a patch name (with or without
/// `.toml`) looked up in [`user_patches_dir`].
pub fn find_patch(name: &str) -> Option<PathBuf> {
    find_patch_in(name, &user_patches_dir())
}

fn find_patch_in(name: &str, dir: &Path) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }
    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let user_path = dir.join(filename);
    user_path.is_file().then_some(user_path)
}

/// Loads a patch by path or name, falling back to the factory patches.
pub fn resolve_patch(name: &str) -> Result<Patch, ConfigError> {
    resolve_patch_in(name, &user_patches_dir())
}

/// [`resolve_patch`] with an explicit user patches directory.
pub fn resolve_patch_in(name: &str, dir: &Path) -> Result<Patch, ConfigError> {
    if let Some(path) = find_patch_in(name, dir) {
        tracing::debug!(path = %path.display(), "loading patch file");
        return Patch::load(path);
    }
    get_factory_patch(name).ok_or_else(|| ConfigError::PatchNotFound(name.to_string()))
}

/// List all patch files in the user patches directory.
///
/// Returns an empty vector if the directory doesn't exist or can't be read.
pub fn list_user_patches() -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(user_patches_dir()) else {
        return Vec::new();
    };
    let mut patches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    patches.sort();
    patches
}

/// Get the patch name from a file path (the file stem).
pub fn patch_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dirs_nest() {
        assert!(user_config_dir().ends_with(APP_NAME));
        assert!(user_patches_dir().starts_with(user_config_dir()));
        assert!(config_file_path().ends_with("rill/config.toml"));
    }

    #[test]
    fn test_patch_name_from_path() {
        assert_eq!(
            patch_name_from_path(Path::new("/a/b/warm_pad.toml")),
            Some("warm_pad".to_string())
        );
    }

    #[test]
    fn test_resolve_prefers_user_dir() {
        let dir = TempDir::new().unwrap();
        Patch::new("my sine").save(dir.path().join("sine.toml")).unwrap();

        let patch = resolve_patch_in("sine", dir.path()).unwrap();
        assert_eq!(patch.display_name(), "my sine");

        let factory = resolve_patch_in("chord", dir.path()).unwrap();
        assert_eq!(factory.display_name(), "chord");

        assert!(matches!(
            resolve_patch_in("missing", dir.path()),
            Err(ConfigError::PatchNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_by_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("elsewhere.toml");
        Patch::new("direct").save(&path).unwrap();
        let patch = resolve_patch_in(path.to_str().unwrap(), Path::new("/nonexistent")).unwrap();
        assert_eq!(patch.display_name(), "direct");
    }
}
