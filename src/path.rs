// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that strapon needs
//! to read, i.e., user settings, application manifests, and the OS
//! release-info file.

use std::path::{Path, PathBuf};

/// Primary location of the OS release-info file.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Vendor location of the OS release-info file.
///
/// Distributions are allowed to only ship this one, with `/etc/os-release`
/// being a symlink that may be missing.
pub const OS_RELEASE_FALLBACK_PATH: &str = "/usr/lib/os-release";

/// Determine default absolute path to strapon's configuration directory.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/strapon`. Does not check if
/// the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("strapon"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the settings file.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_settings_file() -> Result<PathBuf> {
    default_config_dir().map(|path| path.join("config.toml"))
}

/// Determine default absolute path to the application manifest directory.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_manifest_dir() -> Result<PathBuf> {
    default_config_dir().map(|path| path.join("apps"))
}

/// Resolve application argument into path to its manifest.
///
/// Anything that looks like a path, i.e., has a ".toml" extension or more
/// than one component, is used as-is. Otherwise the argument is treated as
/// an application name inside of the manifest directory.
pub fn manifest_path(manifest_dir: impl AsRef<Path>, app: impl AsRef<str>) -> PathBuf {
    let app = Path::new(app.as_ref());
    let is_path = app.extension().is_some_and(|ext| ext == "toml") || app.components().count() > 1;
    if is_path {
        return app.to_path_buf();
    }

    manifest_dir.as_ref().join(format!("{}.toml", app.display()))
}

/// Determine which OS release-info file to read.
///
/// Prefers `/etc/os-release`, but falls back to `/usr/lib/os-release` when
/// the former is missing.
pub fn os_release_file() -> PathBuf {
    let primary = Path::new(OS_RELEASE_PATH);
    if primary.exists() {
        return primary.to_path_buf();
    }

    PathBuf::from(OS_RELEASE_FALLBACK_PATH)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
