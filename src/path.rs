// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for the artifacts repokit reads and
//! writes, or for external runtime installations it needs to inspect.

use std::path::{Component, Path, PathBuf};

/// Name of dependency manifest written into scanned source directory.
pub const MANIFEST_FILE: &str = "dependencies.txt";

/// Name of metadata document at project root.
pub const DMP_FILE: &str = "dmp.json";

/// Name of directory holding cached schema documents at project root.
pub const SCHEMA_DIR: &str = "bin";

/// Name of project-local R library directory.
pub const RENV_DIR: &str = "renv";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default path of dependency manifest for source directory.
pub fn default_manifest_path(source_dir: impl AsRef<Path>) -> PathBuf {
    source_dir.as_ref().join(MANIFEST_FILE)
}

/// Determine project root that holds source directory.
///
/// The nearest ancestor of source directory, itself included, that holds a
/// `renv` directory wins. Without one, source directory is the root.
pub fn project_root(source_dir: impl AsRef<Path>) -> PathBuf {
    let source_dir = source_dir.as_ref();
    let absolute = std::path::absolute(source_dir).unwrap_or_else(|_| source_dir.to_path_buf());

    absolute
        .ancestors()
        .find(|dir| dir.join(RENV_DIR).is_dir())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source_dir.to_path_buf())
}

/// Render path relative to base with forward slashes.
///
/// Falls back to the path itself when it does not live under base. Leading
/// `./` components are dropped.
pub fn relative_posix(path: impl AsRef<Path>, base: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    let relative = path.strip_prefix(base.as_ref()).unwrap_or(path);

    relative
        .components()
        .filter_map(|component| match component {
            Component::CurDir => None,
            Component::RootDir => Some(String::new()),
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
