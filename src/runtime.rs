// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installed package resolution.
//!
//! Cross-reference package names discovered by the scanner against what the
//! active language runtime actually has installed. Every runtime is inspected
//! through its on-disk package metadata registry. Resolution never installs
//! anything, never spawns a package manager, and never touches the network.
//! At most, a single interpreter call is made to locate an environment
//! prefix that was not given explicitly.
//!
//! A runtime that cannot be located is not an error. It reports its version
//! as `<Language> (not found)`, and every package resolves as unavailable.
//!
//! # See Also
//!
//! - [PEP 376](https://peps.python.org/pep-0376/)
//! - [Writing R Extensions: DESCRIPTION](https://cran.r-project.org/doc/manuals/r-release/R-exts.html#The-DESCRIPTION-file)

mod matlab;
mod python;
mod r;
mod stata;

pub use matlab::MatlabRuntime;
pub use python::{normalize_distribution_name, PythonRuntime};
pub use r::RRuntime;
pub use stata::StataRuntime;

use crate::{
    config::{ConfigError, Language},
    scan::StandardLibrary,
};

use std::{
    collections::BTreeSet,
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
};
use tracing::{debug, instrument};

/// Sentinel recorded for packages the runtime does not have installed.
pub const UNAVAILABLE: &str = "unavailable";

/// Package metadata registry of a language runtime.
pub trait Runtime: StandardLibrary {
    /// Language this runtime executes.
    fn language(&self) -> Language;

    /// Version of the runtime itself, if it could be located.
    fn version(&self) -> Option<String>;

    /// Look up installed package by the name code imports it with.
    fn installed(&self, name: &str) -> Option<Installed>;

    /// Look up installed package by its distribution name.
    ///
    /// Only differs from [`Runtime::installed`] for runtimes where import
    /// names and distribution names diverge.
    fn installed_distribution(&self, distribution: &str) -> Option<Installed> {
        self.installed(distribution)
    }

    /// Version string as it should appear in a manifest.
    fn version_label(&self) -> String {
        self.version()
            .unwrap_or_else(|| format!("{} (not found)", self.language()))
    }
}

/// Installed package metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    /// Name package was distributed under.
    pub distribution: String,

    /// Installed version.
    pub version: String,
}

/// Version a package resolved to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolvedVersion {
    Installed(String),
    Unavailable,
}

impl Display for ResolvedVersion {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Installed(version) => fmt.write_str(version),
            Self::Unavailable => fmt.write_str(UNAVAILABLE),
        }
    }
}

impl FromStr for ResolvedVersion {
    type Err = std::convert::Infallible;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let data = data.trim();
        match data {
            UNAVAILABLE | "" => Ok(Self::Unavailable),
            version => Ok(Self::Installed(version.to_string())),
        }
    }
}

/// One distinct top-level package discovered by scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// Name code imports package with.
    pub name: String,

    /// Distribution name, when it differs from import name.
    pub distribution: Option<String>,

    /// Resolved version of package.
    pub resolved_version: ResolvedVersion,
}

impl ImportRecord {
    /// Name installation tooling knows package by.
    pub fn package_name(&self) -> &str {
        self.distribution.as_deref().unwrap_or(&self.name)
    }

    /// Check if package resolved to an installed version.
    pub fn is_available(&self) -> bool {
        matches!(self.resolved_version, ResolvedVersion::Installed(_))
    }
}

/// Resolve package names against runtime.
///
/// Names are looked up as import names first, then as distribution names.
/// Standard library modules are dropped entirely. Names the runtime cannot
/// resolve are kept as [`ResolvedVersion::Unavailable`]. Records come back
/// sorted by name without duplicates.
#[instrument(skip(runtime, names), level = "debug")]
pub fn resolve<R, N>(runtime: &R, names: impl IntoIterator<Item = N>) -> Vec<ImportRecord>
where
    R: Runtime + ?Sized,
    N: AsRef<str>,
{
    let names: BTreeSet<String> = names
        .into_iter()
        .map(|name| name.as_ref().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    names
        .into_iter()
        .filter(|name| !runtime.contains(name))
        .map(|name| match runtime
            .installed(&name)
            .or_else(|| runtime.installed_distribution(&name))
        {
            Some(installed) => {
                let distribution = (installed.distribution != name).then_some(installed.distribution);
                ImportRecord {
                    name,
                    distribution,
                    resolved_version: ResolvedVersion::Installed(installed.version),
                }
            }
            None => {
                debug!("package {name:?} is not installed");
                ImportRecord {
                    name,
                    distribution: None,
                    resolved_version: ResolvedVersion::Unavailable,
                }
            }
        })
        .collect()
}

/// Locate runtime for target language.
///
/// An explicit prefix always wins over environment variables and interpreter queries.
/// The project root is only consulted by runtimes that support project-local
/// libraries.
///
/// # Errors
///
/// - Return [`RuntimeError::Config`] if explicit prefix cannot be expanded.
/// - Return [`RuntimeError::Glob`] if a lookup pattern cannot be built from
///   prefix.
pub fn discover(
    language: Language,
    prefix: Option<&Path>,
    project_root: impl AsRef<Path>,
) -> Result<Box<dyn Runtime>> {
    let prefix = prefix.map(crate::config::expand_path).transpose()?;
    let prefix = prefix.as_deref();

    let runtime: Box<dyn Runtime> = match language {
        Language::Python => Box::new(PythonRuntime::discover(prefix)?),
        Language::R => Box::new(RRuntime::discover(prefix, project_root.as_ref())?),
        Language::Matlab => Box::new(MatlabRuntime::discover(prefix)?),
        Language::Stata => Box::new(StataRuntime::discover(prefix)?),
    };

    debug!("located runtime {:?}", runtime.version_label());
    Ok(runtime)
}

/// Expand glob pattern rooted at directory into existing paths.
pub(crate) fn glob_under(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(dir.to_string_lossy().as_ref());
    let pattern = format!("{}/{pattern}", base.trim_end_matches('/'));

    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(|entry| entry.ok()).collect();
    paths.sort();
    Ok(paths)
}

/// Run command to completion without user interaction, returning stdout.
pub(crate) fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> std::io::Result<String> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(output.stderr.as_slice());
        return Err(std::io::Error::other(format!(
            "command {:?} failed:\n{stderr}",
            cmd.as_ref()
        )));
    }

    // INVARIANT: Chomp trailing newlines.
    Ok(stdout.trim_end_matches(['\r', '\n']).to_string())
}

/// Runtime resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// User supplied prefix could not be expanded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// User's home directory could not be determined.
    #[error(transparent)]
    Home(#[from] crate::path::NoWayHome),

    /// Lookup pattern is invalid.
    #[error(transparent)]
    Glob(#[from] glob::PatternError),
}

/// Friendly result alias :3
pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
