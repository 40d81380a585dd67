// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the project configuration that repokit reads its
//! settings from. A generated replication package stores its answers to the
//! template prompts in one of two places: a `cookiecutter.json` file at the
//! top-level, or a `[tool.cookiecutter]` table inside of `pyproject.toml`.
//! Both spell their keys in SCREAMING_SNAKE_CASE.
//!
//! The configuration is loaded once per invocation, and handed to each
//! component explicitly. Nothing in here is global.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, warn};

/// Name of JSON configuration file at project root.
pub const JSON_CONFIG_FILE: &str = "cookiecutter.json";

/// Name of TOML configuration file at project root.
pub const TOML_CONFIG_FILE: &str = "pyproject.toml";

/// Project configuration settings.
///
/// Every field is optional, because a project may have been generated by an
/// older template that never asked for it. Keys that repokit does not know
/// about are ignored.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProjectConfig {
    /// Human readable name of the project.
    pub project_name: Option<String>,

    /// Name of the repository directory.
    pub repo_name: Option<String>,

    /// One paragraph summary of the project.
    pub project_description: Option<String>,

    /// Author names separated by commas or semicolons.
    pub authors: Option<String>,

    /// Author emails separated by commas or semicolons.
    pub email: Option<String>,

    /// Author ORCIDs separated by commas or semicolons.
    pub orcids: Option<String>,

    /// License identifier selected for data, e.g., "CC-BY-4.0".
    pub data_license: Option<String>,

    /// License identifier selected for code, e.g., "MIT".
    pub code_license: Option<String>,

    /// Programming language selected for analysis code.
    pub programming_language: Option<String>,
}

impl ProjectConfig {
    /// Load project configuration from target file.
    ///
    /// Files ending in ".json" are read as JSON. Everything else is read as
    /// TOML, where the settings may live in `[tool.cookiecutter]`,
    /// `[cookiecutter]`, or at the top-level.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Json`] or [`ConfigError::Deserialize`] if the
    ///   file content cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        debug!("load project configuration from {:?}", path.display());
        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&data).map_err(|err| ConfigError::Json {
                source: err,
                path: path.to_path_buf(),
            })
        } else {
            data.parse()
        }
    }

    /// Discover project configuration at project root.
    ///
    /// Tries `cookiecutter.json` first, then `pyproject.toml`. If neither
    /// exists, then an empty configuration is returned.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if a configuration file exists, but cannot
    ///   be read or parsed.
    pub fn discover(project_root: impl AsRef<Path>) -> Result<Self> {
        let json = project_root.as_ref().join(JSON_CONFIG_FILE);
        if json.is_file() {
            return Self::load(json);
        }

        let toml = project_root.as_ref().join(TOML_CONFIG_FILE);
        if toml.is_file() {
            return Self::load(toml);
        }

        warn!(
            "no project configuration found at {:?}, using empty configuration",
            project_root.as_ref().display()
        );
        Ok(Self::default())
    }

    /// Project title, preferring project name over repository name.
    pub fn title(&self) -> Option<&str> {
        non_empty(self.project_name.as_deref()).or(non_empty(self.repo_name.as_deref()))
    }

    /// Project description.
    pub fn description(&self) -> Option<&str> {
        non_empty(self.project_description.as_deref())
    }

    /// Listing of author names.
    pub fn authors(&self) -> Vec<String> {
        split_multi(self.authors.as_deref())
    }

    /// Listing of author emails.
    pub fn emails(&self) -> Vec<String> {
        split_multi(self.email.as_deref())
    }

    /// Listing of author ORCIDs.
    pub fn orcids(&self) -> Vec<String> {
        split_multi(self.orcids.as_deref())
    }

    /// Selected analysis language, if any was configured.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownLanguage`] if configured language is
    ///   not supported.
    pub fn language(&self) -> Result<Option<Language>> {
        non_empty(self.programming_language.as_deref())
            .map(str::parse)
            .transpose()
    }
}

impl FromStr for ProjectConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut table: toml::Table = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Prefer [tool.cookiecutter], then [cookiecutter], then top-level.
        let section = match table.remove("tool") {
            Some(toml::Value::Table(mut tool)) if tool.contains_key("cookiecutter") => {
                tool.remove("cookiecutter")
            }
            _ => table.remove("cookiecutter"),
        };

        match section {
            Some(value) => value.try_into().map_err(ConfigError::Deserialize),
            None => toml::Value::Table(table)
                .try_into()
                .map_err(ConfigError::Deserialize),
        }
    }
}

impl Display for ProjectConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Supported analysis languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Python,
    R,
    Matlab,
    Stata,
}

impl Language {
    /// Source file extensions scanned for this language.
    pub fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py"],
            Self::R => &["R", "r"],
            Self::Matlab => &["m"],
            Self::Stata => &["do", "ado"],
        }
    }

    /// Notebook file extensions whose code cells are scanned.
    pub fn notebook_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["ipynb"],
            Self::R => &["Rmd", "rmd", "qmd"],
            Self::Matlab | Self::Stata => &[],
        }
    }

    /// Check if path has an extension this language scans.
    pub fn matches(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.source_extensions().contains(&ext) || self.notebook_extensions().contains(&ext)
            })
    }
}

impl FromStr for Language {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "r" => Ok(Self::R),
            "matlab" | "m" => Ok(Self::Matlab),
            "stata" => Ok(Self::Stata),
            _ => Err(ConfigError::UnknownLanguage(data.to_string())),
        }
    }
}

impl Display for Language {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Python => "Python",
            Self::R => "R",
            Self::Matlab => "MATLAB",
            Self::Stata => "Stata",
        };
        fmt.write_str(name)
    }
}

/// Split multi-valued setting on commas or semicolons.
///
/// Entries are trimmed, and empty entries are dropped.
pub fn split_multi(value: Option<&str>) -> Vec<String> {
    value
        .map(|value| {
            value
                .split([',', ';'])
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Expand `~` and environment variables in user supplied path.
///
/// # Errors
///
/// - Return [`ConfigError::ShellExpansion`] if a referenced variable is not
///   set.
pub fn expand_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let raw = path.as_ref().to_string_lossy();
    Ok(PathBuf::from(shellexpand::full(raw.as_ref())?.into_owned()))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file cannot be read.
    #[error("failed to read project configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize JSON configuration.
    #[error("failed to parse project configuration at {:?}", path.display())]
    Json {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Failed to deserialize TOML configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on path.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Language is not one that repokit can scan.
    #[error("unsupported programming language {0:?}")]
    UnknownLanguage(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
