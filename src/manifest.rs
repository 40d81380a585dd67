// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dependency manifest.
//!
//! A dependency manifest is a plain text artifact that records which runtime
//! a source tree was scanned against, when the scan happened, which files
//! were checked, and what each discovered package resolved to. Its layout is
//! as follows:
//!
//! ```text
//! Software version:
//! Python 3.11.4
//!
//! Timestamp: 2025-03-01 14:02:11
//!
//! Files checked:
//! src/analysis.py
//! src/broken.py (parse error)
//!
//! Install Command:
//! pip install -r requirements.txt
//!
//! Dependencies:
//! numpy==1.26.4
//! scikit-learn==1.4.2
//! ghost==unavailable
//! ```
//!
//! The `Install Command:` block is optional. Files are sorted by path, and
//! dependencies are sorted case-insensitively by name, so rendering the same
//! scan twice only differs by its timestamp line.

use crate::{
    runtime::{ImportRecord, ResolvedVersion},
    scan::ScannedFile,
};

use chrono::{Local, NaiveDateTime};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::write,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{info, instrument};

/// Format of manifest timestamp line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker appended to files that failed to parse.
pub const PARSE_ERROR_MARKER: &str = " (parse error)";

/// Package entry of dependency manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: ResolvedVersion,
}

/// Dependency manifest layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Runtime version string.
    pub software_version: String,

    /// Local time manifest was generated at.
    pub timestamp: NaiveDateTime,

    /// Files checked during scan.
    pub files: Vec<ScannedFile>,

    /// Command meant to recreate the environment.
    pub install_command: Option<String>,

    /// Resolved packages.
    pub dependencies: Vec<Dependency>,
}

impl Manifest {
    /// Construct new manifest stamped with current local time.
    pub fn new(
        software_version: impl Into<String>,
        files: impl IntoIterator<Item = ScannedFile>,
        records: impl IntoIterator<Item = ImportRecord>,
    ) -> Self {
        Self::with_timestamp(
            software_version,
            Local::now().naive_local(),
            files,
            records,
        )
    }

    /// Construct new manifest with explicit timestamp.
    pub fn with_timestamp(
        software_version: impl Into<String>,
        timestamp: NaiveDateTime,
        files: impl IntoIterator<Item = ScannedFile>,
        records: impl IntoIterator<Item = ImportRecord>,
    ) -> Self {
        let mut files: Vec<ScannedFile> = files.into_iter().collect();
        files.sort();
        files.dedup();

        let mut dependencies: Vec<Dependency> = records
            .into_iter()
            .map(|record| Dependency {
                name: record.package_name().to_string(),
                version: record.resolved_version,
            })
            .collect();
        sort_dependencies(&mut dependencies);

        Self {
            software_version: software_version.into(),
            timestamp: truncate_to_seconds(timestamp),
            files,
            install_command: None,
            dependencies,
        }
    }

    /// Record command meant to recreate the environment.
    pub fn install_command(mut self, command: impl Into<String>) -> Self {
        let command = command.into();
        self.install_command = (!command.trim().is_empty()).then_some(command);
        self
    }

    /// Read manifest from file.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Read`] if file cannot be read.
    /// - Return [`ManifestError::Parse`] if file is not a manifest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::read_to_string(path)
            .map_err(|err| ManifestError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Write manifest to file, replacing whatever was there.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Write`] if file cannot be written. Nothing
    ///   else is attempted when this happens.
    #[instrument(skip(self, path), level = "debug")]
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        write(path, self.to_string()).map_err(|err| ManifestError::Write {
            source: err,
            path: path.to_path_buf(),
        })?;

        info!("dependency manifest written to {:?}", path.display());
        Ok(())
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "Software version:")?;
        writeln!(fmt, "{}", self.software_version)?;
        writeln!(fmt)?;
        writeln!(fmt, "Timestamp: {}", self.timestamp.format(TIMESTAMP_FORMAT))?;
        writeln!(fmt)?;

        writeln!(fmt, "Files checked:")?;
        for file in &self.files {
            let marker = if file.parse_error { PARSE_ERROR_MARKER } else { "" };
            writeln!(fmt, "{}{marker}", file.path)?;
        }
        writeln!(fmt)?;

        if let Some(command) = &self.install_command {
            writeln!(fmt, "Install Command:")?;
            writeln!(fmt, "{command}")?;
            writeln!(fmt)?;
        }

        writeln!(fmt, "Dependencies:")?;
        for dependency in &self.dependencies {
            writeln!(fmt, "{}=={}", dependency.name, dependency.version)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Start,
    Version,
    Files,
    Install,
    Dependencies,
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut section = Section::Start;
        let mut software_version = None;
        let mut timestamp = None;
        let mut files = Vec::new();
        let mut install_command: Option<String> = None;
        let mut dependencies = Vec::new();

        for (index, line) in data.lines().enumerate() {
            let number = index + 1;
            let trimmed = line.trim();

            if let Some(stamp) = trimmed.strip_prefix("Timestamp:") {
                let parsed = NaiveDateTime::parse_from_str(stamp.trim(), TIMESTAMP_FORMAT)
                    .map_err(|err| ManifestError::Parse {
                        line: number,
                        message: err.to_string(),
                    })?;
                timestamp = Some(parsed);
                section = Section::Start;
                continue;
            }

            match trimmed {
                "Software version:" => section = Section::Version,
                "Files checked:" => section = Section::Files,
                "Install Command:" => section = Section::Install,
                "Dependencies:" => section = Section::Dependencies,
                "" => {}
                _ => match section {
                    Section::Start => {
                        return Err(ManifestError::Parse {
                            line: number,
                            message: format!("unexpected line {trimmed:?}"),
                        })
                    }
                    Section::Version => {
                        software_version.get_or_insert_with(|| trimmed.to_string());
                    }
                    Section::Files => files.push(match trimmed.strip_suffix(PARSE_ERROR_MARKER) {
                        Some(path) => ScannedFile {
                            path: path.to_string(),
                            parse_error: true,
                        },
                        None => ScannedFile {
                            path: trimmed.to_string(),
                            parse_error: false,
                        },
                    }),
                    Section::Install => match &mut install_command {
                        Some(command) => {
                            command.push('\n');
                            command.push_str(line);
                        }
                        None => install_command = Some(line.to_string()),
                    },
                    Section::Dependencies => {
                        let (name, version) =
                            trimmed.split_once("==").ok_or_else(|| ManifestError::Parse {
                                line: number,
                                message: format!("expected name==version, found {trimmed:?}"),
                            })?;
                        let version = version.parse().unwrap_or(ResolvedVersion::Unavailable);
                        dependencies.push(Dependency {
                            name: name.trim().to_string(),
                            version,
                        });
                    }
                },
            }
        }

        Ok(Self {
            software_version: software_version.ok_or(ManifestError::MissingField("Software version"))?,
            timestamp: timestamp.ok_or(ManifestError::MissingField("Timestamp"))?,
            files,
            install_command,
            dependencies,
        })
    }
}

fn sort_dependencies(dependencies: &mut Vec<Dependency>) {
    dependencies.sort_by(|lhs, rhs| {
        lhs.name
            .to_lowercase()
            .cmp(&rhs.name.to_lowercase())
            .then_with(|| lhs.name.cmp(&rhs.name))
    });
    dependencies.dedup_by(|lhs, rhs| lhs.name == rhs.name);
}

fn truncate_to_seconds(timestamp: NaiveDateTime) -> NaiveDateTime {
    use chrono::Timelike;
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

/// Manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file could not be written.
    #[error("failed to write dependency manifest at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest file could not be read.
    #[error("failed to read dependency manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest text is malformed.
    #[error("malformed dependency manifest at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Manifest lacks mandatory header.
    #[error("dependency manifest lacks {0:?} header")]
    MissingField(&'static str),
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;
