// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Lockfile reconciliation.
//!
//! A replication package declares the environment it was run in through a
//! lockfile of record. Over time, code starts importing packages that never
//! made it into the lockfile, or the installed environment wanders away from
//! the pinned versions. Reconciliation compares three views of the same
//! environment, what code imports, what the lockfile pins, and what the
//! runtime has installed, and reports where they disagree.
//!
//! The following lockfile formats are understood, chosen by file name:
//!
//! - `requirements*.txt`: pip requirements.
//! - `environment.yml` or `environment.yaml`: conda environment export,
//!   including its nested `pip:` list.
//! - `renv.lock`: renv lockfile.
//! - `uv.lock`: uv lockfile.

use crate::{
    config::Language,
    runtime::{normalize_distribution_name, Runtime},
};

use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Supported lockfile formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockfileFormat {
    Requirements,
    CondaEnvironment,
    Renv,
    Uv,
}

impl LockfileFormat {
    /// Determine lockfile format from file name.
    ///
    /// # Errors
    ///
    /// - Return [`LockfileError::UnknownFormat`] if file name is not a
    ///   recognized lockfile.
    pub fn detect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_lowercase();

        match name.as_str() {
            "environment.yml" | "environment.yaml" => Ok(Self::CondaEnvironment),
            "renv.lock" => Ok(Self::Renv),
            "uv.lock" => Ok(Self::Uv),
            name if name.starts_with("requirements") && name.ends_with(".txt") => {
                Ok(Self::Requirements)
            }
            _ => Err(LockfileError::UnknownFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Package pinned by lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: String,

    /// Exact pinned version, if the lockfile pins one.
    pub version: Option<String>,
}

/// Parsed lockfile of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lockfile {
    pub format: LockfileFormat,

    /// Runtime version the lockfile pins, if any.
    pub runtime_version: Option<String>,

    /// Locked packages in file order.
    pub packages: Vec<LockedPackage>,
}

impl Lockfile {
    /// Load lockfile, detecting its format from file name.
    ///
    /// # Errors
    ///
    /// - Return [`LockfileError::UnknownFormat`] if format cannot be detected.
    /// - Return [`LockfileError::Read`] if file cannot be read.
    /// - Return a parse error variant if content is malformed.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = LockfileFormat::detect(path)?;
        let data = read_to_string(path).map_err(|err| LockfileError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        let lockfile = Self::parse(format, &data)?;
        debug!("lockfile {:?} pins {} packages", path.display(), lockfile.packages.len());
        Ok(lockfile)
    }

    /// Parse lockfile content of given format.
    ///
    /// # Errors
    ///
    /// - Return a parse error variant if content is malformed.
    pub fn parse(format: LockfileFormat, data: &str) -> Result<Self> {
        match format {
            LockfileFormat::Requirements => Ok(parse_requirements(data)),
            LockfileFormat::CondaEnvironment => parse_conda(data),
            LockfileFormat::Renv => parse_renv(data),
            LockfileFormat::Uv => parse_uv(data),
        }
    }

    /// Names of locked packages.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(|package| package.name.as_str())
    }
}

fn parse_requirements(data: &str) -> Lockfile {
    let packages = data
        .lines()
        .filter_map(parse_requirement)
        .collect();

    Lockfile {
        format: LockfileFormat::Requirements,
        runtime_version: None,
        packages,
    }
}

fn parse_requirement(line: &str) -> Option<LockedPackage> {
    let line = line.split(" #").next().unwrap_or(line);
    let line = line.split(';').next().unwrap_or(line).trim();
    if line.is_empty() || line.starts_with(['#', '-']) || line.contains("://") && !line.contains(" @ ") {
        return None;
    }

    let end = line
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(line.len());
    let name = &line[..end];
    if name.is_empty() {
        return None;
    }

    let rest = line[end..].trim_start();
    let rest = match rest.strip_prefix('[') {
        Some(extras) => extras.split_once(']').map(|(_, rest)| rest).unwrap_or_default().trim_start(),
        None => rest,
    };

    let version = rest
        .strip_prefix("===")
        .or_else(|| rest.strip_prefix("=="))
        .map(|version| version.split(',').next().unwrap_or(version).trim().to_string())
        .filter(|version| !version.is_empty() && !version.contains('*'));

    Some(LockedPackage {
        name: name.to_string(),
        version,
    })
}

#[derive(Debug, Deserialize)]
struct CondaEnvironment {
    #[serde(default)]
    dependencies: Vec<CondaDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CondaDependency {
    Spec(String),
    Pip { pip: Vec<String> },
    Other(serde_yaml::Value),
}

fn parse_conda(data: &str) -> Result<Lockfile> {
    let environment: CondaEnvironment = serde_yaml::from_str(data)?;
    let mut runtime_version = None;
    let mut packages = Vec::new();

    for dependency in environment.dependencies {
        match dependency {
            CondaDependency::Spec(spec) => {
                let spec = spec.rsplit("::").next().unwrap_or(&spec).trim();
                let end = spec
                    .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | ' ' | '~'))
                    .unwrap_or(spec.len());
                let (name, rest) = spec.split_at(end);
                let version = rest
                    .strip_prefix("==")
                    .or_else(|| rest.strip_prefix('='))
                    .and_then(|pin| pin.split('=').next())
                    .map(|pin| pin.trim().to_string())
                    .filter(|pin| !pin.is_empty() && !pin.contains('*'));

                match name {
                    "python" | "r-base" => {
                        if let Some(version) = version {
                            runtime_version = Some(format!("{name} {version}"));
                        }
                    }
                    "pip" => {}
                    name => packages.push(LockedPackage {
                        name: name.to_string(),
                        version,
                    }),
                }
            }
            CondaDependency::Pip { pip } => {
                packages.extend(pip.iter().filter_map(|line| parse_requirement(line)));
            }
            CondaDependency::Other(_) => {}
        }
    }

    Ok(Lockfile {
        format: LockfileFormat::CondaEnvironment,
        runtime_version,
        packages,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RenvLock {
    #[serde(rename = "R", default)]
    r: Option<RenvRuntime>,

    #[serde(default)]
    packages: BTreeMap<String, RenvPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RenvRuntime {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RenvPackage {
    package: Option<String>,
    version: Option<String>,
}

fn parse_renv(data: &str) -> Result<Lockfile> {
    let lock: RenvLock = serde_json::from_str(data)?;
    let packages = lock
        .packages
        .into_iter()
        .map(|(key, package)| LockedPackage {
            name: package.package.unwrap_or(key),
            version: package.version,
        })
        .collect();

    Ok(Lockfile {
        format: LockfileFormat::Renv,
        runtime_version: lock
            .r
            .and_then(|r| r.version)
            .map(|version| format!("R {version}")),
        packages,
    })
}

#[derive(Debug, Deserialize)]
struct UvLock {
    #[serde(rename = "requires-python")]
    requires_python: Option<String>,

    #[serde(default, rename = "package")]
    packages: Vec<UvPackage>,
}

#[derive(Debug, Deserialize)]
struct UvPackage {
    name: String,
    version: Option<String>,
    source: Option<toml::Table>,
}

fn parse_uv(data: &str) -> Result<Lockfile> {
    let lock: UvLock = toml::de::from_str(data)?;
    let packages = lock
        .packages
        .into_iter()
        // INVARIANT: Project itself is locked as an editable or virtual source.
        .filter(|package| {
            !package
                .source
                .as_ref()
                .is_some_and(|source| source.contains_key("editable") || source.contains_key("virtual"))
        })
        .map(|package| LockedPackage {
            name: package.name,
            version: package.version,
        })
        .collect();

    Ok(Lockfile {
        format: LockfileFormat::Uv,
        runtime_version: lock.requires_python.map(|spec| format!("python {spec}")),
        packages,
    })
}

/// Locked version that disagrees with installed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    pub name: String,
    pub locked: String,
    pub installed: String,
}

/// Disagreements between imports, lockfile, and installed runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Imported, but absent from lockfile.
    pub unlocked: Vec<String>,

    /// Locked, but not installed.
    pub not_installed: Vec<String>,

    /// Locked at a version other than the installed one.
    pub version_mismatch: Vec<VersionMismatch>,

    /// Locked, but never imported. Informational only.
    pub unused: Vec<String>,
}

impl DriftReport {
    /// Check if any actionable drift was found.
    ///
    /// Unused packages are not actionable, because lockfiles legitimately
    /// pin transitive dependencies.
    pub fn has_drift(&self) -> bool {
        !self.unlocked.is_empty() || !self.not_installed.is_empty() || !self.version_mismatch.is_empty()
    }
}

impl Display for DriftReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for name in &self.unlocked {
            writeln!(fmt, "unlocked: {name} is imported but not locked")?;
        }
        for name in &self.not_installed {
            writeln!(fmt, "not installed: {name} is locked but not installed")?;
        }
        for mismatch in &self.version_mismatch {
            writeln!(
                fmt,
                "version mismatch: {} is locked at {} but {} is installed",
                mismatch.name, mismatch.locked, mismatch.installed
            )?;
        }
        for name in &self.unused {
            writeln!(fmt, "unused: {name} is locked but never imported")?;
        }

        write!(
            fmt,
            "{} unlocked, {} not installed, {} version mismatches, {} unused",
            self.unlocked.len(),
            self.not_installed.len(),
            self.version_mismatch.len(),
            self.unused.len()
        )
    }
}

/// Normalize package name for comparison in language's ecosystem.
pub fn comparable_name(language: Language, name: &str) -> String {
    match language {
        Language::Python => normalize_distribution_name(name),
        _ => name.to_string(),
    }
}

/// Reconcile imported packages against lockfile and runtime.
///
/// Imported names are mapped to their distribution names through the runtime
/// before comparison. Standard library names are ignored.
#[instrument(skip_all, level = "debug")]
pub fn reconcile<R>(
    lockfile: &Lockfile,
    imported: &BTreeSet<String>,
    runtime: &R,
) -> DriftReport
where
    R: Runtime + ?Sized,
{
    let language = runtime.language();
    let mut report = DriftReport::default();

    let imported: BTreeMap<String, String> = imported
        .iter()
        .filter(|name| !runtime.contains(name))
        .map(|name| {
            let distribution = runtime
                .installed(name)
                .map(|installed| installed.distribution)
                .unwrap_or_else(|| name.clone());
            (comparable_name(language, &distribution), distribution)
        })
        .collect();

    let locked: BTreeMap<String, &LockedPackage> = lockfile
        .packages
        .iter()
        .map(|package| (comparable_name(language, &package.name), package))
        .collect();

    for (key, name) in &imported {
        if !locked.contains_key(key) {
            report.unlocked.push(name.clone());
        }
    }

    for (key, package) in &locked {
        match runtime.installed_distribution(&package.name) {
            None => report.not_installed.push(package.name.clone()),
            Some(installed) => {
                if let Some(locked_version) = &package.version {
                    if installed.version.trim() != locked_version.trim() {
                        report.version_mismatch.push(VersionMismatch {
                            name: package.name.clone(),
                            locked: locked_version.clone(),
                            installed: installed.version,
                        });
                    }
                }
            }
        }

        if !imported.contains_key(key) {
            report.unused.push(package.name.clone());
        }
    }

    report
}

/// Lockfile error types.
#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    /// File name is not a recognized lockfile.
    #[error("cannot determine lockfile format of {:?}", path.display())]
    UnknownFormat { path: PathBuf },

    /// Lockfile could not be read.
    #[error("failed to read lockfile at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Conda environment file is malformed.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// renv lockfile is malformed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// uv lockfile is malformed.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Friendly result alias :3
pub type Result<T, E = LockfileError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Installed;
    use crate::scan::StandardLibrary;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::collections::HashMap;

    fn locked(name: &str, version: Option<&str>) -> LockedPackage {
        LockedPackage {
            name: name.into(),
            version: version.map(Into::into),
        }
    }

    #[test_case("requirements.txt", LockfileFormat::Requirements; "requirements")]
    #[test_case("requirements-dev.txt", LockfileFormat::Requirements; "requirements variant")]
    #[test_case("environment.yml", LockfileFormat::CondaEnvironment; "conda")]
    #[test_case("renv.lock", LockfileFormat::Renv; "renv")]
    #[test_case("uv.lock", LockfileFormat::Uv; "uv")]
    #[test]
    fn detect_format(path: &str, expect: LockfileFormat) -> anyhow::Result<()> {
        pretty_assertions::assert_eq!(LockfileFormat::detect(path)?, expect);
        Ok(())
    }

    #[test]
    fn detect_unknown_format_fails() {
        assert!(matches!(
            LockfileFormat::detect("Pipfile.lock"),
            Err(LockfileError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn parse_requirements_file() -> anyhow::Result<()> {
        let data = indoc! {r#"
            # pinned
            numpy==1.26.4
            pandas[performance]==2.2.1 ; python_version >= "3.9"
            requests>=2.0
            -r base.txt
            --index-url https://example.org/simple
            mypkg @ https://example.org/mypkg.tar.gz
            scikit-learn == 1.4.2  # comment
        "#};

        let result = Lockfile::parse(LockfileFormat::Requirements, data)?;
        assert_eq!(
            result.packages,
            vec![
                locked("numpy", Some("1.26.4")),
                locked("pandas", Some("2.2.1")),
                locked("requests", None),
                locked("mypkg", None),
                locked("scikit-learn", Some("1.4.2")),
            ]
        );

        Ok(())
    }

    #[test]
    fn parse_conda_environment() -> anyhow::Result<()> {
        let data = indoc! {r#"
            name: study
            channels:
              - conda-forge
            dependencies:
              - python=3.11.4
              - conda-forge::numpy=1.26.4=py311h64a7726_0
              - pip
              - r-base
              - pip:
                  - seaborn==0.13.2
        "#};

        let result = Lockfile::parse(LockfileFormat::CondaEnvironment, data)?;
        assert_eq!(result.runtime_version, Some("python 3.11.4".into()));
        assert_eq!(
            result.packages,
            vec![locked("numpy", Some("1.26.4")), locked("seaborn", Some("0.13.2"))]
        );

        Ok(())
    }

    #[test]
    fn parse_renv_lock() -> anyhow::Result<()> {
        let data = indoc! {r#"
            {
              "R": {"Version": "4.3.1", "Repositories": []},
              "Packages": {
                "dplyr": {"Package": "dplyr", "Version": "1.1.4", "Source": "Repository"},
                "renv": {"Package": "renv", "Version": "1.0.3"}
              }
            }
        "#};

        let result = Lockfile::parse(LockfileFormat::Renv, data)?;
        assert_eq!(result.runtime_version, Some("R 4.3.1".into()));
        assert_eq!(
            result.packages,
            vec![locked("dplyr", Some("1.1.4")), locked("renv", Some("1.0.3"))]
        );

        Ok(())
    }

    #[test]
    fn parse_uv_lock_skips_project() -> anyhow::Result<()> {
        let data = indoc! {r#"
            version = 1
            requires-python = ">=3.11"

            [[package]]
            name = "numpy"
            version = "1.26.4"
            source = { registry = "https://pypi.org/simple" }

            [[package]]
            name = "study-x"
            version = "0.1.0"
            source = { editable = "." }
        "#};

        let result = Lockfile::parse(LockfileFormat::Uv, data)?;
        assert_eq!(result.packages, vec![locked("numpy", Some("1.26.4"))]);

        Ok(())
    }

    struct FakeRuntime(HashMap<String, Installed>);

    impl StandardLibrary for FakeRuntime {
        fn contains(&self, name: &str) -> bool {
            name == "os"
        }
    }

    impl Runtime for FakeRuntime {
        fn language(&self) -> Language {
            Language::Python
        }

        fn version(&self) -> Option<String> {
            Some("Python 3.11.4".into())
        }

        fn installed(&self, name: &str) -> Option<Installed> {
            self.0.get(name).cloned()
        }

        fn installed_distribution(&self, distribution: &str) -> Option<Installed> {
            let key = normalize_distribution_name(distribution);
            self.0
                .values()
                .find(|installed| normalize_distribution_name(&installed.distribution) == key)
                .cloned()
        }
    }

    #[test]
    fn reconcile_reports_every_bucket() {
        let runtime = FakeRuntime(
            [
                ("numpy", "numpy", "1.26.4"),
                ("sklearn", "scikit-learn", "1.5.0"),
                ("yaml", "PyYAML", "6.0.1"),
                ("seaborn", "seaborn", "0.13.2"),
            ]
            .into_iter()
            .map(|(name, distribution, version)| {
                (
                    name.to_string(),
                    Installed {
                        distribution: distribution.into(),
                        version: version.into(),
                    },
                )
            })
            .collect(),
        );

        let lockfile = Lockfile {
            format: LockfileFormat::Requirements,
            runtime_version: None,
            packages: vec![
                locked("numpy", Some("1.26.4")),
                locked("Scikit_Learn", Some("1.4.2")),
                locked("polars", Some("0.20.0")),
                locked("seaborn", None),
            ],
        };

        let imported: BTreeSet<String> = ["numpy", "sklearn", "yaml", "os"]
            .into_iter()
            .map(String::from)
            .collect();

        let report = reconcile(&lockfile, &imported, &runtime);
        assert_eq!(report.unlocked, vec!["PyYAML"]);
        assert_eq!(report.not_installed, vec!["polars"]);
        assert_eq!(
            report.version_mismatch,
            vec![VersionMismatch {
                name: "Scikit_Learn".into(),
                locked: "1.4.2".into(),
                installed: "1.5.0".into()
            }]
        );
        assert_eq!(report.unused, vec!["polars", "seaborn"]);
        assert!(report.has_drift());
    }
}
