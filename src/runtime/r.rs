// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{glob_under, syscall_non_interactive, Installed, Result, Runtime};
use crate::{config::Language, path::RENV_DIR, scan::StandardLibrary};

use std::{
    collections::{HashMap, HashSet},
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Packages shipped with every R installation.
const R_BASE_PACKAGES: &[&str] = &[
    "base", "compiler", "datasets", "graphics", "grDevices", "grid", "methods",
    "parallel", "splines", "stats", "stats4", "tcltk", "tools", "utils",
];

/// R installation and library tree registry.
///
/// Libraries are consulted in the order R itself searches them: a project
/// `renv` library, `$R_LIBS`, `$R_LIBS_USER`, `$R_LIBS_SITE`, and finally
/// the library of the installation. The first library holding a package
/// wins.
#[derive(Debug, Default, Clone)]
pub struct RRuntime {
    version: Option<String>,
    base: HashSet<String>,
    packages: HashMap<String, Installed>,
}

impl RRuntime {
    /// Locate R installation and its libraries.
    ///
    /// # Errors
    ///
    /// - Return [`super::RuntimeError::Glob`] if a library path produces an
    ///   invalid lookup pattern.
    #[instrument(skip(project_root), level = "debug")]
    pub fn discover(prefix: Option<&Path>, project_root: &Path) -> Result<Self> {
        let home = prefix
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("R_HOME").map(PathBuf::from))
            .or_else(|| match syscall_non_interactive("R", ["RHOME"]) {
                Ok(home) if !home.is_empty() => Some(PathBuf::from(home)),
                Ok(_) => None,
                Err(error) => {
                    debug!("failed to query R: {error}");
                    None
                }
            })
            .filter(|home| home.is_dir());

        if home.is_none() {
            warn!("no R installation found");
        }

        let mut libraries = Vec::new();
        for var in ["R_LIBS", "R_LIBS_USER", "R_LIBS_SITE"] {
            if let Some(paths) = env::var_os(var) {
                for path in env::split_paths(&paths) {
                    let path = crate::config::expand_path(&path)?;
                    libraries.push(path);
                }
            }
        }

        if let Some(home) = &home {
            libraries.push(home.join("library"));
        }

        Self::from_libraries(home.as_deref(), project_root, &libraries)
    }

    /// Read packages from project `renv` library and listed libraries.
    ///
    /// # Errors
    ///
    /// - Return [`super::RuntimeError::Glob`] if a library path produces an
    ///   invalid lookup pattern.
    pub fn from_libraries(
        home: Option<&Path>,
        project_root: &Path,
        libraries: &[PathBuf],
    ) -> Result<Self> {
        let mut runtime = Self {
            version: home
                .and_then(|home| read_description(&home.join("library/base/DESCRIPTION")))
                .and_then(|fields| fields.get("Version").cloned())
                .map(|version| format!("R {version}")),
            base: R_BASE_PACKAGES.iter().map(|name| name.to_string()).collect(),
            packages: HashMap::new(),
        };

        let mut descriptions = renv_descriptions(project_root)?;
        for library in libraries {
            descriptions.extend(glob_under(library, "*/DESCRIPTION")?);
        }

        for description in descriptions {
            let Some(fields) = read_description(&description) else {
                continue;
            };
            let (Some(name), Some(version)) = (fields.get("Package"), fields.get("Version")) else {
                continue;
            };

            // INVARIANT: Package folder is named after the package it holds.
            let folder = description
                .parent()
                .and_then(Path::file_name)
                .and_then(|folder| folder.to_str());
            if folder != Some(name.as_str()) {
                debug!("skip nested description {:?}", description.display());
                continue;
            }

            if fields.get("Priority").is_some_and(|priority| priority == "base") {
                runtime.base.insert(name.clone());
            }

            runtime
                .packages
                .entry(name.clone())
                .or_insert_with(|| Installed {
                    distribution: name.clone(),
                    version: version.clone(),
                });
        }

        debug!("R libraries hold {} packages", runtime.packages.len());
        Ok(runtime)
    }
}

impl StandardLibrary for RRuntime {
    fn contains(&self, name: &str) -> bool {
        self.base.contains(name)
    }
}

impl Runtime for RRuntime {
    fn language(&self) -> Language {
        Language::R
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn installed(&self, name: &str) -> Option<Installed> {
        self.packages.get(name).cloned()
    }
}

/// Package descriptions of project `renv` library, newest R version first.
///
/// Reads both `<R-version>/<platform>/<package>` and the
/// `<os>/<R-version>/<platform>/<package>` layout.
fn renv_descriptions(project_root: &Path) -> Result<Vec<PathBuf>> {
    let library = project_root.join(RENV_DIR).join("library");
    let mut descriptions = glob_under(&library, "*/*/*/DESCRIPTION")?;
    descriptions.extend(glob_under(&library, "*/*/*/*/DESCRIPTION")?);
    descriptions.sort_by(|lhs, rhs| rhs.cmp(lhs));
    Ok(descriptions)
}

fn read_description(path: &Path) -> Option<HashMap<String, String>> {
    read_to_string(path).ok().map(|data| parse_dcf(&data))
}

/// Parse Debian control file format used by R `DESCRIPTION` files.
///
/// Continuation lines start with whitespace and are folded into previous
/// field.
pub(crate) fn parse_dcf(data: &str) -> HashMap<String, String> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut last: Option<String> = None;

    for line in data.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some(value) = last.as_ref().and_then(|key| fields.get_mut(key)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            fields.insert(key.clone(), value.trim().to_string());
            last = Some(key);
        }
    }

    fields
}
