// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{Installed, Result, Runtime};
use crate::{config::Language, path::home_dir, scan::StandardLibrary};

use std::{
    collections::HashMap,
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Name of package tracking file inside PLUS directory.
const TRACKING_FILE: &str = "stata.trk";

/// Stata PLUS directory registry.
///
/// Commands installed by `ssc install` and `net install` are recorded in the
/// `stata.trk` file of the PLUS directory. Each record starts with an
/// `N <name>.pkg` line, describes the package on `d` lines, and ends with an
/// `e` line. Reinstalling a package appends a new record, so later records
/// win.
#[derive(Debug, Default, Clone)]
pub struct StataRuntime {
    plus: Option<PathBuf>,
    packages: HashMap<String, Installed>,
}

impl StataRuntime {
    /// Locate PLUS directory from prefix, `$STATA_PLUS`, or `~/ado/plus`.
    ///
    /// # Errors
    ///
    /// - Return [`super::RuntimeError::Home`] if no prefix was given and home
    ///   directory cannot be determined.
    #[instrument(level = "debug")]
    pub fn discover(prefix: Option<&Path>) -> Result<Self> {
        let plus = match prefix
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("STATA_PLUS").map(PathBuf::from))
        {
            Some(plus) => plus,
            None => home_dir()?.join("ado").join("plus"),
        };

        let Ok(data) = read_to_string(plus.join(TRACKING_FILE)) else {
            warn!("no Stata package tracking file in {:?}", plus.display());
            return Ok(Self::default());
        };

        let runtime = Self::from_tracking(plus, &data);
        debug!("Stata PLUS directory tracks {} packages", runtime.packages.len());
        Ok(runtime)
    }

    /// Read installed packages from contents of `stata.trk`.
    pub fn from_tracking(plus: impl Into<PathBuf>, data: &str) -> Self {
        let mut packages = HashMap::new();
        let mut current: Option<(String, Option<String>)> = None;

        for line in data.lines() {
            let line = line.trim_end();
            if let Some(pkg) = line.strip_prefix("N ") {
                let name = pkg.trim().trim_end_matches(".pkg").to_string();
                current = Some((name, None));
            } else if let Some(description) = line.strip_prefix("d ") {
                if let (Some((_, version)), Some(date)) = (
                    current.as_mut(),
                    description.trim().strip_prefix("Distribution-Date:"),
                ) {
                    *version = Some(date.trim().to_string());
                }
            } else if line == "e" {
                if let Some((name, version)) = current.take() {
                    packages.insert(
                        name.clone(),
                        Installed {
                            distribution: name,
                            version: version.unwrap_or_else(|| "installed".into()),
                        },
                    );
                }
            }
        }

        Self {
            plus: Some(plus.into()),
            packages,
        }
    }
}

impl StandardLibrary for StataRuntime {
    fn contains(&self, _: &str) -> bool {
        false
    }
}

impl Runtime for StataRuntime {
    fn language(&self) -> Language {
        Language::Stata
    }

    fn version(&self) -> Option<String> {
        self.plus.as_ref().map(|_| "Stata".to_string())
    }

    fn installed(&self, name: &str) -> Option<Installed> {
        self.packages.get(name).cloned()
    }
}
