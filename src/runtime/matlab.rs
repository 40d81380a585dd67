// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{glob_under, Installed, Result, Runtime};
use crate::{config::Language, scan::StandardLibrary};

use std::{
    collections::{HashMap, HashSet},
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Toolbox that makes up MATLAB itself.
const CORE_TOOLBOX: &str = "matlab";

/// MATLAB installation registry.
///
/// Every product of an installation lives in its own `toolbox/<id>`
/// directory whose `Contents.m` header names the product and its version.
/// Namespaces are `+name` folders inside a toolbox, and code imports them.
#[derive(Debug, Default, Clone)]
pub struct MatlabRuntime {
    version: Option<String>,
    core: HashSet<String>,
    toolboxes: HashMap<String, Installed>,
}

impl MatlabRuntime {
    /// Locate MATLAB installation from prefix or `$MATLAB_ROOT`.
    ///
    /// # Errors
    ///
    /// - Return [`super::RuntimeError::Glob`] if root produces an invalid
    ///   lookup pattern.
    #[instrument(level = "debug")]
    pub fn discover(prefix: Option<&Path>) -> Result<Self> {
        let root = prefix
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("MATLAB_ROOT").map(PathBuf::from))
            .filter(|root| root.is_dir());

        match root {
            Some(root) => Self::from_root(&root),
            None => {
                warn!("no MATLAB installation found");
                Ok(Self::not_found())
            }
        }
    }

    /// Runtime standing in for a MATLAB that could not be located.
    pub fn not_found() -> Self {
        Self {
            core: HashSet::from([CORE_TOOLBOX.to_string()]),
            ..Default::default()
        }
    }

    /// Inspect installation at root.
    ///
    /// # Errors
    ///
    /// - Return [`super::RuntimeError::Glob`] if root produces an invalid
    ///   lookup pattern.
    pub fn from_root(root: &Path) -> Result<Self> {
        let mut runtime = Self::not_found();
        runtime.version = read_to_string(root.join("VersionInfo.xml"))
            .ok()
            .and_then(|xml| {
                let version = xml_element(&xml, "version")?;
                Some(match xml_element(&xml, "release") {
                    Some(release) => format!("MATLAB {version} ({release})"),
                    None => format!("MATLAB {version}"),
                })
            });

        let toolbox_root = root.join("toolbox");
        let mut contents = glob_under(&toolbox_root, "*/Contents.m")?;
        contents.extend(glob_under(&toolbox_root, "*/*/Contents.m")?);

        for file in contents {
            let Some(id) = toolbox_id(&toolbox_root, &file) else {
                continue;
            };
            if runtime.toolboxes.contains_key(&id) {
                continue;
            }

            let Ok(data) = read_to_string(&file) else {
                continue;
            };
            if let Some(installed) = parse_contents(&data) {
                runtime.toolboxes.insert(id, installed);
            }
        }

        let mut namespaces = glob_under(&toolbox_root, "*/+*")?;
        namespaces.extend(glob_under(&toolbox_root, "*/*/+*")?);
        for folder in namespaces.into_iter().filter(|path| path.is_dir()) {
            let (Some(id), Some(name)) = (
                toolbox_id(&toolbox_root, &folder),
                folder
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.strip_prefix('+')),
            ) else {
                continue;
            };

            if id == CORE_TOOLBOX {
                runtime.core.insert(name.to_string());
            } else if let Some(installed) = runtime.toolboxes.get(&id).cloned() {
                runtime.toolboxes.entry(name.to_string()).or_insert(installed);
            }
        }

        debug!("MATLAB installation has {} toolboxes", runtime.toolboxes.len());
        Ok(runtime)
    }
}

impl StandardLibrary for MatlabRuntime {
    fn contains(&self, name: &str) -> bool {
        self.core.contains(name)
    }
}

impl Runtime for MatlabRuntime {
    fn language(&self) -> Language {
        Language::Matlab
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn installed(&self, name: &str) -> Option<Installed> {
        self.toolboxes.get(name).cloned()
    }
}

fn toolbox_id(toolbox_root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(toolbox_root)
        .ok()?
        .iter()
        .next()?
        .to_str()
        .map(str::to_string)
}

fn xml_element<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim())
}

/// Parse product title and version from `Contents.m` header.
///
/// Header looks like:
///
/// ```text
/// % Statistics and Machine Learning Toolbox
/// % Version 23.1 (R2023a) 19-Nov-2022
/// ```
fn parse_contents(data: &str) -> Option<Installed> {
    let mut lines = data
        .lines()
        .map(|line| line.trim().trim_start_matches('%').trim())
        .filter(|line| !line.is_empty());

    let title = lines.next()?.to_string();
    let version = lines
        .next()?
        .strip_prefix("Version")?
        .split_whitespace()
        .next()?
        .to_string();

    Some(Installed {
        distribution: title,
        version,
    })
}
