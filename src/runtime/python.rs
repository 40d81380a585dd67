// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Python environment inspection.
//!
//! An environment is identified by its prefix: a virtual environment, a conda
//! environment, or a base interpreter installation. Installed distributions
//! are read from the `*.dist-info` and `*.egg-info` entries of its
//! `site-packages` directories. The standard library is whatever the
//! interpreter ships in its stdlib directory, plus builtin modules that have
//! no file of their own.

use super::{glob_under, syscall_non_interactive, Installed, Result, Runtime};
use crate::{config::Language, scan::StandardLibrary};

use std::{
    collections::{HashMap, HashSet},
    env,
    fs::{read_dir, read_to_string},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Modules compiled into the interpreter, or otherwise always present.
///
/// Also serves as the standard library when no interpreter can be found.
const PYTHON_STDLIB: &[&str] = &[
    "__future__", "_abc", "_ast", "_asyncio", "_bisect", "_codecs", "_collections",
    "_csv", "_datetime", "_functools", "_heapq", "_imp", "_io", "_json", "_locale",
    "_operator", "_pickle", "_random", "_signal", "_socket", "_sre", "_ssl", "_stat",
    "_string", "_struct", "_thread", "_tracemalloc", "_warnings", "_weakref", "abc",
    "aifc", "argparse", "array", "ast", "asynchat", "asyncio", "asyncore", "atexit",
    "audioop", "base64", "bdb", "binascii", "bisect", "builtins", "bz2", "calendar",
    "cgi", "cgitb", "chunk", "cmath", "cmd", "code", "codecs", "codeop", "collections",
    "colorsys", "compileall", "concurrent", "configparser", "contextlib", "contextvars",
    "copy", "copyreg", "cProfile", "crypt", "csv", "ctypes", "curses", "dataclasses",
    "datetime", "dbm", "decimal", "difflib", "dis", "distutils", "doctest", "email",
    "encodings", "ensurepip", "enum", "errno", "faulthandler", "fcntl", "filecmp",
    "fileinput", "fnmatch", "fractions", "ftplib", "functools", "gc", "getopt",
    "getpass", "gettext", "glob", "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac",
    "html", "http", "idlelib", "imaplib", "imghdr", "imp", "importlib", "inspect", "io",
    "ipaddress", "itertools", "json", "keyword", "lib2to3", "linecache", "locale",
    "logging", "lzma", "mailbox", "mailcap", "marshal", "math", "mimetypes", "mmap",
    "modulefinder", "msilib", "msvcrt", "multiprocessing", "netrc", "nis", "nntplib",
    "nt", "ntpath", "nturl2path", "numbers", "opcode", "operator", "optparse", "os",
    "ossaudiodev", "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil",
    "platform", "plistlib", "poplib", "posix", "posixpath", "pprint", "profile",
    "pstats", "pty", "pwd", "py_compile", "pyclbr", "pydoc", "pydoc_data", "pyexpat",
    "queue", "quopri", "random", "re", "readline", "reprlib", "resource", "rlcompleter",
    "runpy", "sched", "secrets", "select", "selectors", "shelve", "shlex", "shutil",
    "signal", "site", "smtpd", "smtplib", "sndhdr", "socket", "socketserver", "spwd",
    "sqlite3", "sre_compile", "sre_constants", "sre_parse", "ssl", "stat", "statistics",
    "string", "stringprep", "struct", "subprocess", "sunau", "symtable", "sys",
    "sysconfig", "syslog", "tabnanny", "tarfile", "telnetlib", "tempfile", "termios",
    "textwrap", "this", "threading", "time", "timeit", "tkinter", "token", "tokenize",
    "tomllib", "trace", "traceback", "tracemalloc", "tty", "turtle", "turtledemo",
    "types", "typing", "unicodedata", "unittest", "urllib", "uu", "uuid", "venv",
    "warnings", "wave", "weakref", "webbrowser", "winreg", "winsound", "wsgiref",
    "xdrlib", "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib", "zoneinfo",
];

/// Script used to ask an interpreter for its prefix.
const PREFIX_QUERY: &str = "import sys; print(sys.prefix)";

/// Normalize distribution name.
///
/// Lowercases name, and collapses runs of `-`, `_`, and `.` into a single
/// `-`.
///
/// # See Also
///
/// - [PEP 503](https://peps.python.org/pep-0503/#normalized-names)
pub fn normalize_distribution_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.extend(c.to_lowercase());
            in_separator = false;
        }
    }

    normalized
}

/// Python environment metadata registry.
#[derive(Debug, Default, Clone)]
pub struct PythonRuntime {
    prefix: Option<PathBuf>,
    version: Option<String>,
    stdlib: HashSet<String>,
    by_import: HashMap<String, Installed>,
    by_distribution: HashMap<String, Installed>,
}

impl PythonRuntime {
    /// Locate Python environment.
    ///
    /// Tries explicit prefix, then `$VIRTUAL_ENV`, then `$CONDA_PREFIX`, then
    /// asks `python3` or `python` for its `sys.prefix`.
    ///
    /// # Errors
    ///
    /// - Return [`super::RuntimeError::Glob`] if prefix produces an invalid
    ///   lookup pattern.
    #[instrument(level = "debug")]
    pub fn discover(prefix: Option<&Path>) -> Result<Self> {
        let prefix = prefix
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("VIRTUAL_ENV").map(PathBuf::from))
            .or_else(|| env::var_os("CONDA_PREFIX").map(PathBuf::from))
            .or_else(query_prefix);

        match prefix {
            Some(prefix) if prefix.is_dir() => Self::from_prefix(prefix),
            Some(prefix) => {
                warn!("python prefix {:?} does not exist", prefix.display());
                Ok(Self::not_found())
            }
            None => {
                warn!("no python environment found");
                Ok(Self::not_found())
            }
        }
    }

    /// Runtime standing in for a Python that could not be located.
    pub fn not_found() -> Self {
        Self {
            stdlib: PYTHON_STDLIB.iter().map(|name| name.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Inspect environment at prefix.
    ///
    /// # Errors
    ///
    /// - Return [`super::RuntimeError::Glob`] if prefix produces an invalid
    ///   lookup pattern.
    pub fn from_prefix(prefix: impl Into<PathBuf>) -> Result<Self> {
        let prefix = prefix.into();
        let cfg = read_pyvenv_cfg(&prefix);

        let base_prefix = cfg.get("home").map(PathBuf::from).map(|home| {
            if home.file_name().is_some_and(|name| name == "bin") {
                home.parent().map(Path::to_path_buf).unwrap_or(home)
            } else {
                home
            }
        });

        let stdlib_dir = stdlib_dir(&prefix)?.or(match &base_prefix {
            Some(base) => stdlib_dir(base)?,
            None => None,
        });

        let version = cfg
            .get("version")
            .or(cfg.get("version_info"))
            .cloned()
            .or(conda_python_version(&prefix)?)
            .or_else(|| {
                stdlib_dir
                    .as_ref()
                    .and_then(|dir| dir.file_name())
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.strip_prefix("python"))
                    .map(str::to_string)
            });

        let mut runtime = Self {
            prefix: Some(prefix.clone()),
            version: version.map(|version| format!("Python {version}")),
            ..Self::not_found()
        };

        if let Some(dir) = &stdlib_dir {
            runtime.stdlib.extend(stdlib_modules(dir));
        }

        for site in site_packages(&prefix)? {
            runtime.read_site_packages(&site);
        }

        debug!(
            "python environment at {:?} has {} distributions",
            prefix.display(),
            runtime.by_distribution.len()
        );

        Ok(runtime)
    }

    /// Environment prefix this runtime was read from.
    pub fn prefix(&self) -> Option<&Path> {
        self.prefix.as_deref()
    }

    fn read_site_packages(&mut self, site: &Path) {
        let Ok(entries) = read_dir(site) else {
            warn!("cannot read site-packages at {:?}", site.display());
            return;
        };

        let mut infos: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == "dist-info" || ext == "egg-info")
            })
            .collect();
        infos.sort();

        for info in infos {
            let Some(installed) = read_distribution(&info) else {
                debug!("skipping unreadable distribution metadata {:?}", info.display());
                continue;
            };

            for name in import_names(&info, &installed.distribution) {
                self.by_import.entry(name).or_insert_with(|| installed.clone());
            }

            self.by_distribution
                .entry(normalize_distribution_name(&installed.distribution))
                .or_insert(installed);
        }
    }
}

impl StandardLibrary for PythonRuntime {
    fn contains(&self, name: &str) -> bool {
        self.stdlib.contains(name)
    }
}

impl Runtime for PythonRuntime {
    fn language(&self) -> Language {
        Language::Python
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn installed(&self, name: &str) -> Option<Installed> {
        self.by_import
            .get(name)
            .or_else(|| self.by_distribution.get(&normalize_distribution_name(name)))
            .cloned()
    }

    fn installed_distribution(&self, distribution: &str) -> Option<Installed> {
        self.by_distribution
            .get(&normalize_distribution_name(distribution))
            .cloned()
    }
}

fn query_prefix() -> Option<PathBuf> {
    ["python3", "python"].into_iter().find_map(|interpreter| {
        match syscall_non_interactive(interpreter, ["-c", PREFIX_QUERY]) {
            Ok(prefix) if !prefix.is_empty() => Some(PathBuf::from(prefix)),
            Ok(_) => None,
            Err(error) => {
                debug!("failed to query {interpreter:?}: {error}");
                None
            }
        }
    })
}

fn read_pyvenv_cfg(prefix: &Path) -> HashMap<String, String> {
    let Ok(data) = read_to_string(prefix.join("pyvenv.cfg")) else {
        return HashMap::new();
    };

    data.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect()
}

fn conda_python_version(prefix: &Path) -> Result<Option<String>> {
    let records = glob_under(&prefix.join("conda-meta"), "python-[0-9]*.json")?;
    Ok(records.first().and_then(|record| {
        record
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.split('-').nth(1))
            .map(str::to_string)
    }))
}

fn stdlib_dir(prefix: &Path) -> Result<Option<PathBuf>> {
    let mut candidates = glob_under(prefix, "lib/python3*/os.py")?;
    candidates.extend(glob_under(prefix, "Lib/os.py")?);
    Ok(candidates
        .into_iter()
        .find_map(|os| os.parent().map(Path::to_path_buf)))
}

fn site_packages(prefix: &Path) -> Result<Vec<PathBuf>> {
    let mut sites = glob_under(prefix, "lib/python3*/site-packages")?;
    sites.extend(glob_under(prefix, "Lib/site-packages")?);
    sites.retain(|site| site.is_dir());
    Ok(sites)
}

fn is_module_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn stdlib_modules(dir: &Path) -> Vec<String> {
    let mut modules = Vec::new();
    let extension_dirs = [dir.join("lib-dynload"), dir.join("..").join("DLLs")];

    if let Ok(entries) = read_dir(dir) {
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };

            let module = if path.is_dir() {
                (name != "site-packages" && name != "__pycache__").then_some(name)
            } else {
                name.strip_suffix(".py")
            };

            if let Some(module) = module.filter(|module| is_module_name(module)) {
                modules.push(module.to_string());
            }
        }
    }

    for extension_dir in extension_dirs {
        let Ok(entries) = read_dir(&extension_dir) else {
            continue;
        };

        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if name.ends_with(".so") || name.ends_with(".pyd") {
                if let Some(module) = name.split('.').next().filter(|module| is_module_name(module)) {
                    modules.push(module.to_string());
                }
            }
        }
    }

    modules
}

/// Read distribution name and version from metadata headers.
fn read_distribution(info: &Path) -> Option<Installed> {
    let metadata = if info.is_dir() {
        ["METADATA", "PKG-INFO"]
            .iter()
            .find_map(|file| read_to_string(info.join(file)).ok())
    } else {
        read_to_string(info).ok()
    };

    let mut name = None;
    let mut version = None;
    for line in metadata.as_deref().unwrap_or_default().lines() {
        if line.trim().is_empty() {
            break;
        }

        if let Some(value) = line.strip_prefix("Name:") {
            name.get_or_insert_with(|| value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Version:") {
            version.get_or_insert_with(|| value.trim().to_string());
        }
    }

    // INVARIANT: Directory name is `{name}-{version}.{dist,egg}-info`.
    if name.is_none() || version.is_none() {
        let stem = info.file_stem()?.to_str()?;
        let (dir_name, dir_version) = stem.split_once('-')?;
        name.get_or_insert_with(|| dir_name.to_string());
        version.get_or_insert_with(|| {
            dir_version
                .split('-')
                .next()
                .unwrap_or(dir_version)
                .to_string()
        });
    }

    Some(Installed {
        distribution: name?,
        version: version?,
    })
}

/// Determine names a distribution can be imported by.
fn import_names(info: &Path, distribution: &str) -> Vec<String> {
    let mut names: Vec<String> = read_to_string(info.join("top_level.txt"))
        .map(|data| {
            data.lines()
                .map(|line| line.trim().replace('/', "."))
                .filter_map(|line| line.split('.').next().map(str::to_string))
                .filter(|name| is_module_name(name))
                .collect()
        })
        .unwrap_or_default();

    if names.is_empty() {
        if let Ok(record) = read_to_string(info.join("RECORD")) {
            for line in record.lines() {
                let path = line.split(',').next().unwrap_or_default();
                let Some(first) = path.split('/').next() else {
                    continue;
                };

                let module = if path.contains('/') {
                    Some(first)
                } else {
                    first.strip_suffix(".py")
                };

                if let Some(module) = module.filter(|module| is_module_name(module)) {
                    if !names.iter().any(|name| name == module) {
                        names.push(module.to_string());
                    }
                }
            }
        }
    }

    names.push(normalize_distribution_name(distribution).replace('-', "_"));
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, write};

    fn dist_info(site: &Path, dir: &str, metadata: &str, top_level: Option<&str>) -> anyhow::Result<()> {
        let info = site.join(dir);
        create_dir_all(&info)?;
        write(info.join("METADATA"), metadata)?;
        if let Some(top_level) = top_level {
            write(info.join("top_level.txt"), top_level)?;
        }
        Ok(())
    }

    fn fixture_env() -> anyhow::Result<tempfile::TempDir> {
        let prefix = tempfile::tempdir()?;
        let stdlib = prefix.path().join("lib/python3.11");
        let site = stdlib.join("site-packages");
        create_dir_all(&site)?;
        create_dir_all(stdlib.join("lib-dynload"))?;
        create_dir_all(stdlib.join("json"))?;
        write(stdlib.join("os.py"), "")?;
        write(stdlib.join("json/__init__.py"), "")?;
        write(stdlib.join("lib-dynload/_decimal.cpython-311-x86_64-linux-gnu.so"), "")?;
        write(prefix.path().join("pyvenv.cfg"), "home = /usr/bin\nversion = 3.11.4\n")?;

        dist_info(
            &site,
            "numpy-1.26.4.dist-info",
            "Metadata-Version: 2.1\nName: numpy\nVersion: 1.26.4\n\nLong description.\n",
            None,
        )?;
        dist_info(
            &site,
            "scikit_learn-1.4.2.dist-info",
            "Metadata-Version: 2.1\nName: scikit-learn\nVersion: 1.4.2\n",
            Some("sklearn\n"),
        )?;

        let yaml = site.join("PyYAML-6.0.1.dist-info");
        create_dir_all(&yaml)?;
        write(yaml.join("METADATA"), "Name: PyYAML\nVersion: 6.0.1\n")?;
        write(
            yaml.join("RECORD"),
            indoc! {"
                _yaml/__init__.py,sha256=abc,1402
                yaml/__init__.py,sha256=def,12311
                PyYAML-6.0.1.dist-info/RECORD,,
            "},
        )?;

        Ok(prefix)
    }

    #[test_case("Scikit_Learn", "scikit-learn"; "underscore and case")]
    #[test_case("zope.interface", "zope-interface"; "dot")]
    #[test_case("a--_b", "a-b"; "separator run")]
    #[test]
    fn normalize_names(name: &str, expect: &str) {
        pretty_assertions::assert_eq!(normalize_distribution_name(name), expect);
    }

    #[test]
    fn read_environment_at_prefix() -> anyhow::Result<()> {
        let prefix = fixture_env()?;
        let runtime = PythonRuntime::from_prefix(prefix.path())?;

        assert_eq!(runtime.version(), Some("Python 3.11.4".to_string()));
        assert!(runtime.contains("os"));
        assert!(runtime.contains("json"));
        assert!(runtime.contains("_decimal"));
        assert!(!runtime.contains("numpy"));

        assert_eq!(
            runtime.installed("numpy"),
            Some(Installed {
                distribution: "numpy".into(),
                version: "1.26.4".into()
            })
        );
        assert_eq!(
            runtime.installed("sklearn").map(|found| found.distribution),
            Some("scikit-learn".into())
        );
        assert_eq!(
            runtime.installed("yaml").map(|found| found.version),
            Some("6.0.1".into())
        );
        assert_eq!(
            runtime.installed_distribution("pyyaml").map(|found| found.distribution),
            Some("PyYAML".into())
        );
        assert_eq!(runtime.installed("pandas"), None);

        Ok(())
    }

    #[test]
    fn missing_environment_still_knows_stdlib() {
        let runtime = PythonRuntime::not_found();
        assert!(runtime.contains("os"));
        assert!(runtime.contains("sys"));
        assert_eq!(runtime.version_label(), "Python (not found)");
        assert_eq!(runtime.installed("numpy"), None);
    }
}
