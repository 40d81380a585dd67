// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use repokit::{
    config::{Language, ProjectConfig},
    dmp::Normalizer,
    lockfile::{reconcile, Lockfile},
    manifest::Manifest,
    path::{default_manifest_path, project_root, DMP_FILE, SCHEMA_DIR},
    runtime::{self, resolve, Runtime},
    scan::{scan, ScanReport},
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  repokit [options] <repokit-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Deps(opts) => run_deps(opts),
            Command::Dmp(opts) => run_dmp(opts),
            Command::Drift(opts) => run_drift(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Scan source tree and write dependency manifest.
    #[command(override_usage = "repokit deps [options] [<source_dir>]")]
    Deps(DepsOptions),

    /// Create or normalize metadata document.
    #[command(override_usage = "repokit dmp [options]")]
    Dmp(DmpOptions),

    /// Report drift between imports, lockfile, and installed packages.
    #[command(override_usage = "repokit drift [options] -r <lockfile> [<source_dir>]")]
    Drift(DriftOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DepsOptions {
    /// Source directory to scan.
    #[arg(default_value = ".", value_name = "source_dir")]
    pub source_dir: PathBuf,

    /// Path to write manifest to instead of "<source_dir>/dependencies.txt".
    #[arg(short, long, value_name = "path")]
    pub output: Option<PathBuf>,

    /// Language to scan for instead of configured one.
    #[arg(short, long, value_name = "language")]
    pub language: Option<Language>,

    /// Path to project configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Prefix of runtime installation to resolve versions against.
    #[arg(short, long, value_name = "path")]
    pub prefix: Option<PathBuf>,

    /// Take package names from lockfile instead of scanned imports.
    #[arg(short = 'r', long, value_name = "lockfile")]
    pub lockfile: Option<PathBuf>,

    /// Command that recreates the environment, recorded in manifest.
    #[arg(short, long, value_name = "command")]
    pub install_command: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DmpOptions {
    /// Path to metadata document.
    #[arg(short = 'f', long, default_value = DMP_FILE, value_name = "path")]
    pub file: PathBuf,

    /// Path to project configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Directory holding cached maDMP schema documents.
    #[arg(short, long, default_value = SCHEMA_DIR, value_name = "path")]
    pub schema_dir: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DriftOptions {
    /// Source directory to scan.
    #[arg(default_value = ".", value_name = "source_dir")]
    pub source_dir: PathBuf,

    /// Lockfile of record.
    #[arg(short = 'r', long, required = true, value_name = "lockfile")]
    pub lockfile: PathBuf,

    /// Language to scan for instead of configured one.
    #[arg(short, long, value_name = "language")]
    pub language: Option<Language>,

    /// Path to project configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Prefix of runtime installation to resolve versions against.
    #[arg(short, long, value_name = "path")]
    pub prefix: Option<PathBuf>,

    /// Fail when actionable drift is found.
    #[arg(long)]
    pub strict: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn load_config(path: Option<&Path>) -> Result<ProjectConfig> {
    let config = match path {
        Some(path) => ProjectConfig::load(path)?,
        None => ProjectConfig::discover(".")?,
    };
    Ok(config)
}

fn select_language(flag: Option<Language>, config: &ProjectConfig) -> Result<Language> {
    match flag {
        Some(language) => Ok(language),
        None => config.language()?.ok_or_else(|| {
            anyhow!("no language selected, pass --language or set PROGRAMMING_LANGUAGE")
        }),
    }
}

fn scan_with_runtime(
    source_dir: &Path,
    flag: Option<Language>,
    config: Option<&Path>,
    prefix: Option<&Path>,
) -> Result<(Box<dyn Runtime>, ScanReport)> {
    let config = load_config(config)?;
    let language = select_language(flag, &config)?;
    let runtime = runtime::discover(language, prefix, project_root(source_dir))?;
    let report = scan(source_dir, language, runtime.as_ref())
        .with_context(|| format!("failed to scan {:?}", source_dir.display()))?;

    for warning in &report.warnings {
        warn!("{warning}");
    }

    Ok((runtime, report))
}

fn run_deps(opts: DepsOptions) -> Result<()> {
    let (runtime, report) = scan_with_runtime(
        &opts.source_dir,
        opts.language,
        opts.config.as_deref(),
        opts.prefix.as_deref(),
    )?;

    let records = match &opts.lockfile {
        Some(path) => {
            let lockfile = Lockfile::load(path)?;
            info!("take {} packages from {:?}", lockfile.packages.len(), path.display());
            resolve(runtime.as_ref(), lockfile.names())
        }
        None => resolve(runtime.as_ref(), &report.packages),
    };

    let mut manifest = Manifest::new(runtime.version_label(), report.files, records);
    if let Some(command) = opts.install_command {
        manifest = manifest.install_command(command);
    }

    let output = opts
        .output
        .unwrap_or_else(|| default_manifest_path(&opts.source_dir));
    manifest.write(&output)?;

    Ok(())
}

fn run_dmp(opts: DmpOptions) -> Result<()> {
    let config = load_config(opts.config.as_deref())?;
    Normalizer::new(&config)
        .schema_dir(opts.schema_dir)
        .run(&opts.file)
        .with_context(|| format!("failed to normalize {:?}", opts.file.display()))?;

    Ok(())
}

fn run_drift(opts: DriftOptions) -> Result<()> {
    let (runtime, report) = scan_with_runtime(
        &opts.source_dir,
        opts.language,
        opts.config.as_deref(),
        opts.prefix.as_deref(),
    )?;

    let lockfile = Lockfile::load(&opts.lockfile)?;
    let drift = reconcile(&lockfile, &report.packages, runtime.as_ref());
    info!("{drift}");

    if opts.strict && drift.has_drift() {
        bail!("{:?} has drifted from scanned imports", opts.lockfile.display());
    }

    Ok(())
}
