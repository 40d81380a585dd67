// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Metadata document normalizer.
//!
//! A replication package describes its data in a machine-actionable data
//! management plan (maDMP) following the RDA DMP Common Standard, stored as
//! `dmp.json` at the project root. Normalizing that document is an idempotent
//! read-modify-write step:
//!
//! 1. Load the document, or start from nothing when it does not exist yet.
//! 2. Resolve the schema version from the stored schema URL, and load that
//!    schema.
//! 3. Move legacy payloads the schema has no place for, and values of the
//!    wrong type, into extension buckets.
//! 4. Fill empty fields from the project configuration.
//! 5. Fill missing fields with typed defaults, and stamp timestamps.
//! 6. Backfill whatever the schema still requires.
//! 7. Apply access and license guardrails.
//! 8. Write the document with canonical key order.
//!
//! Running it twice in a row only changes the `modified` timestamp.
//!
//! # See Also
//!
//! 1. [RDA DMP Common Standard](https://github.com/RDA-DMP-Common/RDA-DMP-Common-Standard)

mod affiliation;
mod defaults;
mod extension;
mod guardrail;
mod model;
mod schema;

pub use affiliation::{affiliation_from_email, Institution, INSTITUTIONS};
pub use defaults::{data_type_from_path, DATE_FORMAT, TIMESTAMP_FORMAT};
pub use extension::{payload as extension_payload, set_payload as set_extension_payload};
pub use guardrail::{is_open_content, license_url, DEFAULT_OPEN_LICENSE, LICENSES};
pub use model::*;
pub use schema::{Schema, SchemaVersion, SCHEMA_URL_BASE};

use crate::config::ProjectConfig;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Existence state of metadata document before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// No document yet, so one is seeded from configuration and defaults.
    Absent,

    /// Document exists, and is normalized in place.
    Existing,
}

impl Display for DocumentState {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Absent => fmt.write_str("created"),
            Self::Existing => fmt.write_str("updated"),
        }
    }
}

/// Result of one normalization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub document: MetadataDocument,
    pub state: DocumentState,
    pub version: SchemaVersion,
    pub migrated: usize,
    pub guarded: usize,
    pub violations: Vec<String>,
}

/// Metadata document normalizer.
///
/// Holds everything one invocation needs: project configuration, where to
/// look for cached schemas, and the clock.
#[derive(Debug, Clone)]
pub struct Normalizer<'cfg> {
    config: &'cfg ProjectConfig,
    schema_dir: Option<PathBuf>,
    now: DateTime<Utc>,
}

impl<'cfg> Normalizer<'cfg> {
    pub fn new(config: &'cfg ProjectConfig) -> Self {
        Self {
            config,
            schema_dir: None,
            now: Utc::now(),
        }
    }

    /// Look for cached schema documents in directory.
    pub fn schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = Some(dir.into());
        self
    }

    /// Use fixed time instead of current time.
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Normalize document at path, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// - Return [`DmpError::Read`] or [`DmpError::Parse`] if existing
    ///   document cannot be loaded.
    /// - Return [`DmpError::Write`] if document cannot be written.
    /// - Return any error of [`Normalizer::normalize`].
    #[instrument(skip(self, path), level = "debug")]
    pub fn run(&self, path: impl AsRef<Path>) -> Result<Normalized> {
        let path = path.as_ref();
        let raw = load(path)?;
        let normalized = self.normalize(raw)?;
        save(path, &normalized.document)?;

        info!(
            "{} {:?} with maDMP schema {}",
            normalized.state,
            path.display(),
            normalized.version
        );
        Ok(normalized)
    }

    /// Normalize raw document, or seed new one when there is none.
    ///
    /// # Errors
    ///
    /// - Return [`DmpError::NotAnObject`] if document is not a JSON object.
    /// - Return [`DmpError::Layout`] if document does not fit maDMP layout.
    /// - Return any error of [`Schema::load`].
    ///
    /// Values of the wrong type for their field do not fail normalization.
    /// They move into extension buckets, and are reported with the
    /// violations.
    pub fn normalize(&self, raw: Option<Value>) -> Result<Normalized> {
        let state = match raw {
            Some(_) => DocumentState::Existing,
            None => DocumentState::Absent,
        };

        let mut object = match raw.unwrap_or_else(|| Value::Object(Default::default())) {
            Value::Object(object) => object,
            _ => return Err(DmpError::NotAnObject),
        };

        let stored_url = object
            .get("dmp")
            .and_then(|dmp| dmp.get("schema"))
            .and_then(Value::as_str);
        let version = SchemaVersion::from_url(stored_url);
        let schema = Schema::load(version, self.schema_dir.as_deref())?;
        debug!("normalize {state:?} document with schema {version}");

        let migrated = extension::migrate(&mut object, &schema.dmp_keys(), &schema.dataset_keys());
        let mut mistyped = extension::quarantine(&mut object);
        let mut document: MetadataDocument =
            serde_json::from_value(Value::Object(object)).map_err(DmpError::Layout)?;

        let today = self.now.format(DATE_FORMAT).to_string();
        let license = self.config.data_license.as_deref();
        let dmp = &mut document.dmp;
        dmp.schema = Some(version.url());
        defaults::apply_config(dmp, self.config);
        defaults::apply_defaults(dmp, &today, license);
        defaults::stamp(dmp, &self.now);

        let mut value = serde_json::to_value(&document).map_err(DmpError::Layout)?;
        schema.ensure_required(&mut value);
        schema.repair_empty_enums(&mut value);
        if let Value::Object(object) = &mut value {
            mistyped.extend(extension::quarantine(object));
        }
        let mut document: MetadataDocument =
            serde_json::from_value(value).map_err(DmpError::Layout)?;

        let license = license.and_then(license_url);
        for dataset in document.dmp.dataset.iter_mut().flatten() {
            defaults::ensure_distribution(dataset, &today, license.as_deref());
        }
        let guarded = guardrail::apply(&mut document.dmp, &today);

        let mut violations = mistyped;
        violations.extend(schema.violations(
            &serde_json::to_value(&document).map_err(DmpError::Layout)?,
        ));
        for violation in &violations {
            warn!("maDMP schema {version}: {violation}");
        }

        Ok(Normalized {
            document,
            state,
            version,
            migrated,
            guarded,
            violations,
        })
    }
}

/// Load raw metadata document, or nothing if it does not exist.
///
/// # Errors
///
/// - Return [`DmpError::Read`] if document exists but cannot be read.
/// - Return [`DmpError::Parse`] if document is not valid JSON.
pub fn load(path: impl AsRef<Path>) -> Result<Option<Value>> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("no metadata document at {:?}", path.display());
        return Ok(None);
    }

    let data = read_to_string(path).map_err(|err| DmpError::Read {
        source: err,
        path: path.to_path_buf(),
    })?;
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|err| DmpError::Parse {
            source: err,
            path: path.to_path_buf(),
        })
}

/// Render metadata document with four space indentation.
///
/// Non-ASCII text is written as is.
///
/// # Errors
///
/// - Return [`DmpError::Layout`] if document cannot be serialized.
pub fn render(document: &MetadataDocument) -> Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    document
        .serialize(&mut serializer)
        .map_err(DmpError::Layout)?;
    buffer.push(b'\n');

    // INVARIANT: serde_json only ever emits valid UTF-8.
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Write metadata document to path, creating parent directories.
///
/// Existing content is overwritten in full.
///
/// # Errors
///
/// - Return [`DmpError::Write`] if parent directory cannot be created, or
///   document cannot be written.
pub fn save(path: impl AsRef<Path>, document: &MetadataDocument) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(|err| DmpError::Write {
            source: err,
            path: path.to_path_buf(),
        })?;
    }

    write(path, render(document)?).map_err(|err| DmpError::Write {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Metadata document error types.
#[derive(Debug, thiserror::Error)]
pub enum DmpError {
    /// Metadata document cannot be read.
    #[error("failed to read metadata document at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Metadata document is not valid JSON.
    #[error("failed to parse metadata document at {:?}", path.display())]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Metadata document cannot be written.
    #[error("failed to write metadata document at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Metadata document root is not a JSON object.
    #[error("metadata document must be a JSON object")]
    NotAnObject,

    /// Metadata document fields do not fit maDMP layout.
    #[error("metadata document does not fit maDMP layout")]
    Layout(#[source] serde_json::Error),

    /// Cached schema document cannot be read.
    #[error("failed to read maDMP schema at {:?}", path.display())]
    ReadSchema {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Cached schema document is not valid JSON.
    #[error("failed to parse maDMP schema at {:?}", path.display())]
    ParseSchema {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Bundled schema document is not valid JSON.
    #[error("bundled maDMP schema is corrupt")]
    BundledSchema(#[source] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = DmpError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> ProjectConfig {
        ProjectConfig {
            project_name: Some("Study X".into()),
            email: Some("a.b@cbs.dk".into()),
            ..Default::default()
        }
    }

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn seed_absent_document() -> anyhow::Result<()> {
        let config = config();
        let result = Normalizer::new(&config).now(clock()).normalize(None)?;

        assert_eq!(result.state, DocumentState::Absent);
        assert_eq!(result.version, SchemaVersion::V1_2);
        assert_eq!(result.violations, Vec::<String>::new());

        let dmp = result.document.dmp;
        assert_eq!(dmp.schema, Some(SchemaVersion::V1_2.url()));
        assert_eq!(dmp.title.as_deref(), Some("Study X"));
        assert_eq!(dmp.created.as_deref(), Some("2025-01-31T12:00:00Z"));
        assert_eq!(dmp.created, dmp.modified);
        assert_eq!(dmp.dataset, Some(Vec::new()));

        let contact = dmp.contact.unwrap_or_default();
        assert_eq!(contact.email(), Some("a.b@cbs.dk"));
        assert_eq!(
            contact.affiliation.and_then(|found| found.name),
            Some("Copenhagen Business School".into())
        );

        Ok(())
    }

    #[test]
    fn keep_recognized_schema_version() -> anyhow::Result<()> {
        let config = ProjectConfig::default();
        let raw = json!({"dmp": {"schema": SchemaVersion::V1_0.url(), "title": "Old"}});
        let result = Normalizer::new(&config).now(clock()).normalize(Some(raw))?;

        assert_eq!(result.state, DocumentState::Existing);
        assert_eq!(result.version, SchemaVersion::V1_0);
        assert_eq!(result.document.dmp.schema, Some(SchemaVersion::V1_0.url()));
        assert_eq!(result.document.dmp.title.as_deref(), Some("Old"));

        Ok(())
    }

    #[test]
    fn reject_non_object_document() {
        let config = ProjectConfig::default();
        let result = Normalizer::new(&config).normalize(Some(json!([1, 2, 3])));
        assert!(matches!(result, Err(DmpError::NotAnObject)));
    }

    #[test]
    fn seed_dataset_with_legacy_payload() -> anyhow::Result<()> {
        let config = ProjectConfig {
            data_license: Some("CC-BY-4.0".into()),
            ..Default::default()
        };
        let raw = json!({
            "dmp": {
                "title": "Study X",
                "dataset": [{
                    "title": "Interviews",
                    "sensitive_data": "yes",
                    "x_dcas": {"data_type": "raw"},
                    "distribution": [{"title": "Transcripts", "data_access": "open", "access_url": "data/raw/t.txt"}]
                }]
            }
        });
        let result = Normalizer::new(&config).now(clock()).normalize(Some(raw))?;
        assert_eq!(result.migrated, 1);

        let dataset = result.document.dmp.dataset.unwrap_or_default().remove(0);
        assert_eq!(
            extension_payload(dataset.extension.as_deref().unwrap_or_default(), "x_dcas")
                .and_then(|found| found.get("data_type"))
                .cloned(),
            Some(json!("raw"))
        );

        let distribution = dataset.distribution.unwrap_or_default().remove(0);
        assert_eq!(distribution.data_access.as_deref(), Some("closed"));
        assert_eq!(
            distribution.license,
            Some(vec![License {
                license_ref: Some(String::new()),
                start_date: Some("2025-01-31".into()),
                ..Default::default()
            }])
        );

        Ok(())
    }

    #[test]
    fn keep_mistyped_fields_in_extension() -> anyhow::Result<()> {
        let config = ProjectConfig::default();
        let raw = json!({
            "dmp": {
                "title": "T",
                "dataset": [{
                    "title": "D",
                    "is_reused": "no",
                    "keyword": "panel",
                    "distribution": [{"title": "F", "byte_size": "1234"}]
                }]
            }
        });
        let result = Normalizer::new(&config).now(clock()).normalize(Some(raw))?;

        for path in [
            "dmp.dataset[0].is_reused",
            "dmp.dataset[0].keyword",
            "dmp.dataset[0].distribution[0].byte_size",
        ] {
            assert!(
                result.violations.iter().any(|violation| violation.starts_with(path)),
                "no violation reported for {path}"
            );
        }

        let dataset = result.document.dmp.dataset.unwrap_or_default().remove(0);
        let bucket = dataset.extension.unwrap_or_default();
        let stashed = |key: &str| bucket.iter().find_map(|entry| entry.get(key)).cloned();
        assert_eq!(stashed("is_reused"), Some(json!("no")));
        assert_eq!(stashed("keyword"), Some(json!("panel")));
        assert_eq!(stashed("distribution[0].byte_size"), Some(json!("1234")));

        let distribution = dataset.distribution.unwrap_or_default().remove(0);
        assert_eq!(distribution.title.as_deref(), Some("F"));
        assert_eq!(distribution.byte_size, Some(0));

        Ok(())
    }

    #[test]
    fn render_with_four_spaces() -> anyhow::Result<()> {
        let document = MetadataDocument {
            dmp: Dmp {
                title: Some("Æblegrød".into()),
                ..Default::default()
            },
        };
        assert_eq!(
            render(&document)?,
            "{\n    \"dmp\": {\n        \"title\": \"Æblegrød\"\n    }\n}\n"
        );
        Ok(())
    }

    #[test]
    fn run_twice_only_changes_modified() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("dmp.json");
        let config = config();

        Normalizer::new(&config).now(clock()).run(&path)?;
        let first = read_to_string(&path)?;

        let later = Utc.with_ymd_and_hms(2025, 1, 31, 13, 0, 0).unwrap();
        let result = Normalizer::new(&config).now(later).run(&path)?;
        let second = read_to_string(&path)?;

        assert_eq!(result.state, DocumentState::Existing);
        assert_eq!(
            first.replace("\"modified\": \"2025-01-31T12:00:00Z\"", ""),
            second.replace("\"modified\": \"2025-01-31T13:00:00Z\"", "")
        );

        Ok(())
    }
}
