// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Typed metadata document tree.
//!
//! Every struct declares its fields in canonical order, and captures keys it
//! does not know about in a flattened map that keeps encounter order. Thus,
//! serializing the tree is all it takes to canonicalize key order: known keys
//! first, unknown keys after them as they were found.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extension bucket entry, i.e., `{key: payload}`.
pub type Extension = Map<String, Value>;

/// Canonical key order of `dmp` object.
pub const DMP_KEYS: &[&str] = &[
    "schema",
    "title",
    "description",
    "language",
    "created",
    "modified",
    "ethical_issues_exist",
    "ethical_issues_description",
    "ethical_issues_report",
    "dmp_id",
    "contact",
    "contributor",
    "project",
    "dataset",
    "extension",
];

/// Canonical key order of `dmp.dataset` entries.
pub const DATASET_KEYS: &[&str] = &[
    "title",
    "description",
    "issued",
    "modified",
    "language",
    "keyword",
    "is_reused",
    "personal_data",
    "sensitive_data",
    "type",
    "preservation_statement",
    "dataset_id",
    "distribution",
    "data_quality_assurance",
    "metadata",
    "security_and_privacy",
    "technical_resource",
    "extension",
];

/// Metadata document root.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub dmp: Dmp,
}

/// Data management plan.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dmp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethical_issues_exist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethical_issues_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethical_issues_report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmp_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor: Option<Vec<Contributor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Vec<Project>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Vec<Dataset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<Vec<Extension>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identifier pair used by plans, datasets, people, and standards.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Identifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identifier {
    pub fn new(identifier: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            kind: Some(kind.into()),
            extra: Map::new(),
        }
    }
}

/// Primary contact person of plan.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbox: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<Affiliation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<Identifier>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Contact {
    /// Email address of contact, stored under the `mbox` key.
    pub fn email(&self) -> Option<&str> {
        self.mbox.as_deref()
    }
}

/// Additional person involved in plan.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Contributor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbox: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<Affiliation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Institution a person belongs to.
///
/// The region is always written, even when unknown.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Affiliation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation_id: Option<Identifier>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Project the plan is written for.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Project {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Dataset produced or reused by project.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dataset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_reused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive_data: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preservation_statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Vec<Distribution>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_quality_assurance: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<MetadataItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_and_privacy: Option<Vec<SecurityAndPrivacy>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_resource: Option<Vec<TechnicalResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<Vec<Extension>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dataset {
    /// Check if dataset is flagged as holding personal or sensitive data.
    pub fn is_sensitive(&self) -> bool {
        [&self.personal_data, &self.sensitive_data]
            .into_iter()
            .flatten()
            .any(|flag| flag.trim().eq_ignore_ascii_case("yes"))
    }
}

/// Access controlled copy of dataset content.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Distribution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Host>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<Vec<License>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Distribution {
    /// Access level of distribution, lower cased and trimmed.
    pub fn access(&self) -> String {
        self.data_access
            .as_deref()
            .map(|access| access.trim().to_lowercase())
            .unwrap_or_default()
    }
}

/// System that stores a distribution.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Host {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// License that applies to distribution from start date onward.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct License {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata standard used to describe dataset.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetadataItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_standard_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Security or privacy measure protecting dataset.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct SecurityAndPrivacy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Technical resource needed to use dataset.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct TechnicalResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
