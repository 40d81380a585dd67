// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project configuration and typed defaults.
//!
//! Configuration fills fields that are empty. Defaults fill fields that are
//! missing, merging into nested objects but never touching lists that already
//! exist. Both run before the schema backfill, so whatever the schema still
//! finds missing afterwards is something repokit has no opinion about.

use super::{
    affiliation::affiliation_from_email,
    extension::{payload, set_payload},
    guardrail::license_url,
    model::{
        Contact, Contributor, Dataset, Distribution, Dmp, Identifier, License, MetadataItem,
        Project, SecurityAndPrivacy, TechnicalResource,
    },
};
use crate::config::ProjectConfig;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::{Component, Path};

/// Format of `created` and `modified` timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format of calendar dates, e.g., license start dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Placeholder ORCID of contact nobody configured.
pub const PLACEHOLDER_ORCID: &str = "https://orcid.org/0000-0000-0000-0000";

/// Key of dataset extension describing its data files.
pub const DATA_EXTENSION_KEY: &str = "x_dcas";

/// Data type of dataset whose files do not live under a `data/<type>` folder.
pub const UNCATEGORISED: &str = "Uncategorised";

/// Fill slot when it is missing or blank.
fn fill(slot: &mut Option<String>, value: &str) {
    if slot.as_deref().is_none_or(|found| found.trim().is_empty()) {
        *slot = Some(value.to_string());
    }
}

/// Fill slot when it is missing.
fn or_set(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

fn or_identifier(slot: &mut Option<Identifier>, identifier: &str, kind: &str) {
    let found = slot.get_or_insert_with(Identifier::default);
    or_set(&mut found.identifier, identifier);
    or_set(&mut found.kind, kind);
}

fn orcid(identifier: &str) -> Identifier {
    Identifier::new(identifier, "orcid")
}

/// Apply project configuration to plan.
///
/// Only empty fields are filled, so anything a user wrote into the plan by
/// hand survives. Contributors are taken from the second author onward, and
/// only when the plan lists none yet.
pub fn apply_config(dmp: &mut Dmp, config: &ProjectConfig) {
    let title = config.title();
    let description = config.description();

    if let Some(title) = title {
        fill(&mut dmp.title, title);
    }
    if let Some(description) = description {
        fill(&mut dmp.description, description);
    }

    let authors = config.authors();
    let emails = config.emails();
    let orcids = config.orcids();

    let contact = dmp.contact.get_or_insert_with(Contact::default);
    if let Some(name) = authors.first() {
        fill(&mut contact.name, name);
    }
    if let Some(mbox) = emails.first() {
        fill(&mut contact.mbox, mbox);
    }
    if let Some(id) = orcids.first() {
        let unset = contact.contact_id.as_ref().is_none_or(|found| {
            found
                .identifier
                .as_deref()
                .is_none_or(|identifier| identifier.trim().is_empty() || identifier == PLACEHOLDER_ORCID)
        });
        if unset {
            contact.contact_id = Some(orcid(id));
        }
    }
    if contact.affiliation.is_none() {
        contact.affiliation = contact.email().and_then(affiliation_from_email);
    }

    let count = authors.len().max(emails.len()).max(orcids.len());
    let contributors: Vec<Contributor> = (1..count)
        .map(|index| Contributor {
            name: authors.get(index).cloned(),
            mbox: emails.get(index).cloned(),
            affiliation: emails.get(index).and_then(|mbox| affiliation_from_email(mbox)),
            contributor_id: orcids.get(index).map(|id| orcid(id)),
            ..Default::default()
        })
        .collect();
    if !contributors.is_empty() && dmp.contributor.as_ref().is_none_or(Vec::is_empty) {
        dmp.contributor = Some(contributors);
    }

    let projects = dmp.project.get_or_insert_with(Vec::new);
    if projects.is_empty() {
        projects.push(Project::default());
    }
    let project = &mut projects[0];
    if let Some(title) = title {
        fill(&mut project.title, title);
    }
    if let Some(description) = description {
        fill(&mut project.description, description);
    }
}

/// Fill missing fields of plan with typed defaults.
///
/// Every dataset ends up with at least one distribution. New distributions
/// are open and carry the configured data license.
pub fn apply_defaults(dmp: &mut Dmp, today: &str, data_license: Option<&str>) {
    or_set(&mut dmp.title, "");
    or_set(&mut dmp.description, "");
    or_set(&mut dmp.language, "eng");
    or_set(&mut dmp.ethical_issues_exist, "unknown");
    or_set(&mut dmp.ethical_issues_description, "");
    or_set(&mut dmp.ethical_issues_report, "https://example.org/ethics-report");
    or_identifier(&mut dmp.dmp_id, "https://example.org/dmp", "url");

    let contact = dmp.contact.get_or_insert_with(Contact::default);
    or_set(&mut contact.name, "");
    or_set(&mut contact.mbox, "");
    or_identifier(&mut contact.contact_id, PLACEHOLDER_ORCID, "orcid");

    for project in dmp.project.get_or_insert_with(Vec::new).iter_mut() {
        or_set(&mut project.title, "");
        or_set(&mut project.description, "");
        or_set(&mut project.start, today);
        or_set(&mut project.end, "");
        project.funding.get_or_insert_with(Vec::new);
    }

    let license = data_license.and_then(license_url);
    for dataset in dmp.dataset.get_or_insert_with(Vec::new).iter_mut() {
        apply_dataset_defaults(dataset);
        ensure_distribution(dataset, today, license.as_deref());
        apply_data_extension(dataset);
    }

    dmp.extension.get_or_insert_with(Vec::new);
}

fn apply_dataset_defaults(dataset: &mut Dataset) {
    or_set(&mut dataset.title, "");
    or_set(&mut dataset.description, "");
    or_set(&mut dataset.issued, "");
    or_set(&mut dataset.modified, "");
    or_set(&mut dataset.language, "eng");
    dataset.keyword.get_or_insert_with(Vec::new);
    dataset.is_reused.get_or_insert(false);
    or_set(&mut dataset.personal_data, "unknown");
    or_set(&mut dataset.sensitive_data, "unknown");
    or_set(&mut dataset.kind, "");
    or_set(&mut dataset.preservation_statement, "");
    or_identifier(&mut dataset.dataset_id, "", "doi");
    dataset.data_quality_assurance.get_or_insert_with(Vec::new);
    dataset.metadata.get_or_insert_with(|| {
        vec![MetadataItem {
            language: Some("eng".into()),
            metadata_standard_id: Some(Identifier::new("", "url")),
            description: Some(String::new()),
            ..Default::default()
        }]
    });
    dataset.security_and_privacy.get_or_insert_with(|| {
        vec![SecurityAndPrivacy {
            title: Some(String::new()),
            description: Some(String::new()),
            ..Default::default()
        }]
    });
    dataset.technical_resource.get_or_insert_with(|| {
        vec![TechnicalResource {
            name: Some(String::new()),
            description: Some(String::new()),
            ..Default::default()
        }]
    });
    dataset.extension.get_or_insert_with(Vec::new);
}

/// Make sure dataset has a distribution, and fill missing distribution fields.
pub fn ensure_distribution(dataset: &mut Dataset, today: &str, license: Option<&str>) {
    let distributions = dataset.distribution.get_or_insert_with(Vec::new);
    if distributions.is_empty() {
        distributions.push(Distribution::default());
    }

    for distribution in distributions.iter_mut() {
        fill_distribution(distribution, today, license);
    }
}

fn fill_distribution(distribution: &mut Distribution, today: &str, license: Option<&str>) {
    or_set(&mut distribution.access_url, "");
    distribution.format.get_or_insert_with(Vec::new);
    distribution.byte_size.get_or_insert(0);
    or_set(&mut distribution.data_access, "open");
    or_set(&mut distribution.available_until, "");
    distribution.license.get_or_insert_with(|| {
        vec![License {
            license_ref: Some(license.unwrap_or_default().to_string()),
            start_date: Some(today.into()),
            ..Default::default()
        }]
    });
}

/// Fill data file description stored in dataset extension bucket.
///
/// The data type is derived from the access URL of the first distribution
/// when it points into a `data/<type>/` folder.
pub fn apply_data_extension(dataset: &mut Dataset) {
    let access_url = dataset
        .distribution
        .as_ref()
        .and_then(|found| found.first())
        .and_then(|first| first.access_url.clone())
        .unwrap_or_default();

    let bucket = dataset.extension.get_or_insert_with(Vec::new);
    let mut current = payload(bucket, DATA_EXTENSION_KEY).cloned().unwrap_or_default();

    let template = json!({
        "data_type": "",
        "destination": "",
        "number_of_files": 0,
        "total_size_mb": 0,
        "file_formats": [],
        "data_files": [],
        "data_size_mb": [],
        "hash": "",
    });
    if let Value::Object(template) = template {
        for (key, value) in template {
            current.entry(key).or_insert(value);
        }
    }

    let blank = current
        .get("data_type")
        .and_then(Value::as_str)
        .is_none_or(|found| found.trim().is_empty());
    if blank {
        current.insert("data_type".into(), Value::String(data_type_from_path(&access_url)));
    }

    set_payload(bucket, DATA_EXTENSION_KEY, Value::Object(current));
}

/// Data type of file path, i.e., folder following `data/`.
pub fn data_type_from_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let parts: Vec<&str> = Path::new(&normalized)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    parts
        .iter()
        .position(|part| *part == "data")
        .and_then(|index| parts.get(index + 1))
        .map(|part| part.to_string())
        .unwrap_or_else(|| UNCATEGORISED.to_string())
}

/// Stamp plan with creation and modification times.
///
/// `created` is only set when missing or empty, `modified` always.
pub fn stamp(dmp: &mut Dmp, now: &DateTime<Utc>) {
    let now = now.format(TIMESTAMP_FORMAT).to_string();
    fill(&mut dmp.created, &now);
    dmp.modified = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmp::model::Affiliation;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    const TODAY: &str = "2025-01-31";

    fn config() -> ProjectConfig {
        ProjectConfig {
            project_name: Some("Study X".into()),
            project_description: Some("Replication package".into()),
            authors: Some("Ada Byron; Alan Turing".into()),
            email: Some("a.b@cbs.dk; a.t@example.org".into()),
            orcids: Some("https://orcid.org/0000-0001-0000-0001".into()),
            data_license: Some("CC0-1.0".into()),
            ..Default::default()
        }
    }

    #[test]
    fn config_fills_empty_plan() {
        let mut dmp = Dmp::default();
        apply_config(&mut dmp, &config());

        assert_eq!(dmp.title.as_deref(), Some("Study X"));
        assert_eq!(dmp.description.as_deref(), Some("Replication package"));

        let contact = dmp.contact.clone().unwrap_or_default();
        assert_eq!(contact.name.as_deref(), Some("Ada Byron"));
        assert_eq!(contact.email(), Some("a.b@cbs.dk"));
        assert_eq!(
            contact.contact_id,
            Some(Identifier::new("https://orcid.org/0000-0001-0000-0001", "orcid"))
        );
        assert_eq!(
            contact.affiliation.and_then(|found| found.abbreviation),
            Some("CBS".into())
        );

        let contributors = dmp.contributor.clone().unwrap_or_default();
        assert_eq!(contributors.len(), 1);
        assert_eq!(contributors[0].name.as_deref(), Some("Alan Turing"));
        assert_eq!(contributors[0].affiliation, None);
        assert_eq!(contributors[0].contributor_id, None);

        let projects = dmp.project.unwrap_or_default();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].title.as_deref(), Some("Study X"));
    }

    #[test]
    fn config_keeps_user_values() {
        let mut dmp = Dmp {
            title: Some("Hand written".into()),
            contact: Some(Contact {
                name: Some("Grace Hopper".into()),
                mbox: Some("g.h@ku.dk".into()),
                affiliation: Some(Affiliation {
                    name: Some("Somewhere".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            contributor: Some(vec![Contributor {
                name: Some("Existing".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        apply_config(&mut dmp, &config());

        assert_eq!(dmp.title.as_deref(), Some("Hand written"));
        let contact = dmp.contact.unwrap_or_default();
        assert_eq!(contact.name.as_deref(), Some("Grace Hopper"));
        assert_eq!(contact.email(), Some("g.h@ku.dk"));
        assert_eq!(
            contact.affiliation.and_then(|found| found.name),
            Some("Somewhere".into())
        );
        assert_eq!(dmp.contributor.map(|found| found.len()), Some(1));
    }

    #[test]
    fn defaults_seed_distribution() -> anyhow::Result<()> {
        let mut dmp = Dmp {
            dataset: Some(vec![Dataset {
                title: Some("Survey".into()),
                keyword: Some(vec!["panel".into()]),
                ..Default::default()
            }]),
            ..Default::default()
        };
        apply_defaults(&mut dmp, TODAY, Some("CC0-1.0"));

        assert_eq!(dmp.language.as_deref(), Some("eng"));
        assert_eq!(dmp.ethical_issues_exist.as_deref(), Some("unknown"));
        assert_eq!(dmp.dmp_id, Some(Identifier::new("https://example.org/dmp", "url")));

        let dataset = dmp.dataset.unwrap_or_default().remove(0);
        assert_eq!(dataset.keyword, Some(vec!["panel".to_string()]));
        assert_eq!(dataset.personal_data.as_deref(), Some("unknown"));
        assert_eq!(dataset.dataset_id, Some(Identifier::new("", "doi")));

        let distribution = dataset.distribution.unwrap_or_default().remove(0);
        assert_eq!(distribution.data_access.as_deref(), Some("open"));
        assert_eq!(distribution.byte_size, Some(0));
        assert_eq!(
            distribution.license,
            Some(vec![License {
                license_ref: Some("https://creativecommons.org/publicdomain/zero/1.0/".into()),
                start_date: Some(TODAY.into()),
                ..Default::default()
            }])
        );

        let bucket = dataset.extension.unwrap_or_default();
        assert_eq!(
            payload(&bucket, DATA_EXTENSION_KEY).cloned().map(Value::Object),
            Some(json!({
                "data_type": "Uncategorised",
                "destination": "",
                "number_of_files": 0,
                "total_size_mb": 0,
                "file_formats": [],
                "data_files": [],
                "data_size_mb": [],
                "hash": "",
            }))
        );

        Ok(())
    }

    #[test_case("data/raw/survey.csv", "raw"; "relative")]
    #[test_case("C:\\project\\data\\interim\\a.parquet", "interim"; "windows")]
    #[test_case("/srv/data", "Uncategorised"; "nothing after data")]
    #[test_case("", "Uncategorised"; "empty")]
    #[test]
    fn derive_data_type(path: &str, expect: &str) {
        pretty_assertions::assert_eq!(data_type_from_path(path), expect);
    }

    #[test]
    fn stamp_keeps_created() {
        let first = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 2, 1, 8, 30, 15).unwrap();

        let mut dmp = Dmp::default();
        stamp(&mut dmp, &first);
        assert_eq!(dmp.created, dmp.modified);

        stamp(&mut dmp, &later);
        assert_eq!(dmp.created.as_deref(), Some("2025-01-31T12:00:00Z"));
        assert_eq!(dmp.modified.as_deref(), Some("2025-02-01T08:30:15Z"));
    }
}
