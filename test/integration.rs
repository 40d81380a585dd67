// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{ProjectFixture, PythonPrefixFixture};

use repokit::{
    config::{Language, ProjectConfig},
    dmp::{is_open_content, DocumentState, Normalizer, SchemaVersion},
    lockfile::{reconcile, Lockfile},
    manifest::Manifest,
    path::{default_manifest_path, DMP_FILE},
    runtime::{resolve, PythonRuntime, Runtime},
    scan::scan,
};

use anyhow::Result;
use chrono::{NaiveDate, TimeZone, Utc};
use indoc::indoc;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs::read_to_string;

fn python_env() -> Result<PythonPrefixFixture> {
    PythonPrefixFixture::new("3.11.4")?
        .install("numpy", "1.26.4", None)?
        .install("scikit-learn", "1.4.2", Some("sklearn"))?
        .install("pandas", "2.2.1", None)
}

fn analysis_project() -> Result<ProjectFixture> {
    ProjectFixture::new()?
        .with_file(
            "code/analysis.py",
            indoc! {r#"
                import os
                import json
                import numpy as np
                from sklearn.svm import SVC
                from helpers import tidy

                print(np.zeros(3), SVC, tidy, os.sep, json.dumps({}))
            "#},
        )?
        .with_file("code/helpers.py", "def tidy(frame):\n    return frame\n")?
        .with_file("code/broken.py", "def oops(:\n")?
        .with_file("code/notes.txt", "import pandas\n")
}

#[test]
fn deps_manifest_lists_installed_versions() -> Result<()> {
    let env = python_env()?;
    let project = analysis_project()?;
    let runtime = PythonRuntime::from_prefix(env.path())?;

    let report = scan(project.path(), Language::Python, &runtime)?;
    let records = resolve(&runtime, &report.packages);
    let timestamp = NaiveDate::from_ymd_opt(2025, 1, 31)
        .and_then(|date| date.and_hms_opt(12, 30, 0))
        .ok_or_else(|| anyhow::anyhow!("invalid fixture timestamp"))?;
    let manifest = Manifest::with_timestamp(runtime.version_label(), timestamp, report.files, records)
        .install_command("pip install -r requirements.txt");

    let output = default_manifest_path(project.path());
    manifest.write(&output)?;

    let expect = indoc! {"
        Software version:
        Python 3.11.4

        Timestamp: 2025-01-31 12:30:00

        Files checked:
        code/analysis.py
        code/broken.py (parse error)
        code/helpers.py

        Install Command:
        pip install -r requirements.txt

        Dependencies:
        numpy==1.26.4
        scikit-learn==1.4.2
    "};
    assert_eq!(read_to_string(&output)?, expect);
    assert_eq!(Manifest::load(&output)?, manifest);

    Ok(())
}

#[test]
fn deps_manifest_is_deterministic() -> Result<()> {
    let env = python_env()?;
    let project = analysis_project()?;
    let runtime = PythonRuntime::from_prefix(env.path())?;
    let timestamp = Utc::now().naive_local();

    let first = scan(project.path(), Language::Python, &runtime)?;
    let second = scan(project.path(), Language::Python, &runtime)?;
    assert_eq!(first, second);

    let render = |report: repokit::scan::ScanReport| {
        let records = resolve(&runtime, &report.packages);
        Manifest::with_timestamp(runtime.version_label(), timestamp, report.files, records).to_string()
    };
    assert_eq!(render(first), render(second));

    Ok(())
}

#[test]
fn missing_package_resolves_as_unavailable() -> Result<()> {
    let env = PythonPrefixFixture::new("3.12.1")?;
    let project = ProjectFixture::new()?.with_file("run.py", "import numpy\nimport os\n")?;
    let runtime = PythonRuntime::from_prefix(env.path())?;

    let report = scan(project.path(), Language::Python, &runtime)?;
    let manifest = Manifest::new(
        runtime.version_label(),
        report.files,
        resolve(&runtime, &report.packages),
    );

    assert!(manifest.to_string().ends_with("Dependencies:\nnumpy==unavailable\n"));
    Ok(())
}

#[test]
fn lockfile_drift_against_scanned_imports() -> Result<()> {
    let env = python_env()?;
    let project = analysis_project()?.with_file(
        "requirements.txt",
        indoc! {"
            numpy==1.26.3
            pandas==2.2.1
            matplotlib==3.8.0
        "},
    )?;
    let runtime = PythonRuntime::from_prefix(env.path())?;

    let report = scan(project.path(), Language::Python, &runtime)?;
    let lockfile = Lockfile::load(project.path().join("requirements.txt"))?;
    let drift = reconcile(&lockfile, &report.packages, &runtime);

    assert!(drift.has_drift());
    assert_eq!(drift.unlocked, vec!["scikit-learn".to_string()]);
    assert_eq!(drift.not_installed, vec!["matplotlib".to_string()]);
    assert_eq!(
        drift
            .version_mismatch
            .iter()
            .map(|found| (found.name.as_str(), found.locked.as_str(), found.installed.as_str()))
            .collect::<Vec<_>>(),
        vec![("numpy", "1.26.3", "1.26.4")]
    );
    assert_eq!(drift.unused, vec!["matplotlib".to_string(), "pandas".to_string()]);

    Ok(())
}

fn project_config(project: &ProjectFixture) -> Result<ProjectConfig> {
    Ok(ProjectConfig::discover(project.path())?)
}

fn cbs_project() -> Result<ProjectFixture> {
    ProjectFixture::new()?.with_file(
        "cookiecutter.json",
        indoc! {r#"
            {
                "PROJECT_NAME": "Trade Shocks",
                "PROJECT_DESCRIPTION": "Replication package for trade shock paper.",
                "AUTHORS": "Jane Doe; John Roe",
                "EMAIL": "jd.eco@cbs.dk; jr@example.org",
                "ORCIDS": "https://orcid.org/0000-0002-1825-0097",
                "DATA_LICENSE": "CC-BY-4.0",
                "PROGRAMMING_LANGUAGE": "Python"
            }
        "#},
    )
}

#[test]
fn dmp_seeded_from_configuration() -> Result<()> {
    let project = cbs_project()?;
    let config = project_config(&project)?;
    let path = project.path().join(DMP_FILE);
    let now = Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).single();
    let now = now.ok_or_else(|| anyhow::anyhow!("invalid fixture time"))?;

    let result = Normalizer::new(&config).now(now).run(&path)?;
    assert_eq!(result.state, DocumentState::Absent);
    assert_eq!(result.version, SchemaVersion::LATEST);

    let written: Value = serde_json::from_str(&read_to_string(&path)?)?;
    let dmp = &written["dmp"];
    assert_eq!(dmp["title"], json!("Trade Shocks"));
    assert_eq!(dmp["schema"], json!(SchemaVersion::LATEST.url()));
    assert_eq!(dmp["created"], json!("2025-01-31T09:00:00Z"));
    assert_eq!(dmp["created"], dmp["modified"]);
    assert_eq!(dmp["contact"]["name"], json!("Jane Doe"));
    assert_eq!(dmp["contact"]["mbox"], json!("jd.eco@cbs.dk"));
    assert_eq!(
        dmp["contact"]["contact_id"]["identifier"],
        json!("https://orcid.org/0000-0002-1825-0097")
    );
    assert_eq!(dmp["contact"]["affiliation"]["abbreviation"], json!("CBS"));
    assert_eq!(dmp["contact"]["affiliation"]["region"], Value::Null);
    assert_eq!(dmp["contributor"][0]["name"], json!("John Roe"));
    assert_eq!(dmp["project"][0]["title"], json!("Trade Shocks"));

    Ok(())
}

#[test]
fn dmp_normalization_is_idempotent() -> Result<()> {
    let project = cbs_project()?.with_file(
        DMP_FILE,
        indoc! {r#"
            {
                "dmp": {
                    "title": "Kept title",
                    "dataset": [
                        {
                            "title": "Survey",
                            "personal_data": "no",
                            "sensitive_data": "no",
                            "distribution": [
                                {"title": "Survey CSV", "access_url": "data/raw/survey.csv", "data_access": "open"}
                            ]
                        }
                    ],
                    "x_notes": "kept"
                }
            }
        "#},
    )?;
    let config = project_config(&project)?;
    let path = project.path().join(DMP_FILE);

    let first = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).single();
    let second = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).single();
    let (first, second) = first
        .zip(second)
        .ok_or_else(|| anyhow::anyhow!("invalid fixture time"))?;

    let result = Normalizer::new(&config).now(first).run(&path)?;
    assert_eq!(result.state, DocumentState::Existing);
    let mut once: Value = serde_json::from_str(&read_to_string(&path)?)?;

    Normalizer::new(&config).now(second).run(&path)?;
    let mut twice: Value = serde_json::from_str(&read_to_string(&path)?)?;

    assert_eq!(twice["dmp"]["modified"], json!("2025-03-01T08:00:00Z"));
    assert_eq!(once["dmp"]["title"], json!("Kept title"));
    for document in [&mut once, &mut twice] {
        if let Some(dmp) = document["dmp"].as_object_mut() {
            dmp.remove("modified");
        }
    }
    assert_eq!(once, twice);

    let extension = &once["dmp"]["extension"];
    assert_eq!(extension[0]["x_notes"], json!("kept"));

    let dataset = &once["dmp"]["dataset"][0];
    let data = dataset["extension"]
        .as_array()
        .and_then(|bucket| bucket.iter().find_map(|entry| entry.get("x_dcas")));
    assert_eq!(data.map(|found| &found["data_type"]), Some(&json!("raw")));

    Ok(())
}

#[test]
fn dmp_schema_version_never_changes() -> Result<()> {
    let config = ProjectConfig::default();
    for version in SchemaVersion::ALL {
        let raw = json!({ "dmp": { "schema": version.url(), "title": "Plan" } });
        let result = Normalizer::new(&config).normalize(Some(raw))?;
        assert_eq!(result.version, version);
        assert_eq!(result.document.dmp.schema, Some(version.url()));
    }

    let raw = json!({ "dmp": { "schema": "https://example.org/schema.json" } });
    let result = Normalizer::new(&config).normalize(Some(raw))?;
    assert_eq!(result.version, SchemaVersion::LATEST);

    Ok(())
}

#[test]
fn dmp_sensitive_data_is_never_open() -> Result<()> {
    let config = ProjectConfig {
        data_license: Some("CC-BY-4.0".into()),
        ..Default::default()
    };
    let raw = json!({
        "dmp": {
            "dataset": [
                {
                    "title": "Registry extract",
                    "personal_data": "yes",
                    "sensitive_data": "no",
                    "distribution": [
                        {
                            "title": "Extract",
                            "data_access": "open",
                            "license": [
                                {"license_ref": "https://creativecommons.org/licenses/by/4.0/", "start_date": "2024-01-01"},
                                {"license_ref": "https://example.org/registry-terms", "start_date": "2024-01-01"}
                            ]
                        }
                    ]
                },
                {
                    "title": "Public prices",
                    "personal_data": "no",
                    "sensitive_data": "no",
                    "distribution": [{"title": "Prices", "data_access": "open", "license": []}]
                }
            ]
        }
    });

    let result = Normalizer::new(&config).normalize(Some(raw))?;
    let datasets = result.document.dmp.dataset.unwrap_or_default();

    for dataset in &datasets {
        for distribution in dataset.distribution.iter().flatten() {
            if dataset.is_sensitive() {
                assert_eq!(distribution.access(), "closed");
            }

            let licenses = distribution.license.clone().unwrap_or_default();
            if distribution.access() == "open" {
                assert!(!licenses.is_empty());
            } else {
                assert!(!licenses
                    .iter()
                    .filter_map(|license| license.license_ref.as_deref())
                    .any(is_open_content));
            }
        }
    }

    let kept: Vec<Option<String>> = datasets[0]
        .distribution
        .iter()
        .flatten()
        .flat_map(|distribution| distribution.license.iter().flatten())
        .map(|license| license.license_ref.clone())
        .collect();
    assert_eq!(
        kept,
        vec![Some(String::new()), Some("https://example.org/registry-terms".into())]
    );

    Ok(())
}

#[test]
fn dmp_reads_cached_schema_first() -> Result<()> {
    let project = ProjectFixture::new()?.with_file(
        "bin/maDMP-schema-1.2.json",
        indoc! {r#"
            {
                "type": "object",
                "required": ["dmp"],
                "properties": {
                    "dmp": {
                        "type": "object",
                        "required": ["title", "x_cached_marker"],
                        "properties": {
                            "title": {"type": "string"},
                            "x_cached_marker": {"type": "string", "default": "cached"}
                        }
                    }
                }
            }
        "#},
    )?;
    let config = ProjectConfig::default();

    let result = Normalizer::new(&config)
        .schema_dir(project.path().join("bin"))
        .normalize(None)?;
    let value = serde_json::to_value(&result.document)?;
    assert_eq!(value["dmp"]["x_cached_marker"], json!("cached"));

    Ok(())
}
