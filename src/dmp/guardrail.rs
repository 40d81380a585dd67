// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Access and license guardrails.
//!
//! Guardrails override fields a user may have set, so the plan never claims
//! something it cannot honor. They run in a fixed order, and later rules see
//! the outcome of earlier ones:
//!
//! 1. Datasets flagged as personal or sensitive get closed distributions.
//! 2. Distributions that are not open lose open-content license references.
//! 3. Open distributions without a license get CC-BY-4.0.

use super::model::{Dataset, Distribution, Dmp, License};

use tracing::{debug, warn};

/// Data licenses selectable for a project, with canonical URL.
pub const LICENSES: &[(&str, &str)] = &[
    ("CC-BY-4.0", "https://creativecommons.org/licenses/by/4.0/"),
    ("CC-BY-SA-4.0", "https://creativecommons.org/licenses/by-sa/4.0/"),
    ("CC0-1.0", "https://creativecommons.org/publicdomain/zero/1.0/"),
    ("ODC-BY-1.0", "https://opendatacommons.org/licenses/by/1-0/"),
    ("ODbL-1.0", "https://opendatacommons.org/licenses/odbl/1-0/"),
    ("PDDL-1.0", "https://opendatacommons.org/licenses/pddl/1-0/"),
];

/// License given to open distributions that lack one.
pub const DEFAULT_OPEN_LICENSE: &str = "https://creativecommons.org/licenses/by/4.0/";

/// Hosts whose licenses only make sense for openly accessible data.
const OPEN_CONTENT_HOSTS: &[&str] = &["creativecommons.org", "opendatacommons.org"];

/// Resolve configured license identifier to license URL.
///
/// Identifiers match case-insensitively with spaces read as dashes. "None"
/// or an empty identifier means no license. A URL is taken as is.
pub fn license_url(id: &str) -> Option<String> {
    let id = id.trim();
    if id.is_empty() || id.eq_ignore_ascii_case("none") {
        return None;
    }

    if id.starts_with("http://") || id.starts_with("https://") {
        return Some(id.to_string());
    }

    let wanted = id.replace(' ', "-");
    match LICENSES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(&wanted))
    {
        Some((_, url)) => Some(url.to_string()),
        None => {
            warn!("unknown data license {id:?}, leaving license empty");
            None
        }
    }
}

/// Check if license reference points at an open-content license.
pub fn is_open_content(license_ref: &str) -> bool {
    OPEN_CONTENT_HOSTS
        .iter()
        .any(|host| license_ref.contains(host))
}

/// Apply every guardrail to every dataset of plan.
///
/// Returns number of fields changed.
pub fn apply(dmp: &mut Dmp, today: &str) -> usize {
    let mut changed = 0;
    for dataset in dmp.dataset.iter_mut().flatten() {
        changed += force_closed_access(dataset);
        changed += strip_open_licenses(dataset);
        changed += default_open_license(dataset, today);
    }

    if changed > 0 {
        debug!("guardrails changed {changed} fields");
    }
    changed
}

fn distributions(dataset: &mut Dataset) -> impl Iterator<Item = &mut Distribution> {
    dataset.distribution.iter_mut().flatten()
}

/// Close every distribution of personal or sensitive dataset.
pub fn force_closed_access(dataset: &mut Dataset) -> usize {
    if !dataset.is_sensitive() {
        return 0;
    }

    let mut changed = 0;
    for distribution in distributions(dataset) {
        if distribution.access() != "closed" {
            distribution.data_access = Some("closed".into());
            changed += 1;
        }
    }
    changed
}

/// Clear open-content license references of distributions that are not open.
///
/// Other licenses are kept.
pub fn strip_open_licenses(dataset: &mut Dataset) -> usize {
    let mut changed = 0;
    for distribution in distributions(dataset) {
        if distribution.access() == "open" {
            continue;
        }

        for license in distribution.license.iter_mut().flatten() {
            if license.license_ref.as_deref().is_some_and(is_open_content) {
                license.license_ref = Some(String::new());
                changed += 1;
            }
        }
    }
    changed
}

/// Give open distributions without a license the default open license.
pub fn default_open_license(dataset: &mut Dataset, today: &str) -> usize {
    let mut changed = 0;
    for distribution in distributions(dataset) {
        if distribution.access() != "open" {
            continue;
        }

        let licenses = distribution.license.get_or_insert_with(Vec::new);
        if licenses.is_empty() {
            licenses.push(License {
                license_ref: Some(DEFAULT_OPEN_LICENSE.into()),
                start_date: Some(today.into()),
                ..Default::default()
            });
            changed += 1;
            continue;
        }

        for license in licenses.iter_mut() {
            if license.license_ref.as_deref().is_none_or(|found| found.trim().is_empty()) {
                license.license_ref = Some(DEFAULT_OPEN_LICENSE.into());
                changed += 1;
            }
        }
    }
    changed
}
