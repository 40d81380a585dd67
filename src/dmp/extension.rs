// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Extension buckets.
//!
//! An extension bucket is a list of single key objects, `[{key: payload}]`,
//! attached to `dmp` or to a dataset. It holds whatever the selected schema
//! version has no place for, so older or custom payloads survive
//! normalization instead of being dropped.

use super::model::{
    Affiliation, Contact, Contributor, Dataset, Distribution, Dmp, Extension, Host, Identifier,
    License, MetadataItem, Project, SecurityAndPrivacy, TechnicalResource, DATASET_KEYS, DMP_KEYS,
};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Name of extension bucket key.
pub const EXTENSION_KEY: &str = "extension";

/// Find entry of bucket holding key.
pub fn find(bucket: &[Extension], key: &str) -> Option<usize> {
    bucket.iter().position(|entry| entry.contains_key(key))
}

/// Payload stored under key, if it is an object.
pub fn payload<'a>(bucket: &'a [Extension], key: &str) -> Option<&'a Map<String, Value>> {
    find(bucket, key).and_then(|index| bucket[index].get(key)?.as_object())
}

/// Store payload under key.
///
/// An existing object payload is merged with the new one, new keys winning.
/// Anything else is replaced.
pub fn set_payload(bucket: &mut Vec<Extension>, key: &str, payload: Value) {
    let Some(index) = find(bucket, key) else {
        bucket.push(Map::from_iter([(key.to_string(), payload)]));
        return;
    };

    match (bucket[index].get_mut(key), payload) {
        (Some(Value::Object(current)), Value::Object(incoming)) => current.extend(incoming),
        (Some(slot), payload) => *slot = payload,
        (None, _) => {}
    }
}

/// Move legacy payloads into extension buckets.
///
/// Works on the raw document, before it is read into the typed tree:
///
/// - Document level keys other than `dmp` move into `dmp.extension`.
/// - Keys of `dmp` that neither schema nor repokit know move into
///   `dmp.extension`.
/// - Unknown keys of each dataset move into that dataset's extension bucket.
///
/// Returns number of keys moved.
pub fn migrate(document: &mut Map<String, Value>, dmp_keys: &[String], dataset_keys: &[String]) -> usize {
    let mut moved = 0;

    let mut dmp = match document.remove("dmp") {
        Some(Value::Object(dmp)) => dmp,
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            warn!("document has non-object dmp, moving it into extension bucket");
            let mut dmp = Map::new();
            let mut bucket = Vec::new();
            set_payload(&mut bucket, "dmp", other);
            dmp.insert(EXTENSION_KEY.into(), bucket_to_value(bucket));
            moved += 1;
            dmp
        }
    };

    let outer: Vec<(String, Value)> = std::mem::take(document).into_iter().collect();
    moved += move_into_bucket(&mut dmp, outer);

    let known = exempt(DMP_KEYS, dmp_keys);
    let unknown = take_unknown(&mut dmp, &known);
    moved += move_into_bucket(&mut dmp, unknown);

    if let Some(Value::Array(datasets)) = dmp.get_mut("dataset") {
        let known = exempt(DATASET_KEYS, dataset_keys);
        for dataset in datasets.iter_mut().filter_map(Value::as_object_mut) {
            let unknown = take_unknown(dataset, &known);
            moved += move_into_bucket(dataset, unknown);
        }
    }

    document.insert("dmp".into(), Value::Object(dmp));
    if moved > 0 {
        debug!("moved {moved} legacy keys into extension buckets");
    }
    moved
}

/// Move values that do not fit their typed field into extension buckets.
///
/// Works on the raw document after [`migrate`], so reading it into the typed
/// tree cannot fail on a single mistyped value. A value inside a dataset moves
/// into that dataset's bucket. Any other value moves into `dmp.extension`.
/// Moved values are keyed by their path relative to the bucket owner, e.g.,
/// `distribution[0].byte_size`. An extension slot that is not a list of
/// objects is coerced into one in place.
///
/// Returns one message per moved or coerced value.
pub fn quarantine(document: &mut Map<String, Value>) -> Vec<String> {
    let mut messages = Vec::new();
    if let Some(Value::Object(dmp)) = document.get_mut("dmp") {
        sift_owner(Shape::Dmp, dmp, "dmp", &mut messages);
    }

    for message in &messages {
        debug!("{message}");
    }
    messages
}

/// Typed object of document tree that a raw object is read into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Dmp,
    Dataset,
    Distribution,
    Contact,
    Contributor,
    Affiliation,
    Identifier,
    Project,
    Host,
    License,
    MetadataItem,
    SecurityAndPrivacy,
    TechnicalResource,
}

impl Shape {
    /// Nested objects as `(key, shape, is_list)`.
    fn children(self) -> &'static [(&'static str, Shape, bool)] {
        match self {
            Self::Dmp => &[
                ("dmp_id", Self::Identifier, false),
                ("contact", Self::Contact, false),
                ("contributor", Self::Contributor, true),
                ("project", Self::Project, true),
                ("dataset", Self::Dataset, true),
            ],
            Self::Dataset => &[
                ("dataset_id", Self::Identifier, false),
                ("distribution", Self::Distribution, true),
                ("metadata", Self::MetadataItem, true),
                ("security_and_privacy", Self::SecurityAndPrivacy, true),
                ("technical_resource", Self::TechnicalResource, true),
            ],
            Self::Distribution => &[("host", Self::Host, false), ("license", Self::License, true)],
            Self::Contact => &[
                ("affiliation", Self::Affiliation, false),
                ("contact_id", Self::Identifier, false),
            ],
            Self::Contributor => &[
                ("affiliation", Self::Affiliation, false),
                ("contributor_id", Self::Identifier, false),
            ],
            Self::Affiliation => &[("affiliation_id", Self::Identifier, false)],
            Self::MetadataItem => &[("metadata_standard_id", Self::Identifier, false)],
            Self::Identifier
            | Self::Project
            | Self::Host
            | Self::License
            | Self::SecurityAndPrivacy
            | Self::TechnicalResource => &[],
        }
    }

    fn owns_bucket(self) -> bool {
        matches!(self, Self::Dmp | Self::Dataset)
    }

    /// Check that value fits typed field of key.
    fn check(self, key: &str, value: &Value) -> Result<(), serde_json::Error> {
        let single = Value::Object(Map::from_iter([(key.to_string(), value.clone())]));
        match self {
            Self::Dmp => fits::<Dmp>(single),
            Self::Dataset => fits::<Dataset>(single),
            Self::Distribution => fits::<Distribution>(single),
            Self::Contact => fits::<Contact>(single),
            Self::Contributor => fits::<Contributor>(single),
            Self::Affiliation => fits::<Affiliation>(single),
            Self::Identifier => fits::<Identifier>(single),
            Self::Project => fits::<Project>(single),
            Self::Host => fits::<Host>(single),
            Self::License => fits::<License>(single),
            Self::MetadataItem => fits::<MetadataItem>(single),
            Self::SecurityAndPrivacy => fits::<SecurityAndPrivacy>(single),
            Self::TechnicalResource => fits::<TechnicalResource>(single),
        }
    }
}

fn fits<T: DeserializeOwned>(value: Value) -> Result<(), serde_json::Error> {
    serde_json::from_value::<T>(value).map(|_| ())
}

fn sift_owner(shape: Shape, owner: &mut Map<String, Value>, path: &str, messages: &mut Vec<String>) {
    if let Some(Err(err)) = owner.get(EXTENSION_KEY).map(|slot| shape.check(EXTENSION_KEY, slot)) {
        messages.push(format!("{path}.{EXTENSION_KEY}: {err}, coerced into bucket"));
        let bucket = bucket_of(owner.remove(EXTENSION_KEY));
        owner.insert(EXTENSION_KEY.into(), bucket_to_value(bucket));
    }

    let mut stray = Vec::new();
    sift(shape, owner, path, "", &mut stray, messages);
    move_into_bucket(owner, stray);
}

fn sift(
    shape: Shape,
    object: &mut Map<String, Value>,
    path: &str,
    prefix: &str,
    stray: &mut Vec<(String, Value)>,
    messages: &mut Vec<String>,
) {
    // INVARIANT: Children are sifted first, so a parent key only fails on its own type.
    for &(key, child, is_list) in shape.children() {
        match object.get_mut(key) {
            Some(Value::Object(inner)) if !is_list => {
                let path = format!("{path}.{key}");
                let prefix = format!("{prefix}{key}.");
                descend(child, inner, &path, &prefix, stray, messages);
            }
            Some(Value::Array(items)) if is_list => {
                for (index, item) in items.iter_mut().enumerate() {
                    if let Value::Object(inner) = item {
                        let path = format!("{path}.{key}[{index}]");
                        let prefix = format!("{prefix}{key}[{index}].");
                        descend(child, inner, &path, &prefix, stray, messages);
                    }
                }
            }
            _ => {}
        }
    }

    let misfits: Vec<(String, String)> = object
        .iter()
        .filter(|(key, _)| key.as_str() != EXTENSION_KEY)
        .filter_map(|(key, value)| {
            shape
                .check(key, value)
                .err()
                .map(|err| (key.clone(), err.to_string()))
        })
        .collect();
    if misfits.is_empty() {
        return;
    }

    let mut kept = Map::new();
    for (key, value) in std::mem::take(object) {
        match misfits.iter().find(|(misfit, _)| *misfit == key) {
            Some((_, reason)) => {
                messages.push(format!("{path}.{key}: {reason}, moved into extension"));
                stray.push((format!("{prefix}{key}"), value));
            }
            None => {
                kept.insert(key, value);
            }
        }
    }
    *object = kept;
}

fn descend(
    shape: Shape,
    object: &mut Map<String, Value>,
    path: &str,
    prefix: &str,
    stray: &mut Vec<(String, Value)>,
    messages: &mut Vec<String>,
) {
    if shape.owns_bucket() {
        sift_owner(shape, object, path, messages);
    } else {
        sift(shape, object, path, prefix, stray, messages);
    }
}

fn exempt(canonical: &[&str], declared: &[String]) -> BTreeSet<String> {
    canonical
        .iter()
        .map(|key| key.to_string())
        .chain(declared.iter().cloned())
        .chain([EXTENSION_KEY.to_string()])
        .collect()
}

fn take_unknown(object: &mut Map<String, Value>, known: &BTreeSet<String>) -> Vec<(String, Value)> {
    let keys: Vec<String> = object.keys().filter(|key| !known.contains(*key)).cloned().collect();
    keys.into_iter()
        .filter_map(|key| object.remove(&key).map(|value| (key, value)))
        .collect()
}

fn move_into_bucket(owner: &mut Map<String, Value>, entries: Vec<(String, Value)>) -> usize {
    if entries.is_empty() {
        return 0;
    }

    let mut bucket = bucket_of(owner.remove(EXTENSION_KEY));
    let count = entries.len();
    for (key, value) in entries {
        debug!("move {key:?} into extension bucket");
        set_payload(&mut bucket, &key, value);
    }
    owner.insert(EXTENSION_KEY.into(), bucket_to_value(bucket));
    count
}

/// Coerce whatever sits in an extension slot into a bucket.
pub(crate) fn bucket_of(value: Option<Value>) -> Vec<Extension> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                Value::Object(entry) => entry,
                other => Map::from_iter([(EXTENSION_KEY.to_string(), other)]),
            })
            .collect(),
        Some(Value::Object(entry)) => vec![entry],
        Some(other) => vec![Map::from_iter([(EXTENSION_KEY.to_string(), other)])],
    }
}

fn bucket_to_value(bucket: Vec<Extension>) -> Value {
    Value::Array(bucket.into_iter().map(Value::Object).collect())
}
