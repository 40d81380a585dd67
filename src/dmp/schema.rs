// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! RDA maDMP schema documents.
//!
//! The normalizer never hardcodes which fields a plan must carry. It reads
//! them out of the JSON Schema document of the selected version: required
//! keys, types, enumerations, `minItems`, and explicit `default`s. Schema
//! documents are read from a schema directory when a copy is cached there,
//! otherwise the copies bundled into repokit are used.
//!
//! # See Also
//!
//! 1. [RDA DMP Common Standard](https://github.com/RDA-DMP-Common/RDA-DMP-Common-Standard)

use super::{DmpError, Result};

use serde_json::{Map, Value};
use std::{
    borrow::Cow,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::Path,
};
use tracing::{debug, warn};

/// Longest chain of `$ref` pointers followed for one schema node.
const MAX_REF_HOPS: usize = 16;

/// Deepest nesting default values are built for.
const MAX_DEFAULT_DEPTH: usize = 32;

/// Location of JSON Schema documents of every version.
pub const SCHEMA_URL_BASE: &str =
    "https://github.com/RDA-DMP-Common/RDA-DMP-Common-Standard/tree/master/examples/JSON/JSON-schema";

const BUNDLED_1_0: &str = include_str!("../../schemas/maDMP-schema-1.0.json");
const BUNDLED_1_1: &str = include_str!("../../schemas/maDMP-schema-1.1.json");
const BUNDLED_1_2: &str = include_str!("../../schemas/maDMP-schema-1.2.json");

/// Known maDMP schema versions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    V1_0,
    V1_1,
    #[default]
    V1_2,
}

impl SchemaVersion {
    /// Every known version, oldest first.
    pub const ALL: [Self; 3] = [Self::V1_0, Self::V1_1, Self::V1_2];

    /// Latest known version.
    pub const LATEST: Self = Self::V1_2;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
        }
    }

    /// Exact URL stored in `dmp.schema` for this version.
    pub fn url(&self) -> String {
        format!("{SCHEMA_URL_BASE}/{}", self.as_str())
    }

    /// File name of schema document inside of schema directory.
    pub fn file_name(&self) -> String {
        format!("maDMP-schema-{}.json", self.as_str())
    }

    /// Resolve version from schema URL of existing document.
    ///
    /// Only an exact match of a known URL counts. Anything else, including
    /// no URL at all, resolves to the latest version.
    pub fn from_url(url: Option<&str>) -> Self {
        let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) else {
            return Self::LATEST;
        };

        match Self::ALL.into_iter().find(|version| version.url() == url) {
            Some(version) => version,
            None => {
                warn!("unrecognized schema URL {url:?}, using version {}", Self::LATEST);
                Self::LATEST
            }
        }
    }

    fn bundled(&self) -> &'static str {
        match self {
            Self::V1_0 => BUNDLED_1_0,
            Self::V1_1 => BUNDLED_1_1,
            Self::V1_2 => BUNDLED_1_2,
        }
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Loaded JSON Schema document of one version.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    version: SchemaVersion,
    document: Value,
}

impl Schema {
    /// Load schema document of version.
    ///
    /// Prefers `<schema_dir>/maDMP-schema-<version>.json` when it exists.
    ///
    /// # Errors
    ///
    /// - Return [`DmpError::ReadSchema`] if cached schema cannot be read.
    /// - Return [`DmpError::ParseSchema`] if cached schema is not JSON.
    /// - Return [`DmpError::BundledSchema`] if bundled schema is not JSON.
    pub fn load(version: SchemaVersion, schema_dir: Option<&Path>) -> Result<Self> {
        if let Some(path) = schema_dir
            .map(|dir| dir.join(version.file_name()))
            .filter(|path| path.is_file())
        {
            debug!("load schema {version} from {:?}", path.display());
            let data = read_to_string(&path).map_err(|err| DmpError::ReadSchema {
                source: err,
                path: path.clone(),
            })?;
            let document = serde_json::from_str(&data)
                .map_err(|err| DmpError::ParseSchema { source: err, path })?;
            return Ok(Self::from_value(version, document));
        }

        debug!("load bundled schema {version}");
        let document = serde_json::from_str(version.bundled()).map_err(DmpError::BundledSchema)?;
        Ok(Self::from_value(version, document))
    }

    pub fn from_value(version: SchemaVersion, document: Value) -> Self {
        Self { version, document }
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Keys declared for `dmp` object.
    pub fn dmp_keys(&self) -> Vec<String> {
        self.declared_keys(&["dmp"])
    }

    /// Keys declared for entries of `dmp.dataset`.
    pub fn dataset_keys(&self) -> Vec<String> {
        self.declared_keys(&["dmp", "dataset"])
    }

    /// Add every required field missing from document.
    ///
    /// Missing fields get their schema default. Objects are filled
    /// recursively, and empty arrays with `minItems` are seeded with default
    /// items. Existing values are never replaced, except `null` in a required
    /// slot.
    pub fn ensure_required(&self, document: &mut Value) {
        self.ensure(&self.document, "", document);
    }

    /// Replace empty strings in enumerated fields with enum default.
    pub fn repair_empty_enums(&self, document: &mut Value) {
        self.repair(&self.document, "", document);
    }

    /// List places where document does not conform to schema.
    ///
    /// Only required keys, enumerations, and basic types are checked.
    pub fn violations(&self, document: &Value) -> Vec<String> {
        let mut found = Vec::new();
        self.check(&self.document, "", document, &mut found);
        found
    }

    fn declared_keys(&self, path: &[&str]) -> Vec<String> {
        let mut node = self.resolve(&self.document);
        for key in path {
            let next = match node.get("properties").and_then(|props| props.get(*key)) {
                Some(next) => self.resolve(next).into_owned(),
                None => return Vec::new(),
            };
            node = match next.get("items") {
                Some(items) => Cow::Owned(self.resolve(items).into_owned()),
                None => Cow::Owned(next),
            };
        }

        node.get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve chain of local `$ref` pointers, merging sibling keywords over
    /// target.
    ///
    /// Chains longer than [`MAX_REF_HOPS`] are cut off, so a cycle ends up as
    /// whatever keywords were gathered along the way.
    fn resolve<'a>(&'a self, node: &'a Value) -> Cow<'a, Value> {
        if node.get("$ref").is_none() {
            return Cow::Borrowed(node);
        }

        let mut merged = Map::new();
        let mut current = node.as_object().cloned().unwrap_or_default();
        for _ in 0..MAX_REF_HOPS {
            let Some(Value::String(reference)) = current.remove("$ref") else {
                break;
            };
            for (key, value) in std::mem::take(&mut current) {
                merged.entry(key).or_insert(value);
            }
            current = self.target_of(&reference);
        }

        current.remove("$ref");
        for (key, value) in current {
            merged.entry(key).or_insert(value);
        }
        Cow::Owned(Value::Object(merged))
    }

    fn target_of(&self, reference: &str) -> Map<String, Value> {
        reference
            .strip_prefix('#')
            .and_then(|pointer| self.document.pointer(pointer))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    fn ensure(&self, schema: &Value, path: &str, value: &mut Value) {
        let schema = self.resolve(schema);
        let Value::Object(object) = value else {
            return;
        };
        let properties = schema.get("properties").and_then(Value::as_object);

        for key in required(&schema) {
            if object.get(key).is_none_or(Value::is_null) {
                let property = properties.and_then(|props| props.get(key));
                let default = match property {
                    Some(property) => self.default_for(property, &join(path, key)),
                    None => Value::String(String::new()),
                };
                object.insert(key.to_string(), default);
            }
        }

        let Some(properties) = properties else {
            return;
        };

        for (key, property) in properties {
            let Some(child) = object.get_mut(key) else {
                continue;
            };
            let property = self.resolve(property);
            let child_path = join(path, key);

            match child {
                Value::Object(_) => self.ensure(&property, &child_path, child),
                Value::Array(items) => {
                    let Some(item_schema) = property.get("items") else {
                        continue;
                    };
                    if items.is_empty() {
                        for _ in 0..min_items(&property) {
                            let item = self.default_for(item_schema, &format!("{child_path}[]"));
                            items.push(item);
                        }
                    }
                    for item in items.iter_mut() {
                        self.ensure(item_schema, &format!("{child_path}[]"), item);
                    }
                }
                _ => {}
            }
        }
    }

    fn default_for(&self, schema: &Value, path: &str) -> Value {
        if depth(path) > MAX_DEFAULT_DEPTH {
            warn!("schema nests deeper than {MAX_DEFAULT_DEPTH} levels at {path:?}, leaving null");
            return Value::Null;
        }

        let schema = self.resolve(schema);
        if let Some(default) = schema.get("default") {
            return default.clone();
        }

        if let Some(options) = schema.get("enum").and_then(Value::as_array) {
            if let Some(choice) = enum_default(path, options) {
                return choice;
            }
        }

        match schema_type(&schema) {
            Some("object") => {
                let mut object = Value::Object(Map::new());
                self.ensure(&schema, path, &mut object);
                object
            }
            Some("array") => {
                let mut items = Vec::new();
                if let Some(item_schema) = schema.get("items") {
                    for _ in 0..min_items(&schema) {
                        items.push(self.default_for(item_schema, &format!("{path}[]")));
                    }
                }
                Value::Array(items)
            }
            Some("string") => Value::String(String::new()),
            Some("integer") => Value::from(0),
            Some("number") => Value::from(0.0),
            Some("boolean") => Value::Bool(false),
            _ => Value::Null,
        }
    }

    fn repair(&self, schema: &Value, path: &str, value: &mut Value) {
        let schema = self.resolve(schema);
        match value {
            Value::Object(object) => {
                let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                    return;
                };
                for (key, child) in object.iter_mut() {
                    let Some(property) = properties.get(key) else {
                        continue;
                    };
                    let property = self.resolve(property);
                    let child_path = join(path, key);

                    if child.as_str() == Some("") {
                        if let Some(choice) = property
                            .get("enum")
                            .and_then(Value::as_array)
                            .and_then(|options| enum_default(&child_path, options))
                        {
                            *child = choice;
                        }
                    }
                    self.repair(&property, &child_path, child);
                }
            }
            Value::Array(items) => {
                let Some(item_schema) = schema.get("items") else {
                    return;
                };
                for item in items.iter_mut() {
                    self.repair(item_schema, &format!("{path}[]"), item);
                }
            }
            _ => {}
        }
    }

    fn check(&self, schema: &Value, path: &str, value: &Value, found: &mut Vec<String>) {
        let schema = self.resolve(schema);
        let at = if path.is_empty() { "<root>" } else { path };

        if let Some(expect) = schema_type(&schema) {
            let ok = match expect {
                "object" => value.is_object(),
                "array" => value.is_array(),
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                _ => true,
            };
            let nullable = value.is_null() && type_allows_null(&schema);
            if !ok && !nullable {
                found.push(format!("{at}: expected {expect}"));
                return;
            }
        }

        if let Some(options) = schema.get("enum").and_then(Value::as_array) {
            if !value.is_null() && !options.contains(value) {
                found.push(format!("{at}: {value} is not one of the allowed values"));
            }
        }

        match value {
            Value::Object(object) => {
                for key in required(&schema) {
                    if !object.contains_key(key) {
                        found.push(format!("{at}: missing required key {key:?}"));
                    }
                }
                if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                    for (key, child) in object {
                        if let Some(property) = properties.get(key) {
                            self.check(property, &join(path, key), child, found);
                        }
                    }
                }
            }
            Value::Array(items) => {
                if items.len() < min_items(&schema) {
                    found.push(format!("{at}: expected at least {} items", min_items(&schema)));
                }
                if let Some(item_schema) = schema.get("items") {
                    for (index, item) in items.iter().enumerate() {
                        self.check(item_schema, &format!("{path}[{index}]"), item, found);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Pick default value of enumeration at dotted path.
///
/// - `*language` picks "eng".
/// - yes/no/unknown picks "unknown".
/// - Person identifiers pick "orcid", plan identifiers pick "doi".
/// - Otherwise, "orcid" or "doi" when offered, else the first option.
pub(crate) fn enum_default(path: &str, options: &[Value]) -> Option<Value> {
    let lower: Vec<String> = options
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_lowercase)
        .collect();
    let offers = |option: &str| lower.iter().any(|entry| entry == option);
    let key = path.trim_end_matches("[]").to_lowercase();

    let choice = if key.ends_with("language") && offers("eng") {
        "eng"
    } else if offers("yes") && offers("no") && offers("unknown") {
        "unknown"
    } else if (key.ends_with("contact_id.type") || key.ends_with("contributor_id.type"))
        && offers("orcid")
    {
        "orcid"
    } else if key.ends_with("dmp_id.type") && offers("doi") {
        "doi"
    } else if offers("orcid") {
        "orcid"
    } else if offers("doi") {
        "doi"
    } else {
        return options.first().cloned();
    };

    Some(Value::String(choice.into()))
}

/// Nesting depth of dotted path, counting array items as a level.
fn depth(path: &str) -> usize {
    path.split('.').filter(|part| !part.is_empty()).count() + path.matches("[]").count()
}

fn required(schema: &Value) -> impl Iterator<Item = &str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn min_items(schema: &Value) -> usize {
    schema
        .get("minItems")
        .and_then(Value::as_u64)
        .and_then(|min| usize::try_from(min).ok())
        .unwrap_or(0)
}

/// Primary type of schema node, preferring structured types in unions.
fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(kind) => Some(kind.as_str()),
        Value::Array(kinds) => {
            let kinds: Vec<&str> = kinds.iter().filter_map(Value::as_str).collect();
            ["object", "array", "string", "integer", "number", "boolean"]
                .into_iter()
                .find(|kind| kinds.contains(kind))
                .or_else(|| kinds.first().copied())
        }
        _ => None,
    }
}

fn type_allows_null(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "null"),
        Some(Value::String(kind)) => kind == "null",
        _ => false,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use simple_test_case::test_case;

    #[test_case(None, SchemaVersion::V1_2; "missing url")]
    #[test_case(Some(""), SchemaVersion::V1_2; "empty url")]
    #[test_case(Some("https://example.org/1.0"), SchemaVersion::V1_2; "foreign url")]
    #[test_case(
        Some("https://github.com/RDA-DMP-Common/RDA-DMP-Common-Standard/tree/master/examples/JSON/JSON-schema/1.0"),
        SchemaVersion::V1_0;
        "exact 1.0 url"
    )]
    #[test_case(
        Some("https://github.com/RDA-DMP-Common/RDA-DMP-Common-Standard/tree/master/examples/JSON/JSON-schema/1.1"),
        SchemaVersion::V1_1;
        "exact 1.1 url"
    )]
    #[test_case(
        Some("https://github.com/RDA-DMP-Common/RDA-DMP-Common-Standard/tree/master/examples/JSON/JSON-schema/1.1/extra"),
        SchemaVersion::V1_2;
        "partial match is not a match"
    )]
    #[test]
    fn resolve_version_from_url(url: Option<&str>, expect: SchemaVersion) {
        pretty_assertions::assert_eq!(SchemaVersion::from_url(url), expect);
    }

    #[test]
    fn load_bundled_schemas() -> anyhow::Result<()> {
        for version in SchemaVersion::ALL {
            let schema = Schema::load(version, None)?;
            assert_eq!(schema.version(), version);
            assert!(schema.dmp_keys().contains(&"dataset".to_string()));
        }

        assert!(Schema::load(SchemaVersion::V1_2, None)?
            .dataset_keys()
            .contains(&"is_reused".to_string()));
        assert!(!Schema::load(SchemaVersion::V1_1, None)?
            .dataset_keys()
            .contains(&"is_reused".to_string()));

        Ok(())
    }

    #[test]
    fn load_cached_schema_first() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("maDMP-schema-1.1.json"),
            r#"{"properties": {"dmp": {"properties": {"only": {"type": "string"}}}}}"#,
        )?;

        let schema = Schema::load(SchemaVersion::V1_1, Some(dir.path()))?;
        assert_eq!(schema.dmp_keys(), vec!["only".to_string()]);

        Ok(())
    }

    #[test]
    fn ensure_required_from_schema() {
        let schema = Schema::from_value(
            SchemaVersion::V1_2,
            json!({
                "definitions": {
                    "contact_id": {
                        "type": "object",
                        "properties": {
                            "identifier": {"type": "string"},
                            "type": {"type": "string", "enum": ["isni", "orcid", "other"]}
                        },
                        "required": ["identifier", "type"]
                    }
                },
                "type": "object",
                "properties": {
                    "dmp": {
                        "type": "object",
                        "properties": {
                            "contact": {
                                "type": "object",
                                "properties": {
                                    "contact_id": {"$ref": "#/definitions/contact_id"},
                                    "name": {"type": "string"}
                                },
                                "required": ["contact_id", "name"]
                            },
                            "language": {"type": "string", "enum": ["dan", "eng"]},
                            "ethical_issues_exist": {"type": "string", "enum": ["yes", "no", "unknown"]},
                            "version": {"type": "integer", "default": 3},
                            "contributor": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {"role": {"type": "array", "items": {"type": "string"}, "minItems": 1}},
                                    "required": ["role"]
                                }
                            }
                        },
                        "required": ["contact", "language", "ethical_issues_exist", "version"]
                    }
                },
                "required": ["dmp"]
            }),
        );

        let mut document = json!({
            "dmp": {
                "contact": {"name": "Ada"},
                "contributor": [{"role": []}],
                "language": ""
            }
        });
        schema.ensure_required(&mut document);
        schema.repair_empty_enums(&mut document);

        let expect = json!({
            "dmp": {
                "contact": {"name": "Ada", "contact_id": {"identifier": "", "type": "orcid"}},
                "contributor": [{"role": [""]}],
                "language": "eng",
                "ethical_issues_exist": "unknown",
                "version": 3
            }
        });
        assert_eq!(document, expect);
        assert_eq!(schema.violations(&document), Vec::<String>::new());
    }

    #[test]
    fn recursive_schema_terminates() {
        let schema = Schema::from_value(
            SchemaVersion::V1_2,
            json!({
                "definitions": {
                    "node": {
                        "type": "object",
                        "properties": {"child": {"$ref": "#/definitions/node"}},
                        "required": ["child"]
                    },
                    "ping": {"$ref": "#/definitions/pong", "description": "ping"},
                    "pong": {"$ref": "#/definitions/ping"}
                },
                "type": "object",
                "properties": {
                    "dmp": {
                        "type": "object",
                        "properties": {
                            "tree": {"$ref": "#/definitions/node"},
                            "loop": {"$ref": "#/definitions/ping"}
                        },
                        "required": ["tree", "loop"]
                    }
                },
                "required": ["dmp"]
            }),
        );

        let mut document = json!({"dmp": {}});
        schema.ensure_required(&mut document);

        let mut levels = 0;
        let mut node = &document["dmp"]["tree"];
        while node.is_object() {
            levels += 1;
            node = &node["child"];
        }
        assert!(levels > 0 && levels <= MAX_DEFAULT_DEPTH);
        assert_eq!(document["dmp"]["loop"], Value::Null);
    }

    #[test_case("dmp.language", json!(["dan", "eng"]), json!("eng"); "language")]
    #[test_case("dmp.dataset[].personal_data", json!(["yes", "no", "unknown"]), json!("unknown"); "triad")]
    #[test_case("dmp.contact.contact_id.type", json!(["isni", "orcid"]), json!("orcid"); "contact id")]
    #[test_case("dmp.dmp_id.type", json!(["handle", "doi", "url"]), json!("doi"); "dmp id")]
    #[test_case("dmp.dataset[].distribution[].data_access", json!(["open", "shared", "closed"]), json!("open"); "first option")]
    #[test]
    fn pick_enum_default(path: &str, options: Value, expect: Value) {
        let options = options.as_array().cloned().unwrap_or_default();
        pretty_assertions::assert_eq!(enum_default(path, &options), Some(expect));
    }

    #[test]
    fn report_violations() -> anyhow::Result<()> {
        let schema = Schema::load(SchemaVersion::V1_2, None)?;
        let document = json!({
            "dmp": {
                "title": "Study X",
                "language": "klingon",
                "dataset": "not a list"
            }
        });

        let found = schema.violations(&document);
        assert!(found.contains(&"dmp: missing required key \"contact\"".to_string()));
        assert!(found.contains(&"dmp.language: \"klingon\" is not one of the allowed values".to_string()));
        assert!(found.contains(&"dmp.dataset: expected array".to_string()));

        Ok(())
    }
}
