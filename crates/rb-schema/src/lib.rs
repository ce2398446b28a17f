// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed variable schemas: YAML loading, load-time validation, and
//! runtime value validation against an ordered rule list.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use rb_core::{ErrorCode, ErrorInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The type a [`Variable`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    /// A UTF-8 string.
    String,
    /// A signed integer.
    Int,
    /// A floating point number.
    Float,
    /// A boolean.
    Bool,
    /// A string restricted to `options`.
    Enum,
    /// A list of values.
    List,
    /// A map of structured records, described by a nested `schema`.
    Map,
}

/// A single ordered rule in a [`Variable`]'s `validations` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// The value must be present and non-empty.
    Required,
    /// The value must look like an email address.
    Email,
    /// The value must look like a URL.
    Url,
    /// The value must consist only of alphabetic characters.
    Alpha,
    /// The value must consist only of digits.
    Digit,
    /// The value must consist only of alphanumeric characters.
    Alphanumeric,
    /// The value must be a valid semantic version string.
    Semver,
    /// The value's length must fall within `[min, max]` inclusive.
    Length {
        /// Minimum length, inclusive.
        min: usize,
        /// Maximum length, inclusive.
        max: usize,
    },
    /// The value must be a two-letter ISO country code.
    CountryCode2,
}

impl ValidationRule {
    /// Parse a rule from its textual form, e.g. `"required"` or
    /// `"length[3,10]"`.
    fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Some(inner) = raw
            .strip_prefix("length[")
            .and_then(|s| s.strip_suffix(']'))
        {
            let mut parts = inner.split(',').map(str::trim);
            let min = parts
                .next()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| format!("invalid length rule: {raw}"))?;
            let max = parts
                .next()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| format!("invalid length rule: {raw}"))?;
            if parts.next().is_some() {
                return Err(format!("invalid length rule: {raw}"));
            }
            return Ok(Self::Length { min, max });
        }

        match raw {
            "required" => Ok(Self::Required),
            "email" => Ok(Self::Email),
            "url" => Ok(Self::Url),
            "alpha" => Ok(Self::Alpha),
            "digit" => Ok(Self::Digit),
            "alphanumeric" => Ok(Self::Alphanumeric),
            "semver" => Ok(Self::Semver),
            "countrycode2" => Ok(Self::CountryCode2),
            other => Err(format!("unknown validation rule: {other}")),
        }
    }

    /// The name reported in a [`ErrorCode::ValidationFailed`] context.
    fn name(&self) -> String {
        match self {
            Self::Required => "required".to_string(),
            Self::Email => "email".to_string(),
            Self::Url => "url".to_string(),
            Self::Alpha => "alpha".to_string(),
            Self::Digit => "digit".to_string(),
            Self::Alphanumeric => "alphanumeric".to_string(),
            Self::Semver => "semver".to_string(),
            Self::Length { min, max } => format!("length[{min},{max}]"),
            Self::CountryCode2 => "countrycode2".to_string(),
        }
    }

    fn check(&self, value: &str) -> bool {
        match self {
            Self::Required => !value.is_empty(),
            Self::Email => {
                let parts: Vec<&str> = value.splitn(2, '@').collect();
                parts.len() == 2
                    && !parts[0].is_empty()
                    && parts[1].contains('.')
                    && !parts[1].starts_with('.')
                    && !parts[1].ends_with('.')
            }
            Self::Url => value.starts_with("http://") || value.starts_with("https://"),
            Self::Alpha => !value.is_empty() && value.chars().all(char::is_alphabetic),
            Self::Digit => !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()),
            Self::Alphanumeric => !value.is_empty() && value.chars().all(char::is_alphanumeric),
            Self::Semver => is_semver(value),
            Self::Length { min, max } => {
                let len = value.chars().count();
                len >= *min && len <= *max
            }
            Self::CountryCode2 => value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()),
        }
    }
}

fn is_semver(value: &str) -> bool {
    let core = value.split(['-', '+']).next().unwrap_or(value);
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// A raw YAML variable entry, deserialized before rule parsing.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawVariable {
    name: String,
    #[serde(rename = "type")]
    var_type: VarType,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    validations: Vec<String>,
    #[serde(default)]
    section: Option<String>,
}

/// A typed named parameter for a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique identifier within a schema.
    pub name: String,
    /// The accepted value type.
    pub var_type: VarType,
    /// Human-readable description.
    pub description: Option<String>,
    /// Default value, serialized as JSON, if any.
    pub default: Option<serde_json::Value>,
    /// Whether the variable must be supplied.
    pub required: bool,
    /// Allowed values, required and non-empty iff `var_type == Enum`.
    pub options: Option<Vec<String>>,
    /// Ordered validation rules applied to provided values.
    pub validations: Vec<ValidationRule>,
    /// Optional grouping label.
    pub section: Option<String>,
}

impl Variable {
    fn from_raw(raw: RawVariable) -> Result<Self, ErrorInfo> {
        if raw.var_type == VarType::Enum {
            let options = raw.options.clone().unwrap_or_default();
            if options.is_empty() {
                return Err(ErrorInfo::new(
                    ErrorCode::SchemaInvalid,
                    "enum variable has no options",
                )
                .with_context("variable", raw.name.clone()));
            }
        } else if raw.options.as_ref().is_some_and(|o| !o.is_empty()) {
            return Err(ErrorInfo::new(
                ErrorCode::SchemaInvalid,
                "options are only valid for enum variables",
            )
            .with_context("variable", raw.name.clone()));
        }

        if let Some(ref default) = raw.default {
            if !value_matches_type(default, raw.var_type, raw.options.as_deref()) {
                return Err(ErrorInfo::new(
                    ErrorCode::SchemaInvalid,
                    "default value is inconsistent with declared type",
                )
                .with_context("variable", raw.name.clone()));
            }
        }

        let mut validations = Vec::with_capacity(raw.validations.len());
        for rule in &raw.validations {
            let parsed = ValidationRule::parse(rule).map_err(|reason| {
                ErrorInfo::new(ErrorCode::SchemaInvalid, reason)
                    .with_context("variable", raw.name.clone())
            })?;
            validations.push(parsed);
        }

        Ok(Self {
            name: raw.name,
            var_type: raw.var_type,
            description: raw.description,
            default: raw.default,
            required: raw.required,
            options: raw.options,
            validations,
            section: raw.section,
        })
    }
}

fn value_matches_type(value: &serde_json::Value, var_type: VarType, options: Option<&[String]>) -> bool {
    match var_type {
        VarType::String => value.is_string(),
        VarType::Int => value.is_i64() || value.is_u64(),
        VarType::Float => value.is_number(),
        VarType::Bool => value.is_boolean(),
        VarType::Enum => value
            .as_str()
            .is_some_and(|s| options.is_some_and(|opts| opts.iter().any(|o| o == s))),
        VarType::List => value.is_array(),
        VarType::Map => value.is_object(),
    }
}

/// A labeled, ordered group of variable names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Display label.
    pub label: String,
    /// Variable names belonging to this section, in display order.
    pub variables: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default)]
    variables: Vec<RawVariable>,
    #[serde(default)]
    sections: Vec<Section>,
}

/// An ordered list of variables plus an ordered list of sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Variables, in declaration order.
    pub variables: Vec<Variable>,
    /// Sections, in declaration order.
    pub sections: Vec<Section>,
}

impl Schema {
    /// Look up a variable by name.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Parse a YAML schema document.
///
/// # Errors
///
/// Returns [`ErrorCode::SchemaInvalid`] if the YAML is malformed, a
/// variable has an unknown `type`, an enum has no options, a default does
/// not conform to its declared type, or a variable name is duplicated.
pub fn parse_yaml(raw: &str) -> Result<Schema, ErrorInfo> {
    let parsed: RawSchema = serde_yaml::from_str(raw).map_err(|e| {
        ErrorInfo::new(ErrorCode::SchemaInvalid, "failed to parse schema YAML").with_source(e)
    })?;

    let mut seen = std::collections::BTreeSet::new();
    let mut variables = Vec::with_capacity(parsed.variables.len());
    for raw_var in parsed.variables {
        if !seen.insert(raw_var.name.clone()) {
            return Err(ErrorInfo::new(ErrorCode::SchemaInvalid, "duplicate variable name")
                .with_context("variable", raw_var.name));
        }
        variables.push(Variable::from_raw(raw_var)?);
    }

    Ok(Schema {
        variables,
        sections: parsed.sections,
    })
}

/// Serialize a schema back to YAML, e.g. for the `rawYaml` field returned
/// alongside a loaded schema.
///
/// # Errors
///
/// Returns [`ErrorCode::Internal`] if serialization fails, which should
/// not happen for a schema produced by [`parse_yaml`].
pub fn to_yaml(schema: &Schema) -> Result<String, ErrorInfo> {
    serde_yaml::to_string(schema)
        .map_err(|e| ErrorInfo::new(ErrorCode::Internal, "failed to serialize schema").with_source(e))
}

/// Validate a values map against `schema`, applying required-presence,
/// type coercion, then each variable's ordered `validations` list.
///
/// The first violation across all variables (in schema order) wins.
///
/// # Errors
///
/// Returns [`ErrorCode::ValidationFailed`] with `field` and `rule`
/// context entries identifying the violation.
pub fn validate_values(
    schema: &Schema,
    values: &BTreeMap<String, serde_json::Value>,
) -> Result<(), ErrorInfo> {
    for variable in &schema.variables {
        let provided = values.get(&variable.name);

        let Some(value) = provided else {
            if variable.required {
                return Err(validation_failed(&variable.name, "required"));
            }
            continue;
        };
        let as_text = coerce_to_string(value, variable.var_type, variable.options.as_deref())
            .ok_or_else(|| validation_failed(&variable.name, "type"))?;

        for rule in &variable.validations {
            if !rule.check(&as_text) {
                return Err(validation_failed(&variable.name, &rule.name()));
            }
        }
    }

    Ok(())
}

fn validation_failed(field: &str, rule: &str) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::ValidationFailed, "value failed schema validation")
        .with_context("field", field)
        .with_context("rule", rule)
}

/// Coerce a provided JSON value to its string representation for rule
/// checking, applying the type-coercion policy from the value validator
/// (string/number interchange, boolean `true`/`false`, enum membership).
fn coerce_to_string(value: &serde_json::Value, var_type: VarType, options: Option<&[String]>) -> Option<String> {
    match var_type {
        VarType::String => value.as_str().map(str::to_string),
        VarType::Int => {
            if let Some(n) = value.as_i64() {
                Some(n.to_string())
            } else {
                value.as_str().and_then(|s| s.parse::<i64>().ok()).map(|n| n.to_string())
            }
        }
        VarType::Float => {
            if let Some(n) = value.as_f64() {
                Some(n.to_string())
            } else {
                value.as_str().and_then(|s| s.parse::<f64>().ok()).map(|n| n.to_string())
            }
        }
        VarType::Bool => match value {
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::String(s) if s == "true" || s == "false" => Some(s.clone()),
            _ => None,
        },
        VarType::Enum => value.as_str().and_then(|s| {
            options
                .is_some_and(|opts| opts.iter().any(|o| o == s))
                .then(|| s.to_string())
        }),
        VarType::List | VarType::Map => {
            // Rule checks operate on a textual form; lists/maps are
            // serialized compactly so `length[...]` can still measure
            // their JSON-encoded size if a schema author opts into that.
            serde_json::to_string(value).ok()
        }
    }
}
