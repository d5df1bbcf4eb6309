//! Aspect validation: property sanitization, defaults, type checks,
//! and uuid-reference collection.
//!
//! The pure half lives here; resolving referenced nodes (step 4 of the
//! validation procedure) needs the node service and happens in
//! `service.rs`. Errors aggregate so a single round trip reports every
//! offending property.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use antbox_core::{AspectDefinition, AspectProperty, NodeFilters, PropertyError, PropertyType};

/// Result of sanitizing and type-checking a property map.
#[derive(Debug, Default)]
pub struct SanitizedProperties {
    /// Keys limited to declared aspect properties, with defaults
    /// applied. This map replaces the node's properties.
    pub properties: BTreeMap<String, JsonValue>,
    pub errors: Vec<PropertyError>,
}

/// Sanitize `properties` against the declared aspects and type-check
/// the survivors.
///
/// Keys not matching a declared aspect property are silently dropped.
/// Missing values fall back to the property default; required
/// properties still missing afterwards are errors.
pub fn sanitize_and_check(
    aspects: &[AspectDefinition],
    properties: &BTreeMap<String, JsonValue>,
) -> SanitizedProperties {
    let mut sanitized = BTreeMap::new();
    let mut errors = Vec::new();

    for aspect in aspects {
        for property in &aspect.properties {
            let key = aspect.property_key(property);
            let value = properties
                .get(&key)
                .cloned()
                .or_else(|| property.default_value.clone());

            match value {
                Some(value) => {
                    if let Some(message) = type_error(property, &value) {
                        errors.push(PropertyError::new(&key, message));
                    }
                    sanitized.insert(key, value);
                }
                None => {
                    if property.required {
                        errors.push(PropertyError::new(&key, "required property is missing"));
                    }
                }
            }
        }
    }

    SanitizedProperties {
        properties: sanitized,
        errors,
    }
}

/// Type-check a value against a property schema. Returns the error
/// message on mismatch.
fn type_error(property: &AspectProperty, value: &JsonValue) -> Option<String> {
    if !matches_type(property.property_type, value) {
        return Some(format!("expected {}", property.property_type));
    }
    if property.property_type == PropertyType::Array {
        if let (Some(element_type), Some(elements)) = (property.array_type, value.as_array()) {
            for (index, element) in elements.iter().enumerate() {
                if !matches_type(element_type, element) {
                    return Some(format!("element {} expected {}", index, element_type));
                }
            }
        }
    }
    None
}

fn matches_type(property_type: PropertyType, value: &JsonValue) -> bool {
    match property_type {
        PropertyType::String => value.is_string(),
        PropertyType::Number => value.is_number(),
        PropertyType::Boolean => value.is_boolean(),
        PropertyType::Date => value.as_str().map(is_date).unwrap_or(false),
        PropertyType::Uuid => value.as_str().map(|s| !s.is_empty()).unwrap_or(false),
        PropertyType::Array => value.is_array(),
        PropertyType::Object => value.is_object(),
    }
}

fn is_date(raw: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

/// A uuid-typed property value whose referenced nodes must resolve.
#[derive(Debug, Clone)]
pub struct UuidReference {
    pub property_key: String,
    pub uuids: Vec<String>,
    pub validation_filters: NodeFilters,
}

/// Collect every uuid reference in a sanitized property map.
pub fn uuid_references(
    aspects: &[AspectDefinition],
    properties: &BTreeMap<String, JsonValue>,
) -> Vec<UuidReference> {
    let mut references = Vec::new();
    for aspect in aspects {
        for property in &aspect.properties {
            let key = aspect.property_key(property);
            let Some(value) = properties.get(&key) else {
                continue;
            };
            let uuids: Vec<String> = match (property.property_type, property.array_type) {
                (PropertyType::Uuid, _) => value
                    .as_str()
                    .map(|s| vec![s.to_string()])
                    .unwrap_or_default(),
                (PropertyType::Array, Some(PropertyType::Uuid)) => value
                    .as_array()
                    .map(|elements| {
                        elements
                            .iter()
                            .filter_map(|e| e.as_str().map(ToString::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => continue,
            };
            if !uuids.is_empty() {
                references.push(UuidReference {
                    property_key: key,
                    uuids,
                    validation_filters: property.validation_filters.clone(),
                });
            }
        }
    }
    references
}

/// Restore readonly property values from the pre-update record.
///
/// Readonly properties are set at creation only; later updates keep
/// the prior value, including prior absence.
pub fn preserve_readonly(
    aspects: &[AspectDefinition],
    old_properties: &BTreeMap<String, JsonValue>,
    properties: &mut BTreeMap<String, JsonValue>,
) {
    for aspect in aspects {
        for property in &aspect.properties {
            if !property.readonly {
                continue;
            }
            let key = aspect.property_key(property);
            match old_properties.get(&key) {
                Some(previous) => {
                    properties.insert(key, previous.clone());
                }
                None => {
                    properties.remove(&key);
                }
            }
        }
    }
}

/// Stringified values of searchable properties, feeding fulltext
/// derivation.
pub fn searchable_values(
    aspects: &[AspectDefinition],
    properties: &BTreeMap<String, JsonValue>,
) -> Vec<String> {
    let mut values = Vec::new();
    for aspect in aspects {
        for property in &aspect.properties {
            if !property.searchable {
                continue;
            }
            let key = aspect.property_key(property);
            if let Some(value) = properties.get(&key) {
                if let Some(text) = stringify(value) {
                    values.push(text);
                }
            }
        }
    }
    values
}

fn stringify(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Array(elements) => {
            let parts: Vec<String> = elements.iter().filter_map(stringify).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        _ => None,
    }
}
