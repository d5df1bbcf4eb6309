//! Filter AST and in-memory evaluation.
//!
//! A 1-D filter is a `(field, operator, value)` triple, serialized as a
//! three-element JSON array. A 2-D filter is a sequence of 1-D groups:
//! filters inside a group are AND-ed, groups are OR-ed. An empty filter
//! list matches every node.
//!
//! Evaluation rules: an operator applied to a missing field is false;
//! `contains` on a non-array is false; string comparisons are
//! case-sensitive except `fulltext`/`:content` matches, which are case-
//! and diacritic-folded.
//!
//! Fields beginning with `@` are predicates about the node's parent
//! folder; they are resolved against the repository before evaluation
//! (see the service-side resolver) and are never matched directly here.

use serde::de::Deserializer;
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::fulltext::fold_text;
use crate::models::{Node, NodeVariant};

/// Virtual field routed to the semantic-search plane.
pub const CONTENT_FIELD: &str = ":content";

/// Field-name prefix denoting a predicate about the parent folder.
pub const PARENT_PREFIX: char = '@';

// =============================================================================
// OPERATORS
// =============================================================================

/// Comparison operator of a 1-D filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
    /// Semantic match. Extracted by the search pipeline when a vector
    /// plane is configured; degrades to a folded substring match here.
    #[serde(rename = "~=")]
    Semantic,
    /// Glob match on strings (`*` and `?` wildcards).
    #[serde(rename = "match")]
    Match,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::In => "in",
            Self::Contains => "contains",
            Self::Semantic => "~=",
            Self::Match => "match",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
        };
        write!(f, "{}", symbol)
    }
}

// =============================================================================
// AST
// =============================================================================

/// A 1-D filter: `(field, operator, value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: JsonValue,
}

impl Filter {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<JsonValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Whether this predicate targets the parent folder (`@field`).
    pub fn is_parent_predicate(&self) -> bool {
        self.field.starts_with(PARENT_PREFIX)
    }

    /// Whether this is a semantic match on the virtual content field.
    pub fn is_content_match(&self) -> bool {
        self.operator == FilterOperator::Semantic && self.field == CONTENT_FIELD
    }

    /// Strip the `@` prefix, yielding the parent-folder field name.
    pub fn strip_parent_prefix(&self) -> Filter {
        let mut filter = self.clone();
        if let Some(rest) = filter.field.strip_prefix(PARENT_PREFIX) {
            filter.field = rest.to_string();
        }
        filter
    }

    /// Evaluate this filter against a node.
    pub fn matches(&self, node: &Node) -> bool {
        let actual = field_value(node, &self.field);
        eval_operator(self.operator, &self.field, actual.as_ref(), &self.value)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.field)?;
        tuple.serialize_element(&self.operator)?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (field, operator, value) =
            <(String, FilterOperator, JsonValue)>::deserialize(deserializer)?;
        Ok(Filter {
            field,
            operator,
            value,
        })
    }
}

/// A conjunction of 1-D filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup(pub Vec<Filter>);

impl FilterGroup {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self(filters)
    }

    pub fn push(&mut self, filter: Filter) {
        self.0.push(filter);
    }

    pub fn with(mut self, filter: Filter) -> Self {
        self.0.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All filters must match. An empty group matches everything.
    pub fn matches(&self, node: &Node) -> bool {
        self.0.iter().all(|filter| filter.matches(node))
    }
}

impl FromIterator<Filter> for FilterGroup {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A disjunction of conjunctions (OR of ANDs).
///
/// Accepts both wire shapes: a flat list of triples (one conjunction)
/// and a list of lists of triples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFilters {
    pub groups: Vec<FilterGroup>,
}

impl NodeFilters {
    /// The match-all filter.
    pub fn all() -> Self {
        Self::default()
    }

    /// A single conjunction.
    pub fn conjunction(filters: Vec<Filter>) -> Self {
        Self {
            groups: vec![FilterGroup(filters)],
        }
    }

    /// A single 1-D filter.
    pub fn single(filter: Filter) -> Self {
        Self::conjunction(vec![filter])
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether any conjunction carries a parent (`@`) predicate.
    pub fn has_parent_predicates(&self) -> bool {
        self.groups
            .iter()
            .any(|group| group.0.iter().any(Filter::is_parent_predicate))
    }

    /// Whether any conjunction carries a `:content ~=` predicate.
    pub fn has_content_match(&self) -> bool {
        self.groups
            .iter()
            .any(|group| group.0.iter().any(Filter::is_content_match))
    }

    /// Some conjunction must match. An empty filter set matches all.
    pub fn matches(&self, node: &Node) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        self.groups.iter().any(|group| group.matches(node))
    }

    /// Append `filter` to every conjunction (distributes an AND over
    /// the disjunction). A match-all gains a single conjunction.
    pub fn conjoin(mut self, filter: Filter) -> Self {
        if self.groups.is_empty() {
            self.groups.push(FilterGroup::default());
        }
        for group in &mut self.groups {
            group.push(filter.clone());
        }
        self
    }

    /// Parse from a JSON value in either the 1-D or the 2-D shape.
    pub fn from_value(value: &JsonValue) -> Result<Self, String> {
        let items = value
            .as_array()
            .ok_or_else(|| "filters must be a JSON array".to_string())?;
        if items.is_empty() {
            return Ok(Self::default());
        }

        let first = items[0]
            .as_array()
            .ok_or_else(|| "each filter must be a JSON array".to_string())?;
        let is_one_dimensional = first.first().map(JsonValue::is_string).unwrap_or(false);

        if is_one_dimensional {
            let filters = items
                .iter()
                .map(|item| serde_json::from_value::<Filter>(item.clone()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;
            Ok(Self::conjunction(filters))
        } else {
            let groups = items
                .iter()
                .map(|item| serde_json::from_value::<FilterGroup>(item.clone()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;
            Ok(Self { groups })
        }
    }

    /// Parse from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let value: JsonValue = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        Self::from_value(&value)
    }
}

impl Serialize for NodeFilters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // A single conjunction keeps the flat 1-D shape.
        if self.groups.len() == 1 {
            self.groups[0].serialize(serializer)
        } else {
            self.groups.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for NodeFilters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// FIELD RESOLUTION
// =============================================================================

/// Resolve a filter field against a node.
///
/// Returns `None` for unknown or absent fields; every operator treats
/// that as a non-match. Api-key secrets are deliberately unreachable.
pub fn field_value(node: &Node, field: &str) -> Option<JsonValue> {
    match field {
        "uuid" => Some(JsonValue::String(node.uuid.clone())),
        "fid" => Some(JsonValue::String(node.fid.clone())),
        "title" => Some(JsonValue::String(node.title.clone())),
        "description" => node.description.clone().map(JsonValue::String),
        "mimetype" => Some(JsonValue::String(node.mimetype.clone())),
        "parent" => Some(JsonValue::String(node.parent.clone())),
        "owner" => Some(JsonValue::String(node.owner.clone())),
        "group" => Some(JsonValue::String(node.group.clone())),
        "size" => Some(JsonValue::from(node.size)),
        "createdTime" => Some(JsonValue::String(iso_time(&node.created_time))),
        "modifiedTime" => Some(JsonValue::String(iso_time(&node.modified_time))),
        "tags" => serde_json::to_value(&node.tags).ok(),
        "aspects" => serde_json::to_value(&node.aspects).ok(),
        "fulltext" | CONTENT_FIELD => Some(JsonValue::String(node.fulltext.clone())),
        _ => {
            if let Some(key) = field.strip_prefix("properties.") {
                node.properties.get(key).cloned()
            } else if let Some(bucket) = field.strip_prefix("permissions.") {
                permission_bucket(node, bucket)
            } else {
                None
            }
        }
    }
}

fn permission_bucket(node: &Node, bucket: &str) -> Option<JsonValue> {
    let NodeVariant::Folder(spec) = &node.variant else {
        return None;
    };
    match bucket {
        "anonymous" => serde_json::to_value(&spec.permissions.anonymous).ok(),
        "authenticated" => serde_json::to_value(&spec.permissions.authenticated).ok(),
        "group" => serde_json::to_value(&spec.permissions.group).ok(),
        _ => {
            let group = bucket.strip_prefix("advanced.")?;
            spec.permissions
                .advanced
                .get(group)
                .and_then(|caps| serde_json::to_value(caps).ok())
        }
    }
}

fn iso_time(time: &chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// =============================================================================
// OPERATOR EVALUATION
// =============================================================================

fn eval_operator(
    operator: FilterOperator,
    field: &str,
    actual: Option<&JsonValue>,
    expected: &JsonValue,
) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let folded = field == "fulltext" || field == CONTENT_FIELD;

    match operator {
        FilterOperator::Equal => json_equal(actual, expected, folded),
        FilterOperator::NotEqual => !json_equal(actual, expected, folded),
        FilterOperator::LessThan => compare(actual, expected)
            .map(std::cmp::Ordering::is_lt)
            .unwrap_or(false),
        FilterOperator::LessThanOrEqual => compare(actual, expected)
            .map(std::cmp::Ordering::is_le)
            .unwrap_or(false),
        FilterOperator::GreaterThan => compare(actual, expected)
            .map(std::cmp::Ordering::is_gt)
            .unwrap_or(false),
        FilterOperator::GreaterThanOrEqual => compare(actual, expected)
            .map(std::cmp::Ordering::is_ge)
            .unwrap_or(false),
        FilterOperator::In => expected
            .as_array()
            .map(|candidates| candidates.iter().any(|c| json_equal(actual, c, folded)))
            .unwrap_or(false),
        FilterOperator::Contains => actual
            .as_array()
            .map(|elements| elements.iter().any(|e| json_equal(e, expected, false)))
            .unwrap_or(false),
        FilterOperator::Semantic => match (actual.as_str(), expected.as_str()) {
            (Some(actual), Some(expected)) => fold_text(actual).contains(&fold_text(expected)),
            _ => false,
        },
        FilterOperator::Match => match (actual.as_str(), expected.as_str()) {
            (Some(actual), Some(pattern)) => glob_match(actual, pattern, folded),
            _ => false,
        },
        FilterOperator::StartsWith => {
            string_affix(actual, expected, folded, |text, affix| text.starts_with(affix))
        }
        FilterOperator::EndsWith => {
            string_affix(actual, expected, folded, |text, affix| text.ends_with(affix))
        }
    }
}

fn json_equal(a: &JsonValue, b: &JsonValue, folded: bool) -> bool {
    if folded {
        if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
            return fold_text(a) == fold_text(b);
        }
    }
    // Numbers compare by value so 7 == 7.0.
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a == b;
    }
    a == b
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

fn string_affix(
    actual: &JsonValue,
    expected: &JsonValue,
    folded: bool,
    check: fn(&str, &str) -> bool,
) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(actual), Some(expected)) => {
            if folded {
                check(&fold_text(actual), &fold_text(expected))
            } else {
                check(actual, expected)
            }
        }
        _ => false,
    }
}

fn glob_match(text: &str, pattern: &str, folded: bool) -> bool {
    let (text, pattern) = if folded {
        (fold_text(text), fold_text(pattern))
    } else {
        (text.to_string(), pattern.to_string())
    };
    let mut expression = String::with_capacity(pattern.len() + 2);
    expression.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            _ => expression.push_str(&regex::escape(&c.to_string())),
        }
    }
    expression.push('$');
    regex::Regex::new(&expression)
        .map(|re| re.is_match(&text))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::mimetypes;
    use crate::models::{FolderPermissions, FolderSpec, Permission};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn node() -> Node {
        Node {
            uuid: "n1".to_string(),
            fid: "report".to_string(),
            title: "Relatório".to_string(),
            description: Some("Monthly numbers".to_string()),
            mimetype: "application/pdf".to_string(),
            parent: "--root--".to_string(),
            owner: "jane@example.com".to_string(),
            group: "g1".to_string(),
            created_time: Utc::now(),
            modified_time: Utc::now(),
            size: 512,
            tags: vec!["finance".to_string()],
            aspects: vec!["inv".to_string()],
            properties: BTreeMap::from([("inv:amount".to_string(), json!(100))]),
            fulltext: "relatorio monthly numbers finance".to_string(),
            variant: NodeVariant::Plain,
        }
    }

    #[test]
    fn test_parse_one_dimensional() {
        let filters = NodeFilters::from_json_str(r#"[["title","==","Relatório"]]"#).unwrap();
        assert_eq!(filters.groups.len(), 1);
        assert_eq!(filters.groups[0].0.len(), 1);
        assert!(filters.matches(&node()));
    }

    #[test]
    fn test_parse_two_dimensional() {
        let filters = NodeFilters::from_json_str(
            r#"[[["mimetype","==","application/pdf"]],[["size",">",9000]]]"#,
        )
        .unwrap();
        assert_eq!(filters.groups.len(), 2);
        // First conjunction matches, so the disjunction matches.
        assert!(filters.matches(&node()));
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(NodeFilters::from_json_str(r#""title""#).is_err());
        assert!(NodeFilters::from_json_str(r#"{"a":1}"#).is_err());
    }

    #[test]
    fn test_empty_filters_match_all() {
        let filters = NodeFilters::all();
        assert!(filters.is_empty());
        assert!(filters.matches(&node()));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let filters = NodeFilters {
            groups: vec![
                FilterGroup(vec![Filter::new("size", FilterOperator::GreaterThan, 10)]),
                FilterGroup(vec![Filter::new(
                    "mimetype",
                    FilterOperator::Equal,
                    "application/pdf",
                )]),
            ],
        };
        let json = serde_json::to_string(&filters).unwrap();
        let back: NodeFilters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filters);
    }

    #[test]
    fn test_single_group_serializes_flat() {
        let filters = NodeFilters::single(Filter::new("title", FilterOperator::Equal, "A"));
        let json = serde_json::to_value(&filters).unwrap();
        assert_eq!(json, json!([["title", "==", "A"]]));
    }

    #[test]
    fn test_missing_field_is_false() {
        let n = node();
        assert!(!Filter::new("unknown", FilterOperator::Equal, "x").matches(&n));
        // Even negative operators are false on a missing field.
        assert!(!Filter::new("unknown", FilterOperator::NotEqual, "x").matches(&n));
    }

    #[test]
    fn test_ordering_operators() {
        let n = node();
        assert!(Filter::new("size", FilterOperator::GreaterThan, 100).matches(&n));
        assert!(Filter::new("size", FilterOperator::LessThanOrEqual, 512).matches(&n));
        assert!(!Filter::new("size", FilterOperator::LessThan, 12).matches(&n));
        // Mixed types never order.
        assert!(!Filter::new("size", FilterOperator::GreaterThan, "abc").matches(&n));
    }

    #[test]
    fn test_in_operator() {
        let n = node();
        assert!(Filter::new("group", FilterOperator::In, json!(["g1", "g2"])).matches(&n));
        assert!(!Filter::new("group", FilterOperator::In, json!(["g3"])).matches(&n));
        // Non-array right side is false.
        assert!(!Filter::new("group", FilterOperator::In, json!("g1")).matches(&n));
    }

    #[test]
    fn test_contains_operator() {
        let n = node();
        assert!(Filter::new("aspects", FilterOperator::Contains, "inv").matches(&n));
        assert!(Filter::new("tags", FilterOperator::Contains, "finance").matches(&n));
        // Contains on a non-array field is false.
        assert!(!Filter::new("title", FilterOperator::Contains, "Rel").matches(&n));
    }

    #[test]
    fn test_properties_path() {
        let n = node();
        assert!(Filter::new("properties.inv:amount", FilterOperator::Equal, 100).matches(&n));
        assert!(
            !Filter::new("properties.inv:missing", FilterOperator::Equal, 100).matches(&n)
        );
    }

    #[test]
    fn test_fulltext_is_folded() {
        let n = node();
        assert!(Filter::new("fulltext", FilterOperator::Semantic, "RELATÓRIO").matches(&n));
        assert!(Filter::new(":content", FilterOperator::Semantic, "Monthly").matches(&n));
        // Other string fields stay case-sensitive.
        assert!(!Filter::new("title", FilterOperator::Equal, "relatório").matches(&n));
    }

    #[test]
    fn test_glob_match() {
        let n = node();
        assert!(Filter::new("mimetype", FilterOperator::Match, "application/*").matches(&n));
        assert!(Filter::new("owner", FilterOperator::Match, "jane@*.com").matches(&n));
        assert!(!Filter::new("owner", FilterOperator::Match, "bob@*").matches(&n));
        assert!(Filter::new("fid", FilterOperator::Match, "repor?").matches(&n));
    }

    #[test]
    fn test_starts_and_ends_with() {
        let n = node();
        assert!(Filter::new("mimetype", FilterOperator::StartsWith, "application/").matches(&n));
        assert!(Filter::new("mimetype", FilterOperator::EndsWith, "/pdf").matches(&n));
        assert!(!Filter::new("mimetype", FilterOperator::StartsWith, "image/").matches(&n));
    }

    #[test]
    fn test_permission_bucket_fields() {
        let mut n = node();
        n.mimetype = mimetypes::FOLDER.to_string();
        let mut permissions = FolderPermissions::default();
        permissions
            .advanced
            .insert("g9".to_string(), vec![Permission::Export]);
        n.variant = NodeVariant::Folder(FolderSpec {
            permissions,
            filters: NodeFilters::default(),
        });

        assert!(
            Filter::new("permissions.authenticated", FilterOperator::Contains, "Read").matches(&n)
        );
        assert!(
            Filter::new("permissions.advanced.g9", FilterOperator::Contains, "Export").matches(&n)
        );
        assert!(
            !Filter::new("permissions.advanced.g1", FilterOperator::Contains, "Read").matches(&n)
        );
        // Permission buckets resolve only on folders.
        let plain = node();
        assert!(
            !Filter::new("permissions.authenticated", FilterOperator::Contains, "Read")
                .matches(&plain)
        );
    }

    #[test]
    fn test_conjoin_distributes() {
        let filters = NodeFilters {
            groups: vec![
                FilterGroup(vec![Filter::new("a", FilterOperator::Equal, 1)]),
                FilterGroup(vec![Filter::new("b", FilterOperator::Equal, 2)]),
            ],
        };
        let conjoined = filters.conjoin(Filter::new("c", FilterOperator::Equal, 3));
        assert!(conjoined.groups.iter().all(|g| g.0.len() == 2));

        let all = NodeFilters::all().conjoin(Filter::new("c", FilterOperator::Equal, 3));
        assert_eq!(all.groups.len(), 1);
        assert_eq!(all.groups[0].0.len(), 1);
    }

    #[test]
    fn test_parent_predicate_helpers() {
        let filter = Filter::new("@title", FilterOperator::Equal, "Reports");
        assert!(filter.is_parent_predicate());
        assert_eq!(filter.strip_parent_prefix().field, "title");

        let filters = NodeFilters::single(filter);
        assert!(filters.has_parent_predicates());
    }

    #[test]
    fn test_content_match_detection() {
        let filters = NodeFilters::single(Filter::new(
            CONTENT_FIELD,
            FilterOperator::Semantic,
            "invoices from march",
        ));
        assert!(filters.has_content_match());
        assert!(!NodeFilters::all().has_content_match());
    }

    #[test]
    fn test_number_equality_across_representations() {
        let n = node();
        assert!(Filter::new("properties.inv:amount", FilterOperator::Equal, 100.0).matches(&n));
    }
}
