//! Core data models for the antbox content repository.
//!
//! A [`Node`] is a common envelope plus a tagged [`NodeVariant`]
//! payload discriminated by mimetype. Operations that care about a
//! variant (folder-like, file-like, aspectable) test variant tags.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::builtins;
use crate::filters::NodeFilters;

// =============================================================================
// PERMISSIONS
// =============================================================================

/// Capability granted on a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    Export,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Write => write!(f, "Write"),
            Self::Export => write!(f, "Export"),
        }
    }
}

/// Permission buckets of a folder.
///
/// `advanced` maps group uuids to extra capability lists. New child
/// folders inherit the parent's buckets when none are supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderPermissions {
    pub anonymous: Vec<Permission>,
    pub authenticated: Vec<Permission>,
    pub group: Vec<Permission>,
    pub advanced: BTreeMap<String, Vec<Permission>>,
}

impl Default for FolderPermissions {
    fn default() -> Self {
        Self {
            anonymous: vec![],
            authenticated: vec![Permission::Read],
            group: vec![Permission::Read, Permission::Write, Permission::Export],
            advanced: BTreeMap::new(),
        }
    }
}

impl FolderPermissions {
    /// Buckets that grant nothing to anyone but admins and the owner.
    pub fn restricted() -> Self {
        Self {
            anonymous: vec![],
            authenticated: vec![],
            group: vec![],
            advanced: BTreeMap::new(),
        }
    }
}

// =============================================================================
// ASPECTS
// =============================================================================

/// Property value type accepted by an aspect property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Uuid,
    Array,
    Object,
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Uuid => "uuid",
            Self::Array => "array",
            Self::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// Schema of a single aspect property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectProperty {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    /// Element type when `property_type` is `Array`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_type: Option<PropertyType>,
    #[serde(default)]
    pub required: bool,
    /// Readonly properties are set at creation only; updates silently
    /// preserve the prior value.
    #[serde(default)]
    pub readonly: bool,
    /// Searchable values feed the node's derived fulltext.
    #[serde(default)]
    pub searchable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
    /// Filters every uuid-typed referenced node must satisfy.
    #[serde(default, skip_serializing_if = "NodeFilters::is_empty")]
    pub validation_filters: NodeFilters,
}

impl AspectProperty {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            title: None,
            property_type,
            array_type: None,
            required: false,
            readonly: false,
            searchable: false,
            default_value: None,
            validation_filters: NodeFilters::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn with_array_type(mut self, array_type: PropertyType) -> Self {
        self.array_type = Some(array_type);
        self
    }

    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_validation_filters(mut self, filters: NodeFilters) -> Self {
        self.validation_filters = filters;
        self
    }
}

/// Variant payload of an aspect node: the schema it defines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AspectSpec {
    /// Filters restricting which nodes may bear this aspect.
    #[serde(skip_serializing_if = "NodeFilters::is_empty")]
    pub filters: NodeFilters,
    /// Declared properties, keyed on nodes as `"<aspectUuid>:<name>"`.
    #[serde(rename = "aspectProperties", skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<AspectProperty>,
}

/// Aspect schema as stored in the configuration repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectDefinition {
    pub uuid: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub builtin: bool,
    #[serde(default, skip_serializing_if = "NodeFilters::is_empty")]
    pub filters: NodeFilters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<AspectProperty>,
}

impl AspectDefinition {
    /// Key under which `property` appears in a node's property map.
    pub fn property_key(&self, property: &AspectProperty) -> String {
        format!("{}:{}", self.uuid, property.name)
    }
}

// =============================================================================
// SMART FOLDERS
// =============================================================================

/// Aggregation formula applied over an evaluated smart-folder result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFormula {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Med,
}

/// A saved aggregation of a smart folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub title: String,
    pub field: String,
    pub formula: AggregationFormula,
}

/// A computed aggregation value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub title: String,
    pub value: JsonValue,
}

/// Variant payload of a smart folder: the saved query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmartFolderSpec {
    pub filters: NodeFilters,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Aggregation>,
}

// =============================================================================
// FOLDERS
// =============================================================================

/// Variant payload of a folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderSpec {
    pub permissions: FolderPermissions,
    /// Filters every child must satisfy.
    #[serde(skip_serializing_if = "NodeFilters::is_empty")]
    pub filters: NodeFilters,
}

// =============================================================================
// FEATURES
// =============================================================================

/// Parameter/return value type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    File,
}

/// A declared feature parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_type: Option<ParameterType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FeatureParameter {
    pub fn new(name: impl Into<String>, parameter_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            array_type: None,
            required: false,
            description: None,
        }
    }

    pub fn with_array_type(mut self, array_type: ParameterType) -> Self {
        self.array_type = Some(array_type);
        self
    }
}

/// Variant payload of a feature node.
///
/// Exposure flags subtype the feature: Action (bulk node operation),
/// Extension (request/response handler), AI Tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureSpec {
    pub expose_action: bool,
    pub expose_extension: bool,
    pub expose_ai_tool: bool,
    pub run_on_creates: bool,
    pub run_on_updates: bool,
    pub run_on_deletes: bool,
    pub run_manually: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups_allowed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<FeatureParameter>,
    /// `None` means the feature returns nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<ParameterType>,
    /// Filters a candidate payload node must satisfy for automation runs.
    #[serde(skip_serializing_if = "NodeFilters::is_empty")]
    pub filters: NodeFilters,
}

// =============================================================================
// AGENTS
// =============================================================================

/// Variant payload of an AI agent configuration node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSpec {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub reasoning: bool,
    pub use_tools: bool,
    pub system_instructions: String,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            reasoning: false,
            use_tools: false,
            system_instructions: "You are a helpful assistant.".to_string(),
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

/// Variant-specific payload, discriminated by mimetype.
///
/// `Plain` covers files and meta nodes, which carry no extra payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeVariant {
    Folder(FolderSpec),
    SmartFolder(SmartFolderSpec),
    Aspect(AspectSpec),
    Feature(FeatureSpec),
    Agent(AgentSpec),
    ApiKey {
        secret: String,
    },
    #[default]
    Plain,
}

/// Placeholder replacing an api-key secret on standard reads.
pub const SECRET_HIDDEN: &str = "--hidden--";

/// A node of the content repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub uuid: String,
    pub fid: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mimetype: String,
    pub parent: String,
    pub owner: String,
    pub group: String,
    pub created_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspects: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub fulltext: String,
    #[serde(flatten)]
    pub variant: NodeVariant,
}

impl Node {
    pub fn is_folder(&self) -> bool {
        matches!(self.variant, NodeVariant::Folder(_))
    }

    pub fn is_smart_folder(&self) -> bool {
        matches!(self.variant, NodeVariant::SmartFolder(_))
    }

    pub fn is_aspect(&self) -> bool {
        matches!(self.variant, NodeVariant::Aspect(_))
    }

    pub fn is_feature(&self) -> bool {
        matches!(self.variant, NodeVariant::Feature(_))
    }

    pub fn is_agent(&self) -> bool {
        matches!(self.variant, NodeVariant::Agent(_))
    }

    pub fn is_api_key(&self) -> bool {
        matches!(self.variant, NodeVariant::ApiKey { .. })
    }

    /// File-like nodes carry a binary in the content store.
    ///
    /// Anything with a non-reserved mimetype, plus features (whose
    /// binary is the script source).
    pub fn is_file_like(&self) -> bool {
        !builtins::is_reserved_mimetype(&self.mimetype) || self.is_feature()
    }

    /// Whether this is a reserved built-in node.
    pub fn is_builtin(&self) -> bool {
        crate::uuid_utils::is_builtin_uuid(&self.uuid)
    }

    pub fn folder_spec(&self) -> Option<&FolderSpec> {
        match &self.variant {
            NodeVariant::Folder(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn folder_spec_mut(&mut self) -> Option<&mut FolderSpec> {
        match &mut self.variant {
            NodeVariant::Folder(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn smart_folder_spec(&self) -> Option<&SmartFolderSpec> {
        match &self.variant {
            NodeVariant::SmartFolder(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn aspect_spec(&self) -> Option<&AspectSpec> {
        match &self.variant {
            NodeVariant::Aspect(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn feature_spec(&self) -> Option<&FeatureSpec> {
        match &self.variant {
            NodeVariant::Feature(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn agent_spec(&self) -> Option<&AgentSpec> {
        match &self.variant {
            NodeVariant::Agent(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn api_key_secret(&self) -> Option<&str> {
        match &self.variant {
            NodeVariant::ApiKey { secret } => Some(secret),
            _ => None,
        }
    }

    /// Clone with the api-key secret concealed. Identity for every
    /// other variant.
    pub fn with_hidden_secret(&self) -> Node {
        let mut node = self.clone();
        if let NodeVariant::ApiKey { secret } = &mut node.variant {
            *secret = SECRET_HIDDEN.to_string();
        }
        node
    }

    /// Aspect schema of an aspect node, as a configuration definition.
    pub fn to_aspect_definition(&self) -> Option<AspectDefinition> {
        self.aspect_spec().map(|spec| AspectDefinition {
            uuid: self.uuid.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            builtin: self.is_builtin(),
            filters: spec.filters.clone(),
            properties: spec.properties.clone(),
        })
    }
}

// =============================================================================
// NODE METADATA (create/update input)
// =============================================================================

/// Caller-supplied node attributes for `create` and `update`.
///
/// Everything is optional; absent fields are generated (uuid, fid),
/// inherited (permissions, group), or left unchanged (update). Derived
/// fields (fulltext, modifiedTime, sanitized properties) are never
/// accepted from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeMetadata {
    pub uuid: Option<String>,
    pub fid: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub mimetype: Option<String>,
    pub parent: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub tags: Option<Vec<String>>,
    pub aspects: Option<Vec<String>>,
    pub properties: Option<BTreeMap<String, JsonValue>>,
    pub permissions: Option<FolderPermissions>,
    pub filters: Option<NodeFilters>,
    pub aggregations: Option<Vec<Aggregation>>,
    pub aspect_properties: Option<Vec<AspectProperty>>,
    pub feature: Option<FeatureSpec>,
    pub agent: Option<AgentSpec>,
    pub secret: Option<String>,
}

impl NodeMetadata {
    pub fn new(title: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            parent: Some(parent.into()),
            ..Default::default()
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn with_aspects(mut self, aspects: Vec<String>) -> Self {
        self.aspects = Some(aspects);
        self
    }

    pub fn with_properties(mut self, properties: BTreeMap<String, JsonValue>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_permissions(mut self, permissions: FolderPermissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_filters(mut self, filters: NodeFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_aggregations(mut self, aggregations: Vec<Aggregation>) -> Self {
        self.aggregations = Some(aggregations);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

// =============================================================================
// FILES
// =============================================================================

/// Binary payload handed to `create_file`/`update_file`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePayload {
    pub name: String,
    pub mimetype: String,
    pub content: Vec<u8>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, mimetype: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mimetype: mimetype.into(),
            content,
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Binary returned by `export`, with the output mimetype remapping
/// already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    pub name: String,
    pub mimetype: String,
    pub content: Vec<u8>,
}

// =============================================================================
// PAGINATION
// =============================================================================

/// One page of a repository filter evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFilterResult {
    pub nodes: Vec<Node>,
    pub page_size: usize,
    pub page_count: usize,
    pub page_token: usize,
}

impl NodeFilterResult {
    pub fn empty(page_size: usize, page_token: usize) -> Self {
        Self {
            nodes: vec![],
            page_size,
            page_count: 0,
            page_token,
        }
    }
}

// =============================================================================
// IDENTITY (configuration repository payloads)
// =============================================================================

/// A principal group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub uuid: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub builtin: bool,
}

/// A user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default)]
    pub builtin: bool,
}

// =============================================================================
// WORKFLOWS (configuration repository payloads)
// =============================================================================

/// A workflow state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTransition {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// A saved workflow definition. Execution is external; the repository
/// only stores the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub uuid: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub states: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<WorkflowTransition>,
}

/// A running (or finished) workflow instance bound to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub uuid: String,
    pub definition_uuid: String,
    pub node_uuid: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<WorkflowHistoryEntry>,
}

/// One state the instance passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowHistoryEntry {
    pub state: String,
    pub entered_at: DateTime<Utc>,
}
