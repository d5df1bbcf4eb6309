//! The node service: the single authority mediating every node read
//! and mutation.
//!
//! A write runs through reified steps, composing with early return:
//! verify parent, resolve permission, factory-build, validate aspects,
//! apply the readonly policy, write the binary (file paths), append to
//! the repository, publish the lifecycle event. Subscribers (embedding
//! indexer, parent-mtime updater, automation) react off the bus and
//! never sit on the caller's path.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use antbox_core::builtins::{self, mimetypes};
use antbox_core::defaults::SCAN_PAGE_SIZE;
use antbox_core::uuid_utils::{fid_with_suffix, is_builtin_uuid, new_api_key_secret};
use antbox_core::{
    derive_fulltext, fid_from_alias, slugify, AggregationFormula, AggregationResult,
    AspectDefinition, ConfigurationRepository, DomainEvent, EmbeddingModel, Error, EventBus,
    ExportedFile, FeatureSpec, FilePayload, Filter, FilterOperator, FolderSpec, Node,
    NodeFilters, NodeMetadata, NodeRepository, NodeVariant, OcrModel, ParameterType, Permission,
    PropertyError, Result, SmartFolderSpec, StorageProvider, UpdateDiff, VectorDatabase,
    WriteOptions, CONTENT_FIELD,
};
use antbox_db::{InMemoryConfigurationRepository, InMemoryNodeRepository, InMemoryStorageProvider};
use antbox_search::{rewrite_semantic, EmbeddingIndexer, SemanticPlane};

use crate::config::NodeServiceConfig;
use crate::context::AuthenticationContext;
use crate::permissions::{check_permission, rewrite_filters};
use crate::resolver::resolve_parent_predicates;
use crate::subscribers::{
    AutomationDispatcher, FeatureRunner, LoggingFeatureRunner, ParentMtimeUpdater,
};
use crate::validation::{
    preserve_readonly, sanitize_and_check, searchable_values, uuid_references,
};

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Query input for `find`: a filter AST or a raw string.
///
/// Strings are parsed as a JSON filter list; when parsing fails the
/// whole string becomes a `:content ~=` match.
#[derive(Debug, Clone)]
pub enum FindQuery {
    Filters(NodeFilters),
    Raw(String),
}

impl From<NodeFilters> for FindQuery {
    fn from(filters: NodeFilters) -> Self {
        FindQuery::Filters(filters)
    }
}

impl From<&str> for FindQuery {
    fn from(raw: &str) -> Self {
        FindQuery::Raw(raw.to_string())
    }
}

impl From<String> for FindQuery {
    fn from(raw: String) -> Self {
        FindQuery::Raw(raw)
    }
}

/// One page of `find` results. `scores` is present only when semantic
/// search fired.
#[derive(Debug, Clone)]
pub struct FindResult {
    pub nodes: Vec<Node>,
    pub page_size: usize,
    pub page_count: usize,
    pub page_token: usize,
    pub scores: Option<HashMap<String, f32>>,
}

impl FindResult {
    fn empty(page_size: usize, page_token: usize) -> Self {
        Self {
            nodes: vec![],
            page_size,
            page_count: 0,
            page_token,
            scores: None,
        }
    }
}

/// Result of evaluating a smart folder.
#[derive(Debug, Clone)]
pub struct SmartFolderEvaluation {
    pub nodes: Vec<Node>,
    pub aggregations: Vec<AggregationResult>,
}

/// One step of an ancestry walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub uuid: String,
    pub title: String,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder wiring the node service and its default subscribers.
#[derive(Default)]
pub struct NodeServiceBuilder {
    repository: Option<Arc<dyn NodeRepository>>,
    storage: Option<Arc<dyn StorageProvider>>,
    configuration: Option<Arc<dyn ConfigurationRepository>>,
    bus: Option<Arc<EventBus>>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    vectors: Option<Arc<dyn VectorDatabase>>,
    ocr: Option<Arc<dyn OcrModel>>,
    runner: Option<Arc<dyn FeatureRunner>>,
    config: Option<NodeServiceConfig>,
    without_subscribers: bool,
}

impl NodeServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(mut self, repository: Arc<dyn NodeRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageProvider>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_configuration(mut self, configuration: Arc<dyn ConfigurationRepository>) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Enable the semantic plane. Both halves are required for it to
    /// activate.
    pub fn with_semantic_plane(
        mut self,
        embedder: Arc<dyn EmbeddingModel>,
        vectors: Arc<dyn VectorDatabase>,
    ) -> Self {
        self.embedder = Some(embedder);
        self.vectors = Some(vectors);
        self
    }

    /// Enable OCR-derived index text for file nodes.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrModel>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_feature_runner(mut self, runner: Arc<dyn FeatureRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_config(mut self, config: NodeServiceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Skip registering the default subscribers (tests that assert on
    /// raw event streams).
    pub fn without_default_subscribers(mut self) -> Self {
        self.without_subscribers = true;
        self
    }

    pub fn build(self) -> Arc<NodeService> {
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryNodeRepository::new()));
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorageProvider::new()));
        let configuration = self
            .configuration
            .unwrap_or_else(|| Arc::new(InMemoryConfigurationRepository::new()));
        let bus = self.bus.unwrap_or_else(|| Arc::new(EventBus::new()));
        let config = self.config.unwrap_or_default();

        let semantic = match (&self.embedder, &self.vectors) {
            (Some(embedder), Some(vectors)) => {
                SemanticPlane::new(Arc::clone(embedder), Arc::clone(vectors))
                    .with_top_k(config.semantic_top_k)
            }
            _ => SemanticPlane::inactive(),
        };

        if !self.without_subscribers {
            ParentMtimeUpdater::new(Arc::clone(&repository)).register(&bus);
            let runner = self
                .runner
                .unwrap_or_else(|| Arc::new(LoggingFeatureRunner));
            AutomationDispatcher::new(Arc::clone(&repository), runner).register(&bus);
            if let (Some(embedder), Some(vectors)) = (&self.embedder, &self.vectors) {
                let mut indexer = EmbeddingIndexer::new(
                    Arc::clone(embedder),
                    Arc::clone(vectors),
                    Arc::clone(&repository),
                );
                if let Some(ocr) = &self.ocr {
                    indexer = indexer.with_ocr(Arc::clone(ocr), Arc::clone(&storage));
                }
                indexer.register(&bus);
            }
        }

        Arc::new(NodeService {
            repository,
            storage,
            configuration,
            bus,
            semantic,
            config,
        })
    }
}

// =============================================================================
// SERVICE
// =============================================================================

/// The node service.
pub struct NodeService {
    repository: Arc<dyn NodeRepository>,
    storage: Arc<dyn StorageProvider>,
    configuration: Arc<dyn ConfigurationRepository>,
    bus: Arc<EventBus>,
    semantic: SemanticPlane,
    config: NodeServiceConfig,
}

impl NodeService {
    pub fn builder() -> NodeServiceBuilder {
        NodeServiceBuilder::new()
    }

    pub fn repository(&self) -> &Arc<dyn NodeRepository> {
        &self.repository
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    pub fn configuration(&self) -> &Arc<dyn ConfigurationRepository> {
        &self.configuration
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // =========================================================================
    // WRITE OPERATIONS
    // =========================================================================

    /// Create a node from caller metadata.
    #[instrument(skip_all, fields(tenant = %ctx.tenant))]
    pub async fn create(
        &self,
        ctx: &AuthenticationContext,
        metadata: NodeMetadata,
    ) -> Result<Node> {
        let node = self.prepare(ctx, metadata, 0).await?;
        self.persist_new(ctx, node).await
    }

    /// Create a file node: the binary is written first, then the
    /// record is appended. A failing append does not roll the binary
    /// back.
    #[instrument(skip_all, fields(tenant = %ctx.tenant))]
    pub async fn create_file(
        &self,
        ctx: &AuthenticationContext,
        file: FilePayload,
        mut metadata: NodeMetadata,
    ) -> Result<Node> {
        if metadata.title.is_none() {
            metadata.title = Some(file.name.clone());
        }
        let mimetype = metadata
            .mimetype
            .clone()
            .unwrap_or_else(|| file.mimetype.clone());
        if builtins::is_reserved_mimetype(&mimetype) && mimetype != mimetypes::FEATURE {
            return Err(Error::BadRequest(format!(
                "cannot create {} from a file",
                mimetype
            )));
        }
        metadata.mimetype = Some(mimetype);

        let node = self.prepare(ctx, metadata, file.size()).await?;
        self.storage
            .write(
                &node.uuid,
                &file.content,
                WriteOptions {
                    title: node.title.clone(),
                    parent: node.parent.clone(),
                    mimetype: file.mimetype.clone(),
                },
            )
            .await?;
        self.persist_new(ctx, node).await
    }

    /// Duplicate a node into another folder. Folders cannot be copied.
    pub async fn copy(
        &self,
        ctx: &AuthenticationContext,
        uuid: &str,
        new_parent: &str,
    ) -> Result<Node> {
        let source = self.resolve_node(uuid).await?;
        if source.is_folder() {
            return Err(Error::BadRequest("cannot copy a folder".to_string()));
        }
        if source.is_api_key() {
            return Err(Error::BadRequest("cannot copy an api key".to_string()));
        }
        self.check_access(ctx, &source, Permission::Read).await?;

        let mut metadata = NodeMetadata {
            title: Some(format!("{} 2", source.title)),
            description: source.description.clone(),
            mimetype: Some(source.mimetype.clone()),
            parent: Some(new_parent.to_string()),
            group: Some(source.group.clone()),
            tags: Some(source.tags.clone()),
            aspects: Some(source.aspects.clone()),
            properties: Some(source.properties.clone()),
            ..Default::default()
        };
        match &source.variant {
            NodeVariant::SmartFolder(spec) => {
                metadata.filters = Some(spec.filters.clone());
                metadata.aggregations = Some(spec.aggregations.clone());
            }
            NodeVariant::Aspect(spec) => {
                metadata.filters = Some(spec.filters.clone());
                metadata.aspect_properties = Some(spec.properties.clone());
            }
            NodeVariant::Feature(spec) => metadata.feature = Some(spec.clone()),
            NodeVariant::Agent(spec) => metadata.agent = Some(spec.clone()),
            _ => {}
        }

        if source.is_file_like() {
            let content = self.storage.read(&source.uuid).await?;
            let file_mimetype = if source.is_feature() {
                "application/javascript".to_string()
            } else {
                source.mimetype.clone()
            };
            let file = FilePayload::new(format!("{} 2", source.title), file_mimetype, content);
            self.create_file(ctx, file, metadata).await
        } else {
            self.create(ctx, metadata).await
        }
    }

    /// Copy into the source's own parent.
    pub async fn duplicate(&self, ctx: &AuthenticationContext, uuid: &str) -> Result<Node> {
        let source = self.resolve_node(uuid).await?;
        let parent = source.parent.clone();
        self.copy(ctx, &source.uuid, &parent).await
    }

    /// Update node metadata.
    #[instrument(skip_all, fields(tenant = %ctx.tenant, node_id = %uuid))]
    pub async fn update(
        &self,
        ctx: &AuthenticationContext,
        uuid: &str,
        metadata: NodeMetadata,
    ) -> Result<Node> {
        let existing = self.resolve_node(uuid).await?;
        if existing.is_builtin() {
            return Err(Error::BadRequest(format!(
                "cannot update built-in node: {}",
                existing.uuid
            )));
        }
        if existing.is_api_key() {
            return Err(Error::BadRequest("cannot update an api key".to_string()));
        }
        self.check_access(ctx, &existing, Permission::Write).await?;
        if let Some(mimetype) = &metadata.mimetype {
            if *mimetype != existing.mimetype {
                return Err(Error::BadRequest(
                    "cannot change the mimetype of a node".to_string(),
                ));
            }
        }

        let old = existing.clone();
        let mut node = existing;

        if let Some(title) = metadata.title {
            node.title = title;
        }
        if let Some(description) = metadata.description {
            node.description = Some(description);
        }
        if let Some(fid) = metadata.fid {
            node.fid = fid;
        }
        if let Some(owner) = metadata.owner {
            node.owner = owner;
        }
        if let Some(group) = metadata.group {
            node.group = group;
        }
        if let Some(tags) = metadata.tags {
            node.tags = tags;
        }
        if let Some(aspects) = metadata.aspects {
            node.aspects = aspects;
        }
        if let Some(properties) = metadata.properties {
            for (key, value) in properties {
                node.properties.insert(key, value);
            }
        }
        if let Some(parent) = metadata.parent {
            if parent != node.parent {
                let target = self.resolve_folder(&parent).await?;
                check_permission(&target, &ctx.principal, Permission::Write)?;
                node.parent = parent;
            }
        }

        match &mut node.variant {
            NodeVariant::Folder(spec) => {
                if let Some(permissions) = metadata.permissions {
                    spec.permissions = permissions;
                }
                if let Some(filters) = metadata.filters {
                    spec.filters = filters;
                }
            }
            NodeVariant::SmartFolder(spec) => {
                if let Some(filters) = metadata.filters {
                    spec.filters = filters;
                }
                if let Some(aggregations) = metadata.aggregations {
                    spec.aggregations = aggregations;
                }
            }
            NodeVariant::Aspect(spec) => {
                if let Some(filters) = metadata.filters {
                    spec.filters = filters;
                }
                if let Some(properties) = metadata.aspect_properties {
                    spec.properties = properties;
                }
            }
            NodeVariant::Feature(spec) => {
                if let Some(feature) = metadata.feature {
                    *spec = feature;
                }
            }
            NodeVariant::Agent(spec) => {
                if let Some(agent) = metadata.agent {
                    *spec = agent;
                }
            }
            NodeVariant::ApiKey { .. } | NodeVariant::Plain => {}
        }

        // Readonly properties keep their create-time value (or
        // absence), whatever the caller sent.
        let readonly_scope = self
            .known_aspect_definitions(old.aspects.iter().chain(node.aspects.iter()))
            .await;
        preserve_readonly(&readonly_scope, &old.properties, &mut node.properties);

        if let Some(spec) = node.feature_spec() {
            validate_feature_rules(spec)?;
        }
        self.validate_aspects(ctx, &mut node).await?;

        // Changing a folder's filters revalidates every child before
        // anything is persisted; a failure leaves the folder unchanged.
        if let NodeVariant::Folder(spec) = &node.variant {
            let changed = old.folder_spec().map(|s| &s.filters) != Some(&spec.filters);
            if changed && !spec.filters.is_empty() {
                self.assert_children_conform(&node.uuid, &spec.filters)
                    .await?;
            }
        }

        self.refresh_fulltext(&mut node).await;
        node.modified_time = Utc::now();

        let parent = self.resolve_folder(&node.parent).await?;
        assert_containment(&parent, &node)?;

        self.repository.update(node.clone()).await?;
        self.mirror_aspect(&node).await?;

        let diff = diff_nodes(&old, &node);
        self.bus.publish(&DomainEvent::node_updated(
            ctx.principal.email.clone(),
            ctx.tenant.clone(),
            diff,
        ));
        Ok(node.with_hidden_secret())
    }

    /// Replace a file node's binary. The new mimetype must match.
    pub async fn update_file(
        &self,
        ctx: &AuthenticationContext,
        uuid: &str,
        file: FilePayload,
    ) -> Result<Node> {
        let node = self.resolve_node(uuid).await?;
        if node.is_builtin() {
            return Err(Error::BadRequest(format!(
                "cannot update built-in node: {}",
                node.uuid
            )));
        }
        if !node.is_file_like() {
            return Err(Error::BadRequest(format!(
                "node has no binary content: {}",
                node.uuid
            )));
        }
        self.check_access(ctx, &node, Permission::Write).await?;

        let expected = if node.is_feature() {
            "application/javascript"
        } else {
            node.mimetype.as_str()
        };
        if file.mimetype != expected {
            return Err(Error::BadRequest(format!(
                "mimetype mismatch: expected {}, got {}",
                expected, file.mimetype
            )));
        }

        self.storage
            .write(
                &node.uuid,
                &file.content,
                WriteOptions {
                    title: node.title.clone(),
                    parent: node.parent.clone(),
                    mimetype: file.mimetype.clone(),
                },
            )
            .await?;

        let old = node.clone();
        let mut node = node;
        node.size = file.size();
        node.modified_time = Utc::now();
        self.repository.update(node.clone()).await?;

        let diff = diff_nodes(&old, &node);
        self.bus.publish(&DomainEvent::node_updated(
            ctx.principal.email.clone(),
            ctx.tenant.clone(),
            diff,
        ));
        Ok(node)
    }

    /// Delete a node. Folders cascade depth-first; every removed node
    /// emits its own NodeDeleted event. Built-ins cannot be deleted.
    #[instrument(skip_all, fields(tenant = %ctx.tenant, node_id = %uuid))]
    pub async fn delete(&self, ctx: &AuthenticationContext, uuid: &str) -> Result<()> {
        let node = self.resolve_node(uuid).await?;
        if node.is_builtin() {
            return Err(Error::BadRequest(format!(
                "cannot delete built-in node: {}",
                node.uuid
            )));
        }
        self.check_access(ctx, &node, Permission::Write).await?;

        // Expand the cascade breadth-first, then delete in reverse so
        // children always go before their folder.
        let mut cascade = vec![node];
        let mut index = 0;
        while index < cascade.len() {
            if cascade[index].is_folder() {
                let uuid = cascade[index].uuid.clone();
                let children = self.children_of(&uuid).await?;
                cascade.extend(children);
            }
            index += 1;
        }

        for node in cascade.iter().rev() {
            if node.is_file_like() {
                match self.storage.delete(&node.uuid).await {
                    Ok(()) => {}
                    Err(Error::NodeFileNotFound(_)) => {}
                    Err(error) => return Err(error),
                }
            }
            self.repository.delete(&node.uuid).await?;
            if node.is_aspect() {
                self.configuration.delete_aspect(&node.uuid).await?;
            }
            self.bus.publish(&DomainEvent::node_deleted(
                ctx.principal.email.clone(),
                ctx.tenant.clone(),
                node.clone(),
            ));
        }
        debug!(result_count = cascade.len(), "cascade delete finished");
        Ok(())
    }

    // =========================================================================
    // READ OPERATIONS
    // =========================================================================

    /// Fetch a node by uuid or by `--fid--<slug>` alias.
    pub async fn get(&self, ctx: &AuthenticationContext, uuid: &str) -> Result<Node> {
        let node = self.resolve_node(uuid).await?;
        self.check_access(ctx, &node, Permission::Read).await?;
        Ok(node.with_hidden_secret())
    }

    /// List the children of a folder (root by default). Smart folders
    /// evaluate their saved query instead.
    pub async fn list(
        &self,
        ctx: &AuthenticationContext,
        parent: Option<&str>,
    ) -> Result<Vec<Node>> {
        let parent_uuid = parent.unwrap_or(builtins::ROOT_FOLDER_UUID);
        let node = self.resolve_node(parent_uuid).await.map_err(|error| {
            if error.is_not_found() {
                Error::FolderNotFound(parent_uuid.to_string())
            } else {
                error
            }
        })?;

        if node.is_smart_folder() {
            return Ok(self.evaluate(ctx, &node.uuid).await?.nodes);
        }
        if !node.is_folder() {
            return Err(Error::FolderNotFound(parent_uuid.to_string()));
        }
        check_permission(&node, &ctx.principal, Permission::Read)?;

        let mut children = self.children_of(&node.uuid).await?;
        if node.uuid == builtins::ROOT_FOLDER_UUID {
            if let Some(system) = builtins::builtin_folder(builtins::SYSTEM_FOLDER_UUID) {
                children.push(system.clone());
            }
        }
        if node.uuid == builtins::SYSTEM_FOLDER_UUID {
            children.extend(builtins::system_subfolders().cloned());
        }

        children.sort_by(|a, b| {
            b.is_folder()
                .cmp(&a.is_folder())
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.uuid.cmp(&b.uuid))
        });
        Ok(children.into_iter().map(|n| n.with_hidden_secret()).collect())
    }

    /// Evaluate a filter query with permission rewriting, semantic
    /// extraction, and `@` resolution.
    #[instrument(skip_all, fields(tenant = %ctx.tenant))]
    pub async fn find(
        &self,
        ctx: &AuthenticationContext,
        query: impl Into<FindQuery>,
        page_size: usize,
        page_token: usize,
    ) -> Result<FindResult> {
        let filters = match query.into() {
            FindQuery::Filters(filters) => filters,
            FindQuery::Raw(raw) => match NodeFilters::from_json_str(&raw) {
                Ok(filters) => filters,
                Err(_) => NodeFilters::single(Filter::new(
                    CONTENT_FIELD,
                    FilterOperator::Semantic,
                    raw,
                )),
            },
        };

        let page_size = if page_size == 0 {
            self.config.page_size
        } else {
            page_size
        };

        let rewrite = rewrite_semantic(&self.semantic, filters).await?;
        let scores = rewrite.scores;

        let filters = rewrite_filters(&rewrite.filters, &ctx.principal, Permission::Read);
        let Some(filters) =
            resolve_parent_predicates(self.repository.as_ref(), filters).await?
        else {
            return Ok(FindResult::empty(page_size, page_token));
        };

        let result = self.repository.filter(&filters, page_size, page_token).await?;
        Ok(FindResult {
            nodes: result
                .nodes
                .into_iter()
                .map(|n| n.with_hidden_secret())
                .collect(),
            page_size: result.page_size,
            page_count: result.page_count,
            page_token: result.page_token,
            scores,
        })
    }

    /// Evaluate a smart folder: its saved filters plus aggregations.
    pub async fn evaluate(
        &self,
        ctx: &AuthenticationContext,
        uuid: &str,
    ) -> Result<SmartFolderEvaluation> {
        let node = self.resolve_node(uuid).await.map_err(|error| {
            if error.is_not_found() {
                Error::SmartFolderNotFound(uuid.to_string())
            } else {
                error
            }
        })?;
        let Some(spec) = node.smart_folder_spec().cloned() else {
            return Err(Error::SmartFolderNotFound(uuid.to_string()));
        };
        self.check_access(ctx, &node, Permission::Read).await?;

        let rewrite = rewrite_semantic(&self.semantic, spec.filters.clone()).await?;
        let filters = rewrite_filters(&rewrite.filters, &ctx.principal, Permission::Read);
        let Some(filters) =
            resolve_parent_predicates(self.repository.as_ref(), filters).await?
        else {
            return Ok(SmartFolderEvaluation {
                nodes: vec![],
                aggregations: compute_aggregations(&[], &spec.aggregations)?,
            });
        };

        let nodes = self.scan(&filters).await?;
        let aggregations = compute_aggregations(&nodes, &spec.aggregations)?;
        Ok(SmartFolderEvaluation {
            nodes: nodes.into_iter().map(|n| n.with_hidden_secret()).collect(),
            aggregations,
        })
    }

    /// Walk the parent chain upward. Root is always the first crumb.
    pub async fn breadcrumbs(
        &self,
        ctx: &AuthenticationContext,
        uuid: &str,
    ) -> Result<Vec<Breadcrumb>> {
        let node = self.get(ctx, uuid).await?;
        let mut crumbs = vec![Breadcrumb {
            uuid: node.uuid.clone(),
            title: node.title.clone(),
        }];

        let mut current = node;
        let mut visited = std::collections::HashSet::new();
        while current.uuid != builtins::ROOT_FOLDER_UUID {
            if !visited.insert(current.uuid.clone()) {
                break;
            }
            let parent = self.resolve_node(&current.parent).await?;
            crumbs.push(Breadcrumb {
                uuid: parent.uuid.clone(),
                title: parent.title.clone(),
            });
            current = parent;
        }
        crumbs.reverse();
        Ok(crumbs)
    }

    /// Export a node as a file. Reserved mimetypes are remapped on the
    /// way out.
    pub async fn export(&self, ctx: &AuthenticationContext, uuid: &str) -> Result<ExportedFile> {
        let node = self.resolve_node(uuid).await?;
        if node.is_folder() {
            return Err(Error::BadRequest("cannot export a folder".to_string()));
        }
        if node.is_api_key() {
            return Err(Error::BadRequest("cannot export an api key".to_string()));
        }
        let parent = self.resolve_folder(&node.parent).await?;
        check_permission(&parent, &ctx.principal, Permission::Export)?;

        let (mimetype, content) = match &node.variant {
            NodeVariant::Feature(_) => (
                "application/javascript".to_string(),
                self.storage.read(&node.uuid).await?,
            ),
            NodeVariant::SmartFolder(spec) => {
                ("application/json".to_string(), serde_json::to_vec_pretty(spec)?)
            }
            NodeVariant::Aspect(_) => {
                let definition = node.to_aspect_definition().ok_or_else(|| {
                    Error::Unknown(format!("aspect node without schema: {}", node.uuid))
                })?;
                (
                    "application/json".to_string(),
                    serde_json::to_vec_pretty(&definition)?,
                )
            }
            NodeVariant::Agent(spec) => {
                ("application/json".to_string(), serde_json::to_vec_pretty(spec)?)
            }
            _ if node.is_file_like() => {
                (node.mimetype.clone(), self.storage.read(&node.uuid).await?)
            }
            _ => return Err(Error::NodeFileNotFound(node.uuid.clone())),
        };

        Ok(ExportedFile {
            name: node.title,
            mimetype,
            content,
        })
    }

    /// Clone an api-key node with its secret disclosed. Admin only;
    /// this is the single disclosure path.
    pub async fn api_key_with_secret(
        &self,
        ctx: &AuthenticationContext,
        uuid: &str,
    ) -> Result<Node> {
        if !ctx.principal.is_admin() {
            return Err(Error::Forbidden(
                "api key secrets are admin-only".to_string(),
            ));
        }
        let node = self.resolve_node(uuid).await.map_err(|error| {
            if error.is_not_found() {
                Error::ApiKeyNotFound(uuid.to_string())
            } else {
                error
            }
        })?;
        if !node.is_api_key() {
            return Err(Error::ApiKeyNotFound(uuid.to_string()));
        }
        Ok(node)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Resolve a node by built-in uuid, fid alias, or repository uuid.
    async fn resolve_node(&self, key: &str) -> Result<Node> {
        if let Some(folder) = builtins::builtin_folder(key) {
            return Ok(folder.clone());
        }
        if let Some(fid) = fid_from_alias(key) {
            return self.repository.get_by_fid(fid).await;
        }
        self.repository.get_by_id(key).await
    }

    /// Resolve and require a folder.
    async fn resolve_folder(&self, uuid: &str) -> Result<Node> {
        let node = self.resolve_node(uuid).await.map_err(|error| {
            if error.is_not_found() {
                Error::FolderNotFound(uuid.to_string())
            } else {
                error
            }
        })?;
        if !node.is_folder() {
            return Err(Error::FolderNotFound(uuid.to_string()));
        }
        Ok(node)
    }

    /// Permission check against the folder itself, or the parent
    /// folder for non-folder nodes.
    async fn check_access(
        &self,
        ctx: &AuthenticationContext,
        node: &Node,
        permission: Permission,
    ) -> Result<()> {
        if node.is_folder() {
            return check_permission(node, &ctx.principal, permission);
        }
        let parent = self.resolve_folder(&node.parent).await?;
        check_permission(&parent, &ctx.principal, permission)
    }

    /// Factory-build and fully validate a node; nothing is persisted.
    async fn prepare(
        &self,
        ctx: &AuthenticationContext,
        metadata: NodeMetadata,
        size: u64,
    ) -> Result<Node> {
        let title = metadata
            .title
            .ok_or_else(|| Error::BadRequest("title is required".to_string()))?;
        let parent_uuid = metadata
            .parent
            .ok_or_else(|| Error::BadRequest("parent is required".to_string()))?;
        let parent = self.resolve_folder(&parent_uuid).await?;
        check_permission(&parent, &ctx.principal, Permission::Write)?;

        if let Some(uuid) = &metadata.uuid {
            if is_builtin_uuid(uuid) {
                return Err(Error::BadRequest(format!("reserved uuid: {}", uuid)));
            }
        }
        let uuid = metadata.uuid.unwrap_or_else(antbox_core::new_node_uuid);
        let mimetype = metadata
            .mimetype
            .unwrap_or_else(|| mimetypes::META_NODE.to_string());

        if mimetype == mimetypes::API_KEY && parent.uuid != builtins::API_KEYS_FOLDER_UUID {
            return Err(Error::BadRequest(
                "api keys live in the api-keys system folder".to_string(),
            ));
        }

        // Only a generated fid gets disambiguated; a caller-supplied
        // fid that collides surfaces the repository's BadRequest.
        let fid = match metadata.fid {
            Some(fid) => fid,
            None => {
                let mut fid = slugify(&title);
                if self.repository.get_by_fid(&fid).await.is_ok() {
                    fid = fid_with_suffix(&fid);
                }
                fid
            }
        };

        let variant = match mimetype.as_str() {
            mimetypes::FOLDER => NodeVariant::Folder(FolderSpec {
                // New folders inherit the parent's buckets when none
                // are supplied.
                permissions: metadata
                    .permissions
                    .or_else(|| parent.folder_spec().map(|s| s.permissions.clone()))
                    .unwrap_or_default(),
                filters: metadata.filters.unwrap_or_default(),
            }),
            mimetypes::SMART_FOLDER => NodeVariant::SmartFolder(SmartFolderSpec {
                filters: metadata.filters.unwrap_or_default(),
                aggregations: metadata.aggregations.unwrap_or_default(),
            }),
            mimetypes::ASPECT => NodeVariant::Aspect(antbox_core::AspectSpec {
                filters: metadata.filters.unwrap_or_default(),
                properties: metadata.aspect_properties.unwrap_or_default(),
            }),
            mimetypes::FEATURE => NodeVariant::Feature(metadata.feature.unwrap_or_default()),
            mimetypes::AGENT => NodeVariant::Agent(metadata.agent.unwrap_or_default()),
            mimetypes::API_KEY => NodeVariant::ApiKey {
                secret: metadata.secret.unwrap_or_else(new_api_key_secret),
            },
            _ => NodeVariant::Plain,
        };

        let now = Utc::now();
        let mut node = Node {
            uuid,
            fid,
            title,
            description: metadata.description,
            mimetype,
            parent: parent.uuid.clone(),
            owner: metadata.owner.unwrap_or_else(|| ctx.principal.email.clone()),
            group: metadata
                .group
                .or_else(|| ctx.principal.primary_group().map(ToString::to_string))
                .unwrap_or_else(|| parent.group.clone()),
            created_time: now,
            modified_time: now,
            size,
            tags: metadata.tags.unwrap_or_default(),
            aspects: metadata.aspects.unwrap_or_default(),
            properties: metadata.properties.unwrap_or_default(),
            fulltext: String::new(),
            variant,
        };

        if let Some(spec) = node.feature_spec() {
            validate_feature_rules(spec)?;
        }
        self.validate_aspects(ctx, &mut node).await?;
        self.refresh_fulltext(&mut node).await;
        assert_containment(&parent, &node)?;
        Ok(node)
    }

    /// Append to the repository, mirror aspect schemas, publish.
    async fn persist_new(&self, ctx: &AuthenticationContext, node: Node) -> Result<Node> {
        self.repository.add(node.clone()).await?;
        self.mirror_aspect(&node).await?;
        self.bus.publish(&DomainEvent::node_created(
            ctx.principal.email.clone(),
            ctx.tenant.clone(),
            node.clone(),
        ));
        Ok(node.with_hidden_secret())
    }

    /// Keep the configuration repository's aspect collection in sync
    /// with aspect nodes.
    async fn mirror_aspect(&self, node: &Node) -> Result<()> {
        if let Some(definition) = node.to_aspect_definition() {
            self.configuration.save_aspect(definition).await?;
        }
        Ok(())
    }

    /// Resolve declared aspect uuids, failing with a `Validation`
    /// error that enumerates every missing one.
    async fn resolve_aspect_definitions(
        &self,
        aspects: &[String],
    ) -> Result<Vec<AspectDefinition>> {
        let mut definitions = Vec::new();
        let mut missing = Vec::new();
        for uuid in aspects {
            match self.configuration.get_aspect(uuid).await? {
                Some(definition) => definitions.push(definition),
                None => missing.push(PropertyError::new(uuid, "aspect not found")),
            }
        }
        if !missing.is_empty() {
            return Err(Error::Validation(missing));
        }
        Ok(definitions)
    }

    /// Definitions for whichever of `aspects` exist; missing ones are
    /// skipped (used for readonly scoping, not validation).
    async fn known_aspect_definitions<'a>(
        &self,
        aspects: impl Iterator<Item = &'a String>,
    ) -> Vec<AspectDefinition> {
        let mut seen = std::collections::HashSet::new();
        let mut definitions = Vec::new();
        for uuid in aspects {
            if !seen.insert(uuid.clone()) {
                continue;
            }
            if let Ok(Some(definition)) = self.configuration.get_aspect(uuid).await {
                definitions.push(definition);
            }
        }
        definitions
    }

    /// Steps 1–5 of aspect validation: resolve, sanitize, type-check,
    /// and resolve uuid references subject to the caller's
    /// permissions. Errors aggregate into one `Validation`.
    async fn validate_aspects(
        &self,
        ctx: &AuthenticationContext,
        node: &mut Node,
    ) -> Result<()> {
        if node.aspects.is_empty() {
            // Property keys exist only under declared aspects.
            node.properties.clear();
            return Ok(());
        }
        let definitions = self.resolve_aspect_definitions(&node.aspects).await?;

        let sanitized = sanitize_and_check(&definitions, &node.properties);
        node.properties = sanitized.properties;
        let mut errors = sanitized.errors;

        for definition in &definitions {
            if !definition.filters.is_empty() && !definition.filters.matches(node) {
                errors.push(PropertyError::new(
                    &definition.uuid,
                    "node does not satisfy the aspect filters",
                ));
            }
        }

        for reference in uuid_references(&definitions, &node.properties) {
            for uuid in &reference.uuids {
                match self.get(ctx, uuid).await {
                    Ok(referenced) => {
                        if !reference.validation_filters.is_empty()
                            && !reference.validation_filters.matches(&referenced)
                        {
                            errors.push(PropertyError::new(
                                &reference.property_key,
                                format!("{} does not satisfy the validation filters", uuid),
                            ));
                        }
                    }
                    Err(_) => errors.push(PropertyError::new(
                        &reference.property_key,
                        format!("referenced node not found: {}", uuid),
                    )),
                }
            }
        }

        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }
        Ok(())
    }

    /// Recompute the derived fulltext from title, description, tags,
    /// and searchable aspect values.
    async fn refresh_fulltext(&self, node: &mut Node) {
        let definitions = self.known_aspect_definitions(node.aspects.iter()).await;
        let values = searchable_values(&definitions, &node.properties);
        node.fulltext = derive_fulltext(
            &node.title,
            node.description.as_deref(),
            &node.tags,
            values.iter().map(String::as_str),
        );
    }

    /// Every stored child of a folder, across all pages.
    async fn children_of(&self, uuid: &str) -> Result<Vec<Node>> {
        let filters = NodeFilters::single(Filter::new("parent", FilterOperator::Equal, uuid));
        self.scan(&filters).await
    }

    async fn scan(&self, filters: &NodeFilters) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        let mut page_token = 1;
        loop {
            let page = self
                .repository
                .filter(filters, SCAN_PAGE_SIZE, page_token)
                .await?;
            nodes.extend(page.nodes);
            if page_token >= page.page_count {
                break;
            }
            page_token += 1;
        }
        Ok(nodes)
    }

    async fn assert_children_conform(&self, uuid: &str, filters: &NodeFilters) -> Result<()> {
        for child in self.children_of(uuid).await? {
            if !filters.matches(&child) {
                return Err(Error::BadRequest(format!(
                    "child {} does not satisfy the folder filters",
                    child.uuid
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// FREE HELPERS
// =============================================================================

/// Invariant: every child of a folder satisfies the folder's filters.
fn assert_containment(parent: &Node, node: &Node) -> Result<()> {
    let Some(spec) = parent.folder_spec() else {
        return Err(Error::FolderNotFound(parent.uuid.clone()));
    };
    if !spec.filters.is_empty() && !spec.filters.matches(node) {
        return Err(Error::BadRequest(format!(
            "node does not satisfy the filters of folder {}",
            parent.uuid
        )));
    }
    Ok(())
}

/// Structural rules for features:
/// action features take a `uuids: array<string>` parameter and no
/// file parameters; file parameters belong to pure extensions.
fn validate_feature_rules(spec: &FeatureSpec) -> Result<()> {
    let has_file_parameter = spec.parameters.iter().any(|p| {
        p.parameter_type == ParameterType::File || p.array_type == Some(ParameterType::File)
    });

    if spec.expose_action {
        let uuids_ok = spec.parameters.iter().any(|p| {
            p.name == "uuids"
                && p.parameter_type == ParameterType::Array
                && p.array_type == Some(ParameterType::String)
        });
        if !uuids_ok {
            return Err(Error::BadRequest(
                "action features require a uuids parameter of type array<string>".to_string(),
            ));
        }
        if has_file_parameter {
            return Err(Error::BadRequest(
                "action features cannot take file parameters".to_string(),
            ));
        }
    }

    if has_file_parameter && !(spec.expose_extension && !spec.expose_action && !spec.expose_ai_tool)
    {
        return Err(Error::BadRequest(
            "file parameters require the feature to be exposed as an extension only".to_string(),
        ));
    }
    Ok(())
}

/// Top-level old/new values of the fields an update touched.
fn diff_nodes(old: &Node, new: &Node) -> UpdateDiff {
    let old_value = serde_json::to_value(old).unwrap_or(JsonValue::Null);
    let new_value = serde_json::to_value(new).unwrap_or(JsonValue::Null);
    let empty = serde_json::Map::new();
    let old_map = old_value.as_object().unwrap_or(&empty);
    let new_map = new_value.as_object().unwrap_or(&empty);

    let mut old_values = BTreeMap::new();
    let mut new_values = BTreeMap::new();
    let keys: std::collections::BTreeSet<&String> =
        old_map.keys().chain(new_map.keys()).collect();
    for key in keys {
        let before = old_map.get(key.as_str()).cloned().unwrap_or(JsonValue::Null);
        let after = new_map.get(key.as_str()).cloned().unwrap_or(JsonValue::Null);
        if before != after {
            old_values.insert(key.clone(), before);
            new_values.insert(key.clone(), after);
        }
    }

    UpdateDiff {
        uuid: new.uuid.clone(),
        old_values,
        new_values,
    }
}

/// Compute smart-folder aggregations over an evaluated node set.
fn compute_aggregations(
    nodes: &[Node],
    aggregations: &[antbox_core::Aggregation],
) -> Result<Vec<AggregationResult>> {
    let mut results = Vec::new();
    for aggregation in aggregations {
        let value = match aggregation.formula {
            AggregationFormula::Count => JsonValue::from(nodes.len()),
            formula => {
                let mut values = Vec::new();
                for node in nodes {
                    let Some(raw) = antbox_core::filters::field_value(node, &aggregation.field)
                    else {
                        continue;
                    };
                    let Some(number) = raw.as_f64() else {
                        return Err(Error::AggregationFormula(format!(
                            "field {} is not numeric on node {}",
                            aggregation.field, node.uuid
                        )));
                    };
                    values.push(number);
                }
                aggregate(formula, &mut values)
            }
        };
        results.push(AggregationResult {
            title: aggregation.title.clone(),
            value,
        });
    }
    Ok(results)
}

fn aggregate(formula: AggregationFormula, values: &mut Vec<f64>) -> JsonValue {
    if values.is_empty() {
        return match formula {
            AggregationFormula::Sum => JsonValue::from(0.0),
            _ => JsonValue::Null,
        };
    }
    match formula {
        AggregationFormula::Count => JsonValue::from(values.len()),
        AggregationFormula::Sum => JsonValue::from(values.iter().sum::<f64>()),
        AggregationFormula::Avg => {
            JsonValue::from(values.iter().sum::<f64>() / values.len() as f64)
        }
        AggregationFormula::Min => JsonValue::from(values.iter().cloned().fold(f64::MAX, f64::min)),
        AggregationFormula::Max => JsonValue::from(values.iter().cloned().fold(f64::MIN, f64::max)),
        AggregationFormula::Med => {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let middle = values.len() / 2;
            if values.len() % 2 == 0 {
                JsonValue::from((values[middle - 1] + values[middle]) / 2.0)
            } else {
                JsonValue::from(values[middle])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antbox_core::FeatureParameter;

    fn action_feature(parameters: Vec<FeatureParameter>) -> FeatureSpec {
        FeatureSpec {
            expose_action: true,
            parameters,
            ..Default::default()
        }
    }

    #[test]
    fn test_action_feature_requires_uuids_parameter() {
        let err = validate_feature_rules(&action_feature(vec![])).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let valid = action_feature(vec![FeatureParameter::new(
            "uuids",
            ParameterType::Array,
        )
        .with_array_type(ParameterType::String)]);
        assert!(validate_feature_rules(&valid).is_ok());
    }

    #[test]
    fn test_action_feature_rejects_file_parameters() {
        let spec = action_feature(vec![
            FeatureParameter::new("uuids", ParameterType::Array)
                .with_array_type(ParameterType::String),
            FeatureParameter::new("attachment", ParameterType::File),
        ]);
        let err = validate_feature_rules(&spec).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn test_file_parameters_require_pure_extension() {
        let spec = FeatureSpec {
            expose_extension: true,
            parameters: vec![FeatureParameter::new("upload", ParameterType::File)],
            ..Default::default()
        };
        assert!(validate_feature_rules(&spec).is_ok());

        let mixed = FeatureSpec {
            expose_extension: true,
            expose_ai_tool: true,
            parameters: vec![FeatureParameter::new("upload", ParameterType::File)],
            ..Default::default()
        };
        assert!(validate_feature_rules(&mixed).is_err());
    }

    #[test]
    fn test_aggregate_formulas() {
        let mut values = vec![3.0, 1.0, 2.0];
        assert_eq!(aggregate(AggregationFormula::Sum, &mut values.clone()), 6.0);
        assert_eq!(aggregate(AggregationFormula::Avg, &mut values.clone()), 2.0);
        assert_eq!(aggregate(AggregationFormula::Min, &mut values.clone()), 1.0);
        assert_eq!(aggregate(AggregationFormula::Max, &mut values.clone()), 3.0);
        assert_eq!(aggregate(AggregationFormula::Med, &mut values), 2.0);

        let mut even = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(aggregate(AggregationFormula::Med, &mut even), 2.5);
    }

    #[test]
    fn test_aggregate_empty_set() {
        assert_eq!(aggregate(AggregationFormula::Sum, &mut vec![]), 0.0);
        assert_eq!(aggregate(AggregationFormula::Avg, &mut vec![]), JsonValue::Null);
    }
}
