//! In-memory configuration repository.
//!
//! Typed collections for aspect schemas, identity (groups/users), and
//! workflow state. Built-in aspects, groups, and users are merged into
//! list results; saving or deleting a reserved identifier fails with
//! `BadRequest`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use antbox_core::builtins::{builtin_groups, builtin_users};
use antbox_core::uuid_utils::is_builtin_uuid;
use antbox_core::{
    AspectDefinition, ConfigurationRepository, Error, Group, Result, UserRecord,
    WorkflowDefinition, WorkflowInstance,
};

fn reject_reserved(uuid: &str) -> Result<()> {
    if is_builtin_uuid(uuid) {
        return Err(Error::BadRequest(format!("reserved identifier: {}", uuid)));
    }
    Ok(())
}

#[derive(Default)]
struct Collections {
    aspects: BTreeMap<String, AspectDefinition>,
    groups: BTreeMap<String, Group>,
    users: BTreeMap<String, UserRecord>,
    workflow_definitions: BTreeMap<String, WorkflowDefinition>,
    workflow_instances: BTreeMap<String, WorkflowInstance>,
}

/// In-memory [`ConfigurationRepository`] implementation.
pub struct InMemoryConfigurationRepository {
    collections: RwLock<Collections>,
    builtin_aspects: Vec<AspectDefinition>,
}

impl Default for InMemoryConfigurationRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConfigurationRepository {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(Collections::default()),
            builtin_aspects: vec![],
        }
    }

    /// Seed built-in aspect schemas merged into every listing.
    pub fn with_builtin_aspects(mut self, aspects: Vec<AspectDefinition>) -> Self {
        self.builtin_aspects = aspects;
        self
    }
}

#[async_trait]
impl ConfigurationRepository for InMemoryConfigurationRepository {
    async fn save_aspect(&self, aspect: AspectDefinition) -> Result<()> {
        reject_reserved(&aspect.uuid)?;
        let mut collections = self.collections.write().await;
        collections.aspects.insert(aspect.uuid.clone(), aspect);
        Ok(())
    }

    async fn get_aspect(&self, uuid: &str) -> Result<Option<AspectDefinition>> {
        if let Some(builtin) = self.builtin_aspects.iter().find(|a| a.uuid == uuid) {
            return Ok(Some(builtin.clone()));
        }
        let collections = self.collections.read().await;
        Ok(collections.aspects.get(uuid).cloned())
    }

    async fn list_aspects(&self) -> Result<Vec<AspectDefinition>> {
        let collections = self.collections.read().await;
        let mut aspects: Vec<_> = self
            .builtin_aspects
            .iter()
            .cloned()
            .chain(collections.aspects.values().cloned())
            .collect();
        aspects.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.uuid.cmp(&b.uuid)));
        Ok(aspects)
    }

    async fn delete_aspect(&self, uuid: &str) -> Result<()> {
        reject_reserved(uuid)?;
        let mut collections = self.collections.write().await;
        collections.aspects.remove(uuid);
        Ok(())
    }

    async fn save_group(&self, group: Group) -> Result<()> {
        reject_reserved(&group.uuid)?;
        let mut collections = self.collections.write().await;
        collections.groups.insert(group.uuid.clone(), group);
        Ok(())
    }

    async fn get_group(&self, uuid: &str) -> Result<Option<Group>> {
        if let Some(builtin) = builtin_groups().into_iter().find(|g| g.uuid == uuid) {
            return Ok(Some(builtin));
        }
        let collections = self.collections.read().await;
        Ok(collections.groups.get(uuid).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let collections = self.collections.read().await;
        let mut groups: Vec<_> = builtin_groups()
            .into_iter()
            .chain(collections.groups.values().cloned())
            .collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.uuid.cmp(&b.uuid)));
        Ok(groups)
    }

    async fn delete_group(&self, uuid: &str) -> Result<()> {
        reject_reserved(uuid)?;
        let mut collections = self.collections.write().await;
        collections.groups.remove(uuid);
        Ok(())
    }

    async fn save_user(&self, user: UserRecord) -> Result<()> {
        if builtin_users().iter().any(|u| u.email == user.email) {
            return Err(Error::BadRequest(format!(
                "reserved identifier: {}",
                user.email
            )));
        }
        let mut collections = self.collections.write().await;
        collections.users.insert(user.email.clone(), user);
        Ok(())
    }

    async fn get_user(&self, email: &str) -> Result<Option<UserRecord>> {
        if let Some(builtin) = builtin_users().into_iter().find(|u| u.email == email) {
            return Ok(Some(builtin));
        }
        let collections = self.collections.read().await;
        Ok(collections.users.get(email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let collections = self.collections.read().await;
        let mut users: Vec<_> = builtin_users()
            .into_iter()
            .chain(collections.users.values().cloned())
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        Ok(users)
    }

    async fn delete_user(&self, email: &str) -> Result<()> {
        if builtin_users().iter().any(|u| u.email == email) {
            return Err(Error::BadRequest(format!("reserved identifier: {}", email)));
        }
        let mut collections = self.collections.write().await;
        collections.users.remove(email);
        Ok(())
    }

    async fn save_workflow_definition(&self, definition: WorkflowDefinition) -> Result<()> {
        reject_reserved(&definition.uuid)?;
        let mut collections = self.collections.write().await;
        collections
            .workflow_definitions
            .insert(definition.uuid.clone(), definition);
        Ok(())
    }

    async fn get_workflow_definition(&self, uuid: &str) -> Result<Option<WorkflowDefinition>> {
        let collections = self.collections.read().await;
        Ok(collections.workflow_definitions.get(uuid).cloned())
    }

    async fn list_workflow_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        let collections = self.collections.read().await;
        Ok(collections.workflow_definitions.values().cloned().collect())
    }

    async fn delete_workflow_definition(&self, uuid: &str) -> Result<()> {
        reject_reserved(uuid)?;
        let mut collections = self.collections.write().await;
        collections.workflow_definitions.remove(uuid);
        Ok(())
    }

    async fn save_workflow_instance(&self, instance: WorkflowInstance) -> Result<()> {
        reject_reserved(&instance.uuid)?;
        let mut collections = self.collections.write().await;
        collections
            .workflow_instances
            .insert(instance.uuid.clone(), instance);
        Ok(())
    }

    async fn get_workflow_instance(&self, uuid: &str) -> Result<Option<WorkflowInstance>> {
        let collections = self.collections.read().await;
        Ok(collections.workflow_instances.get(uuid).cloned())
    }

    async fn list_workflow_instances(&self) -> Result<Vec<WorkflowInstance>> {
        let collections = self.collections.read().await;
        Ok(collections.workflow_instances.values().cloned().collect())
    }

    async fn delete_workflow_instance(&self, uuid: &str) -> Result<()> {
        reject_reserved(uuid)?;
        let mut collections = self.collections.write().await;
        collections.workflow_instances.remove(uuid);
        Ok(())
    }
}
