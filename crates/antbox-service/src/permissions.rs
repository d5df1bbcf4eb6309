//! Permission resolver.
//!
//! Point decisions (`check_permission`) answer "may this principal do
//! this on this folder". Filter rewriting (`rewrite_filters`) turns a
//! caller-supplied query into a disjunction-of-conjunctions the
//! repository can execute without per-row callbacks: each user
//! conjunction expands into one conjunction per permission path, with
//! parent (`@`) predicates standing in for non-folder targets.

use serde_json::{json, Value as JsonValue};

use antbox_core::builtins::mimetypes;
use antbox_core::{Error, Filter, FilterGroup, FilterOperator, Node, NodeFilters, Permission, Result};

use crate::context::Principal;

/// Decide `permission` for `principal` on `folder`.
///
/// Anonymous callers are `Unauthorized`, authenticated callers are
/// `Forbidden`.
pub fn check_permission(folder: &Node, principal: &Principal, permission: Permission) -> Result<()> {
    let Some(spec) = folder.folder_spec() else {
        return Err(Error::FolderNotFound(folder.uuid.clone()));
    };

    if principal.is_admin() {
        return Ok(());
    }
    if spec.permissions.anonymous.contains(&permission) {
        return Ok(());
    }
    if principal.is_anonymous() {
        return Err(Error::Unauthorized(format!(
            "{} on folder {}",
            permission, folder.uuid
        )));
    }
    if principal.email == folder.owner {
        return Ok(());
    }
    if spec.permissions.authenticated.contains(&permission) {
        return Ok(());
    }
    if principal.groups.iter().any(|g| *g == folder.group)
        && spec.permissions.group.contains(&permission)
    {
        return Ok(());
    }
    for (group, capabilities) in &spec.permissions.advanced {
        if principal.groups.iter().any(|g| g == group) && capabilities.contains(&permission) {
            return Ok(());
        }
    }
    Err(Error::Forbidden(format!(
        "{} on folder {}",
        permission, folder.uuid
    )))
}

fn capability_value(permission: Permission) -> JsonValue {
    json!(permission.to_string())
}

/// One permission path, as extra predicates for a conjunction.
///
/// `target_prefix` is empty for folder targets and `"@"` for
/// non-folder targets, where the predicate applies to the parent.
fn permission_paths(principal: &Principal, permission: Permission, prefix: &str) -> Vec<Vec<Filter>> {
    let cap = capability_value(permission);
    let field = |name: &str| format!("{}{}", prefix, name);

    let mut paths = vec![vec![Filter::new(
        field("permissions.anonymous"),
        FilterOperator::Contains,
        cap.clone(),
    )]];

    if principal.is_anonymous() {
        return paths;
    }

    paths.push(vec![Filter::new(
        field("owner"),
        FilterOperator::Equal,
        json!(principal.email),
    )]);
    paths.push(vec![Filter::new(
        field("permissions.authenticated"),
        FilterOperator::Contains,
        cap.clone(),
    )]);
    if !principal.groups.is_empty() {
        paths.push(vec![
            Filter::new(field("group"), FilterOperator::In, json!(principal.groups)),
            Filter::new(field("permissions.group"), FilterOperator::Contains, cap.clone()),
        ]);
        for group in &principal.groups {
            paths.push(vec![Filter::new(
                field(&format!("permissions.advanced.{}", group)),
                FilterOperator::Contains,
                cap.clone(),
            )]);
        }
    }
    paths
}

/// Rewrite a caller-supplied filter into a permission-aware
/// disjunction of conjunctions. Admin filters pass through unchanged.
pub fn rewrite_filters(
    filters: &NodeFilters,
    principal: &Principal,
    permission: Permission,
) -> NodeFilters {
    if principal.is_admin() {
        return filters.clone();
    }

    let base: Vec<FilterGroup> = if filters.groups.is_empty() {
        vec![FilterGroup::default()]
    } else {
        filters.groups.clone()
    };

    let mut rewritten = Vec::new();
    for conjunction in &base {
        // Folder targets carry the predicates directly.
        for path in permission_paths(principal, permission, "") {
            let mut group = conjunction.clone();
            group.push(Filter::new(
                "mimetype",
                FilterOperator::Equal,
                mimetypes::FOLDER,
            ));
            group.0.extend(path);
            rewritten.push(group);
        }
        // Non-folder targets are gated by their parent folder.
        for path in permission_paths(principal, permission, "@") {
            let mut group = conjunction.clone();
            group.push(Filter::new(
                "mimetype",
                FilterOperator::NotEqual,
                mimetypes::FOLDER,
            ));
            group.0.extend(path);
            rewritten.push(group);
        }
    }
    NodeFilters { groups: rewritten }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antbox_core::builtins::{ADMINS_GROUP_UUID, ROOT_FOLDER_UUID, ROOT_USER_EMAIL};
    use antbox_core::{FolderPermissions, FolderSpec, NodeVariant};
    use chrono::Utc;

    fn folder(permissions: FolderPermissions, owner: &str, group: &str) -> Node {
        Node {
            uuid: "f1".to_string(),
            fid: "f1".to_string(),
            title: "Folder".to_string(),
            description: None,
            mimetype: mimetypes::FOLDER.to_string(),
            parent: ROOT_FOLDER_UUID.to_string(),
            owner: owner.to_string(),
            group: group.to_string(),
            created_time: Utc::now(),
            modified_time: Utc::now(),
            size: 0,
            tags: vec![],
            aspects: vec![],
            properties: Default::default(),
            fulltext: String::new(),
            variant: NodeVariant::Folder(FolderSpec {
                permissions,
                filters: NodeFilters::default(),
            }),
        }
    }

    fn user(email: &str, groups: &[&str]) -> Principal {
        Principal::new(email, groups.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn test_admin_always_allowed() {
        let f = folder(FolderPermissions::restricted(), "owner@x.com", "g1");
        let root = user(ROOT_USER_EMAIL, &[]);
        assert!(check_permission(&f, &root, Permission::Write).is_ok());

        let admin = user("ops@x.com", &[ADMINS_GROUP_UUID]);
        assert!(check_permission(&f, &admin, Permission::Export).is_ok());
    }

    #[test]
    fn test_anonymous_bucket_allows_anyone() {
        let mut permissions = FolderPermissions::restricted();
        permissions.anonymous.push(Permission::Read);
        let f = folder(permissions, "owner@x.com", "g1");

        let anon = user("anonymous@antbox.io", &["--anonymous--"]);
        assert!(check_permission(&f, &anon, Permission::Read).is_ok());
    }

    #[test]
    fn test_anonymous_denied_is_unauthorized() {
        let f = folder(FolderPermissions::restricted(), "owner@x.com", "g1");
        let anon = user("anonymous@antbox.io", &["--anonymous--"]);
        let err = check_permission(&f, &anon, Permission::Read).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_owner_allowed() {
        let f = folder(FolderPermissions::restricted(), "owner@x.com", "g1");
        let owner = user("owner@x.com", &["g9"]);
        assert!(check_permission(&f, &owner, Permission::Write).is_ok());
    }

    #[test]
    fn test_authenticated_bucket() {
        let mut permissions = FolderPermissions::restricted();
        permissions.authenticated.push(Permission::Read);
        let f = folder(permissions, "owner@x.com", "g1");

        let other = user("other@x.com", &["g9"]);
        assert!(check_permission(&f, &other, Permission::Read).is_ok());
        let err = check_permission(&f, &other, Permission::Write).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn test_group_bucket_requires_membership_and_capability() {
        let mut permissions = FolderPermissions::restricted();
        permissions.group.push(Permission::Read);
        let f = folder(permissions, "owner@x.com", "g1");

        let member = user("member@x.com", &["g1"]);
        assert!(check_permission(&f, &member, Permission::Read).is_ok());

        let outsider = user("outsider@x.com", &["g2"]);
        let err = check_permission(&f, &outsider, Permission::Read).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn test_advanced_bucket() {
        let mut permissions = FolderPermissions::restricted();
        permissions
            .advanced
            .insert("auditors".to_string(), vec![Permission::Export]);
        let f = folder(permissions, "owner@x.com", "g1");

        let auditor = user("a@x.com", &["auditors"]);
        assert!(check_permission(&f, &auditor, Permission::Export).is_ok());
        let err = check_permission(&f, &auditor, Permission::Write).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn test_check_on_non_folder_is_folder_not_found() {
        let mut not_folder = folder(FolderPermissions::default(), "o@x.com", "g1");
        not_folder.variant = NodeVariant::Plain;
        let err = check_permission(&not_folder, &user("o@x.com", &[]), Permission::Read)
            .unwrap_err();
        assert!(matches!(err, Error::FolderNotFound(_)));
    }

    #[test]
    fn test_rewrite_passthrough_for_admin() {
        let filters = NodeFilters::single(Filter::new("title", FilterOperator::Equal, "A"));
        let rewritten = rewrite_filters(&filters, &user(ROOT_USER_EMAIL, &[]), Permission::Read);
        assert_eq!(rewritten, filters);
    }

    #[test]
    fn test_rewrite_anonymous_has_only_anonymous_paths() {
        let filters = NodeFilters::all();
        let anon = user("anonymous@antbox.io", &["--anonymous--"]);
        let rewritten = rewrite_filters(&filters, &anon, Permission::Read);
        // One folder path and one parent path.
        assert_eq!(rewritten.groups.len(), 2);
        assert!(rewritten
            .groups
            .iter()
            .flat_map(|g| g.0.iter())
            .any(|f| f.field == "permissions.anonymous"));
        assert!(rewritten
            .groups
            .iter()
            .flat_map(|g| g.0.iter())
            .any(|f| f.field == "@permissions.anonymous"));
    }

    #[test]
    fn test_rewrite_expands_each_conjunction_per_path() {
        let filters = NodeFilters::single(Filter::new("title", FilterOperator::Equal, "A"));
        let member = user("m@x.com", &["g1"]);
        let rewritten = rewrite_filters(&filters, &member, Permission::Read);

        // Paths per target kind: anonymous, owner, authenticated,
        // group, one advanced per group membership = 5; doubled for
        // folder and non-folder targets.
        assert_eq!(rewritten.groups.len(), 10);
        // The user predicate survives in every expansion.
        assert!(rewritten
            .groups
            .iter()
            .all(|g| g.0.iter().any(|f| f.field == "title")));
        // Every conjunction is pinned to a target kind.
        assert!(rewritten
            .groups
            .iter()
            .all(|g| g.0.iter().any(|f| f.field == "mimetype")));
    }

    #[test]
    fn test_rewrite_groupless_user_skips_group_paths() {
        let rewritten = rewrite_filters(
            &NodeFilters::all(),
            &user("m@x.com", &[]),
            Permission::Read,
        );
        // anonymous, owner, authenticated, doubled per target kind.
        assert_eq!(rewritten.groups.len(), 6);
    }

    #[test]
    fn test_rewrite_uses_capability_name() {
        let rewritten = rewrite_filters(
            &NodeFilters::all(),
            &user("m@x.com", &[]),
            Permission::Export,
        );
        assert!(rewritten
            .groups
            .iter()
            .flat_map(|g| g.0.iter())
            .filter(|f| f.field.contains("permissions."))
            .all(|f| f.value == json!("Export")));
    }
}
