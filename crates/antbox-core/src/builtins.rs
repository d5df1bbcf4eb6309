//! Reserved identifiers and built-in nodes.
//!
//! Built-ins are born Active, immutable, and always present: the root
//! folder, the system folder and its sub-folders, and the built-in
//! groups and users. Their uuids are `--`-delimited and reserved;
//! `save`/`update`/`delete` on them is rejected.

use once_cell::sync::Lazy;

use crate::filters::NodeFilters;
use crate::fulltext::derive_fulltext;
use crate::models::{
    FolderPermissions, FolderSpec, Group, Node, NodeVariant, Permission, UserRecord,
};

/// Reserved mimetypes.
pub mod mimetypes {
    pub const FOLDER: &str = "application/vnd.antbox.folder";
    pub const SMART_FOLDER: &str = "application/vnd.antbox.smart-folder";
    pub const ASPECT: &str = "application/vnd.antbox.aspect";
    pub const FEATURE: &str = "application/vnd.antbox.feature";
    pub const META_NODE: &str = "application/vnd.antbox.meta-node";
    pub const API_KEY: &str = "application/vnd.antbox.api-key";
    pub const AGENT: &str = "application/vnd.antbox.agent";
}

/// Whether `mimetype` is one of the reserved node mimetypes.
pub fn is_reserved_mimetype(mimetype: &str) -> bool {
    matches!(
        mimetype,
        mimetypes::FOLDER
            | mimetypes::SMART_FOLDER
            | mimetypes::ASPECT
            | mimetypes::FEATURE
            | mimetypes::META_NODE
            | mimetypes::API_KEY
            | mimetypes::AGENT
    )
}

pub const ROOT_FOLDER_UUID: &str = "--root--";
pub const SYSTEM_FOLDER_UUID: &str = "--system--";
pub const API_KEYS_FOLDER_UUID: &str = "--api-keys--";
pub const ASPECTS_FOLDER_UUID: &str = "--aspects--";
pub const FEATURES_FOLDER_UUID: &str = "--features--";
pub const USERS_FOLDER_UUID: &str = "--users--";
pub const GROUPS_FOLDER_UUID: &str = "--groups--";
pub const AGENTS_FOLDER_UUID: &str = "--agents--";

pub const ADMINS_GROUP_UUID: &str = "--admins--";
pub const ANONYMOUS_GROUP_UUID: &str = "--anonymous--";

pub const ROOT_USER_EMAIL: &str = "root@antbox.io";
pub const ANONYMOUS_USER_EMAIL: &str = "anonymous@antbox.io";

fn builtin_folder_node(
    uuid: &str,
    fid: &str,
    title: &str,
    parent: &str,
    permissions: FolderPermissions,
) -> Node {
    let epoch = chrono::DateTime::UNIX_EPOCH;
    Node {
        uuid: uuid.to_string(),
        fid: fid.to_string(),
        title: title.to_string(),
        description: None,
        mimetype: mimetypes::FOLDER.to_string(),
        parent: parent.to_string(),
        owner: ROOT_USER_EMAIL.to_string(),
        group: ADMINS_GROUP_UUID.to_string(),
        created_time: epoch,
        modified_time: epoch,
        size: 0,
        tags: vec![],
        aspects: vec![],
        properties: Default::default(),
        fulltext: derive_fulltext(title, None, &[], []),
        variant: NodeVariant::Folder(FolderSpec {
            permissions,
            filters: NodeFilters::default(),
        }),
    }
}

/// The root folder. Its `parent` is itself.
pub static ROOT_FOLDER: Lazy<Node> = Lazy::new(|| {
    builtin_folder_node(
        ROOT_FOLDER_UUID,
        "root",
        "Root",
        ROOT_FOLDER_UUID,
        FolderPermissions {
            anonymous: vec![],
            authenticated: vec![Permission::Read],
            group: vec![Permission::Read, Permission::Write, Permission::Export],
            advanced: Default::default(),
        },
    )
});

/// The system folder and its sub-folders, admin-restricted.
pub static SYSTEM_FOLDERS: Lazy<Vec<Node>> = Lazy::new(|| {
    let mut folders = vec![builtin_folder_node(
        SYSTEM_FOLDER_UUID,
        "system",
        "System",
        ROOT_FOLDER_UUID,
        FolderPermissions::restricted(),
    )];
    let children = [
        (API_KEYS_FOLDER_UUID, "api-keys", "API Keys"),
        (ASPECTS_FOLDER_UUID, "aspects", "Aspects"),
        (FEATURES_FOLDER_UUID, "features", "Features"),
        (USERS_FOLDER_UUID, "users", "Users"),
        (GROUPS_FOLDER_UUID, "groups", "Groups"),
        (AGENTS_FOLDER_UUID, "agents", "Agents"),
    ];
    for (uuid, fid, title) in children {
        folders.push(builtin_folder_node(
            uuid,
            fid,
            title,
            SYSTEM_FOLDER_UUID,
            FolderPermissions::restricted(),
        ));
    }
    folders
});

/// Look up a built-in folder by uuid.
pub fn builtin_folder(uuid: &str) -> Option<&'static Node> {
    if uuid == ROOT_FOLDER_UUID {
        return Some(&ROOT_FOLDER);
    }
    SYSTEM_FOLDERS.iter().find(|folder| folder.uuid == uuid)
}

/// Children of the system folder.
pub fn system_subfolders() -> impl Iterator<Item = &'static Node> {
    SYSTEM_FOLDERS
        .iter()
        .filter(|folder| folder.parent == SYSTEM_FOLDER_UUID)
}

/// Built-in groups merged into configuration listings.
pub fn builtin_groups() -> Vec<Group> {
    vec![
        Group {
            uuid: ADMINS_GROUP_UUID.to_string(),
            title: "Admins".to_string(),
            description: Some("Full access to every node".to_string()),
            builtin: true,
        },
        Group {
            uuid: ANONYMOUS_GROUP_UUID.to_string(),
            title: "Anonymous".to_string(),
            description: Some("Unauthenticated callers".to_string()),
            builtin: true,
        },
    ]
}

/// Built-in users merged into configuration listings.
pub fn builtin_users() -> Vec<UserRecord> {
    vec![
        UserRecord {
            email: ROOT_USER_EMAIL.to_string(),
            name: "Root".to_string(),
            groups: vec![ADMINS_GROUP_UUID.to_string()],
            builtin: true,
        },
        UserRecord {
            email: ANONYMOUS_USER_EMAIL.to_string(),
            name: "Anonymous".to_string(),
            groups: vec![ANONYMOUS_GROUP_UUID.to_string()],
            builtin: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_mimetypes() {
        assert!(is_reserved_mimetype(mimetypes::FOLDER));
        assert!(is_reserved_mimetype(mimetypes::API_KEY));
        assert!(!is_reserved_mimetype("application/pdf"));
        assert!(!is_reserved_mimetype("text/plain"));
    }

    #[test]
    fn test_root_folder_is_its_own_parent() {
        assert_eq!(ROOT_FOLDER.uuid, ROOT_FOLDER_UUID);
        assert_eq!(ROOT_FOLDER.parent, ROOT_FOLDER_UUID);
        assert!(ROOT_FOLDER.is_folder());
        assert!(ROOT_FOLDER.is_builtin());
    }

    #[test]
    fn test_builtin_folder_lookup() {
        assert!(builtin_folder(ROOT_FOLDER_UUID).is_some());
        assert!(builtin_folder(SYSTEM_FOLDER_UUID).is_some());
        assert!(builtin_folder(API_KEYS_FOLDER_UUID).is_some());
        assert!(builtin_folder("not-a-builtin").is_none());
    }

    #[test]
    fn test_system_subfolders_parentage() {
        let subfolders: Vec<_> = system_subfolders().collect();
        assert_eq!(subfolders.len(), 6);
        assert!(subfolders.iter().all(|f| f.parent == SYSTEM_FOLDER_UUID));
        assert!(subfolders.iter().all(|f| f.is_builtin()));
    }

    #[test]
    fn test_builtin_groups_and_users() {
        let groups = builtin_groups();
        assert!(groups.iter().any(|g| g.uuid == ADMINS_GROUP_UUID));
        assert!(groups.iter().all(|g| g.builtin));

        let users = builtin_users();
        let root = users.iter().find(|u| u.email == ROOT_USER_EMAIL).unwrap();
        assert!(root.groups.contains(&ADMINS_GROUP_UUID.to_string()));
    }
}
