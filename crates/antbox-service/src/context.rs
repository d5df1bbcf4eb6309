//! Caller identity carried by every operation.

use serde::{Deserialize, Serialize};

use antbox_core::builtins::{
    ADMINS_GROUP_UUID, ANONYMOUS_GROUP_UUID, ANONYMOUS_USER_EMAIL, ROOT_USER_EMAIL,
};

/// The principal performing an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl Principal {
    pub fn new(email: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            email: email.into(),
            groups,
        }
    }

    /// Root and members of the admins group bypass permission checks.
    pub fn is_admin(&self) -> bool {
        self.email == ROOT_USER_EMAIL || self.groups.iter().any(|g| g == ADMINS_GROUP_UUID)
    }

    pub fn is_anonymous(&self) -> bool {
        self.email == ANONYMOUS_USER_EMAIL
    }

    /// The group new nodes are attributed to when none is supplied.
    pub fn primary_group(&self) -> Option<&str> {
        self.groups.first().map(String::as_str)
    }
}

/// Authentication context: a tenant tag plus the caller's principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationContext {
    pub tenant: String,
    pub principal: Principal,
}

impl AuthenticationContext {
    /// The root user context.
    pub fn root() -> Self {
        Self {
            tenant: "default".to_string(),
            principal: Principal::new(ROOT_USER_EMAIL, vec![ADMINS_GROUP_UUID.to_string()]),
        }
    }

    /// The anonymous caller context.
    pub fn anonymous() -> Self {
        Self {
            tenant: "default".to_string(),
            principal: Principal::new(
                ANONYMOUS_USER_EMAIL,
                vec![ANONYMOUS_GROUP_UUID.to_string()],
            ),
        }
    }

    /// An authenticated user context.
    pub fn authenticated(email: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            tenant: "default".to_string(),
            principal: Principal::new(email, groups),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }
}
