//! Caller identity and authorization policies
//!
//! Authentication is not performed by the engine: an upstream layer inserts an
//! [`AuthContext`] into the request extensions and authorizers read it back
//! through [`Context::auth`](crate::core::context::Context::auth).
//! Requests without one are [`AuthContext::Anonymous`].

use axum::http::Extensions;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::error::ConfigError;

/// Identity of the caller, stored in the request extensions
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthContext {
    /// Authenticated user
    User { user_id: Uuid, roles: Vec<String> },

    /// Another service calling on its own behalf
    Service { service_name: String },

    /// System administrator
    Admin { admin_id: Uuid },

    #[default]
    Anonymous,
}

impl AuthContext {
    pub fn user(user_id: Uuid, roles: &[&str]) -> Self {
        AuthContext::User {
            user_id,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Identity attached to a request, anonymous when no layer set one
    pub fn from_extensions(extensions: &Extensions) -> Self {
        extensions.get::<AuthContext>().cloned().unwrap_or_default()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    pub fn is_service(&self) -> bool {
        matches!(self, AuthContext::Service { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthContext::Anonymous)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        match self {
            AuthContext::User { roles, .. } => roles.iter().any(|r| r == role),
            _ => false,
        }
    }
}

impl fmt::Display for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthContext::User { user_id, .. } => write!(f, "user {}", user_id),
            AuthContext::Service { service_name } => write!(f, "service {}", service_name),
            AuthContext::Admin { admin_id } => write!(f, "admin {}", admin_id),
            AuthContext::Anonymous => f.write_str("anonymous"),
        }
    }
}

/// Rule an [`AuthContext`] must satisfy
///
/// Policies can be written as strings, e.g. in configuration files:
/// `public`, `authenticated`, `service_only`, `admin_only`,
/// `role:editor,writer` and `admin_or_role:writer`.
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    Public,

    /// Anything but [`AuthContext::Anonymous`]
    Authenticated,

    /// User holding at least one of these roles
    HasRole(Vec<String>),

    ServiceOnly,

    AdminOnly,

    And(Vec<AuthPolicy>),

    Or(Vec<AuthPolicy>),

    Custom(fn(&AuthContext) -> bool),
}

impl AuthPolicy {
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::Public => true,
            AuthPolicy::Authenticated => !context.is_anonymous(),
            AuthPolicy::HasRole(required) => required.iter().any(|r| context.has_role(r)),
            AuthPolicy::ServiceOnly => context.is_service(),
            AuthPolicy::AdminOnly => context.is_admin(),
            AuthPolicy::And(policies) => policies.iter().all(|p| p.check(context)),
            AuthPolicy::Or(policies) => policies.iter().any(|p| p.check(context)),
            AuthPolicy::Custom(f) => f(context),
        }
    }

    /// Check the identity attached to a request
    pub fn allows(&self, extensions: &Extensions) -> bool {
        self.check(&AuthContext::from_extensions(extensions))
    }
}

impl FromStr for AuthPolicy {
    type Err = ConfigError;

    /// Unknown names and empty role lists are configuration errors
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidPolicy {
            policy: s.to_string(),
        };
        let roles = |list: &str| -> Result<Vec<String>, ConfigError> {
            let roles: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
            if roles.is_empty() { Err(invalid()) } else { Ok(roles) }
        };

        if let Some(list) = s.strip_prefix("role:") {
            return Ok(AuthPolicy::HasRole(roles(list)?));
        }
        if let Some(list) = s.strip_prefix("admin_or_role:") {
            return Ok(AuthPolicy::Or(vec![
                AuthPolicy::AdminOnly,
                AuthPolicy::HasRole(roles(list)?),
            ]));
        }
        match s {
            "public" => Ok(AuthPolicy::Public),
            "authenticated" => Ok(AuthPolicy::Authenticated),
            "service_only" => Ok(AuthPolicy::ServiceOnly),
            "admin_only" => Ok(AuthPolicy::AdminOnly),
            _ => Err(invalid()),
        }
    }
}
