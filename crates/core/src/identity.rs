//! Caller identity.
//!
//! Authentication itself happens outside the assistant. What reaches the core
//! is an already-resolved [`Principal`]; tools only ever see the narrower
//! [`TenantScope`] derived from it.

use serde::{Deserialize, Serialize};

/// An authenticated caller: one user inside one organization (tenant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub organization_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
        }
    }

    /// The tenant scope handed to tool handlers.
    pub fn scope(&self) -> TenantScope {
        TenantScope {
            organization_id: self.organization_id.clone(),
        }
    }
}

/// The data boundary a tool handler is allowed to read within.
/// Carries nothing but the organization id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub organization_id: String,
}

impl TenantScope {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
        }
    }
}
