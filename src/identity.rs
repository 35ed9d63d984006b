//! Resolved caller identity.
//!
//! The portal never issues or refreshes sessions. The transport layer hands
//! in whatever credential it carries, an [`IdentityContext`] turns it into an
//! [`Actor`] once per request, and everything downstream works with that.
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{PortalError, PortalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    Employee,
    #[n(2)]
    Customer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::Customer => "customer",
        })
    }
}

/// Capability names granted through `feature_access`.
pub mod capability {
    pub const LEAVE: &str = "leave";
    pub const OVERTIME: &str = "overtime";
    pub const ADVANCE_SALARY: &str = "advance_salary";
    pub const SCHEDULE_WORKS: &str = "schedule_works";
    pub const PAYROLL: &str = "payroll";
    pub const TICKETS: &str = "tickets";
    pub const ASSETS: &str = "assets";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub business_unit: String,
    pub feature_access: BTreeSet<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, business_unit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            business_unit: business_unit.into(),
            feature_access: BTreeSet::new(),
        }
    }
    pub fn admin(id: impl Into<String>, business_unit: impl Into<String>) -> Self {
        Self::new(id, Role::Admin, business_unit)
    }
    pub fn employee(id: impl Into<String>, business_unit: impl Into<String>) -> Self {
        Self::new(id, Role::Employee, business_unit)
    }
    pub fn customer(id: impl Into<String>, business_unit: impl Into<String>) -> Self {
        Self::new(id, Role::Customer, business_unit)
    }
    pub fn with_access<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_access
            .extend(capabilities.into_iter().map(Into::into));
        self
    }
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
    pub fn holds(&self, capability: &str) -> bool {
        self.feature_access.contains(capability)
    }
}

/// Resolves a transport credential to an actor. Implemented by the session layer.
pub trait IdentityContext: Send + Sync {
    fn resolve(&self, credential: &str) -> Option<Actor>;
}

/// Resolve the caller exactly once, failing closed.
pub fn resolve_actor(ctx: &dyn IdentityContext, credential: &str) -> PortalResult<Actor> {
    if credential.trim().is_empty() {
        return Err(PortalError::denied("no credential presented"));
    }
    let actor = ctx
        .resolve(credential)
        .ok_or_else(|| PortalError::denied("credential could not be resolved"))?;

    if actor.id.is_empty() || actor.business_unit.is_empty() {
        tracing::warn!(role = %actor.role, "identity context returned an incomplete actor");
        return Err(PortalError::denied("credential resolved to an incomplete identity"));
    }
    Ok(actor)
}
