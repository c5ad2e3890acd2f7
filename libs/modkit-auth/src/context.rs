//! `TenantContext` / `RequestContext` (spec §4.1).
//!
//! Immutable per-request state, built once by the route framework and
//! threaded explicitly into every repository, service, and audit call —
//! never read from a global.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::PlatformRole;

/// A platform admin's `TenantContext` carries this sentinel instead of a
/// concrete tenant id; repositories interpret it by omitting the automatic
/// tenant filter (spec §4.1, §4.2 invariant 1).
pub const ALL_TENANTS_SENTINEL: &str = "*";

#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
    pub platform_role: Option<PlatformRole>,
    pub is_platform_admin: bool,
}

impl TenantContext {
    /// A context scoped to exactly one tenant (the common case).
    #[must_use]
    pub fn scoped(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            platform_role: None,
            is_platform_admin: false,
        }
    }

    /// A platform admin acting across every tenant.
    #[must_use]
    pub fn platform_admin(user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: ALL_TENANTS_SENTINEL.to_owned(),
            user_id: user_id.into(),
            platform_role: Some(PlatformRole::PlatformAdmin),
            is_platform_admin: true,
        }
    }

    /// A platform admin acting with a specific tenant selected (e.g. logged
    /// in through a particular tenant's login screen). Still bypasses the
    /// automatic tenant filter, per spec §4.1.
    #[must_use]
    pub fn platform_admin_scoped(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            platform_role: Some(PlatformRole::PlatformAdmin),
            is_platform_admin: true,
        }
    }

    /// The tenant id to filter by, or `None` when the automatic tenant
    /// filter must be omitted (platform admin, spec §4.2 invariant 1).
    #[must_use]
    pub fn filter_tenant_id(&self) -> Option<&str> {
        if self.is_platform_admin {
            None
        } else {
            Some(&self.tenant_id)
        }
    }
}

/// Immutable per-request state. Built by the route framework from the
/// verified token (spec §4.1).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub started_at: DateTime<Utc>,
    pub tenant_context: TenantContext,
}

impl RequestContext {
    #[must_use]
    pub fn new(tenant_context: TenantContext) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            tenant_context,
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// A `tracing` span pre-populated with the fields every log line in this
    /// request's handling should carry — the "logger child" of spec §4.1.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            correlation_id = %self.correlation_id,
            tenant_id = %self.tenant_context.tenant_id,
            user_id = %self.tenant_context.user_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_admin_omits_tenant_filter() {
        let ctx = TenantContext::platform_admin("u1");
        assert!(ctx.is_platform_admin);
        assert_eq!(ctx.filter_tenant_id(), None);
    }

    #[test]
    fn scoped_context_filters_by_tenant() {
        let ctx = TenantContext::scoped("t1", "u1");
        assert!(!ctx.is_platform_admin);
        assert_eq!(ctx.filter_tenant_id(), Some("t1"));
    }
}
