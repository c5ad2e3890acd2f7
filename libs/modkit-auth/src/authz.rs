//! `AuthorizationService` (spec §4.6) — pure functions plus membership
//! queries, backed by a short-TTL permission cache (spec §5, §9).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::models::{Membership, MembershipRole, Tenant, User};

/// A permission is a simple string (e.g. `"documents:write"`). Role ->
/// permission mapping is static and declared here, not per-tenant
/// configurable — that is out of scope per spec §1 Non-goals
/// (authentication credential stores are excluded; static RBAC is the
/// minimal authorization policy the spec's routes require).
fn role_permissions(role: MembershipRole) -> &'static [&'static str] {
    match role {
        MembershipRole::Owner | MembershipRole::Admin => {
            &["documents:read", "documents:write", "documents:delete", "tenant:admin"]
        }
        MembershipRole::Member => &["documents:read", "documents:write"],
        MembershipRole::Viewer => &["documents:read"],
    }
}

/// Supplies membership data to `AuthorizationService`. Implemented by the
/// repository layer (`modkit-db`) or an in-memory store in tests — kept as
/// a trait here so `modkit-auth` never depends on the storage crate.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn memberships_for_user(&self, user_id: &str) -> Vec<Membership>;
    async fn tenants_for_user(&self, user_id: &str) -> Vec<Tenant>;
}

/// Lets `Arc<dyn MembershipDirectory>` stand in for a concrete directory, so
/// the route framework can depend on `AuthorizationService<Arc<dyn
/// MembershipDirectory>>` — one concrete type — instead of threading the
/// directory's implementation type through every module.
#[async_trait]
impl MembershipDirectory for std::sync::Arc<dyn MembershipDirectory> {
    async fn memberships_for_user(&self, user_id: &str) -> Vec<Membership> {
        (**self).memberships_for_user(user_id).await
    }
    async fn tenants_for_user(&self, user_id: &str) -> Vec<Tenant> {
        (**self).tenants_for_user(user_id).await
    }
}

/// Wraps `Arc<dyn MembershipDirectory>` so it can be stored in a type-keyed
/// service registry (`modkit::ServiceRegistry::insert` requires its type
/// parameter to be `Sized`, which a bare trait object is not).
#[derive(Clone)]
pub struct MembershipDirectoryHandle(pub std::sync::Arc<dyn MembershipDirectory>);

struct CacheEntry {
    has_access: bool,
    expires_at: Instant,
}

/// Short-TTL cache of `(user_id, tenant_id) -> has_access`, invalidated
/// explicitly on membership change. The only in-process cache the spec
/// permits (§5 "Shared resources").
pub struct PermissionCache {
    entries: DashMap<(String, String), CacheEntry>,
    ttl: Duration,
}

impl PermissionCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn get(&self, user_id: &str, tenant_id: &str) -> Option<bool> {
        let key = (user_id.to_owned(), tenant_id.to_owned());
        let entry = self.entries.get(&key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.has_access)
    }

    fn put(&self, user_id: &str, tenant_id: &str, has_access: bool) {
        self.entries.insert(
            (user_id.to_owned(), tenant_id.to_owned()),
            CacheEntry {
                has_access,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Invalidate every cached entry for a user — called on membership
    /// mutation (spec §5).
    pub fn invalidate_user(&self, user_id: &str) {
        self.entries.retain(|(uid, _), _| uid != user_id);
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

pub struct AuthorizationService<D: MembershipDirectory> {
    directory: D,
    cache: PermissionCache,
}

impl<D: MembershipDirectory> AuthorizationService<D> {
    #[must_use]
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            cache: PermissionCache::default(),
        }
    }

    #[must_use]
    pub fn is_platform_admin(user: &User) -> bool {
        user.is_platform_admin()
    }

    /// True if any of the user's memberships across all tenants grants
    /// `permission`. Platform admins always have every permission.
    pub async fn has_permission(&self, user: &User, permission: &str) -> bool {
        if user.is_platform_admin() {
            return true;
        }
        let memberships = self.directory.memberships_for_user(&user.id).await;
        memberships
            .iter()
            .any(|m| role_permissions(m.role).contains(&permission))
    }

    pub async fn has_any_role(&self, user: &User, roles: &[MembershipRole]) -> bool {
        if user.is_platform_admin() {
            return true;
        }
        let memberships = self.directory.memberships_for_user(&user.id).await;
        memberships.iter().any(|m| roles.contains(&m.role))
    }

    pub async fn get_user_tenants(&self, user_id: &str) -> Vec<Tenant> {
        self.directory.tenants_for_user(user_id).await
    }

    /// True for platform admins unconditionally; otherwise consults
    /// membership, with a short-TTL cache to avoid a directory round trip
    /// on every request (spec §5).
    pub async fn has_access_to_tenant(&self, user: &User, tenant_id: &str) -> bool {
        if user.is_platform_admin() {
            return true;
        }
        if let Some(cached) = self.cache.get(&user.id, tenant_id) {
            return cached;
        }
        let memberships = self.directory.memberships_for_user(&user.id).await;
        let has_access = memberships.iter().any(|m| m.tenant_id == tenant_id);
        self.cache.put(&user.id, tenant_id, has_access);
        has_access
    }

    /// Invalidate the permission cache for a user — call after any
    /// membership mutation.
    pub fn invalidate_cache_for_user(&self, user_id: &str) {
        self.cache.invalidate_user(user_id);
    }

    /// Tenant-scoped role check used by the route framework's
    /// `requireTenantAdmin` policy (spec §4.6, §4.7). Unlike
    /// [`Self::has_any_role`], this only consults the membership for the
    /// tenant in the caller's `TenantContext` — a user who is an admin in
    /// one tenant is not an admin in another. Takes the claims already
    /// decoded from the bearer token rather than a hydrated `User`, so the
    /// route framework never needs a user lookup just to authorize a route.
    pub async fn has_role_in_tenant(
        &self,
        user_id: &str,
        is_platform_admin: bool,
        tenant_id: &str,
        roles: &[MembershipRole],
    ) -> bool {
        if is_platform_admin {
            return true;
        }
        let memberships = self.directory.memberships_for_user(user_id).await;
        memberships
            .iter()
            .any(|m| m.tenant_id == tenant_id && roles.contains(&m.role))
    }

    /// Tenant-scoped permission check, the claims-only counterpart to
    /// [`Self::has_permission`] used by `requirePermission` route policies.
    pub async fn has_permission_in_tenant(
        &self,
        user_id: &str,
        is_platform_admin: bool,
        tenant_id: &str,
        permission: &str,
    ) -> bool {
        if is_platform_admin {
            return true;
        }
        let memberships = self.directory.memberships_for_user(user_id).await;
        memberships
            .iter()
            .any(|m| m.tenant_id == tenant_id && role_permissions(m.role).contains(&permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlatformRole, TenantStatus};

    struct FakeDirectory {
        memberships: Vec<Membership>,
        tenants: Vec<Tenant>,
    }

    #[async_trait]
    impl MembershipDirectory for FakeDirectory {
        async fn memberships_for_user(&self, user_id: &str) -> Vec<Membership> {
            self.memberships
                .iter()
                .filter(|m| m.user_id == user_id)
                .cloned()
                .collect()
        }
        async fn tenants_for_user(&self, _user_id: &str) -> Vec<Tenant> {
            self.tenants.clone()
        }
    }

    fn make_user(platform_admin: bool) -> User {
        User {
            id: "u1".to_owned(),
            email: "u1@example.com".to_owned(),
            password_hash: String::new(),
            platform_role: if platform_admin {
                Some(PlatformRole::PlatformAdmin)
            } else {
                None
            },
            display_name: None,
        }
    }

    #[tokio::test]
    async fn platform_admin_has_access_to_any_tenant() {
        let svc = AuthorizationService::new(FakeDirectory {
            memberships: vec![],
            tenants: vec![],
        });
        let admin = make_user(true);
        assert!(svc.has_access_to_tenant(&admin, "any-tenant").await);
        assert!(svc.has_permission(&admin, "documents:delete").await);
    }

    #[tokio::test]
    async fn non_admin_requires_explicit_membership() {
        let user = make_user(false);
        let svc = AuthorizationService::new(FakeDirectory {
            memberships: vec![Membership {
                user_id: "u1".to_owned(),
                tenant_id: "t1".to_owned(),
                role: MembershipRole::Member,
            }],
            tenants: vec![Tenant {
                id: "t1".to_owned(),
                slug: "t1".to_owned(),
                name: "Tenant One".to_owned(),
                status: TenantStatus::Active,
                quotas: None,
            }],
        });
        assert!(svc.has_access_to_tenant(&user, "t1").await);
        assert!(!svc.has_access_to_tenant(&user, "t2").await);
        assert!(svc.has_permission(&user, "documents:write").await);
        assert!(!svc.has_permission(&user, "tenant:admin").await);
    }

    #[tokio::test]
    async fn cache_invalidation_forces_recheck() {
        let user = make_user(false);
        let svc = AuthorizationService::new(FakeDirectory {
            memberships: vec![Membership {
                user_id: "u1".to_owned(),
                tenant_id: "t1".to_owned(),
                role: MembershipRole::Viewer,
            }],
            tenants: vec![],
        });
        assert!(svc.has_access_to_tenant(&user, "t1").await);
        svc.invalidate_cache_for_user("u1");
        // Still true after invalidation since the directory is unchanged;
        // this exercises the invalidation path itself, not a behavior change.
        assert!(svc.has_access_to_tenant(&user, "t1").await);
    }
}
