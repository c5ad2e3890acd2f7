//! Mongo-backed persistence for `Tenant` / `User` / `Membership` (spec
//! §3.2, §6.2). These three records are not polymorphic `Document`s — they
//! have their own dedicated collections and a fixed shape — so they get
//! their own thin repository rather than going through [`crate::Repository`]
//! (spec §9 "pure schemas + services": the structs stay inert; this is the
//! only place they are read or written).

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::Collection;
use modkit_auth::{Membership, MembershipDirectory, MembershipRole, Tenant, TenantStatus, User};
use modkit_errors::ApiError;

fn db_err(e: mongodb::error::Error) -> ApiError {
    ApiError::database(format!("mongo error: {e}"))
}

/// Mongo-backed directory of tenants, users, and memberships. Implements
/// [`MembershipDirectory`] so `AuthorizationService` can be built directly
/// against `Arc<MongoDirectory>` (wrapped as `Arc<dyn MembershipDirectory>`),
/// and exposes the additional lookups `auth-api` and `platform-admin` need
/// that are not part of the authorization-only trait.
pub struct MongoDirectory {
    users: Collection<User>,
    tenants: Collection<Tenant>,
    memberships: Collection<Membership>,
}

impl MongoDirectory {
    #[must_use]
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            users: db.collection("users"),
            tenants: db.collection("tenants"),
            memberships: db.collection("memberships"),
        }
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        self.users.find_one(bson::doc! { "email": email }).await.map_err(db_err)
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, ApiError> {
        self.users.find_one(bson::doc! { "id": user_id }).await.map_err(db_err)
    }

    /// # Errors
    /// `ApiError::conflict` if the email is already registered;
    /// `ApiError::database` on a driver error.
    pub async fn create_user(&self, user: &User) -> Result<(), ApiError> {
        self.users.insert_one(user).await.map_err(|e| {
            if is_duplicate_key(&e) {
                ApiError::conflict(format!("email '{}' is already registered", user.email))
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn update_user(&self, user_id: &str, patch: bson::Document) -> Result<(), ApiError> {
        self.users
            .update_one(bson::doc! { "id": user_id }, bson::doc! { "$set": patch })
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, ApiError> {
        self.tenants.find_one(bson::doc! { "slug": slug }).await.map_err(db_err)
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_tenant_by_id(&self, id: &str) -> Result<Option<Tenant>, ApiError> {
        self.tenants.find_one(bson::doc! { "id": id }).await.map_err(db_err)
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn active_tenants(&self) -> Result<Vec<Tenant>, ApiError> {
        let cursor = self
            .tenants
            .find(bson::doc! { "status": bson::to_bson(&TenantStatus::Active).map_err(|e| ApiError::internal(e.to_string()))? })
            .await
            .map_err(db_err)?;
        cursor.try_collect().await.map_err(db_err)
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, ApiError> {
        let cursor = self.tenants.find(bson::doc! {}).await.map_err(db_err)?;
        cursor.try_collect().await.map_err(db_err)
    }

    /// # Errors
    /// `ApiError::conflict` if the slug is already taken; `ApiError::database`
    /// on a driver error.
    pub async fn create_tenant(&self, tenant: &Tenant) -> Result<(), ApiError> {
        self.tenants.insert_one(tenant).await.map_err(|e| {
            if is_duplicate_key(&e) {
                ApiError::conflict(format!("slug '{}' is already in use", tenant.slug))
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    /// # Errors
    /// `ApiError::not_found` if no tenant with `id` exists; `ApiError::database`
    /// on a driver error.
    pub async fn update_tenant(&self, id: &str, patch: bson::Document) -> Result<Tenant, ApiError> {
        let result = self
            .tenants
            .update_one(bson::doc! { "id": id }, bson::doc! { "$set": patch })
            .await
            .map_err(db_err)?;
        if result.matched_count == 0 {
            return Err(ApiError::not_found(format!("tenant '{id}' not found")));
        }
        self.find_tenant_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("tenant '{id}' not found")))
    }

    /// # Errors
    /// `ApiError::not_found` if no tenant with `id` exists; `ApiError::database`
    /// on a driver error.
    pub async fn delete_tenant(&self, id: &str) -> Result<(), ApiError> {
        let result = self.tenants.delete_one(bson::doc! { "id": id }).await.map_err(db_err)?;
        if result.deleted_count == 0 {
            return Err(ApiError::not_found(format!("tenant '{id}' not found")));
        }
        Ok(())
    }

    /// # Errors
    /// `ApiError::conflict` on a duplicate `(userId, tenantId, role)` triple
    /// (spec §3.2 "unique triple"); `ApiError::database` on a driver error.
    pub async fn create_membership(&self, membership: &Membership) -> Result<(), ApiError> {
        self.memberships.insert_one(membership).await.map_err(|e| {
            if is_duplicate_key(&e) {
                ApiError::conflict("membership already exists for this user, tenant, and role")
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    async fn tenants_by_ids(&self, ids: &[String]) -> Vec<Tenant> {
        let Ok(cursor) = self.tenants.find(bson::doc! { "id": { "$in": ids } }).await else {
            return Vec::new();
        };
        cursor.try_collect().await.unwrap_or_default()
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(&*e.kind, mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we)) if we.code == 11000)
}

#[async_trait]
impl MembershipDirectory for MongoDirectory {
    async fn memberships_for_user(&self, user_id: &str) -> Vec<Membership> {
        let Ok(cursor) = self.memberships.find(bson::doc! { "userId": user_id }).await else {
            return Vec::new();
        };
        cursor.try_collect().await.unwrap_or_default()
    }

    async fn tenants_for_user(&self, user_id: &str) -> Vec<Tenant> {
        if let Ok(Some(user)) = self.find_user_by_id(user_id).await {
            if user.is_platform_admin() {
                return self.active_tenants().await.unwrap_or_default();
            }
        }
        let memberships = self.memberships_for_user(user_id).await;
        let ids: Vec<String> = memberships.into_iter().map(|m| m.tenant_id).collect();
        if ids.is_empty() {
            return Vec::new();
        }
        self.tenants_by_ids(&ids).await
    }
}

/// Convenience used by `auth-api`'s tenant-discovery route (spec §4.6
/// "Tenant resolution for login"): the roles a user holds, paired with the
/// role, rather than just the bare tenant list `tenants_for_user` returns.
#[must_use]
pub fn owner_or_admin_roles() -> &'static [MembershipRole] {
    &[MembershipRole::Owner, MembershipRole::Admin]
}
