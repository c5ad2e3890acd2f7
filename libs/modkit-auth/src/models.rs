//! Tenant / Membership / User data model (spec §3.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantQuotas {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_users: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_documents: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub status: TenantStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotas: Option<TenantQuotas>,
}

impl Tenant {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.status, TenantStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

/// `(userId, tenantId, role)` unique triple. Creates only, no update — a
/// role change is a delete-then-create, never a mutation in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub tenant_id: String,
    pub role: MembershipRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformRole {
    PlatformAdmin,
    User,
}

/// The persisted user record, including the credential hash. This type is
/// never serialized directly into an HTTP response — `auth-api` projects it
/// into a redacted DTO first — the hash is kept on the struct so
/// persistence (`Serialize`/`Deserialize` to BSON) round-trips the whole
/// record, not a policy about who may see which field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub platform_role: Option<PlatformRole>,
    /// The only field `PUT /api/auth/profile` may change — `email`,
    /// `password_hash`, and `platform_role` are sensitive and that route
    /// rejects them (spec §6.1).
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    #[must_use]
    pub fn is_platform_admin(&self) -> bool {
        matches!(self.platform_role, Some(PlatformRole::PlatformAdmin))
    }
}
