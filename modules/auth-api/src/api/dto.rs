//! Wire types for the auth routes (spec §6.1).

use modkit_auth::{PlatformRole, User};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    #[serde(rename = "tenantSlug")]
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: PublicUser,
    pub tenant: Option<TenantSummary>,
}

#[derive(Debug, Serialize)]
pub struct TenantSummary {
    pub id: String,
    pub slug: String,
    pub name: String,
}

/// `User` stripped of `password_hash` — never serialized directly into a
/// response (spec §4.6, modkit-auth's `User` doc comment).
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    #[serde(rename = "platformRole")]
    pub platform_role: Option<PlatformRole>,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            platform_role: user.platform_role,
            display_name: user.display_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateProfileBody {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverTenantsQuery {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct DiscoverTenantsResponse {
    pub tenants: Vec<TenantSummary>,
}
