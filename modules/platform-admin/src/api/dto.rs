//! Wire types for the platform-admin routes (spec §6.1).

use modkit_auth::{Tenant, TenantQuotas, TenantStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateTenantBody {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<TenantStatus>,
    #[serde(default)]
    pub quotas: Option<TenantQuotas>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateTenantBody {
    pub name: Option<String>,
    pub status: Option<TenantStatus>,
    pub quotas: Option<TenantQuotas>,
}

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub status: TenantStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotas: Option<TenantQuotas>,
}

impl From<&Tenant> for TenantResponse {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id.clone(),
            slug: tenant.slug.clone(),
            name: tenant.name.clone(),
            status: tenant.status,
            quotas: tenant.quotas.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantListResponse {
    pub data: Vec<TenantResponse>,
}

#[derive(Debug, Serialize, Default)]
pub struct PlatformStatsResponse {
    #[serde(rename = "tenantCount")]
    pub tenant_count: u64,
    #[serde(rename = "activeTenantCount")]
    pub active_tenant_count: u64,
    #[serde(rename = "userCount")]
    pub user_count: u64,
    #[serde(rename = "documentCountByType")]
    pub document_count_by_type: std::collections::HashMap<String, u64>,
}
