//! Tenant/request context, token verification, and authorization services
//! (spec §4.1, §4.6).

pub mod authz;
pub mod context;
pub mod models;
pub mod password;
pub mod token;

pub use authz::{AuthorizationService, MembershipDirectory, MembershipDirectoryHandle, PermissionCache};
pub use context::{ALL_TENANTS_SENTINEL, RequestContext, TenantContext};
pub use models::{Membership, MembershipRole, PlatformRole, Tenant, TenantQuotas, TenantStatus, User};
pub use password::{hash_password, verify_password};
pub use token::{AuthService, Claims};
