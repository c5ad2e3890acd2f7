//! Platform-admin-only tenant management and cross-tenant stats (spec
//! §6.1 "Platform admin"). Every route here requires
//! [`modkit::RoutePolicy::RequirePlatformAdmin`] — a non-admin caller never
//! reaches the handler, let alone a tenant-scoped repository.

pub mod api;
mod module;

pub use module::PlatformAdminModule;
