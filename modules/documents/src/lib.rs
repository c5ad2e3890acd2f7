//! Generic document CRUD, search, stats, and aggregation routes (spec
//! §4.2, §4.3, §6.1). The only module that talks to the `Repository`
//! kernel on behalf of an arbitrary, metadata-declared `type` — feature
//! modules that need a bespoke shape build their own repository-backed
//! module instead of extending this one.

pub mod api;
mod module;

pub use module::DocumentsModule;
