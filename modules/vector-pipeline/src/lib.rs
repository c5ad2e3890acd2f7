//! Vector embedding pipeline module (spec §4.5): watches the document
//! collection for monitored-type changes and keeps semantic embeddings in
//! the `vectors` collection up to date. See [`domain`] for the pipeline
//! itself and [`api`] for the HTTP surface it's exposed through.

pub mod api;
pub mod domain;
mod module;

pub use module::VectorPipelineModule;
