//! Workflow engine module: compiles workflow metadata into runnable graphs
//! and executes them (spec §4.4). See [`domain`] for the engine itself and
//! [`api`] for the HTTP surface it's exposed through.

pub mod api;
pub mod domain;
mod module;

pub use module::WorkflowEngineModule;
