//! Workflow domain: metadata model, graph compiler, agent registry, safe
//! evaluator, execution engine, and the Mongo-backed repositories behind
//! them (spec §4.4, §9).

pub mod agents;
pub mod engine;
pub mod graph;
pub mod model;
pub mod repository;
pub mod safe_eval;
