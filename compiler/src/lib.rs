// patchc — patch compiler core
//
// Library root. Semantic passes for node-based animation patches: the type
// oracle, validation, default-source materialization, auto-wiring, bus
// combination and the artifact model the runtime evaluates.

pub mod artifact;
pub mod autowire;
pub mod bus;
pub mod diag;
pub mod dot;
pub mod error;
pub mod generators;
pub mod graph;
pub mod id;
pub mod lexer;
pub mod materialize;
pub mod patch;
pub mod pipeline;
pub mod registry;
pub mod slot_type;
pub mod types;
pub mod validate;
