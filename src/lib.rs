//! Execution backend for the tyro teaching language: a tree-walking
//! evaluator with explicit tail calls, paired with a runtime type checker
//! that re-verifies static annotations against actual values.
//!
//! The crate does not parse source text. Callers hand it an already-built
//! syntax tree ([`ast::Program`]) together with an execution context
//! ([`context::Context`]) and drive the evaluator either to completion
//! ([`interpreter::run_program`]) or one step at a time
//! ([`interpreter::Machine`]).

pub mod ast;
pub mod closure;
pub mod context;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod printer;
pub mod rttc;
pub mod types;
pub mod value;
