//! Centralised diagnostic hierarchy for the **tyro runtime**.
//!
//! Every failure the evaluator or the runtime type checker can report is a
//! variant of [`ErrorKind`], paired with the offending node's source
//! location in [`RuntimeError`]. This enables a uniform `EvalResult<T>`
//! alias throughout the crate while preserving rich diagnostic detail.
//!
//! The module **does not** print diagnostics itself, and it does not
//! record them either: recording happens in [`crate::context::Context`],
//! which appends each diagnostic to its list at the moment the error is
//! raised.

use serde::Serialize;
use thiserror::Error;

use log::info;

use crate::ast::Loc;

/// The classification of a runtime diagnostic.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A name declared twice in the same frame, or initialised twice.
    #[error("Redeclaring name {name}.")]
    VariableRedeclaration { name: String },

    /// A name referenced between its declaration and its initialisation.
    #[error("Name {name} not yet assigned.")]
    UnassignedVariable { name: String },

    /// A name with no binding anywhere on the environment chain.
    #[error("Name {name} not declared.")]
    UndefinedVariable { name: String },

    /// A type reference with no binding anywhere on the environment chain.
    #[error("Type {name} not declared.")]
    UndefinedType { name: String },

    /// A function-type position missing its annotation.
    #[error("{subject} is missing a type annotation.")]
    MissingTypeAnnotation { subject: String },

    /// A value whose runtime type does not match what its position
    /// requires. `side` describes the position, e.g. `" as condition"` or
    /// `" as argument 1"`.
    #[error("Expected {expected}{side}, got {actual}.")]
    Type {
        side: String,
        expected: String,
        actual: String,
    },

    #[error("Expected {expected} arguments, but got {actual}.")]
    InvalidNumberOfArguments { expected: usize, actual: usize },

    #[error("Expected {expected} type arguments, but got {actual}.")]
    InvalidNumberOfTypeArguments { expected: usize, actual: usize },

    #[error("Calling non-function value {value}.")]
    CallingNonFunctionValue { value: String },

    /// A non-diagnostic failure raised inside a host callable, re-tagged
    /// at the call-site boundary.
    #[error("Exception during call: {message}")]
    Exception { message: String },

    /// A syntax construct the language intentionally omits.
    #[error("{construct} are not supported.")]
    UnsupportedConstruct { construct: String },
}

/// A located, classified runtime diagnostic.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("[line {}] Error: {kind}", location.line)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub location: Loc,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, location: Loc) -> Self {
        info!("Creating runtime error at line {}: {}", location.line, kind);

        Self { kind, location }
    }

    /// Helper constructor for type mismatches.
    pub fn type_error<S, E, A>(location: Loc, side: S, expected: E, actual: A) -> Self
    where
        S: Into<String>,
        E: Into<String>,
        A: Into<String>,
    {
        Self::new(
            ErrorKind::Type {
                side: side.into(),
                expected: expected.into(),
                actual: actual.into(),
            },
            location,
        )
    }

    /// Helper constructor for rejected constructs.
    pub fn unsupported<S: Into<String>>(location: Loc, construct: S) -> Self {
        Self::new(
            ErrorKind::UnsupportedConstruct {
                construct: construct.into(),
            },
            location,
        )
    }
}

/// Crate-wide `Result` alias for evaluation and type checking.
pub type EvalResult<T> = std::result::Result<T, RuntimeError>;
