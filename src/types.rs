//! Runtime type descriptors.
//!
//! A [`RuntimeType`] is the dynamic counterpart of a static annotation:
//! literals are tagged during evaluation, annotations are converted by
//! [`crate::rttc::convert_to_runtime_type`], and function definitions get
//! a [`FunctionType`] computed once at declaration time.

use serde::Serialize;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RuntimeType {
    Boolean,
    Number,
    String,
    Undefined,

    /// Matches every non-function type. No supported annotation produces
    /// it; host-installed builtins may carry it.
    Any,

    Function(Rc<FunctionType>),

    /// An unresolved reference to a named type: a type parameter or a
    /// type bound elsewhere on the environment chain.
    Name(String),
}

/// The shape of a (possibly generic) function type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionType {
    /// Declared type-parameter names, in declaration order. Positions in
    /// this list are what generic matching compares, not the names.
    pub type_params: Vec<String>,
    pub param_types: Vec<RuntimeType>,
    pub return_type: RuntimeType,
}

impl RuntimeType {
    pub fn function(
        type_params: Vec<String>,
        param_types: Vec<RuntimeType>,
        return_type: RuntimeType,
    ) -> Self {
        RuntimeType::Function(Rc::new(FunctionType {
            type_params,
            param_types,
            return_type,
        }))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, RuntimeType::Function(_))
    }

    pub fn is_name(&self) -> bool {
        matches!(self, RuntimeType::Name(_))
    }
}

impl fmt::Display for RuntimeType {
    /// Renders a type for diagnostics: primitive kinds by name, references
    /// as `type 'T'`, and function types as arrows, with a `<T, U>` prefix
    /// when the function is generic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeType::Boolean => write!(f, "boolean"),

            RuntimeType::Number => write!(f, "number"),

            RuntimeType::String => write!(f, "string"),

            RuntimeType::Undefined => write!(f, "undefined"),

            RuntimeType::Any => write!(f, "any"),

            RuntimeType::Name(name) => write!(f, "type '{}'", name),

            RuntimeType::Function(function) => {
                if !function.type_params.is_empty() {
                    write!(f, "<{}>", function.type_params.join(", "))?;
                }

                let params: Vec<String> = function
                    .param_types
                    .iter()
                    .map(|param| param.to_string())
                    .collect();

                write!(f, "({}) => {}", params.join(", "), function.return_type)
            }
        }
    }
}
