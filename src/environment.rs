//! Lexical environments: one [`Frame`] of bindings per scope, chained to
//! the enclosing scope by a shared parent handle.
//!
//! A binding goes through two states: declaration installs the
//! [`Binding::Declared`] sentinel in the current frame, and definition
//! overwrites it with a concrete value. Lookups never leak the sentinel to
//! callers; finding one is an `UnassignedVariable` diagnostic.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::ast::Loc;
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::types::RuntimeType;
use crate::value::TypedValue;

/// The state of one name slot in a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Declared but not yet assigned.
    Declared,
    Initialized(TypedValue),
}

/// One scope's bindings: values and types live in separate maps because a
/// call frame binds both parameters and type parameters.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub values: HashMap<String, Binding>,
    pub types: HashMap<String, RuntimeType>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct Environment {
    /// Diagnostic label: `global`, `program`, `block`, `function body` or
    /// the called function's display name.
    pub name: String,
    pub head: Frame,
    pub tail: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Environment {
            name: name.into(),
            head: Frame::new(),
            tail: None,
        }
    }

    pub fn with_tail(name: impl Into<String>, tail: Rc<RefCell<Environment>>) -> Self {
        Environment {
            name: name.into(),
            head: Frame::new(),
            tail: Some(tail),
        }
    }

    /// Installs the declared-not-yet-assigned sentinel in this frame.
    /// Fails if the name already exists here; shadowing an ancestor
    /// binding is fine.
    pub fn declare(&mut self, name: &str, loc: Loc) -> EvalResult<()> {
        if self.head.values.contains_key(name) {
            return Err(RuntimeError::new(
                ErrorKind::VariableRedeclaration {
                    name: name.to_string(),
                },
                loc,
            ));
        }

        debug!("Declaring '{}' in environment '{}'", name, self.name);

        self.head.values.insert(name.to_string(), Binding::Declared);

        Ok(())
    }

    /// Overwrites the sentinel with a concrete value. Any other slot state
    /// (missing, or already initialised) is a redeclaration.
    pub fn define(&mut self, name: &str, value: TypedValue, loc: Loc) -> EvalResult<()> {
        match self.head.values.get(name) {
            Some(Binding::Declared) => {
                debug!("Defining '{}' in environment '{}'", name, self.name);

                self.head
                    .values
                    .insert(name.to_string(), Binding::Initialized(value));

                Ok(())
            }

            _ => Err(RuntimeError::new(
                ErrorKind::VariableRedeclaration {
                    name: name.to_string(),
                },
                loc,
            )),
        }
    }

    /// Direct insertion, bypassing the declare/define protocol. Used for
    /// call-frame parameters and host-installed builtins.
    pub fn bind(&mut self, name: impl Into<String>, value: TypedValue) {
        self.head.values.insert(name.into(), Binding::Initialized(value));
    }

    /// Binds a name in the types map: a call frame's type parameters, or a
    /// host-installed type alias.
    pub fn bind_type(&mut self, name: impl Into<String>, rtype: RuntimeType) {
        self.head.types.insert(name.into(), rtype);
    }
}

/// Walks the parent chain from `env` outward; the first frame containing
/// `name` answers. The sentinel is intercepted as `UnassignedVariable`;
/// exhausting the chain is `UndefinedVariable`.
pub fn lookup_value(
    env: &Rc<RefCell<Environment>>,
    name: &str,
    loc: Loc,
) -> EvalResult<TypedValue> {
    let mut current = Rc::clone(env);

    loop {
        let next = {
            let env_ref = current.borrow();

            match env_ref.head.values.get(name) {
                Some(Binding::Initialized(value)) => {
                    debug!("Resolved '{}' in environment '{}'", name, env_ref.name);

                    return Ok(value.clone());
                }

                Some(Binding::Declared) => {
                    return Err(RuntimeError::new(
                        ErrorKind::UnassignedVariable {
                            name: name.to_string(),
                        },
                        loc,
                    ));
                }

                None => match &env_ref.tail {
                    Some(tail) => Rc::clone(tail),

                    None => {
                        return Err(RuntimeError::new(
                            ErrorKind::UndefinedVariable {
                                name: name.to_string(),
                            },
                            loc,
                        ));
                    }
                },
            }
        };

        current = next;
    }
}

/// Types-map analogue of [`lookup_value`], failing with `UndefinedType`.
pub fn lookup_type(
    env: &Rc<RefCell<Environment>>,
    name: &str,
    loc: Loc,
) -> EvalResult<RuntimeType> {
    let mut current = Rc::clone(env);

    loop {
        let next = {
            let env_ref = current.borrow();

            match env_ref.head.types.get(name) {
                Some(rtype) => return Ok(rtype.clone()),

                None => match &env_ref.tail {
                    Some(tail) => Rc::clone(tail),

                    None => {
                        return Err(RuntimeError::new(
                            ErrorKind::UndefinedType {
                                name: name.to_string(),
                            },
                            loc,
                        ));
                    }
                },
            }
        };

        current = next;
    }
}
