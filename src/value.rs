//! Runtime values and the typed-value pairing produced by every
//! evaluation step.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Expr;
use crate::closure::Closure;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::types::RuntimeType;

/// What a host callable returns: a plain value (tagged by the evaluator at
/// the boundary) or a failure.
pub type NativeResult = std::result::Result<Value, NativeError>;

/// Failure raised inside a host callable.
///
/// `Runtime` carries a diagnostic that was already recorded (a builtin
/// called back into a user function, which failed); the evaluator
/// re-raises it unchanged. `Message` is a foreign failure and gets wrapped
/// as an exception diagnostic tagged with the call-site location.
#[derive(Debug, Clone)]
pub enum NativeError {
    Runtime(RuntimeError),
    Message(String),
}

impl From<RuntimeError> for NativeError {
    fn from(error: RuntimeError) -> Self {
        NativeError::Runtime(error)
    }
}

impl From<String> for NativeError {
    fn from(message: String) -> Self {
        NativeError::Message(message)
    }
}

impl From<&str> for NativeError {
    fn from(message: &str) -> Self {
        NativeError::Message(message.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),

    String(String),

    Bool(bool),

    Undefined,

    /// A user-defined function bundling its code and captured environment.
    Closure(Rc<Closure>),

    /// A host-provided callable. Receives already-forced arguments.
    NativeFunction {
        name: String,
        arity: usize,
        /// When set, the arity is a minimum rather than an exact count.
        var_args: bool,
        func: fn(&[TypedValue]) -> NativeResult,
    },

    /// A deferred computation. See [`Thunk`].
    Thunk(Rc<Thunk>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,

            (Value::String(a), Value::String(b)) => a == b,

            (Value::Bool(a), Value::Bool(b)) => a == b,

            (Value::Undefined, Value::Undefined) => true,

            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),

            (Value::Thunk(a), Value::Thunk(b)) => Rc::ptr_eq(a, b),

            (
                Value::NativeFunction { name: a, func: f, .. },
                Value::NativeFunction { name: b, func: g, .. },
            ) => a == b && f == g,

            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::String(s) => write!(f, "{}", s),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Undefined => write!(f, "undefined"),

            Value::Closure(closure) => write!(f, "{}", closure),

            Value::NativeFunction { name, .. } => write!(f, "<native fn {}>", name),

            Value::Thunk(_) => write!(f, "<thunk>"),
        }
    }
}

/// A value paired with its runtime type. Every evaluation step produces
/// one; every type check consumes one.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub rtype: RuntimeType,
    pub value: Value,
}

impl TypedValue {
    pub fn new(rtype: RuntimeType, value: Value) -> Self {
        Self { rtype, value }
    }

    pub fn undefined() -> Self {
        Self::new(RuntimeType::Undefined, Value::Undefined)
    }

    pub fn number(n: f64) -> Self {
        Self::new(RuntimeType::Number, Value::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(RuntimeType::String, Value::String(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        Self::new(RuntimeType::Boolean, Value::Bool(b))
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A deferred, memoizable computation: an expression plus the environment
/// to evaluate it in.
///
/// Forced at most once; the second force returns the cached value without
/// touching the environment stack. No supported construct currently
/// produces one, but the force step runs after every operand, argument,
/// test and initializer evaluation, so a host extension that injects
/// thunks gets lazy semantics for free.
pub struct Thunk {
    pub exp: Rc<Expr>,
    pub env: Rc<RefCell<Environment>>,
    pub memo: RefCell<Option<TypedValue>>,
}

impl fmt::Debug for Thunk {
    /// Shallow on purpose: the saved environment can reach this thunk
    /// again through a captured frame.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("memoized", &self.is_memoized())
            .finish()
    }
}

impl Thunk {
    pub fn new(exp: Rc<Expr>, env: Rc<RefCell<Environment>>) -> Self {
        Self {
            exp,
            env,
            memo: RefCell::new(None),
        }
    }

    pub fn is_memoized(&self) -> bool {
        self.memo.borrow().is_some()
    }
}
