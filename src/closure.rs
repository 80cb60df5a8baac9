//! The closure value: a user-defined function bundling its code, its
//! captured lexical environment, and its computed function type.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::ast::{Block, Function, FunctionBody, Stmt};
use crate::context::Context;
use crate::environment::Environment;
use crate::error::EvalResult;
use crate::interpreter;
use crate::printer;
use crate::types::{FunctionType, RuntimeType};
use crate::value::{TypedValue, Value};

pub struct Closure {
    /// The executable form: always block-bodied. Expression-bodied arrows
    /// are desugared to `{ return expr; }` at construction so the
    /// evaluator has one uniform shape to execute.
    pub node: Rc<Function>,

    /// The pre-desugar form, kept for display.
    pub original_node: Rc<Function>,

    /// The defining environment, captured by shared reference. Closures
    /// created in the same scope share one environment instance.
    pub environment: Rc<RefCell<Environment>>,

    /// The declared identifier, or a synthesized `(params) => ...` label
    /// for anonymous functions.
    pub function_name: String,

    /// Computed once at declaration time, after the declaration checks.
    pub ftype: Rc<FunctionType>,
}

impl Closure {
    pub fn new(
        node: &Rc<Function>,
        environment: Rc<RefCell<Environment>>,
        ftype: Rc<FunctionType>,
    ) -> Rc<Self> {
        let function_name = match &node.name {
            Some(name) => name.clone(),
            None => printer::anonymous_label(&node.params),
        };

        debug!("Creating closure '{}'", function_name);

        let executable = match &node.body {
            FunctionBody::Block(_) => Rc::clone(node),

            // Synthesize the single-statement block body so apply can
            // treat every closure the same way.
            FunctionBody::Expression(expression) => {
                let loc = expression.loc();

                let body = Block {
                    statements: vec![Rc::new(Stmt::Return {
                        argument: Some(Rc::clone(expression)),
                        loc,
                    })],
                    loc,
                };

                Rc::new(Function {
                    body: FunctionBody::Block(Rc::new(body)),
                    ..(**node).clone()
                })
            }
        };

        Rc::new(Self {
            node: executable,
            original_node: Rc::clone(node),
            environment,
            function_name,
            ftype,
        })
    }

    /// This closure as a typed value, tagged with its function type.
    pub fn typed(self: &Rc<Self>) -> TypedValue {
        TypedValue::new(
            RuntimeType::Function(Rc::clone(&self.ftype)),
            Value::Closure(Rc::clone(self)),
        )
    }

    /// Host-interop shim: invokes this closure through the same apply path
    /// as ordinary calls and drives the machine to completion, discarding
    /// intermediate suspensions. Lets a host callable call back into user
    /// code without caring which kind of callable it holds.
    pub fn invoke(
        self: &Rc<Self>,
        ctx: &mut Context,
        args: Vec<TypedValue>,
    ) -> EvalResult<TypedValue> {
        debug!("Invoking closure '{}' through the host shim", self.function_name);

        interpreter::apply_fully(ctx, self.typed(), args, Vec::new(), self.node.loc)
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", printer::render_function(&self.original_node))
    }
}

impl fmt::Debug for Closure {
    /// Shallow on purpose: the captured environment can reach this
    /// closure again through its own frame.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.function_name)
            .finish()
    }
}
