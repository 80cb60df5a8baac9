//! The execution context a driving harness owns for the lifetime of a
//! run: the collected diagnostics, the stack of active environments, the
//! stack of currently visited nodes, and the outer-boundary counter that
//! tells error recovery how far to unwind.
//!
//! Everything here is explicit state threaded through the evaluator; the
//! core has no module-level mutable state.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info};

use crate::ast::Loc;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::value::TypedValue;

pub struct Context {
    /// Diagnostics collected so far. Cumulative across runs: a REPL driver
    /// keeps errors from earlier entries for reporting.
    pub errors: Vec<RuntimeError>,

    /// Active environments, top of stack last. The bottom
    /// `outer_environments` entries survive error truncation.
    environments: Vec<Rc<RefCell<Environment>>>,

    /// Locations of the nodes currently being visited, innermost last.
    /// Purely a diagnostic aid.
    visiting: Vec<Loc>,

    /// How many environments belong to pre-existing (global or
    /// REPL-persisted) scope.
    outer_environments: usize,
}

impl Context {
    /// Creates a context with a single root environment named `global`.
    pub fn new() -> Self {
        info!("Initializing execution context");

        let global = Rc::new(RefCell::new(Environment::new("global")));

        Self {
            errors: Vec::new(),
            environments: vec![global],
            visiting: Vec::new(),
            outer_environments: 1,
        }
    }

    /// Installs a host value (typically a native function) directly into
    /// the root environment.
    pub fn define_builtin(&mut self, name: &str, value: TypedValue) {
        debug!("Defining builtin '{}'", name);

        self.environments[0].borrow_mut().bind(name, value);
    }

    pub fn current_environment(&self) -> Rc<RefCell<Environment>> {
        Rc::clone(
            self.environments
                .last()
                .expect("environment stack is never empty"),
        )
    }

    pub fn push_environment(&mut self, env: Rc<RefCell<Environment>>) {
        debug!(
            "Pushing environment '{}' (depth {})",
            env.borrow().name,
            self.environments.len() + 1
        );

        self.environments.push(env);
    }

    pub fn pop_environment(&mut self) -> Option<Rc<RefCell<Environment>>> {
        let popped = self.environments.pop();

        if let Some(env) = &popped {
            debug!(
                "Popped environment '{}' (depth {})",
                env.borrow().name,
                self.environments.len()
            );
        }

        popped
    }

    /// Swaps the top-of-stack environment in place. This is the trampoline
    /// step that keeps tail calls at constant stack growth.
    pub fn replace_environment(&mut self, env: Rc<RefCell<Environment>>) {
        debug!("Replacing top environment with '{}'", env.borrow().name);

        let top = self
            .environments
            .last_mut()
            .expect("environment stack is never empty");

        *top = env;
    }

    pub fn environment_depth(&self) -> usize {
        self.environments.len()
    }

    /// Marks the current top of stack as outer scope, exempting it from
    /// error truncation. The program environment is marked this way so its
    /// bindings persist for subsequent runs.
    pub fn mark_outer(&mut self) {
        self.outer_environments += 1;
    }

    pub fn visit(&mut self, loc: Loc) {
        self.visiting.push(loc);
    }

    pub fn leave(&mut self) {
        self.visiting.pop();
    }

    /// The location of the innermost node currently being visited.
    pub fn current_node(&self) -> Option<Loc> {
        self.visiting.last().copied()
    }

    /// Records a diagnostic and truncates the environment stack back to
    /// the outer boundary, so a caller that catches the failure sees a
    /// consistent stack. Returns the error for immediate propagation.
    pub fn raise(&mut self, error: RuntimeError) -> RuntimeError {
        info!("Raising diagnostic: {}", error);

        self.errors.push(error.clone());
        self.unwind();

        error
    }

    /// Truncates to the outer boundary without recording anything. Used
    /// when re-raising a diagnostic that was already recorded.
    pub fn unwind(&mut self) {
        self.environments.truncate(self.outer_environments);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
