//! The evaluator: an explicit machine over a control stack and a result
//! stack.
//!
//! Each [`Machine::step`] pops one instruction, does a bounded amount of
//! work, and pushes continuations back onto the control stack, so a
//! driver can interleave evaluation with other work or inspect the
//! context between steps. Recursion in the evaluated program never
//! becomes recursion in the host: calls grow the machine's own stacks.
//!
//! Calls in tail position do not even grow those. A `return` whose
//! expression bottoms out in a call produces a [`Completion::TailCall`]
//! instead of entering the callee; the frame waiting on the body catches
//! it and re-enters `apply` with the current call environment *replaced*
//! rather than pushed. A self- or mutually-recursive function written
//! with tail calls runs in constant environment depth.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::debug;

use crate::ast::{
    BinaryOp, Block, DeclKind, Expr, Function, FunctionBody, Literal, Loc, LogicalOp, Param,
    Program, Stmt, TypeAnnotation, UnaryOp,
};
use crate::closure::Closure;
use crate::context::Context;
use crate::environment::{lookup_value, Environment};
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::rttc;
use crate::types::{FunctionType, RuntimeType};
use crate::value::{NativeError, Thunk, TypedValue, Value};

/// What a finished evaluation produced and how it should propagate.
///
/// `Value` is an ordinary result. `Return` is the signal raised by a
/// `return` statement; sequencing stops forwarding it until the frame
/// that entered the function body consumes it. `TailCall` is a call the
/// machine deferred because it sits in tail position.
#[derive(Debug)]
pub enum Completion {
    Value(TypedValue),
    Return(TypedValue),
    TailCall(TailCall),

    /// Signal kinds reserved for loop constructs. The surface statements
    /// are rejected today, so no evaluation rule produces them, but
    /// sequencing treats them as signals like any other.
    Break,
    Continue,
}

/// A deferred tail call: everything `apply` needs, fully evaluated, with
/// the actual entry postponed until the current call frame can be reused.
#[derive(Debug)]
pub struct TailCall {
    pub callee: TypedValue,
    pub args: Vec<TypedValue>,
    pub type_args: Vec<RuntimeType>,
    pub loc: Loc,
}

/// The outcome of one machine step.
#[derive(Debug)]
pub enum StepOutcome {
    Running,
    Done(TypedValue),
}

/// How a failing step left the context: a fresh error still has to be
/// recorded and unwound; one re-raised out of a host callable was
/// recorded when it first happened.
enum Failure {
    Fresh(RuntimeError),
    Recorded(RuntimeError),
}

impl From<RuntimeError> for Failure {
    fn from(error: RuntimeError) -> Self {
        Failure::Fresh(error)
    }
}

/// One pending piece of work on the control stack.
#[derive(Debug)]
enum Instr {
    /// Evaluate an expression; leaves one completion on the result stack.
    Eval(Rc<Expr>),

    /// Execute a statement; leaves one completion on the result stack.
    Exec(Rc<Stmt>),

    /// Pop the visited-node stack.
    Leave,

    /// Force the completion on top of the result stack if it is a thunk.
    Force,

    /// Store the forced value into a thunk's memo slot and pop the
    /// thunk's environment.
    MemoizeThunk { thunk: Rc<Thunk> },

    /// Set up the program environment and schedule the top-level block.
    EnterProgram(Rc<Block>),

    /// Run the remaining statements of a block, stopping at signals. The
    /// prior statement's completion is on the result stack.
    Seq { remaining: VecDeque<Rc<Stmt>> },

    /// Pop the environment a block statement pushed.
    ExitBlock,

    /// Apply a unary operator to the value on the result stack.
    Unary { op: UnaryOp, loc: Loc },

    /// The left operand is on the result stack; evaluate the right.
    BinaryRight {
        op: BinaryOp,
        right: Rc<Expr>,
        loc: Loc,
    },

    /// Both operands evaluated; type-check and compute.
    BinaryApply {
        op: BinaryOp,
        left: TypedValue,
        loc: Loc,
    },

    /// Branch of a conditional expression on the tested value.
    BranchExpr {
        consequent: Rc<Expr>,
        alternate: Rc<Expr>,
        loc: Loc,
    },

    /// Branch of an `if` statement on the tested value.
    BranchStmt {
        consequent: Rc<Stmt>,
        alternate: Option<Rc<Stmt>>,
        loc: Loc,
    },

    /// Define a declared variable from the initializer's value.
    DefineVariable { id: Param, loc: Loc },

    /// Rewrite a return expression until its tail shape is known:
    /// logicals become conditionals, conditionals branch and reduce
    /// again, calls become tail calls, anything else evaluates normally.
    ReduceReturn { expression: Rc<Expr> },

    /// Branch of a return conditional; the selected arm reduces again.
    ReturnBranch {
        consequent: Rc<Expr>,
        alternate: Rc<Expr>,
        loc: Loc,
    },

    /// Wrap the value on the result stack as a return signal.
    WrapReturn,

    /// The callee is evaluated; evaluate the arguments left to right.
    CalleeReady {
        arguments: Vec<Rc<Expr>>,
        type_args: Option<Vec<TypeAnnotation>>,
        loc: Loc,
        tail: bool,
    },

    /// One argument just finished; collect it and continue.
    CollectArg {
        callee: TypedValue,
        remaining: VecDeque<Rc<Expr>>,
        collected: Vec<TypedValue>,
        type_args: Option<Vec<TypeAnnotation>>,
        loc: Loc,
        tail: bool,
    },

    /// Enter a callable with fully evaluated arguments.
    Apply(ApplyFrame),

    /// Waiting on a function body: catches tail calls and return
    /// signals, checks the return type, and pops the call environments.
    ApplyBody {
        ftype: Rc<FunctionType>,
        loc: Loc,
        pushed: usize,
    },
}

/// The state `apply` carries across the tail-call trampoline.
#[derive(Debug)]
struct ApplyFrame {
    callee: TypedValue,
    args: Vec<TypedValue>,
    type_args: Vec<RuntimeType>,
    loc: Loc,

    /// Entering from a tail call: reuse the current call environment
    /// instead of pushing a new one.
    tail_entry: bool,

    /// Environments pushed by this call chain, popped when it produces a
    /// value.
    pushed: usize,
}

/// The explicit evaluation state: pending work and produced completions.
pub struct Machine {
    control: Vec<Instr>,
    results: Vec<Completion>,
}

impl Machine {
    /// A machine that will evaluate a whole program in the context's
    /// current scope. The program's own environment is marked outer and
    /// survives the run, so successive programs accumulate bindings.
    pub fn for_program(program: &Program) -> Self {
        Self {
            control: vec![Instr::EnterProgram(Rc::clone(&program.body))],
            results: Vec::new(),
        }
    }

    fn for_apply(frame: ApplyFrame) -> Self {
        Self {
            control: vec![Instr::Apply(frame)],
            results: Vec::new(),
        }
    }

    /// Performs one step. A fresh error is recorded in the context and
    /// the environment stack is unwound to the outer boundary before the
    /// error is returned.
    pub fn step(&mut self, ctx: &mut Context) -> EvalResult<StepOutcome> {
        match self.advance(ctx) {
            Ok(outcome) => Ok(outcome),

            Err(Failure::Fresh(error)) => Err(ctx.raise(error)),

            Err(Failure::Recorded(error)) => {
                ctx.unwind();

                Err(error)
            }
        }
    }

    /// Steps to completion.
    pub fn run(&mut self, ctx: &mut Context) -> EvalResult<TypedValue> {
        loop {
            if let StepOutcome::Done(value) = self.step(ctx)? {
                return Ok(value);
            }
        }
    }

    fn advance(&mut self, ctx: &mut Context) -> Result<StepOutcome, Failure> {
        let Some(instr) = self.control.pop() else {
            return Ok(StepOutcome::Done(self.final_value()));
        };

        match instr {
            Instr::Eval(expr) => self.eval(ctx, expr)?,

            Instr::Exec(stmt) => self.exec(ctx, stmt)?,

            Instr::Leave => ctx.leave(),

            Instr::Force => self.force_top(ctx),

            Instr::MemoizeThunk { thunk } => {
                let value = self.pop_value();

                *thunk.memo.borrow_mut() = Some(value.clone());
                ctx.pop_environment();

                self.results.push(Completion::Value(value));
            }

            Instr::EnterProgram(body) => {
                let env = Rc::new(RefCell::new(Environment::with_tail(
                    "program",
                    ctx.current_environment(),
                )));

                ctx.mark_outer();
                ctx.push_environment(env);

                self.schedule_block(ctx, &body)?;
            }

            Instr::Seq { mut remaining } => {
                let previous = self
                    .results
                    .pop()
                    .expect("a sequence always follows a completion");

                match previous {
                    // Signals stop the sequence and keep propagating.
                    signal @ (Completion::Return(_)
                    | Completion::TailCall(_)
                    | Completion::Break
                    | Completion::Continue) => {
                        self.results.push(signal);
                    }

                    value @ Completion::Value(_) => match remaining.pop_front() {
                        // The value of a block is its last statement's value.
                        None => self.results.push(value),

                        Some(stmt) => {
                            self.control.push(Instr::Seq { remaining });
                            self.control.push(Instr::Exec(stmt));
                        }
                    },
                }
            }

            Instr::ExitBlock => {
                ctx.pop_environment();
            }

            Instr::Unary { op, loc } => {
                let value = self.pop_value();

                rttc::check_unary_expression(loc, op, &value)?;

                let result = match (op, &value.value) {
                    (UnaryOp::Minus, Value::Number(n)) => TypedValue::number(-n),
                    (UnaryOp::Plus, Value::Number(n)) => TypedValue::number(*n),
                    (UnaryOp::Not, Value::Bool(b)) => TypedValue::bool(!b),

                    _ => {
                        let expected = if op == UnaryOp::Not { "boolean" } else { "number" };

                        return Err(RuntimeError::type_error(
                            loc,
                            "",
                            expected,
                            value.rtype.to_string(),
                        )
                        .into());
                    }
                };

                self.results.push(Completion::Value(result));
            }

            Instr::BinaryRight { op, right, loc } => {
                let left = self.pop_value();

                self.control.push(Instr::BinaryApply { op, left, loc });
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(right));
            }

            Instr::BinaryApply { op, left, loc } => {
                let right = self.pop_value();

                rttc::check_binary_expression(loc, op, &left, &right)?;

                let result = apply_binary(op, &left, &right, loc)?;

                self.results.push(Completion::Value(result));
            }

            Instr::BranchExpr {
                consequent,
                alternate,
                loc,
            } => {
                let test = self.pop_value();

                rttc::check_condition(loc, &test)?;

                let branch = if test.value == Value::Bool(true) {
                    consequent
                } else {
                    alternate
                };

                self.control.push(Instr::Eval(branch));
            }

            Instr::BranchStmt {
                consequent,
                alternate,
                loc,
            } => {
                let test = self.pop_value();

                rttc::check_condition(loc, &test)?;

                if test.value == Value::Bool(true) {
                    self.control.push(Instr::Exec(consequent));
                } else if let Some(alternate) = alternate {
                    self.control.push(Instr::Exec(alternate));
                } else {
                    self.results
                        .push(Completion::Value(TypedValue::undefined()));
                }
            }

            Instr::DefineVariable { id, loc } => {
                let value = self.pop_value();

                let env = ctx.current_environment();

                rttc::check_variable_declaration(loc, &id, &value, &env)?;

                env.borrow_mut().define(&id.name, value, loc)?;

                self.results
                    .push(Completion::Value(TypedValue::undefined()));
            }

            Instr::ReduceReturn { expression } => {
                self.reduce_return(expression);
            }

            Instr::ReturnBranch {
                consequent,
                alternate,
                loc,
            } => {
                let test = self.pop_value();

                rttc::check_condition(loc, &test)?;

                let branch = if test.value == Value::Bool(true) {
                    consequent
                } else {
                    alternate
                };

                self.control
                    .push(Instr::ReduceReturn { expression: branch });
            }

            Instr::WrapReturn => {
                let value = self.pop_value();

                self.results.push(Completion::Return(value));
            }

            Instr::CalleeReady {
                arguments,
                type_args,
                loc,
                tail,
            } => {
                let callee = self.pop_value();

                // A non-callable is reported before any argument runs.
                rttc::check_callee(loc, &callee)?;

                let mut remaining: VecDeque<Rc<Expr>> = arguments.into_iter().collect();

                match remaining.pop_front() {
                    None => self.finish_call(ctx, callee, Vec::new(), type_args, loc, tail)?,

                    Some(first) => {
                        self.control.push(Instr::CollectArg {
                            callee,
                            remaining,
                            collected: Vec::new(),
                            type_args,
                            loc,
                            tail,
                        });
                        self.control.push(Instr::Force);
                        self.control.push(Instr::Eval(first));
                    }
                }
            }

            Instr::CollectArg {
                callee,
                mut remaining,
                mut collected,
                type_args,
                loc,
                tail,
            } => {
                collected.push(self.pop_value());

                match remaining.pop_front() {
                    None => self.finish_call(ctx, callee, collected, type_args, loc, tail)?,

                    Some(next) => {
                        self.control.push(Instr::CollectArg {
                            callee,
                            remaining,
                            collected,
                            type_args,
                            loc,
                            tail,
                        });
                        self.control.push(Instr::Force);
                        self.control.push(Instr::Eval(next));
                    }
                }
            }

            Instr::Apply(frame) => self.apply(ctx, frame)?,

            Instr::ApplyBody { ftype, loc, pushed } => {
                let completion = self
                    .results
                    .pop()
                    .expect("a body frame always follows a completion");

                match completion {
                    // Reuse this frame's environment for the deferred call.
                    Completion::TailCall(tc) => {
                        debug!("Tail call at {} reusing the current frame", tc.loc);

                        self.control.push(Instr::Apply(ApplyFrame {
                            callee: tc.callee,
                            args: tc.args,
                            type_args: tc.type_args,
                            loc: tc.loc,
                            tail_entry: true,
                            pushed,
                        }));
                    }

                    other => {
                        // Falling off the end of the body returns undefined.
                        let result = match other {
                            Completion::Return(value) => value,
                            _ => TypedValue::undefined(),
                        };

                        rttc::check_type_of_return_value(
                            loc,
                            &ftype,
                            &result,
                            &ctx.current_environment(),
                        )?;

                        for _ in 0..pushed {
                            ctx.pop_environment();
                        }

                        self.results.push(Completion::Value(result));
                    }
                }
            }
        }

        Ok(StepOutcome::Running)
    }

    fn eval(&mut self, ctx: &mut Context, expr: Rc<Expr>) -> Result<(), Failure> {
        ctx.visit(expr.loc());
        self.control.push(Instr::Leave);

        match &*expr {
            Expr::Literal { value, .. } => {
                self.results.push(Completion::Value(typed_literal(value)));
            }

            Expr::Identifier { name, loc } => {
                let value = lookup_value(&ctx.current_environment(), name, *loc)?;

                self.results.push(Completion::Value(value));
            }

            Expr::Unary { op, argument, loc } => {
                self.control.push(Instr::Unary { op: *op, loc: *loc });
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(Rc::clone(argument)));
            }

            Expr::Binary {
                op,
                left,
                right,
                loc,
            } => {
                self.control.push(Instr::BinaryRight {
                    op: *op,
                    right: Rc::clone(right),
                    loc: *loc,
                });
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(Rc::clone(left)));
            }

            // Short-circuit operators only occur where `return` can
            // rewrite them into conditionals.
            Expr::Logical { loc, .. } => {
                return Err(RuntimeError::unsupported(
                    *loc,
                    "Logical expressions outside return statements",
                )
                .into());
            }

            Expr::Conditional {
                test,
                consequent,
                alternate,
                loc,
            } => {
                self.control.push(Instr::BranchExpr {
                    consequent: Rc::clone(consequent),
                    alternate: Rc::clone(alternate),
                    loc: *loc,
                });
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(Rc::clone(test)));
            }

            Expr::Call {
                callee,
                arguments,
                type_args,
                loc,
            } => {
                self.control.push(Instr::CalleeReady {
                    arguments: arguments.clone(),
                    type_args: type_args.clone(),
                    loc: *loc,
                    tail: false,
                });
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(Rc::clone(callee)));
            }

            Expr::Function(function) => {
                let closure = make_closure(ctx, function)?;

                self.results.push(Completion::Value(closure.typed()));
            }

            Expr::Array { loc, .. } => {
                return Err(RuntimeError::unsupported(*loc, "Array expressions").into());
            }

            Expr::Object { loc } => {
                return Err(RuntimeError::unsupported(*loc, "Object expressions").into());
            }

            Expr::Member { loc, .. } => {
                return Err(RuntimeError::unsupported(*loc, "Member access expressions").into());
            }

            Expr::Assignment { loc, .. } => {
                return Err(RuntimeError::unsupported(*loc, "Assignment expressions").into());
            }

            Expr::New { loc, .. } => {
                return Err(RuntimeError::unsupported(*loc, "New expressions").into());
            }
        }

        Ok(())
    }

    fn exec(&mut self, ctx: &mut Context, stmt: Rc<Stmt>) -> Result<(), Failure> {
        ctx.visit(stmt.loc());
        self.control.push(Instr::Leave);

        match &*stmt {
            Stmt::Expression { expression, .. } => {
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(Rc::clone(expression)));
            }

            Stmt::Declaration {
                kind,
                id,
                init,
                loc,
            } => {
                match kind {
                    DeclKind::Const => {}

                    DeclKind::Let => {
                        return Err(RuntimeError::unsupported(*loc, "Let declarations").into());
                    }

                    DeclKind::Var => {
                        return Err(RuntimeError::unsupported(*loc, "Var declarations").into());
                    }
                }

                let Some(init) = init else {
                    return Err(RuntimeError::unsupported(
                        *loc,
                        "Declarations without initializers",
                    )
                    .into());
                };

                self.control.push(Instr::DefineVariable {
                    id: id.clone(),
                    loc: *loc,
                });
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(Rc::clone(init)));
            }

            Stmt::FunctionDeclaration(function) => {
                let Some(name) = &function.name else {
                    return Err(RuntimeError::unsupported(
                        function.loc,
                        "Anonymous function declarations",
                    )
                    .into());
                };

                let closure = make_closure(ctx, function)?;

                ctx.current_environment().borrow_mut().define(
                    name,
                    closure.typed(),
                    function.loc,
                )?;

                self.results
                    .push(Completion::Value(TypedValue::undefined()));
            }

            Stmt::Return { argument, .. } => match argument {
                None => {
                    self.results
                        .push(Completion::Return(TypedValue::undefined()));
                }

                Some(expression) => {
                    self.control.push(Instr::ReduceReturn {
                        expression: Rc::clone(expression),
                    });
                }
            },

            Stmt::If {
                test,
                consequent,
                alternate,
                loc,
            } => {
                self.control.push(Instr::BranchStmt {
                    consequent: Rc::clone(consequent),
                    alternate: alternate.clone(),
                    loc: *loc,
                });
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(Rc::clone(test)));
            }

            Stmt::Block(block) => {
                let env = Rc::new(RefCell::new(Environment::with_tail(
                    "block",
                    ctx.current_environment(),
                )));

                ctx.push_environment(env);

                self.control.push(Instr::ExitBlock);
                self.schedule_block(ctx, block)?;
            }

            Stmt::Debugger { .. } => {
                // A no-op suspension point; the step boundary is the pause.
                self.results
                    .push(Completion::Value(TypedValue::undefined()));
            }

            Stmt::While { loc, .. } => {
                return Err(RuntimeError::unsupported(*loc, "While loops").into());
            }

            Stmt::For { loc } => {
                return Err(RuntimeError::unsupported(*loc, "For loops").into());
            }

            Stmt::Break { loc } => {
                return Err(RuntimeError::unsupported(*loc, "Break statements").into());
            }

            Stmt::Continue { loc } => {
                return Err(RuntimeError::unsupported(*loc, "Continue statements").into());
            }

            Stmt::Import { loc } => {
                return Err(RuntimeError::unsupported(*loc, "Import statements").into());
            }
        }

        Ok(())
    }

    /// Hoists the block's declarations into the current environment and
    /// schedules its statements. Functions and variables are declared
    /// before any statement runs, so a reference ahead of its
    /// initializer fails as unassigned rather than undeclared.
    fn schedule_block(&mut self, ctx: &mut Context, block: &Rc<Block>) -> Result<(), Failure> {
        let env = ctx.current_environment();

        for stmt in &block.statements {
            match &**stmt {
                Stmt::Declaration { id, loc, .. } => {
                    env.borrow_mut().declare(&id.name, *loc)?;
                }

                Stmt::FunctionDeclaration(function) => {
                    if let Some(name) = &function.name {
                        env.borrow_mut().declare(name, function.loc)?;
                    }
                }

                _ => {}
            }
        }

        self.results
            .push(Completion::Value(TypedValue::undefined()));
        self.control.push(Instr::Seq {
            remaining: block.statements.iter().cloned().collect(),
        });

        Ok(())
    }

    /// Rewrites a return expression toward its tail shape: a logical
    /// operator becomes the conditional it abbreviates, a conditional
    /// tests and reduces the selected arm, a call becomes a deferred
    /// tail call, and anything else evaluates as an ordinary return.
    fn reduce_return(&mut self, expression: Rc<Expr>) {
        let mut expr = expression;

        loop {
            match &*expr {
                Expr::Logical {
                    op,
                    left,
                    right,
                    loc,
                } => {
                    expr = desugar_logical(*op, left, right, *loc);
                }

                Expr::Conditional {
                    test,
                    consequent,
                    alternate,
                    loc,
                } => {
                    self.control.push(Instr::ReturnBranch {
                        consequent: Rc::clone(consequent),
                        alternate: Rc::clone(alternate),
                        loc: *loc,
                    });
                    self.control.push(Instr::Force);
                    self.control.push(Instr::Eval(Rc::clone(test)));

                    return;
                }

                Expr::Call {
                    callee,
                    arguments,
                    type_args,
                    loc,
                } => {
                    self.control.push(Instr::CalleeReady {
                        arguments: arguments.clone(),
                        type_args: type_args.clone(),
                        loc: *loc,
                        tail: true,
                    });
                    self.control.push(Instr::Force);
                    self.control.push(Instr::Eval(Rc::clone(callee)));

                    return;
                }

                _ => {
                    self.control.push(Instr::WrapReturn);
                    self.control.push(Instr::Eval(expr));

                    return;
                }
            }
        }
    }

    /// All arguments are evaluated; resolve the type arguments in the
    /// caller's scope and either defer (tail position) or enter `apply`.
    fn finish_call(
        &mut self,
        ctx: &mut Context,
        callee: TypedValue,
        args: Vec<TypedValue>,
        type_args: Option<Vec<TypeAnnotation>>,
        loc: Loc,
        tail: bool,
    ) -> Result<(), Failure> {
        let resolved = rttc::get_type_args(type_args.as_ref(), &ctx.current_environment(), loc)?;

        if tail {
            self.results.push(Completion::TailCall(TailCall {
                callee,
                args,
                type_args: resolved,
                loc,
            }));
        } else {
            self.control.push(Instr::Apply(ApplyFrame {
                callee,
                args,
                type_args: resolved,
                loc,
                tail_entry: false,
                pushed: 0,
            }));
        }

        Ok(())
    }

    /// Enters a callable. For a closure this builds the call environment
    /// (parameters and type parameters bound in one frame) and pushes it
    /// — or, on a tail entry, swaps it in place of the current one —
    /// then schedules the body in a child scope behind an `ApplyBody`
    /// frame. Host callables run to completion immediately.
    fn apply(&mut self, ctx: &mut Context, frame: ApplyFrame) -> Result<(), Failure> {
        rttc::check_callee(frame.loc, &frame.callee)?;

        match &frame.callee.value {
            Value::Closure(closure) => {
                let closure = Rc::clone(closure);

                if frame.args.len() != closure.node.params.len() {
                    return Err(RuntimeError::new(
                        ErrorKind::InvalidNumberOfArguments {
                            expected: closure.node.params.len(),
                            actual: frame.args.len(),
                        },
                        frame.loc,
                    )
                    .into());
                }

                let ftype = Rc::clone(&closure.ftype);

                if frame.type_args.len() != ftype.type_params.len() {
                    return Err(RuntimeError::new(
                        ErrorKind::InvalidNumberOfTypeArguments {
                            expected: ftype.type_params.len(),
                            actual: frame.type_args.len(),
                        },
                        frame.loc,
                    )
                    .into());
                }

                rttc::check_type_of_arguments(
                    frame.loc,
                    &ftype,
                    &frame.args,
                    &frame.type_args,
                    &ctx.current_environment(),
                )?;

                let call_env = Rc::new(RefCell::new(Environment::with_tail(
                    closure.function_name.clone(),
                    Rc::clone(&closure.environment),
                )));

                {
                    let mut env = call_env.borrow_mut();

                    for (param, arg) in closure.node.params.iter().zip(frame.args) {
                        env.bind(param.name.clone(), arg);
                    }

                    for (name, rtype) in ftype.type_params.iter().zip(frame.type_args) {
                        env.bind_type(name.clone(), rtype);
                    }
                }

                let mut pushed = frame.pushed;

                if frame.tail_entry {
                    ctx.replace_environment(call_env);
                } else {
                    ctx.push_environment(call_env);
                    pushed += 1;
                }

                let body = match &closure.node.body {
                    FunctionBody::Block(block) => Rc::clone(block),

                    // Closures are normalized to block bodies on creation.
                    FunctionBody::Expression(_) => {
                        unreachable!("closure bodies are desugared to blocks")
                    }
                };

                self.control.push(Instr::ApplyBody {
                    ftype,
                    loc: frame.loc,
                    pushed,
                });

                // The body declares into a child scope of the call
                // environment, so a body `const` may shadow a parameter.
                // `ExitBlock` pops it before the frame above runs.
                let body_env = Rc::new(RefCell::new(Environment::with_tail(
                    "function body",
                    ctx.current_environment(),
                )));

                ctx.push_environment(body_env);

                self.control.push(Instr::ExitBlock);
                self.schedule_block(ctx, &body)?;
            }

            Value::NativeFunction {
                name,
                arity,
                var_args,
                func,
            } => {
                let enough = if *var_args {
                    frame.args.len() >= *arity
                } else {
                    frame.args.len() == *arity
                };

                if !enough {
                    return Err(RuntimeError::new(
                        ErrorKind::InvalidNumberOfArguments {
                            expected: *arity,
                            actual: frame.args.len(),
                        },
                        frame.loc,
                    )
                    .into());
                }

                debug!("Calling host function '{}'", name);

                let mut forced = Vec::with_capacity(frame.args.len());

                for arg in frame.args {
                    forced.push(force_value(ctx, arg)?);
                }

                let result = match func(&forced) {
                    Ok(value) => value,

                    // Recorded when it was first raised inside the host
                    // callable; do not record it twice.
                    Err(NativeError::Runtime(error)) => {
                        return Err(Failure::Recorded(error));
                    }

                    Err(NativeError::Message(message)) => {
                        return Err(RuntimeError::new(
                            ErrorKind::Exception { message },
                            frame.loc,
                        )
                        .into());
                    }
                };

                // Tag the result at the host boundary; a value the type
                // system cannot describe is a foreign failure.
                let rtype = rttc::type_of(&result).map_err(|message| {
                    RuntimeError::new(ErrorKind::Exception { message }, frame.loc)
                })?;

                for _ in 0..frame.pushed {
                    ctx.pop_environment();
                }

                self.results
                    .push(Completion::Value(TypedValue::new(rtype, result)));
            }

            other => {
                return Err(RuntimeError::new(
                    ErrorKind::CallingNonFunctionValue {
                        value: other.to_string(),
                    },
                    frame.loc,
                )
                .into());
            }
        }

        Ok(())
    }

    /// Forces the completion on top of the result stack if it is an
    /// unmemoized thunk; memoized thunks collapse immediately.
    fn force_top(&mut self, ctx: &mut Context) {
        let is_thunk = matches!(
            self.results.last(),
            Some(Completion::Value(TypedValue {
                value: Value::Thunk(_),
                ..
            }))
        );

        if !is_thunk {
            return;
        }

        let forced = self.pop_value();

        let Value::Thunk(thunk) = forced.value else {
            unreachable!("checked above");
        };

        let memo = thunk.memo.borrow().clone();

        match memo {
            Some(value) => self.results.push(Completion::Value(value)),

            None => {
                ctx.push_environment(Rc::clone(&thunk.env));

                self.control.push(Instr::MemoizeThunk {
                    thunk: Rc::clone(&thunk),
                });
                self.control.push(Instr::Force);
                self.control.push(Instr::Eval(Rc::clone(&thunk.exp)));
            }
        }
    }

    fn pop_value(&mut self) -> TypedValue {
        match self.results.pop() {
            Some(Completion::Value(value)) => value,

            other => unreachable!("value consumers never see signals, got {:?}", other),
        }
    }

    fn final_value(&mut self) -> TypedValue {
        match self.results.pop() {
            Some(Completion::Value(value)) | Some(Completion::Return(value)) => value,

            _ => TypedValue::undefined(),
        }
    }
}

/// Evaluates a whole program in the given context. The program's
/// environment persists in the context after the run, so a driver that
/// evaluates successive programs sees earlier bindings, and earlier
/// diagnostics stay in `ctx.errors`.
pub fn run_program(ctx: &mut Context, program: &Program) -> EvalResult<TypedValue> {
    debug!("Evaluating program");

    Machine::for_program(program).run(ctx)
}

/// Applies a callable to already-evaluated arguments and drives the
/// resulting machine to completion. This is the host-interop entry:
/// builtins that accept callbacks re-enter user code through it.
pub fn apply_fully(
    ctx: &mut Context,
    callee: TypedValue,
    args: Vec<TypedValue>,
    type_args: Vec<RuntimeType>,
    loc: Loc,
) -> EvalResult<TypedValue> {
    Machine::for_apply(ApplyFrame {
        callee,
        args,
        type_args,
        loc,
        tail_entry: false,
        pushed: 0,
    })
    .run(ctx)
}

/// Forces a value outside any running machine, memoizing thunks along
/// the way. Non-thunks pass through untouched.
pub fn force_value(ctx: &mut Context, mut value: TypedValue) -> EvalResult<TypedValue> {
    while let Value::Thunk(thunk) = value.value.clone() {
        let memo = thunk.memo.borrow().clone();

        if let Some(cached) = memo {
            value = cached;
            continue;
        }

        ctx.push_environment(Rc::clone(&thunk.env));

        let mut machine = Machine {
            control: vec![Instr::Force, Instr::Eval(Rc::clone(&thunk.exp))],
            results: Vec::new(),
        };

        let result = machine.run(ctx)?;

        ctx.pop_environment();

        *thunk.memo.borrow_mut() = Some(result.clone());

        value = result;
    }

    Ok(value)
}

fn make_closure(ctx: &mut Context, function: &Rc<Function>) -> EvalResult<Rc<Closure>> {
    let env = ctx.current_environment();

    rttc::check_function_declaration(function, &env)?;

    let ftype = rttc::type_of_function(function, &env)?;

    Ok(Closure::new(function, env, Rc::new(ftype)))
}

fn typed_literal(literal: &Literal) -> TypedValue {
    match literal {
        Literal::Number(n) => TypedValue::number(*n),
        Literal::String(s) => TypedValue::string(s.clone()),
        Literal::Bool(b) => TypedValue::bool(*b),
    }
}

/// `a && b` is `a ? b : false`; `a || b` is `a ? true : b`. The rewrite
/// keeps an operand in tail position callable.
fn desugar_logical(op: LogicalOp, left: &Rc<Expr>, right: &Rc<Expr>, loc: Loc) -> Rc<Expr> {
    let literal = |b: bool| {
        Rc::new(Expr::Literal {
            value: Literal::Bool(b),
            loc,
        })
    };

    match op {
        LogicalOp::And => Rc::new(Expr::Conditional {
            test: Rc::clone(left),
            consequent: Rc::clone(right),
            alternate: literal(false),
            loc,
        }),

        LogicalOp::Or => Rc::new(Expr::Conditional {
            test: Rc::clone(left),
            consequent: literal(true),
            alternate: Rc::clone(right),
            loc,
        }),
    }
}

/// Computes a type-checked binary operation. `===`/`!==` compare values
/// structurally; `/` and `%` follow IEEE semantics, so dividing by zero
/// produces an infinity or NaN rather than a diagnostic.
fn apply_binary(
    op: BinaryOp,
    left: &TypedValue,
    right: &TypedValue,
    loc: Loc,
) -> EvalResult<TypedValue> {
    use Value::{Number, String as Str};

    let result = match (op, &left.value, &right.value) {
        (BinaryOp::Add, Number(a), Number(b)) => TypedValue::number(a + b),
        (BinaryOp::Add, Str(a), Str(b)) => TypedValue::string(format!("{}{}", a, b)),

        (BinaryOp::Sub, Number(a), Number(b)) => TypedValue::number(a - b),
        (BinaryOp::Mul, Number(a), Number(b)) => TypedValue::number(a * b),
        (BinaryOp::Div, Number(a), Number(b)) => TypedValue::number(a / b),
        (BinaryOp::Mod, Number(a), Number(b)) => TypedValue::number(a % b),

        (BinaryOp::Eq, _, _) => TypedValue::bool(left.value == right.value),
        (BinaryOp::NotEq, _, _) => TypedValue::bool(left.value != right.value),

        (BinaryOp::Less, Number(a), Number(b)) => TypedValue::bool(a < b),
        (BinaryOp::Less, Str(a), Str(b)) => TypedValue::bool(a < b),
        (BinaryOp::LessEq, Number(a), Number(b)) => TypedValue::bool(a <= b),
        (BinaryOp::LessEq, Str(a), Str(b)) => TypedValue::bool(a <= b),
        (BinaryOp::Greater, Number(a), Number(b)) => TypedValue::bool(a > b),
        (BinaryOp::Greater, Str(a), Str(b)) => TypedValue::bool(a > b),
        (BinaryOp::GreaterEq, Number(a), Number(b)) => TypedValue::bool(a >= b),
        (BinaryOp::GreaterEq, Str(a), Str(b)) => TypedValue::bool(a >= b),

        _ => {
            return Err(RuntimeError::type_error(
                loc,
                rttc::LHS,
                "string or number",
                left.rtype.to_string(),
            ));
        }
    };

    Ok(result)
}
