//! End-to-end tests driving the evaluator through the public API, the
//! way an embedding driver would: build a program tree, run it in a
//! context, look at the value and the recorded diagnostics.

use std::rc::Rc;

use pretty_assertions::assert_eq;

use tyro::ast::{
    BinaryOp, Block, DeclKind, Expr, Function, FunctionBody, Literal, LogicalOp, Param, Program,
    Stmt, TypeAnnotation, UNKNOWN_LOCATION,
};
use tyro::context::Context;
use tyro::error::ErrorKind;
use tyro::interpreter::{apply_fully, run_program, Machine, StepOutcome};
use tyro::types::RuntimeType;
use tyro::value::{TypedValue, Value};

fn num(n: f64) -> Rc<Expr> {
    Rc::new(Expr::Literal {
        value: Literal::Number(n),
        loc: UNKNOWN_LOCATION,
    })
}

fn string(s: &str) -> Rc<Expr> {
    Rc::new(Expr::Literal {
        value: Literal::String(s.to_string()),
        loc: UNKNOWN_LOCATION,
    })
}

fn ident(name: &str) -> Rc<Expr> {
    Rc::new(Expr::Identifier {
        name: name.to_string(),
        loc: UNKNOWN_LOCATION,
    })
}

fn binary(op: BinaryOp, left: Rc<Expr>, right: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::Binary {
        op,
        left,
        right,
        loc: UNKNOWN_LOCATION,
    })
}

fn conditional(test: Rc<Expr>, consequent: Rc<Expr>, alternate: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::Conditional {
        test,
        consequent,
        alternate,
        loc: UNKNOWN_LOCATION,
    })
}

fn call(callee: Rc<Expr>, arguments: Vec<Rc<Expr>>) -> Rc<Expr> {
    Rc::new(Expr::Call {
        callee,
        arguments,
        type_args: None,
        loc: UNKNOWN_LOCATION,
    })
}

fn call_generic(
    callee: Rc<Expr>,
    arguments: Vec<Rc<Expr>>,
    type_args: Vec<TypeAnnotation>,
) -> Rc<Expr> {
    Rc::new(Expr::Call {
        callee,
        arguments,
        type_args: Some(type_args),
        loc: UNKNOWN_LOCATION,
    })
}

fn expr_stmt(expression: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Expression {
        expression,
        loc: UNKNOWN_LOCATION,
    })
}

fn const_decl(name: &str, annotation: Option<TypeAnnotation>, init: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Declaration {
        kind: DeclKind::Const,
        id: Param::new(name, annotation, UNKNOWN_LOCATION),
        init: Some(init),
        loc: UNKNOWN_LOCATION,
    })
}

fn ret(argument: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Return {
        argument: Some(argument),
        loc: UNKNOWN_LOCATION,
    })
}

fn typed_param(name: &str, annotation: TypeAnnotation) -> Param {
    Param::new(name, Some(annotation), UNKNOWN_LOCATION)
}

fn name_type(n: &str) -> TypeAnnotation {
    TypeAnnotation::Name(n.to_string())
}

fn function_decl(
    name: &str,
    type_params: Vec<&str>,
    params: Vec<Param>,
    return_type: TypeAnnotation,
    body: Vec<Rc<Stmt>>,
) -> Rc<Stmt> {
    Rc::new(Stmt::FunctionDeclaration(Rc::new(Function {
        name: Some(name.to_string()),
        params,
        type_params: type_params.into_iter().map(String::from).collect(),
        return_type: Some(return_type),
        body: FunctionBody::Block(Rc::new(Block {
            statements: body,
            loc: UNKNOWN_LOCATION,
        })),
        arrow: false,
        loc: UNKNOWN_LOCATION,
    })))
}

fn run(statements: Vec<Rc<Stmt>>) -> Result<TypedValue, tyro::error::RuntimeError> {
    let mut ctx = Context::new();

    run_program(&mut ctx, &Program::new(statements))
}

#[test]
fn factorial_with_an_accumulator_stays_flat() {
    // function fact(n: number, acc: number): number {
    //   return n === 0 ? acc : fact(n - 1, n * acc);
    // }
    // fact(10, 1);
    let program = Program::new(vec![
        function_decl(
            "fact",
            vec![],
            vec![
                typed_param("n", TypeAnnotation::Number),
                typed_param("acc", TypeAnnotation::Number),
            ],
            TypeAnnotation::Number,
            vec![ret(conditional(
                binary(BinaryOp::Eq, ident("n"), num(0.0)),
                ident("acc"),
                call(
                    ident("fact"),
                    vec![
                        binary(BinaryOp::Sub, ident("n"), num(1.0)),
                        binary(BinaryOp::Mul, ident("n"), ident("acc")),
                    ],
                ),
            ))],
        ),
        expr_stmt(call(ident("fact"), vec![num(10.0), num(1.0)])),
    ]);

    let mut ctx = Context::new();
    let mut machine = Machine::for_program(&program);

    let mut max_depth = 0;

    let value = loop {
        max_depth = max_depth.max(ctx.environment_depth());

        match machine.step(&mut ctx).unwrap() {
            StepOutcome::Running => {}
            StepOutcome::Done(value) => break value,
        }
    };

    assert_eq!(value, TypedValue::number(3_628_800.0));
    // global + program + one reused call frame + its body scope.
    assert!(max_depth <= 4, "environment depth grew to {}", max_depth);
}

#[test]
fn deep_mutual_tail_recursion_does_not_grow_the_environment_stack() {
    let branch = |zero: bool, next: &str| {
        ret(conditional(
            binary(BinaryOp::Eq, ident("n"), num(0.0)),
            Rc::new(Expr::Literal {
                value: Literal::Bool(zero),
                loc: UNKNOWN_LOCATION,
            }),
            call(
                ident(next),
                vec![binary(BinaryOp::Sub, ident("n"), num(1.0))],
            ),
        ))
    };

    let program = Program::new(vec![
        function_decl(
            "even",
            vec![],
            vec![typed_param("n", TypeAnnotation::Number)],
            TypeAnnotation::Boolean,
            vec![branch(true, "odd")],
        ),
        function_decl(
            "odd",
            vec![],
            vec![typed_param("n", TypeAnnotation::Number)],
            TypeAnnotation::Boolean,
            vec![branch(false, "even")],
        ),
        expr_stmt(call(ident("even"), vec![num(50_001.0)])),
    ]);

    let mut ctx = Context::new();
    let mut machine = Machine::for_program(&program);

    let mut max_depth = 0;

    let value = loop {
        max_depth = max_depth.max(ctx.environment_depth());

        match machine.step(&mut ctx).unwrap() {
            StepOutcome::Running => {}
            StepOutcome::Done(value) => break value,
        }
    };

    assert_eq!(value, TypedValue::bool(false));
    assert!(max_depth <= 4, "environment depth grew to {}", max_depth);
}

#[test]
fn generic_functions_check_arguments_against_type_arguments() {
    // function first<A, B>(a: A, b: B): A { return a; }
    let first = function_decl(
        "first",
        vec!["A", "B"],
        vec![typed_param("a", name_type("A")), typed_param("b", name_type("B"))],
        name_type("A"),
        vec![ret(ident("a"))],
    );

    let ok = run(vec![
        first.clone(),
        expr_stmt(call_generic(
            ident("first"),
            vec![num(1.0), string("two")],
            vec![TypeAnnotation::Number, TypeAnnotation::String],
        )),
    ])
    .unwrap();
    assert_eq!(ok, TypedValue::number(1.0));

    let err = run(vec![
        first,
        expr_stmt(call_generic(
            ident("first"),
            vec![num(1.0), num(2.0)],
            vec![TypeAnnotation::Number, TypeAnnotation::String],
        )),
    ])
    .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::Type {
            side: " as argument 2".to_string(),
            expected: "string".to_string(),
            actual: "number".to_string(),
        }
    );
}

#[test]
fn higher_order_generic_parameters_match_up_to_renaming() {
    // function apply<T>(f: (x: T) => T, v: T): T { return f(v); }
    // function idNum(x: number): number { return x; }
    // apply<number>(idNum, 3);
    let f_annotation = TypeAnnotation::Function {
        type_params: vec![],
        params: vec![typed_param("x", name_type("T"))],
        return_type: Some(Box::new(name_type("T"))),
    };

    let result = run(vec![
        function_decl(
            "apply",
            vec!["T"],
            vec![typed_param("f", f_annotation), typed_param("v", name_type("T"))],
            name_type("T"),
            vec![ret(call(ident("f"), vec![ident("v")]))],
        ),
        function_decl(
            "idNum",
            vec![],
            vec![typed_param("x", TypeAnnotation::Number)],
            TypeAnnotation::Number,
            vec![ret(ident("x"))],
        ),
        expr_stmt(call_generic(
            ident("apply"),
            vec![ident("idNum"), num(3.0)],
            vec![TypeAnnotation::Number],
        )),
    ])
    .unwrap();

    assert_eq!(result, TypedValue::number(3.0));
}

#[test]
fn returning_the_wrong_function_shape_is_a_return_type_error() {
    // function make(): (y: number) => number {
    //   return (y: boolean): boolean => y;
    // }
    let arrow = Rc::new(Expr::Function(Rc::new(Function {
        name: None,
        params: vec![typed_param("y", TypeAnnotation::Boolean)],
        type_params: vec![],
        return_type: Some(TypeAnnotation::Boolean),
        body: FunctionBody::Expression(ident("y")),
        arrow: true,
        loc: UNKNOWN_LOCATION,
    })));

    let declared = TypeAnnotation::Function {
        type_params: vec![],
        params: vec![typed_param("y", TypeAnnotation::Number)],
        return_type: Some(Box::new(TypeAnnotation::Number)),
    };

    let err = run(vec![
        function_decl("make", vec![], vec![], declared, vec![ret(arrow)]),
        expr_stmt(call(ident("make"), vec![])),
    ])
    .unwrap_err();

    assert_eq!(
        err.kind,
        ErrorKind::Type {
            side: " as return value".to_string(),
            expected: "(number) => number".to_string(),
            actual: "(boolean) => boolean".to_string(),
        }
    );
}

#[test]
fn undeclared_type_references_are_rejected() {
    let err = run(vec![function_decl(
        "f",
        vec![],
        vec![typed_param("x", name_type("Missing"))],
        TypeAnnotation::Number,
        vec![ret(num(0.0))],
    )])
    .unwrap_err();

    assert_eq!(
        err.kind,
        ErrorKind::UndefinedType {
            name: "Missing".to_string()
        }
    );
}

#[test]
fn unsupported_annotations_name_the_construct() {
    let err = run(vec![const_decl(
        "x",
        Some(TypeAnnotation::Array(Box::new(TypeAnnotation::Number))),
        num(1.0),
    )])
    .unwrap_err();

    assert_eq!(
        err.kind,
        ErrorKind::UnsupportedConstruct {
            construct: "Array types".to_string()
        }
    );
}

#[test]
fn diagnostics_are_recorded_in_the_context() {
    let mut ctx = Context::new();

    let err = run_program(
        &mut ctx,
        &Program::new(vec![expr_stmt(ident("ghost"))]),
    )
    .unwrap_err();

    assert_eq!(ctx.errors, vec![err.clone()]);
    assert_eq!(
        err.to_string(),
        "[line 0] Error: Name ghost not declared."
    );
}

#[test]
fn failed_runs_unwind_to_the_outer_boundary() {
    let mut ctx = Context::new();

    run_program(
        &mut ctx,
        &Program::new(vec![
            function_decl(
                "boom",
                vec![],
                vec![],
                TypeAnnotation::Number,
                vec![ret(ident("ghost"))],
            ),
            expr_stmt(call(ident("boom"), vec![])),
        ]),
    )
    .unwrap_err();

    // The call frame is gone; global and the program environment remain.
    assert_eq!(ctx.environment_depth(), 2);
}

#[test]
fn builtins_can_call_back_into_user_code() {
    // twice(f) applies its callback two times to 1.
    fn twice(args: &[TypedValue]) -> tyro::value::NativeResult {
        let callee = args[0].clone();

        // The host shim needs its own context; a real embedding would
        // thread the driver's context through shared state instead.
        let mut ctx = Context::new();

        let once = apply_fully(
            &mut ctx,
            callee.clone(),
            vec![TypedValue::number(1.0)],
            Vec::new(),
            UNKNOWN_LOCATION,
        )?;

        let result = apply_fully(&mut ctx, callee, vec![once], Vec::new(), UNKNOWN_LOCATION)?;

        Ok(result.value)
    }

    let mut ctx = Context::new();

    ctx.define_builtin(
        "twice",
        TypedValue::new(
            RuntimeType::Any,
            Value::NativeFunction {
                name: "twice".to_string(),
                arity: 1,
                var_args: false,
                func: twice,
            },
        ),
    );

    let result = run_program(
        &mut ctx,
        &Program::new(vec![
            function_decl(
                "inc",
                vec![],
                vec![typed_param("n", TypeAnnotation::Number)],
                TypeAnnotation::Number,
                vec![ret(binary(BinaryOp::Add, ident("n"), num(1.0)))],
            ),
            expr_stmt(call(ident("twice"), vec![ident("inc")])),
        ]),
    )
    .unwrap();

    assert_eq!(result, TypedValue::number(3.0));
}

#[test]
fn variadic_builtins_accept_extra_arguments() {
    let mut ctx = Context::new();

    ctx.define_builtin(
        "sum",
        TypedValue::new(
            RuntimeType::Any,
            Value::NativeFunction {
                name: "sum".to_string(),
                arity: 1,
                var_args: true,
                func: |args| {
                    let mut total = 0.0;

                    for arg in args {
                        match &arg.value {
                            Value::Number(n) => total += n,
                            other => {
                                return Err(format!("sum expects numbers, got {}", other).into())
                            }
                        }
                    }

                    Ok(Value::Number(total))
                },
            },
        ),
    );

    let result = run_program(
        &mut ctx,
        &Program::new(vec![expr_stmt(call(
            ident("sum"),
            vec![num(1.0), num(2.0), num(3.0)],
        ))]),
    )
    .unwrap();
    assert_eq!(result, TypedValue::number(6.0));

    let err = run_program(
        &mut ctx,
        &Program::new(vec![expr_stmt(call(ident("sum"), vec![]))]),
    )
    .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::InvalidNumberOfArguments {
            expected: 1,
            actual: 0
        }
    );
}

#[test]
fn repl_style_sessions_accumulate_bindings_and_diagnostics() {
    let mut ctx = Context::new();

    run_program(
        &mut ctx,
        &Program::new(vec![const_decl("base", None, num(10.0))]),
    )
    .unwrap();

    run_program(
        &mut ctx,
        &Program::new(vec![function_decl(
            "addBase",
            vec![],
            vec![typed_param("n", TypeAnnotation::Number)],
            TypeAnnotation::Number,
            vec![ret(binary(BinaryOp::Add, ident("n"), ident("base")))],
        )]),
    )
    .unwrap();

    run_program(
        &mut ctx,
        &Program::new(vec![expr_stmt(call(ident("addBase"), vec![string("x")]))]),
    )
    .unwrap_err();

    let result = run_program(
        &mut ctx,
        &Program::new(vec![expr_stmt(call(ident("addBase"), vec![num(5.0)]))]),
    )
    .unwrap();

    assert_eq!(result, TypedValue::number(15.0));
    assert_eq!(ctx.errors.len(), 1);
}

#[test]
fn logical_chains_in_return_position_evaluate_lazily() {
    // function safe(n: number): boolean {
    //   return n !== 0 && 10 / n > 1;
    // }
    // safe(0) must not divide by zero... which would not fail anyway,
    // but must also never call the right operand's side.
    let program = vec![
        function_decl(
            "safe",
            vec![],
            vec![typed_param("n", TypeAnnotation::Number)],
            TypeAnnotation::Boolean,
            vec![ret(Rc::new(Expr::Logical {
                op: LogicalOp::And,
                left: binary(BinaryOp::NotEq, ident("n"), num(0.0)),
                right: binary(
                    BinaryOp::Greater,
                    binary(BinaryOp::Div, num(10.0), ident("n")),
                    num(1.0),
                ),
                loc: UNKNOWN_LOCATION,
            }))],
        ),
        expr_stmt(call(ident("safe"), vec![num(0.0)])),
    ];

    assert_eq!(run(program).unwrap(), TypedValue::bool(false));
}

#[test]
fn stepping_is_deterministic() {
    let build = || {
        Program::new(vec![
            function_decl(
                "triangle",
                vec![],
                vec![
                    typed_param("n", TypeAnnotation::Number),
                    typed_param("acc", TypeAnnotation::Number),
                ],
                TypeAnnotation::Number,
                vec![ret(conditional(
                    binary(BinaryOp::Eq, ident("n"), num(0.0)),
                    ident("acc"),
                    call(
                        ident("triangle"),
                        vec![
                            binary(BinaryOp::Sub, ident("n"), num(1.0)),
                            binary(BinaryOp::Add, ident("acc"), ident("n")),
                        ],
                    ),
                ))],
            ),
            expr_stmt(call(ident("triangle"), vec![num(100.0), num(0.0)])),
        ])
    };

    let drive = || {
        let program = build();
        let mut ctx = Context::new();
        let mut machine = Machine::for_program(&program);

        let mut steps = 0usize;

        loop {
            match machine.step(&mut ctx).unwrap() {
                StepOutcome::Running => steps += 1,
                StepOutcome::Done(value) => break (steps, value),
            }
        }
    };

    let (steps_a, value_a) = drive();
    let (steps_b, value_b) = drive();

    assert_eq!(value_a, TypedValue::number(5050.0));
    assert_eq!(value_a, value_b);
    assert_eq!(steps_a, steps_b);
}

#[test]
fn nested_blocks_hoist_independently() {
    // const x = 1; { const y = x + 1; { const z = y + 1; z; } }
    let inner = Rc::new(Stmt::Block(Rc::new(Block {
        statements: vec![
            const_decl("z", None, binary(BinaryOp::Add, ident("y"), num(1.0))),
            expr_stmt(ident("z")),
        ],
        loc: UNKNOWN_LOCATION,
    })));

    let outer = Rc::new(Stmt::Block(Rc::new(Block {
        statements: vec![
            const_decl("y", None, binary(BinaryOp::Add, ident("x"), num(1.0))),
            inner,
        ],
        loc: UNKNOWN_LOCATION,
    })));

    let result = run(vec![const_decl("x", None, num(1.0)), outer]).unwrap();

    assert_eq!(result, TypedValue::number(3.0));
}
