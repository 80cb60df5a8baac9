//! Runtime type checking.
//!
//! Converts static type annotations into [`RuntimeType`] descriptors,
//! validates annotation well-formedness at declaration time, and decides
//! whether two runtime types match — including generic function types,
//! which match by positional alpha-equivalence: a type-parameter reference
//! resolves to its binder position `(depth, index)` within the stack of
//! nested type-parameter scopes, and two references denote the same type
//! exactly when those positions agree. `<T>(x: T): T` and `<U>(y: U): U`
//! are the same type; `<T, U>(x: T): U` and `<A, B>(x: B): A` are not.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::rc::Rc;

use log::debug;

use crate::ast::{BinaryOp, Function, Loc, Param, TypeAnnotation, UnaryOp};
use crate::environment::{lookup_type, Environment};
use crate::error::{ErrorKind, EvalResult, RuntimeError};
use crate::printer;
use crate::types::{FunctionType, RuntimeType};
use crate::value::{TypedValue, Value};

pub const LHS: &str = " on left hand side of operation";
pub const RHS: &str = " on right hand side of operation";

type Env = Rc<RefCell<Environment>>;

/// Tags a value with its runtime type. Only primitives can be tagged this
/// way; anything else is a host-boundary error (the caller wraps it as an
/// exception diagnostic).
pub fn type_of(value: &Value) -> Result<RuntimeType, String> {
    match value {
        Value::Number(_) => Ok(RuntimeType::Number),

        Value::String(_) => Ok(RuntimeType::String),

        Value::Bool(_) => Ok(RuntimeType::Boolean),

        Value::Undefined => Ok(RuntimeType::Undefined),

        other => Err(format!("unknown type in type_of({})", other)),
    }
}

fn is_number(value: &TypedValue) -> bool {
    matches!(value.rtype, RuntimeType::Number)
}

fn is_string(value: &TypedValue) -> bool {
    matches!(value.rtype, RuntimeType::String)
}

fn is_bool(value: &TypedValue) -> bool {
    matches!(value.rtype, RuntimeType::Boolean)
}

/// The display name used in declaration diagnostics: `function f` for
/// declarations, the `(params) => ...` label for arrows, `function
/// expression` otherwise.
pub fn function_display_name(function: &Function) -> String {
    match &function.name {
        Some(name) => format!("function {}", name),

        None if function.arrow => printer::anonymous_label(&function.params),

        None => "function expression".to_string(),
    }
}

/// Converts a static annotation into a runtime descriptor.
///
/// Total over the closed set of supported annotation syntaxes; everything
/// else is rejected by name rather than silently widened. Function-type
/// positions must all be annotated.
pub fn convert_to_runtime_type(
    annotation: &TypeAnnotation,
    loc: Loc,
) -> EvalResult<RuntimeType> {
    match annotation {
        TypeAnnotation::Boolean => Ok(RuntimeType::Boolean),

        TypeAnnotation::Number => Ok(RuntimeType::Number),

        TypeAnnotation::String => Ok(RuntimeType::String),

        TypeAnnotation::Undefined => Ok(RuntimeType::Undefined),

        TypeAnnotation::Name(name) => Ok(RuntimeType::Name(name.clone())),

        TypeAnnotation::Function {
            type_params,
            params,
            return_type,
        } => {
            let label = printer::anonymous_label(params);

            let mut param_types = Vec::with_capacity(params.len());

            for param in params {
                let annotation = param.annotation.as_ref().ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::MissingTypeAnnotation {
                            subject: format!(
                                "Parameter {} in function type {}",
                                param.name, label
                            ),
                        },
                        param.loc,
                    )
                })?;

                param_types.push(convert_to_runtime_type(annotation, param.loc)?);
            }

            let return_annotation = return_type.as_deref().ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::MissingTypeAnnotation {
                        subject: format!("The return type for function type {}", label),
                    },
                    loc,
                )
            })?;

            Ok(RuntimeType::function(
                type_params.clone(),
                param_types,
                convert_to_runtime_type(return_annotation, loc)?,
            ))
        }

        TypeAnnotation::Any => Err(RuntimeError::unsupported(loc, "Any types")),
        TypeAnnotation::Void => Err(RuntimeError::unsupported(loc, "Void types")),
        TypeAnnotation::Null => Err(RuntimeError::unsupported(loc, "Null types")),
        TypeAnnotation::Never => Err(RuntimeError::unsupported(loc, "Never types")),
        TypeAnnotation::BigInt => Err(RuntimeError::unsupported(loc, "BigInt types")),
        TypeAnnotation::Symbol => Err(RuntimeError::unsupported(loc, "Symbol types")),
        TypeAnnotation::Object => Err(RuntimeError::unsupported(loc, "Object types")),
        TypeAnnotation::Array(_) => Err(RuntimeError::unsupported(loc, "Array types")),
        TypeAnnotation::Union(_) => Err(RuntimeError::unsupported(loc, "Union types")),
        TypeAnnotation::LiteralType(_) => Err(RuntimeError::unsupported(loc, "Literal types")),
    }
}

/// Checks that an annotation contains no reference to an undeclared name
/// (type parameters in scope excepted) and that nested function types are
/// fully annotated.
fn check_annotation_valid(
    annotation: &TypeAnnotation,
    type_params: &HashSet<String>,
    env: &Env,
    loc: Loc,
) -> EvalResult<()> {
    match annotation {
        TypeAnnotation::Name(name) => {
            if !type_params.contains(name) {
                lookup_type(env, name, loc)?;
            }

            Ok(())
        }

        TypeAnnotation::Function {
            type_params: own,
            params,
            return_type,
        } => {
            let label = printer::anonymous_label(params);

            let mut extended = type_params.clone();
            extended.extend(own.iter().cloned());

            for param in params {
                let annotation = param.annotation.as_ref().ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::MissingTypeAnnotation {
                            subject: format!(
                                "Parameter {} in function type {}",
                                param.name, label
                            ),
                        },
                        param.loc,
                    )
                })?;

                check_annotation_valid(annotation, &extended, env, param.loc)?;
            }

            let return_annotation = return_type.as_deref().ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::MissingTypeAnnotation {
                        subject: format!("The return type for function type {}", label),
                    },
                    loc,
                )
            })?;

            check_annotation_valid(return_annotation, &extended, env, loc)
        }

        // Primitive keywords carry no references; unsupported syntaxes are
        // rejected at conversion time.
        _ => Ok(()),
    }
}

/// Operator type check for unary expressions: `+`/`-` require a number,
/// `!` requires a boolean.
pub fn check_unary_expression(loc: Loc, op: UnaryOp, value: &TypedValue) -> EvalResult<()> {
    match op {
        UnaryOp::Plus | UnaryOp::Minus if !is_number(value) => Err(RuntimeError::type_error(
            loc,
            "",
            "number",
            value.rtype.to_string(),
        )),

        UnaryOp::Not if !is_bool(value) => Err(RuntimeError::type_error(
            loc,
            "",
            "boolean",
            value.rtype.to_string(),
        )),

        _ => Ok(()),
    }
}

/// Operator type check for binary expressions. Arithmetic requires two
/// numbers; `+`, comparisons and equality accept two numbers or two
/// strings — the first operand's kind decides what the other side must
/// be, so the mismatch is always reported against the right-hand side
/// unless the left is neither number nor string.
pub fn check_binary_expression(
    loc: Loc,
    op: BinaryOp,
    left: &TypedValue,
    right: &TypedValue,
) -> EvalResult<()> {
    match op {
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            if !is_number(left) {
                Err(RuntimeError::type_error(
                    loc,
                    LHS,
                    "number",
                    left.rtype.to_string(),
                ))
            } else if !is_number(right) {
                Err(RuntimeError::type_error(
                    loc,
                    RHS,
                    "number",
                    right.rtype.to_string(),
                ))
            } else {
                Ok(())
            }
        }

        BinaryOp::Add
        | BinaryOp::Less
        | BinaryOp::LessEq
        | BinaryOp::Greater
        | BinaryOp::GreaterEq
        | BinaryOp::Eq
        | BinaryOp::NotEq => {
            if is_number(left) {
                if is_number(right) {
                    Ok(())
                } else {
                    Err(RuntimeError::type_error(
                        loc,
                        RHS,
                        "number",
                        right.rtype.to_string(),
                    ))
                }
            } else if is_string(left) {
                if is_string(right) {
                    Ok(())
                } else {
                    Err(RuntimeError::type_error(
                        loc,
                        RHS,
                        "string",
                        right.rtype.to_string(),
                    ))
                }
            } else {
                Err(RuntimeError::type_error(
                    loc,
                    LHS,
                    "string or number",
                    left.rtype.to_string(),
                ))
            }
        }
    }
}

/// The test of a conditional must be a boolean; there is no truthiness.
pub fn check_condition(loc: Loc, test: &TypedValue) -> EvalResult<()> {
    if is_bool(test) {
        Ok(())
    } else {
        Err(RuntimeError::type_error(
            loc,
            " as condition",
            "boolean",
            test.rtype.to_string(),
        ))
    }
}

/// Declaration type check: if the binding carries an annotation, the
/// initializer's runtime type must match it. The initializer's type
/// becomes the variable's type either way.
pub fn check_variable_declaration(
    loc: Loc,
    id: &Param,
    init: &TypedValue,
    env: &Env,
) -> EvalResult<()> {
    let Some(annotation) = &id.annotation else {
        return Ok(());
    };

    check_annotation_valid(annotation, &HashSet::new(), env, loc)?;

    let declared = convert_to_runtime_type(annotation, loc)?;

    let variable_type = match declared {
        RuntimeType::Name(name) => lookup_type(env, &name, loc)?,
        other => other,
    };

    if !is_matching_type(&variable_type, &init.rtype, &[], &[]) {
        return Err(RuntimeError::type_error(
            loc,
            format!(" as type of {}", id.name),
            variable_type.to_string(),
            init.rtype.to_string(),
        ));
    }

    Ok(())
}

/// Declaration-time check for functions: every parameter and the return
/// position must be annotated, and every annotation must resolve. Runs
/// once, eagerly, so calls can skip re-validating well-formedness.
pub fn check_function_declaration(function: &Function, env: &Env) -> EvalResult<()> {
    let function_name = function_display_name(function);

    debug!("Checking declaration of {}", function_name);

    let type_params: HashSet<String> = function.type_params.iter().cloned().collect();

    for param in &function.params {
        let Some(annotation) = &param.annotation else {
            return Err(RuntimeError::type_error(
                function.loc,
                format!(" for parameter {} in {}", param.name, function_name),
                "type annotation",
                "none",
            ));
        };

        check_annotation_valid(annotation, &type_params, env, param.loc)?;
    }

    let Some(return_annotation) = &function.return_type else {
        return Err(RuntimeError::type_error(
            function.loc,
            format!(" for {}", function_name),
            "return type annotation",
            "none",
        ));
    };

    check_annotation_valid(return_annotation, &type_params, env, function.loc)
}

/// Computes a function's runtime type, resolving name references that are
/// not the function's own type parameters against the environment.
/// Assumes [`check_function_declaration`] already passed.
pub fn type_of_function(function: &Function, env: &Env) -> EvalResult<FunctionType> {
    let type_params = function.type_params.clone();

    let mut param_types = Vec::with_capacity(function.params.len());

    for param in &function.params {
        let annotation = param.annotation.as_ref().ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::MissingTypeAnnotation {
                    subject: format!("Parameter {}", param.name),
                },
                param.loc,
            )
        })?;

        let rtt = convert_to_runtime_type(annotation, param.loc)?;

        param_types.push(match rtt {
            RuntimeType::Name(name) if !type_params.contains(&name) => {
                lookup_type(env, &name, param.loc)?
            }

            other => other,
        });
    }

    let return_annotation = function.return_type.as_ref().ok_or_else(|| {
        RuntimeError::new(
            ErrorKind::MissingTypeAnnotation {
                subject: format!("The return type for {}", function_display_name(function)),
            },
            function.loc,
        )
    })?;

    let return_rtt = convert_to_runtime_type(return_annotation, function.loc)?;

    let return_type = match return_rtt {
        RuntimeType::Name(name) if !type_params.contains(&name) => {
            lookup_type(env, &name, function.loc)?
        }

        other => other,
    };

    Ok(FunctionType {
        type_params,
        param_types,
        return_type,
    })
}

/// Checks that a value can be called at all. Host callables are tagged
/// `any` and pass.
pub fn check_callee(loc: Loc, callee: &TypedValue) -> EvalResult<()> {
    if callee.rtype.is_function() || matches!(callee.rtype, RuntimeType::Any) {
        Ok(())
    } else {
        Err(RuntimeError::type_error(
            loc,
            " as callee",
            "function",
            callee.rtype.to_string(),
        ))
    }
}

/// Resolves the explicit type-argument list of a call site. Name
/// references resolve through the environment immediately; a missing name
/// is an `UndefinedType` diagnostic.
pub fn get_type_args(
    type_args: Option<&Vec<TypeAnnotation>>,
    env: &Env,
    loc: Loc,
) -> EvalResult<Vec<RuntimeType>> {
    let Some(annotations) = type_args else {
        return Ok(Vec::new());
    };

    let mut resolved = Vec::with_capacity(annotations.len());

    for annotation in annotations {
        let rtt = convert_to_runtime_type(annotation, loc)?;

        resolved.push(match rtt {
            RuntimeType::Name(name) => lookup_type(env, &name, loc)?,
            other => other,
        });
    }

    Ok(resolved)
}

/// Replaces name references in a function type's parameter and return
/// positions with their actual types: the call's type-argument pairing
/// first, then the environment. References to the function's *own* type
/// parameters are left as placeholders — they are re-bound one level
/// further in when a nested generic function is called.
fn resolve_function_type(
    ftype: &FunctionType,
    loc: Loc,
    env: &Env,
    type_env: Option<&HashMap<String, RuntimeType>>,
) -> EvalResult<FunctionType> {
    let mut resolved = ftype.clone();

    let resolve = |rtt: &RuntimeType| -> EvalResult<RuntimeType> {
        let RuntimeType::Name(name) = rtt else {
            return Ok(rtt.clone());
        };

        if ftype.type_params.contains(name) {
            return Ok(rtt.clone());
        }

        if let Some(bound) = type_env.and_then(|te| te.get(name)) {
            return Ok(bound.clone());
        }

        lookup_type(env, name, loc)
    };

    for param in resolved.param_types.iter_mut() {
        *param = resolve(param)?;
    }

    resolved.return_type = resolve(&resolved.return_type)?;

    Ok(resolved)
}

/// Argument type check for a call. Builds the type-parameter environment
/// from the explicit type arguments, resolves each declared parameter
/// type through it, and reports mismatches by 1-based argument index.
pub fn check_type_of_arguments(
    loc: Loc,
    ftype: &FunctionType,
    args: &[TypedValue],
    type_args: &[RuntimeType],
    env: &Env,
) -> EvalResult<()> {
    let type_env: HashMap<String, RuntimeType> = ftype
        .type_params
        .iter()
        .cloned()
        .zip(type_args.iter().cloned())
        .collect();

    for (index, declared) in ftype.param_types.iter().enumerate() {
        let mut expected = declared.clone();

        if let RuntimeType::Name(name) = &expected {
            expected = match type_env.get(name) {
                Some(bound) => bound.clone(),
                None => lookup_type(env, name, loc)?,
            };
        }

        if let RuntimeType::Function(inner) = &expected {
            expected = RuntimeType::Function(Rc::new(resolve_function_type(
                inner,
                loc,
                env,
                Some(&type_env),
            )?));
        }

        let actual = &args[index].rtype;

        if !is_matching_type(&expected, actual, &[], &[]) {
            return Err(RuntimeError::type_error(
                loc,
                format!(" as argument {}", index + 1),
                expected.to_string(),
                actual.to_string(),
            ));
        }
    }

    Ok(())
}

/// Return-value type check, run after the body produced a value. Name
/// references resolve through the call environment, where the call's type
/// parameters are bound.
pub fn check_type_of_return_value(
    loc: Loc,
    ftype: &FunctionType,
    result: &TypedValue,
    env: &Env,
) -> EvalResult<()> {
    let mut expected = ftype.return_type.clone();

    if let RuntimeType::Name(name) = &expected {
        expected = lookup_type(env, name, loc)?;
    }

    if let RuntimeType::Function(inner) = &expected {
        expected = RuntimeType::Function(Rc::new(resolve_function_type(inner, loc, env, None)?));
    }

    if !is_matching_type(&expected, &result.rtype, &[], &[]) {
        return Err(RuntimeError::type_error(
            loc,
            " as return value",
            expected.to_string(),
            result.rtype.to_string(),
        ));
    }

    Ok(())
}

/// Decides whether two runtime types match.
///
/// Non-function types compare by tag, with `any` matching everything.
/// Function types match structurally under the accumulated stacks of
/// type-parameter scopes (`t1_env`/`t2_env`, most specific first), so
/// that generic functions are compared up to renaming of their type
/// parameters.
pub fn is_matching_type(
    t1: &RuntimeType,
    t2: &RuntimeType,
    t1_env: &[Vec<String>],
    t2_env: &[Vec<String>],
) -> bool {
    if matches!(t1, RuntimeType::Any) || matches!(t2, RuntimeType::Any) {
        return true;
    }

    let (f1, f2) = match (t1, t2) {
        (RuntimeType::Function(f1), RuntimeType::Function(f2)) => (f1, f2),

        _ => return mem::discriminant(t1) == mem::discriminant(t2),
    };

    if f1.type_params.len() != f2.type_params.len() {
        return false;
    }

    if f1.param_types.len() != f2.param_types.len() {
        return false;
    }

    // One more scope level, most specific first.
    let new_t1_env = push_scope(&f1.type_params, t1_env);
    let new_t2_env = push_scope(&f2.type_params, t2_env);

    for (p1, p2) in f1.param_types.iter().zip(f2.param_types.iter()) {
        if !is_matching_type_reference(p1, p2, &new_t1_env, &new_t2_env)
            || !is_matching_type(p1, p2, &new_t1_env, &new_t2_env)
        {
            return false;
        }
    }

    is_matching_type_reference(&f1.return_type, &f2.return_type, &new_t1_env, &new_t2_env)
        && is_matching_type(&f1.return_type, &f2.return_type, &new_t1_env, &new_t2_env)
}

fn push_scope(params: &[String], env: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut scopes = Vec::with_capacity(env.len() + 1);
    scopes.push(params.to_vec());
    scopes.extend_from_slice(env);
    scopes
}

/// Binder position of a type-parameter name: the first scope level that
/// declares it, and the index within that level.
fn binder_position(name: &str, scopes: &[Vec<String>], depth: usize) -> Option<usize> {
    scopes[depth].iter().position(|param| param == name)
}

/// Returns false when exactly one side is a name reference, or when both
/// are references bound at different `(depth, index)` positions in their
/// respective scope stacks. Returns true otherwise (including two
/// references bound nowhere, which are resolved elsewhere).
fn is_matching_type_reference(
    t1: &RuntimeType,
    t2: &RuntimeType,
    t1_scopes: &[Vec<String>],
    t2_scopes: &[Vec<String>],
) -> bool {
    match (t1, t2) {
        (RuntimeType::Name(n1), RuntimeType::Name(n2)) => {
            let levels = t1_scopes.len().min(t2_scopes.len());

            for depth in 0..levels {
                let p1 = binder_position(n1, t1_scopes, depth);
                let p2 = binder_position(n2, t2_scopes, depth);

                match (p1, p2) {
                    // Both bound at this level: same index or nothing.
                    (Some(i1), Some(i2)) => return i1 == i2,

                    // Only one bound at this level.
                    (Some(_), None) | (None, Some(_)) => return false,

                    (None, None) => {}
                }
            }

            true
        }

        (RuntimeType::Name(_), _) | (_, RuntimeType::Name(_)) => false,

        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::UNKNOWN_LOCATION;
    use pretty_assertions::assert_eq;

    fn global() -> Env {
        Rc::new(RefCell::new(Environment::new("global")))
    }

    fn name(n: &str) -> RuntimeType {
        RuntimeType::Name(n.to_string())
    }

    fn generic(params: &[&str], param_types: Vec<RuntimeType>, ret: RuntimeType) -> RuntimeType {
        RuntimeType::function(
            params.iter().map(|p| p.to_string()).collect(),
            param_types,
            ret,
        )
    }

    #[test]
    fn numeric_annotation_converts_and_matches_a_literal() {
        let rtt = convert_to_runtime_type(&TypeAnnotation::Number, UNKNOWN_LOCATION).unwrap();

        assert_eq!(rtt, RuntimeType::Number);
        assert!(is_matching_type(
            &rtt,
            &TypedValue::number(5.0).rtype,
            &[],
            &[]
        ));
    }

    #[test]
    fn unsupported_annotations_are_rejected_by_name() {
        let err = convert_to_runtime_type(
            &TypeAnnotation::Union(vec![TypeAnnotation::Number, TypeAnnotation::String]),
            UNKNOWN_LOCATION,
        )
        .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::UnsupportedConstruct {
                construct: "Union types".to_string()
            }
        );
    }

    #[test]
    fn function_type_annotations_require_annotated_positions() {
        let annotation = TypeAnnotation::Function {
            type_params: vec![],
            params: vec![Param::new("x", None, UNKNOWN_LOCATION)],
            return_type: Some(Box::new(TypeAnnotation::Number)),
        };

        let err = convert_to_runtime_type(&annotation, UNKNOWN_LOCATION).unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::MissingTypeAnnotation {
                subject: "Parameter x in function type x => ...".to_string()
            }
        );
    }

    #[test]
    fn alpha_equivalent_generic_functions_match() {
        let id_t = generic(&["T"], vec![name("T")], name("T"));
        let id_u = generic(&["U"], vec![name("U")], name("U"));

        assert!(is_matching_type(&id_t, &id_u, &[], &[]));
    }

    #[test]
    fn positionally_different_references_do_not_match() {
        let straight = generic(&["T", "U"], vec![name("T"), name("U")], name("T"));
        let crossed = generic(&["A", "B"], vec![name("B"), name("A")], name("A"));

        assert!(!is_matching_type(&straight, &crossed, &[], &[]));
    }

    #[test]
    fn type_parameter_count_must_agree() {
        let one = generic(&["T"], vec![name("T")], name("T"));
        let none = generic(&[], vec![RuntimeType::Number], RuntimeType::Number);

        assert!(!is_matching_type(&one, &none, &[], &[]));
    }

    #[test]
    fn reference_against_concrete_type_is_a_mismatch() {
        let id_t = generic(&["T"], vec![name("T")], name("T"));
        let numeric = generic(&["T"], vec![RuntimeType::Number], RuntimeType::Number);

        assert!(!is_matching_type(&id_t, &numeric, &[], &[]));
    }

    #[test]
    fn nested_generics_match_by_scope_depth() {
        // <T>(x: T) => <U>(y: U) => T  vs  <A>(x: A) => <B>(y: B) => A
        let inner1 = generic(&["U"], vec![name("U")], name("T"));
        let outer1 = generic(&["T"], vec![name("T")], inner1);

        let inner2 = generic(&["B"], vec![name("B")], name("A"));
        let outer2 = generic(&["A"], vec![name("A")], inner2);

        assert!(is_matching_type(&outer1, &outer2, &[], &[]));

        // ... vs  <A>(x: A) => <B>(y: B) => B: outer-bound vs inner-bound.
        let inner3 = generic(&["B"], vec![name("B")], name("B"));
        let outer3 = generic(&["A"], vec![name("A")], inner3);

        assert!(!is_matching_type(&outer1, &outer3, &[], &[]));
    }

    #[test]
    fn any_matches_everything() {
        assert!(is_matching_type(
            &RuntimeType::Any,
            &RuntimeType::Number,
            &[],
            &[]
        ));
        assert!(is_matching_type(
            &RuntimeType::String,
            &RuntimeType::Any,
            &[],
            &[]
        ));
    }

    #[test]
    fn binary_check_reports_the_side_determined_by_the_first_operand() {
        let string = TypedValue::string("a");
        let number = TypedValue::number(1.0);

        let err = check_binary_expression(UNKNOWN_LOCATION, BinaryOp::Add, &string, &number)
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Type {
                side: RHS.to_string(),
                expected: "string".to_string(),
                actual: "number".to_string(),
            }
        );

        let err = check_binary_expression(UNKNOWN_LOCATION, BinaryOp::Add, &number, &string)
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Type {
                side: RHS.to_string(),
                expected: "number".to_string(),
                actual: "string".to_string(),
            }
        );
    }

    #[test]
    fn arithmetic_requires_numbers_on_both_sides() {
        let err = check_binary_expression(
            UNKNOWN_LOCATION,
            BinaryOp::Sub,
            &TypedValue::bool(true),
            &TypedValue::number(1.0),
        )
        .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::Type {
                side: LHS.to_string(),
                expected: "number".to_string(),
                actual: "boolean".to_string(),
            }
        );
    }

    #[test]
    fn condition_check_requires_a_boolean() {
        let err = check_condition(UNKNOWN_LOCATION, &TypedValue::number(1.0)).unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::Type {
                side: " as condition".to_string(),
                expected: "boolean".to_string(),
                actual: "number".to_string(),
            }
        );
    }

    #[test]
    fn variable_declaration_annotation_must_match_initializer() {
        let env = global();

        let id = Param::new("x", Some(TypeAnnotation::Number), UNKNOWN_LOCATION);

        check_variable_declaration(UNKNOWN_LOCATION, &id, &TypedValue::number(5.0), &env)
            .unwrap();

        let err = check_variable_declaration(
            UNKNOWN_LOCATION,
            &id,
            &TypedValue::string("five"),
            &env,
        )
        .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::Type {
                side: " as type of x".to_string(),
                expected: "number".to_string(),
                actual: "string".to_string(),
            }
        );
    }

    #[test]
    fn argument_check_resolves_type_parameters_from_type_arguments() {
        let env = global();

        let identity = FunctionType {
            type_params: vec!["T".to_string()],
            param_types: vec![name("T")],
            return_type: name("T"),
        };

        check_type_of_arguments(
            UNKNOWN_LOCATION,
            &identity,
            &[TypedValue::number(5.0)],
            &[RuntimeType::Number],
            &env,
        )
        .unwrap();

        let err = check_type_of_arguments(
            UNKNOWN_LOCATION,
            &identity,
            &[TypedValue::string("five")],
            &[RuntimeType::Number],
            &env,
        )
        .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::Type {
                side: " as argument 1".to_string(),
                expected: "number".to_string(),
                actual: "string".to_string(),
            }
        );
    }

    #[test]
    fn return_value_check_resolves_through_the_call_environment() {
        let env = global();
        env.borrow_mut().bind_type("T", RuntimeType::Number);

        let identity = FunctionType {
            type_params: vec!["T".to_string()],
            param_types: vec![name("T")],
            return_type: name("T"),
        };

        check_type_of_return_value(
            UNKNOWN_LOCATION,
            &identity,
            &TypedValue::number(5.0),
            &env,
        )
        .unwrap();

        let err = check_type_of_return_value(
            UNKNOWN_LOCATION,
            &identity,
            &TypedValue::string("five"),
            &env,
        )
        .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::Type {
                side: " as return value".to_string(),
                expected: "number".to_string(),
                actual: "string".to_string(),
            }
        );
    }

    #[test]
    fn type_of_tags_primitives_and_rejects_the_rest() {
        assert_eq!(type_of(&Value::Number(1.0)).unwrap(), RuntimeType::Number);
        assert_eq!(
            type_of(&Value::String("s".to_string())).unwrap(),
            RuntimeType::String
        );
        assert_eq!(type_of(&Value::Bool(true)).unwrap(), RuntimeType::Boolean);
        assert_eq!(type_of(&Value::Undefined).unwrap(), RuntimeType::Undefined);
        assert!(type_of(&Value::NativeFunction {
            name: "f".to_string(),
            arity: 0,
            var_args: false,
            func: |_| Ok(Value::Undefined),
        })
        .is_err());
    }
}
