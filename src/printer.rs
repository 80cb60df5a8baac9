//! Renders syntax nodes back to a source-like string.
//!
//! Used for closure display (a closure prints as its pre-desugar source
//! form) and for the synthesized display name of anonymous functions.

use crate::ast::{
    Block, Expr, Function, FunctionBody, Literal, Param, Stmt, TypeAnnotation,
};

/// The `(params) => ...` label given to anonymous functions. A single
/// parameter is left unparenthesized.
pub fn anonymous_label(params: &[Param]) -> String {
    let names: Vec<&str> = params.iter().map(|param| param.name.as_str()).collect();

    if params.len() == 1 {
        format!("{} => ...", names[0])
    } else {
        format!("({}) => ...", names.join(", "))
    }
}

pub fn render_annotation(annotation: &TypeAnnotation) -> String {
    match annotation {
        TypeAnnotation::Boolean => "boolean".to_string(),

        TypeAnnotation::Number => "number".to_string(),

        TypeAnnotation::String => "string".to_string(),

        TypeAnnotation::Undefined => "undefined".to_string(),

        TypeAnnotation::Name(name) => name.clone(),

        TypeAnnotation::Function {
            type_params,
            params,
            return_type,
        } => {
            let prefix = if type_params.is_empty() {
                String::new()
            } else {
                format!("<{}>", type_params.join(", "))
            };

            let rendered: Vec<String> = params.iter().map(render_param).collect();

            let ret = match return_type {
                Some(annotation) => render_annotation(annotation),
                None => "?".to_string(),
            };

            format!("{}({}) => {}", prefix, rendered.join(", "), ret)
        }

        TypeAnnotation::Any => "any".to_string(),
        TypeAnnotation::Void => "void".to_string(),
        TypeAnnotation::Null => "null".to_string(),
        TypeAnnotation::Never => "never".to_string(),
        TypeAnnotation::BigInt => "bigint".to_string(),
        TypeAnnotation::Symbol => "symbol".to_string(),
        TypeAnnotation::Object => "object".to_string(),

        TypeAnnotation::Array(inner) => format!("{}[]", render_annotation(inner)),

        TypeAnnotation::Union(members) => {
            let rendered: Vec<String> = members.iter().map(render_annotation).collect();

            rendered.join(" | ")
        }

        TypeAnnotation::LiteralType(literal) => render_literal(literal),
    }
}

fn render_param(param: &Param) -> String {
    match &param.annotation {
        Some(annotation) => format!("{}: {}", param.name, render_annotation(annotation)),
        None => param.name.clone(),
    }
}

fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Number(n) => {
            if n.fract() == 0.0 {
                format!("{:.0}", n)
            } else {
                n.to_string()
            }
        }

        Literal::String(s) => format!("\"{}\"", s),

        Literal::Bool(b) => b.to_string(),
    }
}

pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal { value, .. } => render_literal(value),

        Expr::Identifier { name, .. } => name.clone(),

        Expr::Unary { op, argument, .. } => format!("{}{}", op.symbol(), render_expr(argument)),

        Expr::Binary {
            op, left, right, ..
        } => format!(
            "{} {} {}",
            render_expr(left),
            op.symbol(),
            render_expr(right)
        ),

        Expr::Logical {
            op, left, right, ..
        } => format!(
            "{} {} {}",
            render_expr(left),
            op.symbol(),
            render_expr(right)
        ),

        Expr::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => format!(
            "{} ? {} : {}",
            render_expr(test),
            render_expr(consequent),
            render_expr(alternate)
        ),

        Expr::Call {
            callee,
            arguments,
            type_args,
            ..
        } => {
            let args: Vec<String> = arguments.iter().map(|arg| render_expr(arg)).collect();

            let targs = match type_args {
                Some(annotations) if !annotations.is_empty() => {
                    let rendered: Vec<String> =
                        annotations.iter().map(render_annotation).collect();

                    format!("<{}>", rendered.join(", "))
                }
                _ => String::new(),
            };

            format!("{}{}({})", render_expr(callee), targs, args.join(", "))
        }

        Expr::Function(function) => render_function(function),

        Expr::Array { elements, .. } => {
            let rendered: Vec<String> = elements.iter().map(|e| render_expr(e)).collect();

            format!("[{}]", rendered.join(", "))
        }

        Expr::Object { .. } => "{...}".to_string(),

        Expr::Member {
            object, property, ..
        } => format!("{}.{}", render_expr(object), property),

        Expr::Assignment { target, value, .. } => {
            format!("{} = {}", target, render_expr(value))
        }

        Expr::New {
            callee, arguments, ..
        } => {
            let args: Vec<String> = arguments.iter().map(|arg| render_expr(arg)).collect();

            format!("new {}({})", render_expr(callee), args.join(", "))
        }
    }
}

pub fn render_stmt(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Expression { expression, .. } => format!("{};", render_expr(expression)),

        Stmt::Declaration { kind, id, init, .. } => match init {
            Some(init) => format!("{} {} = {};", kind, render_param(id), render_expr(init)),
            None => format!("{} {};", kind, render_param(id)),
        },

        Stmt::FunctionDeclaration(function) => render_function(function),

        Stmt::Return { argument, .. } => match argument {
            Some(expression) => format!("return {};", render_expr(expression)),
            None => "return;".to_string(),
        },

        Stmt::If {
            test,
            consequent,
            alternate,
            ..
        } => {
            let mut out = format!("if ({}) {}", render_expr(test), render_stmt(consequent));

            if let Some(alternate) = alternate {
                out.push_str(&format!(" else {}", render_stmt(alternate)));
            }

            out
        }

        Stmt::Block(block) => render_block(block),

        Stmt::Debugger { .. } => "debugger;".to_string(),

        Stmt::While { test, body, .. } => {
            format!("while ({}) {}", render_expr(test), render_stmt(body))
        }

        Stmt::For { .. } => "for (...) {...}".to_string(),

        Stmt::Break { .. } => "break;".to_string(),

        Stmt::Continue { .. } => "continue;".to_string(),

        Stmt::Import { .. } => "import ...;".to_string(),
    }
}

pub fn render_block(block: &Block) -> String {
    let rendered: Vec<String> = block
        .statements
        .iter()
        .map(|stmt| render_stmt(stmt))
        .collect();

    format!("{{ {} }}", rendered.join(" "))
}

pub fn render_function(function: &Function) -> String {
    let type_params = if function.type_params.is_empty() {
        String::new()
    } else {
        format!("<{}>", function.type_params.join(", "))
    };

    let params: Vec<String> = function.params.iter().map(render_param).collect();

    let ret = match &function.return_type {
        Some(annotation) => format!(": {}", render_annotation(annotation)),
        None => String::new(),
    };

    let body = match &function.body {
        FunctionBody::Block(block) => render_block(block),
        FunctionBody::Expression(expression) => render_expr(expression),
    };

    if function.arrow {
        format!("{}({}){} => {}", type_params, params.join(", "), ret, body)
    } else {
        match &function.name {
            Some(name) => format!(
                "function {}{}({}){} {}",
                name,
                type_params,
                params.join(", "),
                ret,
                body
            ),

            None => format!(
                "function{}({}){} {}",
                type_params,
                params.join(", "),
                ret,
                body
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Loc, UNKNOWN_LOCATION};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    #[test]
    fn anonymous_labels_follow_the_single_parameter_rule() {
        let x = Param::new("x", None, UNKNOWN_LOCATION);
        let y = Param::new("y", None, UNKNOWN_LOCATION);

        assert_eq!(anonymous_label(&[x.clone()]), "x => ...");
        assert_eq!(anonymous_label(&[x, y]), "(x, y) => ...");
        assert_eq!(anonymous_label(&[]), "() => ...");
    }

    #[test]
    fn renders_a_generic_arrow_function() {
        let function = Function {
            name: None,
            params: vec![Param::new(
                "x",
                Some(TypeAnnotation::Name("T".to_string())),
                UNKNOWN_LOCATION,
            )],
            type_params: vec!["T".to_string()],
            return_type: Some(TypeAnnotation::Name("T".to_string())),
            body: FunctionBody::Expression(Rc::new(Expr::Identifier {
                name: "x".to_string(),
                loc: Loc::new(1, 20),
            })),
            arrow: true,
            loc: Loc::new(1, 0),
        };

        assert_eq!(render_function(&function), "<T>(x: T): T => x");
    }
}
