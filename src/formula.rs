//! Formula Evaluator (design §4.10): a pure evaluator over the indexed
//! view, safe against cycles and unbounded recursion. Failures never
//! propagate as `Err`; they come back as the in-band sentinel string
//! `"#ERR: <reason>"` (design §7, `EvalError`).

use std::collections::HashSet;

use serde_json::Value as Json;

use crate::index::Index;
use crate::node::NodeSnapshot;
use crate::types::NodeId;

pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Variadic arity sentinel, mirroring the patch wire's `-1` = "unbounded".
pub const VARIADIC: i32 = -1;

pub type OperationFn = fn(&[Json]) -> Result<Json, String>;

#[derive(Clone, Copy)]
pub struct Operation {
    pub arity: i32,
    pub execute: OperationFn,
}

/// Host-provided `(name, arity, execute)` registry (design §4.10).
#[derive(Default, Clone)]
pub struct OperationRegistry {
    ops: std::collections::HashMap<String, Operation>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, arity: i32, execute: OperationFn) {
        self.ops.insert(name.into(), Operation { arity, execute });
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.ops.get(name)
    }

    /// The built-in operation set named in design SPEC_FULL §4.10:
    /// `add`, `sub`, `mul`, `div`, `concat`, `eq`, `if`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("add", 2, |args| numeric_op(args, |a, b| a + b));
        registry.register("sub", 2, |args| numeric_op(args, |a, b| a - b));
        registry.register("mul", 2, |args| numeric_op(args, |a, b| a * b));
        registry.register("div", 2, |args| {
            let (a, b) = two_numbers(args)?;
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(number(a / b))
        });
        registry.register("concat", VARIADIC, |args| {
            let joined: String = args.iter().map(value_to_text).collect();
            Ok(Json::String(joined))
        });
        registry.register("eq", 2, |args| {
            let [a, b] = args else { return Err("eq expects 2 arguments".to_string()) };
            Ok(Json::Bool(a == b))
        });
        registry.register("if", 3, |args| {
            let [cond, then, otherwise] = args else { return Err("if expects 3 arguments".to_string()) };
            Ok(if truthy(cond) { then.clone() } else { otherwise.clone() })
        });
        registry
    }
}

fn number(n: f64) -> Json {
    serde_json::Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

fn as_number(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn two_numbers(args: &[Json]) -> Result<(f64, f64), String> {
    let [a, b] = args else { return Err("expected 2 arguments".to_string()) };
    Ok((
        as_number(a).ok_or("expected a number")?,
        as_number(b).ok_or("expected a number")?,
    ))
}

fn numeric_op(args: &[Json], f: impl Fn(f64, f64) -> f64) -> Result<Json, String> {
    let (a, b) = two_numbers(args)?;
    Ok(number(f(a, b)))
}

fn value_to_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Number(n) => n.to_string(),
        Json::Bool(b) => b.to_string(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Json) -> bool {
    match value {
        Json::Bool(b) => *b,
        Json::Null => false,
        Json::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Json::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn err_sentinel(reason: impl std::fmt::Display) -> Json {
    Json::String(format!("#ERR: {reason}"))
}

struct Context<'a> {
    index: &'a Index,
    registry: &'a OperationRegistry,
    visited: HashSet<NodeId>,
    depth: usize,
    max_depth: usize,
}

/// Evaluates the formula rooted at `formula_id`. Always returns a `Json`
/// value; failures come back as the `"#ERR: ..."` sentinel string rather
/// than a propagated error (design §7).
pub fn evaluate(index: &Index, registry: &OperationRegistry, formula_id: NodeId) -> Json {
    evaluate_with_max_depth(index, registry, formula_id, DEFAULT_MAX_DEPTH)
}

/// Same as [`evaluate`], but with the recursion guard set to `max_depth`
/// instead of [`DEFAULT_MAX_DEPTH`] (design §4.10, host-configurable limit).
pub fn evaluate_with_max_depth(index: &Index, registry: &OperationRegistry, formula_id: NodeId, max_depth: usize) -> Json {
    let mut ctx = Context { index, registry, visited: HashSet::new(), depth: 0, max_depth };
    eval_node(&mut ctx, formula_id)
}

fn eval_node(ctx: &mut Context, id: NodeId) -> Json {
    if ctx.depth >= ctx.max_depth {
        return err_sentinel("max recursion depth exceeded");
    }
    if !ctx.visited.insert(id) {
        return err_sentinel("cyclic formula reference");
    }
    ctx.depth += 1;
    let result = eval_node_inner(ctx, id);
    ctx.depth -= 1;
    ctx.visited.remove(&id);
    result
}

fn eval_node_inner(ctx: &mut Context, id: NodeId) -> Json {
    match ctx.index.node(id) {
        Some(NodeSnapshot::Value { text }) => Json::String(text.clone()),
        Some(NodeSnapshot::Ref { target }) => match target {
            Some(target) => eval_node(ctx, *target),
            None => err_sentinel("ref has no target"),
        },
        Some(NodeSnapshot::Formula { .. }) => eval_formula(ctx, id),
        Some(NodeSnapshot::Element { .. }) | Some(NodeSnapshot::Action { .. }) => Json::Null,
        None => err_sentinel(format!("missing node {id}")),
    }
}

fn eval_formula(ctx: &mut Context, id: NodeId) -> Json {
    let Some(NodeSnapshot::Formula { operation }) = ctx.index.node(id) else {
        return err_sentinel("not a formula node");
    };
    let operation = operation.clone();
    let children = ctx.index.children(id).to_vec();

    if !children.is_empty() {
        return eval_child_args_mode(ctx, &operation, &children);
    }

    eval_rpn_mode(ctx, id)
}

fn eval_child_args_mode(ctx: &mut Context, operation: &str, children: &[NodeId]) -> Json {
    let mut args = Vec::with_capacity(children.len());
    for &child in children {
        args.push(eval_node(ctx, child));
    }
    apply_operation(ctx, operation, args)
}

/// RPN-on-siblings mode (design §4.10): walk preceding siblings of a
/// childless formula plus itself, treating value/ref siblings as operands
/// and childless-formula siblings as stack reducers.
fn eval_rpn_mode(ctx: &mut Context, formula_id: NodeId) -> Json {
    let Some(parent) = ctx.index.parent(formula_id) else {
        return err_sentinel("formula has no parent to walk siblings from");
    };
    let siblings = ctx.index.children(parent).to_vec();
    let Some(position) = siblings.iter().position(|&id| id == formula_id) else {
        return err_sentinel("formula not found among siblings");
    };

    let mut stack: Vec<Json> = Vec::new();
    for &id in &siblings[..=position] {
        match ctx.index.node(id) {
            Some(NodeSnapshot::Value { text }) => stack.push(Json::String(text.clone())),
            Some(NodeSnapshot::Ref { .. }) => stack.push(eval_node(ctx, id)),
            Some(NodeSnapshot::Formula { operation }) if ctx.index.children(id).is_empty() => {
                let operation = operation.clone();
                let arity = match ctx.registry.get(&operation) {
                    Some(op) => op.arity,
                    None => return err_sentinel(format!("unknown operation '{operation}'")),
                };
                let take = if arity == VARIADIC { stack.len() } else { arity.max(0) as usize };
                if stack.len() < take {
                    return err_sentinel(format!("stack underflow for '{operation}'"));
                }
                let args: Vec<Json> = stack.split_off(stack.len() - take);
                stack.push(apply_operation(ctx, &operation, args));
            }
            Some(NodeSnapshot::Element { .. }) | Some(NodeSnapshot::Action { .. }) | None => continue,
            // A formula sibling with its own children evaluates in child-args
            // mode and its result joins the stack like any other operand.
            Some(NodeSnapshot::Formula { .. }) => stack.push(eval_node(ctx, id)),
        }
    }

    stack.pop().unwrap_or_else(|| err_sentinel("empty stack"))
}

fn apply_operation(ctx: &mut Context, operation: &str, args: Vec<Json>) -> Json {
    let Some(op) = ctx.registry.get(operation) else {
        return err_sentinel(format!("unknown operation '{operation}'"));
    };
    if op.arity != VARIADIC && args.len() as i32 != op.arity {
        return err_sentinel(format!("arity mismatch for '{operation}': expected {}, got {}", op.arity, args.len()));
    }
    (op.execute)(&args).unwrap_or_else(err_sentinel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeSpec;
    use crate::substrate::{LoroSubstrate, Substrate};

    fn value(v: &str) -> NodeSpec {
        NodeSpec::Value { value: v.to_string() }
    }

    fn formula(op: &str) -> NodeSpec {
        NodeSpec::Formula { operation: op.to_string() }
    }

    #[test]
    fn rpn_mode_reduces_preceding_siblings() {
        let (substrate, root) = LoroSubstrate::new(1).unwrap();
        let specs = [value("5"), value("1"), formula("add"), value("1"), formula("add")];
        let mut ids = Vec::new();
        for spec in specs {
            let id = substrate.create_node(Some(root), None).unwrap();
            substrate.init_node(id, &spec).unwrap();
            ids.push(id);
        }
        substrate.commit("local");

        let index = Index::rebuild(&substrate);
        let registry = OperationRegistry::with_builtins();
        let result = evaluate(&index, &registry, ids[4]);
        assert_eq!(result, Json::Number(serde_json::Number::from_f64(7.0).unwrap()));
    }

    #[test]
    fn unknown_operation_returns_error_sentinel() {
        let (substrate, root) = LoroSubstrate::new(1).unwrap();
        let id = substrate.create_node(Some(root), None).unwrap();
        substrate.init_node(id, &formula("frobnicate")).unwrap();
        substrate.commit("local");

        let index = Index::rebuild(&substrate);
        let registry = OperationRegistry::with_builtins();
        let result = evaluate(&index, &registry, id);
        assert_eq!(result, Json::String("#ERR: unknown operation 'frobnicate'".to_string()));
    }
}
