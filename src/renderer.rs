use crate::ast::{Arg, BinaryOperator, Expression, Node, Template, UnaryOperator};
use crate::engine::Set;
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Single-render evaluator state. Created per render call and discarded
/// afterwards; all shared state lives on the Set.
pub(crate) struct Renderer<'a> {
    set: &'a Set,
    scope: Scope,
    /// Context stack for `.`; the innermost binding is last
    contexts: Vec<Value>,
    /// Inheritance chain, most-derived template first
    chain: Vec<Arc<Template>>,
    depth: usize,
    out: &'a mut dyn fmt::Write,
}

/// Render a template into `out`. Execution starts at the root of the
/// inheritance chain; block lookups walk back toward the starting template
/// so the most-derived override wins.
pub(crate) fn render_template(
    set: &Set,
    template: Arc<Template>,
    variables: HashMap<String, Value>,
    context: Value,
    out: &mut dyn fmt::Write,
) -> Result<()> {
    let chain = build_chain(set, template)?;
    let root = match chain.last() {
        Some(template) => template.clone(),
        None => return Ok(()),
    };

    let mut renderer = Renderer {
        set,
        scope: Scope::with_variables(variables),
        contexts: vec![context],
        chain,
        depth: 0,
        out,
    };
    renderer.execute_nodes(&root.nodes)
}

/// Follow `extends` links from the starting template to the root, failing
/// on unresolvable parents and on cycles.
fn build_chain(set: &Set, start: Arc<Template>) -> Result<Vec<Arc<Template>>> {
    let mut chain = vec![start];
    let mut seen = HashSet::new();

    loop {
        let current = match chain.last() {
            Some(template) => template.clone(),
            None => break,
        };
        seen.insert(current.name.clone());

        match &current.extends {
            Some(parent) => {
                if seen.contains(parent) {
                    return Err(Error::UnresolvedTemplate(format!(
                        "inheritance cycle through {:?}",
                        parent
                    )));
                }
                chain.push(set.get_template(parent)?);
            }
            None => break,
        }
    }

    Ok(chain)
}

impl<'a> Renderer<'a> {
    fn context(&self) -> Value {
        self.contexts.last().cloned().unwrap_or(Value::Nil)
    }

    fn execute_nodes(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.execute_node(node)?;
        }
        Ok(())
    }

    fn execute_node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Text(text) => self.out.write_str(text)?,
            Node::Comment(_) => {}

            Node::Action(expr) => {
                let value = self.evaluate(expr)?;
                write!(self.out, "{}", value)?;
            }

            Node::If {
                condition,
                then_branch,
                else_if_branches,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute_nodes(then_branch);
                }
                for (condition, branch) in else_if_branches {
                    if self.evaluate(condition)?.is_truthy() {
                        return self.execute_nodes(branch);
                    }
                }
                if let Some(branch) = else_branch {
                    return self.execute_nodes(branch);
                }
            }

            Node::Range {
                bindings,
                source,
                body,
                else_branch,
            } => self.execute_range(bindings, source, body, else_branch.as_deref())?,

            Node::Block { name, arg, body } => {
                match self.resolve_block(name)? {
                    Some(owner) => {
                        let def = match owner.blocks.get(name) {
                            Some(def) => def,
                            None => return Err(Error::UndefinedBlock(name.clone())),
                        };
                        let context_arg = self.block_context(arg.as_ref(), def.arg.as_ref())?;
                        self.run_body(&def.body, context_arg)?;
                    }
                    // Blocks outside the inheritance chain render their own body
                    None => {
                        let context_arg = self.block_context(arg.as_ref(), None)?;
                        self.run_body(body, context_arg)?;
                    }
                }
            }

            Node::Yield { name, arg } => {
                let owner = self
                    .resolve_block(name)?
                    .ok_or_else(|| Error::UndefinedBlock(name.clone()))?;
                let def = match owner.blocks.get(name) {
                    Some(def) => def,
                    None => return Err(Error::UndefinedBlock(name.clone())),
                };
                let context_arg = self.block_context(arg.as_ref(), def.arg.as_ref())?;
                self.run_body(&def.body, context_arg)?;
            }

            Node::Include(name) => {
                let template = self.set.get_template(name)?;
                self.enter()?;
                // Fresh variable scope; context, output and block chain carry over
                let saved = std::mem::replace(&mut self.scope, Scope::new());
                let result = self.execute_nodes(&template.nodes);
                self.scope = saved;
                self.depth -= 1;
                result?;
            }
        }
        Ok(())
    }

    fn execute_range(
        &mut self,
        bindings: &[String],
        source: &Expression,
        body: &[Node],
        else_branch: Option<&[Node]>,
    ) -> Result<()> {
        let entries: Vec<(Value, Value)> = match self.evaluate(source)? {
            Value::Sequence(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i64), item))
                .collect(),
            Value::Mapping(map) => map
                .into_iter()
                .map(|(key, value)| (Value::String(key), value))
                .collect(),
            Value::Nil => Vec::new(),
            other => return Err(Error::NotIterable(other.type_name().to_string())),
        };

        if entries.is_empty() {
            if let Some(branch) = else_branch {
                self.execute_nodes(branch)?;
            }
            return Ok(());
        }

        for (key, value) in entries {
            self.scope.push();
            let rebound = bindings.is_empty();
            match bindings {
                [] => self.contexts.push(value),
                [item] => self.scope.declare(item.clone(), value),
                [key_name, value_name, ..] => {
                    self.scope.declare(key_name.clone(), key);
                    self.scope.declare(value_name.clone(), value);
                }
            }

            let result = self.execute_nodes(body);
            if rebound {
                self.contexts.pop();
            }
            self.scope.pop();
            result?;
        }
        Ok(())
    }

    /// Resolve a block name against the inheritance chain, most-derived
    /// template first. Within each template its own definitions take
    /// precedence over what it imports.
    fn resolve_block(&self, name: &str) -> Result<Option<Arc<Template>>> {
        for template in &self.chain {
            if template.blocks.contains_key(name) {
                return Ok(Some(template.clone()));
            }
            for import in &template.imports {
                let imported = self.set.get_template(import)?;
                if imported.blocks.contains_key(name) {
                    return Ok(Some(imported));
                }
            }
        }
        Ok(None)
    }

    /// The context a block body runs under: the invocation argument if
    /// given, the definition's default otherwise, else the caller's context.
    fn block_context(
        &self,
        invocation: Option<&Expression>,
        definition: Option<&Expression>,
    ) -> Result<Option<Value>> {
        match invocation.or(definition) {
            Some(expr) => Ok(Some(self.evaluate(expr)?)),
            None => Ok(None),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.set.max_depth() {
            self.depth -= 1;
            return Err(Error::RecursionLimit(self.set.max_depth()));
        }
        Ok(())
    }

    fn run_body(&mut self, nodes: &[Node], context_arg: Option<Value>) -> Result<()> {
        self.enter()?;
        self.scope.push();
        let rebound = context_arg.is_some();
        if let Some(value) = context_arg {
            self.contexts.push(value);
        }

        let result = self.execute_nodes(nodes);

        if rebound {
            self.contexts.pop();
        }
        self.scope.pop();
        self.depth -= 1;
        result
    }

    // -- expressions --------------------------------------------------------

    fn evaluate(&self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::Bool(b) => Ok(Value::Bool(*b)),
            Expression::Int(n) => Ok(Value::Int(*n)),
            Expression::Float(n) => Ok(Value::Float(*n)),
            Expression::Str(s) => Ok(Value::String(s.clone())),
            Expression::Context => Ok(self.context()),
            Expression::Ident(name) => self.resolve_ident(name),

            Expression::Field { object, name } => {
                let object = self.evaluate(object)?;
                self.access_field(&object, name)
            }

            Expression::Call { callee, args } => self.evaluate_call(callee, args, None),

            Expression::BinaryOp { left, op, right } => self.evaluate_binary(left, *op, right),

            Expression::UnaryOp { op, operand } => {
                let value = self.evaluate(operand)?;
                match op {
                    UnaryOperator::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOperator::Minus => value.neg(),
                }
            }

            Expression::Pipeline { head, filters } => {
                let mut value = self.evaluate(head)?;
                for filter in filters {
                    value = self.evaluate_call(&filter.callee, &filter.args, Some(value))?;
                }
                Ok(value)
            }
        }
    }

    /// Identifier resolution order: scoped variables, then Set globals,
    /// then registered and default functions.
    fn resolve_ident(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.scope.lookup(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.set.lookup_global(name) {
            return Ok(value);
        }
        if let Some(function) = self.set.lookup_function(name) {
            return Ok(Value::Function(function));
        }
        Err(Error::UndefinedField(name.to_string()))
    }

    fn access_field(&self, object: &Value, name: &str) -> Result<Value> {
        match object {
            Value::Mapping(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UndefinedField(format!("{} in mapping", name))),

            Value::Sequence(items) => {
                let index: usize = name.parse().map_err(|_| {
                    Error::UndefinedField(format!("{} in sequence", name))
                })?;
                items.get(index).cloned().ok_or_else(|| {
                    Error::UndefinedField(format!("index {} out of range", index))
                })
            }

            Value::Object(obj) => obj
                .field(name)
                .ok_or_else(|| Error::UndefinedField(format!("{} in {}", name, obj.type_name()))),

            other => Err(Error::UndefinedField(format!(
                "{} in {}",
                name,
                other.type_name()
            ))),
        }
    }

    /// Evaluate a call. A piped value becomes the implicit first argument;
    /// named arguments flatten into a name/value pair in place.
    fn evaluate_call(
        &self,
        callee: &Expression,
        args: &[Arg],
        piped: Option<Value>,
    ) -> Result<Value> {
        let mut evaluated = Vec::with_capacity(args.len() + 1);
        if let Some(value) = piped {
            evaluated.push(value);
        }
        for arg in args {
            if let Some(name) = &arg.name {
                evaluated.push(Value::String(name.clone()));
            }
            evaluated.push(self.evaluate(&arg.value)?);
        }

        // Host objects get first refusal on `receiver.name(...)`
        if let Expression::Field { object, name } = callee {
            let receiver = self.evaluate(object)?;
            if let Value::Object(obj) = &receiver {
                if obj.has_method(name) {
                    return obj.invoke(name, &evaluated);
                }
            }
            let member = self.access_field(&receiver, name)?;
            return call_value(name, member, &evaluated);
        }

        let value = self.evaluate(callee)?;
        call_value(&callee.to_string(), value, &evaluated)
    }

    fn evaluate_binary(
        &self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
    ) -> Result<Value> {
        // Logical operators short-circuit; the right operand only runs when
        // the left side leaves the outcome open
        match op {
            BinaryOperator::And => {
                if !self.evaluate(left)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.evaluate(right)?.is_truthy()));
            }
            BinaryOperator::Or => {
                if self.evaluate(left)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.evaluate(right)?.is_truthy()));
            }
            _ => {}
        }

        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;
        match op {
            BinaryOperator::Equal => Ok(Value::Bool(left == right)),
            BinaryOperator::NotEqual => Ok(Value::Bool(left != right)),
            BinaryOperator::LessThan => Ok(Value::Bool(left.compare(&right)? == Ordering::Less)),
            BinaryOperator::LessThanOrEqual => {
                Ok(Value::Bool(left.compare(&right)? != Ordering::Greater))
            }
            BinaryOperator::GreaterThan => {
                Ok(Value::Bool(left.compare(&right)? == Ordering::Greater))
            }
            BinaryOperator::GreaterThanOrEqual => {
                Ok(Value::Bool(left.compare(&right)? != Ordering::Less))
            }
            BinaryOperator::Add => left.add(&right),
            BinaryOperator::Subtract => left.sub(&right),
            BinaryOperator::Multiply => left.mul(&right),
            BinaryOperator::Divide => left.div(&right),
            BinaryOperator::Modulo => left.rem(&right),
            BinaryOperator::And | BinaryOperator::Or => {
                Ok(Value::Bool(left.is_truthy() && right.is_truthy()))
            }
        }
    }
}

fn call_value(name: &str, value: Value, args: &[Value]) -> Result<Value> {
    match value {
        Value::Function(function) => function(args),
        other => Err(Error::call(
            name,
            format!("{} is not callable", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::Set;
    use crate::error::Error;
    use crate::value::Value;

    fn render(set: &Set, name: &str, context: Value) -> crate::error::Result<String> {
        set.render(name, std::collections::HashMap::new(), context)
    }

    #[test]
    fn test_logical_short_circuit() {
        let set = Set::new();
        set.parse_template("t", r#"{{false && undefinedIdent}}-{{true || undefinedIdent}}"#)
            .unwrap();
        assert_eq!(render(&set, "t", Value::Nil).unwrap(), "false-true");
    }

    #[test]
    fn test_right_operand_still_checked_when_reached() {
        let set = Set::new();
        set.parse_template("t", "{{true && undefinedIdent}}").unwrap();
        let err = render(&set, "t", Value::Nil).unwrap_err();
        assert!(matches!(err, Error::UndefinedField(_)));
    }

    #[test]
    fn test_extends_override_most_derived_wins() {
        let set = Set::new();
        set.parse_template("base", r#"head {{yield body}} tail"#)
            .unwrap();
        set.parse_template(
            "mid",
            r#"{{extends "base"}}{{block body}}mid{{end}}"#,
        )
        .unwrap();
        set.parse_template(
            "leaf",
            r#"{{extends "mid"}}{{block body}}leaf{{end}}"#,
        )
        .unwrap();

        assert_eq!(render(&set, "leaf", Value::Nil).unwrap(), "head leaf tail");
        assert_eq!(render(&set, "mid", Value::Nil).unwrap(), "head mid tail");
    }

    #[test]
    fn test_import_adds_without_overriding() {
        let set = Set::new();
        set.parse_template("widgets", r#"{{block badge}}imported{{end}}"#)
            .unwrap();
        set.parse_template(
            "page",
            r#"{{import "widgets"}}{{block badge}}own{{end}}:{{yield badge}}"#,
        )
        .unwrap();
        assert_eq!(render(&set, "page", Value::Nil).unwrap(), "own:own");

        set.parse_template(
            "page2",
            r#"{{import "widgets"}}{{yield badge}}"#,
        )
        .unwrap();
        assert_eq!(render(&set, "page2", Value::Nil).unwrap(), "imported");
    }

    #[test]
    fn test_inheritance_cycle_detected() {
        let set = Set::new();
        set.parse_template("a", r#"{{extends "b"}}"#).unwrap();
        set.parse_template("b", r#"{{extends "a"}}"#).unwrap();
        let err = render(&set, "a", Value::Nil).unwrap_err();
        assert!(matches!(err, Error::UnresolvedTemplate(_)));
    }

    #[test]
    fn test_recursive_yield_hits_depth_limit() {
        let set = Set::new();
        set.parse_template("t", r#"{{block loop}}x{{yield loop}}{{end}}"#)
            .unwrap();
        let err = render(&set, "t", Value::Nil).unwrap_err();
        assert!(matches!(err, Error::RecursionLimit(_)));
    }

    #[test]
    fn test_include_gets_fresh_scope_same_context() {
        let set = Set::new();
        set.parse_template("partial", "{{.}}").unwrap();
        set.parse_template(
            "outer",
            r#"{{range v := .}}{{include "partial"}}{{end}}"#,
        )
        .unwrap();
        let context = Value::Sequence(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(render(&set, "outer", context).unwrap(), "[1, 2][1, 2]");
    }

    #[test]
    fn test_range_else_on_empty_source() {
        let set = Set::new();
        set.parse_template("t", "{{range .}}item{{else}}empty{{end}}")
            .unwrap();
        assert_eq!(
            render(&set, "t", Value::Sequence(vec![])).unwrap(),
            "empty"
        );
    }

    #[test]
    fn test_range_not_iterable() {
        let set = Set::new();
        set.parse_template("t", "{{range .}}x{{end}}").unwrap();
        let err = render(&set, "t", Value::Int(3)).unwrap_err();
        assert!(matches!(err, Error::NotIterable(_)));
    }
}
