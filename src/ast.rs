use std::collections::HashMap;
use std::fmt;

/// AST node types for templates
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Plain text content, preserved byte-for-byte
    Text(String),

    /// Comment span `{* ... *}`; emits nothing, kept for round-trip printing
    Comment(String),

    /// Action `{{ expression }}`: evaluate and print
    Action(Expression),

    /// Conditional `{{if}}...{{else if}}...{{else}}...{{end}}`
    If {
        condition: Expression,
        then_branch: Vec<Node>,
        else_if_branches: Vec<(Expression, Vec<Node>)>,
        else_branch: Option<Vec<Node>>,
    },

    /// Loop `{{range [k, ][v := ]source}}...{{else}}...{{end}}`
    Range {
        /// Declared variable names: empty rebinds the context, one binds
        /// each element, two bind key (or index) and value.
        bindings: Vec<String>,
        source: Expression,
        body: Vec<Node>,
        else_branch: Option<Vec<Node>>,
    },

    /// Block definition `{{block name arg}}...{{end}}`; renders inline and
    /// is registered on the owning template for yield/override resolution
    Block {
        name: String,
        arg: Option<Expression>,
        body: Vec<Node>,
    },

    /// Block invocation `{{yield name arg}}`
    Yield {
        name: String,
        arg: Option<Expression>,
    },

    /// Inline sub-render of another template `{{include "name"}}`
    Include(String),
}

/// Expression types for actions, conditions and arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Boolean literal
    Bool(bool),

    /// Integer literal
    Int(i64),

    /// Float literal
    Float(f64),

    /// String literal
    Str(String),

    /// Variable reference
    Ident(String),

    /// The current context value `.`
    Context,

    /// Field or index access (e.g. `user.Name`, `.Email`, `items.0`)
    Field {
        object: Box<Expression>,
        name: String,
    },

    /// Function or method call with positional and `@named` arguments
    Call {
        callee: Box<Expression>,
        args: Vec<Arg>,
    },

    /// Binary operation
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// Pipeline `expr | filter1 | filter2: arg`
    Pipeline {
        head: Box<Expression>,
        filters: Vec<Filter>,
    },
}

/// A single call argument: positional, or named via the `@name` marker
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expression,
}

impl Arg {
    pub fn positional(value: Expression) -> Self {
        Self { name: None, value }
    }
}

/// One stage of a pipeline: the filter callee plus its explicit arguments
/// (the prior pipeline value is passed as an implicit first argument)
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub callee: Expression,
    pub args: Vec<Arg>,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,

    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOperator {
    /// Binding power; higher binds tighter. Relational binds tighter than
    /// equality, matching the language the templates are modeled on.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equal | BinaryOperator::NotEqual => 3,
            BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => 4,
            BinaryOperator::Add | BinaryOperator::Subtract => 5,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 6,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

/// A block definition registered on its owning template
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDef {
    pub arg: Option<Expression>,
    pub body: Vec<Node>,
}

/// A parsed template: immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub nodes: Vec<Node>,
    /// Parent template name from `{{extends "P"}}`, resolved lazily by the Set
    pub extends: Option<String>,
    /// Imported template names from `{{import "I"}}`, in source order
    pub imports: Vec<String>,
    /// Blocks defined directly in this template, by name
    pub blocks: HashMap<String, BlockDef>,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            extends: None,
            imports: Vec::new(),
            blocks: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Printer: reproduces parseable source from any tree. Literal text and
// comments are preserved exactly; action interiors use canonical spacing.
// ---------------------------------------------------------------------------

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for ch in s.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Write an expression, parenthesizing when its precedence falls below the
/// context's minimum binding power.
fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expression, min_prec: u8) -> fmt::Result {
    match expr {
        Expression::Bool(b) => write!(f, "{}", b),
        Expression::Int(n) => write!(f, "{}", n),
        Expression::Float(n) => {
            // Keep a decimal point so the literal reparses as a float
            if n.fract() == 0.0 {
                write!(f, "{:.1}", n)
            } else {
                write!(f, "{}", n)
            }
        }
        Expression::Str(s) => write!(f, "\"{}\"", escape_string(s)),
        Expression::Ident(name) => f.write_str(name),
        Expression::Context => f.write_str("."),

        Expression::Field { object, name } => {
            if **object == Expression::Context {
                write!(f, ".{}", name)
            } else {
                write_expr(f, object, 8)?;
                write!(f, ".{}", name)
            }
        }

        Expression::Call { callee, args } => {
            write_expr(f, callee, 8)?;
            f.write_str("(")?;
            write_args(f, args)?;
            f.write_str(")")
        }

        Expression::BinaryOp { left, op, right } => {
            let prec = op.precedence();
            let parens = prec < min_prec;
            if parens {
                f.write_str("(")?;
            }
            write_expr(f, left, prec)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, right, prec + 1)?;
            if parens {
                f.write_str(")")?;
            }
            Ok(())
        }

        Expression::UnaryOp { op, operand } => {
            let parens = 7 < min_prec;
            if parens {
                f.write_str("(")?;
            }
            match op {
                UnaryOperator::Not => f.write_str("!")?,
                UnaryOperator::Minus => f.write_str("-")?,
            }
            write_expr(f, operand, 7)?;
            if parens {
                f.write_str(")")?;
            }
            Ok(())
        }

        Expression::Pipeline { head, filters } => {
            let parens = min_prec > 0;
            if parens {
                f.write_str("(")?;
            }
            write_expr(f, head, 1)?;
            for filter in filters {
                f.write_str(" | ")?;
                write_expr(f, &filter.callee, 8)?;
                if !filter.args.is_empty() {
                    f.write_str(": ")?;
                    write_args(f, &filter.args)?;
                }
            }
            if parens {
                f.write_str(")")?;
            }
            Ok(())
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Arg]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        if let Some(name) = &arg.name {
            write!(f, "@{}, ", name)?;
        }
        write_expr(f, &arg.value, 1)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

fn write_nodes(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for node in nodes {
        write!(f, "{}", node)?;
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(text) => f.write_str(text),
            Node::Comment(contents) => write!(f, "{{*{}*}}", contents),
            Node::Action(expr) => write!(f, "{{{{{}}}}}", expr),

            Node::If {
                condition,
                then_branch,
                else_if_branches,
                else_branch,
            } => {
                write!(f, "{{{{if {}}}}}", condition)?;
                write_nodes(f, then_branch)?;
                for (cond, branch) in else_if_branches {
                    write!(f, "{{{{else if {}}}}}", cond)?;
                    write_nodes(f, branch)?;
                }
                if let Some(branch) = else_branch {
                    f.write_str("{{else}}")?;
                    write_nodes(f, branch)?;
                }
                f.write_str("{{end}}")
            }

            Node::Range {
                bindings,
                source,
                body,
                else_branch,
            } => {
                f.write_str("{{range ")?;
                if !bindings.is_empty() {
                    write!(f, "{} := ", bindings.join(", "))?;
                }
                write!(f, "{}}}}}", source)?;
                write_nodes(f, body)?;
                if let Some(branch) = else_branch {
                    f.write_str("{{else}}")?;
                    write_nodes(f, branch)?;
                }
                f.write_str("{{end}}")
            }

            Node::Block { name, arg, body } => {
                write!(f, "{{{{block {}", name)?;
                if let Some(arg) = arg {
                    write!(f, " {}", arg)?;
                }
                f.write_str("}}")?;
                write_nodes(f, body)?;
                f.write_str("{{end}}")
            }

            Node::Yield { name, arg } => {
                write!(f, "{{{{yield {}", name)?;
                if let Some(arg) = arg {
                    write!(f, " {}", arg)?;
                }
                f.write_str("}}")
            }

            Node::Include(name) => write!(f, "{{{{include \"{}\"}}}}", escape_string(name)),
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.extends {
            write!(f, "{{{{extends \"{}\"}}}}", escape_string(parent))?;
        }
        for import in &self.imports {
            write!(f, "{{{{import \"{}\"}}}}", escape_string(import))?;
        }
        write_nodes(f, &self.nodes)
    }
}
