use crate::ast::{
    Arg, BinaryOperator, BlockDef, Expression, Filter, Node, Template, UnaryOperator,
};
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token, TokenKind};

/// How a construct body was terminated
enum Terminator {
    End,
    Else,
    ElseIf(Expression),
    Eof,
}

/// Parser for template source
pub struct Parser {
    name: String,
    tokens: Vec<Token>,
    position: usize,
}

/// Parse a named template source into its tree. This is the tooling entry
/// point; registration and reference resolution belong to the Set.
pub fn parse(name: &str, source: &str) -> Result<Template> {
    Parser::new(name, source)?.parse()
}

/// Append text, merging with a preceding text node. Keeps trees canonical
/// when an action that produces no node sits between two text spans.
fn push_text(nodes: &mut Vec<Node>, text: String) {
    if let Some(Node::Text(existing)) = nodes.last_mut() {
        existing.push_str(&text);
    } else {
        nodes.push(Node::Text(text));
    }
}

impl Parser {
    /// Create a new parser from input source
    pub fn new(name: &str, source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            name: name.to_string(),
            tokens,
            position: 0,
        })
    }

    fn current(&self) -> &Token {
        // The token stream always ends with Eof and the parser never
        // advances past it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn kind_at(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.position + n).map(|t| &t.kind)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            template: self.name.clone(),
            message: message.into(),
            line: self.current().line,
        }
    }

    fn expect_right_delim(&mut self) -> Result<()> {
        if *self.kind() == TokenKind::RightDelim {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected }}}}, found {}", self.current())))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {:?}", other))),
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match self.kind().clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(self.error(format!("expected string literal, found {:?}", other))),
        }
    }

    /// Parse the entire template
    pub fn parse(mut self) -> Result<Template> {
        let mut template = Template::new(self.name.clone());
        let mut seen_action = false;

        loop {
            match self.kind().clone() {
                TokenKind::Eof => break,
                TokenKind::Text(text) => {
                    push_text(&mut template.nodes, text);
                    self.advance();
                }
                TokenKind::Comment(contents) => {
                    template.nodes.push(Node::Comment(contents));
                    self.advance();
                }
                TokenKind::LeftDelim => match self.kind_at(1) {
                    Some(TokenKind::Ident(kw)) if kw == "extends" => {
                        self.advance();
                        self.advance();
                        let parent = self.expect_string()?;
                        self.expect_right_delim()?;
                        if template.extends.is_some() {
                            return Err(self.error("duplicate extends declaration"));
                        }
                        if seen_action {
                            return Err(self.error("extends must be the first action"));
                        }
                        template.extends = Some(parent);
                        seen_action = true;
                    }
                    Some(TokenKind::Ident(kw)) if kw == "import" => {
                        self.advance();
                        self.advance();
                        let name = self.expect_string()?;
                        self.expect_right_delim()?;
                        template.imports.push(name);
                        seen_action = true;
                    }
                    _ => {
                        seen_action = true;
                        let node = self.parse_action(&mut template)?;
                        template.nodes.push(node);
                    }
                },
                other => return Err(self.error(format!("unexpected token {:?}", other))),
            }
        }

        if template.extends.is_some() {
            for node in &template.nodes {
                if !matches!(node, Node::Block { .. } | Node::Text(_) | Node::Comment(_)) {
                    return Err(self.error(
                        "a template with extends may only contain block definitions",
                    ));
                }
            }
        }

        Ok(template)
    }

    /// Parse one `{{ ... }}` action; the current token is the open delimiter.
    fn parse_action(&mut self, template: &mut Template) -> Result<Node> {
        self.advance(); // {{

        match self.kind().clone() {
            TokenKind::Ident(kw) if kw == "if" => {
                self.advance();
                self.parse_if(template)
            }
            TokenKind::Ident(kw) if kw == "range" => {
                self.advance();
                self.parse_range(template)
            }
            TokenKind::Ident(kw) if kw == "block" => {
                self.advance();
                self.parse_block(template)
            }
            TokenKind::Ident(kw) if kw == "yield" => {
                self.advance();
                self.parse_yield()
            }
            TokenKind::Ident(kw) if kw == "include" => {
                self.advance();
                let name = self.expect_string()?;
                self.expect_right_delim()?;
                Ok(Node::Include(name))
            }
            TokenKind::Ident(kw) if kw == "extends" || kw == "import" => {
                Err(self.error(format!("{} is only allowed at the top level", kw)))
            }
            TokenKind::Ident(kw) if kw == "end" || kw == "else" => {
                Err(self.error(format!("unexpected {{{{{}}}}}", kw)))
            }
            _ => {
                let expr = self.parse_pipeline()?;
                self.expect_right_delim()?;
                Ok(Node::Action(expr))
            }
        }
    }

    /// Parse nodes until a terminating `{{end}}`, `{{else}}` or
    /// `{{else if ...}}` action is consumed.
    fn parse_body(&mut self, template: &mut Template) -> Result<(Vec<Node>, Terminator)> {
        let mut nodes = Vec::new();

        loop {
            match self.kind().clone() {
                TokenKind::Eof => return Ok((nodes, Terminator::Eof)),
                TokenKind::Text(text) => {
                    push_text(&mut nodes, text);
                    self.advance();
                }
                TokenKind::Comment(contents) => {
                    nodes.push(Node::Comment(contents));
                    self.advance();
                }
                TokenKind::LeftDelim => match self.kind_at(1) {
                    Some(TokenKind::Ident(kw)) if kw == "end" => {
                        self.advance();
                        self.advance();
                        self.expect_right_delim()?;
                        return Ok((nodes, Terminator::End));
                    }
                    Some(TokenKind::Ident(kw)) if kw == "else" => {
                        self.advance();
                        self.advance();
                        if let TokenKind::Ident(next) = self.kind().clone() {
                            if next == "if" {
                                self.advance();
                                let condition = self.parse_pipeline()?;
                                self.expect_right_delim()?;
                                return Ok((nodes, Terminator::ElseIf(condition)));
                            }
                        }
                        self.expect_right_delim()?;
                        return Ok((nodes, Terminator::Else));
                    }
                    _ => {
                        let node = self.parse_action(template)?;
                        nodes.push(node);
                    }
                },
                other => return Err(self.error(format!("unexpected token {:?}", other))),
            }
        }
    }

    fn parse_if(&mut self, template: &mut Template) -> Result<Node> {
        let condition = self.parse_pipeline()?;
        self.expect_right_delim()?;

        let (then_branch, mut terminator) = self.parse_body(template)?;
        let mut else_if_branches = Vec::new();
        let mut else_branch = None;

        loop {
            match terminator {
                Terminator::End => break,
                Terminator::ElseIf(cond) => {
                    let (branch, next) = self.parse_body(template)?;
                    else_if_branches.push((cond, branch));
                    terminator = next;
                }
                Terminator::Else => {
                    let (branch, next) = self.parse_body(template)?;
                    if !matches!(next, Terminator::End) {
                        return Err(self.error("expected {{end}} after else branch"));
                    }
                    else_branch = Some(branch);
                    break;
                }
                Terminator::Eof => return Err(self.error("expected {{end}} to close if")),
            }
        }

        Ok(Node::If {
            condition,
            then_branch,
            else_if_branches,
            else_branch,
        })
    }

    fn parse_range(&mut self, template: &mut Template) -> Result<Node> {
        let mut bindings = Vec::new();

        // `range v := src` or `range k, v := src`
        if let TokenKind::Ident(first) = self.kind() {
            match self.kind_at(1) {
                Some(TokenKind::Declare) => {
                    bindings.push(first.clone());
                    self.advance();
                    self.advance();
                }
                Some(TokenKind::Comma) => {
                    if let (Some(TokenKind::Ident(second)), Some(TokenKind::Declare)) =
                        (self.kind_at(2), self.kind_at(3))
                    {
                        bindings.push(first.clone());
                        bindings.push(second.clone());
                        self.advance();
                        self.advance();
                        self.advance();
                        self.advance();
                    }
                }
                _ => {}
            }
        }

        let source = self.parse_pipeline()?;
        self.expect_right_delim()?;

        let (body, terminator) = self.parse_body(template)?;
        let else_branch = match terminator {
            Terminator::End => None,
            Terminator::Else => {
                let (branch, next) = self.parse_body(template)?;
                if !matches!(next, Terminator::End) {
                    return Err(self.error("expected {{end}} after else branch"));
                }
                Some(branch)
            }
            Terminator::ElseIf(_) => {
                return Err(self.error("else if is not allowed inside range"))
            }
            Terminator::Eof => return Err(self.error("expected {{end}} to close range")),
        };

        Ok(Node::Range {
            bindings,
            source,
            body,
            else_branch,
        })
    }

    fn parse_block(&mut self, template: &mut Template) -> Result<Node> {
        let name = self.expect_ident()?;
        let arg = if *self.kind() == TokenKind::RightDelim {
            None
        } else {
            Some(self.parse_pipeline()?)
        };
        self.expect_right_delim()?;

        let (body, terminator) = self.parse_body(template)?;
        if !matches!(terminator, Terminator::End) {
            return Err(self.error(format!("expected {{{{end}}}} to close block {}", name)));
        }

        if template.blocks.contains_key(&name) {
            return Err(self.error(format!("duplicate block definition: {}", name)));
        }
        template.blocks.insert(
            name.clone(),
            BlockDef {
                arg: arg.clone(),
                body: body.clone(),
            },
        );

        Ok(Node::Block { name, arg, body })
    }

    fn parse_yield(&mut self) -> Result<Node> {
        let name = self.expect_ident()?;
        let arg = if *self.kind() == TokenKind::RightDelim {
            None
        } else {
            Some(self.parse_pipeline()?)
        };
        self.expect_right_delim()?;
        Ok(Node::Yield { name, arg })
    }

    // -- expressions --------------------------------------------------------

    /// Parse a full pipeline: a command followed by zero or more `|` filters.
    fn parse_pipeline(&mut self) -> Result<Expression> {
        let head = self.parse_command()?;

        let mut filters = Vec::new();
        while *self.kind() == TokenKind::Pipe {
            self.advance();
            filters.push(self.parse_filter()?);
        }

        if filters.is_empty() {
            Ok(head)
        } else {
            Ok(Expression::Pipeline {
                head: Box::new(head),
                filters,
            })
        }
    }

    /// Parse one pipeline stage: a callable, optionally with colon or
    /// parenthesized arguments.
    fn parse_filter(&mut self) -> Result<Filter> {
        let callee = self.parse_postfix()?;
        if let Expression::Call { callee, args } = callee {
            return Ok(Filter {
                callee: *callee,
                args,
            });
        }
        let args = if *self.kind() == TokenKind::Colon {
            self.advance();
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Filter { callee, args })
    }

    /// Parse an expression with optional colon-call sugar:
    /// `f: a, b` is equivalent to `f(a, b)`.
    fn parse_command(&mut self) -> Result<Expression> {
        let expr = self.parse_expression(0)?;
        if *self.kind() == TokenKind::Colon {
            self.advance();
            let args = self.parse_args()?;
            return Ok(Expression::Call {
                callee: Box::new(expr),
                args,
            });
        }
        Ok(expr)
    }

    /// Precedence-climbing binary expression parser
    fn parse_expression(&mut self, min_prec: u8) -> Result<Expression> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.kind() {
                TokenKind::Or => BinaryOperator::Or,
                TokenKind::And => BinaryOperator::And,
                TokenKind::Eq => BinaryOperator::Equal,
                TokenKind::Ne => BinaryOperator::NotEqual,
                TokenKind::Lt => BinaryOperator::LessThan,
                TokenKind::Le => BinaryOperator::LessThanOrEqual,
                TokenKind::Gt => BinaryOperator::GreaterThan,
                TokenKind::Ge => BinaryOperator::GreaterThanOrEqual,
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                TokenKind::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_expression(prec + 1)?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let op = match self.kind() {
            TokenKind::Not => Some(UnaryOperator::Not),
            TokenKind::Minus => Some(UnaryOperator::Minus),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    /// Parse a primary expression followed by field access and call chains
    fn parse_postfix(&mut self) -> Result<Expression> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.kind().clone() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.field_name()?;
                    expr = Expression::Field {
                        object: Box::new(expr),
                        name,
                    };
                }
                TokenKind::LeftParen => {
                    self.advance();
                    let args = if *self.kind() == TokenKind::RightParen {
                        Vec::new()
                    } else {
                        self.parse_args()?
                    };
                    if *self.kind() != TokenKind::RightParen {
                        return Err(self.error("expected ) to close argument list"));
                    }
                    self.advance();
                    expr = Expression::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Field names are identifiers, or digits for sequence indexing
    fn field_name(&mut self) -> Result<String> {
        match self.kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            TokenKind::Int(index) => {
                self.advance();
                Ok(index.to_string())
            }
            other => Err(self.error(format!("expected field name, found {:?}", other))),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.kind().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expression::Int(n))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expression::Float(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expression::Str(s))
            }
            TokenKind::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Expression::Bool(true)),
                    "false" => Ok(Expression::Bool(false)),
                    _ => Ok(Expression::Ident(name)),
                }
            }
            TokenKind::Dot => {
                self.advance();
                // `.Name` is field access on the context; a bare `.` is the
                // context itself.
                match self.kind().clone() {
                    TokenKind::Ident(_) | TokenKind::Int(_) => {
                        let name = self.field_name()?;
                        Ok(Expression::Field {
                            object: Box::new(Expression::Context),
                            name,
                        })
                    }
                    _ => Ok(Expression::Context),
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_pipeline()?;
                if *self.kind() != TokenKind::RightParen {
                    return Err(self.error("expected ) to close group"));
                }
                self.advance();
                Ok(expr)
            }
            other => Err(self.error(format!("unexpected token {:?} in expression", other))),
        }
    }

    /// Parse a comma-separated argument list, with `@name` markers attaching
    /// names to the values that follow them.
    fn parse_args(&mut self) -> Result<Vec<Arg>> {
        let mut args = Vec::new();

        loop {
            if *self.kind() == TokenKind::At {
                self.advance();
                let name = self.expect_ident()?;
                if *self.kind() == TokenKind::Comma {
                    self.advance();
                }
                let value = self.parse_expression(0)?;
                args.push(Arg {
                    name: Some(name),
                    value,
                });
            } else {
                args.push(Arg::positional(self.parse_expression(0)?));
            }

            if *self.kind() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }

        Ok(args)
    }
}
