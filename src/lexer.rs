use crate::error::{Error, Result};
use std::fmt;

/// Token types for the template syntax
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Plain text outside of any delimiter
    Text(String),
    /// Comment contents between `{*` and `*}` (discarded at render time)
    Comment(String),

    /// Action open delimiter `{{`
    LeftDelim,
    /// Action close delimiter `}}`
    RightDelim,

    // Literals and identifiers. Keywords (`if`, `range`, `block`, ...) are
    // plain identifiers here; the parser gives them meaning.
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    // Operators
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %
    Eq,      // ==
    Ne,      // !=
    Lt,      // <
    Le,      // <=
    Gt,      // >
    Ge,      // >=
    And,     // &&
    Or,      // ||
    Not,     // !
    Colon,   // :
    Comma,   // ,
    Dot,     // .
    LeftParen,
    RightParen,
    Pipe,    // |
    At,      // @
    Declare, // :=

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}:{}", self.kind, self.line, self.column)
    }
}

/// Lexer for template source text
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
    offset: usize,
    line: usize,
    column: usize,
    in_action: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
            offset: 0,
            line: 1,
            column: 1,
            in_action: false,
        }
    }

    /// Advance to the next character
    fn advance(&mut self) {
        if let Some(ch) = self.current_char {
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }

        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    /// Peek at the next character without advancing
    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Lex {
            message: message.into(),
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    /// Check if the scan position sits on an action open `{{`
    fn at_action_open(&self) -> bool {
        self.current_char == Some('{') && self.peek() == Some('{')
    }

    /// Check if the scan position sits on a comment open `{*`
    fn at_comment_open(&self) -> bool {
        self.current_char == Some('{') && self.peek() == Some('*')
    }

    /// Read plain text until a delimiter opens
    fn read_text(&mut self) -> String {
        let mut result = String::new();

        while let Some(ch) = self.current_char {
            if self.at_action_open() || self.at_comment_open() {
                break;
            }
            result.push(ch);
            self.advance();
        }

        result
    }

    /// Read a comment span, returning its raw contents
    fn read_comment(&mut self) -> Result<String> {
        self.advance(); // {
        self.advance(); // *

        let mut result = String::new();
        while let Some(ch) = self.current_char {
            if ch == '*' && self.peek() == Some('}') {
                self.advance(); // *
                self.advance(); // }
                return Ok(result);
            }
            result.push(ch);
            self.advance();
        }

        Err(self.error("unterminated comment"))
    }

    /// Read an identifier (keywords included)
    fn read_ident(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    /// Read an integer or float literal
    fn read_number(&mut self) -> Result<TokenKind> {
        let mut digits = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else if ch == '.' && !is_float && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            digits
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal: {}", digits)))
        } else {
            digits
                .parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("invalid integer literal: {}", digits)))
        }
    }

    /// Read a double-quoted string literal with escapes
    fn read_string(&mut self) -> Result<TokenKind> {
        self.advance(); // opening quote

        let mut result = String::new();
        loop {
            match self.current_char {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some('"') => {
                    self.advance();
                    return Ok(TokenKind::Str(result));
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.current_char {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            return Err(self.error(format!("invalid escape: \\{}", other)))
                        }
                        None => return Err(self.error("unterminated string")),
                    };
                    result.push(escaped);
                    self.advance();
                }
                Some(ch) => {
                    result.push(ch);
                    self.advance();
                }
            }
        }
    }

    /// Read a back-quoted raw string literal (no escape processing)
    fn read_raw_string(&mut self) -> Result<TokenKind> {
        self.advance(); // opening backquote

        let mut result = String::new();
        loop {
            match self.current_char {
                None => return Err(self.error("unterminated raw string")),
                Some('`') => {
                    self.advance();
                    return Ok(TokenKind::Str(result));
                }
                Some(ch) => {
                    result.push(ch);
                    self.advance();
                }
            }
        }
    }

    /// Read the next token inside an action
    fn read_action_token(&mut self) -> Result<Token> {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }

        let line = self.line;
        let column = self.column;

        let ch = match self.current_char {
            Some(ch) => ch,
            None => return Err(self.error("unterminated action")),
        };

        if ch == '}' && self.peek() == Some('}') {
            self.advance();
            self.advance();
            self.in_action = false;
            return Ok(Token::new(TokenKind::RightDelim, line, column));
        }

        if ch.is_alphabetic() || ch == '_' {
            let ident = self.read_ident();
            return Ok(Token::new(TokenKind::Ident(ident), line, column));
        }

        if ch.is_ascii_digit() {
            let kind = self.read_number()?;
            return Ok(Token::new(kind, line, column));
        }

        if ch == '"' {
            let kind = self.read_string()?;
            return Ok(Token::new(kind, line, column));
        }

        if ch == '`' {
            let kind = self.read_raw_string()?;
            return Ok(Token::new(kind, line, column));
        }

        // Two-character operators first
        let two = (ch, self.peek());
        let kind = match two {
            ('=', Some('=')) => Some(TokenKind::Eq),
            ('!', Some('=')) => Some(TokenKind::Ne),
            ('<', Some('=')) => Some(TokenKind::Le),
            ('>', Some('=')) => Some(TokenKind::Ge),
            ('&', Some('&')) => Some(TokenKind::And),
            ('|', Some('|')) => Some(TokenKind::Or),
            (':', Some('=')) => Some(TokenKind::Declare),
            _ => None,
        };
        if let Some(kind) = kind {
            self.advance();
            self.advance();
            return Ok(Token::new(kind, line, column));
        }

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '!' => TokenKind::Not,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '|' => TokenKind::Pipe,
            '@' => TokenKind::At,
            other => return Err(self.error(format!("unexpected character: {:?}", other))),
        };
        self.advance();
        Ok(Token::new(kind, line, column))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token> {
        if self.in_action {
            return self.read_action_token();
        }

        let line = self.line;
        let column = self.column;

        if self.current_char.is_none() {
            return Ok(Token::new(TokenKind::Eof, line, column));
        }

        if self.at_action_open() {
            self.advance();
            self.advance();
            self.in_action = true;
            return Ok(Token::new(TokenKind::LeftDelim, line, column));
        }

        if self.at_comment_open() {
            let contents = self.read_comment()?;
            return Ok(Token::new(TokenKind::Comment(contents), line, column));
        }

        let text = self.read_text();
        Ok(Token::new(TokenKind::Text(text), line, column))
    }

    /// Tokenize the entire input, ending with an Eof token
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}
