//! A minimal lexer and recursive-descent parser for the build-description
//! DSL: just enough grammar to exercise the pipeline end to end (literals,
//! arrays, dicts, calls, method calls, `if`/`elif`/`else`, assignment,
//! `subdir`, and the placeholder-only `foreach`/`break`/`continue`). The
//! parser is treated as a boundary component, not the hard engineering —
//! it hands the builder a `CodeBlock` of located statements.

use buildgraph_core::{CompileError, SourceLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    /// Any operator besides `==`/`!=` (`+`, `*`, `<`, ternary `?:`, ...).
    /// The source's fallback path emits a placeholder; this repo instead
    /// surfaces `NotImplemented` naming the operator text.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub node: T,
    pub location: SourceLocation,
}

impl<T> Spanned<T> {
    pub fn new(node: T, location: SourceLocation) -> Self {
        Spanned { node, location }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Bool(bool),
    Number(i64),
    Str(String),
    Identifier(String),
    Array(Vec<Spanned<Expr>>),
    Dict(Vec<(Spanned<Expr>, Spanned<Expr>)>),
    Unary(UnaryOp, Box<Spanned<Expr>>),
    Binary(BinaryOp, Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    /// `cond ? a : b` — never produced by this parser's grammar subset,
    /// reserved so `ir_builder` has a single place to reject it.
    Ternary(Box<Spanned<Expr>>, Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    Subscript(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    Call {
        name: String,
        positional: Vec<Spanned<Expr>>,
        keyword: Vec<(String, Spanned<Expr>)>,
    },
    /// `receiver.method(...)`; `method` is always a `Call`.
    MethodCall {
        receiver: Box<Spanned<Expr>>,
        method: Box<Spanned<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Eq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Expr(Spanned<Expr>),
    Assign {
        lhs: String,
        op: AssignOp,
        rhs: Spanned<Expr>,
    },
    /// Left unparsed: the source only ever assigns `=`; a compound
    /// operator is recognized by the lexer but rejected here so
    /// `ir_builder` can raise a single, clear `NotImplemented`.
    CompoundAssign {
        lhs: String,
        op: String,
    },
    If {
        arms: Vec<(Spanned<Expr>, CodeBlock)>,
        else_body: Option<CodeBlock>,
    },
    Subdir(String),
    Foreach,
    Break,
    Continue,
}

pub type CodeBlock = Vec<Spanned<Statement>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub file: String,
    pub body: CodeBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Number(i64),
    True,
    False,
    If,
    Elif,
    Else,
    Endif,
    Foreach,
    EndForeach,
    Break,
    Continue,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Minus,
    Eq,
    EqEq,
    NotEq,
    Plus,
    Star,
    Slash,
    Lt,
    Gt,
    Question,
    PlusEq,
    Newline,
    Eof,
}

struct Located {
    token: Token,
    line: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    file: String,
}

impl<'a> Lexer<'a> {
    fn new(file: impl Into<String>, src: &'a str) -> Self {
        Lexer {
            chars: src.chars().peekable(),
            line: 1,
            file: file.into(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Located>, CompileError> {
        let mut out = Vec::new();
        loop {
            self.skip_blank();
            let line = self.line;
            let Some(&c) = self.chars.peek() else {
                out.push(Located {
                    token: Token::Eof,
                    line,
                });
                break;
            };
            let token = match c {
                '\n' => {
                    self.chars.next();
                    self.line += 1;
                    Token::Newline
                }
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                    continue;
                }
                '\'' | '"' => self.lex_string(c),
                '0'..='9' => self.lex_number(),
                c if c.is_alphabetic() || c == '_' => self.lex_ident(),
                '(' => self.advance(Token::LParen),
                ')' => self.advance(Token::RParen),
                '[' => self.advance(Token::LBracket),
                ']' => self.advance(Token::RBracket),
                '{' => self.advance(Token::LBrace),
                '}' => self.advance(Token::RBrace),
                ',' => self.advance(Token::Comma),
                ':' => self.advance(Token::Colon),
                '.' => self.advance(Token::Dot),
                '-' => self.advance(Token::Minus),
                '+' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        Token::PlusEq
                    } else {
                        Token::Plus
                    }
                }
                '*' => self.advance(Token::Star),
                '/' => self.advance(Token::Slash),
                '<' => self.advance(Token::Lt),
                '>' => self.advance(Token::Gt),
                '?' => self.advance(Token::Question),
                '=' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        Token::EqEq
                    } else {
                        Token::Eq
                    }
                }
                '!' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        Token::NotEq
                    } else {
                        Token::Not
                    }
                }
                other => {
                    self.chars.next();
                    return Err(CompileError::parse_at(
                        format!("unexpected character '{other}'"),
                        SourceLocation::new(self.file.clone(), line),
                    ));
                }
            };
            out.push(Located { token, line });
        }
        Ok(out)
    }

    fn advance(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn skip_blank(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self, quote: char) -> Token {
        self.chars.next();
        let mut s = String::new();
        for c in self.chars.by_ref() {
            if c == quote {
                break;
            }
            s.push(c);
        }
        Token::Str(s)
    }

    fn lex_number(&mut self) -> Token {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Token::Number(s.parse().unwrap_or(0))
    }

    fn lex_ident(&mut self) -> Token {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match s.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "if" => Token::If,
            "elif" => Token::Elif,
            "else" => Token::Else,
            "endif" => Token::Endif,
            "foreach" => Token::Foreach,
            "endforeach" => Token::EndForeach,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "not" => Token::Not,
            _ => Token::Ident(s),
        }
    }
}

pub struct Parser {
    tokens: Vec<Located>,
    pos: usize,
    file: String,
}

impl Parser {
    pub fn new(file: impl Into<String>, source: &str) -> Result<Self, CompileError> {
        let file = file.into();
        let tokens = Lexer::new(file.clone(), source).tokenize()?;
        Ok(Parser { tokens, pos: 0, file })
    }

    pub fn parse_program(mut self) -> Result<Program, CompileError> {
        let file = self.file.clone();
        let body = self.parse_block(&[])?;
        Ok(Program { file, body })
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.peek_line())
    }

    fn peek_line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.bump();
        }
    }

    fn at_terminator(&self, terminators: &[Token]) -> bool {
        matches!(self.peek(), Token::Eof) || terminators.contains(self.peek())
    }

    fn parse_block(&mut self, terminators: &[Token]) -> Result<CodeBlock, CompileError> {
        let mut block = Vec::new();
        self.skip_newlines();
        while !self.at_terminator(terminators) {
            block.push(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(block)
    }

    fn parse_statement(&mut self) -> Result<Spanned<Statement>, CompileError> {
        let location = self.loc();
        let stmt = match self.peek().clone() {
            Token::If => Spanned::new(self.parse_if()?, location),
            Token::Foreach => {
                // Placeholder construct: skip to its matching endforeach so
                // parsing can continue past it.
                self.bump();
                while !matches!(self.peek(), Token::EndForeach | Token::Eof) {
                    self.bump();
                }
                if matches!(self.peek(), Token::EndForeach) {
                    self.bump();
                }
                Spanned::new(Statement::Foreach, location)
            }
            Token::Break => {
                self.bump();
                Spanned::new(Statement::Break, location)
            }
            Token::Continue => {
                self.bump();
                Spanned::new(Statement::Continue, location)
            }
            Token::Ident(name) if name == "subdir" => {
                self.bump();
                self.expect(Token::LParen)?;
                let path = match self.bump() {
                    Token::Str(s) => s,
                    other => {
                        return Err(CompileError::parse_at(
                            format!("subdir() expects a string argument, got {other:?}"),
                            location,
                        ))
                    }
                };
                self.expect(Token::RParen)?;
                Spanned::new(Statement::Subdir(path), location)
            }
            Token::Ident(name) => {
                let save = self.pos;
                self.bump();
                if matches!(self.peek(), Token::Eq) {
                    self.bump();
                    let rhs = self.parse_expr()?;
                    return Ok(Spanned::new(
                        Statement::Assign {
                            lhs: name,
                            op: AssignOp::Eq,
                            rhs,
                        },
                        location,
                    ));
                }
                if matches!(self.peek(), Token::PlusEq) {
                    self.bump();
                    let _ = self.parse_expr()?;
                    return Ok(Spanned::new(
                        Statement::CompoundAssign {
                            lhs: name,
                            op: "+=".to_string(),
                        },
                        location,
                    ));
                }
                self.pos = save;
                let expr = self.parse_expr()?;
                Spanned::new(Statement::Expr(expr), location)
            }
            _ => {
                let expr = self.parse_expr()?;
                Spanned::new(Statement::Expr(expr), location)
            }
        };
        Ok(stmt)
    }

    fn parse_if(&mut self) -> Result<Statement, CompileError> {
        let mut arms = Vec::new();
        self.expect(Token::If)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block(&[Token::Elif, Token::Else, Token::Endif])?;
        arms.push((cond, body));
        loop {
            match self.peek().clone() {
                Token::Elif => {
                    self.bump();
                    let cond = self.parse_expr()?;
                    let body = self.parse_block(&[Token::Elif, Token::Else, Token::Endif])?;
                    arms.push((cond, body));
                }
                _ => break,
            }
        }
        let else_body = if matches!(self.peek(), Token::Else) {
            self.bump();
            Some(self.parse_block(&[Token::Endif])?)
        } else {
            None
        };
        self.expect(Token::Endif)?;
        Ok(Statement::If { arms, else_body })
    }

    fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
        self.skip_newlines();
        let location = self.loc();
        let got = self.bump();
        if got != expected {
            return Err(CompileError::parse_at(
                format!("expected {expected:?}, found {got:?}"),
                location,
            ));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Spanned<Expr>, CompileError> {
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<Spanned<Expr>, CompileError> {
        let location = self.loc();
        let lhs = self.parse_additive()?;
        let expr = match self.peek().clone() {
            Token::EqEq => {
                self.bump();
                let rhs = self.parse_additive()?;
                Spanned::new(Expr::Binary(BinaryOp::Eq, Box::new(lhs), Box::new(rhs)), location)
            }
            Token::NotEq => {
                self.bump();
                let rhs = self.parse_additive()?;
                Spanned::new(Expr::Binary(BinaryOp::Ne, Box::new(lhs), Box::new(rhs)), location)
            }
            _ => lhs,
        };
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Spanned<Expr>, CompileError> {
        let location = self.loc();
        let lhs = self.parse_unary()?;
        let expr = match self.peek().clone() {
            Token::Plus | Token::Minus | Token::Star | Token::Slash | Token::Lt | Token::Gt => {
                let op_text = match self.bump() {
                    Token::Plus => "+",
                    Token::Minus => "-",
                    Token::Star => "*",
                    Token::Slash => "/",
                    Token::Lt => "<",
                    Token::Gt => ">",
                    _ => unreachable!(),
                };
                let rhs = self.parse_unary()?;
                Spanned::new(
                    Expr::Binary(BinaryOp::Other(op_text.to_string()), Box::new(lhs), Box::new(rhs)),
                    location,
                )
            }
            Token::Question => {
                self.bump();
                let then_branch = self.parse_expr()?;
                self.expect(Token::Colon)?;
                let else_branch = self.parse_expr()?;
                Spanned::new(
                    Expr::Ternary(Box::new(lhs), Box::new(then_branch), Box::new(else_branch)),
                    location,
                )
            }
            _ => lhs,
        };
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Spanned<Expr>, CompileError> {
        let location = self.loc();
        let expr = match self.peek().clone() {
            Token::Minus => {
                self.bump();
                let operand = self.parse_unary()?;
                Spanned::new(Expr::Unary(UnaryOp::Neg, Box::new(operand)), location)
            }
            Token::Not => {
                self.bump();
                let operand = self.parse_unary()?;
                Spanned::new(Expr::Unary(UnaryOp::Not, Box::new(operand)), location)
            }
            _ => return self.parse_postfix(),
        };
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Result<Spanned<Expr>, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().clone() {
                Token::Dot => {
                    let location = self.loc();
                    self.bump();
                    let method = self.parse_primary()?;
                    expr = Spanned::new(
                        Expr::MethodCall {
                            receiver: Box::new(expr),
                            method: Box::new(method),
                        },
                        location,
                    );
                }
                Token::LBracket => {
                    let location = self.loc();
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Spanned::new(Expr::Subscript(Box::new(expr), Box::new(index)), location);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Spanned<Expr>, CompileError> {
        let location = self.loc();
        let expr = match self.bump() {
            Token::True => Spanned::new(Expr::Bool(true), location),
            Token::False => Spanned::new(Expr::Bool(false), location),
            Token::Number(n) => Spanned::new(Expr::Number(n), location),
            Token::Str(s) => Spanned::new(Expr::Str(s), location),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                inner
            }
            Token::LBracket => {
                let mut items = Vec::new();
                self.skip_newlines();
                while !matches!(self.peek(), Token::RBracket) {
                    items.push(self.parse_expr()?);
                    self.skip_newlines();
                    if matches!(self.peek(), Token::Comma) {
                        self.bump();
                        self.skip_newlines();
                    }
                }
                self.expect(Token::RBracket)?;
                Spanned::new(Expr::Array(items), location)
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                self.skip_newlines();
                while !matches!(self.peek(), Token::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(Token::Colon)?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    self.skip_newlines();
                    if matches!(self.peek(), Token::Comma) {
                        self.bump();
                        self.skip_newlines();
                    }
                }
                self.expect(Token::RBrace)?;
                Spanned::new(Expr::Dict(entries), location)
            }
            Token::Ident(name) => {
                if matches!(self.peek(), Token::LParen) {
                    self.bump();
                    let (positional, keyword) = self.parse_args()?;
                    self.expect(Token::RParen)?;
                    Spanned::new(
                        Expr::Call {
                            name,
                            positional,
                            keyword,
                        },
                        location,
                    )
                } else {
                    Spanned::new(Expr::Identifier(name), location)
                }
            }
            other => {
                return Err(CompileError::parse_at(
                    format!("unexpected token {other:?}"),
                    location,
                ))
            }
        };
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<(Vec<Spanned<Expr>>, Vec<(String, Spanned<Expr>)>), CompileError> {
        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek(), Token::RParen) {
            if let Token::Ident(name) = self.peek().clone() {
                if self.tokens.get(self.pos + 1).map(|l| &l.token) == Some(&Token::Colon) {
                    self.bump();
                    self.bump();
                    keyword.push((name, self.parse_expr()?));
                    self.skip_newlines();
                    if matches!(self.peek(), Token::Comma) {
                        self.bump();
                        self.skip_newlines();
                    }
                    continue;
                }
            }
            positional.push(self.parse_expr()?);
            self.skip_newlines();
            if matches!(self.peek(), Token::Comma) {
                self.bump();
                self.skip_newlines();
            }
        }
        Ok((positional, keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::new("meson.build", src).unwrap().parse_program().unwrap()
    }

    #[test]
    fn parses_simple_call() {
        let program = parse("project('foo')");
        assert_eq!(program.body.len(), 1);
        match &program.body[0].node {
            Statement::Expr(Spanned {
                node: Expr::Call { name, positional, .. },
                ..
            }) => {
                assert_eq!(name, "project");
                assert_eq!(positional.len(), 1);
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn parses_assignment_and_if_else() {
        let src = "if true\n  x = 9\nelse\n  x = 10\nendif\nmessage(x)\n";
        let program = parse(src);
        assert_eq!(program.body.len(), 2);
        assert!(matches!(program.body[0].node, Statement::If { .. }));
    }

    #[test]
    fn parses_nested_arrays() {
        let program = parse("x = ['a', ['b', ['c']], 'd']");
        match &program.body[0].node {
            Statement::Assign { rhs, .. } => match &rhs.node {
                Expr::Array(items) => assert_eq!(items.len(), 3),
                other => panic!("expected array, got {other:?}"),
            },
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn parses_method_call_on_identifier() {
        let program = parse("host_machine.system() == 'aix'");
        match &program.body[0].node {
            Statement::Expr(Spanned {
                node: Expr::Binary(BinaryOp::Eq, lhs, _),
                ..
            }) => {
                assert!(matches!(lhs.node, Expr::MethodCall { .. }));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn parses_keyword_arguments() {
        let program = parse("executable('exe', 'source.c', cpp_args : ['-Dfoo'])");
        match &program.body[0].node {
            Statement::Expr(Spanned {
                node: Expr::Call { keyword, .. },
                ..
            }) => {
                assert_eq!(keyword.len(), 1);
                assert_eq!(keyword[0].0, "cpp_args");
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn unexpected_character_is_a_parse_error_not_a_panic() {
        let err = Parser::new("meson.build", "x = @").unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }

    #[test]
    fn malformed_subdir_argument_is_a_parse_error() {
        let err = Parser::new("meson.build", "subdir(42)")
            .unwrap()
            .parse_program()
            .unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }

    #[test]
    fn unexpected_token_in_expression_is_a_parse_error() {
        let err = Parser::new("meson.build", "x = )").unwrap().parse_program().unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }
}
