// src/script/parser.rs
//
// Lexer and recursive descent parser for hook scripts.
//
// Grammar (newline or ';' separates statements):
//   stmt   := if expr block {elif expr block} [else block]
//           | for NAME in expr block
//           | print [expr {, expr}]
//           | target (= | += | -=) expr
//           | expr
//   target := NAME | NAME '[' expr ']'
//   block  := '{' stmts '}'
// Expression precedence, loosest first:
//   or, and, not, comparison/in, + -, * / %, unary -, index/call

use super::Value;
use super::eval::BUILTINS;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub msg: String,
}

// ============================================================================
// Syntax tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    List(Vec<Expr>),
    Var(String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Index(String, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Print(Vec<Expr>),
    Assign(Target, Option<BinOp>, Expr),
    If(Vec<(Expr, Vec<Stmt>)>, Vec<Stmt>),
    For(String, Expr, Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kw {
    If,
    Elif,
    Else,
    For,
    In,
    And,
    Or,
    Not,
    True,
    False,
    None,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Kw(Kw),
    Op(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    col: usize,
}

const TWO_CHAR_OPS: [&str; 6] = ["==", "!=", "<=", ">=", "+=", "-="];
const ONE_CHAR_OPS: [&str; 16] = ["(", ")", "[", "]", "{", "}", ",", ";", "=", "<", ">", "+", "-", "*", "/", "%"];

fn keyword(word: &str) -> Option<Kw> {
    Some(match word {
        "if" => Kw::If,
        "elif" => Kw::Elif,
        "else" => Kw::Else,
        "for" => Kw::For,
        "in" => Kw::In,
        "and" => Kw::And,
        "or" => Kw::Or,
        "not" => Kw::Not,
        "true" | "True" => Kw::True,
        "false" | "False" => Kw::False,
        "none" | "None" => Kw::None,
        _ => return None,
    })
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    /// Open ( and [ ; newlines inside them are not separators
    depth: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self { chars: src.chars().collect(), pos: 0, line: 1, col: 1, depth: 0 }
    }

    fn peek_char(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, col: usize, msg: impl Into<String>) -> ParseError {
        ParseError { line, col, msg: msg.into() }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek_char(0) {
            let (line, col) = (self.line, self.col);
            let tok = match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    continue;
                }
                '\\' if self.peek_char(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                    continue;
                }
                '#' => {
                    while self.peek_char(0).is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                    continue;
                }
                '\n' => {
                    self.bump();
                    if self.depth > 0 {
                        continue;
                    }
                    Tok::Newline
                }
                '0'..='9' => self.number(line, col)?,
                '"' | '\'' => self.string(line, col)?,
                c if c.is_alphabetic() || c == '_' => {
                    let mut word = String::new();
                    while let Some(c) = self.peek_char(0).filter(|c| c.is_alphanumeric() || *c == '_') {
                        word.push(c);
                        self.bump();
                    }
                    match keyword(&word) {
                        Some(kw) => Tok::Kw(kw),
                        None => Tok::Ident(word),
                    }
                }
                _ => self.operator(line, col)?,
            };
            tokens.push(Token { tok, line, col });
        }
        tokens.push(Token { tok: Tok::Eof, line: self.line, col: self.col });
        Ok(tokens)
    }

    fn number(&mut self, line: usize, col: usize) -> Result<Tok, ParseError> {
        let mut text = String::new();
        while let Some(c) = self.peek_char(0).filter(char::is_ascii_digit) {
            text.push(c);
            self.bump();
        }
        let is_float = self.peek_char(0) == Some('.') && self.peek_char(1).is_some_and(|c| c.is_ascii_digit());
        if !is_float {
            return text.parse().map(Tok::Int).map_err(|_| self.error(line, col, "integer literal too large"));
        }
        text.push('.');
        self.bump();
        while let Some(c) = self.peek_char(0).filter(char::is_ascii_digit) {
            text.push(c);
            self.bump();
        }
        text.parse()
            .map(Tok::Float)
            .map_err(|_| self.error(line, col, format!("bad number '{}'", text)))
    }

    fn string(&mut self, line: usize, col: usize) -> Result<Tok, ParseError> {
        let quote = self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error(line, col, "unterminated string")),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c @ ('\\' | '"' | '\'')) => text.push(c),
                    Some(c) => {
                        text.push('\\');
                        text.push(c);
                    }
                    None => return Err(self.error(line, col, "unterminated string")),
                },
                c if c == quote => return Ok(Tok::Str(text)),
                Some(c) => text.push(c),
            }
        }
    }

    fn operator(&mut self, line: usize, col: usize) -> Result<Tok, ParseError> {
        let pair: String = self.chars[self.pos..].iter().take(2).collect();
        if let Some(op) = TWO_CHAR_OPS.iter().copied().find(|op| *op == pair) {
            self.bump();
            self.bump();
            return Ok(Tok::Op(op));
        }
        let c = self.peek_char(0).unwrap_or_default();
        let Some(op) = ONE_CHAR_OPS.iter().copied().find(|op| op.starts_with(c)) else {
            return Err(self.error(line, col, format!("unexpected character '{}'", c)));
        };
        match op {
            "(" | "[" => self.depth += 1,
            ")" | "]" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.bump();
        Ok(Tok::Op(op))
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse a whole script into statements.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let stmts = parser.statements()?;
    if parser.peek() != &Tok::Eof {
        return Err(parser.unexpected());
    }
    Ok(stmts)
}

/// Deepest nesting of brackets, blocks and prefix operators accepted
const MAX_NESTING: usize = 100;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current nesting, bounded by MAX_NESTING
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Tok {
        &self.current().tok
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn at_kw(&self, kw: Kw) -> bool {
        self.peek() == &Tok::Kw(kw)
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        let t = self.current();
        ParseError { line: t.line, col: t.col, msg: msg.into() }
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn unexpected(&self) -> ParseError {
        let what = match self.peek() {
            Tok::Int(i) => i.to_string(),
            Tok::Float(f) => f.to_string(),
            Tok::Str(s) => format!("{:?}", s),
            Tok::Ident(s) => s.clone(),
            Tok::Kw(kw) => format!("{:?}", kw).to_lowercase(),
            Tok::Op(op) => op.to_string(),
            Tok::Newline => "end of line".to_string(),
            Tok::Eof => return self.error("unexpected end of input"),
        };
        self.error(format!("unexpected '{}'", what))
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ParseError> {
        if !self.at_op(op) {
            return Err(self.error(format!("expected '{}'", op)));
        }
        self.advance();
        Ok(())
    }

    fn at_separator(&self) -> bool {
        self.peek() == &Tok::Newline || self.at_op(";")
    }

    fn at_block_end(&self) -> bool {
        self.peek() == &Tok::Eof || self.at_op("}")
    }

    fn statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            while self.at_separator() {
                self.advance();
            }
            if self.at_block_end() {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
            if !self.at_separator() && !self.at_block_end() {
                return Err(self.unexpected());
            }
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_op("{")?;
        let body = self.nested(Self::statements)?;
        self.expect_op("}")?;
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.current().line;
        let kind = match self.peek() {
            Tok::Kw(Kw::If) => self.if_statement()?,
            Tok::Kw(Kw::For) => self.for_statement()?,
            Tok::Ident(name) if name == "print" && self.peek_at(1) != &Tok::Op("(") => {
                self.advance();
                let mut args = Vec::new();
                if !self.at_separator() && !self.at_block_end() {
                    args.push(self.expression()?);
                    while self.at_op(",") {
                        self.advance();
                        args.push(self.expression()?);
                    }
                }
                StmtKind::Print(args)
            }
            _ => self.simple_statement()?,
        };
        Ok(Stmt { line, kind })
    }

    fn if_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let mut branches = vec![(self.expression()?, self.block()?)];
        let mut otherwise = Vec::new();
        loop {
            // elif / else may start on the line after the closing brace
            let save = self.pos;
            while self.peek() == &Tok::Newline {
                self.advance();
            }
            if self.at_kw(Kw::Elif) {
                self.advance();
                branches.push((self.expression()?, self.block()?));
            } else if self.at_kw(Kw::Else) {
                self.advance();
                otherwise = self.block()?;
                break;
            } else {
                self.pos = save;
                break;
            }
        }
        Ok(StmtKind::If(branches, otherwise))
    }

    fn for_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let Tok::Ident(name) = self.advance() else {
            return Err(self.error("expected a loop variable name"));
        };
        if !self.at_kw(Kw::In) {
            return Err(self.error("expected 'in'"));
        }
        self.advance();
        let iter = self.expression()?;
        let body = self.block()?;
        Ok(StmtKind::For(name, iter, body))
    }

    fn simple_statement(&mut self) -> Result<StmtKind, ParseError> {
        let expr = self.expression()?;
        let op = match self.peek() {
            Tok::Op("=") => None,
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            _ => return Ok(StmtKind::Expr(expr)),
        };
        let target = match expr {
            Expr::Var(name) => Target::Name(name),
            Expr::Index(base, key) => match *base {
                Expr::Var(name) => Target::Index(name, *key),
                _ => return Err(self.error("can only assign to a name or name[key]")),
            },
            _ => return Err(self.error("can only assign to a name or name[key]")),
        };
        self.advance();
        let value = self.expression()?;
        Ok(StmtKind::Assign(target, op, value))
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::or_expr)
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while self.at_kw(Kw::Or) {
            self.advance();
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not_expr()?;
        while self.at_kw(Kw::And) {
            self.advance();
            left = Expr::And(Box::new(left), Box::new(self.not_expr()?));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.at_kw(Kw::Not) {
            self.advance();
            return Ok(Expr::Unary(UnOp::Not, Box::new(self.nested(Self::not_expr)?)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<BinOp> {
        let op = match self.peek() {
            Tok::Op("==") => BinOp::Eq,
            Tok::Op("!=") => BinOp::Ne,
            Tok::Op("<") => BinOp::Lt,
            Tok::Op("<=") => BinOp::Le,
            Tok::Op(">") => BinOp::Gt,
            Tok::Op(">=") => BinOp::Ge,
            Tok::Kw(Kw::In) => BinOp::In,
            Tok::Kw(Kw::Not) if self.peek_at(1) == &Tok::Kw(Kw::In) => {
                self.advance();
                BinOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        while let Some(op) = self.comparison_op() {
            left = Expr::Binary(op, Box::new(left), Box::new(self.additive()?));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("%") => BinOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.at_op("-") {
            self.advance();
            return Ok(Expr::Unary(UnOp::Neg, Box::new(self.nested(Self::unary)?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        while self.at_op("[") {
            self.advance();
            let key = self.expression()?;
            self.expect_op("]")?;
            expr = Expr::Index(Box::new(expr), Box::new(key));
        }
        Ok(expr)
    }

    fn comma_list(&mut self, close: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.at_op(close) {
            items.push(self.expression()?);
            if !self.at_op(",") {
                break;
            }
            self.advance();
        }
        self.expect_op(close)?;
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let expr = match self.peek().clone() {
            Tok::Int(i) => Expr::Lit(Value::Int(i)),
            Tok::Float(f) => Expr::Lit(Value::Float(f)),
            Tok::Str(s) => Expr::Lit(Value::Str(s)),
            Tok::Kw(Kw::True) => Expr::Lit(Value::Bool(true)),
            Tok::Kw(Kw::False) => Expr::Lit(Value::Bool(false)),
            Tok::Kw(Kw::None) => Expr::Lit(Value::None),
            Tok::Ident(name) if self.peek_at(1) == &Tok::Op("(") => {
                if !BUILTINS.contains(&name.as_str()) {
                    return Err(self.error(format!("unknown function '{}'", name)));
                }
                self.advance();
                self.advance();
                return Ok(Expr::Call(name, self.comma_list(")")?));
            }
            Tok::Ident(name) => Expr::Var(name),
            Tok::Op("(") => {
                self.advance();
                let inner = self.expression()?;
                self.expect_op(")")?;
                return Ok(inner);
            }
            Tok::Op("[") => {
                self.advance();
                return Ok(Expr::List(self.comma_list("]")?));
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Stmt> {
        parse_program(src).unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        parse_program(src).unwrap_err()
    }

    #[test]
    fn test_separators_and_comments() {
        let stmts = parse("a = 1; b = 2\n\n# comment\nc = 3 # trailing\n");
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[2].line, 4);
        assert!(parse("").is_empty());
        assert!(parse("  \n ; \n").is_empty());
    }

    #[test]
    fn test_precedence() {
        let stmts = parse("1 + 2 * 3");
        let StmtKind::Expr(Expr::Binary(BinOp::Add, left, right)) = &stmts[0].kind else {
            panic!("expected an addition: {:?}", stmts[0]);
        };
        assert_eq!(**left, Expr::Lit(Value::Int(1)));
        assert!(matches!(**right, Expr::Binary(BinOp::Mul, _, _)));

        let stmts = parse("not a and b or c");
        assert!(matches!(stmts[0].kind, StmtKind::Expr(Expr::Or(_, _))));
    }

    #[test]
    fn test_not_in() {
        let stmts = parse("'x' not in tags");
        assert!(matches!(stmts[0].kind, StmtKind::Expr(Expr::Binary(BinOp::NotIn, _, _))));
    }

    #[test]
    fn test_assignment_targets() {
        let stmts = parse("tags['Make'] = 'x'\ncount += 1");
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Assign(Target::Index(name, _), None, _) if name == "tags"
        ));
        assert!(matches!(
            &stmts[1].kind,
            StmtKind::Assign(Target::Name(name), Some(BinOp::Add), _) if name == "count"
        ));

        let err = parse_err("1 = 2");
        assert!(err.msg.contains("assign"));
    }

    #[test]
    fn test_if_elif_else_across_lines() {
        let stmts = parse("if a {\n x = 1\n}\nelif b { x = 2 }\nelse {\n x = 3\n}\ny = 4");
        assert_eq!(stmts.len(), 2);
        let StmtKind::If(branches, otherwise) = &stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise.len(), 1);
        assert_eq!(stmts[1].line, 8);
    }

    #[test]
    fn test_for_and_list() {
        let stmts = parse("for k in [1, 2,\n 3] { print k }");
        let StmtKind::For(name, Expr::List(items), body) = &stmts[0].kind else {
            panic!("expected for");
        };
        assert_eq!(name, "k");
        assert_eq!(items.len(), 3);
        assert!(matches!(body[0].kind, StmtKind::Print(_)));
    }

    #[test]
    fn test_print_forms() {
        let stmts = parse("print \"BYE\", arg\nprint(filepath)\nprint");
        assert!(matches!(&stmts[0].kind, StmtKind::Print(args) if args.len() == 2));
        assert!(matches!(&stmts[1].kind, StmtKind::Expr(Expr::Call(name, _)) if name == "print"));
        assert!(matches!(&stmts[2].kind, StmtKind::Print(args) if args.is_empty()));
    }

    #[test]
    fn test_literals() {
        let stmts = parse("x = [True, none, \"it's\", 'a\\tb', 2.5, -3]");
        let StmtKind::Assign(_, _, Expr::List(items)) = &stmts[0].kind else {
            panic!("expected list assignment");
        };
        assert_eq!(items[0], Expr::Lit(Value::Bool(true)));
        assert_eq!(items[1], Expr::Lit(Value::None));
        assert_eq!(items[2], Expr::Lit(Value::Str("it's".to_string())));
        assert_eq!(items[3], Expr::Lit(Value::Str("a\tb".to_string())));
        assert_eq!(items[4], Expr::Lit(Value::Float(2.5)));
        assert!(matches!(items[5], Expr::Unary(UnOp::Neg, _)));
    }

    #[test]
    fn test_errors_have_positions() {
        let err = parse_err("x = 1\ny = (2 + ");
        assert_eq!(err.line, 2);
        assert_eq!(err.msg, "unexpected end of input");

        let err = parse_err("x = 'open");
        assert_eq!((err.line, err.col), (1, 5));
        assert_eq!(err.msg, "unterminated string");

        let err = parse_err("x = 1 $");
        assert_eq!(err.col, 7);

        let err = parse_err("frobnicate(1)");
        assert_eq!(err.msg, "unknown function 'frobnicate'");

        assert!(parse_program("if x { y = 1").is_err());
        assert!(parse_program("}").is_err());
        assert!(parse_program("a b").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = |open: &str, close: &str, n: usize| format!("x = {}1{}", open.repeat(n), close.repeat(n));
        assert!(parse_program(&deep("(", ")", 50)).is_ok());
        assert!(parse_program(&deep("[", "]", 50)).is_ok());

        let err = parse_err(&deep("(", ")", 20_000));
        assert_eq!((err.line, err.msg.as_str()), (1, "nested too deeply"));
        assert_eq!(parse_err(&deep("[", "]", 20_000)).msg, "nested too deeply");
        assert_eq!(parse_err(&deep("-", "", 20_000)).msg, "nested too deeply");
        assert_eq!(parse_err(&deep("not ", "", 20_000)).msg, "nested too deeply");
        assert_eq!(parse_err(&"if a {".repeat(20_000)).msg, "nested too deeply");
    }
}
