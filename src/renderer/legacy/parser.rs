//! Compiles legacy template source into a [`Template`].
//!
//! The language is line oriented: a line whose first non-blank text is
//! `#keyword` is a directive and is consumed whole, every other line is text
//! with `$placeholders` in it.

use super::ast::{BinaryOp, Branch, Expr, Macro, Node, Param, Template};
use super::error::{LegacyError, LegacyResult};
use super::lexer::{is_ident_char, is_ident_start, tokenize, Token};
use log::debug;
use serde_json::Value;
use std::sync::Arc;

const DIRECTIVES: &[&str] = &[
    "if",
    "elif",
    "else",
    "end",
    "for",
    "set",
    "silent",
    "def",
    "raw",
    "import",
    "from",
    "errorCatcher",
];

const LIST_ERRORS: &str = "ListErrors";

/// Parentheses, brackets and prefix operators inside one expression.
const MAX_EXPRESSION_DEPTH: usize = 64;
/// Operators, lookups and calls in one expression; bounds the tree depth.
const MAX_EXPRESSION_NODES: usize = 256;
/// Open `#if`/`#for`/`#def` blocks.
const MAX_BLOCK_DEPTH: usize = 64;

/// Parses a standalone expression, e.g. a directive argument.
pub fn parse_expression(input: &str) -> LegacyResult<Expr> {
    let mut parser = ExprParser::new(tokenize(input)?);
    let expr = parser.expression()?;
    parser.finish()?;
    Ok(expr)
}

/// Parses a whole template.
pub fn parse_template(source: &str) -> LegacyResult<Template> {
    TemplateParser::default().parse(&strip_block_comments(source))
}

fn strip_block_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("#*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*#") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    nodes: usize,
}

impl ExprParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, depth: 0, nodes: 0 }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> LegacyResult<T>) -> LegacyResult<T> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(LegacyError::TooDeep { what: "expressions", limit: MAX_EXPRESSION_DEPTH });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn node(&mut self, expr: Expr) -> LegacyResult<Expr> {
        self.nodes += 1;
        if self.nodes > MAX_EXPRESSION_NODES {
            return Err(LegacyError::TooDeep { what: "expression operations", limit: MAX_EXPRESSION_NODES });
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> LegacyResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> LegacyError {
        match self.peek() {
            Some(token) => LegacyError::type_error(format!("unexpected {token:?}")),
            None => LegacyError::type_error("unexpected end of expression"),
        }
    }

    fn finish(&self) -> LegacyResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn ident(&mut self) -> LegacyResult<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn expression(&mut self) -> LegacyResult<Expr> {
        self.nested(Self::or)
    }

    fn or(&mut self) -> LegacyResult<Expr> {
        let mut left = self.and()?;
        while self.at_keyword("or") {
            self.pos += 1;
            let right = self.and()?;
            left = self.node(Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right)))?;
        }
        Ok(left)
    }

    fn and(&mut self) -> LegacyResult<Expr> {
        let mut left = self.not()?;
        while self.at_keyword("and") {
            self.pos += 1;
            let right = self.not()?;
            left = self.node(Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right)))?;
        }
        Ok(left)
    }

    fn not(&mut self) -> LegacyResult<Expr> {
        if self.at_keyword("not") {
            self.pos += 1;
            let inner = self.nested(Self::not)?;
            return self.node(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> LegacyResult<Expr> {
        let left = self.additive()?;
        let (op, width) = match self.peek() {
            Some(Token::Op("==")) => (BinaryOp::Eq, 1),
            Some(Token::Op("!=")) => (BinaryOp::Ne, 1),
            Some(Token::Op("<")) => (BinaryOp::Lt, 1),
            Some(Token::Op("<=")) => (BinaryOp::Le, 1),
            Some(Token::Op(">")) => (BinaryOp::Gt, 1),
            Some(Token::Op(">=")) => (BinaryOp::Ge, 1),
            Some(Token::Ident(word)) if word == "in" => (BinaryOp::In, 1),
            Some(Token::Ident(word))
                if word == "not"
                    && matches!(self.peek_at(1), Some(Token::Ident(next)) if next == "in") =>
            {
                (BinaryOp::NotIn, 2)
            }
            _ => return Ok(left),
        };
        self.pos += width;
        let right = self.additive()?;
        self.node(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> LegacyResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("+")) => BinaryOp::Add,
                Some(Token::Op("-")) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = self.node(Expr::Binary(op, Box::new(left), Box::new(right)))?;
        }
    }

    fn term(&mut self) -> LegacyResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinaryOp::Mul,
                Some(Token::Op("/")) => BinaryOp::Div,
                Some(Token::Op("%")) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = self.node(Expr::Binary(op, Box::new(left), Box::new(right)))?;
        }
    }

    fn unary(&mut self) -> LegacyResult<Expr> {
        if self.eat(&Token::Op("-")) {
            let inner = self.nested(Self::unary)?;
            return self.node(Expr::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> LegacyResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.ident()?;
                expr = self.node(Expr::Attr(Box::new(expr), name))?;
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(&Token::RBracket)?;
                expr = self.node(Expr::Index(Box::new(expr), Box::new(index)))?;
            } else if self.eat(&Token::LParen) {
                let args = self.sequence(&Token::RParen)?;
                expr = self.node(Expr::Call(Box::new(expr), args))?;
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to and including `close`.
    fn sequence(&mut self, close: &Token) -> LegacyResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> LegacyResult<Expr> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::from(f))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "True" => Expr::Literal(Value::Bool(true)),
                "False" => Expr::Literal(Value::Bool(false)),
                "None" => Expr::Literal(Value::Null),
                _ => Expr::Var(name),
            }),
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                let items = self.sequence(&Token::RBracket)?;
                self.node(Expr::List(items))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }
}

enum BlockKind {
    Root,
    If { branches: Vec<Branch>, pending: Option<(Expr, usize)> },
    For { targets: Vec<String>, iterable: Expr },
    Def { name: String, params: Vec<Param> },
}

impl BlockKind {
    fn keyword(&self) -> &'static str {
        match self {
            BlockKind::Root => "template",
            BlockKind::If { .. } => "if",
            BlockKind::For { .. } => "for",
            BlockKind::Def { .. } => "def",
        }
    }
}

struct Block {
    kind: BlockKind,
    nodes: Vec<Node>,
    line: usize,
}

#[derive(Default)]
struct TemplateParser {
    stack: Vec<Block>,
    template: Template,
    raw_since: Option<usize>,
}

impl TemplateParser {
    fn parse(mut self, source: &str) -> LegacyResult<Template> {
        self.stack.push(Block { kind: BlockKind::Root, nodes: Vec::new(), line: 1 });

        for (index, line) in source.split_inclusive('\n').enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim_start();

            if self.raw_since.is_some() {
                if directive_keyword(trimmed) == Some("end")
                    && directive_args(trimmed, "end") == "raw"
                {
                    self.raw_since = None;
                } else {
                    self.push_node(Node::Text(line.to_string()));
                }
                continue;
            }

            if trimmed.starts_with("##") {
                continue;
            }

            match directive_keyword(trimmed) {
                Some(keyword) => {
                    let args = directive_args(trimmed, keyword);
                    self.directive(keyword, args, line_no)?;
                }
                None => self.text(line, line_no)?,
            }
        }

        if let Some(line) = self.raw_since {
            return Err(LegacyError::parse(line, "#raw is never closed"));
        }
        if self.stack.len() > 1 {
            let open = &self.stack[self.stack.len() - 1];
            return Err(LegacyError::parse(
                open.line,
                format!("#{} is never closed", open.kind.keyword()),
            ));
        }

        let root = self.stack.pop().map(|block| block.nodes).unwrap_or_default();
        self.template.body = root;
        Ok(self.template)
    }

    fn push_node(&mut self, node: Node) {
        if let Some(block) = self.stack.last_mut() {
            block.nodes.push(node);
        }
    }

    fn open(&mut self, kind: BlockKind, line: usize) -> LegacyResult<()> {
        // The root block does not count.
        if self.stack.len() > MAX_BLOCK_DEPTH {
            return Err(LegacyError::parse(
                line,
                LegacyError::TooDeep { what: "blocks", limit: MAX_BLOCK_DEPTH }.to_string(),
            ));
        }
        self.stack.push(Block { kind, nodes: Vec::new(), line });
        Ok(())
    }

    fn directive(&mut self, keyword: &str, args: &str, line: usize) -> LegacyResult<()> {
        let at_line = |err: LegacyError| match err {
            err @ LegacyError::Parse { .. } => err,
            err => LegacyError::parse(line, err.to_string()),
        };

        match keyword {
            "if" => {
                let condition = parse_expression(args).map_err(at_line)?;
                self.open(
                    BlockKind::If { branches: Vec::new(), pending: Some((condition, line)) },
                    line,
                )?;
            }
            "elif" => self.next_branch(Some(args), line)?,
            "else" => match args.strip_prefix("if") {
                Some(condition) if condition.starts_with(char::is_whitespace) => {
                    self.next_branch(Some(condition), line)?
                }
                _ => self.next_branch(None, line)?,
            },
            "for" => {
                let (targets, iterable) = parse_for(args).map_err(at_line)?;
                self.open(BlockKind::For { targets, iterable }, line)?;
            }
            "set" => {
                let (name, value) = parse_set(args).map_err(at_line)?;
                self.push_node(Node::Set { name, value, line });
            }
            "silent" => {
                let expr = parse_expression(args).map_err(at_line)?;
                self.push_node(Node::Silent { expr, line });
            }
            "def" => {
                let (name, params) = parse_def(args).map_err(at_line)?;
                self.open(BlockKind::Def { name, params }, line)?;
            }
            "raw" => self.raw_since = Some(line),
            "import" | "from" => debug!("Ignoring #{keyword} {args} on line {line}"),
            "errorCatcher" => {
                if args != LIST_ERRORS {
                    return Err(LegacyError::parse(
                        line,
                        format!("unsupported error catcher '{args}'"),
                    ));
                }
                self.template.catch_errors = true;
            }
            "end" => self.close(args, line)?,
            _ => unreachable!("directive keywords are filtered by DIRECTIVES"),
        }
        Ok(())
    }

    fn next_branch(&mut self, condition: Option<&str>, line: usize) -> LegacyResult<()> {
        let condition = condition
            .map(|c| parse_expression(c).map_err(|err| LegacyError::parse(line, err.to_string())))
            .transpose()?;
        let Some(block) = self.stack.last_mut() else {
            return Err(LegacyError::parse(line, "#else outside of #if"));
        };
        let BlockKind::If { branches, pending } = &mut block.kind else {
            return Err(LegacyError::parse(line, "#else outside of #if"));
        };
        let Some((previous, previous_line)) = pending.take() else {
            return Err(LegacyError::parse(line, "branch after #else"));
        };
        branches.push(Branch {
            condition: previous,
            body: std::mem::take(&mut block.nodes),
            line: previous_line,
        });
        // An #else body collects in block.nodes with nothing pending.
        if let Some(condition) = condition {
            *pending = Some((condition, line));
        }
        Ok(())
    }

    fn close(&mut self, args: &str, line: usize) -> LegacyResult<()> {
        if self.stack.len() < 2 {
            return Err(LegacyError::parse(line, format!("#end {args} without an open block")));
        }
        let Some(block) = self.stack.pop() else {
            return Err(LegacyError::parse(line, "unbalanced #end"));
        };
        if args != block.kind.keyword() {
            return Err(LegacyError::parse(
                line,
                format!("#end {args} closes #{} opened on line {}", block.kind.keyword(), block.line),
            ));
        }

        match block.kind {
            BlockKind::If { mut branches, pending } => {
                let otherwise = match pending {
                    Some((condition, branch_line)) => {
                        branches.push(Branch { condition, body: block.nodes, line: branch_line });
                        Vec::new()
                    }
                    None => block.nodes,
                };
                self.push_node(Node::If { branches, otherwise });
            }
            BlockKind::For { targets, iterable } => {
                self.push_node(Node::For {
                    targets,
                    iterable,
                    body: block.nodes,
                    line: block.line,
                });
            }
            BlockKind::Def { name, params } => {
                let body = block.nodes;
                self.template
                    .macros
                    .insert(name.clone(), Arc::new(Macro { name, params, body }));
            }
            BlockKind::Root => unreachable!("the root block is never popped by #end"),
        }
        Ok(())
    }

    fn text(&mut self, line: &str, line_no: usize) -> LegacyResult<()> {
        let mut literal = String::new();
        let mut i = 0;

        while i < line.len() {
            let rest = &line[i..];
            if rest.starts_with("\\$") || rest.starts_with("\\#") {
                literal.push_str(&rest[1..2]);
                i += 2;
            } else if rest.starts_with("##") {
                // Line comment: keep only the line ending.
                if line.ends_with('\n') {
                    literal.push('\n');
                }
                break;
            } else if rest.starts_with("#slurp") && rest["#slurp".len()..].trim().is_empty() {
                break;
            } else if rest.starts_with('$') {
                match placeholder_end(line, i) {
                    Some(end) => {
                        let code = &line[i..end];
                        let expr = placeholder_expression(code)
                            .map_err(|err| LegacyError::parse(line_no, err.to_string()))?;
                        match expr {
                            Some(expr) => {
                                if !literal.is_empty() {
                                    self.push_node(Node::Text(std::mem::take(&mut literal)));
                                }
                                self.push_node(Node::Placeholder {
                                    expr,
                                    code: code.to_string(),
                                    line: line_no,
                                });
                                i = end;
                            }
                            None => {
                                literal.push('$');
                                i += 1;
                            }
                        }
                    }
                    None => {
                        literal.push('$');
                        i += 1;
                    }
                }
            } else {
                let c = rest.chars().next().unwrap_or_default();
                literal.push(c);
                i += c.len_utf8().max(1);
            }
        }

        if !literal.is_empty() {
            self.push_node(Node::Text(literal));
        }
        Ok(())
    }
}

/// The directive keyword of a trimmed line, if it starts with one.
fn directive_keyword(trimmed: &str) -> Option<&'static str> {
    let rest = trimmed.strip_prefix('#')?;
    let word: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let keyword = *DIRECTIVES.iter().find(|keyword| **keyword == word)?;
    // `#set`, not `#settings`; digits and `_` continue an identifier too.
    match rest[word.len()..].chars().next() {
        Some(c) if is_ident_char(c) => None,
        _ => Some(keyword),
    }
}

fn directive_args<'a>(trimmed: &'a str, keyword: &str) -> &'a str {
    trimmed[1 + keyword.len()..].trim()
}

/// Finds where a `$` placeholder starting at `start` ends, or `None` when the
/// `$` is plain text.
fn placeholder_end(line: &str, start: usize) -> Option<usize> {
    let bytes = line.as_bytes();
    let next = *bytes.get(start + 1)?;

    if next == b'{' {
        return find_closing(line, start + 1, b'{', b'}').map(|close| close + 1);
    }
    if !is_ident_start(next as char) {
        return None;
    }

    let mut i = start + 1;
    while i < bytes.len() && is_ident_char(bytes[i] as char) {
        i += 1;
    }
    loop {
        match bytes.get(i) {
            Some(b'.') if bytes.get(i + 1).is_some_and(|c| is_ident_start(*c as char)) => {
                i += 1;
                while i < bytes.len() && is_ident_char(bytes[i] as char) {
                    i += 1;
                }
            }
            Some(b'(') => match find_closing(line, i, b'(', b')') {
                Some(close) => i = close + 1,
                None => break,
            },
            Some(b'[') => match find_closing(line, i, b'[', b']') {
                Some(close) => i = close + 1,
                None => break,
            },
            _ => break,
        }
    }
    Some(i)
}

/// Index of the delimiter that closes the one at `open_at`, skipping quoted
/// strings.
fn find_closing(line: &str, open_at: usize, open: u8, close: u8) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open_at;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == open => depth += 1,
            None if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            None => {}
        }
        i += 1;
    }
    None
}

/// Parses the expression inside a placeholder. `${...}` that is not a valid
/// expression (shell parameter expansion, for instance) stays literal.
fn placeholder_expression(code: &str) -> LegacyResult<Option<Expr>> {
    match code.strip_prefix("${").and_then(|inner| inner.strip_suffix('}')) {
        Some(inner) => Ok(parse_expression(inner).ok()),
        None => parse_expression(&code[1..]).map(Some),
    }
}

fn parse_set(args: &str) -> LegacyResult<(String, Expr)> {
    let args = args.strip_prefix("global ").unwrap_or(args);
    let mut parser = ExprParser::new(tokenize(args)?);
    let name = parser.ident()?;
    parser.expect(&Token::Assign)?;
    let value = parser.expression()?;
    parser.finish()?;
    Ok((name, value))
}

fn parse_for(args: &str) -> LegacyResult<(Vec<String>, Expr)> {
    let mut parser = ExprParser::new(tokenize(args)?);
    let mut targets = vec![parser.ident()?];
    while parser.eat(&Token::Comma) {
        targets.push(parser.ident()?);
    }
    if !parser.at_keyword("in") {
        return Err(parser.unexpected());
    }
    parser.pos += 1;
    let iterable = parser.expression()?;
    parser.finish()?;
    Ok((targets, iterable))
}

fn parse_def(args: &str) -> LegacyResult<(String, Vec<Param>)> {
    let mut parser = ExprParser::new(tokenize(args)?);
    let name = parser.ident()?;
    let mut params = Vec::new();
    if parser.eat(&Token::LParen) {
        while !parser.eat(&Token::RParen) {
            let name = parser.ident()?;
            let default =
                if parser.eat(&Token::Assign) { Some(parser.expression()?) } else { None };
            params.push(Param { name, default });
            if !parser.eat(&Token::Comma) {
                parser.expect(&Token::RParen)?;
                break;
            }
        }
    }
    parser.finish()?;
    Ok((name, params))
}
