//! Frame console: a small expression language over a frame's locals
//!
//! ```text
//! stmt    := IDENT '=' expr | expr
//! expr    := and ('or' and)*
//! and     := not ('and' not)*
//! not     := 'not' not | cmp
//! cmp     := sum (('=='|'!='|'<'|'<='|'>'|'>=') sum)?
//! sum     := product (('+'|'-') product)*
//! product := unary (('*'|'/'|'%') unary)*
//! unary   := '-' unary | postfix
//! postfix := primary ('.' IDENT | '[' expr ']')*
//! primary := NUMBER | STRING | true | false | null | IDENT
//!          | IDENT '(' args ')' | '(' expr ')' | '[' args ']'
//! ```
//!
//! Builtins: `len`, `type`, `keys`, `str`, `locals`. Values are JSON values;
//! assignments persist in the console for later commands.
//!
//! Expressions nest at most [`MAX_NESTING`] levels and no value grows past
//! [`MAX_VALUE_BYTES`]; both limits surface as errors, never as a crash.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Deepest nesting of parentheses, brackets, calls and unary operators
pub const MAX_NESTING: usize = 64;

/// Longest command the console accepts, in bytes
pub const MAX_COMMAND_LEN: usize = 4096;

/// Largest value a command may build, counted in string bytes and elements
pub const MAX_VALUE_BYTES: usize = 1 << 20;

/// Result of one console command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleOutput {
    pub command: String,
    /// Rendered value, error text, or empty for an assignment
    pub result: String,
    pub is_error: bool,
}

impl ConsoleOutput {
    /// `>>> command\nresult`, HTML-escaped
    pub fn to_html(&self) -> String {
        crate::util::escape_html(&format!(">>> {}\n{}", self.command, self.result))
    }
}

/// Evaluation context bound to one frame
#[derive(Debug, Default)]
pub struct Console {
    bindings: BTreeMap<String, Value>,
}

impl Console {
    pub fn new(bindings: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
        }
    }

    pub fn eval(&mut self, command: &str) -> ConsoleOutput {
        let (result, is_error) = match self.run(command) {
            Ok(Some(value)) => (repr(&value), false),
            Ok(None) => (String::new(), false),
            Err(e) => (e.to_string(), true),
        };
        ConsoleOutput {
            command: command.to_string(),
            result,
            is_error,
        }
    }

    fn run(&mut self, command: &str) -> Result<Option<Value>, EvalError> {
        let tokens = tokenize(command)?;
        if tokens.is_empty() {
            return Ok(None);
        }

        if let [Token::Ident(name), Token::Assign, rest @ ..] = tokens.as_slice() {
            let mut parser = Parser::new(rest, &self.bindings);
            let value = parser.parse_all()?;
            weigh(&value)?;
            self.bindings.insert(name.clone(), value);
            return Ok(None);
        }

        let mut parser = Parser::new(&tokens, &self.bindings);
        parser.parse_all().map(Some)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EvalError {
    #[error("SyntaxError: {0}")]
    Syntax(String),
    #[error("NameError: name '{0}' is not defined")]
    Name(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("KeyError: {0}")]
    Key(String),
    #[error("IndexError: {0}")]
    Index(String),
    #[error("ZeroDivisionError: division by zero")]
    ZeroDivision,
    #[error("MemoryError: {0}")]
    Memory(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                    i += 1;
                }
                let is_float = i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                tokens.push(if is_float {
                    Token::Float(text.parse().map_err(|_| EvalError::Syntax(format!("bad number {text}")))?)
                } else {
                    Token::Int(text.parse().map_err(|_| EvalError::Syntax(format!("bad number {text}")))?)
                });
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(EvalError::Syntax("unterminated string".into())),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| EvalError::Syntax("unterminated string".into()))?;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Op("=="), 2),
                    ('!', Some('=')) => (Token::Op("!="), 2),
                    ('<', Some('=')) => (Token::Op("<="), 2),
                    ('>', Some('=')) => (Token::Op(">="), 2),
                    ('=', _) => (Token::Assign, 1),
                    ('<', _) => (Token::Op("<"), 1),
                    ('>', _) => (Token::Op(">"), 1),
                    ('+', _) => (Token::Op("+"), 1),
                    ('-', _) => (Token::Op("-"), 1),
                    ('*', _) => (Token::Op("*"), 1),
                    ('/', _) => (Token::Op("/"), 1),
                    ('%', _) => (Token::Op("%"), 1),
                    ('(', _) => (Token::LParen, 1),
                    (')', _) => (Token::RParen, 1),
                    ('[', _) => (Token::LBracket, 1),
                    (']', _) => (Token::RBracket, 1),
                    (',', _) => (Token::Comma, 1),
                    ('.', _) => (Token::Dot, 1),
                    _ => return Err(EvalError::Syntax(format!("unexpected character '{c}'"))),
                };
                tokens.push(token);
                i += width;
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    bindings: &'a BTreeMap<String, Value>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], bindings: &'a BTreeMap<String, Value>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            bindings,
        }
    }

    fn parse_all(&mut self) -> Result<Value, EvalError> {
        let value = self.expr()?;
        match self.peek() {
            None => Ok(value),
            Some(token) => Err(EvalError::Syntax(format!("unexpected {token:?}"))),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) && {
            self.pos += 1;
            true
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), EvalError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(EvalError::Syntax(format!("expected {expected:?}")))
        }
    }

    /// Run `parse` one nesting level deeper
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Value, EvalError>,
    ) -> Result<Value, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::Syntax("expression too deeply nested".into()));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Value, EvalError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = if truthy(&left) { left } else { right };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, EvalError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            let right = self.not()?;
            left = if truthy(&left) { right } else { left };
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Value, EvalError> {
        if self.eat_keyword("not") {
            let value = self.nested(Self::not)?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Value, EvalError> {
        let left = self.sum()?;
        let op = match self.peek() {
            Some(Token::Op(op @ ("==" | "!=" | "<" | "<=" | ">" | ">="))) => *op,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.sum()?;
        compare(op, &left, &right).map(Value::Bool)
    }

    fn sum(&mut self) -> Result<Value, EvalError> {
        let mut left = self.product()?;
        while let Some(Token::Op(op @ ("+" | "-"))) = self.peek() {
            self.pos += 1;
            let right = self.product()?;
            left = arithmetic(op, &left, &right)?;
        }
        Ok(left)
    }

    fn product(&mut self) -> Result<Value, EvalError> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ ("*" | "/" | "%"))) = self.peek() {
            self.pos += 1;
            let right = self.unary()?;
            left = arithmetic(op, &left, &right)?;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value, EvalError> {
        if self.eat(&Token::Op("-")) {
            let value = self.nested(Self::unary)?;
            return arithmetic("-", &Value::from(0), &value);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Value, EvalError> {
        let mut value = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let Some(Token::Ident(field)) = self.next() else {
                    return Err(EvalError::Syntax("expected attribute name".into()));
                };
                value = attribute(&value, field)?;
            } else if self.eat(&Token::LBracket) {
                let index = self.nested(Self::expr)?;
                self.expect(&Token::RBracket)?;
                value = subscript(&value, &index)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn primary(&mut self) -> Result<Value, EvalError> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Value::from(*n)),
            Some(Token::Float(f)) => Ok(float(*f)),
            Some(Token::Str(s)) => Ok(Value::from(s.as_str())),
            Some(Token::LParen) => {
                let value = self.nested(Self::expr)?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            Some(Token::LBracket) => {
                let list = Value::Array(self.args(&Token::RBracket)?);
                weigh(&list)?;
                Ok(list)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" | "True" => Ok(Value::Bool(true)),
                "false" | "False" => Ok(Value::Bool(false)),
                "null" | "None" => Ok(Value::Null),
                _ if self.eat(&Token::LParen) => {
                    let args = self.args(&Token::RParen)?;
                    self.call(name, args)
                }
                _ => self
                    .bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::Name(name.clone())),
            },
            Some(token) => Err(EvalError::Syntax(format!("unexpected {token:?}"))),
            None => Err(EvalError::Syntax("unexpected end of input".into())),
        }
    }

    fn args(&mut self, close: &Token) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::new();
        let mut size = 0;
        if self.eat(close) {
            return Ok(values);
        }
        loop {
            let value = self.nested(Self::expr)?;
            size += weigh(&value)?;
            if size > MAX_VALUE_BYTES {
                return Err(too_large());
            }
            values.push(value);
            if self.eat(close) {
                return Ok(values);
            }
            self.expect(&Token::Comma)?;
            // Trailing comma
            if self.eat(close) {
                return Ok(values);
            }
        }
    }

    fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let single = |args: Vec<Value>| -> Result<Value, EvalError> {
            let mut args = args.into_iter();
            match (args.next(), args.next()) {
                (Some(value), None) => Ok(value),
                _ => Err(EvalError::Type(format!("{name}() takes exactly one argument"))),
            }
        };

        match name {
            "len" => match single(args)? {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(a) => Ok(Value::from(a.len())),
                Value::Object(o) => Ok(Value::from(o.len())),
                other => Err(EvalError::Type(format!("object of type '{}' has no len()", type_name(&other)))),
            },
            "type" => Ok(Value::from(type_name(&single(args)?))),
            "keys" => match single(args)? {
                Value::Object(o) => Ok(Value::Array(o.keys().map(|k| Value::from(k.as_str())).collect())),
                other => Err(EvalError::Type(format!("'{}' has no keys", type_name(&other)))),
            },
            "str" => Ok(Value::from(display(&single(args)?))),
            "locals" if args.is_empty() => Ok(Value::Object(
                self.bindings
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Map<_, _>>(),
            )),
            "locals" => Err(EvalError::Type("locals() takes no arguments".into())),
            _ => Err(EvalError::Name(name.to_string())),
        }
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Rendering used for console results: strings quoted, everything else as JSON
fn repr(value: &Value) -> String {
    value.to_string()
}

/// Rendering used by `str()`: strings unquoted
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn attribute(value: &Value, field: &str) -> Result<Value, EvalError> {
    match value {
        Value::Object(map) => map
            .get(field)
            .cloned()
            .ok_or_else(|| EvalError::Key(format!("'{field}'"))),
        other => Err(EvalError::Type(format!(
            "'{}' object has no attribute '{field}'",
            type_name(other)
        ))),
    }
}

fn subscript(value: &Value, index: &Value) -> Result<Value, EvalError> {
    match (value, index) {
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::Key(format!("'{key}'"))),
        (Value::Array(items), Value::Number(n)) => {
            let i = n
                .as_i64()
                .ok_or_else(|| EvalError::Type("list indices must be integers".into()))?;
            let len = items.len() as i64;
            let resolved = if i < 0 { len + i } else { i };
            usize::try_from(resolved)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| EvalError::Index("list index out of range".into()))
        }
        (Value::String(s), Value::Number(n)) => {
            let i = n
                .as_i64()
                .ok_or_else(|| EvalError::Type("string indices must be integers".into()))?;
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let resolved = if i < 0 { len + i } else { i };
            usize::try_from(resolved)
                .ok()
                .and_then(|i| chars.get(i))
                .map(|c| Value::from(c.to_string()))
                .ok_or_else(|| EvalError::Index("string index out of range".into()))
        }
        (value, index) => Err(EvalError::Type(format!(
            "'{}' object is not subscriptable with '{}'",
            type_name(value),
            type_name(index)
        ))),
    }
}

fn arithmetic(op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => numeric(op, a, b),
        (Value::String(a), Value::String(b)) if op == "+" => {
            if a.len() + b.len() > MAX_VALUE_BYTES {
                return Err(too_large());
            }
            Ok(Value::from(format!("{a}{b}")))
        }
        (Value::Array(a), Value::Array(b)) if op == "+" => {
            if weigh(left)? + weigh(right)? > MAX_VALUE_BYTES {
                return Err(too_large());
            }
            Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Value::String(s), Value::Number(n)) if op == "*" => {
            // Negative counts repeat zero times
            let times = match n.as_u64() {
                Some(t) => usize::try_from(t).map_err(|_| too_large())?,
                None => 0,
            };
            match s.len().checked_mul(times) {
                Some(len) if len <= MAX_VALUE_BYTES => Ok(Value::from(s.repeat(times))),
                _ => Err(too_large()),
            }
        }
        _ => Err(EvalError::Type(format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn too_large() -> EvalError {
    EvalError::Memory(format!("result exceeds {MAX_VALUE_BYTES} bytes"))
}

/// Size of `value` in string bytes and elements, bounded by the value limits
///
/// Walks without recursion and stops as soon as a limit is crossed.
fn weigh(value: &Value) -> Result<usize, EvalError> {
    let mut total = 0usize;
    let mut pending = vec![(value, 1usize)];
    while let Some((value, depth)) = pending.pop() {
        if depth > MAX_NESTING {
            return Err(EvalError::Memory("value nested too deeply".into()));
        }
        total += match value {
            Value::String(s) => s.len(),
            Value::Array(items) => {
                pending.extend(items.iter().map(|item| (item, depth + 1)));
                1
            }
            Value::Object(map) => {
                for (key, item) in map {
                    total += key.len();
                    pending.push((item, depth + 1));
                }
                1
            }
            _ => 1,
        };
        if total > MAX_VALUE_BYTES {
            return Err(too_large());
        }
    }
    Ok(total)
}

fn numeric(op: &str, a: &Number, b: &Number) -> Result<Value, EvalError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            "+" => x.checked_add(y),
            "-" => x.checked_sub(y),
            "*" => x.checked_mul(y),
            "/" if y == 0 => return Err(EvalError::ZeroDivision),
            "/" if x.checked_rem(y) == Some(0) => x.checked_div(y),
            "/" => return Ok(float(x as f64 / y as f64)),
            "%" if y == 0 => return Err(EvalError::ZeroDivision),
            "%" => x.checked_rem_euclid(y),
            _ => None,
        };
        if let Some(value) = result {
            return Ok(Value::from(value));
        }
    }

    let (x, y) = (
        a.as_f64().unwrap_or(f64::NAN),
        b.as_f64().unwrap_or(f64::NAN),
    );
    let result = match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" | "%" if y == 0.0 => return Err(EvalError::ZeroDivision),
        "/" => x / y,
        "%" => x.rem_euclid(y),
        _ => return Err(EvalError::Syntax(format!("unknown operator {op}"))),
    };
    Ok(float(result))
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<bool, EvalError> {
    use std::cmp::Ordering;

    if op == "==" {
        return Ok(loose_eq(left, right));
    }
    if op == "!=" {
        return Ok(!loose_eq(left, right));
    }

    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
    .ok_or_else(|| {
        EvalError::Type(format!(
            "'{op}' not supported between '{}' and '{}'",
            type_name(left),
            type_name(right)
        ))
    })?;

    Ok(match op {
        "<" => ordering == Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        ">" => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

/// Equality that treats `1` and `1.0` as the same number
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}
