//! Executes compiled legacy templates.

use super::ast::{BinaryOp, Expr, Macro, MacroTable, Node, Template};
use super::error::{LegacyError, LegacyResult};
use super::macros::MacroLibrary;
use super::parser::parse_template;
use super::snippets::SnippetLoader;
use crate::constants::legacy::MAX_SNIPPET_DEPTH;
use crate::context::Context;
use crate::renderer::Diagnostic;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

const MAX_CALL_DEPTH: usize = 64;

/// Everything a template can see besides its own locals.
pub struct Env<'a> {
    pub scope: &'a Context,
    pub library: &'a MacroLibrary,
    /// `None` when snippet inclusion is switched off.
    pub snippets: Option<&'a SnippetLoader>,
}

/// Renders `template`, returning the text and the placeholders that failed
/// under `#errorCatcher ListErrors`.
pub fn execute(template: &Template, env: &Env<'_>) -> LegacyResult<(String, Vec<Diagnostic>)> {
    let mut interpreter = Interpreter { env, diagnostics: Vec::new(), calls: 0, snippets: 0 };
    let mut frame = Frame {
        locals: Map::new(),
        macros: &template.macros,
        catch_errors: template.catch_errors,
    };
    let mut out = String::new();
    interpreter.render_nodes(&template.body, &mut frame, &mut out)?;
    Ok((out, interpreter.diagnostics))
}

struct Frame<'t> {
    locals: Map<String, Value>,
    macros: &'t MacroTable,
    catch_errors: bool,
}

struct Interpreter<'e> {
    env: &'e Env<'e>,
    diagnostics: Vec<Diagnostic>,
    calls: usize,
    snippets: usize,
}

impl Interpreter<'_> {
    fn render_nodes(
        &mut self,
        nodes: &[Node],
        frame: &mut Frame<'_>,
        out: &mut String,
    ) -> LegacyResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Placeholder { expr, code, line } => match self.eval(expr, frame) {
                    Ok(value) => out.push_str(&display(&value)),
                    Err(err) if frame.catch_errors => {
                        out.push_str(code);
                        self.diagnostics.push(Diagnostic::UnresolvedPlaceholder {
                            line: *line,
                            code: code.clone(),
                            reason: err.to_string(),
                        });
                    }
                    Err(err) => return Err(err.at(*line)),
                },
                Node::If { branches, otherwise } => {
                    let mut taken = None;
                    for branch in branches {
                        let condition =
                            self.eval(&branch.condition, frame).map_err(|e| e.at(branch.line))?;
                        if truthy(&condition) {
                            taken = Some(&branch.body);
                            break;
                        }
                    }
                    self.render_nodes(taken.unwrap_or(otherwise), frame, out)?;
                }
                Node::For { targets, iterable, body, line } => {
                    let iterable = self.eval(iterable, frame).map_err(|e| e.at(*line))?;
                    for item in iterate(iterable).map_err(|e| e.at(*line))? {
                        bind_targets(targets, item, &mut frame.locals).map_err(|e| e.at(*line))?;
                        self.render_nodes(body, frame, out)?;
                    }
                }
                Node::Set { name, value, line } => {
                    let value = self.eval(value, frame).map_err(|e| e.at(*line))?;
                    frame.locals.insert(name.clone(), value);
                }
                Node::Silent { expr, line } => {
                    self.eval(expr, frame).map_err(|e| e.at(*line))?;
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr, frame: &mut Frame<'_>) -> LegacyResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::List(items) => {
                let values =
                    items.iter().map(|item| self.eval(item, frame)).collect::<LegacyResult<_>>()?;
                Ok(Value::Array(values))
            }
            Expr::Var(name) => self.lookup(name, frame),
            Expr::Attr(target, name) => {
                let target = self.eval(target, frame)?;
                match target {
                    Value::Object(mut map) => map
                        .remove(name)
                        .ok_or_else(|| LegacyError::NotFound(name.clone())),
                    other => Err(LegacyError::type_error(format!(
                        "{} has no attribute '{name}'",
                        type_name(&other)
                    ))),
                }
            }
            Expr::Index(target, index) => {
                let target = self.eval(target, frame)?;
                let index = self.eval(index, frame)?;
                index_value(target, &index)
            }
            Expr::Call(callee, args) => {
                let args =
                    args.iter().map(|arg| self.eval(arg, frame)).collect::<LegacyResult<Vec<_>>>()?;
                match callee.as_ref() {
                    Expr::Var(name) => self.call_function(name, args, frame),
                    Expr::Attr(target, method) => {
                        let target = self.eval(target, frame)?;
                        call_method(target, method, args)
                    }
                    _ => Err(LegacyError::type_error("expression is not callable")),
                }
            }
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&self.eval(inner, frame)?))),
            Expr::Neg(inner) => match self.eval(inner, frame)? {
                Value::Number(n) => Ok(match n.as_i64().and_then(i64::checked_neg) {
                    Some(i) => Value::from(i),
                    None => Value::from(-n.as_f64().unwrap_or_default()),
                }),
                other => Err(LegacyError::type_error(format!("cannot negate {}", type_name(&other)))),
            },
            Expr::Binary(BinaryOp::And, left, right) => {
                let left = self.eval(left, frame)?;
                if truthy(&left) {
                    self.eval(right, frame)
                } else {
                    Ok(left)
                }
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let left = self.eval(left, frame)?;
                if truthy(&left) {
                    Ok(left)
                } else {
                    self.eval(right, frame)
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                binary(*op, left, right)
            }
        }
    }

    fn variable(&self, name: &str, frame: &Frame<'_>) -> Option<Value> {
        frame.locals.get(name).or_else(|| self.env.scope.get(name)).cloned()
    }

    fn find_macro(&self, name: &str, frame: &Frame<'_>) -> Option<Arc<Macro>> {
        frame.macros.get(name).or_else(|| self.env.library.get(name)).cloned()
    }

    fn lookup(&mut self, name: &str, frame: &mut Frame<'_>) -> LegacyResult<Value> {
        if let Some(value) = self.variable(name, frame) {
            return Ok(value);
        }
        match self.find_macro(name, frame) {
            Some(mac) if mac.params.iter().all(|p| p.default.is_some()) => {
                self.call_macro(&mac, Vec::new(), frame)
            }
            _ => Err(LegacyError::NotFound(name.to_string())),
        }
    }

    fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        frame: &mut Frame<'_>,
    ) -> LegacyResult<Value> {
        if let Some(mac) = self.find_macro(name, frame) {
            return self.call_macro(&mac, args, frame);
        }

        match (name, args.as_slice()) {
            ("getVar", [Value::String(var)]) => {
                self.variable(var, frame).ok_or_else(|| LegacyError::NotFound(var.clone()))
            }
            ("getVar", [Value::String(var), default]) => {
                Ok(self.variable(var, frame).unwrap_or_else(|| default.clone()))
            }
            ("varExists", [Value::String(var)]) => {
                Ok(Value::Bool(self.variable(var, frame).is_some()))
            }
            ("len", [value]) => length(value).map(Value::from),
            ("str", [value]) => Ok(Value::String(display(value))),
            ("int", [value]) => to_int(value).map(Value::from),
            ("SNIPPET", [Value::String(snippet)]) if self.env.snippets.is_some() => {
                self.include_snippet(snippet, frame)
            }
            ("read_snippet", [Value::String(snippet)]) => match self.env.snippets {
                Some(loader) => {
                    Ok(loader.read(snippet, self.env.scope).map(Value::String).unwrap_or(Value::Null))
                }
                None => Err(LegacyError::NotFound(name.to_string())),
            },
            ("getVar" | "varExists" | "len" | "str" | "int", _) => Err(LegacyError::type_error(
                format!("{name}() called with unsupported arguments"),
            )),
            _ => Err(LegacyError::NotFound(name.to_string())),
        }
    }

    fn call_macro(
        &mut self,
        mac: &Macro,
        args: Vec<Value>,
        frame: &mut Frame<'_>,
    ) -> LegacyResult<Value> {
        if args.len() > mac.params.len() {
            return Err(LegacyError::type_error(format!(
                "{}() takes {} arguments but {} were given",
                mac.name,
                mac.params.len(),
                args.len()
            )));
        }
        if self.calls >= MAX_CALL_DEPTH {
            return Err(LegacyError::TooDeep { what: "macro calls", limit: MAX_CALL_DEPTH });
        }

        let mut locals = Map::new();
        let mut args = args.into_iter();
        for param in &mac.params {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval(default, frame)?,
                (None, None) => {
                    return Err(LegacyError::type_error(format!(
                        "{}() missing argument '{}'",
                        mac.name, param.name
                    )))
                }
            };
            locals.insert(param.name.clone(), value);
        }

        let mut callee = Frame { locals, macros: frame.macros, catch_errors: frame.catch_errors };
        let mut out = String::new();
        self.calls += 1;
        let result = self.render_nodes(&mac.body, &mut callee, &mut out);
        self.calls -= 1;
        result?;
        Ok(Value::String(out))
    }

    fn include_snippet(&mut self, name: &str, frame: &mut Frame<'_>) -> LegacyResult<Value> {
        let Some(loader) = self.env.snippets else {
            return Err(LegacyError::NotFound("SNIPPET".to_string()));
        };
        let Some(source) = loader.read(name, self.env.scope) else {
            return Ok(Value::String(format!("# Error: no snippet data for {name}\n")));
        };
        if self.snippets >= MAX_SNIPPET_DEPTH {
            return Err(LegacyError::TooDeep { what: "snippets", limit: MAX_SNIPPET_DEPTH });
        }

        let snippet = parse_template(&source)?;
        let mut inner = Frame {
            locals: Map::new(),
            macros: &snippet.macros,
            catch_errors: frame.catch_errors || snippet.catch_errors,
        };
        let mut out = String::new();
        self.snippets += 1;
        let result = self.render_nodes(&snippet.body, &mut inner, &mut out);
        self.snippets -= 1;
        result?;
        Ok(Value::String(out))
    }
}

/// Text a value renders as.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn iterate(value: Value) -> LegacyResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.into_iter().map(|(k, _)| Value::String(k)).collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(LegacyError::type_error(format!("cannot iterate over {}", type_name(&other)))),
    }
}

fn bind_targets(targets: &[String], item: Value, locals: &mut Map<String, Value>) -> LegacyResult<()> {
    if let [target] = targets {
        locals.insert(target.clone(), item);
        return Ok(());
    }
    match item {
        Value::Array(values) if values.len() == targets.len() => {
            for (target, value) in targets.iter().zip(values) {
                locals.insert(target.clone(), value);
            }
            Ok(())
        }
        other => Err(LegacyError::type_error(format!(
            "cannot unpack {} into {} names",
            type_name(&other),
            targets.len()
        ))),
    }
}

fn index_value(target: Value, index: &Value) -> LegacyResult<Value> {
    match (target, index) {
        (Value::Object(mut map), Value::String(key)) => {
            map.remove(key).ok_or_else(|| LegacyError::NotFound(key.clone()))
        }
        (Value::Array(items), Value::Number(n)) => {
            let position = n.as_i64().and_then(|i| resolve_index(i, items.len()));
            position
                .and_then(|i| items.into_iter().nth(i))
                .ok_or_else(|| LegacyError::type_error(format!("list index {n} out of range")))
        }
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            n.as_i64()
                .and_then(|i| resolve_index(i, chars.len()))
                .map(|i| Value::String(chars[i].to_string()))
                .ok_or_else(|| LegacyError::type_error(format!("string index {n} out of range")))
        }
        (target, index) => Err(LegacyError::type_error(format!(
            "cannot index {} with {}",
            type_name(&target),
            type_name(index)
        ))),
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn call_method(target: Value, method: &str, args: Vec<Value>) -> LegacyResult<Value> {
    let unsupported = |target: &Value| {
        LegacyError::type_error(format!(
            "{} has no method '{method}' taking {} arguments",
            type_name(target),
            args.len()
        ))
    };

    match (&target, method, args.as_slice()) {
        (Value::String(s), "lower", []) => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "upper", []) => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "strip", []) => Ok(Value::String(s.trim().to_string())),
        (Value::String(s), "split", []) => {
            Ok(Value::Array(s.split_whitespace().map(|p| Value::String(p.to_string())).collect()))
        }
        (Value::String(s), "split", [Value::String(sep)]) if !sep.is_empty() => {
            Ok(Value::Array(s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()))
        }
        (Value::String(s), "startswith", [Value::String(prefix)]) => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        (Value::String(s), "endswith", [Value::String(suffix)]) => {
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        (Value::String(s), "replace", [Value::String(from), Value::String(to)]) => {
            Ok(Value::String(s.replace(from.as_str(), to)))
        }
        (Value::String(sep), "join", [Value::Array(items)]) => {
            Ok(Value::String(items.iter().map(display).collect::<Vec<_>>().join(sep.as_str())))
        }
        (Value::Object(map), "items", []) => Ok(Value::Array(
            map.iter().map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()])).collect(),
        )),
        (Value::Object(map), "keys", []) => {
            Ok(Value::Array(map.keys().map(|k| Value::String(k.clone())).collect()))
        }
        (Value::Object(map), "values", []) => Ok(Value::Array(map.values().cloned().collect())),
        (Value::Object(map), "get", [Value::String(key)]) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(map), "get", [Value::String(key), default]) => {
            Ok(map.get(key).cloned().unwrap_or_else(|| default.clone()))
        }
        _ => Err(unsupported(&target)),
    }
}

fn length(value: &Value) -> LegacyResult<usize> {
    match value {
        Value::String(s) => Ok(s.chars().count()),
        Value::Array(items) => Ok(items.len()),
        Value::Object(map) => Ok(map.len()),
        other => Err(LegacyError::type_error(format!("{} has no length", type_name(other)))),
    }
}

fn to_int(value: &Value) -> LegacyResult<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };
    parsed.ok_or_else(|| LegacyError::type_error(format!("invalid literal for int(): {}", display(value))))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> LegacyResult<std::cmp::Ordering> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| {
        LegacyError::type_error(format!(
            "cannot compare {} with {}",
            type_name(left),
            type_name(right)
        ))
    })
}

fn contains(container: &Value, item: &Value) -> LegacyResult<bool> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Array(items), item) => Ok(items.iter().any(|candidate| values_equal(candidate, item))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        (container, item) => Err(LegacyError::type_error(format!(
            "cannot look for {} in {}",
            type_name(item),
            type_name(container)
        ))),
    }
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> LegacyResult<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Rem if y == 0 => return Err(LegacyError::type_error("modulo by zero")),
            // Only `i64::MIN % -1` overflows, and its remainder is 0.
            BinaryOp::Rem => Some(x.checked_rem_euclid(y).unwrap_or(0)),
            _ => None,
        };
        if let Some(result) = result {
            return Ok(Value::from(result));
        }
    }

    let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div if y == 0.0 => return Err(LegacyError::type_error("division by zero")),
        BinaryOp::Div => x / y,
        BinaryOp::Rem if y == 0.0 => return Err(LegacyError::type_error("modulo by zero")),
        BinaryOp::Rem => x.rem_euclid(y),
        _ => unreachable!("only arithmetic operators reach here"),
    };
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| LegacyError::type_error("arithmetic result is not a finite number"))
}

fn binary(op: BinaryOp, left: Value, right: Value) -> LegacyResult<Value> {
    use std::cmp::Ordering::{Greater, Less};

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt => Ok(Value::Bool(compare(&left, &right)? == Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(&left, &right)? != Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(&left, &right)? == Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(&left, &right)? != Less)),
        BinaryOp::In => contains(&right, &left).map(Value::Bool),
        BinaryOp::NotIn => contains(&right, &left).map(|found| Value::Bool(!found)),
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Ok(Value::Array(a))
            }
            (Value::Number(a), Value::Number(b)) => arithmetic(op, &a, &b),
            (a, b) => Err(LegacyError::type_error(format!(
                "cannot add {} and {}",
                type_name(&a),
                type_name(&b)
            ))),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => match (left, right) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, &a, &b),
            (a, b) => Err(LegacyError::type_error(format!(
                "unsupported operands {} and {}",
                type_name(&a),
                type_name(&b)
            ))),
        },
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit in eval"),
    }
}
