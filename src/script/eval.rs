// src/script/eval.rs
//
// Tree walking interpreter for hook scripts.
// The only capabilities a script has are the names it is given and the
// builtins below; there is no file, process or network access, and no
// unbounded loop construct.

use super::parser::{BinOp, Expr, Stmt, StmtKind, Target, UnOp};
use super::{ScriptEnv, ScriptError, Value};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Write;

pub const BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "lower", "upper", "strip", "contains", "startswith",
    "endswith", "split", "join", "keys", "has", "get", "matches",
];

/// Names published by the run that scripts may read but not assign
const READ_ONLY_GLOBALS: [&str; 4] = ["version", "arg", "filecount", "matchcount"];
/// Per-file handles on the metadata
const READ_ONLY_LOCALS: [&str; 2] = ["objs", "objmap"];

/// Longest string a script may build by repetition
const MAX_REPEAT_LEN: usize = 1 << 20;

type Eval<T> = Result<T, String>;

pub struct Interpreter<'a> {
    env: &'a mut ScriptEnv,
    /// Per-file variables; None for begin/end blocks
    locals: Option<&'a mut BTreeMap<String, Value>>,
    out: &'a mut dyn Write,
    source: &'a str,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        env: &'a mut ScriptEnv,
        locals: Option<&'a mut BTreeMap<String, Value>>,
        out: &'a mut dyn Write,
        source: &'a str,
    ) -> Self {
        Self { env, locals, out, source }
    }

    pub fn run(&mut self, stmts: &[Stmt]) -> Result<(), ScriptError> {
        self.exec_block(stmts)
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<(), ScriptError> {
        for stmt in stmts {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        let source = self.source;
        let line = stmt.line;
        let fail = move |msg: String| ScriptError::Runtime { source_name: source.to_string(), line, msg };

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr).map_err(fail)?;
            }
            StmtKind::Print(args) => {
                let values = args.iter().map(|a| self.eval(a)).collect::<Eval<Vec<_>>>().map_err(fail)?;
                self.print(&values).map_err(fail)?;
            }
            StmtKind::Assign(target, op, value) => {
                self.assign(target, *op, value).map_err(fail)?;
            }
            StmtKind::If(branches, otherwise) => {
                for (cond, body) in branches {
                    if self.eval(cond).map_err(fail)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(otherwise)?;
            }
            StmtKind::For(name, iter, body) => {
                let items = match self.eval(iter).map_err(fail)? {
                    Value::List(items) => items,
                    Value::Map(map) => map.into_keys().map(Value::Str).collect(),
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => return Err(fail(format!("'{}' object is not iterable", other.type_name()))),
                };
                for item in items {
                    self.set_var(name, item).map_err(fail)?;
                    self.exec_block(body)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------------

    fn lookup(&self, name: &str) -> Eval<Value> {
        if let Some(value) = self.locals.as_deref().and_then(|l| l.get(name)) {
            return Ok(value.clone());
        }
        let published = match name {
            "version" => Some(Value::Str(self.env.version.clone())),
            "arg" => Some(Value::Str(self.env.arg.clone())),
            "filecount" => Some(Value::Int(self.env.file_count as i64)),
            "matchcount" => Some(Value::Int(self.env.match_count as i64)),
            _ => None,
        };
        published
            .or_else(|| self.env.globals.get(name).cloned())
            .ok_or_else(|| format!("name '{}' is not defined", name))
    }

    fn check_writable(&self, name: &str) -> Eval<()> {
        if READ_ONLY_GLOBALS.contains(&name) || (self.locals.is_some() && READ_ONLY_LOCALS.contains(&name)) {
            return Err(format!("'{}' is read-only", name));
        }
        Ok(())
    }

    /// Per-file: an existing local, else an existing global, else a new local.
    /// Begin/end: always a global.
    fn set_var(&mut self, name: &str, value: Value) -> Eval<()> {
        self.check_writable(name)?;
        match self.locals.as_deref_mut() {
            Some(locals) => {
                if !locals.contains_key(name)
                    && let Some(global) = self.env.globals.get_mut(name)
                {
                    *global = value;
                } else {
                    locals.insert(name.to_string(), value);
                }
            }
            None => {
                self.env.globals.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    fn var_mut(&mut self, name: &str) -> Option<&mut Value> {
        if let Some(locals) = self.locals.as_deref_mut()
            && locals.contains_key(name)
        {
            return locals.get_mut(name);
        }
        self.env.globals.get_mut(name)
    }

    fn assign(&mut self, target: &Target, op: Option<BinOp>, value: &Expr) -> Eval<()> {
        let value = self.eval(value)?;
        match target {
            Target::Name(name) => {
                let value = match op {
                    Some(op) => binary(op, self.lookup(name)?, value)?,
                    None => value,
                };
                self.set_var(name, value)
            }
            Target::Index(name, key) => {
                let key = self.eval(key)?;
                let value = match op {
                    Some(op) => binary(op, index(&self.lookup(name)?, &key)?, value)?,
                    None => value,
                };
                self.check_writable(name)?;
                let slot = self
                    .var_mut(name)
                    .ok_or_else(|| format!("name '{}' is not defined", name))?;
                set_index(slot, key, value)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr) -> Eval<Value> {
        Ok(match expr {
            Expr::Lit(value) => value.clone(),
            Expr::List(items) => Value::List(items.iter().map(|e| self.eval(e)).collect::<Eval<_>>()?),
            Expr::Var(name) => self.lookup(name)?,
            Expr::Index(base, key) => {
                let base = self.eval(base)?;
                index(&base, &self.eval(key)?)?
            }
            Expr::Call(name, args) => {
                let args = args.iter().map(|a| self.eval(a)).collect::<Eval<Vec<_>>>()?;
                self.call(name, args)?
            }
            Expr::Unary(UnOp::Not, inner) => Value::Bool(!self.eval(inner)?.truthy()),
            Expr::Unary(UnOp::Neg, inner) => match self.eval(inner)? {
                Value::Int(i) => Value::Int(i.checked_neg().ok_or("integer overflow")?),
                Value::Float(f) => Value::Float(-f),
                other => return Err(format!("bad operand type for unary -: '{}'", other.type_name())),
            },
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.truthy() { left } else { self.eval(right)? }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() { left } else { self.eval(right)? }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                binary(*op, left, self.eval(right)?)?
            }
        })
    }

    fn print(&mut self, values: &[Value]) -> Eval<()> {
        let line: Vec<String> = values.iter().map(Value::to_string).collect();
        writeln!(self.out, "{}", line.join(" ")).map_err(|e| format!("print failed: {}", e))
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Eval<Value> {
        if name == "print" {
            self.print(&args)?;
            return Ok(Value::None);
        }
        call_builtin(name, args)
    }
}

// ============================================================================
// Builtins
// ============================================================================

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Eval<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max { min.to_string() } else { format!("{}-{}", min, max) };
        return Err(format!("{}() takes {} argument(s), got {}", name, expected, args.len()));
    }
    Ok(())
}

fn expect_str<'v>(name: &str, value: &'v Value) -> Eval<&'v str> {
    match value {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(format!("{}() expects a string, got '{}'", name, other.type_name())),
    }
}

fn expect_map<'v>(name: &str, value: &'v Value) -> Eval<&'v BTreeMap<String, Value>> {
    match value {
        Value::Map(m) => Ok(m),
        other => Err(format!("{}() expects a dict, got '{}'", name, other.type_name())),
    }
}

fn call_builtin(name: &str, args: Vec<Value>) -> Eval<Value> {
    let (min, max) = match name {
        "split" => (1, 2),
        "get" => (2, 3),
        "contains" | "startswith" | "endswith" | "join" | "has" | "matches" => (2, 2),
        _ => (1, 1),
    };
    arity(name, &args, min, max)?;
    let a = &args[0];

    Ok(match name {
        "len" => {
            let len = match a {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                other => return Err(format!("object of type '{}' has no len()", other.type_name())),
            };
            Value::Int(len as i64)
        }
        "str" => Value::Str(a.to_string()),
        "int" => Value::Int(match a {
            Value::Int(i) => *i,
            Value::Bool(b) => *b as i64,
            Value::Float(f) if f.is_finite() => f.trunc() as i64,
            Value::Str(s) => s.trim().parse().map_err(|_| format!("invalid literal for int(): '{}'", s))?,
            other => return Err(format!("int() can't convert '{}'", other.type_name())),
        }),
        "float" => Value::Float(match a {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Str(s) => s.trim().parse().map_err(|_| format!("could not convert string to float: '{}'", s))?,
            other => return Err(format!("float() can't convert '{}'", other.type_name())),
        }),
        "lower" => Value::Str(expect_str(name, a)?.to_lowercase()),
        "upper" => Value::Str(expect_str(name, a)?.to_uppercase()),
        "strip" => Value::Str(expect_str(name, a)?.trim().to_string()),
        "contains" => Value::Bool(contains(a, &args[1])?),
        "startswith" => Value::Bool(expect_str(name, a)?.starts_with(expect_str(name, &args[1])?)),
        "endswith" => Value::Bool(expect_str(name, a)?.ends_with(expect_str(name, &args[1])?)),
        "split" => {
            let s = expect_str(name, a)?;
            let parts: Vec<&str> = match args.get(1) {
                Some(sep) => {
                    let sep = expect_str(name, sep)?;
                    if sep.is_empty() {
                        return Err("split(): empty separator".to_string());
                    }
                    s.split(sep).collect()
                }
                None => s.split_whitespace().collect(),
            };
            Value::List(parts.into_iter().map(|p| Value::Str(p.to_string())).collect())
        }
        "join" => {
            let Value::List(items) = a else {
                return Err(format!("join() expects a list, got '{}'", a.type_name()));
            };
            let sep = expect_str(name, &args[1])?;
            Value::Str(items.iter().map(Value::to_string).collect::<Vec<_>>().join(sep))
        }
        "keys" => Value::List(expect_map(name, a)?.keys().cloned().map(Value::Str).collect()),
        "has" => Value::Bool(expect_map(name, a)?.contains_key(expect_str(name, &args[1])?)),
        "get" => {
            let key = expect_str(name, &args[1])?;
            match expect_map(name, a)?.get(key) {
                Some(value) => value.clone(),
                None => args.get(2).cloned().unwrap_or(Value::None),
            }
        }
        "matches" => {
            let pattern = expect_str(name, a)?;
            let re = Regex::new(pattern).map_err(|e| format!("bad pattern '{}': {}", pattern, e))?;
            Value::Bool(re.is_match(expect_str(name, &args[1])?))
        }
        _ => return Err(format!("unknown function '{}'", name)),
    })
}

// ============================================================================
// Operators
// ============================================================================

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> String {
    format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    )
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(a), Value::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => as_number(left) == as_number(right),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Eval<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| "cannot compare NaN".to_string()),
            _ => Err(type_error("comparison", left, right)),
        },
    }
}

fn contains(container: &Value, item: &Value) -> Eval<bool> {
    Ok(match (container, item) {
        (Value::Str(hay), Value::Str(needle)) => hay.contains(needle.as_str()),
        (Value::Str(_), other) => {
            return Err(format!("'in <string>' requires string as left operand, not '{}'", other.type_name()));
        }
        (Value::List(items), item) => items.iter().any(|v| values_equal(v, item)),
        (Value::Map(map), Value::Str(key)) => map.contains_key(key),
        (Value::Map(_), _) => false,
        (other, _) => return Err(format!("argument of type '{}' is not iterable", other.type_name())),
    })
}

fn binary(op: BinOp, left: Value, right: Value) -> Eval<Value> {
    use Value::{Float, Int, List, Str};
    Ok(match op {
        BinOp::Eq => Value::Bool(values_equal(&left, &right)),
        BinOp::Ne => Value::Bool(!values_equal(&left, &right)),
        BinOp::Lt => Value::Bool(compare(&left, &right)? == Ordering::Less),
        BinOp::Le => Value::Bool(compare(&left, &right)? != Ordering::Greater),
        BinOp::Gt => Value::Bool(compare(&left, &right)? == Ordering::Greater),
        BinOp::Ge => Value::Bool(compare(&left, &right)? != Ordering::Less),
        BinOp::In => Value::Bool(contains(&right, &left)?),
        BinOp::NotIn => Value::Bool(!contains(&right, &left)?),
        BinOp::Add => match (left, right) {
            (Int(a), Int(b)) => Int(a.checked_add(b).ok_or("integer overflow")?),
            (Str(a), Str(b)) => Str(a + &b),
            (List(mut a), List(b)) => {
                a.extend(b);
                List(a)
            }
            (l, r) => Float(numeric_pair("+", &l, &r).map(|(a, b)| a + b)?),
        },
        BinOp::Sub => match (left, right) {
            (Int(a), Int(b)) => Int(a.checked_sub(b).ok_or("integer overflow")?),
            (l, r) => Float(numeric_pair("-", &l, &r).map(|(a, b)| a - b)?),
        },
        BinOp::Mul => match (left, right) {
            (Int(a), Int(b)) => Int(a.checked_mul(b).ok_or("integer overflow")?),
            (Str(s), Int(n)) | (Int(n), Str(s)) => {
                let n = usize::try_from(n).unwrap_or(0);
                if s.len().saturating_mul(n) > MAX_REPEAT_LEN {
                    return Err("string repetition too long".to_string());
                }
                Str(s.repeat(n))
            }
            (l, r) => Float(numeric_pair("*", &l, &r).map(|(a, b)| a * b)?),
        },
        BinOp::Div => {
            let (a, b) = numeric_pair("/", &left, &right)?;
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            Float(a / b)
        }
        BinOp::Rem => match (left, right) {
            (Int(_), Int(0)) => return Err("modulo by zero".to_string()),
            (Int(a), Int(b)) => {
                // sign follows the divisor
                let r = a.checked_rem_euclid(b).ok_or("integer overflow")?;
                Int(if r != 0 && b < 0 { r + b } else { r })
            }
            (l, r) => {
                let (a, b) = numeric_pair("%", &l, &r)?;
                if b == 0.0 {
                    return Err("modulo by zero".to_string());
                }
                Float(a - b * (a / b).floor())
            }
        },
    })
}

fn numeric_pair(op: &str, left: &Value, right: &Value) -> Eval<(f64, f64)> {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(type_error(op, left, right)),
    }
}

fn index(base: &Value, key: &Value) -> Eval<Value> {
    match (base, key) {
        (Value::List(items), Value::Int(i)) => {
            let idx = list_index(items.len(), *i)?;
            Ok(items[idx].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = list_index(chars.len(), *i).map_err(|_| "string index out of range".to_string())?;
            Ok(Value::Str(chars[idx].to_string()))
        }
        (Value::Map(map), Value::Str(k)) => map.get(k).cloned().ok_or_else(|| format!("key '{}' not found", k)),
        (Value::List(_) | Value::Str(_) | Value::Map(_), other) => {
            Err(format!("bad index type '{}' for '{}'", other.type_name(), base.type_name()))
        }
        (other, _) => Err(format!("'{}' object is not subscriptable", other.type_name())),
    }
}

fn list_index(len: usize, i: i64) -> Eval<usize> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx >= len as i64 {
        return Err("list index out of range".to_string());
    }
    Ok(idx as usize)
}

fn set_index(slot: &mut Value, key: Value, value: Value) -> Eval<()> {
    match (slot, key) {
        (Value::Map(map), Value::Str(k)) => {
            map.insert(k, value);
        }
        (Value::List(items), Value::Int(i)) => {
            let idx = list_index(items.len(), i)?;
            items[idx] = value;
        }
        (slot, key) => {
            return Err(format!(
                "'{}' does not support item assignment with '{}'",
                slot.type_name(),
                key.type_name()
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_program;
    use super::*;

    fn run_with(
        env: &mut ScriptEnv,
        locals: Option<&mut BTreeMap<String, Value>>,
        src: &str,
    ) -> (Result<(), ScriptError>, String) {
        let stmts = parse_program(src).unwrap();
        let mut out = Vec::new();
        let result = Interpreter::new(env, locals, &mut out, "<test>").run(&stmts);
        (result, String::from_utf8(out).unwrap())
    }

    fn output(src: &str) -> String {
        let mut env = ScriptEnv::new("1.0", "ARG");
        let (result, out) = run_with(&mut env, None, src);
        result.unwrap();
        out
    }

    fn runtime_error(src: &str) -> String {
        let mut env = ScriptEnv::new("1.0", "ARG");
        match run_with(&mut env, None, src).0 {
            Err(ScriptError::Runtime { msg, .. }) => msg,
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(output("print 1 + 2 * 3, 7 / 2, 7 % 3, -7 % 3, 2.5 * 2"), "7 3.5 1 2 5.0\n");
        assert_eq!(output("print 'ab' + 'cd', 'x' * 3, [1] + [2]"), "abcd xxx [1, 2]\n");
        assert_eq!(output("print 1 == 1.0, 2 < 3, 'a' < 'b', 3 >= 4"), "True True True False\n");
    }

    #[test]
    fn test_logic_short_circuit() {
        // the undefined name on the right is never evaluated
        assert_eq!(output("print false and nope, true or nope, not 0"), "False True True\n");
        assert_eq!(output("print 0 or 'x', '' and 1"), "x \n");
    }

    #[test]
    fn test_in() {
        assert_eq!(output("print 'GPS' in 'GPSLatitude', 2 in [1, 2], 'z' not in ['a']"), "True True True\n");
        assert_eq!(runtime_error("x = 1 in 5"), "argument of type 'int' is not iterable");
    }

    #[test]
    fn test_if_and_for() {
        let src = "n = 0\nfor x in [1, 2, 3, 4] {\n if x % 2 == 0 { n += x } elif x == 3 { n += 100 } else { n -= 1 }\n}\nprint n";
        assert_eq!(output(src), "105\n");
        assert_eq!(output("for c in 'ab' { print c }"), "a\nb\n");
    }

    #[test]
    fn test_builtins() {
        assert_eq!(output("print len('abc'), len([1, 2]), str(5) + 'x', int(' 42 '), float('2.5')"), "3 2 5x 42 2.5\n");
        assert_eq!(output("print lower('AbC'), upper('x'), strip('  y ')"), "abc X y\n");
        assert_eq!(output("print startswith('DSC_1', 'DSC'), endswith('a.jpg', '.png')"), "True False\n");
        assert_eq!(output("print split('a b  c'), split('a,b', ','), join(['x', 1], '-')"), "['a', 'b', 'c'] ['a', 'b'] x-1\n");
        assert_eq!(output("print matches('^IMG_[0-9]+', 'IMG_0154'), contains('abc', 'd')"), "True False\n");
        assert_eq!(runtime_error("int('x')"), "invalid literal for int(): 'x'");
        assert_eq!(runtime_error("len(1, 2)"), "len() takes 1 argument(s), got 2");
    }

    #[test]
    fn test_map_builtins_and_indexing() {
        let mut env = ScriptEnv::new("1.0", "");
        let mut locals = BTreeMap::new();
        let tags = [("Make", "NIKON"), ("Model", "P6000")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::Str(v.to_string())))
            .collect();
        locals.insert("tags".to_string(), Value::Map(tags));

        let src = "print keys(tags), has(tags, 'Make'), get(tags, 'Lens', '-'), tags['Model']\ntags['Make'] = lower(tags['Make'])";
        let (result, out) = run_with(&mut env, Some(&mut locals), src);
        result.unwrap();
        assert_eq!(out, "['Make', 'Model'] True - P6000\n");
        let Some(Value::Map(tags)) = locals.get("tags") else {
            panic!("tags missing");
        };
        assert_eq!(tags["Make"], Value::Str("nikon".to_string()));
    }

    #[test]
    fn test_errors() {
        assert_eq!(runtime_error("print missing"), "name 'missing' is not defined");
        assert_eq!(runtime_error("x = 1 / 0"), "division by zero");
        assert_eq!(runtime_error("x = [1][5]"), "list index out of range");
        assert_eq!(runtime_error("x = 'a' + 1"), "unsupported operand types for +: 'str' and 'int'");
        assert_eq!(runtime_error("filecount = 3"), "'filecount' is read-only");
    }

    #[test]
    fn test_error_line_and_partial_effects() {
        let mut env = ScriptEnv::new("1.0", "");
        let (result, out) = run_with(&mut env, None, "a = 1\nprint 'before'\nb = nope\nc = 3");
        let Err(ScriptError::Runtime { line, source_name, .. }) = result else {
            panic!("expected runtime error");
        };
        assert_eq!((line, source_name.as_str()), (3, "<test>"));
        assert_eq!(out, "before\n");
        assert_eq!(env.global("a"), Some(&Value::Int(1)));
        assert_eq!(env.global("c"), None);
    }

    #[test]
    fn test_published_globals() {
        let mut env = ScriptEnv::new("0.13", "hello");
        env.file_count = 4;
        env.match_count = 2;
        let (result, out) = run_with(&mut env, None, "print version, arg, filecount, matchcount");
        result.unwrap();
        assert_eq!(out, "0.13 hello 4 2\n");
    }

    #[test]
    fn test_scoping() {
        let mut env = ScriptEnv::new("1.0", "");
        run_with(&mut env, None, "total = 0").0.unwrap();

        let mut locals = BTreeMap::new();
        locals.insert("skip".to_string(), Value::Bool(false));
        locals.insert("objs".to_string(), Value::Map(BTreeMap::new()));
        let src = "total += 5\ntemp = 1\nskip = total > 3";
        run_with(&mut env, Some(&mut locals), src).0.unwrap();

        // existing global updated, new name stays local
        assert_eq!(env.global("total"), Some(&Value::Int(5)));
        assert_eq!(env.global("temp"), None);
        assert_eq!(locals.get("temp"), Some(&Value::Int(1)));
        assert_eq!(locals.get("skip"), Some(&Value::Bool(true)));

        let (result, _) = run_with(&mut env, Some(&mut locals), "objs = 1");
        assert!(result.is_err());
        // only read-only inside a file
        run_with(&mut env, None, "objs = 1").0.unwrap();
    }
}
