// src/script.rs
//
// User hooks run at three points of a run:
//   begin - once, before the first file that could be read
//   each  - per file, after grep; may set `skip`
//   end   - once, after the last file, when any file was read
//
// Blocks are compiled when options are built, so a syntax error stops the run
// before any file is touched. A runtime error abandons the rest of its block
// and is logged; the run goes on.

mod eval;
mod parser;

use crate::keymap::ResolvedKeyMap;
use crate::tag_store::{TagSnapshot, TagStore};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{error, warn};

use eval::Interpreter;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("{source_name}:{line}:{col}: {msg}")]
    Compile {
        source_name: String,
        line: usize,
        col: usize,
        msg: String,
    },
    #[error("{source_name}:{line}: {msg}")]
    Runtime { source_name: String, line: usize, msg: String },
    #[error("Unable to read: {path}: {source}")]
    Read { path: String, source: io::Error },
}

// ============================================================================
// Values
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
        }
    }

    fn from_snapshot(tags: &TagSnapshot) -> Self {
        Value::Map(tags.iter().map(|(k, v)| (k.clone(), Value::Str(v.clone()))).collect())
    }

    /// Strings quoted, as they appear inside a list or dict
    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Map(map) => {
                let items: Vec<String> = map.iter().map(|(k, v)| format!("'{}': {}", k, v.repr())).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

// ============================================================================
// Compilation
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompiledBlock {
    source_name: String,
    text: String,
    program: Vec<parser::Stmt>,
}

impl CompiledBlock {
    #[cfg(test)]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn snippet(&self) -> String {
        snippet(&self.text)
    }
}

/// Source text cut down for log lines
pub fn snippet(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() > 80 {
        format!("{}...", text.chars().take(80).collect::<String>())
    } else {
        text.to_string()
    }
}

pub fn compile(text: &str, source_name: &str) -> Result<CompiledBlock, ScriptError> {
    let program = parser::parse_program(text).map_err(|e| ScriptError::Compile {
        source_name: source_name.to_string(),
        line: e.line,
        col: e.col,
        msg: e.msg,
    })?;
    Ok(CompiledBlock { source_name: source_name.to_string(), text: text.to_string(), program })
}

/// Compile a script file; `-` reads standard input.
pub fn compile_file(path: &str) -> Result<CompiledBlock, ScriptError> {
    let read_error = |source| ScriptError::Read { path: path.to_string(), source };
    if path == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).map_err(read_error)?;
        return compile(&text, "<stdin>");
    }
    let text = std::fs::read_to_string(path).map_err(read_error)?;
    compile(&text, path)
}

// ============================================================================
// Environment
// ============================================================================

/// State shared by every block of a run.
#[derive(Debug, Clone, Default)]
pub struct ScriptEnv {
    pub version: String,
    pub arg: String,
    pub file_count: usize,
    pub match_count: usize,
    /// Variables created by begin/end blocks
    globals: BTreeMap<String, Value>,
}

impl ScriptEnv {
    pub fn new(version: &str, arg: &str) -> Self {
        Self { version: version.to_string(), arg: arg.to_string(), ..Default::default() }
    }

    #[cfg(test)]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }
}

/// Variables visible to the per-file blocks of one file.
#[derive(Debug, Clone)]
pub struct FileLocals {
    vars: BTreeMap<String, Value>,
    original: TagSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagChange {
    New { key: String, value: String },
    Changed { key: String, old: String, new: String },
}

impl FileLocals {
    pub fn new(
        path: &Path,
        tags: &TagSnapshot,
        store: &TagStore,
        keymap: &ResolvedKeyMap,
        selected: Option<&BTreeSet<String>>,
    ) -> Self {
        let objs = keymap
            .iter()
            .filter_map(|(_, key)| store.get(key).map(|e| (key.to_string(), Value::Str(e.raw.clone()))))
            .collect();
        let objmap = keymap
            .iter()
            .map(|(display, key)| (display.to_string(), Value::Str(key.to_string())))
            .collect();
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let selected = match selected {
            Some(keys) => Value::List(keys.iter().cloned().map(Value::Str).collect()),
            None => Value::None,
        };

        let mut vars = BTreeMap::new();
        vars.insert("tags".to_string(), Value::from_snapshot(tags));
        vars.insert("filepath".to_string(), Value::Str(path.display().to_string()));
        vars.insert("filename".to_string(), Value::Str(file_name));
        vars.insert("objs".to_string(), Value::Map(objs));
        vars.insert("objmap".to_string(), Value::Map(objmap));
        vars.insert("selected".to_string(), selected);
        vars.insert("skip".to_string(), Value::Bool(false));
        Self { vars, original: tags.clone() }
    }

    pub fn skip(&self) -> bool {
        self.vars.get("skip").is_some_and(Value::truthy)
    }

    #[cfg(test)]
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// The tag mapping as left by the scripts, values in string form.
    pub fn tags(&self) -> TagSnapshot {
        match self.vars.get("tags") {
            Some(Value::Map(map)) => map.iter().map(|(k, v)| (k.clone(), v.to_string())).collect(),
            _ => {
                warn!("'tags' is no longer a dict, script changes ignored");
                self.original.clone()
            }
        }
    }

    /// Differences between the script's tag mapping and the file's tags.
    /// Tags are never written back, so these are only reported.
    pub fn tag_changes(&self) -> Vec<TagChange> {
        let mut changes = Vec::new();
        for (key, value) in self.tags() {
            match self.original.get(&key) {
                None => changes.push(TagChange::New { key, value }),
                Some(old) if *old != value => changes.push(TagChange::Changed { key, old: old.clone(), new: value }),
                Some(_) => {}
            }
        }
        changes
    }
}

// ============================================================================
// Hooks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EachOutcome {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct Hooks {
    pub begin: Vec<CompiledBlock>,
    pub each: Vec<CompiledBlock>,
    pub end: Vec<CompiledBlock>,
}

impl Hooks {
    pub fn run_begin(&self, env: &mut ScriptEnv, out: &mut dyn Write) {
        for block in &self.begin {
            run_block(block, env, None, out);
        }
    }

    /// Runs the per-file blocks in order, stopping as soon as one sets `skip`.
    pub fn run_each(&self, env: &mut ScriptEnv, locals: &mut FileLocals, out: &mut dyn Write) -> EachOutcome {
        for block in &self.each {
            run_block(block, env, Some(&mut locals.vars), out);
            if locals.skip() {
                return EachOutcome::Skipped;
            }
        }
        EachOutcome::Completed
    }

    pub fn run_end(&self, env: &mut ScriptEnv, out: &mut dyn Write) {
        for block in &self.end {
            run_block(block, env, None, out);
        }
    }
}

fn run_block(
    block: &CompiledBlock,
    env: &mut ScriptEnv,
    locals: Option<&mut BTreeMap<String, Value>>,
    out: &mut dyn Write,
) {
    let mut interpreter = Interpreter::new(env, locals, out, &block.source_name);
    if let Err(err) = interpreter.run(&block.program) {
        error!("Eval failed <{}>: {}", err, block.snippet());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_store::TagEntry;

    fn blocks(srcs: &[&str], name: &str) -> Vec<CompiledBlock> {
        srcs.iter().map(|s| compile(s, name).unwrap()).collect()
    }

    fn hooks(begin: &[&str], each: &[&str], end: &[&str]) -> Hooks {
        Hooks { begin: blocks(begin, "<begin>"), each: blocks(each, "<eval>"), end: blocks(end, "<end>") }
    }

    fn file_locals(path: &str) -> FileLocals {
        let mut store = TagStore::new();
        store.insert("Exif.Image.Make", TagEntry::exif("NIKON", "NIKON", None));
        let keymap = ResolvedKeyMap::build(&store, false);
        let tags = keymap.snapshot(&store);
        FileLocals::new(Path::new(path), &tags, &store, &keymap, None)
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::None.to_string(), "None");
        let list = Value::List(vec![Value::Str("a".into()), Value::Int(1), Value::Bool(false)]);
        assert_eq!(list.to_string(), "['a', 1, False]");
        let map = Value::Map([("k".to_string(), Value::Str("v".into()))].into_iter().collect());
        assert_eq!(map.to_string(), "{'k': 'v'}");
    }

    #[test]
    fn test_compile_error() {
        let err = compile("x = (1", "<eval>").unwrap_err();
        assert!(matches!(err, ScriptError::Compile { line: 1, .. }));
        assert!(err.to_string().starts_with("<eval>:1:"));
    }

    #[test]
    fn test_compile_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hook.tb");
        std::fs::write(&path, "print 'from file'\n").unwrap();
        let block = compile_file(path.to_str().unwrap()).unwrap();
        assert_eq!(block.source_name(), path.to_str().unwrap());

        let err = compile_file(dir.path().join("missing.tb").to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ScriptError::Read { .. }));
    }

    #[test]
    fn test_snippet_truncates() {
        let long = format!("x = '{}'", "a".repeat(100));
        let block = compile(&long, "<eval>").unwrap();
        assert_eq!(block.snippet().len(), 83);
        assert!(block.snippet().ends_with("..."));
    }

    #[test]
    fn test_phases_share_globals() {
        let hooks = hooks(
            &["count = 0", "print 'HELLO'"],
            &["count += 1", "print filename, count"],
            &["print 'BYE', arg, count, filecount"],
        );
        let mut env = ScriptEnv::new("1.0", "x");
        let mut out = Vec::new();
        hooks.run_begin(&mut env, &mut out);
        for (i, name) in ["a.jpg", "b.jpg"].into_iter().enumerate() {
            env.file_count = i + 1;
            let mut locals = file_locals(name);
            assert_eq!(hooks.run_each(&mut env, &mut locals, &mut out), EachOutcome::Completed);
        }
        hooks.run_end(&mut env, &mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "HELLO\na.jpg 1\nb.jpg 2\nBYE x 2 2\n");
    }

    #[test]
    fn test_skip_stops_later_blocks() {
        let hooks = hooks(&[], &["skip = filename == 'a.jpg'", "print 'after'"], &[]);
        let mut env = ScriptEnv::new("1.0", "");
        let mut out = Vec::new();

        let mut locals = file_locals("a.jpg");
        assert_eq!(hooks.run_each(&mut env, &mut locals, &mut out), EachOutcome::Skipped);
        assert!(out.is_empty());

        let mut locals = file_locals("b.jpg");
        assert_eq!(hooks.run_each(&mut env, &mut locals, &mut out), EachOutcome::Completed);
        assert_eq!(out, b"after\n");
    }

    #[test]
    fn test_runtime_error_continues() {
        let hooks = hooks(&[], &["print 'one'; nope; print 'lost'", "print 'two'"], &[]);
        let mut env = ScriptEnv::new("1.0", "");
        let mut out = Vec::new();
        let mut locals = file_locals("a.jpg");
        assert_eq!(hooks.run_each(&mut env, &mut locals, &mut out), EachOutcome::Completed);
        assert_eq!(out, b"one\ntwo\n");
    }

    #[test]
    fn test_locals_surface() {
        let locals = file_locals("dir/a.jpg");
        assert_eq!(locals.var("filepath"), Some(&Value::Str("dir/a.jpg".into())));
        assert_eq!(locals.var("filename"), Some(&Value::Str("a.jpg".into())));
        assert_eq!(locals.var("selected"), Some(&Value::None));
        let Some(Value::Map(objmap)) = locals.var("objmap") else {
            panic!("objmap missing");
        };
        assert_eq!(objmap["Make"], Value::Str("Exif.Image.Make".into()));
        let Some(Value::Map(objs)) = locals.var("objs") else {
            panic!("objs missing");
        };
        assert_eq!(objs.len(), 1);
        assert!(!locals.skip());
    }

    #[test]
    fn test_tag_changes_reported_not_applied() {
        let hooks = hooks(&[], &["tags['Make'] = 'Canon'; tags['Rating'] = 5"], &[]);
        let mut env = ScriptEnv::new("1.0", "");
        let mut out = Vec::new();
        let mut locals = file_locals("a.jpg");
        hooks.run_each(&mut env, &mut locals, &mut out);

        let changes = locals.tag_changes();
        assert_eq!(
            changes,
            [
                TagChange::Changed { key: "Make".into(), old: "NIKON".into(), new: "Canon".into() },
                TagChange::New { key: "Rating".into(), value: "5".into() },
            ]
        );
        assert_eq!(locals.tags()["Rating"], "5");
    }
}
