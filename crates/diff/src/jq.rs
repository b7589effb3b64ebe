//! jq path expressions evaluated with jaq. An expression `E` deletes whatever `del(E)` deletes,
//! so the full jq language (builtins, `select`, `..`, alternatives) is available.

use std::cell::RefCell;
use std::rc::Rc;

use jaq_interpret::{Ctx, Filter, FilterT, ParseCtx, RcIter, Val};
use rustc_hash::FxHashMap;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid jq path expression {expr:?}: {reason}")]
pub struct JqError {
    pub expr: String,
    pub reason: String,
}

thread_local! {
    // Compiled filters hold `Rc`s, so each thread keeps its own.
    static COMPILED: RefCell<FxHashMap<String, Rc<Filter>>> = RefCell::new(FxHashMap::default());
}

fn compile(program: &str) -> Result<Filter, String> {
    let mut defs = ParseCtx::new(Vec::new());
    defs.insert_natives(jaq_core::core());
    defs.insert_defs(jaq_std::std());
    let (main, errs) = jaq_parse::parse(program, jaq_parse::main());
    if !errs.is_empty() {
        return Err(format!("{} syntax error(s)", errs.len()));
    }
    let main = main.ok_or_else(|| "empty expression".to_string())?;
    let filter = defs.compile(main);
    if !defs.errs.is_empty() {
        return Err(format!("{} undefined filter(s) or wrong arity", defs.errs.len()));
    }
    Ok(filter)
}

fn cached(program: &str) -> Result<Rc<Filter>, String> {
    COMPILED.with(|cache| {
        if let Some(f) = cache.borrow().get(program) {
            return Ok(f.clone());
        }
        let f = Rc::new(compile(program)?);
        cache.borrow_mut().insert(program.to_string(), f.clone());
        Ok(f)
    })
}

/// A jq path expression checked at construction and run as a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JqPath {
    source: String,
    program: String,
}

impl JqPath {
    pub fn compile(expr: &str) -> Result<Self, JqError> {
        let program = format!("del({expr})");
        compile(&program).map_err(|reason| JqError { expr: expr.to_string(), reason })?;
        Ok(Self { source: expr.to_string(), program })
    }

    pub fn source(&self) -> &str { &self.source }

    /// Delete every location the expression selects. Returns whether `doc` changed. A runtime
    /// error leaves `doc` untouched.
    pub fn delete(&self, doc: &mut Json) -> Result<bool, String> {
        let filter = cached(&self.program)?;
        let filter: &Filter = &filter;
        let inputs = RcIter::new(core::iter::empty());
        let mut out = filter.run((Ctx::new([], &inputs), Val::from(doc.clone())));
        match out.next() {
            Some(Ok(v)) => {
                let v = Json::from(v);
                let changed = v != *doc;
                *doc = v;
                Ok(changed)
            }
            Some(Err(e)) => Err(e.to_string()),
            None => Ok(false),
        }
    }
}
