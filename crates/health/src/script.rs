//! Health scripts configured through resource overrides.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use drydock_core::overrides::glob_match;
use drydock_core::{override_key, HealthStatus, HealthStatusCode, Json, ResourceOverride};
use mlua::{HookTriggers, Lua, LuaOptions, LuaSerdeExt, SerializeOptions, StdLib, Table, Value};

pub const INVALID_HEALTH_STATUS: &str = "script returned an invalid health status";

/// `os` functions available to every script.
const SAFE_OS: [&str; 3] = ["time", "date", "clock"];

/// Runs a health script against a document. `Ok(None)` means the script gave no verdict.
pub trait HealthScriptEvaluator: Send + Sync {
    fn evaluate(&self, script: &str, obj: &Json, use_open_libs: bool) -> Result<Option<HealthStatus>>;
}

/// Lua 5.4 evaluator. Every call gets its own interpreter, so it is safe to share across threads.
#[derive(Debug, Clone)]
pub struct LuaHealthEvaluator {
    memory_limit: usize,
    timeout: Duration,
}

impl Default for LuaHealthEvaluator {
    fn default() -> Self {
        let memory_limit = std::env::var("DRYDOCK_LUA_MEMORY_LIMIT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(16 * 1024 * 1024);
        let timeout_ms: u64 = std::env::var("DRYDOCK_LUA_TIMEOUT_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(1000);
        Self { memory_limit, timeout: Duration::from_millis(timeout_ms) }
    }
}

fn lua_err(e: mlua::Error) -> anyhow::Error { anyhow!("lua: {e}") }

impl LuaHealthEvaluator {
    pub fn new(memory_limit: usize, timeout: Duration) -> Self { Self { memory_limit, timeout } }

    /// Base, table and a reduced `os` always; string, math, io and the full `os` with open libs.
    fn interpreter(&self, use_open_libs: bool) -> Result<Lua> {
        let mut libs = StdLib::TABLE | StdLib::OS;
        if use_open_libs {
            libs |= StdLib::STRING | StdLib::MATH | StdLib::IO;
        }
        let lua = Lua::new_with(libs, LuaOptions::new()).map_err(lua_err)?;
        lua.set_memory_limit(self.memory_limit).map_err(lua_err)?;
        if !use_open_libs {
            let globals = lua.globals();
            let os: Table = globals.get("os").map_err(lua_err)?;
            let safe = lua.create_table().map_err(lua_err)?;
            for name in SAFE_OS {
                safe.set(name, os.get::<_, Value>(name).map_err(lua_err)?).map_err(lua_err)?;
            }
            globals.set("os", safe).map_err(lua_err)?;
        }
        let deadline = Instant::now() + self.timeout;
        let timeout = self.timeout;
        let _ = lua.set_hook(HookTriggers::new().every_nth_instruction(10_000), move |_, _| {
            if Instant::now() >= deadline {
                return Err(mlua::Error::RuntimeError(format!("health script timed out after {timeout:?}")));
            }
            Ok(())
        });
        Ok(lua)
    }
}

impl HealthScriptEvaluator for LuaHealthEvaluator {
    fn evaluate(&self, script: &str, obj: &Json, use_open_libs: bool) -> Result<Option<HealthStatus>> {
        let lua = self.interpreter(use_open_libs)?;
        let opts = SerializeOptions::new().serialize_none_to_null(false).serialize_unit_to_null(false);
        let value = lua.to_value_with(obj, opts).map_err(lua_err)?;
        lua.globals().set("obj", value).map_err(lua_err)?;
        let ret: Value = lua.load(script).set_name("health.lua").eval().map_err(lua_err)?;
        match ret {
            Value::Nil => Ok(None),
            Value::Table(t) => {
                let status: Option<String> = t.get("status").map_err(lua_err)?;
                let message: Option<String> = t.get("message").map_err(lua_err)?;
                let Some(status) = status else {
                    let empty = t.pairs::<Value, Value>().next().is_none();
                    return Ok(if empty { None } else { Some(HealthStatus::new(HealthStatusCode::Unknown, INVALID_HEALTH_STATUS)) });
                };
                Ok(Some(match status.parse::<HealthStatusCode>() {
                    Ok(code) => HealthStatus::new(code, message.unwrap_or_default()),
                    Err(_) => HealthStatus::new(HealthStatusCode::Unknown, INVALID_HEALTH_STATUS),
                }))
            }
            other => Err(anyhow!("expect table output from health script, not {}", other.type_name())),
        }
    }
}

fn with_script(o: &ResourceOverride) -> Option<(&str, bool)> {
    (!o.health_lua.is_empty()).then(|| (o.health_lua.as_str(), o.use_open_libs))
}

/// Health scripts keyed like resource overrides: `group/Kind`, bare `Kind` for the core group, or
/// a glob such as `*.example.com/*`.
#[derive(Debug, Clone, Default)]
pub struct ScriptOverrides {
    overrides: BTreeMap<String, ResourceOverride>,
}

impl ScriptOverrides {
    pub fn new(overrides: BTreeMap<String, ResourceOverride>) -> Self { Self { overrides } }

    /// Script and its `useOpenLibs` flag. An exact key wins over globs.
    pub fn script_for(&self, group: &str, kind: &str) -> Option<(&str, bool)> {
        if let Some(found) = self.overrides.get(&override_key(group, kind)).and_then(with_script) {
            return Some(found);
        }
        let full = format!("{group}/{kind}");
        self.overrides
            .iter()
            .filter(|(k, _)| k.contains(|c: char| c == '*' || c == '?'))
            .find(|(k, _)| glob_match(k, &full))
            .and_then(|(_, o)| with_script(o))
    }

    pub fn is_empty(&self) -> bool { self.overrides.values().all(|o| o.health_lua.is_empty()) }
}
