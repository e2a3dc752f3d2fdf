//! Sandboxed evaluation of compiled artifacts.
//!
//! Each evaluation gets its own Lua state. Only pure libraries are opened
//! (`table`, `string`, `math`, `utf8`), the base functions that reach the
//! host (`dofile`, `loadfile`, `load`, `collectgarbage`) are removed, and the
//! configured globals plus a small `pronto` table are the whole capability
//! set a module can see.
//!
//! A [`Module`] keeps its artifact so renders can [`Module::instantiate`] a
//! private sandbox instead of sharing (and locking) the cached one.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use mlua::prelude::*;
use mlua::{DeserializeOptions, LuaOptions, SerializeOptions, StdLib};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::LoadError;
use crate::utils::html;

/// Base functions removed from every sandbox.
const BLOCKED_GLOBALS: &[&str] = &["dofile", "loadfile", "load", "collectgarbage"];

/// Evaluates compiled artifacts into [`Module`]s.
#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    globals: Arc<Map<String, Value>>,
}

impl ModuleLoader {
    pub fn new(globals: Map<String, Value>) -> Self {
        Self {
            globals: Arc::new(globals),
        }
    }

    pub fn globals(&self) -> &Map<String, Value> {
        &self.globals
    }

    /// Evaluate `source`, the compiled artifact of `path`.
    ///
    /// The chunk must return a table: the module exports.
    pub fn load(&self, path: &Path, source: &[u8]) -> Result<Module, LoadError> {
        let source = Bytes::copy_from_slice(source);
        let main = self.evaluate(path, &source)?;
        Ok(Module {
            path: path.to_path_buf(),
            source,
            loader: self.clone(),
            main,
        })
    }

    fn evaluate(&self, path: &Path, source: &[u8]) -> Result<Sandbox, LoadError> {
        let lua = self
            .sandbox()
            .map_err(|e| LoadError::new(path, e.to_string()))?;
        let exports = eval_exports(&lua, path, source)?;
        Ok(Sandbox { lua, exports })
    }

    fn sandbox(&self) -> LuaResult<Lua> {
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::default(),
        )?;

        let globals = lua.globals();
        for name in BLOCKED_GLOBALS {
            globals.set(*name, LuaValue::Nil)?;
        }

        for (name, value) in self.globals.iter() {
            globals.set(name.as_str(), to_lua(&lua, value)?)?;
        }

        let pronto = lua.create_table()?;
        pronto.set(
            "escape",
            lua.create_function(|_, text: String| Ok(html::escape(&text).into_owned()))?,
        )?;
        globals.set("pronto", pronto)?;

        Ok(lua)
    }
}

/// One evaluated artifact: a Lua state and the table its chunk returned.
pub struct Sandbox {
    lua: Lua,
    exports: LuaTable,
}

impl Sandbox {
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn exports(&self) -> &LuaTable {
        &self.exports
    }

    /// The component table: `exports.default` when present, else the exports.
    pub fn component(&self) -> LuaResult<LuaTable> {
        component_of(&self.exports)
    }

    /// Evaluate another module's artifact inside this sandbox and return its
    /// component table, so its functions can run against this state.
    pub fn include(&self, module: &Module) -> Result<LuaTable, LoadError> {
        let exports = eval_exports(&self.lua, &module.path, &module.source)?;
        component_of(&exports).map_err(|e| LoadError::new(&module.path, e.to_string()))
    }
}

fn eval_exports(lua: &Lua, path: &Path, source: &[u8]) -> Result<LuaTable, LoadError> {
    let exports = lua
        .load(source)
        .set_name(format!("@{}", path.display()))
        .eval::<LuaValue>()
        .map_err(|e| LoadError::new(path, e.to_string()))?;

    match exports {
        LuaValue::Table(exports) => Ok(exports),
        other => Err(LoadError::new(
            path,
            format!("module must return a table, got {}", other.type_name()),
        )),
    }
}

fn component_of(exports: &LuaTable) -> LuaResult<LuaTable> {
    Ok(exports
        .get::<Option<LuaTable>>("default")?
        .unwrap_or_else(|| exports.clone()))
}

/// A loaded module: its exports, the state that owns them and the artifact
/// they were evaluated from.
pub struct Module {
    path: PathBuf,
    source: Bytes,
    loader: ModuleLoader,
    main: Sandbox,
}

impl Module {
    /// Source path this module was compiled from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lua(&self) -> &Lua {
        self.main.lua()
    }

    pub fn exports(&self) -> &LuaTable {
        self.main.exports()
    }

    pub fn component(&self) -> LuaResult<LuaTable> {
        self.main.component()
    }

    /// Evaluate the artifact again in a fresh sandbox with the same globals.
    pub fn instantiate(&self) -> Result<Sandbox, LoadError> {
        self.loader.evaluate(&self.path, &self.source)
    }

    /// Read an exported field as a plain value. Functions are skipped.
    pub fn field<T: DeserializeOwned + Default>(&self, key: &str) -> LuaResult<T> {
        let value = self.component()?.get::<LuaValue>(key)?;
        from_lua(self.lua(), value)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("path", &self.path).finish_non_exhaustive()
    }
}

/// JSON → Lua, mapping `null` to `nil`.
pub(crate) fn to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    lua.to_value_with(
        value,
        SerializeOptions::new()
            .serialize_none_to_null(false)
            .serialize_unit_to_null(false),
    )
}

/// Lua → plain data. `nil` yields `T::default()`; functions and userdata are
/// skipped.
pub(crate) fn from_lua<T: DeserializeOwned + Default>(lua: &Lua, value: LuaValue) -> LuaResult<T> {
    if value.is_nil() {
        return Ok(T::default());
    }
    lua.from_value_with(value, DeserializeOptions::new().deny_unsupported_types(false))
}
