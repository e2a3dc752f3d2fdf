//! Built-in engine for Lua component tables.
//!
//! A component is a table with optional `data` and `meta` fields and a
//! `render(vm, emit)` function. `render` may return the body (a string or an
//! array of strings) or push chunks through `emit`; both can be mixed.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use mlua::prelude::*;
use serde_json::Value;
use tokio::sync::mpsc;

use super::engine::{BodyStream, RenderContext, RenderEngine};
use super::plugin::Framework;
use crate::error::{Error, RenderError, Result};
use crate::loader::{Module, Sandbox, from_lua, to_lua};
use crate::meta::MetaInfo;

#[derive(Debug, Default, Clone, Copy)]
pub struct LuaEngine;

/// A component bound to its request: the `vm` table passed to `render`.
///
/// Every instance evaluates the module into its own sandbox, so renders of
/// one view never wait on each other and nothing they create outlives them.
pub struct LuaInstance {
    module: Arc<Module>,
    sandbox: Sandbox,
    component: LuaTable,
    vm: LuaTable,
}

impl LuaInstance {
    fn path(&self) -> PathBuf {
        self.module.path().to_path_buf()
    }

    /// Read a value from the instance data.
    pub fn get(&self, key: &str) -> Result<Value> {
        let value = self.vm.get::<LuaValue>(key).map_err(|e| self.fail(e))?;
        from_lua(self.sandbox.lua(), value).map_err(|e| self.fail(e))
    }

    fn fail(&self, e: LuaError) -> Error {
        RenderError::engine(self.module.path(), e.to_string())
    }

    /// Run `render`, handing every chunk to `sink`.
    ///
    /// `emit` only lives for the call: once `render` returns, `sink` and
    /// everything it captured are dropped.
    fn run(&self, mut sink: impl FnMut(Bytes) -> LuaResult<()>) -> Result<()> {
        let render = match self.component.get::<LuaValue>("render").map_err(|e| self.fail(e))? {
            LuaValue::Function(f) => f,
            _ => {
                return Err(RenderError::engine(
                    self.module.path(),
                    "component has no render function",
                ));
            }
        };

        self.sandbox
            .lua()
            .scope(|scope| {
                let emit = scope.create_function_mut(|_, chunk: LuaString| {
                    sink(Bytes::copy_from_slice(&chunk.as_bytes()))
                })?;

                let returned = render.call::<LuaValue>((self.vm.clone(), emit.clone()))?;
                match returned {
                    LuaValue::Nil => Ok(()),
                    LuaValue::String(_) | LuaValue::Integer(_) | LuaValue::Number(_) => {
                        emit.call::<()>(returned)
                    }
                    LuaValue::Table(parts) => {
                        for part in parts.sequence_values::<LuaValue>() {
                            emit.call::<()>(part?)?;
                        }
                        Ok(())
                    }
                    other => Err(LuaError::runtime(format!(
                        "render returned {}",
                        other.type_name()
                    ))),
                }
            })
            .map_err(|e| self.fail(e))
    }
}

/// Evaluate `source.data` (a table or a function returning one) into `vm`.
fn copy_data(source: &LuaTable, vm: &LuaTable) -> LuaResult<()> {
    let data = match source.get::<LuaValue>("data")? {
        LuaValue::Function(f) => f.call::<LuaValue>(())?,
        other => other,
    };
    match data {
        LuaValue::Nil => Ok(()),
        LuaValue::Table(data) => {
            for pair in data.pairs::<LuaValue, LuaValue>() {
                let (key, value) = pair?;
                vm.set(key, value)?;
            }
            Ok(())
        }
        other => Err(LuaError::runtime(format!(
            "data must be a table, got {}",
            other.type_name()
        ))),
    }
}

impl RenderEngine for LuaEngine {
    type Instance = LuaInstance;

    fn create_instance(
        &self,
        module: Arc<Module>,
        context: &RenderContext,
        framework: &Framework,
    ) -> Result<LuaInstance> {
        let fail = |e: LuaError| RenderError::engine(module.path(), e.to_string());
        let sandbox = module.instantiate()?;
        let lua = sandbox.lua();
        let component = sandbox.component().map_err(fail)?;
        let vm = lua.create_table().map_err(fail)?;

        // framework state < mixin data < component data < request state
        for (key, value) in framework.state() {
            vm.set(key.as_str(), to_lua(lua, value).map_err(fail)?)
                .map_err(fail)?;
        }

        for mixin in framework.mixins() {
            let table = sandbox.include(mixin)?;
            let mixin_fail = |e: LuaError| RenderError::engine(mixin.path(), e.to_string());
            copy_data(&table, &vm).map_err(mixin_fail)?;
            for pair in table.pairs::<LuaValue, LuaValue>() {
                let (key, value) = pair.map_err(mixin_fail)?;
                if key.as_str().as_deref() == Some("data") {
                    continue;
                }
                if component.raw_get::<LuaValue>(key.clone()).map_err(fail)?.is_nil() {
                    component.raw_set(key, value).map_err(fail)?;
                }
            }
        }

        copy_data(&component, &vm).map_err(fail)?;

        if let Value::Object(state) = &context.state {
            for (key, value) in state {
                vm.set(key.as_str(), to_lua(lua, value).map_err(fail)?)
                    .map_err(fail)?;
            }
        }

        vm.set("$url", context.url.as_str()).map_err(fail)?;
        vm.set(
            "$context",
            to_lua(lua, &serde_json::to_value(context).unwrap_or(Value::Null)).map_err(fail)?,
        )
        .map_err(fail)?;

        Ok(LuaInstance {
            module,
            sandbox,
            component,
            vm,
        })
    }

    fn meta(&self, instance: &LuaInstance) -> Result<MetaInfo> {
        let lua = instance.sandbox.lua();
        let meta = match instance
            .component
            .get::<LuaValue>("meta")
            .map_err(|e| instance.fail(e))?
        {
            LuaValue::Function(f) => f
                .call::<LuaValue>(instance.vm.clone())
                .map_err(|e| instance.fail(e))?,
            other => other,
        };
        from_lua(lua, meta).map_err(|e| instance.fail(e))
    }

    fn render_to_stream(&self, instance: LuaInstance) -> BodyStream {
        let (tx, rx) = mpsc::channel::<Result<Bytes, Error>>(1);

        tokio::task::spawn_blocking(move || {
            let result = instance.run(|chunk| {
                tx.blocking_send(Ok(chunk))
                    .map_err(|_| LuaError::runtime("render stream closed"))
            });
            drop(instance);
            if let Err(e) = result {
                let _ = tx.blocking_send(Err(e));
            }
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    async fn render_to_string(&self, instance: LuaInstance) -> Result<String> {
        let path = instance.path();
        tokio::task::spawn_blocking(move || {
            let mut body = Vec::new();
            instance.run(|chunk| {
                body.extend_from_slice(&chunk);
                Ok(())
            })?;
            String::from_utf8(body)
                .map_err(|e| RenderError::engine(instance.module.path(), e.to_string()))
        })
        .await
        .map_err(|e| RenderError::engine(&path, format!("render task failed: {e}")))?
    }
}
