//! Framework plugins.
//!
//! Plugins extend the framework shared by every component of a renderer:
//! they contribute instance state and page metadata. Path plugins are
//! compiled modules exporting `{ name, state, meta }` and go through the same
//! compile cache as components.
//!
//! Mixins are compiled modules applied to every component instance: their
//! `data` goes beneath the component's, and any other field the component
//! lacks (helpers, `meta`, even `render`) is taken from the mixin.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{LoadError, Result};
use crate::loader::Module;
use crate::meta::MetaInfo;

pub trait Plugin: Send + Sync {
    /// Installation key. A name installs at most once per framework.
    fn name(&self) -> &str;

    fn install(&self, framework: &mut Framework);
}

/// A plugin given by source path or as a ready instance.
#[derive(Clone)]
pub enum PluginRef {
    Path(PathBuf),
    Instance(Arc<dyn Plugin>),
}

impl fmt::Debug for PluginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Instance(plugin) => f.debug_tuple("Instance").field(&plugin.name()).finish(),
        }
    }
}

/// Plugin read from a compiled module.
#[derive(Debug, Clone, Default)]
pub struct ModulePlugin {
    name: String,
    state: Map<String, Value>,
    meta: MetaInfo,
}

impl ModulePlugin {
    /// Read `name` (defaults to the file stem), `state` and `meta` from the
    /// module exports.
    pub fn from_module(module: &Module) -> Result<Self> {
        let fail = |e: mlua::Error| LoadError::new(module.path(), e.to_string());

        let name = module
            .field::<Option<String>>("name")
            .map_err(fail)?
            .unwrap_or_else(|| {
                module
                    .path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        Ok(Self {
            name,
            state: module.field("state").map_err(fail)?,
            meta: module.field("meta").map_err(fail)?,
        })
    }
}

impl Plugin for ModulePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, framework: &mut Framework) {
        framework.extend_state(&self.state);
        framework.merge_meta(&self.meta);
    }
}

/// The shared framework every component instance is created against.
#[derive(Debug, Clone, Default)]
pub struct Framework {
    installed: Vec<String>,
    state: Map<String, Value>,
    meta: MetaInfo,
    mixins: Vec<Arc<Module>>,
}

impl Framework {
    /// Install `plugin` unless a plugin with the same name already is.
    /// Returns whether it was installed.
    pub fn install(&mut self, plugin: &dyn Plugin) -> bool {
        if self.is_installed(plugin.name()) {
            crate::debug!("render"; "plugin `{}` already installed", plugin.name());
            return false;
        }
        plugin.install(self);
        self.installed.push(plugin.name().to_string());
        true
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|n| n == name)
    }

    pub fn installed(&self) -> &[String] {
        &self.installed
    }

    pub fn extend_state(&mut self, state: &Map<String, Value>) {
        self.state
            .extend(state.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn merge_meta(&mut self, meta: &MetaInfo) {
        self.meta = self.meta.merge(meta);
    }

    /// Apply `module` to every component instance, after earlier mixins.
    pub fn add_mixin(&mut self, module: Arc<Module>) {
        self.mixins.push(module);
    }

    pub fn mixins(&self) -> &[Arc<Module>] {
        &self.mixins
    }

    /// State merged into every instance, beneath component data.
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Metadata layered between the global and component metadata.
    pub fn meta(&self) -> &MetaInfo {
        &self.meta
    }
}
