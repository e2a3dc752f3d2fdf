use std::sync::Arc;

use crate::loader::Module;

/// A loaded module and the stylesheet of the batch that produced it.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub module: Arc<Module>,
    pub stylesheet: Option<Arc<str>>,
}

impl Artifact {
    pub fn new(module: Module, stylesheet: Option<Arc<str>>) -> Self {
        Self {
            module: Arc::new(module),
            stylesheet,
        }
    }
}
