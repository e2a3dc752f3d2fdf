//! `[render]` section configuration.
//!
//! ```toml
//! [render]
//! plugins = ["plugins/site.lua"]  # Relative to `build.views`
//! mixins = ["mixins/layout.lua"]  # Applied to every component, in order
//! inline_css = false              # Inline the compiled stylesheet by default
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub plugins: Vec<PathBuf>,
    pub mixins: Vec<PathBuf>,
    pub inline_css: bool,
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;
    use std::path::PathBuf;

    #[test]
    fn test_render_config() {
        let config = test_parse_config(
            "[render]\nplugins = [\"plugins/site.lua\"]\nmixins = [\"m.lua\"]\ninline_css = true",
        );
        assert_eq!(config.render.plugins, vec![PathBuf::from("plugins/site.lua")]);
        assert_eq!(config.render.mixins, vec![PathBuf::from("m.lua")]);
        assert!(config.render.inline_css);
    }

    #[test]
    fn test_render_config_defaults() {
        let config = test_parse_config("");
        assert!(config.render.plugins.is_empty());
        assert!(config.render.mixins.is_empty());
        assert!(!config.render.inline_css);
    }
}
