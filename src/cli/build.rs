//! `pronto build`: compile every view once.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::runtime::Runtime;

use crate::config::ProntoConfig;
use crate::factory::create_renderer;

/// Compile every view under `build.views` plus `build.pre_compile` and the
/// plugins and mixins as one batch. Any error diagnostic fails the command.
pub fn build_views(config: &ProntoConfig, runtime: &Runtime) -> Result<()> {
    let mut config = config.clone();
    config.build.watch = false;

    let renderer = create_renderer(&config);
    // The failure is returned below with its diagnostics
    renderer.on_error(Arc::new(|_| {}));

    let count = renderer.options().pre_compile.len();
    log!("build"; "compiling {} views", count);
    let start = Instant::now();

    if let Err(e) = runtime.block_on(renderer.init()) {
        for diagnostic in e.diagnostics() {
            log!("error"; "{}", diagnostic);
        }
        return Err(e.into());
    }

    log!(
        "build";
        "compiled {} views in {:.2?}",
        count,
        start.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use std::fs;
    use tempfile::TempDir;

    fn project(view: &str) -> (TempDir, ProntoConfig) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("views")).unwrap();
        fs::write(dir.path().join("views/index.view"), view).unwrap();
        let mut config = test_parse_config("");
        config.build.normalize(dir.path());
        config.build.output_path = dir.path().join("out");
        (dir, config)
    }

    #[test]
    fn test_build_succeeds() {
        let (_dir, config) = project("<script>return { render = function() return 'ok' end }</script>");
        let runtime = Runtime::new().unwrap();
        build_views(&config, &runtime).unwrap();
    }

    #[test]
    fn test_build_fails_on_syntax_error() {
        let (_dir, config) = project("<script>return { render = function( }</script>");
        let runtime = Runtime::new().unwrap();
        let err = build_views(&config, &runtime).unwrap_err();
        let err = err.downcast_ref::<crate::error::Error>().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Build);
        assert!(!err.diagnostics().is_empty());
    }
}
