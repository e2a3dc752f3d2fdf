//! Built-in backend for `.view` single-file components and plain `.lua`
//! modules.

use std::fs;
use std::path::Path;

use bytes::Bytes;
use mlua::Lua;

use super::{BuildBackend, BuildReport, BuildRequest};
use crate::error::{BuildError, Diagnostic};
use crate::sink::SinkFs;

/// Compiles view files into Lua chunks plus one combined stylesheet.
#[derive(Debug, Default, Clone, Copy)]
pub struct LuaBackend;

/// One parsed source file.
#[derive(Debug, Default, PartialEq, Eq)]
struct Sections<'a> {
    script: Option<&'a str>,
    styles: Vec<&'a str>,
}

impl BuildBackend for LuaBackend {
    fn build(&self, request: &BuildRequest, sink: &dyn SinkFs) -> Result<BuildReport, BuildError> {
        let lua = Lua::new();
        let mut diagnostics = Vec::new();
        let mut scripts = Vec::with_capacity(request.len());
        let mut css = String::new();

        for (entry, path) in request.entries() {
            let source = match fs::read_to_string(path) {
                Ok(source) => source,
                Err(e) => {
                    diagnostics.push(Diagnostic::error(path, e.to_string()));
                    continue;
                }
            };

            let sections = match split_sections(path, &source, &mut diagnostics) {
                Some(sections) => sections,
                None => continue,
            };

            let Some(script) = sections.script else {
                diagnostics.push(Diagnostic::error(path, "missing <script> block"));
                continue;
            };

            // Parse only; the chunk runs later inside the loader sandbox
            let chunk_name = format!("@{}", path.display());
            if let Err(e) = lua.load(script).set_name(chunk_name).into_function() {
                diagnostics.push(Diagnostic::error(path, e.to_string()));
                continue;
            }

            for style in &sections.styles {
                css.push_str(&format!("/* {} */\n", path.display()));
                css.push_str(style.trim());
                css.push('\n');
            }
            scripts.push((entry.to_string(), script.to_string()));
        }

        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(BuildError::with_diagnostics(diagnostics));
        }

        let mut report = BuildReport {
            diagnostics,
            ..BuildReport::default()
        };

        for (entry, script) in scripts {
            let target = request.artifact_path(&entry);
            sink.write(&target, Bytes::from(script))
                .map_err(|e| BuildError::new(format!("{}: {e}", target.display())))?;
            report.artifacts.insert(entry, target);
        }

        if !css.is_empty() {
            let target = request.stylesheet_path();
            sink.write(&target, Bytes::from(css))
                .map_err(|e| BuildError::new(format!("{}: {e}", target.display())))?;
            report.stylesheet = Some(target);
        }

        crate::debug!("build"; "compiled {} entries", report.artifacts.len());
        Ok(report)
    }
}

/// Split a source file into its script and style sections.
///
/// `.lua` files are a single script. Everything else is scanned for
/// top-level `<script>` and `<style>` blocks. Returns `None` after pushing an
/// error diagnostic when a block is left open.
fn split_sections<'a>(
    path: &Path,
    source: &'a str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Sections<'a>> {
    if path.extension().is_some_and(|ext| ext == "lua") {
        return Some(Sections {
            script: Some(source),
            styles: Vec::new(),
        });
    }

    let mut sections = Sections::default();
    let mut rest = source;

    while let Some(open) = rest.find('<') {
        let tail = &rest[open..];
        let tag = if tail.starts_with("<script") {
            "script"
        } else if tail.starts_with("<style") {
            "style"
        } else {
            rest = &tail[1..];
            continue;
        };

        let Some(head_end) = tail.find('>') else {
            diagnostics.push(Diagnostic::error(path, format!("unterminated <{tag}> tag")));
            return None;
        };
        let body = &tail[head_end + 1..];
        let close = format!("</{tag}>");
        let Some(body_end) = body.find(&close) else {
            diagnostics.push(Diagnostic::error(path, format!("missing {close}")));
            return None;
        };
        let content = &body[..body_end];

        if tag == "script" {
            if sections.script.is_some() {
                diagnostics.push(Diagnostic::warning(
                    path,
                    "multiple <script> blocks, only the first is used",
                ));
            } else {
                sections.script = Some(content);
            }
        } else {
            sections.styles.push(content);
        }

        rest = &body[body_end + close.len()..];
    }

    Some(sections)
}
