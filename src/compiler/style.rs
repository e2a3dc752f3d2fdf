//! Stylesheet side channel of a build batch.
//!
//! Every batch that produced a stylesheet replaces the compiled CSS text.
//! The global metadata then either links the published file or carries the
//! text inline. Both are swapped whole, so a render reads one consistent
//! snapshot and the last successful batch wins.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::CompilerOptions;
use crate::backend::BuildReport;
use crate::meta::{COMPILED_STYLE_ID, MetaInfo, Tag, TagKind};
use crate::sink::SinkFs;
use crate::utils::path::to_url_path;

pub(super) struct StyleState {
    css: ArcSwap<String>,
    meta: ArcSwap<MetaInfo>,
}

impl StyleState {
    pub(super) fn new(meta: MetaInfo) -> Self {
        Self {
            css: ArcSwap::from_pointee(String::new()),
            meta: ArcSwap::from_pointee(meta),
        }
    }

    pub(super) fn css(&self) -> Arc<String> {
        self.css.load_full()
    }

    pub(super) fn meta(&self) -> Arc<MetaInfo> {
        self.meta.load_full()
    }

    /// Take in the stylesheet of `report`, once per batch.
    ///
    /// Returns the stylesheet text, if the batch had one.
    pub(super) fn absorb(
        &self,
        options: &CompilerOptions,
        sink: &dyn SinkFs,
        report: &BuildReport,
    ) -> Option<Arc<str>> {
        let sheet = report.stylesheet.as_ref()?;
        let css = match sink.read_to_string(sheet) {
            Ok(css) => css,
            Err(e) => {
                crate::log!("style"; "cannot read {}: {}", sheet.display(), e);
                return None;
            }
        };

        self.css.store(Arc::new(css.clone()));

        if options.extract_css {
            match publish(options, sink, report, &css) {
                Ok(href) => self.merge(TagKind::Link, Tag::stylesheet(&href)),
                Err(e) => crate::log!("style"; "cannot publish stylesheet: {}", e),
            }
        } else {
            self.merge(TagKind::Style, Tag::inline_style(COMPILED_STYLE_ID, &css));
        }

        Some(Arc::from(css))
    }

    fn merge(&self, kind: TagKind, tag: Tag) {
        self.meta.rcu(|current| {
            let mut next = MetaInfo::clone(current);
            next.merge_tag(kind, tag.clone());
            next
        });
    }
}

/// Write the stylesheet (and its source map) under `public_path`.
///
/// Returns the root-relative href of the published file.
fn publish(
    options: &CompilerOptions,
    sink: &dyn SinkFs,
    report: &BuildReport,
    css: &str,
) -> io::Result<String> {
    let target = options.public_path.join(&options.css_output_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, css)?;

    if let Some(map) = &report.sourcemap {
        let contents = sink.read(map)?;
        let mut map_target = OsString::from(target.as_os_str());
        map_target.push(".map");
        fs::write(PathBuf::from(map_target), contents)?;
    }

    crate::debug!("style"; "published {}", target.display());
    Ok(to_url_path(&options.css_output_path))
}
