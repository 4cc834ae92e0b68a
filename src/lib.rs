pub mod assemble;
pub mod ast;
pub mod config;
pub mod document;
pub mod ir;
pub mod markdown;
pub mod measure;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod render;
pub mod source;
pub mod typedocs;

use wasm_bindgen::prelude::*;

use assemble::assemble_snapshot;
use render::{RenderOptions, render};
use source::MetadataSnapshot;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Render a JSON metadata snapshot to Markdown
#[wasm_bindgen(js_name = "metadataToMarkdown")]
pub fn render_snapshot(
    snapshot: &str,
    include_types: Option<bool>,
    pure_markdown: Option<bool>,
    include_rls: Option<bool>,
    include_toc: Option<bool>,
) -> Result<String, String> {
    let snapshot = MetadataSnapshot::from_json(snapshot).map_err(|e| e.to_string())?;
    let schema = assemble_snapshot(&snapshot);

    let defaults = RenderOptions::default();
    let options = RenderOptions {
        include_types: include_types.unwrap_or(defaults.include_types),
        pure_markdown: pure_markdown.unwrap_or(defaults.pure_markdown),
        include_rls: include_rls.unwrap_or(defaults.include_rls),
        include_toc: include_toc.unwrap_or(defaults.include_toc),
        type_docs: defaults.type_docs,
    };

    Ok(markdown::serialize(&render(&schema, &options)))
}
