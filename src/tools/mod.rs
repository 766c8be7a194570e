//! Page tools
//!
//! Handlers the realtime model can call, grouped by concern, plus the
//! schema catalog advertised for them.

pub mod catalog;
pub mod content;
pub mod image;
pub mod layout;
pub mod output;
pub mod page;
pub mod set;
pub mod structure;
pub mod style;

pub use catalog::{catalog, tool_definitions, ToolSchema};
pub use output::ToolOutput;
pub use set::{Handler, ToolContext, ToolSet};

use crate::registry::sanitize::{extract_style_blocks, kebab_case, Sanitized};
use crate::registry::{ElementRegistry, StyleMap};
use crate::{Result, VoxError};
use serde_json::{Map, Value};

/// Check an optional parent id against the registry
pub(crate) fn resolve_parent(
    registry: &ElementRegistry,
    element_id: Option<String>,
) -> Result<Option<String>> {
    match element_id.filter(|id| !id.is_empty()) {
        Some(id) if registry.contains(&id) => Ok(Some(id)),
        Some(id) => Err(VoxError::not_found(id)),
        None => Ok(None),
    }
}

/// Run model-supplied text through style extraction
pub(crate) fn ingest(text: &str) -> Sanitized {
    extract_style_blocks(text)
}

/// Merge the rules pulled out by [`ingest`] once the new element exists
pub(crate) fn apply_ingested(
    registry: &mut ElementRegistry,
    sanitized: &Sanitized,
    output: ToolOutput,
) -> ToolOutput {
    if !sanitized.has_rules() {
        return output;
    }
    let styled = registry.apply_extracted_styles(sanitized);
    if styled.is_empty() {
        output
    } else {
        output.with("styledElements", styled)
    }
}

/// CSS value from a JSON scalar
pub(crate) fn css_value(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(VoxError::Validation(format!(
            "Style {} must be a string or number",
            key
        ))),
    }
}

/// `{camelCase: value}` -> kebab-case style map
pub(crate) fn style_map(styles: &Map<String, Value>) -> Result<StyleMap> {
    styles
        .iter()
        .map(|(key, value)| Ok((kebab_case(key), css_value(key, value)?)))
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::images::{ImageGenerator, ImageRequest};
    use crate::registry::shared_registry;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Generator answering with a fixed result
    pub struct FixedImages(pub std::result::Result<String, String>);

    #[async_trait]
    impl ImageGenerator for FixedImages {
        async fn generate(&self, _request: ImageRequest) -> Result<String> {
            self.0.clone().map_err(VoxError::ExternalService)
        }
    }

    pub fn context() -> ToolContext {
        ToolContext::new(shared_registry(), Arc::new(FixedImages(Ok("https://img.test/a.png".into()))))
    }

    pub async fn call(ctx: &ToolContext, name: &str, args: Value) -> ToolOutput {
        let set = ToolSet::standard().unwrap();
        set.invoke(ctx, name, args).await.unwrap()
    }
}
