//! Image tools
//!
//! `generateImage` inserts a pending container before calling the image
//! service and resolves it afterwards. The registry lock is released for
//! the duration of the call, so resolution re-reads the container and
//! copes with it having been deleted in the meantime.

use super::set::{Handler, ToolContext, ToolSet};
use super::{resolve_parent, ToolOutput};
use crate::images::ImageRequest;
use crate::registry::{generate_id, Element, ImageStatus, StyleMap};
use crate::{Result, VoxError};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateArgs {
    pub prompt: String,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub style: Option<String>,
    pub element_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderArgs {
    pub text: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub element_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeArgs {
    pub element_id: String,
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignArgs {
    pub element_id: String,
    pub alignment: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageArgs {
    pub element_id: String,
}

pub fn register(set: &mut ToolSet) -> Result<()> {
    set.register("generateImage", Handler::asynchronous(generate_image))?;
    set.register("createImagePlaceholder", Handler::sync(create_image_placeholder))?;
    set.register("resizeImage", Handler::sync(resize_image))?;
    set.register("alignImage", Handler::sync(align_image))?;
    set.register("deleteImage", Handler::sync(delete_image))?;
    Ok(())
}

fn style(pairs: &[(&str, &str)]) -> StyleMap {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Insert the pending container; the lock is dropped on return
fn insert_pending(ctx: &ToolContext, parent: Option<String>) -> Result<String> {
    let mut registry = ctx.registry.lock();
    let parent = resolve_parent(&registry, parent)?;
    let mut container = Element::div()
        .with_id(Some(generate_id("img-container")))
        .with_content("Generating image...")
        .with_parent(parent);
    container.image_status = Some(ImageStatus::Pending);
    let id = registry.add(container)?;
    registry.update_style(
        &id,
        style(&[
            ("position", "relative"),
            ("min-height", "200px"),
            ("display", "flex"),
            ("justify-content", "center"),
            ("align-items", "center"),
        ]),
    )?;
    Ok(id)
}

async fn generate_image(ctx: ToolContext, args: GenerateArgs) -> Result<ToolOutput> {
    let prompt = args.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(VoxError::Validation("prompt must not be empty".to_string()));
    }

    let container_id = insert_pending(&ctx, args.element_id)?;
    info!("Generating image into {}: {}", container_id, prompt);

    let request = ImageRequest::new(prompt.clone())
        .with_size(args.size)
        .with_quality(args.quality)
        .with_style(args.style);
    let result = match tokio::time::timeout(ctx.image_timeout, ctx.images.generate(request)).await
    {
        Ok(result) => result,
        Err(_) => Err(VoxError::ExternalService(format!(
            "Image generation timed out after {}s",
            ctx.image_timeout.as_secs()
        ))),
    };

    let mut registry = ctx.registry.lock();
    let Some(container) = registry.get_mut(&container_id) else {
        warn!("Image container {} removed before generation finished", container_id);
        let output = ToolOutput::failure(format!(
            "Image container {} was removed before generation finished",
            container_id
        ))
        .with("containerId", container_id);
        return Ok(match result {
            Ok(url) => output.with("imageUrl", url),
            Err(_) => output,
        });
    };

    match result {
        Ok(url) => {
            container.content = None;
            container.image_status = Some(ImageStatus::Ready);
            let image = Element::image(url.clone(), prompt)
                .with_id(Some(generate_id("generated-img")))
                .with_parent(Some(container_id.clone()));
            let image_id = registry.add(image)?;
            registry.update_style(&image_id, style(&[("max-width", "100%"), ("height", "auto")]))?;
            Ok(ToolOutput::success()
                .with("imageUrl", url)
                .with("containerId", container_id)
                .with("imageId", image_id))
        }
        Err(e) => {
            warn!("Image generation for {} failed: {}", container_id, e);
            container.content = Some("Image generation failed".to_string());
            container.image_status = Some(ImageStatus::Failed);
            Ok(ToolOutput::from(e).with("containerId", container_id))
        }
    }
}

fn create_image_placeholder(ctx: &ToolContext, args: PlaceholderArgs) -> Result<ToolOutput> {
    let width = args.width.unwrap_or_else(|| "300px".to_string());
    let height = args.height.unwrap_or_else(|| "200px".to_string());

    let mut registry = ctx.registry.lock();
    let parent = resolve_parent(&registry, args.element_id)?;
    let mut placeholder = Element::div()
        .with_id(Some(generate_id("img-placeholder")))
        .with_content(args.text.unwrap_or_else(|| "Image".to_string()))
        .with_parent(parent);
    placeholder.image_status = Some(ImageStatus::Placeholder);
    let id = registry.add(placeholder)?;
    registry.update_style(
        &id,
        style(&[
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("background-color", "#f0f0f0"),
            ("display", "flex"),
            ("justify-content", "center"),
            ("align-items", "center"),
            ("border", "1px solid #ddd"),
        ]),
    )?;

    Ok(ToolOutput::success()
        .with("containerId", id)
        .with("width", width)
        .with("height", height))
}

/// Look up an element that must be an image, placeholder or image container
fn require_image(ctx: &ToolContext, id: &str) -> Result<()> {
    let registry = ctx.registry.lock();
    let element = registry.get(id).ok_or_else(|| VoxError::not_found(id))?;
    if element.is_image_like() {
        Ok(())
    } else {
        Err(VoxError::Validation(format!("Element {} is not an image", id)))
    }
}

fn resize_image(ctx: &ToolContext, args: ResizeArgs) -> Result<ToolOutput> {
    if args.width.is_none() && args.height.is_none() {
        return Err(VoxError::Validation(
            "resizeImage needs a width or height".to_string(),
        ));
    }
    require_image(ctx, &args.element_id)?;

    let mut size = StyleMap::new();
    if let Some(width) = &args.width {
        size.insert("width".to_string(), width.clone());
    }
    if let Some(height) = &args.height {
        size.insert("height".to_string(), height.clone());
    }
    ctx.registry.lock().update_style(&args.element_id, size)?;

    Ok(ToolOutput::success()
        .with("elementId", args.element_id)
        .with("width", args.width)
        .with("height", args.height))
}

fn align_image(ctx: &ToolContext, args: AlignArgs) -> Result<ToolOutput> {
    let (left, right) = match args.alignment.as_str() {
        "left" => ("0", "auto"),
        "center" => ("auto", "auto"),
        "right" => ("auto", "0"),
        other => {
            return Err(VoxError::Validation(format!(
                "Unsupported alignment {}; use left, center or right",
                other
            )))
        }
    };
    require_image(ctx, &args.element_id)?;
    ctx.registry.lock().update_style(
        &args.element_id,
        style(&[("display", "block"), ("margin-left", left), ("margin-right", right)]),
    )?;

    Ok(ToolOutput::success()
        .with("elementId", args.element_id)
        .with("alignment", args.alignment))
}

fn delete_image(ctx: &ToolContext, args: ImageArgs) -> Result<ToolOutput> {
    require_image(ctx, &args.element_id)?;
    ctx.registry.lock().delete(&args.element_id)?;
    Ok(ToolOutput::success().with("deletedElementId", args.element_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::ImageGenerator;
    use crate::registry::shared_registry;
    use crate::tools::testing::{call, context, FixedImages};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn context_with(images: Arc<dyn ImageGenerator>) -> ToolContext {
        ToolContext::new(shared_registry(), images)
    }

    /// Blocks until released, then answers with a URL
    struct GatedImages(Arc<Notify>);

    #[async_trait]
    impl ImageGenerator for GatedImages {
        async fn generate(&self, _request: ImageRequest) -> Result<String> {
            self.0.notified().await;
            Ok("https://img.test/late.png".to_string())
        }
    }

    struct NeverImages;

    #[async_trait]
    impl ImageGenerator for NeverImages {
        async fn generate(&self, _request: ImageRequest) -> Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_generate_image_success() {
        let ctx = context();
        let output = call(&ctx, "generateImage", json!({"prompt": "a red fox"})).await;
        assert!(output.is_success());
        assert_eq!(output.get_str("imageUrl"), Some("https://img.test/a.png"));

        let container_id = output.get_str("containerId").unwrap();
        let image_id = output.get_str("imageId").unwrap();
        let registry = ctx.registry.lock();
        let container = registry.get(container_id).unwrap();
        assert_eq!(container.image_status, Some(ImageStatus::Ready));
        assert_eq!(container.content, None);
        let image = registry.get(image_id).unwrap();
        assert_eq!(image.parent.as_deref(), Some(container_id));
        assert_eq!(image.alt.as_deref(), Some("a red fox"));
    }

    #[tokio::test]
    async fn test_generate_image_failure_marks_container() {
        let ctx = context_with(Arc::new(FixedImages(Err("quota exceeded".into()))));
        let output = call(&ctx, "generateImage", json!({"prompt": "a red fox"})).await;
        assert!(!output.is_success());
        assert!(output.error().unwrap().contains("quota exceeded"));

        let container_id = output.get_str("containerId").unwrap();
        let registry = ctx.registry.lock();
        let container = registry.get(container_id).unwrap();
        assert_eq!(container.image_status, Some(ImageStatus::Failed));
        assert_eq!(container.content.as_deref(), Some("Image generation failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_image_timeout_resolves() {
        let ctx = context_with(Arc::new(NeverImages)).with_image_timeout(Duration::from_secs(5));
        let output = call(&ctx, "generateImage", json!({"prompt": "slow"})).await;
        assert!(!output.is_success());
        assert!(output.error().unwrap().contains("timed out"));
        let container_id = output.get_str("containerId").unwrap();
        assert_eq!(
            ctx.registry.lock().get(container_id).unwrap().image_status,
            Some(ImageStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_generate_image_container_deleted_meanwhile() {
        let gate = Arc::new(Notify::new());
        let ctx = context_with(Arc::new(GatedImages(Arc::clone(&gate))));

        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { call(&ctx, "generateImage", json!({"prompt": "fox"})).await })
        };
        let container_id = loop {
            if let Some(element) = ctx.registry.lock().list().first() {
                break element.id.clone();
            }
            tokio::task::yield_now().await;
        };
        ctx.registry.lock().delete(&container_id).unwrap();
        gate.notify_one();

        let output = task.await.unwrap();
        assert!(!output.is_success());
        assert_eq!(output.get_str("containerId"), Some(container_id.as_str()));
        assert!(ctx.registry.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_adds_nothing() {
        let ctx = context();
        let output = call(&ctx, "generateImage", json!({"prompt": " "})).await;
        assert!(!output.is_success());
        assert!(ctx.registry.lock().is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_resize_align_delete() {
        let ctx = context();
        let output = call(&ctx, "createImagePlaceholder", json!({"text": "Hero"})).await;
        assert_eq!(output.get_str("width"), Some("300px"));
        let id = output.get_str("containerId").unwrap().to_string();
        assert!(id.starts_with("img-placeholder-"));

        let resized = call(&ctx, "resizeImage", json!({"elementId": id, "width": "640px"})).await;
        assert!(resized.is_success());
        let aligned = call(&ctx, "alignImage", json!({"elementId": id, "alignment": "right"})).await;
        assert!(aligned.is_success());
        {
            let style = ctx.registry.lock().style(&id);
            assert_eq!(style["width"], "640px");
            assert_eq!(style["height"], "200px");
            assert_eq!(style["margin-right"], "0");
        }

        let deleted = call(&ctx, "deleteImage", json!({"elementId": id})).await;
        assert!(deleted.is_success());
        assert!(!ctx.registry.lock().has_style_record(&id));
    }

    #[tokio::test]
    async fn test_image_tools_reject_other_elements() {
        let ctx = context();
        call(&ctx, "addButton", json!({"text": "Go", "buttonId": "b"})).await;
        let output = call(&ctx, "deleteImage", json!({"elementId": "b"})).await;
        assert_eq!(output.error(), Some("Validation error: Element b is not an image"));
        assert!(ctx.registry.lock().contains("b"));
    }
}
