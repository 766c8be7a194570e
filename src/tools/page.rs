//! Page-level tools

use super::set::{Handler, NoArgs, ToolContext, ToolSet};
use super::ToolOutput;
use crate::registry::render::render_page;
use crate::{Result, VoxError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ColorArgs {
    pub color: String,
}

pub fn register(set: &mut ToolSet) -> Result<()> {
    set.register("getPageHTML", Handler::sync(get_page_html))?;
    set.register("changeBackgroundColor", Handler::sync(change_background_color))?;
    set.register("changeTextColor", Handler::sync(change_text_color))?;
    Ok(())
}

fn get_page_html(ctx: &ToolContext, _args: NoArgs) -> Result<ToolOutput> {
    let html = render_page(&ctx.registry.lock());
    Ok(ToolOutput::success().with("html", html))
}

fn change_background_color(ctx: &ToolContext, args: ColorArgs) -> Result<ToolOutput> {
    set_page_color(ctx, "background-color", args.color)
}

fn change_text_color(ctx: &ToolContext, args: ColorArgs) -> Result<ToolOutput> {
    set_page_color(ctx, "color", args.color)
}

fn set_page_color(ctx: &ToolContext, property: &str, color: String) -> Result<ToolOutput> {
    let color = color.trim().to_string();
    if color.is_empty() {
        return Err(VoxError::Validation("color must not be empty".to_string()));
    }
    ctx.registry.lock().update_page_style(property, color.clone());
    Ok(ToolOutput::success().with("color", color))
}
