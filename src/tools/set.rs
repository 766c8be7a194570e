//! Tool handler set
//!
//! An explicit name -> handler map built once at startup. Handlers receive
//! their collaborators through [`ToolContext`] instead of closing over
//! module-level state.

use super::catalog::ToolSchema;
use super::output::ToolOutput;
use crate::images::ImageGenerator;
use crate::registry::SharedRegistry;
use crate::{Result, VoxError};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Collaborators injected into every handler
#[derive(Clone)]
pub struct ToolContext {
    pub registry: SharedRegistry,
    pub images: Arc<dyn ImageGenerator>,
    /// Upper bound on one image generation call
    pub image_timeout: Duration,
}

impl ToolContext {
    pub fn new(registry: SharedRegistry, images: Arc<dyn ImageGenerator>) -> Self {
        Self {
            registry,
            images,
            image_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_image_timeout(mut self, timeout: Duration) -> Self {
        self.image_timeout = timeout;
        self
    }
}

type SyncFn = dyn Fn(&ToolContext, Value) -> ToolOutput + Send + Sync;
type AsyncFn = dyn Fn(ToolContext, Value) -> BoxFuture<'static, ToolOutput> + Send + Sync;

/// A registered handler
#[derive(Clone)]
pub enum Handler {
    /// Completes without suspending
    Sync(Arc<SyncFn>),
    /// Performs external I/O
    Async(Arc<AsyncFn>),
}

impl Handler {
    /// Wrap a typed synchronous handler
    pub fn sync<A, F>(f: F) -> Self
    where
        A: DeserializeOwned,
        F: Fn(&ToolContext, A) -> Result<ToolOutput> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(move |ctx: &ToolContext, args: Value| {
            match parse_args::<A>(args) {
                Ok(args) => f(ctx, args).unwrap_or_else(ToolOutput::from),
                Err(e) => ToolOutput::from(e),
            }
        }))
    }

    /// Wrap a typed asynchronous handler
    pub fn asynchronous<A, F, Fut>(f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(ToolContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        let f = Arc::new(f);
        Handler::Async(Arc::new(move |ctx: ToolContext, args: Value| {
            let f = Arc::clone(&f);
            async move {
                match parse_args::<A>(args) {
                    Ok(args) => f(ctx, args).await.unwrap_or_else(ToolOutput::from),
                    Err(e) => ToolOutput::from(e),
                }
            }
            .boxed()
        }))
    }

    pub async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        match self {
            Handler::Sync(f) => f(ctx, args),
            Handler::Async(f) => f(ctx.clone(), args).await,
        }
    }
}

/// Argument type of tools that take none
#[derive(Debug, Default, serde::Deserialize)]
pub struct NoArgs {}

/// Decode handler arguments; a missing payload counts as `{}`
pub fn parse_args<A: DeserializeOwned>(args: Value) -> Result<A> {
    let args = if args.is_null() {
        Value::Object(Map::new())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| VoxError::Validation(format!("Invalid arguments: {}", e)))
}

/// Name -> handler map
#[derive(Clone, Default)]
pub struct ToolSet {
    handlers: HashMap<&'static str, Handler>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every page tool
    pub fn standard() -> Result<Self> {
        let mut set = Self::new();
        super::page::register(&mut set)?;
        super::content::register(&mut set)?;
        super::structure::register(&mut set)?;
        super::style::register(&mut set)?;
        super::layout::register(&mut set)?;
        super::image::register(&mut set)?;
        debug!("Registered {} tools", set.len());
        Ok(set)
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) -> Result<()> {
        if self.handlers.contains_key(name) {
            return Err(VoxError::Configuration(format!(
                "Tool {} registered twice",
                name
            )));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run a tool by name; `None` when no such tool exists
    pub async fn invoke(&self, ctx: &ToolContext, name: &str, args: Value) -> Option<ToolOutput> {
        let handler = self.get(name)?;
        Some(handler.call(ctx, args).await)
    }

    /// Check 1:1 correspondence between handlers and advertised schemas
    pub fn verify_catalog(&self, catalog: &[ToolSchema]) -> Result<()> {
        let advertised: BTreeSet<&str> = catalog.iter().map(|schema| schema.name).collect();
        let handled: BTreeSet<&str> = self.handlers.keys().copied().collect();

        let mut problems = Vec::new();
        let unhandled: Vec<&str> = advertised.difference(&handled).copied().collect();
        if !unhandled.is_empty() {
            problems.push(format!("advertised without handler: {}", unhandled.join(", ")));
        }
        let unadvertised: Vec<&str> = handled.difference(&advertised).copied().collect();
        if !unadvertised.is_empty() {
            problems.push(format!("handler without schema: {}", unadvertised.join(", ")));
        }
        if advertised.len() != catalog.len() {
            problems.push("catalog lists a tool more than once".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(VoxError::Configuration(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::DisabledImageGenerator;
    use crate::registry::shared_registry;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct EchoArgs {
        element_id: String,
    }

    fn ctx() -> ToolContext {
        ToolContext::new(shared_registry(), Arc::new(DisabledImageGenerator))
    }

    fn echo_set() -> ToolSet {
        let mut set = ToolSet::new();
        set.register(
            "echo",
            Handler::sync(|_, args: EchoArgs| Ok(ToolOutput::success().with("elementId", args.element_id))),
        )
        .unwrap();
        set
    }

    #[tokio::test]
    async fn test_typed_arguments() {
        let output = echo_set()
            .invoke(&ctx(), "echo", json!({"elementId": "p1"}))
            .await
            .unwrap();
        assert_eq!(output.get_str("elementId"), Some("p1"));
    }

    #[tokio::test]
    async fn test_bad_shape_is_failure_output() {
        let output = echo_set()
            .invoke(&ctx(), "echo", json!({"elementId": 7}))
            .await
            .unwrap();
        assert!(!output.is_success());
        assert!(output.error().unwrap().starts_with("Validation error: Invalid arguments"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_none() {
        assert!(echo_set().invoke(&ctx(), "nope", Value::Null).await.is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut set = echo_set();
        let err = set
            .register("echo", Handler::sync(|_, _: Value| Ok(ToolOutput::success())))
            .unwrap_err();
        assert!(matches!(err, VoxError::Configuration(_)));
    }

    #[test]
    fn test_verify_catalog_reports_both_directions() {
        let set = echo_set();
        let catalog = vec![ToolSchema::new("other", "Other tool", None)];
        let err = set.verify_catalog(&catalog).unwrap_err().to_string();
        assert!(err.contains("advertised without handler: other"));
        assert!(err.contains("handler without schema: echo"));
    }
}
