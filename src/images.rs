//! Image generation collaborator
//!
//! The one tool dependency with external I/O. The HTTP implementation
//! posts `{prompt, size, quality, style}` to the web backend and expects
//! `{url}` or `{error}` back.

use crate::config::EndpointConfig;
use crate::{Result, VoxError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Parameters of one generation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub style: String,
}

impl ImageRequest {
    /// Request with the default size, quality and style
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
            style: "vivid".to_string(),
        }
    }

    pub fn with_size(mut self, size: Option<String>) -> Self {
        if let Some(size) = size {
            self.size = size;
        }
        self
    }

    pub fn with_quality(mut self, quality: Option<String>) -> Self {
        if let Some(quality) = quality {
            self.quality = quality;
        }
        self
    }

    pub fn with_style(mut self, style: Option<String>) -> Self {
        if let Some(style) = style {
            self.style = style;
        }
        self
    }
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    url: Option<String>,
    error: Option<String>,
}

/// Produces an image URL for a prompt
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: ImageRequest) -> Result<String>;
}

/// HTTP client for the backend's image route
pub struct HttpImageGenerator {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpImageGenerator {
    pub fn new(endpoints: &EndpointConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: endpoints.image_url(),
            timeout: endpoints.image_timeout(),
        }
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, request: ImageRequest) -> Result<String> {
        debug!("Requesting image generation: {}", request.prompt);
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body: ImageResponse = response.json().await.map_err(|e| {
            VoxError::ExternalService(format!("Malformed image response ({}): {}", status, e))
        })?;
        interpret_response(status.is_success(), body)
    }
}

fn interpret_response(ok: bool, body: ImageResponse) -> Result<String> {
    match (ok, body.url, body.error) {
        (true, Some(url), _) => Ok(url),
        (_, _, Some(error)) => {
            warn!("Image generation failed: {}", error);
            Err(VoxError::ExternalService(error))
        }
        _ => Err(VoxError::ExternalService(
            "Failed to generate image".to_string(),
        )),
    }
}

/// Generator used when no image backend is configured
pub struct DisabledImageGenerator;

#[async_trait]
impl ImageGenerator for DisabledImageGenerator {
    async fn generate(&self, _request: ImageRequest) -> Result<String> {
        Err(VoxError::ExternalService(
            "Image generation is not configured".to_string(),
        ))
    }
}
