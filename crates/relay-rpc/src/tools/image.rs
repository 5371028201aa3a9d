//! `generate_image` tool backed by an OpenAI-compatible images API.

use std::time::Duration;

use async_trait::async_trait;
use relay_settings::ImageSettings;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{Tool, ToolContent, ToolError, ToolOutput};

/// Longest upstream error body (in chars) kept in a [`ToolError::Upstream`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    url: Option<String>,
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

/// Generates an image from a text prompt.
pub struct ImageGenerationTool {
    settings: ImageSettings,
    client: reqwest::Client,
}

impl ImageGenerationTool {
    /// Build the tool with a client honoring `settings.timeout_secs`.
    pub fn new(settings: ImageSettings) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { settings, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/images/generations",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Tool for ImageGenerationTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate an image from a text prompt"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string", "description": "What the image should show"},
                "size": {"type": "string", "description": "Image size, e.g. 1024x1024"}
            },
            "required": ["prompt"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let prompt = arguments
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'prompt' must be a non-empty string".into()))?;
        let size = match arguments.get("size") {
            None | Some(Value::Null) => self.settings.size.as_str(),
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(ToolError::InvalidArguments("'size' must be a string".into())),
        };

        let body = json!({
            "model": self.settings.model,
            "prompt": prompt,
            "n": 1,
            "size": size,
        });

        debug!(model = %self.settings.model, size, "requesting image generation");
        let mut request = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let body = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(ToolError::Upstream { status, body });
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))?;
        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::Decode("response contained no images".into()))?;

        let mut content = Vec::with_capacity(2);
        match (image.url, image.b64_json) {
            (Some(url), _) => content.push(ToolContent::Text { text: url }),
            (None, Some(data)) => content.push(ToolContent::Image {
                data,
                mime_type: "image/png".into(),
            }),
            (None, None) => {
                return Err(ToolError::Decode("image carried neither url nor b64_json".into()));
            }
        }
        if let Some(revised) = image.revised_prompt {
            content.push(ToolContent::Text {
                text: format!("Revised prompt: {revised}"),
            });
        }

        info!(model = %self.settings.model, "image generated");
        Ok(ToolOutput {
            content,
            is_error: false,
        })
    }
}
