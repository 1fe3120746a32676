//! Image description through an OpenAI vision-capable chat model.

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};

use super::VisionModel;
use crate::openai::OpenAIClient;

pub const IMAGE_PROMPT: &str = "Please analyze this image and provide a comprehensive description in markdown format. Include:
1. A detailed description of what you see in the image
2. Any text content visible in the image (OCR)
3. Any charts, graphs, or data visualizations
4. The overall context and purpose of the image

Format your response in clean markdown with appropriate headings and structure.";

pub struct OpenAIVision {
    client: OpenAIClient,
    model: String,
    max_tokens: u32,
}

impl OpenAIVision {
    pub fn new(client: OpenAIClient, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
        }
    }

    fn request_body(&self, image: &[u8], mime_type: &str) -> Value {
        let data_url = format!(
            "data:{};base64,{}",
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": IMAGE_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }]
        })
    }
}

#[async_trait]
impl VisionModel for OpenAIVision {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn describe(&self, image: Bytes, mime_type: &str) -> Result<Option<String>> {
        let body = self.request_body(&image, mime_type);
        let json = self.client.post_json("chat/completions", &body).await?;
        Ok(completion_content(&json))
    }
}

/// First choice's message content; `None` when absent or blank.
pub fn completion_content(json: &Value) -> Option<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
