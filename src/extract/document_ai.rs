//! Google Document AI backend.
//!
//! Sends the PDF inline (`rawDocument`) to the configured processor's
//! `:process` endpoint and converts the returned `document` into
//! [`ProcessedDocument`]. Block text is resolved from the document's full
//! text through each block's `layout.textAnchor.textSegments`.
//!
//! # Environment Variables
//!
//! - `GOOGLE_ACCESS_TOKEN`: OAuth2 bearer token with the
//!   `cloud-platform` scope (e.g. `gcloud auth print-access-token`).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};

use super::{DocumentProcessor, Page, ProcessedDocument, TextBlock};
use crate::config::ExtractionConfig;

pub struct DocumentAiClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl DocumentAiClient {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let processor = config
            .processor
            .as_deref()
            .ok_or_else(|| anyhow!("extraction.processor is not configured"))?;
        let access_token = std::env::var("GOOGLE_ACCESS_TOKEN")
            .context("GOOGLE_ACCESS_TOKEN environment variable not set")?;
        let endpoint = format!(
            "https://{}-documentai.googleapis.com/v1/{}:process",
            config.location, processor
        );
        Ok(Self::with_endpoint(endpoint, access_token))
    }

    pub fn with_endpoint(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl DocumentProcessor for DocumentAiClient {
    fn name(&self) -> &str {
        "document_ai"
    }

    async fn process(&self, content: Bytes, mime_type: &str) -> Result<ProcessedDocument> {
        let body = json!({
            "rawDocument": {
                "content": base64::engine::general_purpose::STANDARD.encode(&content),
                "mimeType": mime_type,
            }
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("Document AI request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "Document AI error {}: {}",
                status,
                text.chars().take(500).collect::<String>()
            );
        }

        let json: Value = resp.json().await?;
        let document = json
            .get("document")
            .ok_or_else(|| anyhow!("Invalid Document AI response: missing 'document'"))?;
        Ok(parse_document(document))
    }
}

/// Convert a Document AI `document` object into pages of text blocks.
pub fn parse_document(document: &Value) -> ProcessedDocument {
    let text = document.get("text").and_then(Value::as_str).unwrap_or("");
    let text = IndexedText::new(text);

    let pages = document
        .get("pages")
        .and_then(Value::as_array)
        .map(|pages| {
            pages
                .iter()
                .map(|page| Page {
                    blocks: page
                        .get("blocks")
                        .and_then(Value::as_array)
                        .map(|blocks| blocks.iter().map(|b| parse_block(b, &text)).collect())
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    ProcessedDocument { title: None, pages }
}

fn parse_block(block: &Value, text: &IndexedText<'_>) -> TextBlock {
    let layout = block.get("layout");
    let confidence = layout
        .and_then(|l| l.get("confidence"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0) as f32;

    let segments = layout
        .and_then(|l| l.get("textAnchor"))
        .and_then(|a| a.get("textSegments"))
        .and_then(Value::as_array);

    let mut out = String::new();
    for segment in segments.into_iter().flatten() {
        let start = index_field(segment, "startIndex");
        let end = index_field(segment, "endIndex");
        out.push_str(text.slice(start, end));
    }

    TextBlock {
        text: out,
        confidence,
    }
}

/// Document AI encodes int64 fields as JSON strings; accept both forms.
/// A missing index means zero.
fn index_field(segment: &Value, field: &str) -> usize {
    match segment.get(field) {
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        _ => 0,
    }
}

/// Full document text addressable by character offsets.
struct IndexedText<'a> {
    text: &'a str,
    byte_offsets: Vec<usize>,
}

impl<'a> IndexedText<'a> {
    fn new(text: &'a str) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        byte_offsets.push(text.len());
        Self { text, byte_offsets }
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        let last = self.byte_offsets.len() - 1;
        let start = start.min(last);
        let end = end.clamp(start, last);
        &self.text[self.byte_offsets[start]..self.byte_offsets[end]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "text": "Invoice\nTotal due: 42\nThank you\n",
            "pages": [
                {
                    "blocks": [
                        {
                            "layout": {
                                "confidence": 0.98,
                                "textAnchor": { "textSegments": [{ "endIndex": "8" }] }
                            }
                        },
                        {
                            "layout": {
                                "confidence": 0.61,
                                "textAnchor": {
                                    "textSegments": [{ "startIndex": "8", "endIndex": "22" }]
                                }
                            }
                        }
                    ]
                },
                {
                    "blocks": [
                        {
                            "layout": {
                                "confidence": 0.4,
                                "textAnchor": {
                                    "textSegments": [{ "startIndex": 22, "endIndex": 32 }]
                                }
                            }
                        }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_parse_document_resolves_text_segments() {
        let doc = parse_document(&sample());
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].blocks[0].text, "Invoice\n");
        assert!((doc.pages[0].blocks[0].confidence - 0.98).abs() < 1e-6);
        assert_eq!(doc.pages[0].blocks[1].text, "Total due: 42\n");
        assert_eq!(doc.pages[1].blocks[0].text, "Thank you\n");
    }

    #[test]
    fn test_parse_document_renders_expected_markdown() {
        let md = super::super::document_to_markdown(&parse_document(&sample()), 0.9);
        assert_eq!(
            md,
            "## Page 1\n\n### Invoice\n\n\nTotal due: 42\n\n\n## Page 2\n\nThank you\n\n"
        );
    }

    #[test]
    fn test_segment_offsets_count_characters_not_bytes() {
        let doc = parse_document(&json!({
            "text": "Ünïcode ok",
            "pages": [{
                "blocks": [{
                    "layout": {
                        "textAnchor": { "textSegments": [{ "startIndex": "8", "endIndex": "10" }] }
                    }
                }]
            }]
        }));
        assert_eq!(doc.pages[0].blocks[0].text, "ok");
        assert_eq!(doc.pages[0].blocks[0].confidence, 0.0);
    }

    #[test]
    fn test_out_of_range_segments_are_clamped() {
        let doc = parse_document(&json!({
            "text": "short",
            "pages": [{
                "blocks": [{
                    "layout": {
                        "textAnchor": { "textSegments": [{ "startIndex": "3", "endIndex": "99" }] }
                    }
                }]
            }]
        }));
        assert_eq!(doc.pages[0].blocks[0].text, "rt");
    }

    #[test]
    fn test_document_without_pages_is_empty() {
        let doc = parse_document(&json!({ "text": "" }));
        assert!(doc.pages.is_empty());
    }
}
