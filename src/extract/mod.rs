//! Content extraction: raw file bytes → normalized markdown.
//!
//! [`ContentExtractor`] dispatches on the [`FileType`] tag:
//!
//! | Tag | Strategy |
//! |-----|----------|
//! | `PDF` | [`DocumentProcessor`] (OCR / layout analysis) → [`document_to_markdown`] |
//! | `IMAGE` | [`VisionModel`] description + transcription, returned verbatim |
//! | `DOCUMENT` | passed through untouched; the index service parses it |
//! | `UNSUPPORTED` | [`ExtractError::UnsupportedFormat`] |
//!
//! Backends:
//! - **[`DocumentAiClient`](document_ai::DocumentAiClient)**: Google Document AI `:process` REST call.
//! - **[`LocalPdfProcessor`](local_pdf::LocalPdfProcessor)**: in-process text layer via `pdf-extract`.
//! - **[`OpenAIVision`](vision::OpenAIVision)**: vision-capable chat completion.

pub mod document_ai;
pub mod local_pdf;
pub mod vision;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::classify::{Classification, FileType};
use crate::config::ExtractionConfig;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(FileType),

    #[error("{service} failed: {message}")]
    Remote {
        service: String,
        message: String,
    },

    #[error("{0} returned no content")]
    EmptyResponse(String),
}

/// A document as returned by a layout-analysis service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedDocument {
    pub title: Option<String>,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub blocks: Vec<TextBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub text: String,
    pub confidence: f32,
}

/// OCR / layout-analysis service turning document bytes into pages and blocks.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, content: Bytes, mime_type: &str) -> Result<ProcessedDocument>;
}

/// Vision-capable language model producing a markdown description of an image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns `None` when the model produced no content.
    async fn describe(&self, image: Bytes, mime_type: &str) -> Result<Option<String>>;
}

/// Result of extraction for one file.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Markdown(String),
    /// Upload the original bytes; the index service reads this format natively.
    Original,
}

pub struct ContentExtractor {
    documents: Arc<dyn DocumentProcessor>,
    vision: Arc<dyn VisionModel>,
    heading_confidence: f32,
}

impl ContentExtractor {
    pub fn new(
        documents: Arc<dyn DocumentProcessor>,
        vision: Arc<dyn VisionModel>,
        heading_confidence: f32,
    ) -> Self {
        Self {
            documents,
            vision,
            heading_confidence,
        }
    }

    pub async fn extract(
        &self,
        classification: &Classification,
        content: Bytes,
    ) -> Result<Extracted, ExtractError> {
        match classification.file_type {
            FileType::Pdf => {
                let doc = self
                    .documents
                    .process(content, classification.mime_type())
                    .await
                    .map_err(|e| ExtractError::Remote {
                        service: self.documents.name().to_string(),
                        message: format!("{:#}", e),
                    })?;
                let markdown = document_to_markdown(&doc, self.heading_confidence);
                tracing::info!(
                    processor = self.documents.name(),
                    pages = doc.pages.len(),
                    chars = markdown.len(),
                    "PDF extraction completed"
                );
                Ok(Extracted::Markdown(markdown))
            }
            FileType::Image => {
                let description = self
                    .vision
                    .describe(content, classification.mime_type())
                    .await
                    .map_err(|e| ExtractError::Remote {
                        service: self.vision.model_name().to_string(),
                        message: format!("{:#}", e),
                    })?
                    .filter(|text| !text.trim().is_empty())
                    .ok_or_else(|| ExtractError::EmptyResponse(self.vision.model_name().to_string()))?;
                tracing::info!(
                    model = self.vision.model_name(),
                    chars = description.len(),
                    "Image extraction completed"
                );
                Ok(Extracted::Markdown(description))
            }
            FileType::Document => Ok(Extracted::Original),
            FileType::Unsupported => Err(ExtractError::UnsupportedFormat(FileType::Unsupported)),
        }
    }
}

/// Reassemble a processed document as markdown.
///
/// A titled document opens with `# <title>`. Each page gets a `## Page N`
/// heading; each non-blank block becomes a `### ` sub-heading when its
/// confidence exceeds `heading_confidence`, plain text otherwise. Block text
/// is emitted as the service returned it, surrounding whitespace included.
/// Output follows input order, so identical input always yields identical
/// bytes.
pub fn document_to_markdown(doc: &ProcessedDocument, heading_confidence: f32) -> String {
    let mut parts = Vec::new();

    if let Some(title) = doc.title.as_deref().filter(|t| !t.trim().is_empty()) {
        parts.push(format!("# {}\n", title));
    }

    for (page_num, page) in doc.pages.iter().enumerate() {
        parts.push(format!("## Page {}\n", page_num + 1));

        for block in &page.blocks {
            let text = &block.text;
            if text.trim().is_empty() {
                continue;
            }
            if block.confidence > heading_confidence {
                parts.push(format!("### {}\n", text));
            } else {
                parts.push(format!("{}\n", text));
            }
        }
    }

    parts.join("\n")
}

/// Build the PDF backend named by `extraction.pdf_backend`.
pub fn create_document_processor(config: &ExtractionConfig) -> Result<Arc<dyn DocumentProcessor>> {
    match config.pdf_backend.as_str() {
        "document_ai" => Ok(Arc::new(document_ai::DocumentAiClient::from_config(config)?)),
        "local" => Ok(Arc::new(local_pdf::LocalPdfProcessor)),
        other => bail!("Unknown PDF backend: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    fn block(text: &str, confidence: f32) -> TextBlock {
        TextBlock {
            text: text.to_string(),
            confidence,
        }
    }

    fn two_page_doc() -> ProcessedDocument {
        ProcessedDocument {
            title: None,
            pages: vec![
                Page {
                    blocks: vec![block("Quarterly Report", 0.97), block("Revenue grew.", 0.42)],
                },
                Page {
                    blocks: vec![block("   ", 0.99), block("Outlook is stable.", 0.5)],
                },
            ],
        }
    }

    struct FixedProcessor(ProcessedDocument);

    #[async_trait]
    impl DocumentProcessor for FixedProcessor {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn process(&self, _content: Bytes, _mime: &str) -> Result<ProcessedDocument> {
            Ok(self.0.clone())
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl DocumentProcessor for FailingProcessor {
        fn name(&self) -> &str {
            "failing"
        }
        async fn process(&self, _content: Bytes, _mime: &str) -> Result<ProcessedDocument> {
            bail!("quota exceeded")
        }
    }

    struct FixedVision(Option<String>);

    #[async_trait]
    impl VisionModel for FixedVision {
        fn model_name(&self) -> &str {
            "vision-test"
        }
        async fn describe(&self, _image: Bytes, _mime: &str) -> Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    fn extractor(
        documents: Arc<dyn DocumentProcessor>,
        vision: Option<String>,
    ) -> ContentExtractor {
        ContentExtractor::new(documents, Arc::new(FixedVision(vision)), 0.9)
    }

    #[test]
    fn test_markdown_headings_and_blocks_in_order() {
        let md = document_to_markdown(&two_page_doc(), 0.9);
        assert_eq!(
            md,
            "## Page 1\n\n### Quarterly Report\n\nRevenue grew.\n\n## Page 2\n\nOutlook is stable.\n"
        );
    }

    #[test]
    fn test_markdown_is_deterministic() {
        let doc = two_page_doc();
        assert_eq!(document_to_markdown(&doc, 0.9), document_to_markdown(&doc, 0.9));
    }

    #[test]
    fn test_confidence_equal_to_threshold_is_plain_text() {
        let doc = ProcessedDocument {
            pages: vec![Page {
                blocks: vec![block("Edge", 0.9)],
            }],
            ..Default::default()
        };
        assert_eq!(document_to_markdown(&doc, 0.9), "## Page 1\n\nEdge\n");
    }

    #[test]
    fn test_markdown_keeps_block_whitespace_and_title() {
        let doc = ProcessedDocument {
            title: Some("Annual Review".to_string()),
            pages: vec![Page {
                blocks: vec![block("Summary\n", 0.95), block("  indented line", 0.3)],
            }],
        };
        assert_eq!(
            document_to_markdown(&doc, 0.9),
            "# Annual Review\n\n## Page 1\n\n### Summary\n\n\n  indented line\n"
        );

        let blank_title = ProcessedDocument {
            title: Some("  ".to_string()),
            ..doc
        };
        assert!(document_to_markdown(&blank_title, 0.9).starts_with("## Page 1\n"));
    }

    #[tokio::test]
    async fn test_pdf_branch_uses_document_processor() {
        let ex = extractor(Arc::new(FixedProcessor(two_page_doc())), None);
        let out = ex
            .extract(&classify("report.pdf"), Bytes::from_static(b"%PDF"))
            .await
            .unwrap();
        match out {
            Extracted::Markdown(md) => assert!(md.starts_with("## Page 1")),
            other => panic!("unexpected extraction: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pdf_branch_propagates_remote_failure() {
        let ex = extractor(Arc::new(FailingProcessor), None);
        let err = ex
            .extract(&classify("report.pdf"), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Remote { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_image_branch_returns_description_verbatim() {
        let ex = extractor(
            Arc::new(FailingProcessor),
            Some("# Chart\n\nSales by month".to_string()),
        );
        let out = ex
            .extract(&classify("chart.png"), Bytes::from_static(b"\x89PNG"))
            .await
            .unwrap();
        assert_eq!(out, Extracted::Markdown("# Chart\n\nSales by month".to_string()));
    }

    #[tokio::test]
    async fn test_image_branch_fails_on_empty_content() {
        let ex = extractor(Arc::new(FailingProcessor), None);
        let err = ex
            .extract(&classify("chart.png"), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn test_document_passes_through_and_unsupported_fails() {
        let ex = extractor(Arc::new(FailingProcessor), None);
        let out = ex.extract(&classify("notes.docx"), Bytes::new()).await.unwrap();
        assert_eq!(out, Extracted::Original);

        let err = ex.extract(&classify("photo.xyz"), Bytes::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type: UNSUPPORTED");
    }
}
