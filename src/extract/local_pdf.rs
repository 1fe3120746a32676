//! In-process PDF text extraction.
//!
//! Reads the PDF's embedded text layer with `pdf-extract`; no OCR, so
//! scanned documents come back empty. Pages are split on form feeds and
//! blocks on blank lines. Blocks carry zero confidence, so this backend
//! never produces sub-headings.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

use super::{DocumentProcessor, Page, ProcessedDocument, TextBlock};

pub struct LocalPdfProcessor;

#[async_trait]
impl DocumentProcessor for LocalPdfProcessor {
    fn name(&self) -> &str {
        "local"
    }

    async fn process(&self, content: Bytes, _mime_type: &str) -> Result<ProcessedDocument> {
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&content))
            .await
            .map_err(|e| anyhow!("PDF extraction task failed: {}", e))?
            .map_err(|e| anyhow!("PDF extraction failed: {}", e))?;
        Ok(split_pages(&text))
    }
}

/// Split extracted text into pages (form feed) and blocks (blank lines).
pub fn split_pages(text: &str) -> ProcessedDocument {
    let mut pages: Vec<Page> = text
        .split('\x0c')
        .map(|page| Page {
            blocks: split_blocks(page),
        })
        .collect();

    // pdf-extract ends each page with a form feed.
    while pages.len() > 1 && pages.last().is_some_and(|p| p.blocks.is_empty()) {
        pages.pop();
    }

    ProcessedDocument { title: None, pages }
}

fn split_blocks(page: &str) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in page.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(block_from(&current));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        blocks.push(block_from(&current));
    }
    blocks
}

fn block_from(lines: &[&str]) -> TextBlock {
    TextBlock {
        text: lines.join("\n"),
        confidence: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_on_form_feed() {
        let doc = split_pages("Title\n\nFirst para\nwraps here\n\x0cSecond page\n\x0c");
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].blocks.len(), 2);
        assert_eq!(doc.pages[0].blocks[1].text, "First para\nwraps here");
        assert_eq!(doc.pages[1].blocks[0].text, "Second page");
    }

    #[test]
    fn test_text_without_form_feed_is_one_page() {
        let doc = split_pages("only\n\n\n\nblocks");
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].blocks.len(), 2);
    }

    #[test]
    fn test_empty_text_keeps_single_empty_page() {
        let doc = split_pages("");
        assert_eq!(doc.pages.len(), 1);
        assert!(doc.pages[0].blocks.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_pdf_is_an_error() {
        let err = LocalPdfProcessor
            .process(Bytes::from_static(b"not a pdf"), "application/pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PDF extraction"));
    }
}
