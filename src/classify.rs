//! File format classification.
//!
//! Maps a file name to its lower-cased extension and a coarse [`FileType`]
//! tag. Classification never fails: unknown extensions become
//! [`FileType::Unsupported`] and downstream stages decide acceptability.
//!
//! | Extensions | Tag |
//! |------------|-----|
//! | `pdf` | `PDF` |
//! | `png`, `jpg`, `jpeg`, `gif`, `webp`, `bmp`, `tif`, `tiff` | `IMAGE` |
//! | the rest of [`SUPPORTED_EXTENSIONS`] | `DOCUMENT` |
//! | anything else | `UNSUPPORTED` |

use std::fmt;

/// Extensions the remote file-search service can ingest.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "doc", "pptx", "ppt", "xlsx", "xls", "txt", "rtf", "odt", "ods", "odp", "csv",
    "tsv", "json", "xml", "html", "htm", "md", "markdown", "tex", "latex", "epub", "mobi", "azw3",
];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff"];

/// Coarse type tag driving extraction dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Pdf,
    Image,
    Document,
    Unsupported,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "PDF",
            FileType::Image => "IMAGE",
            FileType::Document => "DOCUMENT",
            FileType::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub extension: String,
    pub file_type: FileType,
}

impl Classification {
    /// Whether the extension is on the file-search allow-list.
    pub fn is_supported(&self) -> bool {
        is_supported_extension(&self.extension)
    }

    pub fn mime_type(&self) -> &'static str {
        mime_type(&self.extension)
    }
}

/// Extension after the last `.`, lower-cased. Empty when there is none.
pub fn file_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    }
}

pub fn classify(file_name: &str) -> Classification {
    let extension = file_extension(file_name);
    let file_type = type_for_extension(&extension);
    Classification {
        extension,
        file_type,
    }
}

fn type_for_extension(ext: &str) -> FileType {
    if ext == "pdf" {
        FileType::Pdf
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        FileType::Image
    } else if SUPPORTED_EXTENSIONS.contains(&ext) {
        FileType::Document
    } else {
        FileType::Unsupported
    }
}

pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext)
}

/// The allow-list formatted for user-facing messages: `.pdf, .docx, ...`.
pub fn supported_extensions_list() -> String {
    SUPPORTED_EXTENSIONS
        .iter()
        .map(|e| format!(".{}", e))
        .collect::<Vec<_>>()
        .join(", ")
}

/// MIME type for uploads and inline image payloads.
pub fn mime_type(ext: &str) -> &'static str {
    match ext {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "ppt" => "application/vnd.ms-powerpoint",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "odp" => "application/vnd.oasis.opendocument.presentation",
        "rtf" => "application/rtf",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "md" | "markdown" => "text/markdown",
        "tex" | "latex" => "application/x-tex",
        "epub" => "application/epub+zip",
        "mobi" | "azw3" => "application/x-mobipocket-ebook",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_supported_extension_has_consistent_tag() {
        for ext in SUPPORTED_EXTENSIONS {
            let c = classify(&format!("file.{}", ext));
            assert_eq!(&c.extension, ext);
            assert!(c.is_supported());
            let expected = if *ext == "pdf" {
                FileType::Pdf
            } else {
                FileType::Document
            };
            assert_eq!(c.file_type, expected, "extension {}", ext);
        }
    }

    #[test]
    fn test_extension_is_lowercased_and_taken_after_last_dot() {
        let c = classify("Quarterly.Report.PDF");
        assert_eq!(c.extension, "pdf");
        assert_eq!(c.file_type, FileType::Pdf);
    }

    #[test]
    fn test_images_are_tagged_but_not_on_allow_list() {
        let c = classify("photo.JPG");
        assert_eq!(c.file_type, FileType::Image);
        assert!(!c.is_supported());
        assert_eq!(c.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_unknown_and_missing_extensions_are_unsupported() {
        assert_eq!(classify("photo.xyz").file_type, FileType::Unsupported);
        let bare = classify("README");
        assert_eq!(bare.extension, "");
        assert_eq!(bare.file_type, FileType::Unsupported);
    }

    #[test]
    fn test_supported_list_names_every_extension() {
        let list = supported_extensions_list();
        assert!(list.starts_with(".pdf, .docx"));
        assert!(list.ends_with(".azw3"));
        assert_eq!(list.matches(", ").count(), SUPPORTED_EXTENSIONS.len() - 1);
    }
}
