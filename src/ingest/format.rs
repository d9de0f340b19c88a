// src/ingest/format.rs
//! File format detection.
//!
//! Order: magic bytes, then extension, then `mime_guess`, then a look at
//! the content itself.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    PlainText,
    Markdown,
    Html,
    Json,
    Csv,
    /// Source code, with the language name
    Code(String),
    Pdf,
    Docx,
    Image,
    Unknown,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::PlainText => "text",
            FileFormat::Markdown => "markdown",
            FileFormat::Html => "html",
            FileFormat::Json => "json",
            FileFormat::Csv => "csv",
            FileFormat::Code(_) => "code",
            FileFormat::Pdf => "pdf",
            FileFormat::Docx => "docx",
            FileFormat::Image => "image",
            FileFormat::Unknown => "unknown",
        }
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            FileFormat::Code(lang) => Some(lang),
            _ => None,
        }
    }

    /// Whether text can be extracted from this format
    pub fn is_supported(&self) -> bool {
        !matches!(self, FileFormat::Image | FileFormat::Unknown)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Code(lang) => write!(f, "code ({})", lang),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Detect the format of a file from its path and content
pub fn detect_format(path: &Path, content: &[u8]) -> FileFormat {
    let extension = extension_of(path);

    if let Some(format) = from_magic(content, extension.as_deref()) {
        return format;
    }
    if let Some(format) = extension.as_deref().and_then(from_extension) {
        return format;
    }
    if let Some(format) = from_mime(path) {
        return format;
    }
    sniff(content)
}

/// Lowercase extension without the dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn from_magic(content: &[u8], extension: Option<&str>) -> Option<FileFormat> {
    if content.starts_with(b"%PDF-") {
        return Some(FileFormat::Pdf);
    }
    if content.starts_with(b"PK\x03\x04") {
        // Plenty of formats are zip containers; only DOCX is understood
        return Some(if extension == Some("docx") {
            FileFormat::Docx
        } else {
            FileFormat::Unknown
        });
    }
    let image = content.starts_with(b"\x89PNG\r\n\x1a\n")
        || content.starts_with(&[0xFF, 0xD8, 0xFF])
        || content.starts_with(b"GIF87a")
        || content.starts_with(b"GIF89a")
        || (content.len() >= 12 && &content[..4] == b"RIFF" && &content[8..12] == b"WEBP");
    image.then_some(FileFormat::Image)
}

fn from_extension(ext: &str) -> Option<FileFormat> {
    let format = match ext {
        "txt" | "text" | "log" | "rst" => FileFormat::PlainText,
        "md" | "markdown" | "mdx" => FileFormat::Markdown,
        "html" | "htm" | "xhtml" => FileFormat::Html,
        "json" => FileFormat::Json,
        "csv" | "tsv" => FileFormat::Csv,
        "pdf" => FileFormat::Pdf,
        "docx" => FileFormat::Docx,
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "tiff" | "ico" => FileFormat::Image,
        other => return code_language(other).map(|lang| FileFormat::Code(lang.to_string())),
    };
    Some(format)
}

/// Language for a source file extension
pub fn code_language(ext: &str) -> Option<&'static str> {
    let language = match ext {
        "rs" => "rust",
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "lua" => "lua",
        "sh" | "bash" | "zsh" => "shell",
        "sql" => "sql",
        "css" | "scss" => "css",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        _ => return None,
    };
    Some(language)
}

fn from_mime(path: &Path) -> Option<FileFormat> {
    let mime = mime_guess::from_path(path).first()?;
    let format = match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("text", "markdown") | ("text", "x-markdown") => FileFormat::Markdown,
        ("text", "html") | ("application", "xhtml+xml") => FileFormat::Html,
        ("application", "json") => FileFormat::Json,
        ("text", "csv") | ("text", "tab-separated-values") => FileFormat::Csv,
        ("application", "pdf") => FileFormat::Pdf,
        ("image", _) => FileFormat::Image,
        ("text", _) => FileFormat::PlainText,
        _ => return None,
    };
    Some(format)
}

fn sniff(content: &[u8]) -> FileFormat {
    let Ok(text) = std::str::from_utf8(content) else {
        return FileFormat::Unknown;
    };
    if text.contains('\0') {
        return FileFormat::Unknown;
    }

    let trimmed = text.trim_start();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(text).is_ok()
    {
        return FileFormat::Json;
    }
    let head = trimmed
        .get(..trimmed.len().min(64))
        .unwrap_or_default()
        .to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return FileFormat::Html;
    }
    FileFormat::PlainText
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_beats_extension() {
        assert_eq!(detect_format(Path::new("a.txt"), b"%PDF-1.7 ..."), FileFormat::Pdf);
        assert_eq!(detect_format(Path::new("photo.bin"), b"\x89PNG\r\n\x1a\nxxxx"), FileFormat::Image);
        assert_eq!(detect_format(Path::new("x"), b"RIFF\0\0\0\0WEBPVP8 "), FileFormat::Image);
    }

    #[test]
    fn test_zip_is_only_docx_by_extension() {
        assert_eq!(detect_format(Path::new("r.docx"), b"PK\x03\x04rest"), FileFormat::Docx);
        assert_eq!(detect_format(Path::new("r.zip"), b"PK\x03\x04rest"), FileFormat::Unknown);
    }

    #[test]
    fn test_extension() {
        assert_eq!(detect_format(Path::new("README.MD"), b"# hi"), FileFormat::Markdown);
        assert_eq!(
            detect_format(Path::new("main.rs"), b"fn main() {}"),
            FileFormat::Code("rust".to_string())
        );
        assert_eq!(detect_format(Path::new("data.csv"), b"a,b\n1,2"), FileFormat::Csv);
    }

    #[test]
    fn test_sniffing() {
        assert_eq!(detect_format(Path::new("noext"), b" {\"a\": 1}"), FileFormat::Json);
        assert_eq!(detect_format(Path::new("noext"), b"[not json"), FileFormat::PlainText);
        assert_eq!(
            detect_format(Path::new("noext"), b"<!DOCTYPE html><html></html>"),
            FileFormat::Html
        );
        assert_eq!(detect_format(Path::new("noext"), &[0xff, 0xfe, 0x00]), FileFormat::Unknown);
    }

    #[test]
    fn test_supported() {
        assert!(FileFormat::Pdf.is_supported());
        assert!(!FileFormat::Image.is_supported());
        assert_eq!(FileFormat::Code("go".into()).language(), Some("go"));
    }
}
