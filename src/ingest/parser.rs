// src/ingest/parser.rs
//! Text extraction for each supported format

use std::borrow::Cow;
use std::io::{Cursor, Read};

use pulldown_cmark::{Event as MdEvent, Parser as MdParser, Tag, TagEnd};
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, warn};

use super::format::FileFormat;
use crate::error::{MemoryError, Result};

/// Text pulled out of a file
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub title: Option<String>,
}

impl ExtractedText {
    fn plain(text: String) -> Self {
        Self { text, title: None }
    }
}

pub struct TextExtractor {
    html_drop: Regex,
    html_title: Regex,
    html_block: Regex,
    html_tag: Regex,
}

impl TextExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            html_drop: compile(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<!--.*?-->")?,
            html_title: compile(r"(?is)<title[^>]*>(.*?)</title>")?,
            html_block: compile(
                r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|table|section|article|header|footer|pre|blockquote)\b[^>]*>",
            )?,
            html_tag: compile(r"(?s)<[^>]*>")?,
        })
    }

    /// Extract readable text. PDF and DOCX parsing runs on the blocking pool.
    pub async fn extract(&self, format: &FileFormat, bytes: Vec<u8>) -> Result<ExtractedText> {
        let extracted = match format {
            FileFormat::PlainText | FileFormat::Csv | FileFormat::Code(_) => {
                ExtractedText::plain(decode_text(&bytes).into_owned())
            }
            FileFormat::Markdown => markdown_to_text(&decode_text(&bytes)),
            FileFormat::Html => self.html_to_text(&decode_text(&bytes)),
            FileFormat::Json => ExtractedText::plain(pretty_json(&bytes)),
            FileFormat::Pdf => {
                let text = tokio::task::spawn_blocking(move || {
                    pdf_extract::extract_text_from_mem(&bytes)
                        .map_err(|e| MemoryError::Extraction(format!("PDF: {}", e)))
                })
                .await??;
                ExtractedText::plain(text)
            }
            FileFormat::Docx => tokio::task::spawn_blocking(move || docx_to_text(&bytes)).await??,
            FileFormat::Image | FileFormat::Unknown => {
                return Err(MemoryError::UnsupportedFormat(format.to_string()));
            }
        };

        let text = clean_text(&extracted.text);
        debug!(format = %format, chars = text.chars().count(), "Text extracted");
        Ok(ExtractedText {
            text,
            title: extracted.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        })
    }

    fn html_to_text(&self, html: &str) -> ExtractedText {
        let title = self
            .html_title
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(&self.html_tag.replace_all(m.as_str(), "")));

        let body = self.html_drop.replace_all(html, " ");
        let body = self.html_block.replace_all(&body, "\n\n");
        let body = self.html_tag.replace_all(&body, " ");
        ExtractedText {
            text: decode_entities(&body),
            title,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| MemoryError::Other(format!("invalid pattern: {}", e)))
}

/// UTF-8 with lossy replacement, minus a leading BOM
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

/// Markdown rendered to plain text; the first heading becomes the title
fn markdown_to_text(markdown: &str) -> ExtractedText {
    let mut text = String::new();
    let mut title: Option<String> = None;
    let mut heading: Option<String> = None;

    for event in MdParser::new(markdown) {
        match event {
            MdEvent::Start(Tag::Heading { .. }) => heading = Some(String::new()),
            MdEvent::End(TagEnd::Heading(_)) => {
                if let Some(h) = heading.take() {
                    if title.is_none() {
                        title = Some(h);
                    }
                }
                text.push_str("\n\n");
            }
            MdEvent::Text(t) | MdEvent::Code(t) => {
                if let Some(h) = heading.as_mut() {
                    h.push_str(&t);
                }
                text.push_str(&t);
            }
            MdEvent::SoftBreak => text.push(' '),
            MdEvent::HardBreak => text.push('\n'),
            MdEvent::End(TagEnd::Paragraph)
            | MdEvent::End(TagEnd::CodeBlock)
            | MdEvent::End(TagEnd::BlockQuote(_)) => text.push_str("\n\n"),
            MdEvent::End(TagEnd::Item) => text.push('\n'),
            _ => {}
        }
    }

    ExtractedText { text, title }
}

/// Pretty-printed JSON, or the raw text when it doesn't parse
fn pretty_json(bytes: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| decode_text(bytes).into_owned()),
        Err(e) => {
            warn!("JSON file does not parse ({}), indexing raw text", e);
            decode_text(bytes).into_owned()
        }
    }
}

/// Paragraph text from `word/document.xml`; the title from `docProps/core.xml`
fn docx_to_text(bytes: &[u8]) -> Result<ExtractedText> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| MemoryError::Extraction(format!("DOCX is not a valid archive: {}", e)))?;

    let document = read_entry(&mut archive, "word/document.xml")?
        .ok_or_else(|| MemoryError::Extraction("DOCX has no word/document.xml".to_string()))?;
    let text = collect_xml_text(&document, b"w:t", b"w:p")?;

    let title = match read_entry(&mut archive, "docProps/core.xml")? {
        Some(core) => Some(collect_xml_text(&core, b"dc:title", b"dc:title")?),
        None => None,
    }
    .map(|t| t.trim().to_string())
    .filter(|t| !t.is_empty());

    Ok(ExtractedText { text, title })
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(MemoryError::Extraction(format!("DOCX entry {}: {}", name, e))),
    };
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

/// Text inside `text_tag` elements, with a paragraph break after each `block_tag`
fn collect_xml_text(xml: &str, text_tag: &[u8], block_tag: &[u8]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) if e.name().as_ref() == text_tag => in_text = true,
            Ok(XmlEvent::End(e)) => {
                let name = e.name();
                if name.as_ref() == text_tag {
                    in_text = false;
                }
                if name.as_ref() == block_tag {
                    out.push_str("\n\n");
                }
            }
            Ok(XmlEvent::Empty(e)) if in_text || e.name().as_ref() == b"w:br" => out.push('\n'),
            Ok(XmlEvent::Text(e)) if in_text => {
                let text = e
                    .decode()
                    .map_err(|err| MemoryError::Extraction(format!("XML decode error: {}", err)))?;
                out.push_str(&text);
            }
            Ok(XmlEvent::GeneralRef(r)) if in_text => {
                let name = r
                    .decode()
                    .map_err(|err| MemoryError::Extraction(format!("XML decode error: {}", err)))?;
                if let Some(resolved) = resolve_entity(&name) {
                    out.push(resolved);
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(MemoryError::Extraction(format!("XML parsing error: {}", e))),
            _ => {}
        }
    }

    Ok(out)
}

/// Predefined XML entities and numeric character references
fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Replace `&name;` references in HTML text
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(';').filter(|&end| end <= 10) {
            Some(end) => match resolve_entity(&after[..end]) {
                Some(c) => {
                    out.push(c);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = after;
                }
            },
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strip control characters, trim lines and collapse blank-line runs into
/// single paragraph breaks
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;

    for line in text.lines() {
        let line: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");

        if line.is_empty() {
            blank_run = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank_run = false;
    }
    out
}
