// src/ingest/tags.rs
// Keyword tags for ingested documents

use std::collections::HashMap;

use super::format::FileFormat;
use crate::text::content_terms;

/// Most frequent keywords (at least 3 chars, not purely numeric), ties broken
/// alphabetically, followed by `format:<fmt>` and `ext:<ext>` tags
pub fn extract_tags(
    text: &str,
    max_tags: usize,
    format: &FileFormat,
    extension: Option<&str>,
) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for term in content_terms(text) {
        if term.chars().count() < 3 || term.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        *counts.entry(term).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut tags: Vec<String> = ranked.into_iter().take(max_tags).map(|(t, _)| t).collect();
    tags.push(format!("format:{}", format.as_str()));
    if let Some(lang) = format.language() {
        tags.push(format!("lang:{}", lang));
    }
    if let Some(ext) = extension.filter(|e| !e.is_empty()) {
        tags.push(format!("ext:{}", ext));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_by_frequency_then_alpha() {
        let text = "Rust memory. Rust cache. Memory cache rust. Zebra apple 2024 ok.";
        let tags = extract_tags(text, 3, &FileFormat::Markdown, Some("md"));
        assert_eq!(tags, vec!["rust", "cache", "memory", "format:markdown", "ext:md"]);
    }

    #[test]
    fn test_code_gets_language_tag() {
        let tags = extract_tags("fn main", 0, &FileFormat::Code("rust".into()), Some("rs"));
        assert_eq!(tags, vec!["format:code", "lang:rust", "ext:rs"]);
    }
}
