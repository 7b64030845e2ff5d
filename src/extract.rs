//! Text extraction from uploaded bytes.
//!
//! The ingestion pipeline never parses file formats itself; it asks the
//! registry for an extractor matching the document's MIME type (with a
//! filename-extension fallback). Plain text, markdown and HTML ship with the
//! crate; binary formats (PDF, DOCX, ...) are registered by the embedding
//! application.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::RagError;

/// Converts raw uploaded bytes into plain text.
pub trait TextExtractor: Send + Sync {
    /// MIME types this extractor accepts.
    fn supported_types(&self) -> &[&str];

    /// Filename extensions this extractor accepts, lowercase, without dot.
    fn supported_extensions(&self) -> &[&str];

    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, RagError>;
}

/// Registry of extractors keyed by MIME type, with extension fallback.
pub struct ExtractorRegistry {
    by_mime: HashMap<String, Arc<dyn TextExtractor>>,
    by_extension: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            by_mime: HashMap::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in text-based extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PlainTextExtractor);
        registry.register(HtmlExtractor);
        registry
    }

    pub fn register<E: TextExtractor + 'static>(&mut self, extractor: E) {
        let extractor = Arc::new(extractor);
        for mime in extractor.supported_types() {
            self.by_mime.insert((*mime).to_string(), extractor.clone());
        }
        for ext in extractor.supported_extensions() {
            self.by_extension
                .insert((*ext).to_string(), extractor.clone());
        }
    }

    fn resolve(&self, mime_type: &str, filename: &str) -> Option<Arc<dyn TextExtractor>> {
        if let Some(extractor) = self.by_mime.get(mime_type) {
            return Some(extractor.clone());
        }
        let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
        self.by_extension.get(&ext).cloned()
    }

    /// Extract text from `bytes`, selecting the extractor by MIME type and
    /// falling back to the filename extension. Unsupported input surfaces as
    /// a processing failure.
    pub fn extract(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
    ) -> Result<String, RagError> {
        let extractor = self.resolve(mime_type, filename).ok_or_else(|| {
            RagError::Processing(format!(
                "unsupported document type: {} ({})",
                mime_type, filename
            ))
        })?;
        extractor.extract(bytes, filename)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Plain text and markdown: UTF-8 decode, nothing else.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn supported_types(&self) -> &[&str] {
        &["text/plain", "text/markdown", "text/x-markdown", "text/csv"]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown", "csv", "log"]
    }

    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, RagError> {
        String::from_utf8(bytes.to_vec())
            .map_err(|_| RagError::Processing(format!("{} is not valid UTF-8", filename)))
    }
}

/// HTML: decode then strip tags, scripts and styles.
pub struct HtmlExtractor;

impl TextExtractor for HtmlExtractor {
    fn supported_types(&self) -> &[&str] {
        &["text/html", "application/xhtml+xml"]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["html", "htm", "xhtml"]
    }

    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, RagError> {
        let html = String::from_utf8(bytes.to_vec())
            .map_err(|_| RagError::Processing(format!("{} is not valid UTF-8", filename)))?;
        Ok(strip_html_tags(&html))
    }
}

/// Simple HTML tag stripper. Script and style bodies are dropped entirely.
fn strip_html_tags(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    let html_lower = html.to_lowercase();
    let chars: Vec<char> = html.chars().collect();
    let chars_lower: Vec<char> = html_lower.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if i + 7 < chars.len() {
            let tag: String = chars_lower[i..i + 7].iter().collect();
            if tag == "<script" {
                in_script = true;
            } else if i + 6 < chars.len()
                && chars_lower[i..i + 6].iter().collect::<String>() == "<style"
            {
                in_style = true;
            }
        }

        if in_script && i + 9 <= chars.len() {
            let tag: String = chars_lower[i..i + 9].iter().collect();
            if tag == "</script>" {
                in_script = false;
                i += 9;
                continue;
            }
        }
        if in_style && i + 8 <= chars.len() {
            let tag: String = chars_lower[i..i + 8].iter().collect();
            if tag == "</style>" {
                in_style = false;
                i += 8;
                continue;
            }
        }

        if in_script || in_style {
            i += 1;
            continue;
        }

        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
        } else if !in_tag {
            result.push(c);
        }

        i += 1;
    }

    let lines: Vec<&str> = result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    lines.join("\n")
}
