//! Document format detection and text extraction.

use docqa_core::{AppError, AppResult};

/// How many leading bytes are inspected when sniffing binary content.
const SNIFF_WINDOW: usize = 1024;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    PlainText,
    Markdown,
    Html,
    Json,
    Email,
    Pdf,
    Docx,
    Unknown,
}

impl ContentType {
    /// Classify a MIME type, ignoring parameters such as `charset`.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "text/plain" => Self::PlainText,
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            "text/html" | "application/xhtml+xml" => Self::Html,
            "application/json" | "text/json" => Self::Json,
            "message/rfc822" => Self::Email,
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Self::Docx
            }
            _ => Self::Unknown,
        }
    }

    /// Detect content type from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Self::PlainText,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            "json" => Self::Json,
            "eml" => Self::Email,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            _ => Self::Unknown,
        }
    }

    /// Recognise content from its leading bytes.
    pub fn sniff(raw: &[u8]) -> Self {
        if raw.starts_with(b"%PDF") {
            Self::Pdf
        } else if raw.starts_with(b"PK\x03\x04") {
            Self::Docx
        } else if !raw.is_empty() && !raw[..raw.len().min(SNIFF_WINDOW)].contains(&0) {
            Self::PlainText
        } else {
            Self::Unknown
        }
    }

    /// Canonical MIME type.
    pub fn mime(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Json => "application/json",
            Self::Email => "message/rfc822",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Json => "json",
            Self::Email => "email",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Unknown => "unknown",
        }
    }
}

/// MIME type implied by the extension of a URL or path, if recognised.
pub fn content_type_from_reference(reference: &str) -> Option<&'static str> {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = file_name.rsplit_once('.')?;

    match ContentType::from_extension(ext) {
        ContentType::Unknown => None,
        known => Some(known.mime()),
    }
}

/// Resolve the content type from the declared MIME type, falling back to the
/// leading bytes when it is missing or generic.
pub fn resolve_content_type(raw: &[u8], declared_type: Option<&str>) -> ContentType {
    match declared_type.map(ContentType::from_mime) {
        Some(ContentType::Unknown) | None => ContentType::sniff(raw),
        Some(declared) => declared,
    }
}

/// Turns raw document bytes into plain text.
pub trait FormatParser: Send + Sync {
    /// Extract plain text from `raw`.
    ///
    /// Fails with `AppError::UnsupportedFormat` or `AppError::Parse`.
    fn extract_text(&self, raw: &[u8], declared_type: Option<&str>) -> AppResult<String>;
}

/// Parser for the text-based formats; binary formats are reported as unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultParser;

impl FormatParser for DefaultParser {
    fn extract_text(&self, raw: &[u8], declared_type: Option<&str>) -> AppResult<String> {
        let content_type = resolve_content_type(raw, declared_type);
        tracing::debug!(
            content_type = content_type.as_str(),
            bytes = raw.len(),
            "Extracting text"
        );

        let text = match content_type {
            ContentType::PlainText => decode_text(raw),
            ContentType::Markdown => clean_markdown(&decode_text(raw)),
            ContentType::Html => clean_html(&decode_text(raw)),
            ContentType::Json => flatten_json(raw)?,
            ContentType::Email => email_body(&decode_text(raw)),
            ContentType::Pdf | ContentType::Docx => {
                return Err(AppError::UnsupportedFormat(format!(
                    "{} text extraction is not available",
                    content_type.as_str()
                )));
            }
            ContentType::Unknown => {
                return Err(AppError::UnsupportedFormat(
                    "Binary or unrecognised content".to_string(),
                ));
            }
        };

        if text.trim().is_empty() {
            return Err(AppError::Parse("No text content extracted".to_string()));
        }

        Ok(text)
    }
}

/// Decode UTF-8, falling back to Latin-1 for anything else.
fn decode_text(raw: &[u8]) -> String {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|&b| b as char).collect(),
    }
}

/// Clean markdown by removing excess formatting.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        // Remove markdown headers and list/quote markers
        let trimmed = line
            .trim_start_matches('#')
            .trim()
            .trim_start_matches(['>', '*', '-', '+'])
            .trim();

        // Skip horizontal rules and code fences
        if line.trim().starts_with("---")
            || trimmed.starts_with("```")
            || trimmed.starts_with("~~~")
        {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Clean HTML by stripping tags, scripts and styles.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;

            let rest = &text[i..];
            if starts_with_ignore_case(rest, "<script") {
                in_script = true;
            } else if starts_with_ignore_case(rest, "</script") {
                in_script = false;
            } else if starts_with_ignore_case(rest, "<style") {
                in_style = true;
            } else if starts_with_ignore_case(rest, "</style") {
                in_style = false;
            }
        } else if ch == '>' {
            in_tag = false;
            // Tags separate words
            result.push(' ');
        } else if !in_tag && !in_script && !in_style {
            result.push(ch);
        }
    }

    let decoded = decode_entities(&result);

    // Collapse whitespace
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Flatten JSON into `key: value` lines.
fn flatten_json(raw: &[u8]) -> AppResult<String> {
    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| AppError::Parse(format!("Invalid JSON document: {}", e)))?;

    let mut lines = Vec::new();
    flatten_value(&value, "", &mut lines);
    Ok(lines.join("\n"))
}

fn flatten_value(value: &serde_json::Value, key: &str, lines: &mut Vec<String>) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                let path = if key.is_empty() {
                    child_key.clone()
                } else {
                    format!("{}.{}", key, child_key)
                };
                flatten_value(child, &path, lines);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_value(item, key, lines);
            }
        }
        Value::Null => {}
        scalar => {
            let text = match scalar {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if key.is_empty() {
                lines.push(text);
            } else {
                lines.push(format!("{}: {}", key, text));
            }
        }
    }
}

/// Keep the subject and the body that follows the header block.
fn email_body(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let (headers, body) = match text.split_once("\n\n") {
        Some((headers, body)) => (headers, body),
        None => return text,
    };

    let subject = headers
        .lines()
        .find_map(|line| line.strip_prefix("Subject:"))
        .map(str::trim);

    match subject {
        Some(subject) if !subject.is_empty() => format!("{}\n{}", subject, body.trim()),
        _ => body.trim().to_string(),
    }
}
