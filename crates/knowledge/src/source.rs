//! Document sources: HTTP(S) downloads and local files.

use std::path::Path;
use std::time::Duration;

use docqa_core::{AppError, AppResult};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};

use crate::parser::content_type_from_reference;

const DOCQA_USER_AGENT: &str = concat!("docqa/", env!("CARGO_PKG_VERSION"));

/// Raw document bytes plus the content type the source declared.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Fetches raw document bytes.
///
/// Implementations fail with `AppError::Fetch` when the document is
/// unreachable or larger than their size limit.
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> AppResult<FetchedDocument>;
}

/// Downloads documents over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpSource {
    pub fn new(max_bytes: u64, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, max_bytes })
    }
}

#[async_trait::async_trait]
impl DocumentSource for HttpSource {
    #[tracing::instrument(skip(self), fields(max_bytes = self.max_bytes))]
    async fn fetch(&self, reference: &str) -> AppResult<FetchedDocument> {
        let mut response = self
            .client
            .get(reference)
            .header(USER_AGENT, DOCQA_USER_AGENT)
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to download {}: {}", reference, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!(
                "Download of {} failed with HTTP {}",
                reference, status
            )));
        }

        // Refuse before reading the body when the server announces the size.
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(too_large(reference, length, self.max_bytes));
            }
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(piece) = response
            .chunk()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to read {}: {}", reference, e)))?
        {
            let total = (bytes.len() + piece.len()) as u64;
            if total > self.max_bytes {
                return Err(too_large(reference, total, self.max_bytes));
            }
            bytes.extend_from_slice(&piece);
        }

        tracing::debug!(bytes = bytes.len(), content_type = ?declared, "Downloaded document");

        Ok(FetchedDocument {
            bytes,
            content_type: pick_content_type(declared, reference),
        })
    }
}

/// Reads documents from the local filesystem (plain paths or `file://` URLs).
#[derive(Debug, Clone)]
pub struct FileSource {
    max_bytes: u64,
}

impl FileSource {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait::async_trait]
impl DocumentSource for FileSource {
    async fn fetch(&self, reference: &str) -> AppResult<FetchedDocument> {
        let path = Path::new(reference.strip_prefix("file://").unwrap_or(reference));

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AppError::Fetch(format!("Cannot read {:?}: {}", path, e)))?;

        if !metadata.is_file() {
            return Err(AppError::Fetch(format!("{:?} is not a file", path)));
        }
        if metadata.len() > self.max_bytes {
            return Err(too_large(reference, metadata.len(), self.max_bytes));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Fetch(format!("Cannot read {:?}: {}", path, e)))?;

        Ok(FetchedDocument {
            bytes,
            content_type: content_type_from_reference(reference).map(str::to_string),
        })
    }
}

/// Routes a reference to the HTTP or file source by its scheme.
#[derive(Debug, Clone)]
pub struct DefaultSource {
    http: HttpSource,
    file: FileSource,
}

impl DefaultSource {
    pub fn new(max_bytes: u64, fetch_timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            http: HttpSource::new(max_bytes, fetch_timeout)?,
            file: FileSource::new(max_bytes),
        })
    }
}

#[async_trait::async_trait]
impl DocumentSource for DefaultSource {
    async fn fetch(&self, reference: &str) -> AppResult<FetchedDocument> {
        let lower = reference.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            self.http.fetch(reference).await
        } else if lower.starts_with("file://") || !reference.contains("://") {
            self.file.fetch(reference).await
        } else {
            Err(AppError::Fetch(format!(
                "Unsupported document reference: {}",
                reference
            )))
        }
    }
}

fn too_large(reference: &str, size: u64, limit: u64) -> AppError {
    AppError::Fetch(format!(
        "Document {} is too large ({} bytes, limit {} bytes)",
        reference, size, limit
    ))
}

/// Prefer a specific declared type; otherwise fall back to the URL extension.
fn pick_content_type(declared: Option<String>, reference: &str) -> Option<String> {
    let generic = declared.as_deref().map_or(true, |mime| {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        essence.eq_ignore_ascii_case("application/octet-stream")
            || essence.eq_ignore_ascii_case("binary/octet-stream")
    });

    if generic {
        content_type_from_reference(reference)
            .map(str::to_string)
            .or(declared)
    } else {
        declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_source_reads_and_infers_type() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.md");
        std::fs::write(&path, "# Notes\nCats are mammals.").unwrap();

        let source = FileSource::new(1024);
        let fetched = source.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(fetched.bytes, b"# Notes\nCats are mammals.");
        assert_eq!(fetched.content_type.as_deref(), Some("text/markdown"));
    }

    #[tokio::test]
    async fn test_file_source_enforces_size_limit() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.txt");
        std::fs::write(&path, "x".repeat(100)).unwrap();

        let err = FileSource::new(10)
            .fetch(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let err = FileSource::new(10)
            .fetch("file:///definitely/not/here.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_rejected() {
        let source = DefaultSource::new(1024, Duration::from_secs(1)).unwrap();
        let err = source.fetch("ftp://host/doc.txt").await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }

    #[test]
    fn test_generic_declared_type_defers_to_extension() {
        assert_eq!(
            pick_content_type(Some("application/octet-stream".to_string()), "https://h/a.pdf")
                .as_deref(),
            Some("application/pdf")
        );
        assert_eq!(
            pick_content_type(Some("text/html".to_string()), "https://h/a.pdf").as_deref(),
            Some("text/html")
        );
        assert_eq!(pick_content_type(None, "https://h/download"), None);
    }
}
