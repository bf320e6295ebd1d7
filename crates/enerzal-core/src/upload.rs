use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{ChatError, Result};

/// Document types the backend can extract text from
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["txt", "pdf", "docx"];

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ChatError::Validation(format!("Not a file: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { file_name, bytes })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl UploadResponse {
    /// Extracted text, or the reason there is none
    pub fn into_content(self) -> Result<String> {
        match self.content {
            Some(content) if !content.is_empty() => Ok(content),
            _ => Err(ChatError::Server(
                self.error.unwrap_or_else(|| "Failed to process the file.".to_string()),
            )),
        }
    }
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, file: &UploadFile) -> Result<UploadResponse>;
}

/// Reject files the backend would refuse before sending anything
pub fn validate_upload(file: &UploadFile) -> Result<()> {
    let extension = Path::new(&file.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ChatError::Validation(format!(
            "Unsupported file type: {} (expected one of {})",
            file.file_name,
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

/// System turn that hands an uploaded document to the model
pub fn document_context_message(file_name: &str, content: &str) -> String {
    format!(
        "The user has uploaded a document named \"{}\". Use its contents when answering.\n\
         Extracted text of the document:\n{}",
        file_name, content
    )
}

/// What the user sees after a successful upload; never includes the content
pub fn confirmation_message(file_name: &str) -> String {
    format!("File \"{}\" uploaded successfully and ready to be used.", file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_upload_extensions() {
        assert!(validate_upload(&UploadFile::new("notes.txt", vec![])).is_ok());
        assert!(validate_upload(&UploadFile::new("Policy.PDF", vec![])).is_ok());
        assert!(validate_upload(&UploadFile::new("plan.docx", vec![])).is_ok());
        assert!(matches!(
            validate_upload(&UploadFile::new("image.png", vec![])),
            Err(ChatError::Validation(_))
        ));
        assert!(validate_upload(&UploadFile::new("README", vec![])).is_err());
    }

    #[test]
    fn test_response_requires_content() {
        let ok: UploadResponse = serde_json::from_str(r#"{"content":"text"}"#).unwrap();
        assert_eq!(ok.into_content().unwrap(), "text");

        let empty: UploadResponse = serde_json::from_str(r#"{"content":""}"#).unwrap();
        assert!(empty.into_content().is_err());

        let refused: UploadResponse = serde_json::from_str(r#"{"error":"File type not allowed"}"#).unwrap();
        match refused.into_content() {
            Err(ChatError::Server(msg)) => assert_eq!(msg, "File type not allowed"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_messages() {
        let system = document_context_message("leave.txt", "20 days");
        assert!(system.contains("\"leave.txt\""));
        assert!(system.ends_with("20 days"));

        let confirmation = confirmation_message("leave.txt");
        assert!(confirmation.contains("leave.txt"));
        assert!(!confirmation.contains("20 days"));
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handbook.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name, "handbook.txt");
        assert_eq!(file.bytes, b"hello");
    }
}
