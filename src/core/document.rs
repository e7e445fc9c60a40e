use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::constants::DOCUMENT_CONTEXT_LIMIT;

/// A document whose text is prepended to the next prompt as context.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// File name shown in the header.
    pub name: String,
    /// Extracted text, untruncated. Truncation happens when the prompt is
    /// framed so the indicator can report the document's real size.
    pub text: String,
}

#[derive(Debug)]
pub enum DocumentError {
    /// Only plain text and PDF documents are supported.
    UnsupportedType { path: PathBuf },

    /// Failed to read the file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// PDF text extraction failed.
    Extract { path: PathBuf, message: String },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::UnsupportedType { path } => {
                write!(
                    f,
                    "Unsupported document type: {} (only .txt and .pdf are supported)",
                    path.display()
                )
            }
            DocumentError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            DocumentError::Extract { path, message } => {
                write!(f, "Failed to extract text from {}: {}", path.display(), message)
            }
        }
    }
}

impl StdError for DocumentError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DocumentError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Load a `.txt` or `.pdf` document for use as prompt context.
pub fn load_document(path: &Path) -> Result<LoadedDocument, DocumentError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let text = match extension.as_deref() {
        Some("txt") => fs::read_to_string(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?,
        Some("pdf") => pdf_extract::extract_text(path).map_err(|e| DocumentError::Extract {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?,
        _ => {
            return Err(DocumentError::UnsupportedType {
                path: path.to_path_buf(),
            })
        }
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("loaded document {} ({} chars)", name, text.chars().count());
    Ok(LoadedDocument { name, text })
}

/// Frame the outgoing prompt. With a document loaded, its first
/// `DOCUMENT_CONTEXT_LIMIT` characters are prepended as context.
pub fn build_prompt(prompt: &str, document: Option<&LoadedDocument>) -> String {
    match document {
        Some(doc) => format!(
            "Document content:\n\n{}\n\nQuestion: {}",
            truncate_chars(&doc.text, DOCUMENT_CONTEXT_LIMIT),
            prompt
        ),
        None => prompt.to_string(),
    }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn plain_prompt_passes_through_unchanged() {
        assert_eq!(build_prompt("what is rust?", None), "what is rust?");
    }

    #[test]
    fn document_is_framed_before_the_question() {
        let doc = LoadedDocument {
            name: "notes.txt".to_string(),
            text: "borrow checker notes".to_string(),
        };
        assert_eq!(
            build_prompt("summarize", Some(&doc)),
            "Document content:\n\nborrow checker notes\n\nQuestion: summarize"
        );
    }

    #[test]
    fn long_documents_are_truncated_at_the_limit() {
        let doc = LoadedDocument {
            name: "big.txt".to_string(),
            text: "x".repeat(DOCUMENT_CONTEXT_LIMIT + 500),
        };
        let framed = build_prompt("q", Some(&doc));
        let expected_context = "x".repeat(DOCUMENT_CONTEXT_LIMIT);
        assert!(framed.contains(&expected_context));
        assert!(!framed.contains(&"x".repeat(DOCUMENT_CONTEXT_LIMIT + 1)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Multi-byte characters near the limit must not split
        let text: String = "é".repeat(10);
        assert_eq!(truncate_chars(&text, 4), "éééé");
        assert_eq!(truncate_chars(&text, 20), text.as_str());
    }

    #[test]
    fn txt_files_load_verbatim() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("context.txt");
        fs::write(&path, "hello from disk").expect("write");

        let doc = load_document(&path).expect("load");
        assert_eq!(doc.name, "context.txt");
        assert_eq!(doc.text, "hello from disk");
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("image.png");
        fs::write(&path, [0u8; 4]).expect("write");

        let err = load_document(&path).expect_err("should fail");
        assert!(matches!(err, DocumentError::UnsupportedType { .. }));
    }

    #[test]
    fn missing_txt_file_is_a_read_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = load_document(&dir.path().join("absent.txt")).expect_err("should fail");
        assert!(matches!(err, DocumentError::Read { .. }));
    }
}
