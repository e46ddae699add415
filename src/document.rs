//! Plain-text document extraction for résumés.

use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Reads the text of the document at `path`.
///
/// Returns `Ok(None)` when the document holds no text (empty or
/// whitespace-only). Invalid UTF-8 is replaced rather than rejected.
///
/// # Errors
/// [`EngineError::DocumentRead`] when the file cannot be read.
pub fn extract_text(path: &Path) -> EngineResult<Option<String>> {
    let bytes = std::fs::read(path).map_err(|source| EngineError::DocumentRead {
        path: path.to_path_buf(),
        source,
    })?;

    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.trim().is_empty() {
        tracing::debug!("Document {} has no text", path.display());
        return Ok(None);
    }

    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resume.txt");
        std::fs::write(&path, "Rust engineer with ten years of experience").unwrap();

        let text = extract_text(&path).unwrap();
        assert_eq!(
            text.as_deref(),
            Some("Rust engineer with ten years of experience")
        );
    }

    #[test]
    fn test_blank_document_has_no_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.txt");
        std::fs::write(&path, "  \n\t ").unwrap();

        assert!(extract_text(&path).unwrap().is_none());
    }

    #[test]
    fn test_missing_document() {
        let dir = TempDir::new().unwrap();
        let err = extract_text(&dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, EngineError::DocumentRead { .. }));
    }
}
