//! PDF → ordered pages of plain text.
//!
//! Extraction runs on the blocking pool with a time limit: some PDFs with
//! unusual fonts make `pdf-extract` spin or panic, and either must surface
//! as [`Error::Extract`] rather than take the server down.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::Page;

/// Upper bound for extracting one document.
pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extract the text of every page, in document order.
///
/// Synchronous; prefer [`extract_pages`] from async code.
pub fn extract_pages_blocking(bytes: &[u8]) -> Result<Vec<Page>> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(Error::Extract("not a PDF document".to_string()));
    }

    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| Error::Extract(e.to_string()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(index, text)| Page::new(index, text))
        .collect())
}

/// Extract pages on the blocking pool, bounded by [`EXTRACT_TIMEOUT`].
pub async fn extract_pages(bytes: Vec<u8>) -> Result<Vec<Page>> {
    let task = tokio::task::spawn_blocking(move || extract_pages_blocking(&bytes));

    match tokio::time::timeout(EXTRACT_TIMEOUT, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            tracing::error!(error = %join_err, "PDF extraction task crashed");
            Err(Error::Extract("extractor crashed on this document".to_string()))
        }
        Err(_) => {
            tracing::error!(timeout = ?EXTRACT_TIMEOUT, "PDF extraction timed out");
            Err(Error::Extract(format!(
                "extraction timed out after {}s",
                EXTRACT_TIMEOUT.as_secs()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pdf() {
        assert!(matches!(
            extract_pages_blocking(b"hello world"),
            Err(Error::Extract(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_pdf_is_error_not_panic() {
        let err = extract_pages(b"%PDF-1.4\n1 0 obj << /Type".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extract(_)));
    }
}
