//! Cleanup of raw text extracted from documents.
//!
//! PDF extraction produces control characters (form feeds, carriage
//! returns, stray NULs), hard line breaks in the middle of sentences, and
//! long runs of padding. [`normalize`] reduces all of that to single spaces
//! while keeping paragraph breaks as exactly one blank line.
//!
//! # Example
//!
//! ```rust
//! use pdf_rag::normalize::normalize;
//!
//! assert_eq!(normalize("  Hello\x0c   world \n\n\n\n Next  "), "Hello world\n\nNext");
//! ```

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Normalize extracted text.
///
/// 1. Drop characters below U+0020 other than `\n` and `\t`.
/// 2. Replace each whitespace run with a single space, or with a single
///    blank line (`"\n\n"`) when the run spans two or more newlines.
/// 3. Trim both ends.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let cleaned: String = text
        .chars()
        .filter(|&c| c as u32 >= 32 || c == '\n' || c == '\t')
        .collect();

    let collapsed = WHITESPACE_RUN.replace_all(&cleaned, |caps: &regex::Captures<'_>| {
        if caps[0].matches('\n').count() >= 2 {
            "\n\n"
        } else {
            " "
        }
    });

    collapsed.trim().to_string()
}
