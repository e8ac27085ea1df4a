//! Overlapping fixed-size text chunker.
//!
//! Splits each page of a document into [`Chunk`]s of at most `chunk_size`
//! characters, consecutive chunks sharing roughly `overlap` characters so
//! that a sentence cut at one boundary still appears whole in a neighbour.
//!
//! Each chunk records its page, its character offset and length within the
//! normalized page text, and a SHA-256 hash of its content.
//!
//! # Algorithm
//!
//! 1. Normalize the page text (see [`crate::normalize`]).
//! 2. Open a window of `chunk_size` characters at the current start.
//! 3. If the window boundary falls inside a word, pull it back to the
//!    nearest whitespace within the trailing 20% of the window. Never pull
//!    back past the next window start, so no text is skipped.
//! 4. If the trailing 20% holds no whitespace at all, extend the window
//!    forward to the end of the word instead (the single-word overrun
//!    case). If its only whitespace lies before the next window start, cut
//!    at the window edge.
//! 5. Advance the start by `chunk_size - overlap`, then forward to the next
//!    word start if that stays inside the chunk just emitted. A start that
//!    lands on whitespace skips it, so no chunk begins with a space.
//! 6. The last window of a page takes whatever text remains.
//!
//! The pull-back in step 3 only has room when `overlap` is at least a fifth
//! of `chunk_size`. Smaller overlaps (including zero) keep the fixed step and
//! give up the word-boundary rule: chunks may start or end mid-word.
//!
//! # Example
//!
//! ```rust
//! use pdf_rag::chunk::split;
//! use pdf_rag::models::Page;
//!
//! let pages = vec![Page::new(0, "Hello world."), Page::new(1, "")];
//! let chunks = split(&pages, 1000, 200).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].source_page, 0);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Chunk, Page};
use crate::normalize::normalize;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

/// Split pages into overlapping chunks.
///
/// Chunk indices are contiguous across the whole document. Pages whose
/// normalized text is empty contribute no chunks.
///
/// # Errors
///
/// [`Error::Configuration`] when `overlap >= chunk_size`.
pub fn split(pages: &[Page], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    if overlap >= chunk_size {
        return Err(Error::Configuration(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, chunk_size
        )));
    }

    let mut chunks = Vec::new();
    for page in pages {
        let text = normalize(&page.text);
        if text.is_empty() {
            continue;
        }
        let chars: Vec<char> = text.chars().collect();
        for (start, end) in windows(&chars, chunk_size, overlap) {
            let piece: String = chars[start..end].iter().collect();
            chunks.push(make_chunk(chunks.len(), page.index, start, end - start, piece));
        }
    }
    Ok(chunks)
}

/// Compute `(start, end)` character spans for one normalized page.
fn windows(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let n = chars.len();
    let step = chunk_size - overlap;
    let slack = chunk_size / 5;
    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        let window_end = start + chunk_size;
        if window_end >= n {
            spans.push((start, n));
            break;
        }

        let next_start = start + step;
        let tail = window_end - slack;
        let floor = tail.max(next_start);
        let end = if let Some(ws) = (floor..=window_end).rev().find(|&i| chars[i].is_whitespace()) {
            ws
        } else if (tail..floor).any(|i| chars[i].is_whitespace()) {
            // A boundary exists but pulling back to it would leave a gap
            // before the next window (overlap smaller than the slack).
            window_end
        } else {
            (window_end..n)
                .find(|&i| chars[i].is_whitespace())
                .unwrap_or(n)
        };

        spans.push((start, end));
        if end >= n {
            break;
        }

        start = if is_word_start(chars, next_start) {
            next_start
        } else {
            (next_start + 1..=end)
                .find(|&k| is_word_start(chars, k))
                .unwrap_or(next_start)
        };
        while start < n && chars[start].is_whitespace() {
            start += 1;
        }
    }

    spans
}

fn is_word_start(chars: &[char], i: usize) -> bool {
    !chars[i].is_whitespace() && (i == 0 || chars[i - 1].is_whitespace())
}

/// Create a single [`Chunk`] with a SHA-256 content hash.
fn make_chunk(index: usize, page: usize, start: usize, length: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        text,
        source_page: page,
        start_offset: start,
        length,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic prose of short words, exactly `len` characters long.
    fn prose(len: usize, seed: usize) -> String {
        let words = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta"];
        let mut out = String::new();
        let mut i = seed;
        while out.len() < len {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(words[i % words.len()]);
            i += 1;
        }
        out.truncate(len);
        // Never end on a space so normalization does not shorten the text.
        if out.ends_with(' ') {
            out.pop();
            out.push('x');
        }
        out
    }

    /// Rebuild one page from its chunks. Characters between two chunks must
    /// be whitespace and are taken from `normalized`.
    fn reconstruct(chunks: &[Chunk], normalized: &str) -> String {
        let source: Vec<char> = normalized.chars().collect();
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            match chunks.get(i + 1) {
                Some(next) => {
                    let keep = next.start_offset - c.start_offset;
                    out.extend(c.text.chars().take(keep));
                    let end = c.start_offset + c.length;
                    if next.start_offset > end {
                        let gap = &source[end..next.start_offset];
                        assert!(gap.iter().all(|ch| ch.is_whitespace()), "text skipped");
                        out.extend(gap);
                    }
                }
                None => out.push_str(&c.text),
            }
        }
        out
    }

    #[test]
    fn test_overlap_not_smaller_than_size_is_configuration_error() {
        let pages = vec![Page::new(0, "text")];
        assert!(matches!(split(&pages, 100, 100), Err(Error::Configuration(_))));
        assert!(matches!(split(&pages, 100, 150), Err(Error::Configuration(_))));
        assert!(matches!(split(&pages, 0, 0), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_empty_page_yields_no_chunks() {
        let pages = vec![Page::new(0, ""), Page::new(1, " \n\x0c ")];
        assert!(split(&pages, 1000, 200).unwrap().is_empty());
    }

    #[test]
    fn test_short_page_single_chunk() {
        let chunks = split(&[Page::new(3, "Hello,   world!")], 1000, 200).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source_page, 3);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].length, 13);
    }

    #[test]
    fn test_lengths_bounded_and_starts_advance() {
        for (size, overlap) in [(1000, 200), (100, 0), (100, 99), (64, 16), (37, 10)] {
            let text = prose(5000, 1);
            let chunks = split(&[Page::new(0, text)], size, overlap).unwrap();
            assert!(chunks.len() > 1);
            for c in &chunks {
                assert!(c.length <= size, "chunk of {} > {}", c.length, size);
                assert_eq!(c.text.chars().count(), c.length);
            }
            for pair in chunks.windows(2) {
                assert!(
                    pair[1].start_offset >= pair[0].start_offset + (size - overlap),
                    "start advanced by less than {}",
                    size - overlap
                );
            }
        }
    }

    #[test]
    fn test_round_trip_reconstructs_normalized_text() {
        for (size, overlap) in [(1000, 200), (50, 10), (80, 0), (120, 119)] {
            let text = prose(3000, 4);
            let normalized = normalize(&text);
            let chunks = split(&[Page::new(0, text)], size, overlap).unwrap();
            assert_eq!(
                reconstruct(&chunks, &normalized),
                normalized,
                "size={} overlap={}",
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_offsets_locate_text() {
        let text = prose(2200, 2);
        let normalized: Vec<char> = normalize(&text).chars().collect();
        for c in split(&[Page::new(0, text)], 500, 100).unwrap() {
            let located: String = normalized[c.start_offset..c.start_offset + c.length]
                .iter()
                .collect();
            assert_eq!(located, c.text);
        }
    }

    #[test]
    fn test_chunks_do_not_split_words() {
        let text = prose(4000, 0);
        let chunks = split(&[Page::new(0, text.clone())], 1000, 200).unwrap();
        let words: std::collections::HashSet<&str> = text.split(' ').collect();
        for c in &chunks {
            let first = c.text.split(' ').next().unwrap();
            let last = c.text.split(' ').last().unwrap();
            assert!(words.contains(first), "chunk starts mid-word: {:?}", first);
            assert!(words.contains(last), "chunk ends mid-word: {:?}", last);
        }
    }

    #[test]
    fn test_zero_overlap_chunks_never_start_with_whitespace() {
        for (size, overlap) in [(100, 0), (100, 5), (37, 1)] {
            let text = prose(3000, 6);
            let normalized = normalize(&text);
            let chunks = split(&[Page::new(0, text)], size, overlap).unwrap();
            for c in &chunks {
                assert!(
                    !c.text.starts_with(char::is_whitespace),
                    "size={} overlap={} chunk {:?}",
                    size,
                    overlap,
                    c.text
                );
            }
            assert_eq!(reconstruct(&chunks, &normalized), normalized);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let chunks = split(&[Page::new(0, prose(4000, 3))], 1000, 200).unwrap();
        for pair in chunks.windows(2) {
            let end = pair[0].start_offset + pair[0].length;
            assert!(pair[1].start_offset < end, "chunks do not overlap");
        }
    }

    #[test]
    fn test_long_word_overruns_instead_of_splitting() {
        let long_word = "x".repeat(300);
        let text = format!("{} {} tail", prose(90, 0), long_word);
        let chunks = split(&[Page::new(0, text)], 100, 20).unwrap();
        assert!(chunks.iter().any(|c| c.text.contains(&long_word)));
        assert!(chunks.iter().any(|c| c.length > 100));
    }

    #[test]
    fn test_two_pages_of_2500_chars() {
        let pages = vec![Page::new(0, prose(2500, 0)), Page::new(1, prose(2500, 5))];
        let chunks = split(&pages, 1000, 200).unwrap();
        assert_eq!(chunks.len(), 6);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.source_page, i / 3);
        }
        let page0: Vec<usize> = chunks[..3].iter().map(|c| c.length).collect();
        assert!(page0[0] > 800 && page0[0] <= 1000);
        assert!(page0[1] > 800 && page0[1] <= 1000);
        assert!(page0[2] < 1000);
    }

    #[test]
    fn test_multibyte_text_respects_char_counts() {
        let text = "é".repeat(10) + " " + &"ü".repeat(10) + " " + &"ø".repeat(10);
        let chunks = split(&[Page::new(0, text)], 12, 2).unwrap();
        for c in &chunks {
            assert_eq!(c.text.chars().count(), c.length);
        }
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }

    #[test]
    fn test_deterministic() {
        let pages = vec![Page::new(0, prose(3000, 7))];
        let a = split(&pages, 400, 80).unwrap();
        let b = split(&pages, 400, 80).unwrap();
        assert_eq!(a, b);
    }
}
