//! Overlapping text chunker with a layered separator policy.
//!
//! Splitting prefers paragraph boundaries, then lines, then sentence
//! endings, then single words, and finally raw characters, so chunks break
//! at the most natural boundary that keeps them under the size limit.

use crate::errors::RagError;

/// Separator cascade, most to least preferred. Pieces that still exceed the
/// chunk size after one level are re-split with the next one; past the last
/// level the text degrades to per-character segments.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", "! ", "? "];

/// Split `text` into ordered chunks of at most `size` characters where
/// consecutive chunks share roughly `overlap` characters of trailing text.
///
/// Pure and deterministic: the same input and configuration always produce
/// the same sequence. Empty (or whitespace-only) input yields zero chunks.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, RagError> {
    if size == 0 {
        return Err(RagError::Validation("chunk size must be positive".into()));
    }
    if overlap >= size {
        return Err(RagError::Validation(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, size
        )));
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let segments = split_segments(text, size, &SEPARATORS);
    Ok(assemble(&segments, size, overlap))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursively split text into segments no longer than `size` characters,
/// keeping each separator attached to the piece it terminates.
fn split_segments(text: &str, size: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= size {
        return vec![text.to_string()];
    }

    let Some((sep, rest)) = separators.split_first() else {
        // No boundary left to respect; fall back to single characters and
        // let assembly pack them into windows.
        return text.chars().map(String::from).collect();
    };

    let mut segments = Vec::new();
    for piece in text.split_inclusive(sep) {
        if char_len(piece) <= size {
            segments.push(piece.to_string());
        } else {
            segments.extend(split_segments(piece, size, rest));
        }
    }
    segments
}

/// Pack segments into chunks of at most `size` characters, carrying the
/// trailing segments (up to `overlap` characters total) into the next chunk.
fn assemble(segments: &[String], size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut window_len = 0usize;

    for segment in segments {
        let seg_len = char_len(segment);

        if window_len + seg_len > size && !window.is_empty() {
            push_chunk(&mut chunks, &window);

            // Retain a tail of the window as shared text. The tail shrinks
            // further if the incoming segment would not fit beside it.
            while window_len > overlap
                || (window_len + seg_len > size && window_len > 0)
            {
                window_len -= char_len(window[0]);
                window.remove(0);
            }
        }

        window.push(segment.as_str());
        window_len += seg_len;
    }

    push_chunk(&mut chunks, &window);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, window: &[&str]) {
    let chunk = window.concat().trim().to_string();
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
}
