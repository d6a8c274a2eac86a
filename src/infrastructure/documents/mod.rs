//! Document-to-text loading and fixed-window chunking.

use std::hash::{Hash, Hasher};
use std::path::Path;

use ahash::AHasher;

use crate::domain::{DomainError, TextUnit};

/// Reads a UTF-8 text document. Binary formats (PDF etc.) are expected to be
/// converted to text beforehand.
pub fn load_text(path: impl AsRef<Path>) -> Result<String, DomainError> {
    let path = path.as_ref();
    std::fs::read_to_string(path)
        .map_err(|err| DomainError::validation(format!("failed to read {:?}: {err}", path)))
}

/// Splits text into windows of `size` characters, each starting
/// `size - overlap` characters after the previous one.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindowChunker {
    size: usize,
    overlap: usize,
}

impl FixedWindowChunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self, DomainError> {
        if size == 0 {
            return Err(DomainError::validation("chunk size must be greater than zero"));
        }
        if overlap >= size {
            return Err(DomainError::validation(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    /// Positions are `"<source>#<window index>@<content hash>"`, so an edited
    /// window gets a fresh position instead of colliding with the indexed
    /// one. Whitespace-only windows are dropped but keep their index.
    pub fn chunk(&self, source: &str, text: &str) -> Vec<TextUnit> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.size - self.overlap;

        let mut units = Vec::new();
        let mut start = 0;
        let mut window = 0;
        while start < chars.len() {
            let end = (start + self.size).min(chars.len());
            let body: String = chars[start..end].iter().collect();
            if !body.trim().is_empty() {
                let position = format!("{source}#{window}@{}", content_tag(&body));
                units.push(TextUnit::new(position, body));
            }
            if end == chars.len() {
                break;
            }
            start += step;
            window += 1;
        }
        units
    }
}

/// Short hex digest of a window's text.
fn content_tag(body: &str) -> String {
    let mut hasher = AHasher::default();
    body.hash(&mut hasher);
    format!("{:012x}", hasher.finish() & 0xffff_ffff_ffff)
}
