//! Overlapping text chunking with separator priority.
//!
//! Splits OCR output into bounded chunks for embedding. Boundaries are
//! chosen by a fixed priority — paragraph breaks, then line breaks, then
//! sentence breaks — falling back to a character window when a span has no
//! usable separator. Adjacent chunks share a configurable overlap so a
//! sentence cut at a boundary still appears whole in one of them.
//!
//! Lengths are measured in characters, not bytes; OCR output here is mixed
//! Latin and Gujarati script.

use crate::config::ChunkingConfig;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", ". "];

/// Separator-priority splitter with overlap.
#[derive(Clone, Debug)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    /// Builds a splitter from chunking configuration.
    ///
    /// The overlap is clamped below the chunk size so the window always
    /// advances.
    #[must_use]
    pub fn new(config: ChunkingConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            chunk_size,
            overlap: config.chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Splits `text` into chunks of at most `chunk_size` characters.
    ///
    /// Empty input (or input that trims to nothing) yields no chunks; input
    /// that already fits yields exactly one.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        self.split_span(trimmed, &SEPARATORS)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_span(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        match separators.split_first() {
            Some((sep, rest)) if text.contains(sep) => {
                let parts = split_keeping_separator(text, sep);
                self.merge_parts(parts, rest)
            }
            Some((_, rest)) => self.split_span(text, rest),
            None => self.char_window(text),
        }
    }

    /// Greedily packs parts into chunks, carrying a tail of up to `overlap`
    /// characters from each emitted chunk into the next.
    fn merge_parts(&self, parts: Vec<&str>, rest: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;

        for part in parts {
            let pieces = if char_len(part) > self.chunk_size {
                self.split_span(part, rest)
            } else {
                vec![part.to_string()]
            };

            for piece in pieces {
                let piece_len = char_len(&piece);
                if current_len + piece_len > self.chunk_size && !current.is_empty() {
                    chunks.push(current.concat());
                    while current_len > self.overlap
                        || (!current.is_empty() && current_len + piece_len > self.chunk_size)
                    {
                        let removed = current.remove(0);
                        current_len -= char_len(&removed);
                        if current.is_empty() {
                            break;
                        }
                    }
                    if current.is_empty() {
                        current_len = 0;
                    }
                }
                current_len += piece_len;
                current.push(piece);
            }
        }

        if !current.is_empty() {
            chunks.push(current.concat());
        }
        chunks
    }

    /// Last-resort fixed window for spans without separators.
    fn char_window(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            if start + self.chunk_size >= chars.len() {
                chunks.push(chars[start..].iter().collect());
                break;
            }
            chunks.push(chars[start..start + self.chunk_size].iter().collect());
            start += step;
        }
        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits on `sep`, keeping the separator attached to the preceding part so
/// re-concatenation is lossless.
fn split_keeping_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let end = pos + sep.len();
        parts.push(&rest[..end]);
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(ChunkingConfig {
            chunk_size,
            chunk_overlap: overlap,
        })
    }

    #[test]
    fn text_of_exact_chunk_size_is_one_chunk() {
        let text = "a".repeat(500);
        let chunks = splitter(500, 50).split(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 500);
    }

    #[test]
    fn two_windows_overlap_at_the_boundary() {
        // 2 * chunk_size - overlap: exactly two overlapping chunks.
        let text = "a".repeat(2 * 500 - 50);
        let chunks = splitter(500, 50).split(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[1].len(), 500);
    }

    #[test]
    fn paragraph_breaks_win_over_the_window() {
        let text = format!("{}\n\n{}", "a".repeat(300), "b".repeat(300));
        let chunks = splitter(500, 50).split(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn sentence_breaks_are_used_when_no_newlines_exist() {
        let sentence = format!("{}. ", "word ".repeat(30).trim());
        let text = sentence.repeat(8);
        let chunks = splitter(400, 40).split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 400, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn overlap_carries_tail_content_forward() {
        let text = format!("{}\n{}\n{}", "a".repeat(40), "b".repeat(40), "c".repeat(40));
        let chunks = splitter(100, 50).split(&text);
        // The b-line is retained as overlap in the chunk that introduces c.
        assert!(chunks.iter().any(|c| c.contains('b') && c.contains('c')));
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        assert!(splitter(500, 50).split("").is_empty());
        assert!(splitter(500, 50).split("  \n\n  ").is_empty());
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        // Gujarati text; byte slicing would panic here.
        let text = "નાણાં વિભાગ ઠરાવ ".repeat(80);
        let chunks = splitter(200, 20).split(&text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200);
        }
    }
}
