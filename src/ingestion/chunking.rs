//! Recursive character text splitter
//!
//! Splits on the coarsest separator present (paragraph, line, sentence,
//! word, character), recursing into pieces that are still too long, then
//! merges adjacent pieces back up to `chunk_size` characters with
//! `chunk_overlap` characters carried between consecutive chunks.
//! Lengths are counted in characters, not bytes.

use std::collections::VecDeque;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(**s))
            .map(|(i, s)| (i, *s))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let remaining = &separators[(idx + 1).min(separators.len())..];

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut short: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                short.push(piece);
                continue;
            }
            if !short.is_empty() {
                chunks.extend(self.merge(&short, separator));
                short.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !short.is_empty() {
            chunks.extend(self.merge(&short, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !window.is_empty() {
                chunks.push(join(&window, separator));
                // Drop from the front until only the overlap remains and the
                // next piece fits
                while total > self.chunk_overlap
                    || (total > 0 && total + len + sep_len > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else { break };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }
            if !window.is_empty() {
                total += sep_len;
            }
            window.push_back(piece);
            total += len;
        }
        if !window.is_empty() {
            chunks.push(join(&window, separator));
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join(window: &VecDeque<&str>, separator: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let s = TextSplitter::new(1000, 100);
        assert_eq!(s.split("  one short article  "), vec!["one short article"]);
        assert!(s.split("   ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size() {
        let s = TextSplitter::new(50, 10);
        let text = (0..40).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let chunks = s.split(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50, "chunk too long: {c}");
        }
    }

    #[test]
    fn test_overlap_carried_between_chunks() {
        let s = TextSplitter::new(30, 12);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = s.split(text);
        assert!(chunks.len() >= 2);
        let last_word_of_first = chunks[0].split(' ').last().unwrap();
        assert!(chunks[1].starts_with(last_word_of_first) || chunks[1].contains(last_word_of_first));
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let s = TextSplitter::new(40, 0);
        let text = "first paragraph is here.\n\nsecond paragraph is here.";
        let chunks = s.split(text);
        assert_eq!(chunks, vec!["first paragraph is here.", "second paragraph is here."]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let s = TextSplitter::new(10, 0);
        let text = "안전".repeat(10);
        let chunks = s.split(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() == 10));
    }

    #[test]
    fn test_overlap_clamped() {
        let s = TextSplitter::new(5, 50);
        assert_eq!(s.chunk_overlap, 4);
    }
}
