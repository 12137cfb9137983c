//! Recursive character splitter.
//!
//! Splits on the coarsest separator present (`"\n\n"`, `"\n"`, `" "`, then
//! single characters), keeps each separator at the start of the piece that
//! follows it, and greedily merges pieces into chunks of at most `chunk_size`
//! characters that share up to `chunk_overlap` characters with their
//! predecessor. Lengths are counted in `char`s.
use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3000,
            chunk_overlap: 300,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            config: ChunkingConfig {
                chunk_size,
                chunk_overlap,
            },
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let ChunkingConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;
        let mut out = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;
        for piece in pieces {
            let len = char_len(piece);
            if total + len > chunk_size && !window.is_empty() {
                push_trimmed(&mut out, &window);
                while total > chunk_overlap || (total > 0 && total + len > chunk_size) {
                    match window.pop_front() {
                        Some((_, first_len)) => total -= first_len,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        push_trimmed(&mut out, &window);
        out
    }
}

fn push_trimmed(out: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut out = Vec::new();
    if let Some(first) = parts.next() {
        out.push(first.to_string());
    }
    out.extend(parts.map(|p| format!("{separator}{p}")));
    out.retain(|s| !s.is_empty());
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = RecursiveSplitter::new(100, 10).split("  alpha beta\ngamma  ");
        assert_eq!(chunks, vec!["alpha beta\ngamma"]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text = (0..40).map(|i| format!("w{i:02}")).collect::<Vec<_>>().join(" ");
        let chunks = RecursiveSplitter::new(20, 8).split(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 20, "chunk too long: {c:?}");
        }
        // Neighbours share at least one word.
        for pair in chunks.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap_or_default();
            assert!(pair[1].contains(last_word), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(chunks[0].starts_with("w00"));
        assert!(chunks.last().is_some_and(|c| c.ends_with("w39")));
    }

    #[test]
    fn paragraphs_split_before_lines() {
        let text = format!("{}\n\n{}", "a".repeat(8), "b".repeat(8));
        assert_eq!(
            RecursiveSplitter::new(10, 0).split(&text),
            vec!["a".repeat(8), "b".repeat(8)]
        );
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let chunks = RecursiveSplitter::new(4, 1).split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }
}
