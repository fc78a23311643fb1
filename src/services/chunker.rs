use super::Chunker;
use crate::constants::defaults;
use crate::error::{IndexerError, Result};
use crate::models::{Document, TextSpan};

/// Sentence-boundary chunker with word-count tokens.
///
/// Sentences are packed greedily up to `chunk_size` tokens; the next chunk
/// starts at the latest sentence that keeps at most `chunk_overlap` tokens of
/// overlap with the previous one.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_sentences_per_chunk: usize,
}

#[derive(Debug, Clone, Copy)]
struct Sentence {
    start: usize,
    end: usize,
    tokens: usize,
}

impl SentenceChunker {
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        min_sentences_per_chunk: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(IndexerError::configuration("chunk size must be at least 1"));
        }
        if chunk_overlap >= chunk_size {
            return Err(IndexerError::configuration(format!(
                "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            min_sentences_per_chunk: min_sentences_per_chunk.max(1),
        })
    }

    /// Chunk raw text. Offsets are char positions into `text`.
    pub fn chunk_text(&self, text: &str) -> Vec<TextSpan> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let sentences = split_sentences(&chars);
        let mut spans = Vec::new();
        let mut first = 0;

        while first < sentences.len() {
            let mut last = first;
            let mut tokens = 0;
            while last < sentences.len() {
                let taken = last - first;
                let next_tokens = tokens + sentences[last].tokens;
                if taken >= self.min_sentences_per_chunk && next_tokens > self.chunk_size {
                    break;
                }
                tokens = next_tokens;
                last += 1;
            }

            let start = sentences[first].start;
            let end = sentences[last - 1].end;
            spans.push(TextSpan {
                text: chars[start..end].iter().collect(),
                start_index: start,
                end_index: end,
                token_count: tokens,
            });

            if last >= sentences.len() {
                break;
            }
            first = self.overlap_start(&sentences, first, last);
        }

        spans
    }

    fn overlap_start(&self, sentences: &[Sentence], first: usize, last: usize) -> usize {
        let mut start = last;
        let mut overlap = 0;
        while start > first + 1 {
            let candidate = overlap + sentences[start - 1].tokens;
            if candidate > self.chunk_overlap {
                break;
            }
            overlap = candidate;
            start -= 1;
        }
        start
    }
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE_TOKENS,
            chunk_overlap: defaults::CHUNK_OVERLAP_TOKENS,
            min_sentences_per_chunk: defaults::MIN_SENTENCES_PER_CHUNK,
        }
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<TextSpan>> {
        Ok(self.chunk_text(&document.full_text()))
    }
}

/// Contiguous sentences covering every char. A sentence ends after `.`, `!`
/// or `?` followed by whitespace, and keeps its trailing whitespace.
fn split_sentences(chars: &[char]) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let terminator = matches!(chars[i], '.' | '!' | '?');
        let followed_by_space = chars.get(i + 1).map_or(false, |c| c.is_whitespace());
        i += 1;
        if terminator && followed_by_space {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            sentences.push(sentence(chars, start, i));
            start = i;
        }
    }
    if start < chars.len() {
        sentences.push(sentence(chars, start, chars.len()));
    }

    sentences
}

fn sentence(chars: &[char], start: usize, end: usize) -> Sentence {
    let mut tokens = 0;
    let mut in_word = false;
    for c in &chars[start..end] {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            tokens += 1;
        }
    }
    Sentence { start, end, tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_a_single_chunk() {
        let chunker = SentenceChunker::default();
        let spans = chunker.chunk_text("One sentence. Another one!");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_index, 0);
        assert_eq!(spans[0].end_index, 26);
        assert_eq!(spans[0].token_count, 4);
    }

    #[test]
    fn test_chunks_overlap_by_whole_sentences() {
        let chunker = SentenceChunker::new(4, 2, 1).unwrap();
        let text = "a b. c d. e f. g h.";
        let spans = chunker.chunk_text(text);

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].text, "a b. c d. ");
        assert_eq!(spans[1].text, "c d. e f. ");
        assert_eq!(spans[2].text, "e f. g h.");
        assert!(spans.iter().all(|s| s.token_count <= 4));
        assert_eq!(spans.last().unwrap().end_index, text.chars().count());
    }

    #[test]
    fn test_oversized_sentence_still_forms_a_chunk() {
        let chunker = SentenceChunker::new(2, 1, 1).unwrap();
        let spans = chunker.chunk_text("one two three four. five.");
        assert_eq!(spans[0].token_count, 4);
        assert_eq!(spans[1].text, "five.");
    }

    #[test]
    fn test_offsets_are_char_based() {
        let chunker = SentenceChunker::default();
        let spans = chunker.chunk_text("héllo wörld.");
        assert_eq!(spans[0].end_index, 12);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(SentenceChunker::default().chunk_text("  \n ").is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(SentenceChunker::new(4, 4, 1).is_err());
        assert!(SentenceChunker::new(0, 0, 1).is_err());
    }
}
