// Token-aware text chunking for document processing.

use tiktoken_rs::CoreBPE;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// A chunk of text with position metadata. Character offsets are byte
/// positions into the trimmed source text and are approximate once the
/// overlap pass has run.
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub content: String,
    pub index: usize,
    pub token_count: usize,
    pub start_char: usize,
    pub end_char: usize,
}

/// Splits documents into overlapping, token-bounded chunks.
///
/// Strategy: accumulate paragraphs while they fit, fall back to sentence
/// splitting for oversized paragraphs, force-split single oversized
/// sentences on token windows, then prepend each chunk with the decoded
/// tail of its predecessor. Boundaries are reproducible for identical
/// input and parameters.
pub struct ChunkingService {
    bpe: CoreBPE,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingService {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            bpe: tiktoken_rs::cl100k_base().expect("cl100k_base encoding"),
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn decode(&self, tokens: Vec<u32>) -> String {
        self.bpe.decode(tokens).unwrap_or_default()
    }

    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let paragraphs: Vec<&str> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if paragraphs.is_empty() {
            return Vec::new();
        }

        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut current_chunk = String::new();
        let mut current_start = 0usize;
        let mut chunk_index = 0usize;

        for para in paragraphs {
            let para_tokens = self.count_tokens(para);

            let candidate = if current_chunk.is_empty() {
                para.to_string()
            } else {
                format!("{current_chunk}\n\n{para}")
            };

            if self.count_tokens(&candidate) <= self.chunk_size {
                if current_chunk.is_empty() {
                    current_start = text.find(para).unwrap_or(0);
                }
                current_chunk = candidate;
            } else {
                if !current_chunk.is_empty() {
                    chunks.push(TextChunk {
                        token_count: self.count_tokens(&current_chunk),
                        end_char: current_start + current_chunk.len(),
                        content: std::mem::take(&mut current_chunk),
                        index: chunk_index,
                        start_char: current_start,
                    });
                    chunk_index += 1;
                }

                if para_tokens > self.chunk_size {
                    let para_chunks = self.split_long_paragraph(para, text, chunk_index);
                    chunk_index += para_chunks.len();
                    chunks.extend(para_chunks);
                    current_chunk.clear();
                } else {
                    current_chunk = para.to_string();
                    current_start = text.find(para).unwrap_or(0);
                }
            }
        }

        if !current_chunk.is_empty() {
            chunks.push(TextChunk {
                token_count: self.count_tokens(&current_chunk),
                end_char: current_start + current_chunk.len(),
                content: current_chunk,
                index: chunk_index,
                start_char: current_start,
            });
        }

        self.add_overlap(chunks)
    }

    /// Split a paragraph that exceeds the chunk size, preferring sentence
    /// boundaries and falling back to raw token windows.
    fn split_long_paragraph(
        &self,
        para: &str,
        full_text: &str,
        start_index: usize,
    ) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let sentences = split_sentences(para);

        let mut current = String::new();
        let mut current_start = full_text.find(para).unwrap_or(0);
        let mut index = start_index;

        for sentence in sentences {
            let candidate = if current.is_empty() {
                sentence.clone()
            } else {
                format!("{current} {sentence}")
            };

            if self.count_tokens(&candidate) <= self.chunk_size {
                current = candidate;
            } else {
                if !current.is_empty() {
                    let len = current.len();
                    chunks.push(TextChunk {
                        token_count: self.count_tokens(&current),
                        end_char: current_start + len,
                        content: std::mem::take(&mut current),
                        index,
                        start_char: current_start,
                    });
                    index += 1;
                    current_start += len + 1;
                }

                if self.count_tokens(&sentence) > self.chunk_size {
                    let forced = self.force_split(&sentence, current_start, index);
                    for chunk in forced {
                        index += 1;
                        current_start += chunk.content.len();
                        chunks.push(chunk);
                    }
                    current.clear();
                } else {
                    current = sentence;
                }
            }
        }

        if !current.is_empty() {
            chunks.push(TextChunk {
                token_count: self.count_tokens(&current),
                end_char: current_start + current.len(),
                content: current,
                index,
                start_char: current_start,
            });
        }

        chunks
    }

    /// Force-split on token windows stepping `chunk_size - chunk_overlap`.
    fn force_split(&self, text: &str, start_char: usize, start_index: usize) -> Vec<TextChunk> {
        let tokens = self.bpe.encode_ordinary(text);
        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);

        let mut chunks = Vec::new();
        let mut index = start_index;
        let mut char_pos = start_char;

        let mut i = 0;
        while i < tokens.len() {
            let window = &tokens[i..(i + self.chunk_size).min(tokens.len())];
            let content = self.decode(window.to_vec());

            chunks.push(TextChunk {
                token_count: window.len(),
                end_char: char_pos + content.len(),
                start_char: char_pos,
                index,
                content: content.clone(),
            });
            index += 1;
            char_pos += content.len();
            i += step;
        }

        chunks
    }

    /// Prepend each chunk after the first with the decoded last
    /// `chunk_overlap` tokens of its predecessor.
    fn add_overlap(&self, chunks: Vec<TextChunk>) -> Vec<TextChunk> {
        if chunks.len() <= 1 || self.chunk_overlap == 0 {
            return chunks;
        }

        let mut result = Vec::with_capacity(chunks.len());
        result.push(chunks[0].clone());

        for i in 1..chunks.len() {
            let prev = &chunks[i - 1];
            let curr = &chunks[i];

            let prev_tokens = self.bpe.encode_ordinary(&prev.content);
            let overlap_start = prev_tokens.len().saturating_sub(self.chunk_overlap);
            let overlap_text = self.decode(prev_tokens[overlap_start..].to_vec());

            let content = format!("{overlap_text} {}", curr.content);
            result.push(TextChunk {
                token_count: self.count_tokens(&content),
                start_char: curr.start_char.saturating_sub(overlap_text.len() + 1),
                end_char: curr.end_char,
                content,
                index: curr.index,
            });
        }

        result
    }
}

/// Sentence boundaries: a run of `.`/`!`/`?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') && chars.peek().is_some_and(|c| c.is_whitespace()) {
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunker = ChunkingService::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
        assert!(chunker.chunk_text("").is_empty());
        assert!(chunker.chunk_text("   \n\n  ").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = ChunkingService::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
        let chunks = chunker.chunk_text("Alpha is a Component.\n\nBeta uses Alpha.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].content, "Alpha is a Component.\n\nBeta uses Alpha.");
        assert!(chunks[0].token_count <= DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks[0].start_char, 0);
    }

    #[test]
    fn long_text_produces_overlapping_chunks() {
        let chunker = ChunkingService::new(40, 8);
        let paragraphs: Vec<String> = (0..12)
            .map(|i| format!("Paragraph number {i} talks about topic {i} in a few words."))
            .collect();
        let text = paragraphs.join("\n\n");

        let chunks = chunker.chunk_text(&text);
        assert!(chunks.len() > 1);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(!chunk.content.trim().is_empty());
            // Overlap is prepended on top of a size-bounded chunk.
            assert!(chunk.token_count <= 40 + 8 + 1, "chunk {i} too large");
        }

        // Recomputed counts reflect the prepended overlap text.
        assert!(chunks[1].token_count >= chunks.first().map(|c| c.token_count.min(8)).unwrap_or(0));
    }

    #[test]
    fn oversized_sentence_is_force_split_on_token_windows() {
        let chunker = ChunkingService::new(20, 5);
        let words: Vec<String> = (0..200).map(|i| format!("word{i}")).collect();
        let text = words.join(" ");

        let chunks = chunker.chunk_text(&text);
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(!chunk.content.is_empty());
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let chunker = ChunkingService::new(30, 6);
        let text = "One sentence here. Another sentence there!\n\nA second paragraph follows. It has more sentences. Quite a few more words than the first one, in fact.";

        let first = chunker.chunk_text(text);
        let second = chunker.chunk_text(text);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.start_char, b.start_char);
            assert_eq!(a.end_char, b.end_char);
            assert_eq!(a.token_count, b.token_count);
        }
    }

    #[test]
    fn sentences_split_on_terminators() {
        let sentences = split_sentences("First one. Second one! Third? Fourth trails");
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third?", "Fourth trails"]
        );
    }

    #[test]
    fn consecutive_chunks_share_overlap_tokens() {
        let chunker = ChunkingService::new(25, 6);
        let text: String = (0..15)
            .map(|i| format!("Sentence {i} adds several more tokens to the paragraph."))
            .collect::<Vec<_>>()
            .join(" ");

        let chunks = chunker.chunk_text(&text);
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            // The successor carries a prepended copy of its predecessor's
            // tail, so the shared text must appear in both.
            let shared = pair[1]
                .content
                .split(' ')
                .next()
                .unwrap_or_default()
                .to_string();
            assert!(
                !shared.is_empty() && pair[0].content.contains(shared.trim()),
                "expected overlap between consecutive chunks"
            );
        }
    }
}
