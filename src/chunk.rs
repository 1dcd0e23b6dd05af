//! Sliding-window text chunker.
//!
//! Splits extracted document text into overlapping windows for embedding.
//! Windows prefer to end at a sentence or line boundary when one falls in
//! the last 30% of the window, so chunks stay semantically coherent
//! without a full sentence tokenizer.
//!
//! Operates on characters, not bytes, so multi-byte UTF-8 input never
//! splits inside a code point.

/// Split text into overlapping chunks of at most `chunk_chars` characters.
///
/// Consecutive chunks share `overlap_chars` characters of context. When a
/// window is followed by more text, it is shortened to end just after the
/// last `.` or newline, provided that boundary lies past 70% of the
/// window. Each chunk is trimmed of surrounding whitespace.
///
/// Empty input yields no chunks. The scan advances by at least one
/// character per window regardless of how far a boundary trim pulls the
/// window back, so it terminates for any `overlap_chars < chunk_chars`.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + chunk_chars).min(chars.len());

        // Prefer a sentence/line boundary near the end of the window.
        if end < chars.len() {
            let window = &chars[start..end];
            let last_period = window.iter().rposition(|&c| c == '.');
            let last_newline = window.iter().rposition(|&c| c == '\n');
            if let Some(break_point) = last_period.max(last_newline) {
                if break_point as f64 > chunk_chars as f64 * 0.7 {
                    end = start + break_point + 1;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        chunks.push(piece.trim().to_string());

        start = if end < chars.len() {
            // A boundary trim can pull `end` back before `start + overlap`;
            // never let the next window start at or before the current one.
            end.saturating_sub(overlap_chars).max(start + 1)
        } else {
            end
        };
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1500, 200);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 1500, 200).is_empty());
    }

    #[test]
    fn test_long_text_overlaps() {
        let text = "a".repeat(4000);
        let chunks = chunk_text(&text, 1500, 200);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.len() <= 1500));
        // Every character of the input appears in some chunk.
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(total >= 4000);
    }

    #[test]
    fn test_breaks_at_sentence_boundary() {
        // A period sits past 70% of the 100-char window; the first chunk
        // must end there rather than mid-word.
        let mut text = "x".repeat(80);
        text.push('.');
        text.push_str(&"y".repeat(100));
        let chunks = chunk_text(&text, 100, 10);
        assert!(chunks[0].ends_with('.'));
        assert_eq!(chunks[0].len(), 81);
    }

    #[test]
    fn test_early_boundary_ignored() {
        // Period at 30% of the window is too early to break on.
        let mut text = "x".repeat(30);
        text.push('.');
        text.push_str(&"y".repeat(170));
        let chunks = chunk_text(&text, 100, 10);
        assert_eq!(chunks[0].len(), 100);
    }

    #[test]
    fn test_multibyte_input() {
        let text = "é".repeat(500);
        let chunks = chunk_text(&text, 100, 10);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn test_large_overlap_with_boundary_trim_terminates() {
        // The period sits just past 70% of the window, so the trim pulls
        // `end` back to 72 while the overlap alone would restart the next
        // window at 0. The scan must still advance and cover the input.
        let text = ("a".repeat(71) + ".").repeat(10);
        let chunks = chunk_text(&text, 100, 75);
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= text.len());
        assert!(chunks.last().unwrap().ends_with('.'));
    }

    #[test]
    fn test_deterministic() {
        let text = "First sentence. Second sentence.\nThird line.".repeat(50);
        assert_eq!(chunk_text(&text, 200, 20), chunk_text(&text, 200, 20));
    }
}
