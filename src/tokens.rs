//! Whitespace tokenizer shared by the chunker, the late-chunking embedder,
//! and the adaptive selector.
//!
//! A token is a maximal run of non-whitespace bytes. Every component that
//! reasons about token spans uses this segmentation, so a chunk's
//! `[start, end)` token range always addresses the same tokens the embedder
//! pooled over.

/// A token with its byte span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// Byte offset of the first byte of the token.
    pub start: usize,
    /// Byte offset one past the last byte of the token.
    pub end: usize,
}

/// Split `text` into tokens with byte spans, in document order.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(Token {
                    text: &text[s..idx],
                    start: s,
                    end: idx,
                });
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            text: &text[s..],
            start: s,
            end: text.len(),
        });
    }

    tokens
}

/// Number of tokens in `text`.
pub fn count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_reports_byte_spans() {
        let tokens = tokenize("alpha  beta\ngamma");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "alpha");
        assert_eq!((tokens[0].start, tokens[0].end), (0, 5));
        assert_eq!(tokens[1].text, "beta");
        assert_eq!((tokens[1].start, tokens[1].end), (7, 11));
        assert_eq!(tokens[2].text, "gamma");
        assert_eq!(tokens[2].end, "alpha  beta\ngamma".len());
    }

    #[test]
    fn tokenize_empty_and_whitespace_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \n\t ").is_empty());
    }

    #[test]
    fn count_matches_tokenize() {
        let text = "one two  three\nfour";
        assert_eq!(count(text), tokenize(text).len());
    }

    #[test]
    fn tokenize_handles_multibyte() {
        let text = "héllo wörld";
        let tokens = tokenize(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "héllo");
        assert_eq!(tokens[1].text, "wörld");
        assert_eq!(&text[tokens[1].start..tokens[1].end], "wörld");
    }
}
