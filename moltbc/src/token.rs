//! Parsed Token Representation
//!
//! The parser produces, for each command, a flattened sequence of tokens.  A `Word`
//! token is followed by its components, the sub-tokens whose values are concatenated
//! to produce the word's value.  A `Variable` token's first component is the bare
//! variable name; any further components describe the array index.  `num_components`
//! counts every token in the subtree, so skipping `1 + num_components` tokens moves
//! to the next sibling.
//!
//! Tokens never own text: they are byte offsets into the source string, which must
//! outlive them.

use crate::util;

/// The kind of a token.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TokenKind {
    /// A complete word.  Its range includes any enclosing braces or quotes.
    Word,

    /// Literal text.
    Text,

    /// A backslash sequence, to be substituted.
    Backslash,

    /// A variable reference, `$name`, `${name}`, or `$name(index)`.
    Variable,

    /// A command substitution.  Its range includes the brackets.
    Command,
}

/// A single token: a range of the source text.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub len: usize,
    pub num_components: usize,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, len: usize) -> Self {
        Self {
            kind,
            start,
            len,
            num_components: 0,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// The source text the token covers.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end()]
    }
}

/// A single parsed command.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    /// The byte range of the command text, excluding the terminator.
    pub start: usize,
    pub len: usize,

    /// The 1-based line on which the command starts.
    pub line: usize,

    /// The flattened token sequence for all of the command's words.
    pub tokens: Vec<Token>,

    /// The index in `tokens` of each word token.
    pub words: Vec<usize>,
}

impl ParsedCommand {
    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Returns the tokens of word `index`: the word token followed by its components.
    pub fn word(&self, index: usize) -> &[Token] {
        let start = self.words[index];
        &self.tokens[start..start + 1 + self.tokens[start].num_components]
    }

    /// The command's source text.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.start + self.len]
    }
}

/// Returns the value of a word whose value is known at compile time, i.e., a word
/// made only of text and backslash sequences.
pub fn literal_text(word: &[Token], source: &str) -> Option<String> {
    let mut out = String::new();

    for token in &word[1..] {
        match token.kind {
            TokenKind::Text => out.push_str(token.text(source)),
            TokenKind::Backslash => out.push_str(&util::backslash_subst(source, token.start).0),
            _ => return None,
        }
    }

    Some(out)
}

/// Returns the source range of a word's value when that value is exactly a slice of
/// the source: a word with a single text component.  Script bodies must satisfy this
/// to be compiled inline with accurate source attribution.
pub fn literal_range(word: &[Token]) -> Option<(usize, usize)> {
    match word {
        [_] => Some((word[0].start, 0)),
        [_, text] if text.kind == TokenKind::Text => Some((text.start, text.len)),
        _ => None,
    }
}

/// Returns true if the word has no substitutions.
pub fn is_literal(word: &[Token]) -> bool {
    word[1..]
        .iter()
        .all(|t| matches!(t.kind, TokenKind::Text | TokenKind::Backslash))
}

/// Counts the newlines in `source[from..to]`.
pub fn count_lines(source: &str, from: usize, to: usize) -> usize {
    source.as_bytes()[from..to].iter().filter(|b| **b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_text() {
        let source = "a\\tb";
        let word = [
            Token {
                kind: TokenKind::Word,
                start: 0,
                len: 4,
                num_components: 3,
            },
            Token::new(TokenKind::Text, 0, 1),
            Token::new(TokenKind::Backslash, 1, 2),
            Token::new(TokenKind::Text, 3, 1),
        ];
        assert_eq!(literal_text(&word, source), Some("a\tb".into()));
        assert!(is_literal(&word));
        assert_eq!(literal_range(&word), None);
        assert_eq!(literal_range(&word[..2]), Some((0, 1)));
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines("a\nb\nc", 0, 5), 2);
        assert_eq!(count_lines("a\nb\nc", 2, 3), 0);
    }
}
