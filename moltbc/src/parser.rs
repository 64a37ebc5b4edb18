//! The Molt Parser
//!
//! This is the tokenizer consumed by the bytecode compiler.  It splits a script into
//! commands and each command into words, producing the flattened token sequences
//! described in the [`token`](../token/index.html) module.  Parsing never copies
//! text: tokens are offsets into the source string.
//!
//! A script nested within a larger source (a braced loop body, a command substitution,
//! a `switch` arm) is parsed in place by giving the parser the sub-range and the line
//! on which it begins, so every token and line number refers to the original source.

use crate::token::count_lines;
use crate::token::ParsedCommand;
use crate::token::Token;
use crate::token::TokenKind;
use crate::types::*;
use crate::util;

/// Parses the entire script, returning its commands.
pub fn parse(source: &str) -> Result<Vec<ParsedCommand>, Exception> {
    parse_range(source, 0, source.len(), 1)
}

/// Parses the script in `source[start..end]`, which begins on line `line`.
pub fn parse_range(
    source: &str,
    start: usize,
    end: usize,
    line: usize,
) -> Result<Vec<ParsedCommand>, Exception> {
    let mut parser = Parser::new(source, start, end, line);
    let commands = parser.parse_script(false)?;
    Ok(commands)
}

/// Options for `subst`-style parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstFlags {
    pub no_backslashes: bool,
    pub no_commands: bool,
    pub no_variables: bool,
}

/// Parses `source[start..end]` as the argument of `subst`: the whole range is a single
/// sequence of text, backslash, variable, and command tokens.  The returned tokens are
/// preceded by a `Word` token covering the range.
pub fn parse_subst(
    source: &str,
    start: usize,
    end: usize,
    flags: SubstFlags,
) -> Result<Vec<Token>, Exception> {
    let mut parser = Parser::new(source, start, end, 1);
    parser.subst_flags = Some(flags);

    let mut tokens = vec![Token::new(TokenKind::Word, start, end - start)];
    parser.parse_tokens(&mut tokens, Stop::End)?;
    tokens[0].num_components = tokens.len() - 1;
    Ok(tokens)
}

/// Parses the variable reference at `source[start]`, which must be a `$`.  Returns
/// the reference's tokens and the position just past it, or `None` if the dollar sign
/// isn't followed by a variable name.
pub fn parse_var_ref(
    source: &str,
    start: usize,
    end: usize,
) -> Result<Option<(Vec<Token>, usize)>, Exception> {
    let mut parser = Parser::new(source, start, end, 1);
    let mut tokens = Vec::new();
    if parser.parse_variable(&mut tokens)? {
        Ok(Some((tokens, parser.pos)))
    } else {
        Ok(None)
    }
}

/// Parses the bracketed command at `source[start]`, which must be a `[`.  Returns its
/// `Command` token and the position just past the close bracket.
pub fn parse_command_ref(source: &str, start: usize, end: usize) -> Result<(Token, usize), Exception> {
    let mut parser = Parser::new(source, start, end, 1);
    let mut tokens = Vec::new();
    parser.parse_command_subst(&mut tokens)?;
    match tokens.pop() {
        Some(token) => Ok((token, parser.pos)),
        None => molt_err!("missing close-bracket"),
    }
}

/// Parses the quoted string at `source[start]`, which must be a `"`.  Returns a `Word`
/// token and its components, and the position just past the close quote.
pub fn parse_quoted(source: &str, start: usize, end: usize) -> Result<(Vec<Token>, usize), Exception> {
    let mut parser = Parser::new(source, start + 1, end, 1);
    let mut tokens = vec![Token::new(TokenKind::Word, start, 0)];
    parser.parse_tokens(&mut tokens, Stop::Quote)?;
    parser.pos += 1;
    tokens[0].len = parser.pos - start;
    tokens[0].num_components = tokens.len() - 1;
    Ok((tokens, parser.pos))
}

/// What ends a run of tokens.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Stop {
    /// A bare word ends at whitespace or a command terminator.
    BareWord,

    /// A quoted word ends at the close quote.
    Quote,

    /// An array index ends at the close paren.
    Paren,

    /// `subst` text runs to the end of the range.
    End,
}

struct Parser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    end: usize,

    // Line bookkeeping: `line` is the line number at byte `line_pos`.
    line: usize,
    line_pos: usize,

    // True while parsing the body of a command substitution.
    nested: bool,

    subst_flags: Option<SubstFlags>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, start: usize, end: usize, line: usize) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: start,
            end,
            line,
            line_pos: start,
            nested: false,
            subst_flags: None,
        }
    }

    fn peek(&self) -> Option<u8> {
        if self.pos < self.end {
            Some(self.bytes[self.pos])
        } else {
            None
        }
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        let pos = self.pos + offset;
        if pos < self.end {
            Some(self.bytes[pos])
        } else {
            None
        }
    }

    fn line_at(&mut self, pos: usize) -> usize {
        if pos >= self.line_pos {
            self.line += count_lines(self.source, self.line_pos, pos);
            self.line_pos = pos;
        }
        self.line
    }

    fn at_backslash_newline(&self) -> bool {
        self.peek() == Some(b'\\') && self.peek_at(1) == Some(b'\n')
    }

    //-------------------------------------------------------------------------
    // Scripts and commands

    /// Parses commands until the end of the range, or, when `nested`, until the
    /// close bracket of a command substitution.
    fn parse_script(&mut self, nested: bool) -> Result<Vec<ParsedCommand>, Exception> {
        let was_nested = self.nested;
        self.nested = nested;
        let mut commands = Vec::new();

        loop {
            self.skip_command_separators();

            match self.peek() {
                None => {
                    if nested {
                        return molt_err!("missing close-bracket");
                    }
                    break;
                }
                Some(b']') if nested => break,
                Some(b'#') => {
                    self.skip_comment();
                    continue;
                }
                _ => (),
            }

            if let Some(cmd) = self.parse_command()? {
                commands.push(cmd);
            }
        }

        self.nested = was_nested;
        Ok(commands)
    }

    fn skip_command_separators(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\n' | b'\r' | b';') => self.pos += 1,
                Some(b'\\') if self.peek_at(1) == Some(b'\n') => self.pos += 2,
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                b'\\' => self.pos += 2,
                b'\n' => break,
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.end);
    }

    fn skip_word_separators(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => self.pos += 1,
                _ if self.at_backslash_newline() => self.pos += 2,
                _ => break,
            }
        }
    }

    fn at_command_end(&self) -> bool {
        match self.peek() {
            None | Some(b'\n') | Some(b';') => true,
            Some(b']') => self.nested,
            _ => false,
        }
    }

    fn parse_command(&mut self) -> Result<Option<ParsedCommand>, Exception> {
        let start = self.pos;
        let line = self.line_at(start);
        let mut tokens = Vec::new();
        let mut words = Vec::new();

        loop {
            self.skip_word_separators();
            if self.at_command_end() {
                break;
            }

            words.push(tokens.len());
            self.parse_word(&mut tokens)?;
        }

        let mut len = self.pos - start;
        while len > 0 && matches!(self.bytes[start + len - 1], b' ' | b'\t' | b'\r') {
            len -= 1;
        }

        if words.is_empty() {
            return Ok(None);
        }

        Ok(Some(ParsedCommand {
            start,
            len,
            line,
            tokens,
            words,
        }))
    }

    //-------------------------------------------------------------------------
    // Words

    fn parse_word(&mut self, tokens: &mut Vec<Token>) -> Result<(), Exception> {
        let word_index = tokens.len();
        let start = self.pos;
        tokens.push(Token::new(TokenKind::Word, start, 0));

        match self.peek() {
            Some(b'{') => self.parse_braced(tokens)?,
            Some(b'"') => {
                self.pos += 1;
                let first = tokens.len();
                self.parse_tokens(tokens, Stop::Quote)?;
                if self.peek() != Some(b'"') {
                    return molt_err!("missing \"");
                }
                if tokens.len() == first {
                    tokens.push(Token::new(TokenKind::Text, self.pos, 0));
                }
                self.pos += 1;
                self.check_word_end("extra characters after close-quote")?;
            }
            _ => self.parse_tokens(tokens, Stop::BareWord)?,
        }

        tokens[word_index].len = self.pos - start;
        tokens[word_index].num_components = tokens.len() - word_index - 1;
        Ok(())
    }

    fn check_word_end(&self, msg: &str) -> Result<(), Exception> {
        match self.peek() {
            None | Some(b' ' | b'\t' | b'\r' | b'\n' | b';') => Ok(()),
            Some(b']') if self.nested => Ok(()),
            _ if self.at_backslash_newline() => Ok(()),
            _ => molt_err!("{}", msg),
        }
    }

    /// Parses a braced word.  The content is a single text token, except that each
    /// backslash-newline becomes a backslash token.
    fn parse_braced(&mut self, tokens: &mut Vec<Token>) -> Result<(), Exception> {
        let open = self.pos;
        let mut depth = 0;
        let mut text_start = open + 1;
        let first = tokens.len();

        loop {
            let Some(ch) = self.peek() else {
                return molt_err!("missing close-brace");
            };

            match ch {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                b'\\' if self.peek_at(1) == Some(b'\n') => {
                    if self.pos > text_start {
                        tokens.push(Token::new(TokenKind::Text, text_start, self.pos - text_start));
                    }
                    let (_, len) = util::backslash_subst(self.source, self.pos);
                    tokens.push(Token::new(TokenKind::Backslash, self.pos, len));
                    self.pos += len;
                    text_start = self.pos;
                    continue;
                }
                b'\\' => self.pos += 1,
                _ => (),
            }
            self.pos += 1;
        }

        if self.pos > text_start || tokens.len() == first {
            tokens.push(Token::new(TokenKind::Text, text_start, self.pos - text_start));
        }

        // Skip the close brace.
        self.pos += 1;
        self.check_word_end("extra characters after close-brace")
    }

    /// Parses a run of text, backslash, variable, and command tokens up to the stop
    /// condition, which is not consumed.
    fn parse_tokens(&mut self, tokens: &mut Vec<Token>, stop: Stop) -> Result<(), Exception> {
        let flags = self.subst_flags.unwrap_or_default();
        let mut text_start = self.pos;

        macro_rules! flush_text {
            () => {
                if self.pos > text_start {
                    tokens.push(Token::new(TokenKind::Text, text_start, self.pos - text_start));
                }
            };
        }

        while let Some(ch) = self.peek() {
            match (ch, stop) {
                (b' ' | b'\t' | b'\r' | b'\n' | b';', Stop::BareWord) => break,
                (b']', Stop::BareWord) if self.nested => break,
                (b'"', Stop::Quote) => break,
                (b')', Stop::Paren) => break,
                (b'\\', _) if stop == Stop::BareWord && self.at_backslash_newline() => break,
                (b'\\', _) if !flags.no_backslashes => {
                    flush_text!();
                    let (_, len) = util::backslash_subst(self.source, self.pos);
                    let len = len.min(self.end - self.pos);
                    tokens.push(Token::new(TokenKind::Backslash, self.pos, len));
                    self.pos += len;
                    text_start = self.pos;
                }
                (b'$', _) if !flags.no_variables => {
                    let save = tokens.len();
                    let dollar = self.pos;
                    flush_text!();
                    if self.parse_variable(tokens)? {
                        text_start = self.pos;
                    } else {
                        // Not a variable reference: the dollar sign is plain text.
                        tokens.truncate(save);
                        self.pos = dollar + 1;
                    }
                }
                (b'[', _) if !flags.no_commands => {
                    flush_text!();
                    self.parse_command_subst(tokens)?;
                    text_start = self.pos;
                }
                _ => self.pos += 1,
            }
        }

        flush_text!();

        if self.peek().is_none() {
            match stop {
                Stop::Quote => return molt_err!("missing \""),
                Stop::Paren => return molt_err!("missing )"),
                _ => (),
            }
        }

        Ok(())
    }

    /// Parses a variable reference at `$`.  Returns false, consuming nothing, if the
    /// dollar sign isn't followed by a variable name.
    fn parse_variable(&mut self, tokens: &mut Vec<Token>) -> Result<bool, Exception> {
        let start = self.pos;
        let var_index = tokens.len();
        tokens.push(Token::new(TokenKind::Variable, start, 0));
        self.pos += 1;

        if self.peek() == Some(b'{') {
            let name_start = self.pos + 1;
            match self.source[name_start..self.end].find('}') {
                Some(len) => {
                    tokens.push(Token::new(TokenKind::Text, name_start, len));
                    self.pos = name_start + len + 1;
                }
                None => return molt_err!("missing close-brace for variable name"),
            }
        } else {
            let name_start = self.pos;
            loop {
                match self.peek() {
                    Some(ch) if ch.is_ascii_alphanumeric() || ch == b'_' => self.pos += 1,
                    Some(b':') if self.peek_at(1) == Some(b':') => {
                        self.pos += 2;
                        while self.peek() == Some(b':') {
                            self.pos += 1;
                        }
                    }
                    Some(ch) if ch >= 0x80 => {
                        // Non-ASCII letters are name characters too.
                        let ch = self.source[self.pos..].chars().next().unwrap_or(' ');
                        if ch.is_alphanumeric() {
                            self.pos += ch.len_utf8();
                        } else {
                            break;
                        }
                    }
                    _ => break,
                }
            }

            if self.pos == name_start {
                return Ok(false);
            }

            tokens.push(Token::new(TokenKind::Text, name_start, self.pos - name_start));

            if self.peek() == Some(b'(') {
                self.pos += 1;
                let index_start = tokens.len();
                self.parse_tokens(tokens, Stop::Paren)?;
                if tokens.len() == index_start {
                    tokens.push(Token::new(TokenKind::Text, self.pos, 0));
                }
                // Skip the close paren.
                self.pos += 1;
            }
        }

        tokens[var_index].len = self.pos - start;
        tokens[var_index].num_components = tokens.len() - var_index - 1;
        Ok(true)
    }

    /// Parses a bracketed command substitution, producing a single command token
    /// that includes the brackets.
    fn parse_command_subst(&mut self, tokens: &mut Vec<Token>) -> Result<(), Exception> {
        let start = self.pos;
        self.pos += 1;

        let saved_flags = self.subst_flags.take();
        self.parse_script(true)?;
        self.subst_flags = saved_flags;

        // parse_script(true) stops at the close bracket.
        self.pos += 1;
        tokens.push(Token::new(TokenKind::Command, start, self.pos - start));
        Ok(())
    }
}
