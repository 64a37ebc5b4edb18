//! Compilers for `regexp` and `regsub`.
//!
//! Many patterns in practice are plain strings, perhaps anchored, perhaps with `.` and
//! `.*` wildcards.  Those are compiled to string equality or glob matching, which need
//! no regular expression engine at all.

use crate::compile::Compiled;
use crate::compile::CompileError;
use crate::compile::Compiler;
use crate::compile::Opcode;
use crate::token::ParsedCommand;

/// A regular expression rewritten as a glob pattern.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct GlobForm {
    pub glob: String,

    /// The regular expression matches exactly one string, `glob` unescaped.
    pub exact: Option<String>,
}

/// Rewrites a regular expression as an equivalent glob pattern, if it has one.
pub(crate) fn regexp_to_glob(pattern: &str) -> Option<GlobForm> {
    let (anchored_start, body) = match pattern.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };
    let (anchored_end, body) = match body.strip_suffix('$') {
        Some(rest) if !rest.ends_with('\\') => (true, rest),
        _ => (false, body),
    };

    let mut glob = String::new();
    let mut literal = String::new();
    let mut wild = false;
    let mut chars = body.chars().peekable();

    if !anchored_start {
        glob.push('*');
        wild = true;
    }

    while let Some(ch) = chars.next() {
        match ch {
            '.' if chars.peek() == Some(&'*') => {
                chars.next();
                glob.push('*');
                wild = true;
            }
            '.' => {
                glob.push('?');
                wild = true;
            }
            '\\' => {
                // Only escaped punctuation is a plain character.
                let next = chars.next()?;
                if next.is_alphanumeric() {
                    return None;
                }
                push_glob_literal(&mut glob, next);
                literal.push(next);
            }
            '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' => return None,
            ch => {
                push_glob_literal(&mut glob, ch);
                literal.push(ch);
            }
        }
    }

    if !anchored_end {
        glob.push('*');
        wild = true;
    }

    Some(GlobForm {
        glob,
        exact: if wild { None } else { Some(literal) },
    })
}

fn push_glob_literal(glob: &mut String, ch: char) {
    if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
        glob.push('\\');
    }
    glob.push(ch);
}

/// Pushes a test of the string on top of the stack against a literal regular
/// expression, leaving the string in place and a boolean above it.  Returns false if
/// the expression can't be compiled here.
pub(crate) fn emit_regexp_test(c: &mut Compiler, pattern: &str, nocase: bool) -> bool {
    match regexp_to_glob(pattern) {
        Some(GlobForm { exact: Some(text), .. }) if !nocase => {
            c.env.push_literal(&text);
            c.env.emit_int1(Opcode::Over, 1);
            c.env.emit(Opcode::StrEq);
        }
        Some(form) => {
            c.env.push_literal(&form.glob);
            c.env.emit_int1(Opcode::Over, 1);
            c.env.emit_int1(Opcode::StrMatch, nocase as u8);
        }
        None if cfg!(feature = "regexp") => {
            c.env.push_literal(pattern);
            c.env.emit_int1(Opcode::Over, 1);
            c.env.emit_int1(Opcode::Regexp, nocase as u8);
        }
        None => return false,
    }
    true
}

/// # regexp ?-nocase? *exp* *string*
///
/// Only a literal expression, with no match variables, is compiled.
pub(crate) fn compile_regexp(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let (nocase, first) = match cmd.num_words() {
        3 => (false, 1),
        4 if c.literal(cmd, 1).as_deref() == Some("-nocase") => (true, 2),
        _ => return Ok(Compiled::Decline),
    };
    let Some(pattern) = c.literal(cmd, first) else {
        return Ok(Compiled::Decline);
    };
    if pattern.starts_with('-') && first == 1 {
        // Could be an option.
        return Ok(Compiled::Decline);
    }

    c.compile_word(cmd, first + 1)?;
    if !emit_regexp_test(c, &pattern, nocase) {
        return Ok(Compiled::Decline);
    }

    // Drop the string from under the result.
    c.env.emit_int4(Opcode::Reverse, 2);
    c.env.emit(Opcode::Pop);
    Ok(Compiled::Done)
}

/// # regsub -all *exp* *string* *subSpec*
///
/// When the expression is a plain string and the replacement has no substitutions,
/// this is a string map.
pub(crate) fn compile_regsub(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    if cmd.num_words() != 5 || c.literal(cmd, 1).as_deref() != Some("-all") {
        return Ok(Compiled::Decline);
    }
    let Some(pattern) = c.literal(cmd, 2) else {
        return Ok(Compiled::Decline);
    };
    let Some(replacement) = c.literal(cmd, 4) else {
        return Ok(Compiled::Decline);
    };
    if replacement.contains(['&', '\\']) {
        return Ok(Compiled::Decline);
    }

    let Some(search) = plain_text(&pattern) else {
        return Ok(Compiled::Decline);
    };

    c.env.push_literal(&search);
    c.env.push_literal(&replacement);
    c.compile_word(cmd, 3)?;
    c.env.emit(Opcode::StrMap);
    Ok(Compiled::Done)
}

/// The text a regular expression matches, if it's unanchored, non-empty text with no
/// metacharacters.
fn plain_text(pattern: &str) -> Option<String> {
    let form = regexp_to_glob(pattern)?;
    let inner = form.glob.strip_prefix('*')?.strip_suffix('*')?;
    if inner.is_empty() || inner.contains(['*', '?']) {
        return None;
    }

    let mut text = String::new();
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            text.push(chars.next()?);
        } else {
            text.push(ch);
        }
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_for_test;
    use crate::compile::ops;

    #[test]
    fn test_regexp_to_glob() {
        assert_eq!(
            regexp_to_glob("^abc$"),
            Some(GlobForm {
                glob: "abc".into(),
                exact: Some("abc".into())
            })
        );
        assert_eq!(regexp_to_glob("a.c").map(|f| f.glob), Some("*a?c*".into()));
        assert_eq!(regexp_to_glob("^a.*").map(|f| f.glob), Some("a**".into()));
        assert_eq!(regexp_to_glob("^a\\.b$").map(|f| f.exact), Some(Some("a.b".into())));
        assert_eq!(regexp_to_glob("a+"), None);
        assert_eq!(regexp_to_glob("\\d"), None);
        assert_eq!(regexp_to_glob("a|b"), None);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(plain_text("foo"), Some("foo".into()));
        assert_eq!(plain_text("a\\.b"), Some("a.b".into()));
        assert_eq!(plain_text("^foo"), None);
        assert_eq!(plain_text("f.o"), None);
        assert_eq!(plain_text(""), None);
    }

    #[test]
    fn test_compile_regexp() {
        let code = compile_for_test("regexp {^abc$} $s", false);
        assert!(ops(&code).contains(&Opcode::StrEq));

        let code = compile_for_test("regexp {a.c} $s", false);
        assert!(ops(&code).contains(&Opcode::StrMatch));

        // Match variables are left to the command.
        let code = compile_for_test("regexp {a.c} $s m", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }

    #[cfg(feature = "regexp")]
    #[test]
    fn test_compile_regexp_engine() {
        let code = compile_for_test("regexp {a+} $s", false);
        assert!(ops(&code).contains(&Opcode::Regexp));
    }

    #[test]
    fn test_compile_regsub() {
        let code = compile_for_test("regsub -all foo $s bar", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::StrMap));

        let code = compile_for_test("regsub -all {f+} $s bar", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));

        let code = compile_for_test("regsub -all foo $s {<&>}", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }
}
