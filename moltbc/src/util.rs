//! Internal Utilities
//!
//! Character-level helpers shared by the parser, the list code, the `string` command,
//! and the compiled string instructions: backslash substitution, glob matching,
//! index parsing, and `string is` character classes.

use crate::types::*;

/// Performs backslash substitution on the sequence starting at byte `start` of `text`,
/// which must be a backslash.  Returns the substituted text and the number of bytes
/// consumed.
pub fn backslash_subst(text: &str, start: usize) -> (String, usize) {
    let rest = &text[start + 1..];
    let mut chars = rest.char_indices();

    let Some((_, ch)) = chars.next() else {
        return ("\\".into(), 1);
    };

    let simple = |c: char| (c.to_string(), 1 + c.len_utf8());

    match ch {
        'a' => ("\x07".into(), 2),
        'b' => ("\x08".into(), 2),
        'f' => ("\x0c".into(), 2),
        'n' => ("\n".into(), 2),
        'r' => ("\r".into(), 2),
        't' => ("\t".into(), 2),
        'v' => ("\x0b".into(), 2),
        'x' => hex_escape(rest, 1, 2),
        'u' => hex_escape(rest, 1, 4),
        'U' => hex_escape(rest, 1, 8),
        '\n' => {
            // Backslash-newline plus any following blanks becomes a single space.
            let skipped = rest[1..]
                .bytes()
                .take_while(|b| *b == b' ' || *b == b'\t')
                .count();
            (" ".into(), 2 + skipped)
        }
        '0'..='7' => {
            let digits: String = rest.chars().take(3).take_while(|c| c.is_digit(8)).collect();
            let code = u32::from_str_radix(&digits, 8).unwrap_or(0) & 0xff;
            let out = char::from_u32(code).map(String::from).unwrap_or_default();
            (out, 1 + digits.len())
        }
        _ => simple(ch),
    }
}

fn hex_escape(rest: &str, skip: usize, max: usize) -> (String, usize) {
    let digits: String = rest[skip..]
        .chars()
        .take(max)
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();

    if digits.is_empty() {
        // No digits: the letter stands for itself.
        return (rest[..1].into(), 2);
    }

    let code = u32::from_str_radix(&digits, 16).unwrap_or(0);
    let out = char::from_u32(code).map(String::from).unwrap_or_default();
    (out, 1 + skip + digits.len())
}

/// Substitutes every backslash sequence in `text`.
pub fn subst_backslashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while let Some(offset) = text[i..].find('\\') {
        out.push_str(&text[i..i + offset]);
        let (sub, len) = backslash_subst(text, i + offset);
        out.push_str(&sub);
        i += offset + len;
    }
    out.push_str(&text[i..]);
    out
}

//-----------------------------------------------------------------------------
// Glob matching

/// Matches `text` against a TCL glob pattern: `*`, `?`, `[chars]`, and `\x`.
pub fn glob_match(pattern: &str, text: &str, nocase: bool) -> bool {
    let fold = |c: char| {
        if nocase {
            c.to_lowercase().next().unwrap_or(c)
        } else {
            c
        }
    };
    let pat: Vec<char> = pattern.chars().map(fold).collect();
    let txt: Vec<char> = text.chars().map(fold).collect();
    glob_chars(&pat, &txt)
}

fn glob_chars(pat: &[char], txt: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);

    // Backtracking point: the pattern index after the last star, and the text index
    // it is currently matched up to.
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        if p < pat.len() {
            match pat[p] {
                '*' => {
                    star = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next_p)) = match_bracket(pat, p, txt[t]) {
                        if matched {
                            p = next_p;
                            t += 1;
                            continue;
                        }
                    }
                }
                '\\' if p + 1 < pat.len() => {
                    if pat[p + 1] == txt[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == txt[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }

        // Mismatch: retry from the last star, consuming one more text character.
        match star {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pat[p..].iter().all(|c| *c == '*')
}

/// Matches `ch` against the bracket expression starting at `pat[start] == '['`.
/// Returns whether it matched and the pattern index following the `]`, or `None`
/// if the bracket is unterminated.
fn match_bracket(pat: &[char], start: usize, ch: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let mut matched = false;

    while i < pat.len() && pat[i] != ']' {
        let mut lo = pat[i];
        if lo == '\\' && i + 1 < pat.len() {
            i += 1;
            lo = pat[i];
        }

        if i + 2 < pat.len() && pat[i + 1] == '-' && pat[i + 2] != ']' {
            let hi = pat[i + 2];
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            if lo <= ch && ch <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if lo == ch {
                matched = true;
            }
            i += 1;
        }
    }

    if i < pat.len() {
        Some((matched, i + 1))
    } else {
        None
    }
}

//-----------------------------------------------------------------------------
// Indices

/// A string or list index: `N`, `N+M`, `N-M`, `end`, `end-N`, or `end+N`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IndexSpec {
    /// An offset from the start.  Negative offsets lie before the first element.
    FromStart(MoltInt),

    /// An offset from the last element: `end` is `FromEnd(0)`, `end-1` is `FromEnd(-1)`.
    FromEnd(MoltInt),
}

/// The encoded form of "before the first element" in an index operand.
pub const INDEX_BEFORE: i32 = -1;

/// The encoded form of `end` in an index operand; `end-N` is `INDEX_END - N`.
pub const INDEX_END: i32 = -2;

/// The encoded form of "after the last element" in an index operand.
pub const INDEX_AFTER: i32 = i32::MAX;

impl IndexSpec {
    /// Parses an index, returning a TCL-style error if it's malformed.
    pub fn parse(text: &str) -> Result<Self, Exception> {
        let trimmed = text.trim();

        if let Some(rest) = trimmed.strip_prefix("end") {
            if rest.is_empty() {
                return Ok(IndexSpec::FromEnd(0));
            }
            if let Ok(offset) = parse_signed_offset(rest) {
                return Ok(IndexSpec::FromEnd(offset));
            }
        } else if let Some(pos) = trimmed[1.min(trimmed.len())..].find(&['+', '-'][..]) {
            let pos = pos + 1.min(trimmed.len());
            if let (Ok(a), Ok(b)) = (
                Value::get_int(&trimmed[..pos]),
                parse_signed_offset(&trimmed[pos..]),
            ) {
                return Ok(IndexSpec::FromStart(a + b));
            }
        } else if let Ok(int) = Value::get_int(trimmed) {
            return Ok(IndexSpec::FromStart(int));
        }

        molt_err!(
            "bad index \"{}\": must be integer?[+-]integer? or end?[+-]integer?",
            text
        )
    }

    /// Resolves the index against a sequence of length `len`.  The result may lie
    /// outside `0..len`.
    pub fn resolve(&self, len: usize) -> MoltInt {
        match self {
            IndexSpec::FromStart(offset) => *offset,
            IndexSpec::FromEnd(offset) => len as MoltInt - 1 + offset,
        }
    }

    /// Encodes the index as an instruction operand, collapsing every index before the
    /// start (or after the end) into a single marker.  Returns `None` if the offset
    /// doesn't fit.
    pub fn encode(&self) -> Option<i32> {
        match *self {
            IndexSpec::FromStart(offset) if offset < 0 => Some(INDEX_BEFORE),
            IndexSpec::FromStart(offset) => i32::try_from(offset)
                .ok()
                .filter(|code| *code != INDEX_AFTER),
            IndexSpec::FromEnd(offset) if offset > 0 => Some(INDEX_AFTER),
            IndexSpec::FromEnd(offset) => i32::try_from(offset)
                .ok()
                .and_then(|off| INDEX_END.checked_add(off))
                .filter(|code| *code > i32::MIN),
        }
    }

    /// Decodes an index operand.
    pub fn decode(code: i32) -> Self {
        match code {
            INDEX_AFTER => IndexSpec::FromEnd(1),
            INDEX_BEFORE => IndexSpec::FromStart(-1),
            code if code >= 0 => IndexSpec::FromStart(code as MoltInt),
            code => IndexSpec::FromEnd((code - INDEX_END) as MoltInt),
        }
    }
}

fn parse_signed_offset(text: &str) -> Result<MoltInt, Exception> {
    match text.as_bytes().first() {
        Some(b'+') | Some(b'-') => Value::get_int(text),
        _ => molt_err!("bad offset \"{}\"", text),
    }
}

//-----------------------------------------------------------------------------
// Character classes

/// The character classes known to `string is`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StringClass {
    Alnum,
    Alpha,
    Ascii,
    Boolean,
    Control,
    Dict,
    Digit,
    Double,
    Entier,
    False,
    Graph,
    Integer,
    List,
    Lower,
    Print,
    Punct,
    Space,
    True,
    Upper,
    WideInteger,
    Wordchar,
    Xdigit,
}

const CLASSES: [(&str, StringClass); 22] = [
    ("alnum", StringClass::Alnum),
    ("alpha", StringClass::Alpha),
    ("ascii", StringClass::Ascii),
    ("boolean", StringClass::Boolean),
    ("control", StringClass::Control),
    ("dict", StringClass::Dict),
    ("digit", StringClass::Digit),
    ("double", StringClass::Double),
    ("entier", StringClass::Entier),
    ("false", StringClass::False),
    ("graph", StringClass::Graph),
    ("integer", StringClass::Integer),
    ("list", StringClass::List),
    ("lower", StringClass::Lower),
    ("print", StringClass::Print),
    ("punct", StringClass::Punct),
    ("space", StringClass::Space),
    ("true", StringClass::True),
    ("upper", StringClass::Upper),
    ("wideinteger", StringClass::WideInteger),
    ("wordchar", StringClass::Wordchar),
    ("xdigit", StringClass::Xdigit),
];

impl StringClass {
    /// Looks up a class by name.
    pub fn from_name(name: &str) -> Result<Self, Exception> {
        match CLASSES.iter().find(|(n, _)| *n == name) {
            Some((_, class)) => Ok(*class),
            None => {
                let names: Vec<&str> = CLASSES.iter().map(|(n, _)| *n).collect();
                molt_err!(
                    "bad class \"{}\": must be {}, or {}",
                    name,
                    names[..names.len() - 1].join(", "),
                    names[names.len() - 1]
                )
            }
        }
    }

    /// The class's operand encoding.
    pub fn code(&self) -> u8 {
        CLASSES
            .iter()
            .position(|(_, class)| class == self)
            .unwrap_or(0) as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        CLASSES.get(code as usize).map(|(_, class)| *class)
    }

    /// Tests `text` for membership in the class.  The empty string is a member of
    /// every class unless `strict` is set.
    pub fn test(&self, text: &str, strict: bool) -> bool {
        self.fail_index(text, strict).is_none()
    }

    /// Returns `None` if `text` is a member of the class, else the character index at
    /// which the test failed.  Classes that test the whole value fail at 0.
    pub fn fail_index(&self, text: &str, strict: bool) -> Option<usize> {
        if text.is_empty() {
            return if strict { Some(0) } else { None };
        }

        if let Some(pred) = self.char_test() {
            return text.chars().position(|c| !pred(c));
        }

        let member = match self {
            StringClass::Boolean => Value::get_bool(text).is_ok() && !is_plain_number(text),
            StringClass::Dict => Value::from(text).as_dict().is_ok(),
            StringClass::Double => Value::get_float(text).is_ok(),
            StringClass::Entier | StringClass::Integer | StringClass::WideInteger => {
                Value::get_int(text).is_ok()
            }
            StringClass::False => matches!(Value::get_bool(text), Ok(false)),
            StringClass::List => crate::list::get_list(text).is_ok(),
            StringClass::True => matches!(Value::get_bool(text), Ok(true)),
            _ => true,
        };

        if member {
            None
        } else {
            Some(0)
        }
    }

    /// The per-character predicate, for classes that test characters one at a time.
    fn char_test(&self) -> Option<fn(char) -> bool> {
        let pred: fn(char) -> bool = match self {
            StringClass::Alnum => char::is_alphanumeric,
            StringClass::Alpha => char::is_alphabetic,
            StringClass::Ascii => |c| c.is_ascii(),
            StringClass::Control => char::is_control,
            StringClass::Digit => |c| c.is_ascii_digit(),
            StringClass::Graph => |c| !c.is_whitespace() && !c.is_control(),
            StringClass::Lower => char::is_lowercase,
            StringClass::Print => |c| !c.is_control(),
            StringClass::Punct => |c| c.is_ascii_punctuation(),
            StringClass::Space => char::is_whitespace,
            StringClass::Upper => char::is_uppercase,
            StringClass::Wordchar => |c| c.is_alphanumeric() || c == '_',
            StringClass::Xdigit => |c| c.is_ascii_hexdigit(),
            _ => return None,
        };
        Some(pred)
    }
}

// Boolean class membership accepts the boolean words and 0/1, but not arbitrary numbers.
fn is_plain_number(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed != "0" && trimmed != "1" && Value::get_float(trimmed).is_ok()
}

//-----------------------------------------------------------------------------
// Case conversion

/// Converts the first character to title case and the rest to lower case.
pub fn to_title(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backslash_subst() {
        assert_eq!(subst_backslashes("a\\nb"), "a\nb");
        assert_eq!(subst_backslashes("\\x41\\u00e9"), "Aé");
        assert_eq!(subst_backslashes("\\q"), "q");
        assert_eq!(subst_backslashes("a\\\n   b"), "a b");
        assert_eq!(subst_backslashes("\\101"), "A");
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("a*c", "abbbc", false));
        assert!(glob_match("a?c", "abc", false));
        assert!(!glob_match("a?c", "abbc", false));
        assert!(glob_match("[a-c]x", "bx", false));
        assert!(!glob_match("[a-c]x", "dx", false));
        assert!(glob_match("\\*", "*", false));
        assert!(glob_match("ABC", "abc", true));
        assert!(glob_match("*", "", false));
        assert!(glob_match("*b*", "abc", false));
    }

    #[test]
    fn test_index_parse() {
        assert_eq!(IndexSpec::parse("end"), Ok(IndexSpec::FromEnd(0)));
        assert_eq!(IndexSpec::parse("end-2"), Ok(IndexSpec::FromEnd(-2)));
        assert_eq!(IndexSpec::parse("end+1"), Ok(IndexSpec::FromEnd(1)));
        assert_eq!(IndexSpec::parse("3"), Ok(IndexSpec::FromStart(3)));
        assert_eq!(IndexSpec::parse("1+2"), Ok(IndexSpec::FromStart(3)));
        assert_eq!(IndexSpec::parse("-1"), Ok(IndexSpec::FromStart(-1)));
        assert!(IndexSpec::parse("bogus").is_err());
        assert!(IndexSpec::parse("end-x").is_err());
    }

    #[test]
    fn test_index_encoding() {
        assert_eq!(IndexSpec::FromEnd(0).encode(), Some(INDEX_END));
        assert_eq!(IndexSpec::decode(INDEX_END - 3), IndexSpec::FromEnd(-3));
        assert_eq!(IndexSpec::FromStart(-5).encode(), Some(INDEX_BEFORE));
        assert_eq!(IndexSpec::FromEnd(4).encode(), Some(INDEX_AFTER));
        assert_eq!(IndexSpec::decode(7), IndexSpec::FromStart(7));
        assert_eq!(IndexSpec::FromEnd(-2).resolve(5), 2);
    }

    #[test]
    fn test_string_classes() {
        assert!(StringClass::Integer.test("42", false));
        assert!(!StringClass::Integer.test("4x", false));
        assert!(StringClass::Alpha.test("", false));
        assert!(!StringClass::Alpha.test("", true));
        assert!(StringClass::Boolean.test("yes", true));
        assert!(!StringClass::Boolean.test("2", true));
        assert_eq!(StringClass::from_code(StringClass::Space.code()), Some(StringClass::Space));
        assert!(StringClass::from_name("bogus").is_err());
    }

    #[test]
    fn test_string_class_fail_index() {
        assert_eq!(StringClass::Alpha.fail_index("ab1c", false), Some(2));
        assert_eq!(StringClass::Alpha.fail_index("abc", false), None);
        assert_eq!(StringClass::Integer.fail_index("12x", false), Some(0));
        assert_eq!(StringClass::Digit.fail_index("", true), Some(0));
        assert_eq!(StringClass::Digit.fail_index("", false), None);
    }
}
