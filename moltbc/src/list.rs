//! List Parsing and Formatting
//!
//! TCL lists are strings of whitespace-separated elements, where an element containing
//! special characters is enclosed in braces or has its special characters escaped.
//! This module converts between that form and `MoltList`.  The parser can also report
//! the byte offset of each element within the source string, which the compiler uses
//! to attribute line numbers to scripts found inside list literals.

use crate::types::*;
use crate::util;

/// A list element as found in the source text: its content and where it starts.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ListElement {
    /// The element's value, after brace removal or backslash substitution.
    pub text: String,

    /// The byte offset of the element's content within the list string.  For a braced
    /// element this is the position just after the open brace.
    pub offset: usize,

    /// True if the element was written literally (braced, or bare with no backslashes),
    /// so that `text` is exactly the source text at `offset`.
    pub literal: bool,
}

/// Parses a string into a list of values.
pub fn get_list(text: &str) -> Result<MoltList, Exception> {
    Ok(parse_elements(text)?
        .into_iter()
        .map(|elem| Value::from(elem.text))
        .collect())
}

/// Parses a string into its list elements, retaining source offsets.
pub fn parse_elements(text: &str) -> Result<Vec<ListElement>, Exception> {
    let bytes = text.as_bytes();
    let mut elements = Vec::new();
    let mut i = 0;

    loop {
        while i < bytes.len() && is_list_space(bytes[i]) {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let elem = match bytes[i] {
            b'{' => {
                let (content_end, next) = match_brace(text, i)?;
                check_element_end(text, next, "braces")?;
                let elem = ListElement {
                    text: text[i + 1..content_end].into(),
                    offset: i + 1,
                    literal: true,
                };
                i = next;
                elem
            }
            b'"' => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != b'"' {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                if j >= bytes.len() {
                    return molt_err!("unmatched open quote in list");
                }
                check_element_end(text, j + 1, "quotes")?;
                let raw = &text[start..j];
                let elem = ListElement {
                    text: util::subst_backslashes(raw),
                    offset: start,
                    literal: !raw.contains('\\'),
                };
                i = j + 1;
                elem
            }
            _ => {
                let start = i;
                while i < bytes.len() && !is_list_space(bytes[i]) {
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        i += 1;
                    }
                    i += 1;
                }
                let raw = &text[start..i.min(bytes.len())];
                ListElement {
                    text: util::subst_backslashes(raw),
                    offset: start,
                    literal: !raw.contains('\\'),
                }
            }
        };

        elements.push(elem);
    }

    Ok(elements)
}

fn is_list_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c')
}

fn check_element_end(text: &str, next: usize, kind: &str) -> Result<(), Exception> {
    match text.as_bytes().get(next) {
        None => Ok(()),
        Some(byte) if is_list_space(*byte) => Ok(()),
        Some(_) => {
            let rest: String = text[next..].chars().take(1).collect();
            molt_err!(
                "list element in {} followed by \"{}\" instead of space",
                kind,
                rest
            )
        }
    }
}

/// Given the index of an open brace, returns the index of the matching close brace and
/// the index just past it.  Backslashes escape braces.
pub(crate) fn match_brace(text: &str, open: usize) -> Result<(usize, usize), Exception> {
    let bytes = text.as_bytes();
    let mut depth = 0;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((i, i + 1));
                }
            }
            _ => (),
        }
        i += 1;
    }

    molt_err!("unmatched open brace in list")
}

/// Formats a list of values as a TCL list string.
pub fn list_to_string(list: &[Value]) -> String {
    let mut out = String::new();

    for (i, item) in list.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        format_element(&mut out, item.as_str(), i == 0);
    }

    out
}

fn format_element(out: &mut String, elem: &str, first: bool) {
    if elem.is_empty() {
        out.push_str("{}");
        return;
    }

    let needs_quoting = (first && elem.starts_with('#'))
        || elem.bytes().any(|b| {
            matches!(
                b,
                b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c' | b'{' | b'}' | b'[' | b']'
                    | b'$' | b'"' | b';' | b'\\'
            )
        });

    if !needs_quoting {
        out.push_str(elem);
    } else if can_brace(elem) {
        out.push('{');
        out.push_str(elem);
        out.push('}');
    } else {
        for ch in elem.chars() {
            match ch {
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                ' ' | '{' | '}' | '[' | ']' | '$' | '"' | ';' | '\\' => {
                    out.push('\\');
                    out.push(ch);
                }
                '#' if first => out.push_str("\\#"),
                _ => out.push(ch),
            }
        }
    }
}

// Braces can quote the element if its own braces balance and it doesn't end in a
// backslash.
fn can_brace(elem: &str) -> bool {
    let bytes = elem.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                if i + 1 == bytes.len() {
                    return false;
                }
                i += 1;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => (),
        }
        i += 1;
    }

    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(text: &str) -> Vec<String> {
        get_list(text)
            .unwrap()
            .iter()
            .map(|v| v.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_get_list() {
        assert_eq!(strings("a b c"), vec!["a", "b", "c"]);
        assert_eq!(strings("  a {b c}  \"d e\" "), vec!["a", "b c", "d e"]);
        assert_eq!(strings("a\\ b c"), vec!["a b", "c"]);
        assert_eq!(strings("{a {b c}} d"), vec!["a {b c}", "d"]);
        assert!(strings("").is_empty());
    }

    #[test]
    fn test_get_list_errors() {
        assert!(get_list("a {b").is_err());
        assert!(get_list("a \"b").is_err());
        assert!(get_list("{a}b").is_err());
    }

    #[test]
    fn test_element_offsets() {
        let elems = parse_elements("a {set x 1}\n  b").unwrap();
        assert_eq!(elems.len(), 3);
        assert_eq!(elems[1].text, "set x 1");
        assert_eq!(elems[1].offset, 3);
        assert!(elems[1].literal);
        assert_eq!(elems[2].offset, 14);
    }

    #[test]
    fn test_list_to_string() {
        let list = vec![
            Value::from("a"),
            Value::from("b c"),
            Value::from(""),
            Value::from("x}"),
        ];
        assert_eq!(list_to_string(&list), "a {b c} {} x\\}");
        assert_eq!(list_to_string(&[Value::from("#x")]), "{#x}");
    }
}
