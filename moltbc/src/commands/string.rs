//! The `string` ensemble, and the regular expression commands `regexp` and `regsub`.

use crate::check_args;
use crate::compile::DEFAULT_TRIM;
use crate::execute::string_find;
use crate::execute::string_index;
use crate::execute::string_range;
use crate::execute::string_replace;
use crate::interp::Interp;
use crate::types::*;
use crate::util;
use crate::util::IndexSpec;
use crate::util::StringClass;
use std::cmp::Ordering;

/// # string *subcommand* ?*arg*...?
pub fn cmd_string<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> MoltOptResult {
    let subcommands = [
        Subcommand("cat", cmd_string_cat),
        Subcommand("compare", cmd_string_compare),
        Subcommand("equal", cmd_string_equal),
        Subcommand("first", cmd_string_first),
        Subcommand("index", cmd_string_index),
        Subcommand("is", cmd_string_is),
        Subcommand("last", cmd_string_last),
        Subcommand("length", cmd_string_length),
        Subcommand("map", cmd_string_map),
        Subcommand("match", cmd_string_match),
        Subcommand("range", cmd_string_range),
        Subcommand("repeat", cmd_string_repeat),
        Subcommand("replace", cmd_string_replace),
        Subcommand("reverse", cmd_string_reverse),
        Subcommand("tolower", cmd_string_tolower),
        Subcommand("totitle", cmd_string_totitle),
        Subcommand("toupper", cmd_string_toupper),
        Subcommand("trim", cmd_string_trim),
        Subcommand("trimleft", cmd_string_trimleft),
        Subcommand("trimright", cmd_string_trimright),
    ];
    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

fn cmd_string_cat<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    let text: String = argv[2..].iter().map(|arg| arg.as_str()).collect();
    molt_opt_ok!(text)
}

/// Parses the `-nocase` and `-length` options of `string compare` and `string equal`.
fn compare_options(opts: &[Value]) -> Result<(bool, Option<usize>), Exception> {
    let mut nocase = false;
    let mut length = None;
    let mut iter = opts.iter();

    while let Some(opt) = iter.next() {
        match opt.as_str() {
            "-nocase" => nocase = true,
            "-length" => {
                let Some(value) = iter.next() else {
                    return molt_err!("wrong # args: should be \"-length int\"");
                };
                let value = value.as_int()?;
                length = if value >= 0 { Some(value as usize) } else { None };
            }
            _ => return molt_err!("bad option \"{}\": must be -nocase or -length", opt),
        }
    }

    Ok((nocase, length))
}

/// Prepares a string for comparison: truncated to `length` characters, and folded
/// to lower case with `nocase`.
fn comparable(text: &str, nocase: bool, length: Option<usize>) -> String {
    let text: String = match length {
        Some(length) => text.chars().take(length).collect(),
        None => text.into(),
    };
    if nocase {
        text.to_lowercase()
    } else {
        text
    }
}

/// # string compare ?-nocase? ?-length *length*? *string1* *string2*
fn cmd_string_compare<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 7, "?-nocase? ?-length int? string1 string2")?;

    let n = argv.len();
    let (nocase, length) = compare_options(&argv[2..n - 2])?;
    let a = comparable(argv[n - 2].as_str(), nocase, length);
    let b = comparable(argv[n - 1].as_str(), nocase, length);

    let result: MoltInt = match a.cmp(&b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    molt_opt_ok!(result)
}

/// # string equal ?-nocase? ?-length *length*? *string1* *string2*
fn cmd_string_equal<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 7, "?-nocase? ?-length int? string1 string2")?;

    let n = argv.len();
    let (nocase, length) = compare_options(&argv[2..n - 2])?;
    let a = comparable(argv[n - 2].as_str(), nocase, length);
    let b = comparable(argv[n - 1].as_str(), nocase, length);
    molt_opt_ok!(a == b)
}

/// # string first *needleString* *haystackString* ?*startIndex*?
fn cmd_string_first<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 5, "needleString haystackString ?startIndex?")?;

    let needle = argv[2].as_str();
    let haystack = argv[3].as_str();

    let start = match argv.get(4) {
        Some(index) => IndexSpec::parse(index.as_str())?
            .resolve(haystack.chars().count())
            .max(0) as usize,
        None => 0,
    };

    let offset = haystack
        .char_indices()
        .nth(start)
        .map(|(byte, _)| byte)
        .unwrap_or(haystack.len());
    let found = string_find(needle, &haystack[offset..], false);

    molt_opt_ok!(if found < 0 { found } else { found + start as MoltInt })
}

/// # string last *needleString* *haystackString* ?*lastIndex*?
///
/// The last occurrence starting at or before *lastIndex*.
fn cmd_string_last<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 5, "needleString haystackString ?lastIndex?")?;

    let needle = argv[2].as_str();
    let haystack = argv[3].as_str();

    let Some(index) = argv.get(4) else {
        return molt_opt_ok!(string_find(needle, haystack, true));
    };

    let last = IndexSpec::parse(index.as_str())?.resolve(haystack.chars().count());
    if last < 0 {
        return molt_opt_ok!(-1);
    }

    let end = last as usize + needle.chars().count();
    let prefix: String = haystack.chars().take(end).collect();
    molt_opt_ok!(string_find(needle, &prefix, true))
}

/// # string index *string* *charIndex*
fn cmd_string_index<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 4, "string charIndex")?;
    let index = IndexSpec::parse(argv[3].as_str())?;
    molt_opt_ok!(string_index(argv[2].as_str(), &index))
}

/// # string is *class* ?-strict? ?-failindex *varName*? *string*
///
/// On failure, `-failindex` stores the index of the first character that isn't in
/// the class.
fn cmd_string_is<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 7, "class ?-strict? ?-failindex var? str")?;

    let class = StringClass::from_name(argv[2].as_str())?;
    let mut strict = false;
    let mut fail_var = None;

    let last = argv.len() - 1;
    let mut i = 3;
    while i < last {
        match argv[i].as_str() {
            "-strict" => strict = true,
            "-failindex" if i + 1 < last => {
                i += 1;
                fail_var = Some(&argv[i]);
            }
            "-failindex" => {
                return molt_throw!("TCL WRONGARGS" => "wrong # args: should be \"string is class ?-strict? ?-failindex var? str\"")
            }
            opt => return molt_err!("bad option \"{}\": must be -strict or -failindex", opt),
        }
        i += 1;
    }

    match class.fail_index(argv[last].as_str(), strict) {
        None => molt_opt_ok!(true),
        Some(index) => {
            if let Some(var) = fail_var {
                interp.set_var(var, Value::from(index as MoltInt))?;
            }
            molt_opt_ok!(false)
        }
    }
}

/// # string length *string*
fn cmd_string_length<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "string")?;
    molt_opt_ok!(argv[2].as_str().chars().count() as MoltInt)
}

/// # string map ?-nocase? *mapping* *string*
///
/// At each position, the first key in the mapping that matches is replaced by its
/// value; the replacement isn't scanned again.
fn cmd_string_map<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 5, "?-nocase? charMap string")?;

    let nocase = match argv.len() {
        5 if argv[2].as_str() == "-nocase" => true,
        5 => return molt_err!("bad option \"{}\": must be -nocase", argv[2]),
        _ => false,
    };

    let mapping = argv[argv.len() - 2].as_list()?;
    if mapping.len() % 2 != 0 {
        return molt_err!("char map list unbalanced");
    }

    let mut rest = argv[argv.len() - 1].as_str();
    let mut result = String::new();

    'outer: while let Some(ch) = rest.chars().next() {
        for pair in mapping.chunks(2) {
            let key = pair[0].as_str();
            if !key.is_empty() && has_prefix(rest, key, nocase) {
                result.push_str(pair[1].as_str());
                rest = &rest[key.len()..];
                continue 'outer;
            }
        }
        result.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    molt_opt_ok!(result)
}

fn has_prefix(text: &str, prefix: &str, nocase: bool) -> bool {
    match text.get(..prefix.len()) {
        Some(head) if nocase => head.to_lowercase() == prefix.to_lowercase(),
        Some(head) => head == prefix,
        None => false,
    }
}

/// # string match ?-nocase? *pattern* *string*
fn cmd_string_match<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 5, "?-nocase? pattern string")?;

    let nocase = match argv.len() {
        5 if argv[2].as_str() == "-nocase" => true,
        5 => return molt_err!("bad option \"{}\": must be -nocase", argv[2]),
        _ => false,
    };

    let n = argv.len();
    molt_opt_ok!(util::glob_match(argv[n - 2].as_str(), argv[n - 1].as_str(), nocase))
}

/// # string range *string* *first* *last*
fn cmd_string_range<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 5, 5, "string first last")?;
    let first = IndexSpec::parse(argv[3].as_str())?;
    let last = IndexSpec::parse(argv[4].as_str())?;
    molt_opt_ok!(string_range(argv[2].as_str(), &first, &last))
}

/// # string repeat *string* *count*
fn cmd_string_repeat<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 4, 4, "string count")?;
    let count = argv[3].as_int()?.max(0) as usize;
    molt_opt_ok!(argv[2].as_str().repeat(count))
}

/// # string replace *string* *first* *last* ?*newString*?
fn cmd_string_replace<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 5, 6, "string first last ?string?")?;

    let first = IndexSpec::parse(argv[3].as_str())?;
    let last = IndexSpec::parse(argv[4].as_str())?;
    let new = argv.get(5).map(|v| v.as_str()).unwrap_or("");

    match string_replace(argv[2].as_str(), &first, &last, new) {
        Some(text) => molt_opt_ok!(text),
        None => molt_opt_ok!(argv[2].clone()),
    }
}

fn cmd_string_reverse<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    check_args(2, argv, 3, 3, "string")?;
    let text: String = argv[2].as_str().chars().rev().collect();
    molt_opt_ok!(text)
}

/// # string tolower *string* ?*first*? ?*last*?
fn cmd_string_tolower<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    convert_case(argv, str::to_lowercase)
}

/// # string totitle *string* ?*first*? ?*last*?
fn cmd_string_totitle<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    convert_case(argv, util::to_title)
}

/// # string toupper *string* ?*first*? ?*last*?
fn cmd_string_toupper<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    convert_case(argv, str::to_uppercase)
}

/// Converts the characters from *first* to *last*, or all of them.  A lone *first*
/// converts just that character; an empty or inverted range changes nothing.
fn convert_case(argv: &[Value], convert: fn(&str) -> String) -> MoltOptResult {
    check_args(2, argv, 3, 5, "string ?first? ?last?")?;
    let text = argv[2].as_str();

    if argv.len() == 3 {
        return molt_opt_ok!(convert(text));
    }

    let len = text.chars().count();
    let first = IndexSpec::parse(argv[3].as_str())?.resolve(len);
    let last = match argv.get(4) {
        Some(last) => IndexSpec::parse(last.as_str())?.resolve(len),
        None => first,
    };
    let first = first.max(0);
    let last = last.min(len as MoltInt - 1);

    if last < first {
        return molt_opt_ok!(argv[2].clone());
    }

    let byte_offset = |chars: usize| {
        text.char_indices()
            .nth(chars)
            .map(|(offset, _)| offset)
            .unwrap_or(text.len())
    };
    let start = byte_offset(first as usize);
    let end = byte_offset(last as usize + 1);

    let mut result = String::with_capacity(text.len());
    result.push_str(&text[..start]);
    result.push_str(&convert(&text[start..end]));
    result.push_str(&text[end..]);
    molt_opt_ok!(result)
}

/// Which end(s) of the string to trim.
#[derive(Clone, Copy)]
enum Trim {
    Both,
    Left,
    Right,
}

fn trim(argv: &[Value], which: Trim) -> MoltOptResult {
    check_args(2, argv, 3, 4, "string ?chars?")?;

    let set = argv.get(3).map(|v| v.as_str()).unwrap_or(DEFAULT_TRIM);
    let pred = |c: char| set.contains(c);
    let text = argv[2].as_str();

    let trimmed = match which {
        Trim::Both => text.trim_matches(pred),
        Trim::Left => text.trim_start_matches(pred),
        Trim::Right => text.trim_end_matches(pred),
    };
    molt_opt_ok!(trimmed)
}

fn cmd_string_trim<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    trim(argv, Trim::Both)
}

fn cmd_string_trimleft<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    trim(argv, Trim::Left)
}

fn cmd_string_trimright<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
    trim(argv, Trim::Right)
}

//-----------------------------------------------------------------------------
// Regular expressions

/// The options shared by `regexp` and `regsub`.
#[derive(Default)]
struct RegexpOptions {
    all: bool,
    nocase: bool,
    indices: bool,
}

/// Parses leading options, returning them and the index of the first argument.
fn regexp_options(argv: &[Value], allowed: &[&str]) -> Result<(RegexpOptions, usize), Exception> {
    let mut opts = RegexpOptions::default();
    let mut i = 1;

    while i < argv.len() {
        let opt = argv[i].as_str();
        if !opt.starts_with('-') {
            break;
        }
        i += 1;
        match opt {
            "--" => break,
            "-all" if allowed.contains(&opt) => opts.all = true,
            "-nocase" if allowed.contains(&opt) => opts.nocase = true,
            "-indices" if allowed.contains(&opt) => opts.indices = true,
            _ => {
                return molt_err!(
                    "bad option \"{}\": must be {}, or --",
                    opt,
                    allowed.join(", ")
                )
            }
        }
    }

    Ok((opts, i))
}

cfg_if::cfg_if! {
    if #[cfg(feature = "regexp")] {
        /// The character index of a byte offset.
        fn char_index(text: &str, byte: usize) -> MoltInt {
            text[..byte].chars().count() as MoltInt
        }

        /// # regexp ?-all? ?-nocase? ?-indices? ?--? *exp* *string* ?*matchVar*? ?*subMatchVar* ...?
        ///
        /// Returns 1 if the expression matches, or with `-all` the number of matches.
        /// The match variables receive the (last) match and its groups, or with
        /// `-indices` their character ranges.
        pub fn cmd_regexp<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
            let (opts, first) = regexp_options(argv, &["-all", "-indices", "-nocase"])?;
            if argv.len() < first + 2 {
                return molt_throw!(
                    "TCL WRONGARGS",
                    "wrong # args: should be \"regexp ?-option ...? exp string ?matchVar? ?subMatchVar ...?\""
                );
            }

            let re = interp.regex(argv[first].as_str(), opts.nocase)?;
            let text = argv[first + 1].as_str();
            let vars = &argv[first + 2..];

            let mut count = 0;
            let mut last = None;
            for caps in re.captures_iter(text) {
                count += 1;
                last = Some(caps);
                if !opts.all {
                    break;
                }
            }

            if let Some(caps) = last {
                for (i, var_name) in vars.iter().enumerate() {
                    let value = match caps.get(i) {
                        Some(m) if opts.indices => Value::from(vec![
                            Value::from(char_index(text, m.start())),
                            Value::from(char_index(text, m.end()) - 1),
                        ]),
                        Some(m) => Value::from(m.as_str()),
                        None if opts.indices => Value::from("-1 -1"),
                        None => Value::empty(),
                    };
                    interp.set_var(var_name, value)?;
                }
            }

            molt_opt_ok!(count as MoltInt)
        }

        /// Converts a TCL substitution spec, with `&` and `\N`, into the replacement
        /// syntax of the `regex` crate.
        fn replacement(spec: &str) -> String {
            let mut result = String::new();
            let mut chars = spec.chars().peekable();

            while let Some(ch) = chars.next() {
                match ch {
                    '&' => result.push_str("${0}"),
                    '$' => result.push_str("$$"),
                    '\\' => match chars.peek().copied() {
                        Some(d) if d.is_ascii_digit() => {
                            chars.next();
                            result.push_str(&format!("${{{}}}", d));
                        }
                        Some(c @ ('&' | '\\')) => {
                            chars.next();
                            result.push(c);
                        }
                        _ => result.push('\\'),
                    },
                    _ => result.push(ch),
                }
            }

            result
        }

        /// # regsub ?-all? ?-nocase? ?--? *exp* *string* *subSpec* ?*varName*?
        ///
        /// Returns the substituted string, or, given *varName*, stores it there and
        /// returns the number of substitutions.
        pub fn cmd_regsub<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
            let (opts, first) = regexp_options(argv, &["-all", "-nocase"])?;
            let argc = argv.len() - first;
            if !(3..=4).contains(&argc) {
                return molt_throw!(
                    "TCL WRONGARGS",
                    "wrong # args: should be \"regsub ?-option ...? exp string subSpec ?varName?\""
                );
            }

            let re = interp.regex(argv[first].as_str(), opts.nocase)?;
            let text = argv[first + 1].as_str();
            let rep = replacement(argv[first + 2].as_str());

            let (count, result) = if opts.all {
                (re.find_iter(text).count(), re.replace_all(text, rep.as_str()))
            } else {
                (re.is_match(text) as usize, re.replace(text, rep.as_str()))
            };

            match argv.get(first + 3) {
                Some(var_name) => {
                    interp.set_var(var_name, Value::from(result.into_owned()))?;
                    molt_opt_ok!(count as MoltInt)
                }
                None => molt_opt_ok!(result.into_owned()),
            }
        }
    } else {
        pub fn cmd_regexp<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
            regexp_options(argv, &["-all", "-indices", "-nocase"])?;
            molt_err!("regular expressions are not supported")
        }

        pub fn cmd_regsub<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> MoltOptResult {
            regexp_options(argv, &["-all", "-nocase"])?;
            molt_err!("regular expressions are not supported")
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::interp::Interp;
    use crate::types::*;

    /// An interpreter without the `string` compilers, so the commands themselves run.
    fn generic_interp() -> Interp<()> {
        let mut interp = Interp::new();
        interp.forget_compiler("string");
        interp.forget_compiler("regexp");
        interp.forget_compiler("regsub");
        interp
    }

    fn run(interp: &mut Interp<()>, script: &str) -> MoltResult {
        interp.eval(script, &mut ())
    }

    fn generic(script: &str) -> MoltResult {
        run(&mut generic_interp(), script)
    }

    #[test]
    fn test_compare_equal() {
        assert_eq!(generic("string compare a b"), Ok(Value::from(-1)));
        assert_eq!(generic("string compare -nocase ABC abc"), Ok(Value::from(0)));
        assert_eq!(generic("string compare -length 2 abx aby"), Ok(Value::from(0)));
        assert_eq!(generic("string equal -nocase A a"), Ok(Value::from(true)));
        assert_eq!(generic("string equal a b"), Ok(Value::from(false)));
        assert!(generic("string equal -bogus a b").is_err());
    }

    #[test]
    fn test_first_last() {
        assert_eq!(generic("string first b abcabc"), Ok(Value::from(1)));
        assert_eq!(generic("string first b abcabc 2"), Ok(Value::from(4)));
        assert_eq!(generic("string first z abc"), Ok(Value::from(-1)));
        assert_eq!(generic("string last b abcabc"), Ok(Value::from(4)));
        assert_eq!(generic("string last b abcabc 3"), Ok(Value::from(1)));
    }

    #[test]
    fn test_index_range_replace() {
        assert_eq!(generic("string index abc end"), Ok(Value::from("c")));
        assert_eq!(generic("string range abcdef 1 end-1"), Ok(Value::from("bcde")));
        assert_eq!(generic("string replace abcdef 1 2 XY"), Ok(Value::from("aXYdef")));
        assert_eq!(generic("string replace abc 5 6 XY"), Ok(Value::from("abc")));
        assert_eq!(generic("string length héllo"), Ok(Value::from(5)));
    }

    #[test]
    fn test_is() {
        assert_eq!(generic("string is integer 12"), Ok(Value::from(true)));
        assert_eq!(generic("string is integer {}"), Ok(Value::from(true)));
        assert_eq!(generic("string is integer -strict {}"), Ok(Value::from(false)));
        assert!(generic("string is bogus x").is_err());

        let mut interp = generic_interp();
        assert_eq!(
            run(&mut interp, "string is alpha -failindex f ab1c"),
            Ok(Value::from(false))
        );
        assert_eq!(run(&mut interp, "set f"), Ok(Value::from(2)));
        assert_eq!(
            run(&mut interp, "string is digit -failindex g -strict {}"),
            Ok(Value::from(false))
        );
        assert_eq!(run(&mut interp, "set g"), Ok(Value::from(0)));
        assert_eq!(run(&mut interp, "string is alpha -failindex h abc"), Ok(Value::from(true)));
        assert_eq!(run(&mut interp, "info exists h"), Ok(Value::from(false)));
    }

    #[test]
    fn test_map() {
        assert_eq!(generic("string map {a 1 b 2} abcab"), Ok(Value::from("12c12")));
        assert_eq!(generic("string map {ab X a Y} aab"), Ok(Value::from("YX")));
        assert_eq!(generic("string map -nocase {A x} aA"), Ok(Value::from("xx")));
        assert_eq!(generic("string map {a b b a} ab"), Ok(Value::from("ba")));
        assert!(generic("string map {a} abc").is_err());
    }

    #[test]
    fn test_case_trim() {
        assert_eq!(generic("string toupper abc"), Ok(Value::from("ABC")));
        assert_eq!(generic("string totitle hELLO"), Ok(Value::from("Hello")));
        assert_eq!(generic("string trim {  a  }"), Ok(Value::from("a")));
        assert_eq!(generic("string trimleft xxaxx x"), Ok(Value::from("axx")));
        assert_eq!(generic("string trimright xxaxx x"), Ok(Value::from("xxa")));
        assert_eq!(generic("string match -nocase A* abc"), Ok(Value::from(true)));
        assert_eq!(generic("string repeat ab 3"), Ok(Value::from("ababab")));
        assert_eq!(generic("string reverse abc"), Ok(Value::from("cba")));
    }

    #[test]
    fn test_case_ranges() {
        assert_eq!(generic("string toupper abcdef 1 3"), Ok(Value::from("aBCDef")));
        assert_eq!(generic("string toupper abcdef 2"), Ok(Value::from("abCdef")));
        assert_eq!(generic("string tolower ABCDEF end-1 end"), Ok(Value::from("ABCDef")));
        assert_eq!(generic("string totitle {hello world} 6 end"), Ok(Value::from("hello World")));
        assert_eq!(generic("string toupper abc -5 10"), Ok(Value::from("ABC")));
        assert_eq!(generic("string toupper abc 2 1"), Ok(Value::from("abc")));
        assert_eq!(generic("string toupper abc 5"), Ok(Value::from("abc")));
        assert!(generic("string toupper abc x").is_err());
    }

    #[cfg(feature = "regexp")]
    #[test]
    fn test_regexp() {
        assert_eq!(generic("regexp {a+b} xaab"), Ok(Value::from(1)));
        assert_eq!(generic("regexp -nocase {A+B} xaab"), Ok(Value::from(1)));
        assert_eq!(generic("regexp {z} abc"), Ok(Value::from(0)));
        assert_eq!(
            generic("regexp {(\\w+)@(\\w+)} {mail bob@host now} m user host; list $m $user $host"),
            Ok(Value::from("bob@host bob host"))
        );
        assert_eq!(
            generic("regexp -indices {b+} abbc r; set r"),
            Ok(Value::from("1 2"))
        );
        assert_eq!(generic("regexp -all {a} banana"), Ok(Value::from(3)));
    }

    #[cfg(feature = "regexp")]
    #[test]
    fn test_regsub() {
        assert_eq!(generic("regsub {a} banana o"), Ok(Value::from("bonana")));
        assert_eq!(generic("regsub -all {a} banana o"), Ok(Value::from("bonono")));
        assert_eq!(generic("regsub -all {(a)(n)} banana {\\2\\1}"), Ok(Value::from("bnanaa")));
        assert_eq!(generic("regsub -all {n} banana {<&>}"), Ok(Value::from("ba<n>a<n>a")));
        assert_eq!(generic("regsub -all {a} banana {$} r; set r"), Ok(Value::from("b$n$n$")));
        assert_eq!(generic("regsub -all {a} banana o r"), Ok(Value::from(3)));
    }
}
