//! Compiler for the `string` ensemble.  Only the common subcommands with plain
//! arguments are compiled; options such as `-nocase` and `-length` are generally left
//! to the command.

use crate::compile::Compiled;
use crate::compile::CompileError;
use crate::compile::Compiler;
use crate::compile::Opcode;
use crate::token::ParsedCommand;
use crate::util::IndexSpec;
use crate::util::StringClass;

/// The characters `string trim` removes by default.
pub(crate) const DEFAULT_TRIM: &str = " \t\n\r\x0b\x0c\0";

/// # string *subcommand* ?*arg* ...?
pub(crate) fn compile_string(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    if cmd.num_words() < 2 {
        return Ok(Compiled::Decline);
    }
    let Some(subcommand) = c.literal(cmd, 1) else {
        return Ok(Compiled::Decline);
    };
    let argc = cmd.num_words() - 2;

    match (subcommand.as_str(), argc) {
        ("length", 1) => simple(c, cmd, Opcode::StrLen),
        ("index", 2) => simple(c, cmd, Opcode::StrIndex),
        ("equal", 2) => simple(c, cmd, Opcode::StrEq),
        ("compare", 2) => simple(c, cmd, Opcode::StrCmp),
        ("first", 2) => simple(c, cmd, Opcode::StrFind),
        ("last", 2) => simple(c, cmd, Opcode::StrFindLast),
        ("toupper", 1) => simple(c, cmd, Opcode::StrUpper),
        ("tolower", 1) => simple(c, cmd, Opcode::StrLower),
        ("totitle", 1) => simple(c, cmd, Opcode::StrTitle),
        ("match", 2) | ("match", 3) => compile_match(c, cmd),
        ("range", 3) => compile_range(c, cmd),
        ("map", 2) => compile_map(c, cmd),
        ("trim", 1) | ("trim", 2) => compile_trim(c, cmd, Opcode::StrTrim),
        ("trimleft", 1) | ("trimleft", 2) => compile_trim(c, cmd, Opcode::StrTrimLeft),
        ("trimright", 1) | ("trimright", 2) => compile_trim(c, cmd, Opcode::StrTrimRight),
        ("is", 2) | ("is", 3) => compile_is(c, cmd),
        ("replace", 3) | ("replace", 4) => compile_replace(c, cmd),
        _ => Ok(Compiled::Decline),
    }
}

/// Pushes the arguments and applies the operation.
fn simple(c: &mut Compiler, cmd: &ParsedCommand, op: Opcode) -> Result<Compiled, CompileError> {
    for i in 2..cmd.num_words() {
        c.compile_word(cmd, i)?;
    }
    c.env.emit(op);
    Ok(Compiled::Done)
}

/// # string match ?-nocase? *pattern* *string*
fn compile_match(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let mut first = 2;
    let mut nocase = 0;

    if cmd.num_words() == 5 {
        if c.literal(cmd, 2).as_deref() != Some("-nocase") {
            return Ok(Compiled::Decline);
        }
        first = 3;
        nocase = 1;
    }

    c.compile_word(cmd, first)?;
    c.compile_word(cmd, first + 1)?;
    c.env.emit_int1(Opcode::StrMatch, nocase);
    Ok(Compiled::Done)
}

/// # string range *string* *first* *last*
///
/// Literal indices are encoded in the instruction.
fn compile_range(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let encoded = literal_index(c, cmd, 3).zip(literal_index(c, cmd, 4));

    c.compile_word(cmd, 2)?;
    match encoded {
        Some((first, last)) => {
            let first = first.encode();
            let last = last.encode();
            match first.zip(last) {
                Some((first, last)) => {
                    c.env.emit_with(Opcode::StrRangeImm, [first as i64, last as i64]);
                }
                None => {
                    c.compile_word(cmd, 3)?;
                    c.compile_word(cmd, 4)?;
                    c.env.emit(Opcode::StrRange);
                }
            }
        }
        None => {
            c.compile_word(cmd, 3)?;
            c.compile_word(cmd, 4)?;
            c.env.emit(Opcode::StrRange);
        }
    }
    Ok(Compiled::Done)
}

/// The literal index in word `index`, if it's literal and valid.
fn literal_index(c: &Compiler, cmd: &ParsedCommand, index: usize) -> Option<IndexSpec> {
    IndexSpec::parse(&c.literal(cmd, index)?).ok()
}

/// # string map *mapping* *string*
///
/// Only a literal mapping of a single pair is compiled.
fn compile_map(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let Some(mapping) = c.literal_list(cmd, 2) else {
        return Ok(Compiled::Decline);
    };
    if mapping.len() != 2 || mapping[0].0.is_empty() {
        return Ok(Compiled::Decline);
    }

    c.env.push_literal(&mapping[0].0);
    c.env.push_literal(&mapping[1].0);
    c.compile_word(cmd, 3)?;
    c.env.emit(Opcode::StrMap);
    Ok(Compiled::Done)
}

/// # string trim *string* ?*chars*?
fn compile_trim(c: &mut Compiler, cmd: &ParsedCommand, op: Opcode) -> Result<Compiled, CompileError> {
    c.compile_word(cmd, 2)?;
    if cmd.num_words() == 4 {
        c.compile_word(cmd, 3)?;
    } else {
        c.env.push_literal(DEFAULT_TRIM);
    }
    c.env.emit(op);
    Ok(Compiled::Done)
}

/// # string is *class* ?-strict? *string*
fn compile_is(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let Some(class) = c.literal(cmd, 2) else {
        return Ok(Compiled::Decline);
    };
    let Ok(class) = StringClass::from_name(&class) else {
        return Ok(Compiled::Decline);
    };

    let mut strict = 0;
    if cmd.num_words() == 5 {
        if c.literal(cmd, 3).as_deref() != Some("-strict") {
            return Ok(Compiled::Decline);
        }
        strict = 1;
    }

    c.compile_word(cmd, cmd.num_words() - 1)?;
    c.env.emit_with(Opcode::StrIs, [class.code() as i64, strict]);
    Ok(Compiled::Done)
}

/// # string replace *string* *first* *last* ?*newstring*?
///
/// When the literal indices provably select nothing, the string is returned as is.
fn compile_replace(c: &mut Compiler, cmd: &ParsedCommand) -> Result<Compiled, CompileError> {
    let first = literal_index(c, cmd, 3);
    let last = literal_index(c, cmd, 4);

    let empty = match (first, last) {
        (Some(IndexSpec::FromStart(f)), Some(IndexSpec::FromStart(l))) => l < f || l < 0,
        (Some(IndexSpec::FromEnd(f)), Some(IndexSpec::FromEnd(l))) => l < f || f > 0,
        (Some(IndexSpec::FromEnd(f)), _) => f > 0,
        (_, Some(IndexSpec::FromStart(l))) => l < 0,
        _ => false,
    };

    c.compile_word(cmd, 2)?;

    if empty {
        // The replacement is still evaluated.
        if cmd.num_words() == 6 {
            c.compile_word(cmd, 5)?;
            c.env.emit(Opcode::Pop);
        }
        return Ok(Compiled::Done);
    }

    c.compile_word(cmd, 3)?;
    c.compile_word(cmd, 4)?;
    if cmd.num_words() == 6 {
        c.compile_word(cmd, 5)?;
    } else {
        c.env.push_literal("");
    }
    c.env.emit(Opcode::StrReplace);
    Ok(Compiled::Done)
}

#[cfg(test)]
mod tests {
    use crate::compile::compile_for_test;
    use crate::compile::ops;
    use crate::compile::Opcode;

    #[test]
    fn test_simple_subcommands() {
        let code = compile_for_test("string length abc", false);
        assert_eq!(ops(&code), vec![Opcode::Push1, Opcode::StrLen]);

        let code = compile_for_test("string toupper abc", false);
        assert_eq!(ops(&code), vec![Opcode::Push1, Opcode::StrUpper]);
    }

    #[test]
    fn test_range_immediate() {
        let code = compile_for_test("string range $s 1 end-1", false);
        let insts = code.instructions();
        let last = insts.last().unwrap();
        assert_eq!(last.op, Opcode::StrRangeImm);
        assert_eq!(last.operands, [1, -3]);

        let code = compile_for_test("string range $s $i end", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::StrRange));
    }

    #[test]
    fn test_map_single_pair() {
        let code = compile_for_test("string map {a b} $s", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::StrMap));

        let code = compile_for_test("string map {a b c d} $s", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));
    }

    #[test]
    fn test_replace_no_op() {
        let code = compile_for_test("string replace $s 5 2 x", false);
        assert!(!ops(&code).contains(&Opcode::StrReplace));

        let code = compile_for_test("string replace $s 1 2 x", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::StrReplace));
    }

    #[test]
    fn test_is() {
        let code = compile_for_test("string is integer -strict $x", false);
        let insts = code.instructions();
        assert_eq!(insts.last().unwrap().op, Opcode::StrIs);
        assert_eq!(insts.last().unwrap().operands[1], 1);

        let code = compile_for_test("string is bogus $x", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::InvokeStk1));

        // -failindex writes a variable, so the generic command handles it.
        let code = compile_for_test("string is alpha -failindex f $x", false);
        assert!(!ops(&code).contains(&Opcode::StrIs));
    }

    #[test]
    fn test_case_ranges_decline() {
        let code = compile_for_test("string toupper $s", false);
        assert_eq!(ops(&code).last(), Some(&Opcode::StrUpper));

        let code = compile_for_test("string toupper $s 1 3", false);
        assert!(!ops(&code).contains(&Opcode::StrUpper));
    }
}
