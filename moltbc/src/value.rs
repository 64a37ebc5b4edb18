//! The Value Type
//!
//! The [`Value`] struct is the standard representation of a data value in the Molt
//! language.  It represents a single immutable data value; the data is reference-counted,
//! so instances can be cloned efficiently.  Its content may be any TCL data value: a
//! number, a list, a string, a dictionary, or a script.
//!
//! # Data Representations
//!
//! Every `Value` has a string representation, and may also have a single cached
//! internal representation: an integer, a float, a list, a dictionary, a parsed
//! variable name, a compiled-local resolution, or compiled bytecode.  Either is
//! computed lazily from the other.  Asking for a different internal representation
//! replaces the cached one ("shimmering"), just as in Standard TCL.
//!
//! # Copy on Write
//!
//! `Value` is immutable as seen from the outside.  The two mutating methods,
//! [`append_str`](struct.Value.html#method.append_str) and
//! [`append_element`](struct.Value.html#method.append_element), modify the
//! shared data in place only when this `Value` holds the sole reference to it;
//! otherwise they copy first.

use crate::compile::ByteCode;
use crate::dict;
use crate::list;
use crate::types::*;
use std::cell::OnceCell;
use std::cell::RefCell;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;
use std::rc::Rc;
use std::rc::Weak;

/// The `Value` type.  See [the module level documentation](index.html) for more.
#[derive(Clone, Default)]
pub struct Value {
    inner: Rc<InnerValue>,
}

#[derive(Default)]
struct InnerValue {
    string_rep: OnceCell<String>,
    data_rep: RefCell<DataRep>,
}

/// The cached internal representation of a `Value`.
#[derive(Clone, Default)]
enum DataRep {
    #[default]
    None,
    Int(MoltInt),
    Float(MoltFloat),
    List(Rc<MoltList>),
    Dict(Rc<MoltDict>),
    VarName(Rc<VarName>),

    /// The value names the compiled local at `index` of a frame whose local-name
    /// table holds `owner` at that index.  Only valid while that identity holds.
    LocalSlot { owner: Weak<InnerValue>, index: usize },

    ByteCode(Rc<ByteCode>),
}

impl DataRep {
    fn render(&self) -> String {
        match self {
            DataRep::None => String::new(),
            DataRep::Int(int) => int.to_string(),
            DataRep::Float(flt) => Value::fmt_float(*flt),
            DataRep::List(list) => list::list_to_string(list),
            DataRep::Dict(dict) => dict::dict_to_string(dict),
            DataRep::VarName(var_name) => match var_name.index() {
                Some(index) => format!("{}({})", var_name.name(), index),
                None => var_name.name().into(),
            },
            // These are only ever cached on values that already have a string.
            DataRep::LocalSlot { .. } | DataRep::ByteCode(_) => String::new(),
        }
    }
}

impl Value {
    fn from_rep(data_rep: DataRep) -> Self {
        Self {
            inner: Rc::new(InnerValue {
                string_rep: OnceCell::new(),
                data_rep: RefCell::new(data_rep),
            }),
        }
    }

    /// Returns the empty `Value`.
    pub fn empty() -> Self {
        Value::from("")
    }

    /// Returns the value's string representation, computing it if need be.
    pub fn as_str(&self) -> &str {
        self.inner
            .string_rep
            .get_or_init(|| self.inner.data_rep.borrow().render())
    }

    /// Returns true if both values share the same underlying data.  Identity, not
    /// equality: two equal strings in distinct values are not `ptr_eq`.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true if this `Value` holds the only reference to its data.
    pub fn is_unshared(&self) -> bool {
        Rc::strong_count(&self.inner) == 1
    }

    /// Returns the value as an integer, or an error if it isn't one.
    pub fn as_int(&self) -> Result<MoltInt, Exception> {
        if let DataRep::Int(int) = *self.inner.data_rep.borrow() {
            return Ok(int);
        }

        let int = Value::get_int(self.as_str())?;
        self.set_rep(DataRep::Int(int));
        Ok(int)
    }

    /// Returns the value as a float, or an error if it isn't numeric.
    pub fn as_float(&self) -> Result<MoltFloat, Exception> {
        match *self.inner.data_rep.borrow() {
            DataRep::Float(flt) => return Ok(flt),
            DataRep::Int(int) => return Ok(int as MoltFloat),
            _ => (),
        }

        let flt = Value::get_float(self.as_str())?;
        self.set_rep(DataRep::Float(flt));
        Ok(flt)
    }

    /// Returns the value as a boolean, or an error if it can't be interpreted as one.
    pub fn as_bool(&self) -> Result<bool, Exception> {
        match *self.inner.data_rep.borrow() {
            DataRep::Int(int) => return Ok(int != 0),
            DataRep::Float(flt) => return Ok(flt != 0.0),
            _ => (),
        }

        Value::get_bool(self.as_str())
    }

    /// Returns the value as a list, parsing it if need be.
    pub fn as_list(&self) -> Result<Rc<MoltList>, Exception> {
        if let DataRep::List(list) = &*self.inner.data_rep.borrow() {
            return Ok(Rc::clone(list));
        }

        let list = Rc::new(list::get_list(self.as_str())?);
        self.set_rep(DataRep::List(Rc::clone(&list)));
        Ok(list)
    }

    /// Returns the value as a dictionary, parsing it if need be.
    pub fn as_dict(&self) -> Result<Rc<MoltDict>, Exception> {
        if let DataRep::Dict(dict) = &*self.inner.data_rep.borrow() {
            return Ok(Rc::clone(dict));
        }

        let list = self.as_list()?;
        let dict = Rc::new(dict::list_to_dict(&list)?);
        self.set_rep(DataRep::Dict(Rc::clone(&dict)));
        Ok(dict)
    }

    /// Returns the value as a parsed variable name, splitting `array(elem)` syntax.
    /// The split is cached on the value.
    pub fn as_var_name(&self) -> Rc<VarName> {
        if let DataRep::VarName(var_name) = &*self.inner.data_rep.borrow() {
            return Rc::clone(var_name);
        }

        let var_name = Rc::new(VarName::parse(self.as_str()));
        self.set_rep(DataRep::VarName(Rc::clone(&var_name)));
        var_name
    }

    /// Returns the cached compiled-local index, if this value was last resolved against
    /// a frame whose local-name table still holds the very same name object at that index.
    pub(crate) fn cached_slot(&self, local_names: &[Value]) -> Option<usize> {
        if let DataRep::LocalSlot { owner, index } = &*self.inner.data_rep.borrow() {
            if let Some(name) = local_names.get(*index) {
                if std::ptr::eq(owner.as_ptr(), Rc::as_ptr(&name.inner)) {
                    return Some(*index);
                }
            }
        }
        None
    }

    /// Caches the resolution of this name to the compiled local `owner` at `index`.
    pub(crate) fn cache_slot(&self, owner: &Value, index: usize) {
        self.set_rep(DataRep::LocalSlot {
            owner: Rc::downgrade(&owner.inner),
            index,
        });
    }

    /// Returns the bytecode cached on this value, if any.
    pub(crate) fn cached_bytecode(&self) -> Option<Rc<ByteCode>> {
        if let DataRep::ByteCode(code) = &*self.inner.data_rep.borrow() {
            return Some(Rc::clone(code));
        }
        None
    }

    pub(crate) fn cache_bytecode(&self, code: Rc<ByteCode>) {
        self.set_rep(DataRep::ByteCode(code));
    }

    /// Appends a string to the value.  Mutates in place when unshared; otherwise
    /// replaces `self` with a new value.
    pub fn append_str(&mut self, extra: &str) {
        // Make sure the string rep exists before trying to extend it.
        self.as_str();

        if let Some(inner) = Rc::get_mut(&mut self.inner) {
            if let Some(string) = inner.string_rep.get_mut() {
                string.push_str(extra);
                *inner.data_rep.get_mut() = DataRep::None;
                return;
            }
        }

        let mut string = String::with_capacity(self.as_str().len() + extra.len());
        string.push_str(self.as_str());
        string.push_str(extra);
        *self = Value::from(string);
    }

    /// Appends an element to the value, which must be a valid list.  Mutates in place
    /// when unshared; otherwise replaces `self` with a new value.
    pub fn append_element(&mut self, elem: Value) -> Result<(), Exception> {
        // Validates the list, and leaves the list rep cached.
        let list = self.as_list()?;

        if let Some(inner) = Rc::get_mut(&mut self.inner) {
            drop(list);
            if let DataRep::List(rc) = inner.data_rep.get_mut() {
                Rc::make_mut(rc).push(elem);
                inner.string_rep = OnceCell::new();
                return Ok(());
            }
            unreachable!("list rep was just cached");
        }

        let mut vec: MoltList = (*list).clone();
        vec.push(elem);
        *self = Value::from(vec);
        Ok(())
    }

    fn set_rep(&self, data_rep: DataRep) {
        // The string rep must exist before the current data rep is discarded.
        self.as_str();
        *self.inner.data_rep.borrow_mut() = data_rep;
    }

    /// Formats a float the way TCL does: integral values keep a trailing ".0".
    pub fn fmt_float(flt: MoltFloat) -> String {
        if flt.is_nan() {
            "NaN".into()
        } else if flt.is_infinite() {
            if flt > 0.0 {
                "Inf".into()
            } else {
                "-Inf".into()
            }
        } else if flt.fract() == 0.0 && flt.abs() < 1e16 {
            format!("{:.1}", flt)
        } else {
            format!("{}", flt)
        }
    }

    /// Parses an integer in TCL syntax: optional sign, then decimal digits or a
    /// `0x`, `0o`, or `0b` prefixed literal.  Surrounding whitespace is allowed.
    pub fn get_int(text: &str) -> Result<MoltInt, Exception> {
        let trimmed = text.trim();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let lower = digits.to_ascii_lowercase();
        let parsed = if let Some(hex) = lower.strip_prefix("0x") {
            MoltInt::from_str_radix(hex, 16)
        } else if let Some(oct) = lower.strip_prefix("0o") {
            MoltInt::from_str_radix(oct, 8)
        } else if let Some(bin) = lower.strip_prefix("0b") {
            MoltInt::from_str_radix(bin, 2)
        } else if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse::<MoltInt>()
        } else {
            return molt_err!("expected integer but got \"{}\"", text);
        };

        match parsed {
            Ok(int) if negative => Ok(-int),
            Ok(int) => Ok(int),
            Err(_) => molt_err!("expected integer but got \"{}\"", text),
        }
    }

    /// Parses a float in TCL syntax.  Integers are accepted.
    pub fn get_float(text: &str) -> Result<MoltFloat, Exception> {
        let trimmed = text.trim();

        if let Ok(int) = Value::get_int(trimmed) {
            return Ok(int as MoltFloat);
        }

        // Rust accepts a few spellings TCL doesn't, and vice versa; this is close enough.
        let valid = !trimmed.is_empty()
            && trimmed
                .bytes()
                .all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b))
            || matches!(
                trimmed.to_ascii_lowercase().as_str(),
                "inf" | "+inf" | "-inf" | "nan" | "infinity" | "-infinity"
            );

        match trimmed.parse::<MoltFloat>() {
            Ok(flt) if valid => Ok(flt),
            _ => molt_err!("expected floating-point number but got \"{}\"", text),
        }
    }

    /// Parses a boolean in TCL syntax.
    pub fn get_bool(text: &str) -> Result<bool, Exception> {
        let lower = text.trim().to_ascii_lowercase();
        match lower.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => match Value::get_float(&lower) {
                Ok(flt) => Ok(flt != 0.0),
                Err(_) => molt_err!("expected boolean value but got \"{}\"", text),
            },
        }
    }

    /// Returns true if the value already has an integer or float representation.
    pub(crate) fn is_numeric_rep(&self) -> bool {
        matches!(
            *self.inner.data_rep.borrow(),
            DataRep::Int(_) | DataRep::Float(_)
        )
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Value[{}]", self.as_str())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<String> for Value {
    fn from(string: String) -> Self {
        let inner = InnerValue::default();
        let _ = inner.string_rep.set(string);
        Self {
            inner: Rc::new(inner),
        }
    }
}

impl From<&str> for Value {
    fn from(string: &str) -> Self {
        Value::from(string.to_owned())
    }
}

impl From<&String> for Value {
    fn from(string: &String) -> Self {
        Value::from(string.clone())
    }
}

impl From<MoltInt> for Value {
    fn from(int: MoltInt) -> Self {
        Value::from_rep(DataRep::Int(int))
    }
}

impl From<MoltFloat> for Value {
    fn from(flt: MoltFloat) -> Self {
        Value::from_rep(DataRep::Float(flt))
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::from_rep(DataRep::Int(if flag { 1 } else { 0 }))
    }
}

impl From<MoltList> for Value {
    fn from(list: MoltList) -> Self {
        Value::from_rep(DataRep::List(Rc::new(list)))
    }
}

impl From<&[Value]> for Value {
    fn from(list: &[Value]) -> Self {
        Value::from(list.to_vec())
    }
}

impl From<MoltDict> for Value {
    fn from(dict: MoltDict) -> Self {
        Value::from_rep(DataRep::Dict(Rc::new(dict)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_and_int() {
        let val = Value::from("12");
        assert_eq!(val.as_int(), Ok(12));
        assert_eq!(val.as_str(), "12");

        let val = Value::from(5 as MoltInt);
        assert_eq!(val.as_str(), "5");
        assert!(Value::from("abc").as_int().is_err());
        assert_eq!(Value::get_int(" 0x1F "), Ok(31));
        assert_eq!(Value::get_int("-7"), Ok(-7));
    }

    #[test]
    fn test_float_format() {
        assert_eq!(Value::from(1.0).as_str(), "1.0");
        assert_eq!(Value::from(2.5).as_str(), "2.5");
        assert_eq!(Value::from("3").as_float(), Ok(3.0));
        assert!(Value::from("x1").as_float().is_err());
    }

    #[test]
    fn test_bool() {
        assert_eq!(Value::from("yes").as_bool(), Ok(true));
        assert_eq!(Value::from("0").as_bool(), Ok(false));
        assert_eq!(Value::from("2.5").as_bool(), Ok(true));
        assert!(Value::from("maybe").as_bool().is_err());
    }

    #[test]
    fn test_append_str_in_place() {
        let mut val = Value::from("abc");
        val.append_str("def");
        assert_eq!(val.as_str(), "abcdef");

        let shared = val.clone();
        val.append_str("g");
        assert_eq!(val.as_str(), "abcdefg");
        assert_eq!(shared.as_str(), "abcdef");
        assert!(!val.ptr_eq(&shared));
    }

    #[test]
    fn test_append_element() {
        let mut val = Value::from("a b");
        val.append_element(Value::from("c d")).unwrap();
        assert_eq!(val.as_str(), "a b {c d}");

        let mut bad = Value::from("a {b");
        assert!(bad.append_element(Value::from("c")).is_err());
    }

    #[test]
    fn test_var_name_cache() {
        let val = Value::from("a(b)");
        let var_name = val.as_var_name();
        assert_eq!(var_name.name(), "a");
        assert_eq!(var_name.index(), Some("b"));
        assert!(Rc::ptr_eq(&var_name, &val.as_var_name()));
    }

    #[test]
    fn test_slot_cache_identity() {
        let owner = Value::from("x");
        let same_text = Value::from("x");
        let name = Value::from("x");

        name.cache_slot(&owner, 0);
        assert_eq!(name.cached_slot(&[owner.clone()]), Some(0));

        // Equal text in a different object doesn't validate the cache.
        assert_eq!(name.cached_slot(&[same_text]), None);
        assert_eq!(name.cached_slot(&[]), None);
    }
}
