//! Dictionary Helpers
//!
//! A TCL dictionary is a list with an even number of elements, alternating keys and
//! values.  Molt dictionaries preserve insertion order.

use crate::list::list_to_string;
use crate::types::*;

/// Creates an empty dictionary.
pub fn dict_new() -> MoltDict {
    MoltDict::default()
}

/// Converts a key/value list into a dictionary.  Later duplicates replace earlier values
/// but keep the original position.
pub fn list_to_dict(list: &[Value]) -> Result<MoltDict, Exception> {
    if list.len() % 2 != 0 {
        return molt_err!("missing value to go with key");
    }

    let mut dict = dict_new();
    for pair in list.chunks(2) {
        dict.insert(pair[0].clone(), pair[1].clone());
    }
    Ok(dict)
}

/// Formats a dictionary as a key/value list string.
pub fn dict_to_string(dict: &MoltDict) -> String {
    let list: MoltList = dict
        .iter()
        .flat_map(|(k, v)| [k.clone(), v.clone()])
        .collect();
    list_to_string(&list)
}

/// Looks up a key, returning an error if it's missing.
pub fn dict_get(dict: &MoltDict, key: &Value) -> MoltResult {
    match dict.get(key) {
        Some(value) => Ok(value.clone()),
        None => molt_err!("key \"{}\" not known in dictionary", key),
    }
}

/// Returns a copy of the dictionary value with `key` set to `value`.
pub fn dict_put(dict_value: &Value, key: Value, value: Value) -> MoltResult {
    let mut dict = (*dict_value.as_dict()?).clone();
    dict.insert(key, value);
    Ok(Value::from(dict))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_to_dict() {
        let list: MoltList = vec!["a".into(), "1".into(), "b".into(), "2".into(), "a".into(), "3".into()];
        let dict = list_to_dict(&list).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict_to_string(&dict), "a 3 b 2");

        assert!(list_to_dict(&list[..3]).is_err());
    }

    #[test]
    fn test_dict_put() {
        let dict = Value::from("a 1");
        let dict = dict_put(&dict, "b".into(), "2".into()).unwrap();
        assert_eq!(dict.as_str(), "a 1 b 2");
        assert_eq!(dict_get(&dict.as_dict().unwrap(), &"b".into()), Ok(Value::from("2")));
        assert!(dict_get(&dict.as_dict().unwrap(), &"c".into()).is_err());
    }
}
