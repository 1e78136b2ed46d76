use crate::error::{Error, Result};
use crate::value::{Function, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

/// The default function table, shared by every Set
static DEFAULTS: Lazy<HashMap<&'static str, Function>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Function> = HashMap::new();

    table.insert("lower", Arc::new(|args| Ok(Value::String(string_arg("lower", args, 0)?.to_lowercase()))));
    table.insert("upper", Arc::new(|args| Ok(Value::String(string_arg("upper", args, 0)?.to_uppercase()))));

    table.insert(
        "hasPrefix",
        Arc::new(|args| {
            let s = string_arg("hasPrefix", args, 0)?;
            let prefix = string_arg("hasPrefix", args, 1)?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }),
    );

    table.insert(
        "hasSuffix",
        Arc::new(|args| {
            let s = string_arg("hasSuffix", args, 0)?;
            let suffix = string_arg("hasSuffix", args, 1)?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }),
    );

    table.insert(
        "repeat",
        Arc::new(|args| {
            let s = string_arg("repeat", args, 0)?;
            let count = int_arg("repeat", args, 1)?;
            if count < 0 {
                return Err(Error::call("repeat", "negative repeat count"));
            }
            Ok(Value::String(s.repeat(count as usize)))
        }),
    );

    table.insert(
        "replace",
        Arc::new(|args| {
            let s = string_arg("replace", args, 0)?;
            let old = string_arg("replace", args, 1)?;
            let new = string_arg("replace", args, 2)?;
            // Optional occurrence count; negative replaces all
            let count = match args.get(3) {
                Some(_) => int_arg("replace", args, 3)?,
                None => -1,
            };
            let replaced = if count < 0 {
                s.replace(old, new)
            } else {
                s.replacen(old, new, count as usize)
            };
            Ok(Value::String(replaced))
        }),
    );

    table.insert("map", Arc::new(new_map));

    table
});

/// Build a fresh name→callable table for a Set
pub fn default_functions() -> HashMap<String, Function> {
    DEFAULTS
        .iter()
        .map(|(name, func)| (name.to_string(), func.clone()))
        .collect()
}

/// Construct a Mapping from alternating key/value arguments; keys are
/// stringified. Named `@key` arguments arrive pre-flattened into the same
/// alternating shape by the evaluator.
fn new_map(args: &[Value]) -> Result<Value> {
    if args.len() % 2 != 0 {
        return Err(Error::call("map", "odd number of arguments"));
    }

    let mut map = IndexMap::with_capacity(args.len() / 2);
    for pair in args.chunks(2) {
        map.insert(pair[0].to_string(), pair[1].clone());
    }
    Ok(Value::Mapping(map))
}

fn string_arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(Error::call(
            name,
            format!("argument {} must be a string, got {}", index + 1, other.type_name()),
        )),
        None => Err(Error::call(name, format!("missing argument {}", index + 1))),
    }
}

fn int_arg(name: &str, args: &[Value], index: usize) -> Result<i64> {
    match args.get(index) {
        Some(Value::Int(n)) => Ok(*n),
        Some(other) => Err(Error::call(
            name,
            format!("argument {} must be an integer, got {}", index + 1, other.type_name()),
        )),
        None => Err(Error::call(name, format!("missing argument {}", index + 1))),
    }
}
