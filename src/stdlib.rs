use indexmap::IndexMap;

use crate::{
    color,
    diagnostics::{BouquetError, Result},
    record::RecordType,
    value::{Value, ValueKind},
};

/// Bindings copied into every module environment at creation time.
///
/// Modules take a snapshot, so inserting into a `Globals` after a module
/// was created does not leak into it. The loader adds a module-local
/// `import` on top of whatever is here.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    bindings: IndexMap<String, Value>,
}

impl Globals {
    /// No bindings at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard script prelude: `print`, `println`, `len`, `type_of`,
    /// `str`, `keys`, `push`, `range`, `record` and the `color` table.
    pub fn prelude() -> Self {
        let mut globals = Self::empty();
        globals.insert("print", Value::native("print", usize::MAX, io_print));
        globals.insert("println", Value::native("println", usize::MAX, io_println));
        globals.insert("len", Value::native("len", 1, collections_len));
        globals.insert("type_of", Value::native("type_of", 1, type_of));
        globals.insert("str", Value::native("str", 1, to_str));
        globals.insert("keys", Value::native("keys", 1, collections_keys));
        globals.insert("push", Value::native("push", 2, collections_push));
        globals.insert("range", Value::native("range", 2, collections_range));
        globals.insert("record", Value::native("record", 2, define_record));

        let mut color_table = IndexMap::new();
        color_table.insert("wrap".to_string(), Value::native("wrap", 2, color_wrap));
        color_table.insert("start".to_string(), Value::native("start", 2, color_start));
        color_table.insert("stop".to_string(), Value::native("stop", 2, color_stop));
        globals.insert("color", Value::map(color_table));
        globals
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.bindings.insert(name.into(), value.into())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

fn expect_string<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        BouquetError::runtime(format!(
            "`{name}` expected String but found {}",
            value.type_name()
        ))
    })
}

fn expect_int(value: &Value, name: &str) -> Result<i64> {
    value.as_int().ok_or_else(|| {
        BouquetError::runtime(format!(
            "`{name}` expected Int but found {}",
            value.type_name()
        ))
    })
}

fn io_print(args: &[Value]) -> Result<Value> {
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 {
            print!(" ");
        }
        print!("{arg}");
    }
    Ok(Value::unit())
}

fn io_println(args: &[Value]) -> Result<Value> {
    io_print(args)?;
    println!();
    Ok(Value::unit())
}

fn collections_len(args: &[Value]) -> Result<Value> {
    let len = match &*args[0].0 {
        ValueKind::String(s) => s.chars().count(),
        ValueKind::Array(arr) => arr.len(),
        ValueKind::Map(map) => map.len(),
        ValueKind::Module(module) => module.exports.len(),
        _ => {
            return Err(BouquetError::runtime(format!(
                "`len` expects String, Array or Map, found {}",
                args[0].type_name()
            )));
        }
    };
    Ok(Value::int(len as i64))
}

fn type_of(args: &[Value]) -> Result<Value> {
    let name = match &*args[0].0 {
        ValueKind::Record(record) => record.record_type().name().to_string(),
        _ => args[0].type_name().to_string(),
    };
    Ok(Value::string(name))
}

fn to_str(args: &[Value]) -> Result<Value> {
    Ok(Value::string(args[0].to_string()))
}

fn collections_keys(args: &[Value]) -> Result<Value> {
    let keys: Vec<Value> = match &*args[0].0 {
        ValueKind::Map(map) => map.keys().cloned().map(Value::string).collect(),
        ValueKind::Module(module) => module.exports.keys().cloned().map(Value::string).collect(),
        ValueKind::Record(record) => record
            .record_type()
            .field_names()
            .map(Value::string)
            .collect(),
        _ => {
            return Err(BouquetError::runtime(format!(
                "`keys` expects Map, Module or Record, found {}",
                args[0].type_name()
            )));
        }
    };
    Ok(Value::array(keys))
}

fn collections_push(args: &[Value]) -> Result<Value> {
    match &*args[0].0 {
        ValueKind::Array(values) => {
            let mut new = values.clone();
            new.push(args[1].clone());
            Ok(Value::array(new))
        }
        _ => Err(BouquetError::runtime("`push` expects Array as first argument")),
    }
}

fn collections_range(args: &[Value]) -> Result<Value> {
    let start = expect_int(&args[0], "range")?;
    let end = expect_int(&args[1], "range")?;
    Ok(Value::array((start..end).map(Value::int).collect()))
}

fn define_record(args: &[Value]) -> Result<Value> {
    let name = expect_string(&args[0], "record")?;
    RecordType::from_value(name, &args[1]).map(Value::record_type)
}

fn color_wrap(args: &[Value]) -> Result<Value> {
    let style = expect_string(&args[0], "color.wrap")?;
    color::wrap(style, &args[1].to_string()).map(Value::string)
}

fn color_start(args: &[Value]) -> Result<Value> {
    let style = expect_string(&args[0], "color.start")?;
    color::start(style, &args[1].to_string()).map(Value::string)
}

fn color_stop(args: &[Value]) -> Result<Value> {
    let style = expect_string(&args[0], "color.stop")?;
    color::stop(style, &args[1].to_string()).map(Value::string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_of_a_record_follow_the_prototype() {
        let point = RecordType::builder("Point")
            .field("x", 0)
            .unset("y")
            .build()
            .unwrap();
        let record = Value::record(point.new_default().unwrap());
        let keys = collections_keys(&[record]).unwrap();
        assert_eq!(keys, Value::array(vec!["x".into(), "y".into()]));
    }

    #[test]
    fn globals_are_copied_not_shared() {
        let base = Globals::prelude();
        let extended = base.clone().with("answer", 42);
        assert!(base.get("answer").is_none());
        assert_eq!(extended.get("answer"), Some(&Value::int(42)));
    }
}
