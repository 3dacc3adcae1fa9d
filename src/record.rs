//! Record types with a field set fixed at definition time.
//!
//! A [`RecordType`] is a shared, immutable descriptor: a name, a prototype
//! mapping each field to its default, and optionally a custom constructor
//! and printer. Every [`Record`] it stamps out carries a reference back to
//! its descriptor, so [`RecordType::is`] is an identity check rather than a
//! structural one. Reading or writing a field the prototype does not
//! declare fails with [`BouquetError::InvalidKey`].
//!
//! Field slots hold `Option<Value>`; `None` is the "unset" sentinel. An
//! unset field reads back as `None`, never as an error.
//!
//! Types whose fields are known when the program is compiled should be
//! plain structs. This module is for field sets that only exist at run
//! time, such as record types declared by scripts.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    diagnostics::{BouquetError, Result},
    value::{Value, ValueKind},
};

/// Partial field assignment handed to [`RecordType::new`].
pub type Template = IndexMap<String, Option<Value>>;

pub type Constructor = Rc<dyn Fn(&RecordType, &[Value]) -> Result<Record>>;
pub type Printer = Rc<dyn Fn(&Record) -> String>;

#[derive(Clone)]
pub struct RecordType(Rc<RecordTypeInner>);

struct RecordTypeInner {
    name: String,
    prototype: IndexMap<String, Option<Value>>,
    constructor: Option<Constructor>,
    printer: Option<Printer>,
    next_serial: Cell<u64>,
}

impl RecordType {
    pub fn define<I, S>(name: &str, prototype: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Option<Value>)>,
        S: Into<String>,
    {
        let mut builder = Self::builder(name);
        for (field, default) in prototype {
            builder = builder.slot(field, default);
        }
        builder.build()
    }

    /// Builds a descriptor from a script value. The prototype must be a map;
    /// `none` entries declare fields without a default.
    pub fn from_value(name: &str, prototype: &Value) -> Result<Self> {
        match &*prototype.0 {
            ValueKind::Map(entries) => Self::define(
                name,
                entries.iter().map(|(field, default)| {
                    let default = (!default.is_unit()).then(|| default.clone());
                    (field.clone(), default)
                }),
            ),
            _ => Err(BouquetError::InvalidPrototype {
                record: name.to_string(),
                reason: format!("expected a Map, found {}", prototype.type_name()),
            }),
        }
    }

    pub fn builder(name: &str) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.to_string(),
            prototype: IndexMap::new(),
            duplicate: None,
            constructor: None,
            printer: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.prototype.keys().map(String::as_str)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.prototype.contains_key(field)
    }

    /// The prototype default for `field`; `Ok(None)` for fields declared
    /// without one.
    pub fn default_of(&self, field: &str) -> Result<Option<Value>> {
        self.0
            .prototype
            .get(field)
            .cloned()
            .ok_or_else(|| self.invalid_key(field))
    }

    /// Stamps out an instance from the prototype defaults overlaid with
    /// `template`.
    pub fn new(&self, template: Template) -> Result<Record> {
        let mut slots = self.0.prototype.clone();
        for (field, value) in template {
            match slots.get_mut(&field) {
                Some(slot) => *slot = value,
                None => return Err(self.invalid_key(&field)),
            }
        }
        let serial = self.0.next_serial.get() + 1;
        self.0.next_serial.set(serial);
        Ok(Record(Rc::new(RecordInner {
            record_type: self.clone(),
            serial,
            slots: RefCell::new(slots),
        })))
    }

    pub fn new_default(&self) -> Result<Record> {
        self.new(Template::new())
    }

    /// Runs the custom constructor when one was supplied. The default
    /// constructor accepts nothing or a single map template.
    pub fn construct(&self, args: &[Value]) -> Result<Record> {
        if let Some(constructor) = &self.0.constructor {
            return constructor(self, args);
        }
        match args {
            [] => self.new_default(),
            [template] => self.new(template_from_value(self, template)?),
            _ => Err(BouquetError::runtime(format!(
                "`{}` expects at most one template argument but received {}",
                self.name(),
                args.len()
            ))),
        }
    }

    pub fn is(&self, record: &Record) -> bool {
        Rc::ptr_eq(&self.0, &record.0.record_type.0)
    }

    pub fn is_value(&self, value: &Value) -> bool {
        value.as_record().is_some_and(|record| self.is(record))
    }

    fn invalid_key(&self, field: &str) -> BouquetError {
        BouquetError::InvalidKey {
            record: self.0.name.clone(),
            key: field.to_string(),
        }
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.0.name)
            .field("fields", &self.0.prototype.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn template_from_value(record_type: &RecordType, value: &Value) -> Result<Template> {
    match &*value.0 {
        ValueKind::Unit => Ok(Template::new()),
        ValueKind::Map(entries) => Ok(entries
            .iter()
            .map(|(field, value)| (field.clone(), (!value.is_unit()).then(|| value.clone())))
            .collect()),
        _ => Err(BouquetError::runtime(format!(
            "`{}` template must be a Map, found {}",
            record_type.name(),
            value.type_name()
        ))),
    }
}

pub struct RecordTypeBuilder {
    name: String,
    prototype: IndexMap<String, Option<Value>>,
    duplicate: Option<String>,
    constructor: Option<Constructor>,
    printer: Option<Printer>,
}

impl RecordTypeBuilder {
    pub fn field(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.slot(name, Some(default.into()))
    }

    /// Declares a field with no default.
    pub fn unset(self, name: impl Into<String>) -> Self {
        self.slot(name, None)
    }

    pub fn slot(mut self, name: impl Into<String>, default: Option<Value>) -> Self {
        let name = name.into();
        if self.prototype.contains_key(&name) && self.duplicate.is_none() {
            self.duplicate = Some(name.clone());
        }
        self.prototype.insert(name, default);
        self
    }

    pub fn constructor(
        mut self,
        constructor: impl Fn(&RecordType, &[Value]) -> Result<Record> + 'static,
    ) -> Self {
        self.constructor = Some(Rc::new(constructor));
        self
    }

    pub fn printer(mut self, printer: impl Fn(&Record) -> String + 'static) -> Self {
        self.printer = Some(Rc::new(printer));
        self
    }

    pub fn build(self) -> Result<RecordType> {
        if !is_identifier(&self.name) {
            return Err(BouquetError::InvalidDescriptor(format!(
                "record type name `{}` is not an identifier",
                self.name
            )));
        }
        if let Some(field) = self.duplicate {
            return Err(BouquetError::InvalidPrototype {
                record: self.name,
                reason: format!("field `{field}` is declared twice"),
            });
        }
        if let Some(field) = self.prototype.keys().find(|field| !is_identifier(field)) {
            return Err(BouquetError::InvalidPrototype {
                reason: format!("field name `{field}` is not an identifier"),
                record: self.name,
            });
        }
        Ok(RecordType(Rc::new(RecordTypeInner {
            name: self.name,
            prototype: self.prototype,
            constructor: self.constructor,
            printer: self.printer,
            next_serial: Cell::new(0),
        })))
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}

/// One instance of a [`RecordType`]. Cloning shares the instance.
#[derive(Clone)]
pub struct Record(Rc<RecordInner>);

struct RecordInner {
    record_type: RecordType,
    serial: u64,
    slots: RefCell<IndexMap<String, Option<Value>>>,
}

impl Record {
    pub fn record_type(&self) -> &RecordType {
        &self.0.record_type
    }

    pub fn get(&self, field: &str) -> Result<Option<Value>> {
        self.0
            .slots
            .borrow()
            .get(field)
            .cloned()
            .ok_or_else(|| self.0.record_type.invalid_key(field))
    }

    /// Assigns `value` to a declared field; `None` clears it.
    pub fn set(&self, field: &str, value: Option<Value>) -> Result<()> {
        match self.0.slots.borrow_mut().get_mut(field) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(self.0.record_type.invalid_key(field)),
        }
    }

    /// Snapshot of every declared field in declaration order.
    pub fn fields(&self) -> Vec<(String, Option<Value>)> {
        self.0
            .slots
            .borrow()
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// Type-qualified identity, unique among instances of one descriptor.
    pub fn identity(&self) -> String {
        format!("{}#{}", self.0.record_type.name(), self.0.serial)
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn default_display(&self) -> String {
        let slots = self.0.slots.borrow();
        let body = slots
            .iter()
            .map(|(field, value)| match value {
                Some(value) => format!("{field} = {value}"),
                None => format!("{field} = unset"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} {{ {body} }}", self.0.record_type.name())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.record_type.0.printer {
            Some(printer) => write!(f, "{}", printer(self)),
            None => write!(f, "{}", self.default_display()),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(&self.identity());
        for (field, value) in self.0.slots.borrow().iter() {
            debug.field(field, value);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("x"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier("has space"));
    }

    #[test]
    fn serials_are_assigned_eagerly_per_type() {
        let point = RecordType::builder("Point").field("x", 0).build().unwrap();
        let first = point.new_default().unwrap();
        let second = point.new_default().unwrap();
        assert_eq!(first.identity(), "Point#1");
        assert_eq!(second.identity(), "Point#2");
    }
}
