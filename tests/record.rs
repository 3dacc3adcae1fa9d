use bouquet::{
    BouquetError, RecordType, Value,
    record::{Record, Template},
};

fn point() -> RecordType {
    RecordType::builder("Point")
        .field("x", 0)
        .field("y", 0)
        .unset("label")
        .build()
        .expect("valid descriptor")
}

fn template(entries: &[(&str, Value)]) -> Template {
    entries
        .iter()
        .map(|(field, value)| (field.to_string(), Some(value.clone())))
        .collect()
}

#[test]
fn partial_templates_fall_back_to_prototype_defaults() {
    let point = point();
    let p = point.new(template(&[("x", Value::int(3))])).unwrap();
    assert_eq!(p.get("x").unwrap(), Some(Value::int(3)));
    assert_eq!(p.get("y").unwrap(), Some(Value::int(0)));
    assert_eq!(p.get("label").unwrap(), None);
}

#[test]
fn equal_templates_still_give_distinct_instances() {
    let point = point();
    let a = point.new(template(&[("x", Value::int(1))])).unwrap();
    let b = point.new(template(&[("x", Value::int(1))])).unwrap();
    assert_ne!(a, b);
    assert_ne!(a.identity(), b.identity());
    a.set("x", Some(Value::int(5))).unwrap();
    assert_eq!(b.get("x").unwrap(), Some(Value::int(1)));
}

#[test]
fn unknown_fields_fail_on_construction_read_and_write() {
    let point = point();
    let err = point.new(template(&[("z", Value::int(1))])).unwrap_err();
    assert!(matches!(err, BouquetError::InvalidKey { ref record, ref key } if record == "Point" && key == "z"));

    let p = point.new_default().unwrap();
    assert!(matches!(p.get("z"), Err(BouquetError::InvalidKey { .. })));
    assert!(matches!(
        p.set("z", Some(Value::int(1))),
        Err(BouquetError::InvalidKey { .. })
    ));
    assert!(matches!(
        point.default_of("z"),
        Err(BouquetError::InvalidKey { .. })
    ));
}

#[test]
fn unset_is_distinct_from_an_omitted_field() {
    let point = point();
    let p = point
        .new(Template::from([
            ("x".to_string(), None),
            ("label".to_string(), Some(Value::string("origin"))),
        ]))
        .unwrap();
    assert_eq!(p.get("x").unwrap(), None);
    assert_eq!(p.get("label").unwrap(), Some(Value::string("origin")));
    p.set("label", None).unwrap();
    assert_eq!(p.get("label").unwrap(), None);
}

#[test]
fn fields_list_declared_slots_in_order_with_current_values() {
    let point = point();
    let p = point.new(template(&[("y", Value::int(7))])).unwrap();
    p.set("label", Some(Value::string("corner"))).unwrap();
    p.set("x", None).unwrap();
    assert_eq!(
        p.fields(),
        vec![
            ("x".to_string(), None),
            ("y".to_string(), Some(Value::int(7))),
            ("label".to_string(), Some(Value::string("corner"))),
        ]
    );
}

#[test]
fn membership_is_by_descriptor_identity() {
    let a = point();
    let b = point();
    let p = a.new_default().unwrap();
    assert!(a.is(&p));
    assert!(!b.is(&p));
    assert!(a.is_value(&Value::record(p)));
    assert!(!a.is_value(&Value::int(3)));
    assert_ne!(a, b);
}

#[test]
fn descriptors_are_validated() {
    assert!(matches!(
        RecordType::builder("not a name").build(),
        Err(BouquetError::InvalidDescriptor(_))
    ));
    assert!(matches!(
        RecordType::builder("Pair").field("a", 1).field("a", 2).build(),
        Err(BouquetError::InvalidPrototype { .. })
    ));
    assert!(matches!(
        RecordType::define("Pair", [("1st", None)]),
        Err(BouquetError::InvalidPrototype { .. })
    ));
    assert!(matches!(
        RecordType::from_value("Pair", &Value::int(1)),
        Err(BouquetError::InvalidPrototype { .. })
    ));
}

#[test]
fn custom_constructor_and_printer() {
    let range = RecordType::builder("Range")
        .field("low", 0)
        .field("high", 0)
        .constructor(|record_type, args| {
            let [low, high] = args else {
                return Err(BouquetError::runtime("Range takes two bounds"));
            };
            record_type.new(Template::from([
                ("low".to_string(), Some(low.clone())),
                ("high".to_string(), Some(high.clone())),
            ]))
        })
        .printer(|record: &Record| {
            let bound = |field| record.get(field).ok().flatten().unwrap_or_else(Value::unit);
            format!("{}..{}", bound("low"), bound("high"))
        })
        .build()
        .unwrap();

    let r = range.construct(&[Value::int(2), Value::int(9)]).unwrap();
    assert_eq!(r.to_string(), "2..9");
    assert_eq!(r.default_display(), "Range { low = 2, high = 9 }");
    assert!(range.construct(&[Value::int(2)]).is_err());
}

#[test]
fn default_constructor_accepts_a_map_template() {
    let point = point();
    let p = point
        .construct(&[Value::map(
            [("y".to_string(), Value::int(4))].into_iter().collect(),
        )])
        .unwrap();
    assert_eq!(p.to_string(), "Point { x = 0, y = 4, label = unset }");
    assert!(point.construct(&[Value::int(1), Value::int(2)]).is_err());
}
