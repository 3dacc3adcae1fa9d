use std::{fs, path::Path};

use bouquet::{
    BouquetError, Globals, LoaderConfig, Module,
    loader::{self, ArtifactKind, Strategy},
    value::{Value, ValueKind},
};
use tempfile::tempdir;

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    fs::write(path, contents).expect("write fixture");
}

fn module_in(dir: &Path) -> Module {
    Module::new("main", dir, LoaderConfig::new(["lib"]))
}

fn export(value: &Value, name: &str) -> Value {
    match value.0.as_ref() {
        ValueKind::Module(module) => module
            .exports
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("module `{}` has no export `{name}`", module.name)),
        _ => panic!("expected Module, found {}", value.type_name()),
    }
}

#[test]
fn import_returns_exports_of_a_source_module() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/geometry.ns", "const unit = 10\nvar area = unit * unit");
    let module = module_in(dir.path());

    let geometry = module.import("geometry").unwrap();
    assert_eq!(export(&geometry, "area"), Value::int(100));
    assert_eq!(export(&geometry, "unit"), Value::int(10));
    // Prelude bindings are not exports.
    assert!(matches!(geometry.0.as_ref(), ValueKind::Module(m) if !m.exports.contains_key("print")));
}

#[test]
fn returned_value_replaces_exports() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/answer.ns", "var hidden = 1\nreturn 42");
    let module = module_in(dir.path());
    assert_eq!(module.import("answer").unwrap(), Value::int(42));
}

#[test]
fn repeated_imports_return_the_cached_value() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/config.ns", "return { level: 3 }");
    let module = module_in(dir.path());

    let first = module.import("config").unwrap();
    // Rewriting the file must not matter once the value is cached.
    write(dir.path(), "lib/config.ns", "return { level: 9 }");
    let second = module.import("config").unwrap();
    assert!(std::rc::Rc::ptr_eq(&first.0, &second.0));
    assert_eq!(module.loaded("config"), Some(first));
}

#[test]
fn child_modules_see_parent_caches() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/shared.ns", "return [1, 2, 3]");
    let module = module_in(dir.path());
    let shared = module.import("shared").unwrap();

    fs::remove_file(dir.path().join("lib/shared.ns")).unwrap();
    let child = module.child("plugin");
    let again = child.import("shared").unwrap();
    assert!(std::rc::Rc::ptr_eq(&shared.0, &again.0));
}

#[test]
fn missing_module_lists_every_attempted_path() {
    let dir = tempdir().expect("create temp dir");
    let module = Module::new("main", dir.path(), LoaderConfig::new(["lib", "vendor"]));

    let err = module.import("nowhere").unwrap_err();
    let BouquetError::ModuleNotFound { name, attempts } = &err else {
        panic!("expected ModuleNotFound, got {err}");
    };
    assert_eq!(name, "nowhere");
    assert_eq!(attempts.len(), 6);
    for kind in [ArtifactKind::Compiled, ArtifactKind::Source, ArtifactKind::Native] {
        for search in ["lib", "vendor"] {
            let expected = kind.candidate(&dir.path().join(search), "nowhere");
            assert!(attempts.contains(&expected), "missing {}", expected.display());
        }
    }
    let message = err.to_string();
    assert!(message.starts_with("module `nowhere` not found:"));
    assert!(message.contains("nowhere.nsc"));
}

#[test]
fn compiled_artifacts_win_over_sources() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/version.ns", "return \"source\"");
    fs::write(
        dir.path().join("lib/version.nsc"),
        loader::compile("return \"compiled\"").unwrap(),
    )
    .unwrap();
    let module = module_in(dir.path());
    assert_eq!(module.import("version").unwrap(), Value::string("compiled"));
}

#[test]
fn strategies_can_be_reordered() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/version.ns", "return \"source\"");
    fs::write(
        dir.path().join("lib/version.nsc"),
        loader::compile("return \"compiled\"").unwrap(),
    )
    .unwrap();
    let module = module_in(dir.path()).with_strategies([
        Strategy::LoadedCache,
        Strategy::Artifact(ArtifactKind::Source),
    ]);
    assert_eq!(module.import("version").unwrap(), Value::string("source"));
}

#[test]
fn compile_file_round_trips_through_import() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "src/math.ns", "var square = 7 * 7");
    fs::create_dir_all(dir.path().join("lib")).unwrap();
    loader::compile_file(
        &dir.path().join("src/math.ns"),
        &dir.path().join("lib/math.nsc"),
    )
    .unwrap();
    let module = module_in(dir.path());
    assert_eq!(export(&module.import("math").unwrap(), "square"), Value::int(49));
}

#[test]
fn dotted_names_resolve_into_directories() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/shapes/circle.ns", "return \"circle\"");
    let module = module_in(dir.path());
    assert_eq!(module.import("shapes.circle").unwrap(), Value::string("circle"));
}

#[test]
fn scripts_import_through_the_module_local_primitive() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/greeting.ns", "var text = \"hello\"");
    let module = module_in(dir.path());
    let value = module
        .eval("var g = import(\"greeting\")\ng.text + \" world\"")
        .unwrap();
    assert_eq!(value, Value::string("hello world"));
    assert!(module.loaded("greeting").is_some());
}

#[test]
fn nested_imports_resolve_from_the_child() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/base.ns", "return 2");
    write(dir.path(), "lib/derived.ns", "return import(\"base\") * 21");
    let module = module_in(dir.path());
    assert_eq!(module.import("derived").unwrap(), Value::int(42));
    // `base` was memoized by the child that imported it, not by `main`.
    assert!(module.loaded("base").is_none());
}

#[test]
fn import_into_evaluates_in_the_target_module() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/plugin.ns", "var registered = true");
    let module = module_in(dir.path());
    let host = module.child("host");

    module.import_into("plugin", &host).unwrap();
    assert_eq!(host.eval("registered").unwrap(), Value::bool(true));
    assert!(module.eval("registered").is_err());
}

#[test]
fn cyclic_imports_fail_instead_of_recursing() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/ping.ns", "return import(\"pong\")");
    write(dir.path(), "lib/pong.ns", "return import(\"ping\")");
    let module = module_in(dir.path());

    let err = module.import("ping").unwrap_err();
    let BouquetError::Load { path, reason } = &err else {
        panic!("expected Load error, got {err}");
    };
    assert!(path.ends_with("ping.ns"));
    assert_eq!(reason, "cyclic import");
}

#[test]
fn errors_inside_modules_note_the_file() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "lib/broken.ns", "var x = undefined_name");
    let module = module_in(dir.path());
    let BouquetError::Eval(diag) = module.import("broken").unwrap_err() else {
        panic!("expected an evaluation error");
    };
    assert!(diag.message.contains("undefined variable `undefined_name`"));
    assert!(diag.notes.iter().any(|note| note.contains("broken.ns")));
}

#[test]
fn unloadable_native_library_is_a_load_error() {
    let dir = tempdir().expect("create temp dir");
    let file_name = ArtifactKind::Native.file_name("fast");
    write(dir.path(), &format!("lib/{file_name}"), "not a shared library");
    let module = module_in(dir.path());
    assert!(matches!(
        module.import("fast").unwrap_err(),
        BouquetError::Load { .. }
    ));
}

#[test]
fn globals_are_snapshotted_per_module() {
    let globals = Globals::empty().with("limit", 5);
    let module = Module::with_globals("sandbox", ".", LoaderConfig::default(), globals);
    assert_eq!(module.eval("limit").unwrap(), Value::int(5));
    assert!(module.eval("print").is_err());
    // Shadowing in the module does not touch the seeded scope.
    module.eval("var limit = 6").unwrap();
    assert_eq!(module.child("other").eval("limit").unwrap(), Value::int(5));
}

#[test]
fn run_file_guards_against_self_import() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "main.ns", "import(\"main\")");
    let module = Module::new("main", dir.path(), LoaderConfig::new(["."]));
    let err = module.run_file(&dir.path().join("main.ns")).unwrap_err();
    assert!(matches!(err, BouquetError::Load { .. }), "got {err}");
}
