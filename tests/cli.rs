use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn bouquet() -> Command {
    let mut cmd = Command::cargo_bin("bouquet").expect("binary exists");
    cmd.env_remove("BOUQUET_PATH").env("NO_COLOR", "1");
    cmd
}

#[test]
fn eval_prints_the_value() {
    bouquet()
        .arg("eval")
        .arg("1 + 2 + 3")
        .assert()
        .success()
        .stdout(predicate::str::diff("6\n"));
}

#[test]
fn run_resolves_imports_next_to_the_script() {
    let dir = tempdir().expect("create temp dir");
    fs::write(dir.path().join("greeting.ns"), "var text = \"hello from a module\"").unwrap();
    fs::write(
        dir.path().join("main.ns"),
        "var g = import(\"greeting\")\nprintln(g.text)",
    )
    .unwrap();

    bouquet()
        .arg("run")
        .arg(dir.path().join("main.ns"))
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from a module"));
}

#[test]
fn include_flag_extends_the_search_path() {
    let dir = tempdir().expect("create temp dir");
    let lib = dir.path().join("vendor");
    fs::create_dir_all(&lib).unwrap();
    fs::write(lib.join("answer.ns"), "return 42").unwrap();

    bouquet()
        .arg("eval")
        .arg("import(\"answer\")")
        .arg("-I")
        .arg(&lib)
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn search_path_env_is_honoured() {
    let dir = tempdir().expect("create temp dir");
    fs::write(dir.path().join("answer.ns"), "return 7").unwrap();

    bouquet()
        .env("BOUQUET_PATH", format!(";{};", dir.path().display()))
        .arg("eval")
        .arg("import(\"answer\") * 6")
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn missing_module_fails_with_attempted_paths() {
    bouquet()
        .arg("eval")
        .arg("import(\"does_not_exist\")")
        .assert()
        .failure()
        .stderr(predicate::str::contains("module `does_not_exist` not found"))
        .stderr(predicate::str::contains("does_not_exist.ns"));
}

#[test]
fn compile_writes_a_runnable_artifact() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("hello.ns");
    fs::write(&script, "println(\"compiled hello\")").unwrap();

    bouquet().arg("compile").arg(&script).assert().success();
    let artifact = dir.path().join("hello.nsc");
    assert!(artifact.exists(), "compile should write hello.nsc");

    bouquet()
        .arg("run")
        .arg(&artifact)
        .assert()
        .success()
        .stdout(predicate::str::contains("compiled hello"));
}
