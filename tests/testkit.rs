use bouquet::testkit::{Aggregate, Phase, TestRun};

fn run() -> TestRun<Vec<u8>> {
    TestRun::with_writer(Vec::new())
}

fn output(run: TestRun<Vec<u8>>) -> String {
    String::from_utf8(run.into_writer()).expect("utf-8 output")
}

#[test]
fn four_checks_two_failures() {
    let mut t = run();
    t.start(Some("math.rs"), Some("arithmetic"));
    assert_eq!(t.phase(), Phase::Running);
    t.heading("addition");
    t.check(1 + 1 == 2, "one plus one");
    let first_failure = line!() + 1;
    t.check(2 + 2 == 5, "two plus two");
    t.subheading("negative");
    t.check(-1 + 1 == 0, "cancels out");
    let second_failure = line!() + 1;
    t.check_eq(-2 + -2, 4, "negatives add");
    let report = t.finish(None);

    assert_eq!(t.phase(), Phase::Finished);
    assert_eq!(report.filename.as_deref(), Some("math.rs"));
    assert_eq!(report.total, 4);
    assert_eq!(report.failed, 2);
    assert_eq!(report.passed(), 2);
    assert_eq!(report.heading_checks, 4);
    assert_eq!(report.subheading_checks, 2);
    assert_eq!(report.failures.len(), 2);

    let first = &report.failures[0];
    assert_eq!(first.message, "two plus two");
    assert_eq!(first.location.line, first_failure);
    assert!(first.location.file.ends_with("testkit.rs"));
    assert_eq!(first.heading.as_deref(), Some("addition"));
    assert_eq!(first.subheading, None);

    let second = &report.failures[1];
    assert_eq!(second.message, "negatives add: left=-4, right=4");
    assert_eq!(second.location.line, second_failure);
    assert_eq!(second.subheading.as_deref(), Some("negative"));

    let text = output(t);
    assert!(text.starts_with("math.rs: arithmetic\n"));
    assert!(text.contains("[addition / negative]"));
    assert!(text.contains("math.rs: 2 failed, 2 passed"));
    assert!(!text.contains('\x1b'));
}

#[test]
fn checks_without_start_open_an_anonymous_run() {
    let mut t = run();
    assert_eq!(t.phase(), Phase::Idle);
    assert!(t.check(true, "implicit"));
    assert_eq!(t.phase(), Phase::Running);
    let report = t.finish(Some("done"));
    assert_eq!(report.filename, None);
    assert!(report.is_success());
    let text = output(t);
    assert!(text.contains("done\n"));
    assert!(text.contains("tests: 1 passed"));
}

#[test]
fn a_new_start_resets_counters() {
    let mut t = run();
    t.start(Some("first.rs"), None);
    t.check(false, "broken");
    t.finish(None);

    t.start(Some("second.rs"), None);
    t.check(true, "fine");
    let report = t.finish(None);
    assert_eq!(report.total, 1);
    assert!(report.failures.is_empty());
}

#[test]
fn colored_output_uses_escape_codes() {
    let mut t = run().colored(true);
    t.check(true, "green dot");
    t.finish(None);
    assert!(output(t).contains("\x1b[32m.\x1b[0m"));
}

#[test]
fn aggregate_sums_reports() {
    let mut aggregate = Aggregate::new();
    for (name, failures) in [("a.rs", 0), ("b.rs", 1)] {
        let mut t = run();
        t.start(Some(name), None);
        t.check(true, "passes");
        for _ in 0..failures {
            t.check(false, "fails");
        }
        aggregate.add(t.finish(None));
    }
    assert_eq!(aggregate.total(), 3);
    assert_eq!(aggregate.failed(), 1);
    assert!(!aggregate.is_success());

    let mut summary = Vec::new();
    aggregate.write_summary(&mut summary, false).unwrap();
    let summary = String::from_utf8(summary).unwrap();
    assert!(summary.contains("[OK] a.rs: 1/1"));
    assert!(summary.contains("[FAIL] b.rs: 1/2"));
    assert!(summary.contains("total: 3 checks, 1 failed, 2 files"));
}
