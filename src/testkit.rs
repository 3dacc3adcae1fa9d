//! Sequential assertion counter with headings and a printed summary.
//!
//! A [`TestRun`] moves through `Idle → Running → Finished`. Failed checks
//! are recorded with their call site and never abort the run. Reports from
//! several runs can be summed with an [`Aggregate`].

use std::{
    env, fmt,
    io::{self, IsTerminal, Write},
    panic::Location,
};

use crate::color::{Attribute, Color, Style, paint};

const PASS_MARK: &str = "\u{2714}";
const FAIL_MARK: &str = "\u{2718}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl From<&Location<'_>> for CallSite {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub heading: Option<String>,
    pub subheading: Option<String>,
    pub location: CallSite,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.heading, &self.subheading) {
            (Some(heading), Some(subheading)) => write!(f, "[{heading} / {subheading}] ")?,
            (Some(heading), None) => write!(f, "[{heading}] ")?,
            (None, Some(subheading)) => write!(f, "[{subheading}] ")?,
            (None, None) => {}
        }
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Outcome of one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub filename: Option<String>,
    pub total: usize,
    pub failed: usize,
    /// Checks issued since the last heading.
    pub heading_checks: usize,
    /// Checks issued since the last subheading.
    pub subheading_checks: usize,
    pub failures: Vec<Failure>,
}

impl Report {
    pub fn passed(&self) -> usize {
        self.total - self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct TestRun<W: Write = io::Stdout> {
    out: W,
    color: bool,
    phase: Phase,
    filename: Option<String>,
    total: usize,
    failed: usize,
    heading: Option<String>,
    subheading: Option<String>,
    heading_checks: usize,
    subheading_checks: usize,
    failures: Vec<Failure>,
}

impl TestRun<io::Stdout> {
    /// Reports to stdout, colored when stdout is a terminal and `NO_COLOR`
    /// is not set.
    pub fn new() -> Self {
        let color = io::stdout().is_terminal() && env::var_os("NO_COLOR").is_none();
        Self::with_writer(io::stdout()).colored(color)
    }
}

impl Default for TestRun<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> TestRun<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            color: false,
            phase: Phase::Idle,
            filename: None,
            total: 0,
            failed: 0,
            heading: None,
            subheading: None,
            heading_checks: 0,
            subheading_checks: 0,
            failures: Vec::new(),
        }
    }

    pub fn colored(mut self, enabled: bool) -> Self {
        self.color = enabled;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn into_writer(self) -> W {
        self.out
    }

    pub fn start(&mut self, filename: Option<&str>, message: Option<&str>) {
        self.reset();
        self.filename = filename.map(str::to_string);
        self.phase = Phase::Running;
        let banner = match (filename, message) {
            (Some(file), Some(message)) => Some(format!("{file}: {message}")),
            (Some(text), None) | (None, Some(text)) => Some(text.to_string()),
            (None, None) => None,
        };
        if let Some(banner) = banner {
            let line = paint(Style::Attribute(Attribute::Bright), &banner, self.color);
            writeln!(self.out, "{line}").ok();
        }
    }

    pub fn heading(&mut self, name: &str) {
        self.heading = Some(name.to_string());
        self.subheading = None;
        self.heading_checks = 0;
        self.subheading_checks = 0;
        let line = paint(Style::Foreground(Color::Cyan), name, self.color);
        writeln!(self.out, "\n{line}").ok();
    }

    pub fn subheading(&mut self, name: &str) {
        self.subheading = Some(name.to_string());
        self.subheading_checks = 0;
        writeln!(self.out, "\n  {name}").ok();
    }

    /// Counts one check; a false `condition` is recorded with the caller's
    /// location. Returns `condition` so callers can branch on it.
    #[track_caller]
    pub fn check(&mut self, condition: bool, message: &str) -> bool {
        let location = Location::caller();
        self.record(condition, message.to_string(), location)
    }

    #[track_caller]
    pub fn check_eq<T>(&mut self, left: T, right: T, message: &str) -> bool
    where
        T: PartialEq + fmt::Debug,
    {
        let location = Location::caller();
        let condition = left == right;
        let message = if condition {
            message.to_string()
        } else {
            format!("{message}: left={left:?}, right={right:?}")
        };
        self.record(condition, message, location)
    }

    fn record(&mut self, condition: bool, message: String, location: &Location<'_>) -> bool {
        if self.phase != Phase::Running {
            self.start(None, None);
        }
        self.total += 1;
        self.heading_checks += 1;
        self.subheading_checks += 1;
        if condition {
            write!(self.out, "{}", paint(Style::Foreground(Color::Green), ".", self.color)).ok();
        } else {
            self.failed += 1;
            let failure = Failure {
                heading: self.heading.clone(),
                subheading: self.subheading.clone(),
                location: CallSite::from(location),
                message,
            };
            let mark = paint(Style::Foreground(Color::Red), FAIL_MARK, self.color);
            write!(self.out, "\n{mark} {failure}\n").ok();
            self.failures.push(failure);
        }
        self.out.flush().ok();
        condition
    }

    /// Prints the summary and closes the run.
    pub fn finish(&mut self, message: Option<&str>) -> Report {
        let report = Report {
            filename: self.filename.clone(),
            total: self.total,
            failed: self.failed,
            heading_checks: self.heading_checks,
            subheading_checks: self.subheading_checks,
            failures: self.failures.clone(),
        };
        writeln!(self.out).ok();
        if let Some(message) = message {
            writeln!(self.out, "{message}").ok();
        }
        write_report(&mut self.out, &report, self.color).ok();
        self.out.flush().ok();
        self.phase = Phase::Finished;
        report
    }

    fn reset(&mut self) {
        self.filename = None;
        self.total = 0;
        self.failed = 0;
        self.heading = None;
        self.subheading = None;
        self.heading_checks = 0;
        self.subheading_checks = 0;
        self.failures.clear();
    }
}

fn write_report(out: &mut impl Write, report: &Report, color: bool) -> io::Result<()> {
    let label = report.filename.as_deref().unwrap_or("tests");
    for failure in &report.failures {
        let mark = paint(Style::Foreground(Color::Red), FAIL_MARK, color);
        writeln!(out, "{mark} {failure}")?;
    }
    if report.is_success() {
        let mark = paint(Style::Foreground(Color::Green), PASS_MARK, color);
        writeln!(out, "{mark} {label}: {} passed", report.total)
    } else {
        let mark = paint(Style::Foreground(Color::Red), FAIL_MARK, color);
        writeln!(
            out,
            "{mark} {label}: {} failed, {} passed",
            report.failed,
            report.passed()
        )
    }
}

/// Running sum over the reports of several test runs.
#[derive(Debug, Default, Clone)]
pub struct Aggregate {
    reports: Vec<Report>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: Report) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn total(&self) -> usize {
        self.reports.iter().map(|report| report.total).sum()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().map(|report| report.failed).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn write_summary(&self, out: &mut impl Write, color: bool) -> io::Result<()> {
        for report in &self.reports {
            let label = report.filename.as_deref().unwrap_or("<anonymous>");
            let style = if report.is_success() {
                Style::Foreground(Color::Green)
            } else {
                Style::Foreground(Color::Red)
            };
            let tag = if report.is_success() { "[OK]" } else { "[FAIL]" };
            writeln!(
                out,
                "{} {label}: {}/{}",
                paint(style, tag, color),
                report.passed(),
                report.total
            )?;
        }
        let (style, mark) = if self.is_success() {
            (Style::Foreground(Color::Green), PASS_MARK)
        } else {
            (Style::Foreground(Color::Red), FAIL_MARK)
        };
        writeln!(
            out,
            "{} total: {} checks, {} failed, {} files",
            paint(style, mark, color),
            self.total(),
            self.failed(),
            self.reports.len()
        )
    }
}

impl Extend<Report> for Aggregate {
    fn extend<I: IntoIterator<Item = Report>>(&mut self, iter: I) {
        self.reports.extend(iter);
    }
}
