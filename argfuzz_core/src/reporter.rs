use crate::executor::{ExecutionFault, RunOutcome};
use crate::expander::ExpandError;
use crate::template::{ArgumentTemplate, TemplateError};
use std::io::{self, Write};

const COLUMN_WIDTH: usize = 8;

/// Receives every event of a fuzzing session, one script line at a time.
pub trait Reporter {
    /// A template is about to be expanded and run.
    fn on_template(&mut self, template: &ArgumentTemplate) -> io::Result<()>;

    /// A line was skipped because it could not be turned into cases.
    fn on_rejected(&mut self, rejection: &Rejection) -> io::Result<()>;

    fn on_outcome(&mut self, outcome: &RunOutcome) -> io::Result<()>;
}

/// A script line that produced no cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Template(TemplateError),
    Expand {
        error: ExpandError,
        raw_line: String,
    },
}

impl Rejection {
    pub fn line_no(&self) -> usize {
        match self {
            Rejection::Template(error) => error.line_no(),
            Rejection::Expand { error, .. } => match error {
                ExpandError::UnknownPlaceholder { line_no, .. } => *line_no,
            },
        }
    }

    pub fn raw_line(&self) -> &str {
        match self {
            Rejection::Template(error) => error.raw_line(),
            Rejection::Expand { raw_line, .. } => raw_line,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Template(error) => write!(f, "{error}"),
            Rejection::Expand { error, .. } => write!(f, "{error}"),
        }
    }
}

/// Renders one outcome as a fixed-width summary line.
pub fn render(outcome: &RunOutcome) -> String {
    format!(
        " [*] exit:{:<width$}stdout:{:<width$}stderr:{:<width$}test:{}",
        exit_column(outcome),
        outcome.stdout_len,
        outcome.stderr_len,
        outcome.payload_label,
        width = COLUMN_WIDTH,
    )
}

fn exit_column(outcome: &RunOutcome) -> String {
    match (&outcome.fault, outcome.timed_out) {
        (Some(ExecutionFault::Spawn(_)), _) => "SPAWNERR".to_string(),
        (Some(ExecutionFault::Io(_)), _) => "IOERR".to_string(),
        (None, true) => "TIMEOUT".to_string(),
        (None, false) => match (outcome.exit_code, outcome.signal) {
            (Some(code), _) => code.to_string(),
            (None, Some(signal)) => signal_name(signal)
                .map(str::to_string)
                .unwrap_or_else(|| format!("SIG{signal}")),
            (None, None) => "?".to_string(),
        },
    }
}

/// Name of the signals a crashing target usually dies from.
pub fn signal_name(signal: i32) -> Option<&'static str> {
    let name = match signal {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGILL => "SIGILL",
        libc::SIGTRAP => "SIGTRAP",
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        libc::SIGSYS => "SIGSYS",
        _ => return None,
    };
    Some(name)
}

/// Writes the human-readable report the CLI prints.
pub struct TextReporter<W: Write> {
    out: W,
    script_name: String,
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W, script_name: impl Into<String>) -> Self {
        Self {
            out,
            script_name: script_name.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn on_template(&mut self, template: &ArgumentTemplate) -> io::Result<()> {
        writeln!(self.out, "[+] {:?}", template.display_argv())
    }

    fn on_rejected(&mut self, rejection: &Rejection) -> io::Result<()> {
        writeln!(
            self.out,
            "[-] {} of {} -- Skipping.",
            rejection, self.script_name
        )?;
        writeln!(self.out, "    {}", rejection.raw_line())?;
        writeln!(self.out)
    }

    fn on_outcome(&mut self, outcome: &RunOutcome) -> io::Result<()> {
        writeln!(self.out, "{}", render(outcome))?;
        if let Some(ExecutionFault::Spawn(msg) | ExecutionFault::Io(msg)) = &outcome.fault {
            writeln!(self.out, "     {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> RunOutcome {
        RunOutcome {
            exit_code: Some(0),
            signal: None,
            stdout_len: 501,
            stderr_len: 0,
            timed_out: false,
            fault: None,
            payload_label: "overflow-500".to_string(),
        }
    }

    #[test]
    fn render_aligns_columns() {
        assert_eq!(
            render(&outcome()),
            " [*] exit:0       stdout:501     stderr:0       test:overflow-500"
        );
    }

    #[test]
    fn render_uses_sentinels() {
        let timed_out = RunOutcome {
            exit_code: None,
            timed_out: true,
            ..outcome()
        };
        assert!(render(&timed_out).starts_with(" [*] exit:TIMEOUT stdout:"));

        let spawn = RunOutcome {
            exit_code: None,
            fault: Some(ExecutionFault::Spawn("no such file".into())),
            ..outcome()
        };
        assert!(render(&spawn).starts_with(" [*] exit:SPAWNERRstdout:"));

        let io = RunOutcome {
            fault: Some(ExecutionFault::Io("broken pipe".into())),
            ..outcome()
        };
        assert!(render(&io).starts_with(" [*] exit:IOERR   stdout:"));

        let crashed = RunOutcome {
            exit_code: None,
            signal: Some(libc::SIGSEGV),
            ..outcome()
        };
        assert!(render(&crashed).starts_with(" [*] exit:SIGSEGV stdout:"));
    }

    #[test]
    fn unknown_signals_fall_back_to_number() {
        assert_eq!(signal_name(libc::SIGABRT), Some("SIGABRT"));
        assert_eq!(signal_name(999), None);
        let odd = RunOutcome {
            exit_code: None,
            signal: Some(999),
            ..outcome()
        };
        assert!(render(&odd).contains("exit:SIG999"));
    }

    #[test]
    fn text_reporter_prints_rejections_with_line() {
        let mut reporter = TextReporter::new(Vec::new(), "tests.txt");
        let rejection = Rejection::Template(TemplateError::TooManyPlaceholders {
            line_no: 4,
            raw_line: "--a=@@ --b=@@".into(),
            count: 2,
        });
        reporter.on_rejected(&rejection).unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            text,
            "[-] Too many variables (2) on line 4 of tests.txt -- Skipping.\n    --a=@@ --b=@@\n\n"
        );
    }

    #[test]
    fn text_reporter_shows_fault_detail() {
        let mut reporter = TextReporter::new(Vec::new(), "tests.txt");
        let spawn = RunOutcome {
            exit_code: None,
            fault: Some(ExecutionFault::Spawn("permission denied".into())),
            ..outcome()
        };
        reporter.on_outcome(&spawn).unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(text.lines().nth(1).unwrap().contains("permission denied"));
    }
}
