use crate::catalog::PayloadCatalog;
use crate::executor::CommandExecutor;
use crate::expander::expand;
use crate::reporter::{Rejection, Reporter};
use crate::template::{TemplateError, parse_line};
use anyhow::Context;
use std::io::BufRead;
use tracing::{debug, info, warn};

/// Drives a test-case script against one target.
///
/// Lines are handled one at a time and cases within a line run sequentially.
/// Template and execution errors are reported and skipped; only failing to
/// read the script or to write the report ends the session early.
pub struct FuzzSession<'a> {
    target: String,
    catalog: &'a PayloadCatalog,
    executor: CommandExecutor,
}

impl<'a> FuzzSession<'a> {
    pub fn new(
        target: impl Into<String>,
        catalog: &'a PayloadCatalog,
        executor: CommandExecutor,
    ) -> Self {
        Self {
            target: target.into(),
            catalog,
            executor,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Runs every line of `script` in order.
    ///
    /// A line that is not valid UTF-8 is rejected like any other bad line.
    pub fn run_script<R: BufRead>(
        &self,
        mut script: R,
        reporter: &mut dyn Reporter,
    ) -> Result<(), anyhow::Error> {
        let mut buf = Vec::new();
        let mut line_no = 0;
        loop {
            buf.clear();
            let read = script
                .read_until(b'\n', &mut buf)
                .with_context(|| format!("Failed to read script line {}", line_no + 1))?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let bytes = strip_line_ending(&buf);
            let reported = match std::str::from_utf8(bytes) {
                Ok(line) => self.run_line(line_no, line, reporter),
                Err(_) => reject(
                    Rejection::Template(TemplateError::InvalidUtf8 {
                        line_no,
                        raw_line: String::from_utf8_lossy(bytes).into_owned(),
                    }),
                    reporter,
                ),
            };
            reported.with_context(|| format!("Failed to report results for line {line_no}"))?;
        }
        Ok(())
    }

    /// Parses, expands and runs a single script line.
    pub fn run_line(
        &self,
        line_no: usize,
        line: &str,
        reporter: &mut dyn Reporter,
    ) -> std::io::Result<()> {
        let template = match parse_line(line_no, line, &self.target, self.catalog) {
            Ok(Some(template)) => template,
            Ok(None) => return Ok(()),
            Err(error) => return reject(Rejection::Template(error), reporter),
        };

        let cases = match expand(&template, self.catalog) {
            Ok(cases) => cases,
            Err(error) => {
                let rejection = Rejection::Expand {
                    error,
                    raw_line: template.raw_line().to_string(),
                };
                return reject(rejection, reporter);
            }
        };

        info!(
            line_no,
            placeholder = template.placeholder_name(),
            cases = cases.len(),
            "fuzzing line"
        );
        reporter.on_template(&template)?;
        for case in cases {
            debug!(payload = %case.payload_label, "running case");
            let outcome = self.executor.run(case);
            reporter.on_outcome(&outcome)?;
        }
        Ok(())
    }
}

fn reject(rejection: Rejection, reporter: &mut dyn Reporter) -> std::io::Result<()> {
    warn!("{rejection}: {}", rejection.raw_line());
    reporter.on_rejected(&rejection)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
