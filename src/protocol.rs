//! Line-oriented console protocol.
//!
//! Every line is one record and is flushed as soon as it is written:
//!
//! ```text
//! STATE=<NAME>[ detail=<text>]
//! SQL tag=<int> handle=<id> path=<path> sql=<text>[ info=<text>]
//! PROGRESS=<fraction, 6 decimals>
//! RESULT=<command> key=value ...[ error=<text>]
//! ```
//!
//! Free text is flattened to one line; it is always the last field of its record.

use crate::engine::TraceEvent;
use std::fmt;
use std::io::Write;

fn one_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Writer for protocol records. Write errors are ignored: a closed stdout must
/// not change the exit code.
pub struct Console<'w> {
    out: &'w mut dyn Write,
}

impl<'w> Console<'w> {
    pub fn new(out: &'w mut dyn Write) -> Self {
        Self { out }
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        let _ = self.out.write_fmt(args);
        let _ = self.out.write_all(b"\n");
        let _ = self.out.flush();
    }

    pub fn state(&mut self, name: &str) {
        self.line(format_args!("STATE={name}"));
    }

    pub fn state_detail(&mut self, name: &str, detail: impl fmt::Display) {
        let detail = one_line(&detail.to_string());
        self.line(format_args!("STATE={name} detail={detail}"));
    }

    pub fn sql(&mut self, event: &TraceEvent<'_>) {
        let path = one_line(&event.path.display().to_string());
        let sql = one_line(event.sql);
        match event.info {
            Some(info) => {
                let info = one_line(info);
                self.line(format_args!(
                    "SQL tag={} handle={} path={path} sql={sql} info={info}",
                    event.tag, event.handle
                ));
            }
            None => self.line(format_args!("SQL tag={} handle={} path={path} sql={sql}", event.tag, event.handle)),
        }
    }

    pub fn progress(&mut self, fraction: f64) {
        self.line(format_args!("PROGRESS={fraction:.6}"));
    }

    pub fn result(&mut self, result: &ResultLine) {
        self.line(format_args!("{result}"));
    }
}

/// The single `RESULT=` record of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLine {
    command: String,
    fields: Vec<(&'static str, String)>,
    error: Option<String>,
}

impl ResultLine {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), fields: Vec::new(), error: None }
    }

    #[must_use]
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    #[must_use]
    pub fn error(mut self, err: impl fmt::Display) -> Self {
        self.error = Some(one_line(&err.to_string()));
        self
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl fmt::Display for ResultLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RESULT={}", self.command)?;
        for (k, v) in &self.fields {
            write!(f, " {k}={v}")?;
        }
        if let Some(e) = &self.error {
            write!(f, " error={e}")?;
        }
        Ok(())
    }
}
