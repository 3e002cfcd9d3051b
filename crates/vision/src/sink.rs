//! Destinations for published values.

use std::{
    io::{self, Write},
    process::{Command, Stdio},
};

use anyhow::{Context, Result, bail};

/// Receives each newly detected value exactly once.
pub trait Sink {
    fn publish(&mut self, value: &str) -> Result<()>;
}

impl<T: Sink + ?Sized> Sink for Box<T> {
    fn publish(&mut self, value: &str) -> Result<()> {
        (**self).publish(value)
    }
}

/// Writes each value as a line to a writer, stdout by default.
pub struct StdoutSink<W = io::Stdout> {
    out: W,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StdoutSink<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for StdoutSink<W> {
    fn publish(&mut self, value: &str) -> Result<()> {
        writeln!(self.out, "{value}").context("failed to write value")?;
        self.out.flush().context("failed to flush value")
    }
}

/// Pipes each value into a fresh run of an external program, such as a
/// clipboard helper (`wl-copy`, `xclip -selection clipboard`, `pbcopy`).
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a command line; the first element is the program.
    pub fn from_command_line(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("sink command must name a program")?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }
}

impl Sink for CommandSink {
    fn publish(&mut self, value: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .with_context(|| format!("failed to open stdin of {}", self.program))?;
            stdin
                .write_all(value.as_bytes())
                .with_context(|| format!("failed to write to {}", self.program))?;
        }

        let status = child
            .wait()
            .with_context(|| format!("failed to wait for {}", self.program))?;
        if !status.success() {
            bail!("{} exited with {status}", self.program);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_sink_writes_one_line_per_value() {
        let mut sink = StdoutSink::with_writer(Vec::new());
        sink.publish("secret123").unwrap();
        sink.publish("other").unwrap();
        assert_eq!(sink.into_inner(), b"secret123\nother\n");
    }

    #[test]
    fn command_sink_requires_program() {
        assert!(CommandSink::from_command_line(&[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_sink_reports_exit_status() {
        let mut ok = CommandSink::new("cat", Vec::new());
        ok.publish("value").unwrap();

        let mut failing = CommandSink::new("false", Vec::new());
        assert!(failing.publish("value").is_err());
    }

    #[test]
    fn missing_program_is_an_error() {
        let mut sink = CommandSink::new("definitely-not-a-real-program-qr", Vec::new());
        assert!(sink.publish("value").is_err());
    }
}
