// Copyright 2018-2025 the Deno authors. MIT license.

//! Process wide logical stdio.
//!
//! Endpoints set to `InheritCopy` copy to and from these streams instead of
//! the real stdio of the process. Each read or write looks up the current
//! binding, so a redirect made while a child is running takes effect for
//! the bytes copied after it.

use std::io::Read;
use std::io::Write;

use parking_lot::Mutex;
use parking_lot::const_mutex;

static STDIN: Mutex<Option<Box<dyn Read + Send>>> = const_mutex(None);
static STDOUT: Mutex<Option<Box<dyn Write + Send>>> = const_mutex(None);
static STDERR: Mutex<Option<Box<dyn Write + Send>>> = const_mutex(None);

/// Restores the previous binding of a logical stream when dropped.
#[must_use = "the redirect is undone when this guard is dropped"]
pub struct StdioRedirect(Restore);

enum Restore {
  Stdin(Option<Box<dyn Read + Send>>),
  Stdout(Option<Box<dyn Write + Send>>),
  Stderr(Option<Box<dyn Write + Send>>),
}

impl Drop for StdioRedirect {
  fn drop(&mut self) {
    match &mut self.0 {
      Restore::Stdin(previous) => *STDIN.lock() = previous.take(),
      Restore::Stdout(previous) => *STDOUT.lock() = previous.take(),
      Restore::Stderr(previous) => *STDERR.lock() = previous.take(),
    }
  }
}

pub fn redirect_stdin(reader: impl Read + Send + 'static) -> StdioRedirect {
  let previous = STDIN.lock().replace(Box::new(reader));
  StdioRedirect(Restore::Stdin(previous))
}

pub fn redirect_stdout(writer: impl Write + Send + 'static) -> StdioRedirect {
  let previous = STDOUT.lock().replace(Box::new(writer));
  StdioRedirect(Restore::Stdout(previous))
}

pub fn redirect_stderr(writer: impl Write + Send + 'static) -> StdioRedirect {
  let previous = STDERR.lock().replace(Box::new(writer));
  StdioRedirect(Restore::Stderr(previous))
}

/// Reader over the logical stdin. Dropping it never closes the real stdin.
pub(crate) struct LogicalStdin;

impl Read for LogicalStdin {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut stdin = STDIN.lock();
    if let Some(reader) = stdin.as_mut() {
      return reader.read(buf);
    }
    // don't hold the lock while blocked on the terminal
    drop(stdin);
    std::io::stdin().read(buf)
  }
}

// For the real stdout and stderr we go through Rust std's wrappers and
// flush after each write in order to bypass its internal buffer.

/// Writer over the logical stdout. Dropping it never closes the real stdout.
pub(crate) struct LogicalStdout;

impl Write for LogicalStdout {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    match STDOUT.lock().as_mut() {
      Some(writer) => writer.write(buf),
      None => {
        let mut stdout = std::io::stdout().lock();
        let size = stdout.write(buf)?;
        stdout.flush()?;
        Ok(size)
      }
    }
  }

  fn flush(&mut self) -> std::io::Result<()> {
    match STDOUT.lock().as_mut() {
      Some(writer) => writer.flush(),
      None => std::io::stdout().flush(),
    }
  }
}

/// Writer over the logical stderr. Dropping it never closes the real stderr.
pub(crate) struct LogicalStderr;

impl Write for LogicalStderr {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    match STDERR.lock().as_mut() {
      Some(writer) => writer.write(buf),
      None => {
        let mut stderr = std::io::stderr().lock();
        let size = stderr.write(buf)?;
        stderr.flush()?;
        Ok(size)
      }
    }
  }

  fn flush(&mut self) -> std::io::Result<()> {
    match STDERR.lock().as_mut() {
      Some(writer) => writer.flush(),
      None => std::io::stderr().flush(),
    }
  }
}
