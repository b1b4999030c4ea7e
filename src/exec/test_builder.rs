// Copyright 2018-2025 the Deno authors. MIT license.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::MutexGuard;
use parking_lot::const_mutex;
use pretty_assertions::assert_eq;

use crate::CommandSpec;
use crate::ExecError;
use crate::InputEndpoint;
use crate::OutputEndpoint;
use crate::Records;

static SERIAL: Mutex<()> = const_mutex(());

/// Serializes tests that launch processes or touch process wide state
/// (the logical working directory and logical stdio).
pub fn serial_guard() -> MutexGuard<'static, ()> {
  SERIAL.lock()
}

/// A writer whose contents can be inspected from elsewhere.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.0.lock()).to_string()
  }
}

impl Write for SharedBuffer {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.0.lock().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

enum ExpectedResult {
  ExitCode(i32),
  Rejected(i32),
}

pub struct TestBuilder {
  program: String,
  args: Vec<String>,
  env_vars: Vec<(String, String)>,
  clear_env: bool,
  cwd: Option<PathBuf>,
  stdin: Option<Vec<u8>>,
  accepted_exit_codes: Vec<i32>,
  expected_result: ExpectedResult,
  expected_stdout: Vec<String>,
  expected_stderr: Vec<String>,
}

impl TestBuilder {
  pub fn new(program: &str) -> Self {
    Self {
      program: program.to_string(),
      args: Default::default(),
      env_vars: Default::default(),
      clear_env: false,
      cwd: None,
      stdin: None,
      accepted_exit_codes: Default::default(),
      expected_result: ExpectedResult::ExitCode(0),
      expected_stdout: Default::default(),
      expected_stderr: Default::default(),
    }
  }

  /// Runs the script with `sh -c`.
  pub fn script(script: &str) -> Self {
    let mut builder = Self::new("sh");
    builder.args(&["-c", script]);
    builder
  }

  pub fn args(&mut self, args: &[&str]) -> &mut Self {
    self.args.extend(args.iter().map(|arg| arg.to_string()));
    self
  }

  pub fn clear_env(&mut self) -> &mut Self {
    self.clear_env = true;
    self
  }

  pub fn env_var(&mut self, name: &str, value: &str) -> &mut Self {
    self.env_vars.push((name.to_string(), value.to_string()));
    self
  }

  pub fn cwd(&mut self, cwd: PathBuf) -> &mut Self {
    self.cwd = Some(cwd);
    self
  }

  pub fn stdin(&mut self, stdin: &str) -> &mut Self {
    self.stdin = Some(stdin.as_bytes().to_vec());
    self
  }

  pub fn accept_exit_codes(&mut self, codes: &[i32]) -> &mut Self {
    self.accepted_exit_codes = codes.to_vec();
    self
  }

  pub fn assert_exit_code(&mut self, code: i32) -> &mut Self {
    self.expected_result = ExpectedResult::ExitCode(code);
    self
  }

  pub fn assert_rejected_exit_code(&mut self, code: i32) -> &mut Self {
    self.expected_result = ExpectedResult::Rejected(code);
    self
  }

  /// Each call adds one expected line record.
  pub fn assert_stdout(&mut self, record: &str) -> &mut Self {
    self.expected_stdout.push(record.to_string());
    self
  }

  pub fn assert_stderr(&mut self, record: &str) -> &mut Self {
    self.expected_stderr.push(record.to_string());
    self
  }

  fn spec(&self, stdout: &Records, stderr: &Records) -> CommandSpec {
    let mut spec = CommandSpec::new(&self.program).unwrap();
    if self.clear_env {
      spec = spec.clear_env();
    }
    for (name, value) in &self.env_vars {
      spec = spec.with_env_var(name, value);
    }
    if let Some(cwd) = &self.cwd {
      spec = spec.with_cwd(cwd);
    }
    let stdin = match &self.stdin {
      Some(bytes) => InputEndpoint::literal(bytes.clone()),
      None => InputEndpoint::Closed,
    };
    spec
      .with_args(&self.args)
      .with_accepted_exit_codes(self.accepted_exit_codes.iter().copied())
      .with_stdin(stdin)
      .with_stdout(OutputEndpoint::lines(stdout.clone()))
      .with_stderr(OutputEndpoint::lines(stderr.clone()))
  }

  pub async fn run(&mut self) {
    let _guard = serial_guard();
    let stdout = Records::new();
    let stderr = Records::new();
    let spec = self.spec(&stdout, &stderr);
    let description = format!("{} {:?}", self.program, self.args);

    let result = spec.start().unwrap().1.await;

    assert_eq!(
      stderr.snapshot(),
      self.expected_stderr,
      "\n\nFailed for: {description}"
    );
    assert_eq!(
      stdout.snapshot(),
      self.expected_stdout,
      "\n\nFailed for: {description}"
    );
    match (&self.expected_result, result) {
      (ExpectedResult::ExitCode(expected), Ok(code)) => {
        assert_eq!(code, *expected, "\n\nFailed for: {description}")
      }
      (
        ExpectedResult::Rejected(expected),
        Err(ExecError::UnacceptedExitCode { code, argv, .. }),
      ) => {
        assert_eq!(code, *expected, "\n\nFailed for: {description}");
        assert_eq!(argv[0], self.program);
        assert_eq!(&argv[1..], self.args.as_slice());
      }
      (_, result) => {
        panic!("\n\nFailed for: {description}\nUnexpected result: {result:?}")
      }
    }
  }
}
