// Copyright 2018-2025 the Deno authors. MIT license.

use std::io::ErrorKind;

use thiserror::Error;

use super::endpoint::Channel;

/// Errors for launching and awaiting commands.
#[derive(Error, Debug)]
pub enum ExecError {
  #[error("invalid command: {0}")]
  InvalidSpec(String),
  #[error("Error launching '{program}': {source}")]
  SpawnFailed {
    program: String,
    source: std::io::Error,
  },
  #[error("could not create a pipe for {channel}: {source}")]
  Pipe {
    channel: Channel,
    source: std::io::Error,
  },
  #[error("copying {channel} failed: {source}")]
  PumpFailed {
    channel: Channel,
    source: std::io::Error,
  },
  #[error("waiting on '{program}' failed: {source}")]
  WaitFailed {
    program: String,
    source: std::io::Error,
  },
  #[error("executing \"{program}\" returned code {code}")]
  UnacceptedExitCode {
    program: String,
    argv: Vec<String>,
    code: i32,
  },
}

impl ExecError {
  pub fn exit_code(&self) -> i32 {
    match self {
      ExecError::UnacceptedExitCode { code, .. } => *code,
      // Use the Exit status that is used in bash: https://www.gnu.org/software/bash/manual/bash.html#Exit-Status
      ExecError::SpawnFailed { source, .. } => match source.kind() {
        ErrorKind::NotFound => 127,
        ErrorKind::PermissionDenied => 126,
        _ => 1,
      },
      ExecError::InvalidSpec(_)
      | ExecError::Pipe { .. }
      | ExecError::PumpFailed { .. }
      | ExecError::WaitFailed { .. } => 1,
    }
  }
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn exit_codes() {
    let not_found = ExecError::SpawnFailed {
      program: "nope".to_string(),
      source: std::io::Error::from(ErrorKind::NotFound),
    };
    assert_eq!(not_found.exit_code(), 127);
    let denied = ExecError::SpawnFailed {
      program: "nope".to_string(),
      source: std::io::Error::from(ErrorKind::PermissionDenied),
    };
    assert_eq!(denied.exit_code(), 126);
    let rejected = ExecError::UnacceptedExitCode {
      program: "false".to_string(),
      argv: vec!["false".to_string()],
      code: 3,
    };
    assert_eq!(rejected.exit_code(), 3);
    assert_eq!(rejected.to_string(), "executing \"false\" returned code 3");
    assert_eq!(ExecError::InvalidSpec("x".to_string()).exit_code(), 1);
  }
}
