// Copyright 2018-2025 the Deno authors. MIT license.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use super::endpoint::InputEndpoint;
use super::endpoint::IoRouting;
use super::endpoint::OutputEndpoint;
use super::endpoint::StdioEndpoints;
use super::error::ExecError;

/// Exit codes that are considered successful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCodePolicy {
  /// Every exit code is accepted.
  Any,
  /// Only the listed codes are accepted. Zero is not implied.
  OneOf(Arc<BTreeSet<i32>>),
}

impl Default for ExitCodePolicy {
  fn default() -> Self {
    Self::OneOf(Arc::new(BTreeSet::from([0])))
  }
}

impl ExitCodePolicy {
  pub fn accepts(&self, code: i32) -> bool {
    match self {
      Self::Any => true,
      Self::OneOf(codes) => codes.contains(&code),
    }
  }
}

/// What a failed stream copy does to the result of a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PumpFailurePolicy {
  /// Log the failure and otherwise ignore it.
  #[default]
  Report,
  /// Fail the command with [`ExecError::PumpFailed`].
  Fail,
}

/// A command template.
///
/// Every method returns a new value and leaves the receiver untouched, so
/// a spec can be shared between threads and reused for many launches.
#[derive(Debug, Clone)]
pub struct CommandSpec {
  program: OsString,
  args: Arc<Vec<OsString>>,
  /// The complete environment of the child. Nothing from this process
  /// is merged in at launch.
  env: Arc<HashMap<OsString, OsString>>,
  /// `None` uses the logical working directory at launch.
  cwd: Option<PathBuf>,
  io: StdioEndpoints,
  accepted_exit_codes: ExitCodePolicy,
  pump_failure_policy: PumpFailurePolicy,
}

impl CommandSpec {
  /// Creates a command with a copy of the current environment, no
  /// arguments, the default stdio routing, and only `0` as a successful
  /// exit code.
  pub fn new(program: impl Into<OsString>) -> Result<Self, ExecError> {
    let program = program.into();
    if program.is_empty() {
      return Err(ExecError::InvalidSpec("command name was empty".to_string()));
    }
    let env = std::env::vars_os()
      .map(|(key, value)| (normalize_env_key(key), value))
      .collect();
    Ok(Self {
      program,
      args: Default::default(),
      env: Arc::new(env),
      cwd: None,
      io: StdioEndpoints::default(),
      accepted_exit_codes: ExitCodePolicy::default(),
      pump_failure_policy: PumpFailurePolicy::default(),
    })
  }

  pub fn program(&self) -> &OsStr {
    &self.program
  }

  pub fn args(&self) -> &[OsString] {
    &self.args
  }

  /// The program followed by its arguments.
  pub fn argv(&self) -> Vec<OsString> {
    std::iter::once(self.program.clone())
      .chain(self.args.iter().cloned())
      .collect()
  }

  pub fn env(&self) -> &HashMap<OsString, OsString> {
    &self.env
  }

  pub fn get_env_var(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
    let key = normalize_env_key(key.as_ref().to_os_string());
    self.env.get(&key).map(|value| value.as_os_str())
  }

  pub fn cwd(&self) -> Option<&Path> {
    self.cwd.as_deref()
  }

  pub fn io(&self) -> &StdioEndpoints {
    &self.io
  }

  pub fn accepted_exit_codes(&self) -> &ExitCodePolicy {
    &self.accepted_exit_codes
  }

  pub fn pump_failure_policy(&self) -> PumpFailurePolicy {
    self.pump_failure_policy
  }

  pub fn with_args<I, S>(&self, more_args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
  {
    let mut args = Vec::clone(&self.args);
    args.extend(more_args.into_iter().map(Into::into));
    Self {
      args: Arc::new(args),
      ..self.clone()
    }
  }

  pub fn with_env_var(
    &self,
    key: impl Into<OsString>,
    value: impl Into<OsString>,
  ) -> Self {
    self.with_env([(key.into(), Some(value.into()))])
  }

  pub fn without_env_var(&self, key: impl Into<OsString>) -> Self {
    self.with_env([(key.into(), None::<OsString>)])
  }

  /// Merges `changes` into the environment. A `None` value removes the key.
  pub fn with_env<I, K, V>(&self, changes: I) -> Self
  where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: Into<OsString>,
    V: Into<OsString>,
  {
    let mut env = HashMap::clone(&self.env);
    for (key, value) in changes {
      let key = normalize_env_key(key.into());
      match value {
        Some(value) => {
          env.insert(key, value.into());
        }
        None => {
          env.remove(&key);
        }
      }
    }
    Self {
      env: Arc::new(env),
      ..self.clone()
    }
  }

  /// Keeps only the environment variables named in `allowed_keys`.
  pub fn filter_env<I, K>(&self, allowed_keys: I) -> Self
  where
    I: IntoIterator<Item = K>,
    K: Into<OsString>,
  {
    let allowed = allowed_keys
      .into_iter()
      .map(|key| normalize_env_key(key.into()))
      .collect::<HashSet<_>>();
    let env = self
      .env
      .iter()
      .filter(|(key, _)| allowed.contains(*key))
      .map(|(key, value)| (key.clone(), value.clone()))
      .collect();
    Self {
      env: Arc::new(env),
      ..self.clone()
    }
  }

  pub fn clear_env(&self) -> Self {
    Self {
      env: Default::default(),
      ..self.clone()
    }
  }

  pub fn with_cwd(&self, cwd: impl Into<PathBuf>) -> Self {
    Self {
      cwd: Some(cwd.into()),
      ..self.clone()
    }
  }

  /// Goes back to using the logical working directory at launch.
  pub fn without_cwd(&self) -> Self {
    Self {
      cwd: None,
      ..self.clone()
    }
  }

  /// Replaces the endpoints of the channels set in `routing`, leaving the
  /// others as they are.
  pub fn with_io(&self, routing: IoRouting) -> Self {
    let mut next = self.clone();
    next.io.apply(routing);
    next
  }

  pub fn with_stdin(&self, endpoint: InputEndpoint) -> Self {
    self.with_io(IoRouting::default().stdin(endpoint))
  }

  pub fn with_stdout(&self, endpoint: OutputEndpoint) -> Self {
    self.with_io(IoRouting::default().stdout(endpoint))
  }

  pub fn with_stderr(&self, endpoint: OutputEndpoint) -> Self {
    self.with_io(IoRouting::default().stderr(endpoint))
  }

  /// Exit codes to consider successful. Zero is not accepted unless it is
  /// listed. An empty list restores the default of `[0]`.
  pub fn with_accepted_exit_codes(
    &self,
    codes: impl IntoIterator<Item = i32>,
  ) -> Self {
    let codes = codes.into_iter().collect::<BTreeSet<_>>();
    let accepted_exit_codes = if codes.is_empty() {
      ExitCodePolicy::default()
    } else {
      ExitCodePolicy::OneOf(Arc::new(codes))
    };
    Self {
      accepted_exit_codes,
      ..self.clone()
    }
  }

  /// Disables exit code validation.
  pub fn with_any_exit_code(&self) -> Self {
    Self {
      accepted_exit_codes: ExitCodePolicy::Any,
      ..self.clone()
    }
  }

  pub fn with_pump_failure_policy(&self, policy: PumpFailurePolicy) -> Self {
    Self {
      pump_failure_policy: policy,
      ..self.clone()
    }
  }
}

fn normalize_env_key(key: OsString) -> OsString {
  if cfg!(windows) {
    // environment variables are case insensitive on windows
    key.to_ascii_uppercase()
  } else {
    key
  }
}
