// Copyright 2018-2025 the Deno authors. MIT license.

/// A signal sent to, or terminating, a child process.
///
/// The named constants use the numbers shared by every unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalKind(i32);

impl SignalKind {
  pub const SIGINT: Self = Self(2);
  pub const SIGKILL: Self = Self(9);
  pub const SIGTERM: Self = Self(15);

  pub fn from_raw(signal: i32) -> Self {
    Self(signal)
  }

  pub fn as_raw(&self) -> i32 {
    self.0
  }

  /// Exit code reported for a process terminated by this signal.
  pub fn aborted_code(&self) -> i32 {
    128 + self.0
  }
}

#[cfg(unix)]
impl TryFrom<SignalKind> for nix::sys::signal::Signal {
  type Error = nix::errno::Errno;

  fn try_from(kind: SignalKind) -> Result<Self, Self::Error> {
    nix::sys::signal::Signal::try_from(kind.as_raw())
  }
}
