// Copyright 2018-2025 the Deno authors. MIT license.

use std::future::Future;
use std::pin::Pin;
use std::process::ExitStatus;
use std::process::Stdio;
use std::task::Context;
use std::task::Poll;

use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::command::CommandSpec;
use super::command::ExitCodePolicy;
use super::command::PumpFailurePolicy;
use super::cwd;
use super::endpoint::Channel;
use super::endpoint::OutputEndpoint;
use super::error::ExecError;
use super::pump::PumpOutcome;
use super::pump::Sink;
use super::pump::Source;
use super::pump::StreamPump;
#[cfg(unix)]
use super::signal::SignalKind;

impl CommandSpec {
  /// Launches the command.
  ///
  /// Failing to create the process is reported right away. Anything that
  /// goes wrong afterwards is reported through the returned [`Completion`],
  /// which resolves once the process has exited and all of its output has
  /// been copied.
  ///
  /// Must be called from within a Tokio runtime.
  pub fn start(&self) -> Result<(ExecutionHandle, Completion), ExecError> {
    let program = self.program().to_string_lossy().to_string();
    let spawn_failed = |source| ExecError::SpawnFailed {
      program: program.clone(),
      source,
    };
    // read on every launch because it may change between launches
    let cwd = match self.cwd() {
      Some(cwd) => cwd.to_path_buf(),
      None => cwd::current_dir().map_err(spawn_failed)?,
    };
    let io = self.io().clone();

    let mut command = Command::new(self.program());
    command
      .args(self.args())
      .env_clear()
      .envs(self.env().iter())
      .current_dir(&cwd);

    let stdin_pipe = if io.stdin.is_direct() {
      command.stdin(Stdio::inherit());
      None
    } else {
      let (reader, writer) =
        os_pipe::pipe().map_err(|source| ExecError::Pipe {
          channel: Channel::Stdin,
          source,
        })?;
      command.stdin(reader);
      Some(writer)
    };
    let stdout_pipe = output_pipe(&mut command, Channel::Stdout, &io.stdout)?;
    let stderr_pipe = output_pipe(&mut command, Channel::Stderr, &io.stderr)?;

    let child = command.spawn().map_err(spawn_failed)?;
    // avoid deadlock since this is holding onto the pipes
    drop(command);

    tracing::debug!(
      program = %program,
      args = ?self.args(),
      cwd = %cwd.display(),
      pid = ?child.id(),
      "spawned process"
    );

    let mut pumps = Vec::with_capacity(3);
    if let Some(writer) = stdin_pipe {
      pumps.push(StreamPump::start(
        Channel::Stdin,
        io.stdin.into_source(),
        Sink::Writer(Box::new(writer)),
      ));
    }
    if let Some(reader) = stdout_pipe {
      pumps.push(StreamPump::start(
        Channel::Stdout,
        Source::Reader(Box::new(reader)),
        io.stdout.into_sink(Channel::Stdout),
      ));
    }
    if let Some(reader) = stderr_pipe {
      pumps.push(StreamPump::start(
        Channel::Stderr,
        Source::Reader(Box::new(reader)),
        io.stderr.into_sink(Channel::Stderr),
      ));
    }

    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let handle = ExecutionHandle {
      pid: child.id(),
      requests: requests_tx,
    };
    let outcome = ExitEvaluation {
      program: program.clone(),
      argv: self
        .argv()
        .iter()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect(),
      accepted_exit_codes: self.accepted_exit_codes().clone(),
      pump_failure_policy: self.pump_failure_policy(),
    };
    let task = tokio::spawn(complete(child, pumps, requests_rx, outcome));
    Ok((handle, Completion { program, task }))
  }

  /// Launches the command and waits for it to complete.
  pub async fn run(&self) -> Result<i32, ExecError> {
    let (_handle, completion) = self.start()?;
    completion.await
  }
}

fn output_pipe(
  command: &mut Command,
  channel: Channel,
  endpoint: &OutputEndpoint,
) -> Result<Option<os_pipe::PipeReader>, ExecError> {
  if endpoint.is_direct() {
    match channel {
      Channel::Stderr => command.stderr(Stdio::inherit()),
      _ => command.stdout(Stdio::inherit()),
    };
    return Ok(None);
  }
  let (reader, writer) =
    os_pipe::pipe().map_err(|source| ExecError::Pipe { channel, source })?;
  match channel {
    Channel::Stderr => command.stderr(writer),
    _ => command.stdout(writer),
  };
  Ok(Some(reader))
}

#[derive(Debug, Clone, Copy)]
enum ProcessRequest {
  Kill,
  #[cfg(unix)]
  Signal(SignalKind),
}

/// Handle to a launched process.
///
/// Requests made after the process has exited are ignored.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
  pid: Option<u32>,
  requests: mpsc::UnboundedSender<ProcessRequest>,
}

impl ExecutionHandle {
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  /// Forcibly terminates the process. The [`Completion`] still resolves,
  /// normally to a rejected exit code.
  pub fn kill(&self) {
    let _ = self.requests.send(ProcessRequest::Kill);
  }

  #[cfg(unix)]
  pub fn signal(&self, kind: SignalKind) {
    let _ = self.requests.send(ProcessRequest::Signal(kind));
  }

  pub fn has_exited(&self) -> bool {
    self.requests.is_closed()
  }
}

/// Resolves to the exit code of a launched process once it has exited and
/// its output has been fully copied.
///
/// Dropping this does not stop the process.
#[derive(Debug)]
pub struct Completion {
  program: String,
  task: JoinHandle<Result<i32, ExecError>>,
}

impl Future for Completion {
  type Output = Result<i32, ExecError>;

  fn poll(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
  ) -> Poll<Self::Output> {
    match Pin::new(&mut self.task).poll(cx) {
      Poll::Ready(Ok(result)) => Poll::Ready(result),
      Poll::Ready(Err(err)) => Poll::Ready(Err(ExecError::WaitFailed {
        program: self.program.clone(),
        source: std::io::Error::other(err),
      })),
      Poll::Pending => Poll::Pending,
    }
  }
}

struct ExitEvaluation {
  program: String,
  argv: Vec<String>,
  accepted_exit_codes: ExitCodePolicy,
  pump_failure_policy: PumpFailurePolicy,
}

async fn complete(
  mut child: Child,
  pumps: Vec<StreamPump>,
  mut requests: mpsc::UnboundedReceiver<ProcessRequest>,
  evaluation: ExitEvaluation,
) -> Result<i32, ExecError> {
  let status = match wait_for_exit(&mut child, &mut requests).await {
    Ok(status) => Ok(status),
    Err(err) => {
      // don't leave the pumps waiting on a process we lost track of
      let _ = child.start_kill();
      Err(err)
    }
  };
  drop(requests);

  // A descendant holding onto one of the pipes can keep a pump running
  // after the process itself exited, so these are joined only now.
  let reports =
    futures::future::join_all(pumps.into_iter().map(StreamPump::join)).await;

  let status = status.map_err(|source| ExecError::WaitFailed {
    program: evaluation.program.clone(),
    source,
  })?;
  let code = exit_code(status);
  tracing::debug!(program = %evaluation.program, code, "process completed");

  for report in reports {
    if let PumpOutcome::Failed(source) = report.outcome
      && evaluation.pump_failure_policy == PumpFailurePolicy::Fail
    {
      return Err(ExecError::PumpFailed {
        channel: report.channel,
        source,
      });
    }
  }

  if !evaluation.accepted_exit_codes.accepts(code) {
    return Err(ExecError::UnacceptedExitCode {
      program: evaluation.program,
      argv: evaluation.argv,
      code,
    });
  }
  Ok(code)
}

async fn wait_for_exit(
  child: &mut Child,
  requests: &mut mpsc::UnboundedReceiver<ProcessRequest>,
) -> std::io::Result<ExitStatus> {
  loop {
    tokio::select! {
      biased;
      status = child.wait() => return status,
      Some(request) = requests.recv() => handle_request(child, request),
    }
  }
}

fn handle_request(child: &mut Child, request: ProcessRequest) {
  match request {
    ProcessRequest::Kill => {
      if let Err(err) = child.start_kill() {
        tracing::debug!(error = %err, "failed killing process");
      }
    }
    #[cfg(unix)]
    ProcessRequest::Signal(kind) => {
      // the id is only available while the process hasn't been reaped
      if let Some(pid) = child.id() {
        send_signal(pid, kind);
      }
    }
  }
}

#[cfg(unix)]
fn send_signal(pid: u32, kind: SignalKind) {
  use nix::sys::signal::Signal;
  use nix::unistd::Pid;

  let result = Signal::try_from(kind).and_then(|signal| {
    nix::sys::signal::kill(Pid::from_raw(pid as i32), signal)
  });
  if let Err(err) = result {
    tracing::debug!(pid, ?kind, error = %err, "failed signaling process");
  }
}

fn exit_code(status: ExitStatus) -> i32 {
  #[cfg(unix)]
  {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
      return SignalKind::from_raw(signal).aborted_code();
    }
  }
  status.code().unwrap_or(1)
}
