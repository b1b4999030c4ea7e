// Copyright 2018-2025 the Deno authors. MIT license.

use std::fmt;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use std::sync::mpsc;

use parking_lot::Mutex;

use super::pump::Sink;
use super::pump::Source;
use super::stdio;

// Taken by the first launch so its pump owns, and eventually closes, the
// caller's stream.
type SharedReader = Arc<Mutex<Option<Box<dyn Read + Send>>>>;
type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// One of the three standard streams of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
  Stdin,
  Stdout,
  Stderr,
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Channel::Stdin => "stdin",
      Channel::Stdout => "stdout",
      Channel::Stderr => "stderr",
    })
  }
}

/// Where the bytes for a child's stdin come from.
#[derive(Clone)]
pub enum InputEndpoint {
  /// The real stdin of this process, handed to the child by the OS.
  ///
  /// This allows use of a TTY, but will not observe any rebinding done
  /// through [`crate::stdio::redirect_stdin`].
  InheritDirect,
  /// Copies from the logical stdin, which is resolved on every read.
  InheritCopy,
  /// A fixed payload written in full, after which the stream is closed.
  Literal(Arc<[u8]>),
  /// Chunks streamed in as they are pushed through a [`QueueSender`].
  Queue(QueueSource),
  /// A caller supplied reader, copied verbatim and dropped at end of
  /// file. Only the first launch reads from it; later launches see a
  /// closed stdin.
  Custom(SharedReader),
  /// The child observes end of file immediately.
  Closed,
}

impl InputEndpoint {
  pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
    Self::Literal(bytes.into().into())
  }

  pub fn custom(reader: impl Read + Send + 'static) -> Self {
    Self::Custom(Arc::new(Mutex::new(Some(Box::new(reader)))))
  }

  /// Creates a queue backed endpoint along with the sender that feeds it.
  ///
  /// The child's stdin is closed once every sender has been dropped.
  pub fn queue() -> (QueueSender, Self) {
    let (sender, receiver) = mpsc::channel();
    (
      QueueSender(sender),
      Self::Queue(QueueSource(Arc::new(Mutex::new(Some(receiver))))),
    )
  }

  pub(crate) fn is_direct(&self) -> bool {
    matches!(self, Self::InheritDirect)
  }

  pub(crate) fn into_source(self) -> Source {
    match self {
      // handled natively by the OS when spawning
      Self::InheritDirect => Source::Closed,
      Self::InheritCopy => Source::Reader(Box::new(stdio::LogicalStdin)),
      Self::Literal(bytes) => Source::Reader(Box::new(Cursor::new(bytes))),
      Self::Queue(queue) => match queue.claim() {
        Some(reader) => Source::Reader(Box::new(reader)),
        None => Source::Closed,
      },
      Self::Custom(reader) => match reader.lock().take() {
        Some(reader) => Source::Reader(reader),
        None => Source::Closed,
      },
      Self::Closed => Source::Closed,
    }
  }
}

impl fmt::Debug for InputEndpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::InheritDirect => f.write_str("InheritDirect"),
      Self::InheritCopy => f.write_str("InheritCopy"),
      Self::Literal(bytes) => {
        f.debug_tuple("Literal").field(&bytes.len()).finish()
      }
      Self::Queue(_) => f.write_str("Queue"),
      Self::Custom(_) => f.write_str("Custom"),
      Self::Closed => f.write_str("Closed"),
    }
  }
}

/// Where the bytes a child writes to stdout or stderr end up.
#[derive(Clone)]
pub enum OutputEndpoint {
  /// The real stdout/stderr of this process, handed to the child by the OS.
  InheritDirect,
  /// Copies to the logical stdout/stderr, which is resolved on every write.
  InheritCopy,
  /// A caller supplied writer, copied to verbatim and dropped once the
  /// child's output ends. Only the first launch writes to it; later
  /// launches treat it as closed.
  Custom(SharedWriter),
  /// Splits the output into records.
  Collector(Collector),
  /// Output is read and dropped.
  Discard,
  /// Output is never read. Writes done by the child fail.
  Closed,
}

impl OutputEndpoint {
  pub fn custom(writer: impl Write + Send + 'static) -> Self {
    Self::Custom(Arc::new(Mutex::new(Some(Box::new(writer)))))
  }

  /// Collects output into `records`, one record per line.
  pub fn lines(records: impl RecordSink) -> Self {
    Self::Collector(Collector::new(records))
  }

  pub(crate) fn is_direct(&self) -> bool {
    matches!(self, Self::InheritDirect)
  }

  pub(crate) fn into_sink(self, channel: Channel) -> Sink {
    match self {
      Self::InheritDirect | Self::Closed => Sink::Closed,
      Self::InheritCopy => match channel {
        Channel::Stderr => Sink::Writer(Box::new(stdio::LogicalStderr)),
        _ => Sink::Writer(Box::new(stdio::LogicalStdout)),
      },
      Self::Custom(writer) => match writer.lock().take() {
        Some(writer) => Sink::Writer(writer),
        None => Sink::Closed,
      },
      Self::Collector(collector) => Sink::Writer(Box::new(collector.writer())),
      Self::Discard => Sink::Writer(Box::new(std::io::sink())),
    }
  }
}

impl fmt::Debug for OutputEndpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::InheritDirect => f.write_str("InheritDirect"),
      Self::InheritCopy => f.write_str("InheritCopy"),
      Self::Custom(_) => f.write_str("Custom"),
      Self::Collector(collector) => collector.fmt(f),
      Self::Discard => f.write_str("Discard"),
      Self::Closed => f.write_str("Closed"),
    }
  }
}

/// A partial set of endpoints. Channels left as `None` are not changed
/// when applied to a [`crate::CommandSpec`].
#[derive(Debug, Clone, Default)]
pub struct IoRouting {
  pub stdin: Option<InputEndpoint>,
  pub stdout: Option<OutputEndpoint>,
  pub stderr: Option<OutputEndpoint>,
}

impl IoRouting {
  /// Copies stdout and stderr through the logical stdio while stdin is
  /// inherited directly. This is the default for a new command.
  pub fn passthrough() -> Self {
    Self {
      stdin: Some(InputEndpoint::InheritDirect),
      stdout: Some(OutputEndpoint::InheritCopy),
      stderr: Some(OutputEndpoint::InheritCopy),
    }
  }

  /// Hands all three streams of this process to the child. If you wish to
  /// use TTYs in the child you will probably want this.
  pub fn direct() -> Self {
    Self {
      stdin: Some(InputEndpoint::InheritDirect),
      stdout: Some(OutputEndpoint::InheritDirect),
      stderr: Some(OutputEndpoint::InheritDirect),
    }
  }

  /// No input, output dropped.
  pub fn null() -> Self {
    Self {
      stdin: Some(InputEndpoint::Closed),
      stdout: Some(OutputEndpoint::Discard),
      stderr: Some(OutputEndpoint::Discard),
    }
  }

  pub fn stdin(mut self, endpoint: InputEndpoint) -> Self {
    self.stdin = Some(endpoint);
    self
  }

  pub fn stdout(mut self, endpoint: OutputEndpoint) -> Self {
    self.stdout = Some(endpoint);
    self
  }

  pub fn stderr(mut self, endpoint: OutputEndpoint) -> Self {
    self.stderr = Some(endpoint);
    self
  }
}

/// The endpoints bound to each channel of a command.
#[derive(Debug, Clone)]
pub struct StdioEndpoints {
  pub stdin: InputEndpoint,
  pub stdout: OutputEndpoint,
  pub stderr: OutputEndpoint,
}

impl Default for StdioEndpoints {
  fn default() -> Self {
    Self {
      stdin: InputEndpoint::InheritDirect,
      stdout: OutputEndpoint::InheritCopy,
      stderr: OutputEndpoint::InheritCopy,
    }
  }
}

impl StdioEndpoints {
  pub(crate) fn apply(&mut self, routing: IoRouting) {
    if let Some(stdin) = routing.stdin {
      self.stdin = stdin;
    }
    if let Some(stdout) = routing.stdout {
      self.stdout = stdout;
    }
    if let Some(stderr) = routing.stderr {
      self.stderr = stderr;
    }
  }
}

/// Feeds a [`InputEndpoint::Queue`].
#[derive(Debug, Clone)]
pub struct QueueSender(mpsc::Sender<Vec<u8>>);

impl QueueSender {
  /// Queues a chunk for the child's stdin. Returns `false` when the
  /// receiving side is gone, in which case the chunk is dropped.
  pub fn push(&self, chunk: impl Into<Vec<u8>>) -> bool {
    self.0.send(chunk.into()).is_ok()
  }

  /// Drops this sender. Same as `drop(sender)`, but reads better at
  /// call sites.
  pub fn close(self) {}
}

/// Receiving side of a queue. It can be claimed by a single launch only;
/// later launches see an exhausted queue.
#[derive(Clone)]
pub struct QueueSource(Arc<Mutex<Option<mpsc::Receiver<Vec<u8>>>>>);

impl QueueSource {
  fn claim(&self) -> Option<QueueReader> {
    self.0.lock().take().map(|receiver| QueueReader {
      receiver,
      chunk: Vec::new(),
      position: 0,
    })
  }
}

struct QueueReader {
  receiver: mpsc::Receiver<Vec<u8>>,
  chunk: Vec<u8>,
  position: usize,
}

impl Read for QueueReader {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    while self.position >= self.chunk.len() {
      match self.receiver.recv() {
        Ok(chunk) => {
          self.chunk = chunk;
          self.position = 0;
        }
        // every sender is gone
        Err(_) => return Ok(0),
      }
    }
    let remaining = &self.chunk[self.position..];
    let size = remaining.len().min(buf.len());
    buf[..size].copy_from_slice(&remaining[..size]);
    self.position += size;
    Ok(size)
  }
}

/// Destination of the records produced by a [`Collector`].
pub trait RecordSink: Send + 'static {
  fn push_record(&mut self, record: String);
}

impl RecordSink for mpsc::Sender<String> {
  fn push_record(&mut self, record: String) {
    // the receiver going away just means nobody is listening anymore
    let _ = self.send(record);
  }
}

/// A shared list of records that can be read while the child is still
/// running.
#[derive(Debug, Clone, Default)]
pub struct Records(Arc<Mutex<Vec<String>>>);

impl Records {
  pub fn new() -> Self {
    Self::default()
  }

  /// Copy of the records collected so far.
  pub fn snapshot(&self) -> Vec<String> {
    self.0.lock().clone()
  }

  /// Removes and returns the records collected so far.
  pub fn take(&self) -> Vec<String> {
    std::mem::take(&mut *self.0.lock())
  }

  pub fn len(&self) -> usize {
    self.0.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.lock().is_empty()
  }

  /// All records joined back together.
  pub fn concat(&self) -> String {
    self.0.lock().concat()
  }
}

impl RecordSink for Records {
  fn push_record(&mut self, record: String) {
    self.0.lock().push(record);
  }
}

/// What starts a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordBoundary {
  /// A record ends after each occurrence of this byte. The byte is kept
  /// in the record.
  Delimiter(u8),
  /// A record ends on every flush.
  Flush,
}

impl Default for RecordBoundary {
  fn default() -> Self {
    Self::Delimiter(b'\n')
  }
}

/// Accumulates output and hands it to a [`RecordSink`] one record at a
/// time. Records are decoded as UTF-8, lossily.
#[derive(Clone)]
pub struct Collector {
  sink: Arc<Mutex<Box<dyn RecordSink>>>,
  boundary: RecordBoundary,
}

impl Collector {
  pub fn new(sink: impl RecordSink) -> Self {
    Self {
      sink: Arc::new(Mutex::new(Box::new(sink))),
      boundary: RecordBoundary::default(),
    }
  }

  pub fn with_boundary(mut self, boundary: RecordBoundary) -> Self {
    self.boundary = boundary;
    self
  }

  pub fn boundary(&self) -> RecordBoundary {
    self.boundary
  }

  /// Creates a writer with its own accumulation buffer. Whatever is left
  /// in the buffer is emitted as a final record when the writer is
  /// dropped.
  pub fn writer(&self) -> CollectorWriter {
    CollectorWriter {
      sink: self.sink.clone(),
      boundary: self.boundary,
      buffer: Vec::new(),
    }
  }
}

impl fmt::Debug for Collector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Collector")
      .field("boundary", &self.boundary)
      .finish_non_exhaustive()
  }
}

pub struct CollectorWriter {
  sink: Arc<Mutex<Box<dyn RecordSink>>>,
  boundary: RecordBoundary,
  buffer: Vec<u8>,
}

impl CollectorWriter {
  fn emit(&mut self) {
    let record = String::from_utf8_lossy(&self.buffer).into_owned();
    self.buffer.clear();
    self.sink.lock().push_record(record);
  }

  /// Emits any residual output as a final record.
  pub fn close(mut self) {
    self.finish();
  }

  fn finish(&mut self) {
    if !self.buffer.is_empty() {
      self.emit();
    }
  }
}

impl Write for CollectorWriter {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    match self.boundary {
      RecordBoundary::Flush => self.buffer.extend_from_slice(buf),
      RecordBoundary::Delimiter(delimiter) => {
        let mut rest = buf;
        while let Some(index) = rest.iter().position(|b| *b == delimiter) {
          self.buffer.extend_from_slice(&rest[..=index]);
          self.emit();
          rest = &rest[index + 1..];
        }
        self.buffer.extend_from_slice(rest);
      }
    }
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    if self.boundary == RecordBoundary::Flush {
      self.finish();
    }
    Ok(())
  }
}

impl Drop for CollectorWriter {
  fn drop(&mut self) {
    self.finish();
  }
}
