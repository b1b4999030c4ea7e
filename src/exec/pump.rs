// Copyright 2018-2025 the Deno authors. MIT license.

use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;

use tokio::task::JoinHandle;

use super::endpoint::Channel;

const BUFFER_SIZE: usize = 8 * 1024;

/// Byte source of a pump.
pub(crate) enum Source {
  Closed,
  Reader(Box<dyn Read + Send>),
}

/// Byte sink of a pump. Dropping the writer closes it.
pub(crate) enum Sink {
  Closed,
  Writer(Box<dyn Write + Send>),
}

#[derive(Debug)]
pub(crate) enum PumpOutcome {
  /// Everything was copied until the source reached end of file.
  Copied(u64),
  /// One of the ends was closed, so nothing was copied.
  ShortCircuited,
  /// Reading or writing failed. Any bytes not yet copied are lost.
  Failed(std::io::Error),
}

#[derive(Debug)]
pub(crate) struct PumpReport {
  pub channel: Channel,
  pub outcome: PumpOutcome,
}

/// Moves bytes from a source to a sink on the blocking thread pool.
pub(crate) struct StreamPump {
  channel: Channel,
  state: PumpState,
}

enum PumpState {
  Done(PumpOutcome),
  Running(JoinHandle<PumpOutcome>),
}

impl StreamPump {
  pub fn start(channel: Channel, source: Source, sink: Sink) -> Self {
    let state = match (source, sink) {
      // don't bother forcing data through a tap that rejects every write
      (source, Sink::Closed) => {
        drop(source);
        tracing::debug!(%channel, "sink closed, skipping copy");
        PumpState::Done(PumpOutcome::ShortCircuited)
      }
      (Source::Closed, sink) => {
        drop(sink);
        tracing::debug!(%channel, "source closed, skipping copy");
        PumpState::Done(PumpOutcome::ShortCircuited)
      }
      (Source::Reader(reader), Sink::Writer(writer)) => PumpState::Running(
        tokio::task::spawn_blocking(move || copy(channel, reader, writer)),
      ),
    };
    Self { channel, state }
  }

  pub async fn join(self) -> PumpReport {
    let outcome = match self.state {
      PumpState::Done(outcome) => outcome,
      PumpState::Running(handle) => match handle.await {
        Ok(outcome) => outcome,
        Err(err) => {
          tracing::warn!(
            channel = %self.channel,
            error = %err,
            "stream pump panicked"
          );
          PumpOutcome::Failed(std::io::Error::other(err))
        }
      },
    };
    PumpReport {
      channel: self.channel,
      outcome,
    }
  }
}

fn copy(
  channel: Channel,
  mut reader: Box<dyn Read + Send>,
  mut writer: Box<dyn Write + Send>,
) -> PumpOutcome {
  match copy_inner(&mut reader, &mut writer) {
    Ok(size) => {
      drop(writer);
      tracing::debug!(%channel, bytes = size, "stream pump finished");
      PumpOutcome::Copied(size)
    }
    Err(err) => {
      // close both ends so the child doesn't hang on the other side
      drop(reader);
      drop(writer);
      tracing::warn!(%channel, error = %err, "stream pump failed");
      PumpOutcome::Failed(err)
    }
  }
}

fn copy_inner(
  reader: &mut dyn Read,
  writer: &mut dyn Write,
) -> std::io::Result<u64> {
  let mut buffer = vec![0; BUFFER_SIZE];
  let mut total = 0;
  loop {
    let size = match reader.read(&mut buffer) {
      Ok(0) => break,
      Ok(size) => size,
      Err(err) if err.kind() == ErrorKind::Interrupted => continue,
      Err(err) => return Err(err),
    };
    writer.write_all(&buffer[..size])?;
    total += size as u64;
  }
  // only once, since a flush ends a record for flush-triggered collectors
  writer.flush()?;
  Ok(total)
}

#[cfg(test)]
mod test {
  use std::io::Cursor;
  use std::io::Read;
  use std::io::Write;
  use std::sync::Arc;
  use std::sync::atomic::AtomicBool;
  use std::sync::atomic::Ordering;

  use pretty_assertions::assert_eq;

  use super::*;
  use crate::exec::endpoint::Collector;
  use crate::exec::endpoint::RecordBoundary;
  use crate::exec::endpoint::Records;
  use crate::exec::test_builder::SharedBuffer;

  struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    dropped: Arc<AtomicBool>,
  }

  impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
      self.inner.read(buf)
    }
  }

  impl Drop for TrackedReader {
    fn drop(&mut self) {
      self.dropped.store(true, Ordering::SeqCst);
    }
  }

  struct FailingWriter;

  impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
      Err(std::io::Error::other("disk on fire"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn copies_until_end_of_file() {
    let output = SharedBuffer::default();
    let data = "x".repeat(BUFFER_SIZE * 3 + 17);
    let pump = StreamPump::start(
      Channel::Stdout,
      Source::Reader(Box::new(Cursor::new(data.clone().into_bytes()))),
      Sink::Writer(Box::new(output.clone())),
    );
    let report = pump.join().await;
    assert_eq!(report.channel, Channel::Stdout);
    assert!(matches!(
      report.outcome,
      PumpOutcome::Copied(size) if size == data.len() as u64
    ));
    assert_eq!(output.text(), data);
  }

  /// Hands out one chunk per read.
  struct ChunkedReader(Vec<&'static [u8]>);

  impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
      if self.0.is_empty() {
        return Ok(0);
      }
      let chunk = self.0.remove(0);
      buf[..chunk.len()].copy_from_slice(chunk);
      Ok(chunk.len())
    }
  }

  #[tokio::test]
  async fn flushes_once_at_end_of_file() {
    let records = Records::new();
    let collector =
      Collector::new(records.clone()).with_boundary(RecordBoundary::Flush);
    let pump = StreamPump::start(
      Channel::Stdout,
      Source::Reader(Box::new(ChunkedReader(vec![b"a", b"b", b"c"]))),
      Sink::Writer(Box::new(collector.writer())),
    );
    let report = pump.join().await;
    assert!(matches!(report.outcome, PumpOutcome::Copied(3)));
    assert_eq!(records.snapshot(), vec!["abc"]);
  }

  #[tokio::test]
  async fn closed_sink_drops_source_without_copying() {
    let dropped = Arc::new(AtomicBool::new(false));
    let pump = StreamPump::start(
      Channel::Stdout,
      Source::Reader(Box::new(TrackedReader {
        inner: Cursor::new(b"ignored".to_vec()),
        dropped: dropped.clone(),
      })),
      Sink::Closed,
    );
    // closed synchronously, before any join
    assert!(dropped.load(Ordering::SeqCst));
    assert!(matches!(pump.state, PumpState::Done(_)));
    let report = pump.join().await;
    assert!(matches!(report.outcome, PumpOutcome::ShortCircuited));
  }

  #[tokio::test]
  async fn closed_source_closes_sink_immediately() {
    let output = SharedBuffer::default();
    let pump = StreamPump::start(
      Channel::Stdin,
      Source::Closed,
      Sink::Writer(Box::new(output.clone())),
    );
    assert!(matches!(pump.state, PumpState::Done(_)));
    let report = pump.join().await;
    assert_eq!(report.channel, Channel::Stdin);
    assert!(matches!(report.outcome, PumpOutcome::ShortCircuited));
    assert_eq!(output.text(), "");
  }

  #[tokio::test]
  async fn write_error_is_reported() {
    let pump = StreamPump::start(
      Channel::Stderr,
      Source::Reader(Box::new(Cursor::new(b"data".to_vec()))),
      Sink::Writer(Box::new(FailingWriter)),
    );
    let report = pump.join().await;
    match report.outcome {
      PumpOutcome::Failed(err) => assert_eq!(err.to_string(), "disk on fire"),
      outcome => panic!("unexpected outcome: {outcome:?}"),
    }
  }
}
