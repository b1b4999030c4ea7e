// Copyright 2018-2025 the Deno authors. MIT license.

mod command;
pub mod cwd;
mod endpoint;
mod error;
mod execute;
mod pump;
mod signal;
pub mod stdio;

pub use command::CommandSpec;
pub use command::ExitCodePolicy;
pub use command::PumpFailurePolicy;
pub use endpoint::Channel;
pub use endpoint::Collector;
pub use endpoint::CollectorWriter;
pub use endpoint::InputEndpoint;
pub use endpoint::IoRouting;
pub use endpoint::OutputEndpoint;
pub use endpoint::QueueSender;
pub use endpoint::QueueSource;
pub use endpoint::RecordBoundary;
pub use endpoint::RecordSink;
pub use endpoint::Records;
pub use endpoint::StdioEndpoints;
pub use error::ExecError;
pub use execute::Completion;
pub use execute::ExecutionHandle;
pub use signal::SignalKind;

#[cfg(test)]
mod test_builder;
