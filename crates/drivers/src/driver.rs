//! The driver plug-in contract: run a command with an environment and an
//! input stream, and collect its output.

use async_trait::async_trait;
use bytes::Bytes;
use cmdgate_core::{Command, DriverError, Environment};

/// A fresh input/output bundle, created once per command invocation.
pub struct Streams {
    pub stdin: Bytes,
}

impl Streams {
    pub fn new(stdin: Bytes) -> Self {
        Self { stdin }
    }
}

/// What a driver produces: the process's exit status and its two raw
/// output streams, not yet parsed for tags.
pub struct Output {
    pub status: i64,
    pub stdout: Bytes,
    pub stderr: Bytes,
}

/// Uniform contract for running a [`Command`] under a particular execution
/// environment (local shell, container).
///
/// Errors are for *driver-level* faults only — a non-zero exit status is a
/// normal [`Output`], not an `Err`.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn execute(
        &self,
        command: &Command,
        env: &Environment,
        streams: Streams,
    ) -> Result<Output, DriverError>;
}
