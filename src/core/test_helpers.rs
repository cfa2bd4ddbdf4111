//! Shared test utilities for core module tests
//!
//! Provides a recording tool invoker and filesystem fixtures so backends can
//! be driven without touching a real firewall. This module is only compiled
//! in test mode.

use crate::core::decision::Decision;
use crate::core::family::TableLayout;
use crate::core::invoker::{Invocation, ToolInvoker, ToolOutput};
use std::io;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone)]
enum Reply {
    Output(ToolOutput),
    /// Spawning fails as if the binary vanished
    Missing,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Invocation>,
    replies: Vec<(String, Reply)>,
}

/// Tool invoker that records every invocation and answers from a script.
///
/// Replies are matched by prefix against the space-joined arguments; the
/// first match wins. Unmatched invocations succeed with empty output.
/// Clones share the same log, so a test can keep a handle after moving the
/// invoker into a backend.
#[derive(Debug, Clone, Default)]
pub struct RecordingInvoker {
    state: Arc<Mutex<State>>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers invocations whose arguments start with `args_prefix`.
    pub fn respond(self, args_prefix: &str, exit_code: i32, output: &str) -> Self {
        let reply = Reply::Output(ToolOutput {
            exit_code: Some(exit_code),
            combined: output.as_bytes().to_vec(),
        });
        self.state
            .lock()
            .unwrap()
            .replies
            .push((args_prefix.to_string(), reply));
        self
    }

    /// Makes invocations whose arguments start with `args_prefix` fail to spawn.
    pub fn missing(self, args_prefix: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .push((args_prefix.to_string(), Reply::Missing));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Space-joined arguments of every recorded invocation
    pub fn arg_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.args.join(" ")).collect()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl ToolInvoker for RecordingInvoker {
    async fn invoke(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(invocation.clone());

        let joined = invocation.args.join(" ");
        let reply = state
            .replies
            .iter()
            .find(|(prefix, _)| joined.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());
        drop(state);

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Missing) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            )),
            None => Ok(ToolOutput {
                exit_code: Some(0),
                combined: Vec::new(),
            }),
        }
    }
}

/// Temporary directory holding a fake tool binary and device node.
///
/// Keep the returned `TempDir` alive for as long as the layout is used.
pub fn fixture_layout(ipv4_table: &str, ipv6_table: &str) -> (TempDir, TableLayout) {
    let dir = tempfile::tempdir().unwrap();
    let tool = dir.path().join("pfctl");
    let device = dir.path().join("pf");
    std::fs::write(&tool, "#!/bin/sh\n").unwrap();
    std::fs::write(&device, "").unwrap();

    let layout = TableLayout {
        tool,
        device: Some(device),
        ipv4_table: ipv4_table.to_string(),
        ipv6_table: ipv6_table.to_string(),
    };
    (dir, layout)
}

/// A well-formed decision for `value`
pub fn decision(value: &str) -> Decision {
    Decision::new(value, "4h", "crowdsecurity/ssh-bf")
}

/// In-memory log sink for asserting on diagnostics.
///
/// Install with [`LogBuffer::subscriber`] and `tracing::subscriber::set_default`;
/// the guard only covers the current thread, which is all a current-thread
/// `#[tokio::test]` needs.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain-text fmt subscriber writing every level into this buffer
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().unwrap()).into_owned()
    }

    /// Captured lines that contain `needle`
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
