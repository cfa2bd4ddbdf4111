//! External firewall tool invocation
//!
//! Every engine talks to the kernel through a control program (`pfctl`,
//! `ipset`, `nft`). An [`Invocation`] describes one call; a [`ToolInvoker`]
//! runs it to completion and hands back the exit status together with the
//! combined stdout/stderr. Invokers keep no state between calls.
//!
//! Production code uses [`SystemInvoker`]. Tests substitute a recording
//! invoker so that the exact argument vectors can be asserted.

use crate::core::error::{Error, Result, ToolFailure};
use std::borrow::Cow;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// One call to a firewall control program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Script fed on stdin, if any
    pub input: Option<String>,
}

impl Invocation {
    pub fn new<S: Into<String>>(program: &Path, args: impl IntoIterator<Item = S>) -> Self {
        Self {
            program: program.to_path_buf(),
            args: args.into_iter().map(Into::into).collect(),
            input: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Human-readable command line for log lines
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Exit status and combined output of a finished invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// All of stdout followed by all of stderr. The two streams are captured
    /// through separate pipes, so lines are not interleaved in write order.
    pub combined: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.combined)
    }

    /// Classifies the output: a non-zero exit becomes a [`ToolFailure`].
    pub fn into_result(self, invocation: &Invocation) -> std::result::Result<Self, ToolFailure> {
        if self.success() {
            Ok(self)
        } else {
            Err(ToolFailure {
                command: invocation.command_line(),
                exit_code: self.exit_code,
                output: self.text().into_owned(),
            })
        }
    }
}

/// Runs firewall control programs.
///
/// Implementations block the calling task until the process exits; no
/// timeout is applied.
pub trait ToolInvoker: Send + Sync {
    fn invoke(&self, invocation: &Invocation) -> impl Future<Output = io::Result<ToolOutput>> + Send;
}

/// Spawns real processes via `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInvoker;

impl ToolInvoker for SystemInvoker {
    async fn invoke(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if invocation.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        if let Some(input) = &invocation.input
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin.write_all(input.as_bytes()).await?;
            // Dropping stdin closes the pipe so the tool sees EOF
            drop(stdin);
        }

        let output = child.wait_with_output().await?;

        // stdout first, then stderr; see `ToolOutput::combined`
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        Ok(ToolOutput {
            exit_code: output.status.code(),
            combined,
        })
    }
}

/// Runs an invocation and classifies the three possible outcomes.
///
/// # Errors
///
/// - `Error::ToolNotFound` if the program could not be spawned because it does not exist
/// - `Error::Io` for any other spawn or pipe failure
/// - `Error::Tool` if the program exited non-zero
pub async fn run<I: ToolInvoker>(invoker: &I, invocation: &Invocation) -> Result<ToolOutput> {
    let output = invoker.invoke(invocation).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::ToolNotFound {
                path: invocation.program.clone(),
                reason: e.to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;

    Ok(output.into_result(invocation)?)
}

/// Resolves a tool the way the pre-condition check does: paths containing
/// a separator must point at a file, bare names are searched on `PATH`.
///
/// # Errors
///
/// Returns `Error::ToolNotFound` if the tool cannot be resolved.
pub fn lookup_tool(tool: &Path) -> Result<PathBuf> {
    let not_found = |reason: &str| Error::ToolNotFound {
        path: tool.to_path_buf(),
        reason: reason.to_string(),
    };

    if tool.components().count() > 1 {
        if tool.is_file() {
            return Ok(tool.to_path_buf());
        }
        return Err(not_found("no such file"));
    }

    let name = tool
        .to_str()
        .ok_or_else(|| not_found("tool name is not valid UTF-8"))?;
    crate::utils::find_in_path(name).ok_or_else(|| not_found("executable file not found in $PATH"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let inv = Invocation::new(
            Path::new("/sbin/pfctl"),
            ["-t", "crowdsec-blacklists", "-T", "flush"],
        );
        assert_eq!(
            inv.command_line(),
            "/sbin/pfctl -t crowdsec-blacklists -T flush"
        );
        assert!(inv.input.is_none());
    }

    #[test]
    fn test_into_result_failure_keeps_output() {
        let inv = Invocation::new(Path::new("pfctl"), ["-s", "Tables"]);
        let out = ToolOutput {
            exit_code: Some(1),
            combined: b"pfctl: /dev/pf: Permission denied\n".to_vec(),
        };

        let failure = out.into_result(&inv).unwrap_err();
        assert_eq!(failure.command, "pfctl -s Tables");
        assert_eq!(failure.exit_code, Some(1));
        assert!(failure.output.contains("Permission denied"));
    }

    #[test]
    fn test_lookup_tool_absolute_missing() {
        let err = lookup_tool(Path::new("/nonexistent/fw_bouncer_tool")).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[test]
    fn test_lookup_tool_on_path() {
        // sh should exist on all Unix systems
        assert!(lookup_tool(Path::new("sh")).is_ok());
        assert!(lookup_tool(Path::new("fw_bouncer_nonexistent_binary_xyz")).is_err());
    }

    #[tokio::test]
    async fn test_system_invoker_combines_output() {
        let inv = Invocation::new(
            Path::new("sh"),
            ["-c", "echo err1 >&2; echo out; echo err2 >&2; exit 3"],
        );
        let out = SystemInvoker.invoke(&inv).await.unwrap();

        assert_eq!(out.exit_code, Some(3));
        // stdout always precedes stderr
        assert_eq!(out.text(), "out\nerr1\nerr2\n");
    }

    #[tokio::test]
    async fn test_system_invoker_feeds_stdin() {
        let inv = Invocation::new(Path::new("sh"), ["-c", "cat"]).with_input("add element\n");
        let out = SystemInvoker.invoke(&inv).await.unwrap();

        assert!(out.success());
        assert_eq!(out.text(), "add element\n");
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let inv = Invocation::new(Path::new("/nonexistent/fw_bouncer_tool"), ["-s", "Tables"]);
        let err = run(&SystemInvoker, &inv).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_non_zero_exit() {
        let inv = Invocation::new(Path::new("sh"), ["-c", "echo boom; exit 1"]);
        let err = run(&SystemInvoker, &inv).await.unwrap_err();
        match err {
            Error::Tool(failure) => assert!(failure.output.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
