//! Asynchronous subprocess invocation with concurrent stream draining.
//!
//! Writing stdin, draining stdout and draining stderr run as three joined
//! futures. A child that fills one pipe while waiting on another never
//! deadlocks the caller.

use std::collections::HashMap;
use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::debug;

use crate::errors::ProcessError;

/// A single process run: program, arguments, environment and optional stdin.
#[derive(Debug, Clone, Default)]
pub struct ProcessInvocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: HashMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn stdin(mut self, data: Vec<u8>) -> Self {
        self.stdin = Some(data);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// Everything a finished process produced.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitStatus,
}

/// Run `invocation` to completion.
///
/// The child gets a clean environment holding only the invocation's
/// variables plus the caller's `PATH`. It is killed if the returned future is
/// dropped, which ties its lifetime to the request that started it.
pub async fn invoke(invocation: ProcessInvocation) -> Result<ProcessResult, ProcessError> {
    let program = invocation.program_name();
    match invocation.timeout {
        Some(limit) => match tokio::time::timeout(limit, run(invocation)).await {
            Ok(result) => result,
            Err(_) => Err(ProcessError::TimedOut {
                program,
                secs: limit.as_secs(),
            }),
        },
        None => run(invocation).await,
    }
}

async fn run(invocation: ProcessInvocation) -> Result<ProcessResult, ProcessError> {
    let program = invocation.program_name();

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .env_clear()
        .envs(&invocation.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if !invocation.env.contains_key("PATH") {
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
    }

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    debug!(program = %program, pid = ?child.id(), "spawned process");

    let io_err = |source| ProcessError::Io {
        program: program.clone(),
        source,
    };

    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_err(missing_pipe("stdout")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_err(missing_pipe("stderr")))?;

    let (_, stdout, stderr) = tokio::try_join!(
        feed_stdin(stdin, invocation.stdin),
        read_to_close(stdout),
        read_to_close(stderr),
    )
    .map_err(io_err)?;

    let status = child.wait().await.map_err(io_err)?;
    debug!(
        program = %program,
        exit_code = ?status.code(),
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "process finished"
    );

    Ok(ProcessResult {
        stdout,
        stderr,
        status,
    })
}

/// Write the payload (if any) and close the pipe so the child sees EOF.
async fn feed_stdin(stdin: Option<ChildStdin>, payload: Option<Vec<u8>>) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    if let Some(data) = payload {
        match stdin.write_all(&data).await {
            Ok(()) => {}
            // Child exited without consuming its input.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e),
        }
    }
    match stdin.shutdown().await {
        Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}

async fn read_to_close<R: AsyncRead + Unpin>(mut stream: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}

fn missing_pipe(name: &str) -> std::io::Error {
    std::io::Error::other(format!("child {} was not captured", name))
}
