use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info};

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildExit {
    /// Exit code, if the process terminated normally.
    pub code: Option<i32>,
    /// Terminating signal (Unix), if the process was killed by one.
    pub signal: Option<i32>,
}

impl ChildExit {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn with_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Exit whose cause could not be determined (e.g. the wait itself failed).
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

impl From<std::process::ExitStatus> for ChildExit {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ChildExit::with_code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ChildExit::with_signal(signal);
            }
        }

        ChildExit::unknown()
    }
}

/// Spawns the child OS process. Leaf dependency of the controller; platform
/// crates provide the real implementations.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(
        &self,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        working_dir: Option<&Path>,
    ) -> Result<Box<dyn ProcessHandle>>;
}

/// Handle to a launched child process.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Process ID, if still known.
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to exit. This is the supervisor's only
    /// suspension point; no timeout is applied here.
    async fn wait(&mut self) -> Result<ChildExit>;

    /// Non-blocking liveness probe.
    async fn is_running(&self) -> bool;
}

/// Forward one of the child's output streams into structured logging,
/// line by line, until EOF or a read error.
pub async fn forward_lines<R>(reader: R, child: String, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(target: "tether::child", child = %child, stream, "{line}");
            }
            Ok(None) => break,
            Err(e) => {
                debug!(child = %child, stream, error = %e, "stopped forwarding child output");
                break;
            }
        }
    }
}
