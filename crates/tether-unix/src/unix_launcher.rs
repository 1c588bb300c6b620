#[cfg(unix)]
mod unix_impl {
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use nix::sys::signal;
    use nix::unistd::Pid as NixPid;
    use std::collections::HashMap;
    use std::path::Path;
    use std::process::Stdio;
    use tether_core::{ChildExit, ProcessHandle, ProcessLauncher, forward_lines};
    use tokio::process::{Child, Command};
    use tracing::{info, warn};

    /// Unix-specific process handle implementation
    pub struct UnixProcessHandle {
        child: Child,
        command: String,
    }

    impl UnixProcessHandle {
        fn new(child: Child, command: String) -> Self {
            Self { child, command }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProcessHandle {
        fn pid(&self) -> Option<u32> {
            self.child.id()
        }

        async fn wait(&mut self) -> Result<ChildExit> {
            let status = self
                .child
                .wait()
                .await
                .with_context(|| format!("wait on child process {} failed", self.command))?;
            Ok(ChildExit::from(status))
        }

        async fn is_running(&self) -> bool {
            if let Some(pid) = self.pid() {
                let nix_pid = NixPid::from_raw(pid as i32);
                // Signal 0 probes existence without delivering anything
                signal::kill(nix_pid, None).is_ok()
            } else {
                false
            }
        }
    }

    /// Launches child processes in their own process group, with stdout and
    /// stderr forwarded into structured logging under the child's name.
    #[derive(Default)]
    pub struct UnixProcessLauncher;

    impl UnixProcessLauncher {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl ProcessLauncher for UnixProcessLauncher {
        async fn launch(
            &self,
            command: &str,
            args: &[String],
            env: &HashMap<String, String>,
            working_dir: Option<&Path>,
        ) -> Result<Box<dyn ProcessHandle>> {
            let mut cmd = Command::new(command);
            cmd.args(args);

            if let Some(dir) = working_dir {
                cmd.current_dir(dir);
            }

            for (key, value) in env {
                cmd.env(key, value);
            }

            // Own process group so the child's fate stays decoupled from the
            // controller's terminal session
            cmd.process_group(0);
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());

            let mut child = cmd
                .spawn()
                .with_context(|| format!("failed to spawn {command}"))?;

            if let Some(pid) = child.id() {
                info!("Spawned Unix process: {} (PID: {})", command, pid);
            }

            let name = command.to_string();
            if let Some(stdout) = child.stdout.take() {
                tokio::spawn(forward_lines(stdout, name.clone(), "stdout"));
            } else {
                warn!(command = %name, "child stdout was not piped");
            }
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(forward_lines(stderr, name.clone(), "stderr"));
            }

            Ok(Box::new(UnixProcessHandle::new(child, name)))
        }
    }

}

// Re-export the Unix implementation when on Unix systems
#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessLauncher};

// Provide stub implementations for non-Unix systems
#[cfg(not(unix))]
pub struct UnixProcessHandle;

#[cfg(not(unix))]
#[derive(Default)]
pub struct UnixProcessLauncher;

#[cfg(not(unix))]
impl UnixProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}
