#[cfg(windows)]
mod windows_impl {
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::process::Stdio;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tether_core::{ChildExit, ProcessHandle, ProcessLauncher, forward_lines};
    use tokio::process::{Child, Command};
    use tracing::{info, warn};

    // Suppresses the console window that would otherwise pop up for every
    // spawned child.
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    /// Windows-specific process handle implementation
    pub struct WindowsProcessHandle {
        child: Child,
        command: String,
        exited: Arc<AtomicBool>,
    }

    impl WindowsProcessHandle {
        fn new(child: Child, command: String) -> Self {
            Self {
                child,
                command,
                exited: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl ProcessHandle for WindowsProcessHandle {
        fn pid(&self) -> Option<u32> {
            self.child.id()
        }

        async fn wait(&mut self) -> Result<ChildExit> {
            let status = self
                .child
                .wait()
                .await
                .with_context(|| format!("wait on child process {} failed", self.command))?;
            self.exited.store(true, Ordering::Relaxed);
            Ok(ChildExit::from(status))
        }

        async fn is_running(&self) -> bool {
            !self.exited.load(Ordering::Relaxed) && self.child.id().is_some()
        }
    }

    /// Launches child processes without a console window, with stdout and
    /// stderr forwarded into structured logging under the child's name.
    #[derive(Default)]
    pub struct WindowsProcessLauncher;

    impl WindowsProcessLauncher {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl ProcessLauncher for WindowsProcessLauncher {
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

            cmd.creation_flags(CREATE_NO_WINDOW);
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());

            let mut child = cmd
                .spawn()
                .with_context(|| format!("failed to spawn {command}"))?;

            if let Some(pid) = child.id() {
                info!("Spawned Windows process: {} (PID: {})", command, pid);
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

            Ok(Box::new(WindowsProcessHandle::new(child, name)))
        }
    }
}

// Re-export the Windows implementation when on Windows systems
#[cfg(windows)]
pub use windows_impl::{WindowsProcessHandle, WindowsProcessLauncher};

// Provide stub implementations for non-Windows systems
#[cfg(not(windows))]
pub struct WindowsProcessHandle;

#[cfg(not(windows))]
#[derive(Default)]
pub struct WindowsProcessLauncher;

#[cfg(not(windows))]
impl WindowsProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}
