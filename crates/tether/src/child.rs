//! Child-side counterpart of the UDS callback channel.
//!
//! A spawned child resolves the locator file it received on its command
//! line, connects back to the controller, registers, and then waits to be
//! told to quit.

use crate::channel::{Frame, LocatorFile, write_frame};
use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::{
    UnixStream,
    unix::{OwnedReadHalf, OwnedWriteHalf},
};
use tracing::debug;

/// Live connection from the child back to its controller.
pub struct ChildSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ChildSession {
    /// Resolve the locator file, connect and register.
    pub async fn connect(locator_path: &Path, entry: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(locator_path)
            .await
            .with_context(|| format!("failed to read locator {}", locator_path.display()))?;
        let locator: LocatorFile =
            serde_json::from_str(&raw).context("malformed locator file")?;

        let stream = UnixStream::connect(&locator.address)
            .await
            .with_context(|| format!("failed to connect to {}", locator.address.display()))?;
        let (read_half, write_half) = stream.into_split();

        let mut session = Self {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
        };
        session
            .register(entry)
            .await
            .context("registration failed")?;
        Ok(session)
    }

    async fn register(&mut self, entry: &str) -> Result<()> {
        let frame = Frame {
            method: "register".to_string(),
            pid: Some(std::process::id()),
            entry: Some(entry.to_string()),
        };
        write_frame(&mut self.writer, &frame).await
    }

    /// Block until the controller asks this child to quit.
    ///
    /// Liveness pings are answered by simply staying on the line; any other
    /// frame is ignored. An error means the controller went away without
    /// saying quit.
    pub async fn wait_for_quit(&mut self) -> Result<()> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .context("failed to read from controller")?;
            let Some(line) = line else {
                bail!("controller closed the channel without quit");
            };

            let frame: Frame =
                serde_json::from_str(&line).context("malformed frame from controller")?;
            match frame.method.as_str() {
                "quit" => return Ok(()),
                "ping" => continue,
                other => debug!(method = %other, "ignoring unknown frame from controller"),
            }
        }
    }
}
