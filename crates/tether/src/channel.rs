//! Callback channel over a Unix domain socket.
//!
//! `publish` binds a socket, writes its address into a locator file, and
//! accepts connections until the locator is withdrawn. The child resolves
//! the locator file (its path arrives on the child's command line), connects,
//! and sends a single `register` frame; every frame on the wire is one line
//! of JSON. After registration the controller talks back over the same
//! connection (`quit`, `ping`).

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tether_core::{PublishedLocator, RegistrationSink, RemoteChannel, RemoteHandle};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream, unix::OwnedWriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One line of JSON on the wire, in either direction.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Frame {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

impl Frame {
    pub(crate) fn bare(method: &str) -> Self {
        Self {
            method: method.to_string(),
            pid: None,
            entry: None,
        }
    }
}

/// Contents of the locator file the child resolves.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LocatorFile {
    pub address: PathBuf,
}

pub(crate) async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<()> {
    let mut data = serde_json::to_vec(frame).context("failed to encode frame")?;
    data.push(b'\n');
    writer
        .write_all(&data)
        .await
        .context("failed to send frame")?;
    writer.flush().await.context("failed to flush frame")?;
    Ok(())
}

struct ActivePublication {
    cancel: CancellationToken,
    socket_path: PathBuf,
    locator_path: PathBuf,
}

/// [`RemoteChannel`] implementation over a Unix domain socket.
///
/// One publication is live at a time; `withdraw` stops the accept loop and
/// removes both the socket and the locator file.
pub struct UdsRemoteChannel {
    name: String,
    locator_dir: Option<PathBuf>,
    active: Mutex<Option<ActivePublication>>,
}

impl UdsRemoteChannel {
    pub fn new(name: impl Into<String>, locator_dir: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            locator_dir,
            active: Mutex::new(None),
        }
    }

    fn publication_dir(&self) -> PathBuf {
        match &self.locator_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!("tether-{}-{}", self.name, std::process::id())),
        }
    }
}

#[async_trait]
impl RemoteChannel for UdsRemoteChannel {
    async fn publish(&self, sink: Arc<dyn RegistrationSink>) -> Result<Arc<dyn PublishedLocator>> {
        let dir = self.publication_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create locator directory {}", dir.display()))?;

        let socket_path = dir.join(format!("{}.sock", self.name));
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).with_context(|| {
                format!("failed to remove stale socket {}", socket_path.display())
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("failed to bind {}", socket_path.display()))?;

        let locator_path = dir.join(format!("{}.locator", self.name));
        let locator_doc = LocatorFile {
            address: socket_path.clone(),
        };
        tokio::fs::write(&locator_path, serde_json::to_vec_pretty(&locator_doc)?)
            .await
            .with_context(|| format!("failed to write locator {}", locator_path.display()))?;

        info!(
            socket = %socket_path.display(),
            locator = %locator_path.display(),
            "registration endpoint listening"
        );

        let cancel = CancellationToken::new();
        tokio::spawn(accept_loop(listener, sink, cancel.clone()));

        let address = locator_path.to_string_lossy().into_owned();
        *self.active.lock().unwrap() = Some(ActivePublication {
            cancel,
            socket_path,
            locator_path,
        });

        Ok(Arc::new(UdsPublishedLocator { address }))
    }

    async fn withdraw(&self, _locator: Arc<dyn PublishedLocator>) -> Result<()> {
        let Some(publication) = self.active.lock().unwrap().take() else {
            return Ok(());
        };

        publication.cancel.cancel();
        for path in [&publication.socket_path, &publication.locator_path] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), error = %e, "could not remove published file");
            }
        }
        info!("registration endpoint withdrawn");
        Ok(())
    }
}

struct UdsPublishedLocator {
    address: String,
}

impl PublishedLocator for UdsPublishedLocator {
    fn address(&self) -> &str {
        &self.address
    }
}

async fn accept_loop(
    listener: UnixListener,
    sink: Arc<dyn RegistrationSink>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("registration accept loop stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let sink = sink.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, sink).await {
                            warn!("registration connection error: {e:#}");
                        }
                    });
                }
                Err(e) => {
                    error!("failed to accept registration connection: {e}");
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, sink: Arc<dyn RegistrationSink>) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let line = lines
        .next_line()
        .await
        .context("failed to read registration frame")?
        .context("connection closed before registration")?;
    let frame: Frame =
        serde_json::from_str(&line).context("malformed registration frame")?;
    if frame.method != "register" {
        bail!("expected register frame, got {:?}", frame.method);
    }

    info!(pid = ?frame.pid, entry = ?frame.entry, "child registration received");

    let handle = Arc::new(UdsRemoteHandle {
        peer_pid: frame.pid,
        writer: tokio::sync::Mutex::new(write_half),
    });
    sink.register(handle).await;
    Ok(())
}

/// Controller-side view of one registered child connection.
pub struct UdsRemoteHandle {
    peer_pid: Option<u32>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
}

impl UdsRemoteHandle {
    pub fn peer_pid(&self) -> Option<u32> {
        self.peer_pid
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &frame).await
    }
}

#[async_trait]
impl RemoteHandle for UdsRemoteHandle {
    async fn quit(&self) -> Result<()> {
        self.send(Frame::bare("quit")).await
    }

    async fn is_alive(&self) -> Result<bool> {
        // Write probe: a dead peer fails the send.
        Ok(self.send(Frame::bare("ping")).await.is_ok())
    }
}
