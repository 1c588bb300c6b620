//! In-memory collaborator implementations for tests.
//!
//! These let embedding code drive the full controller lifecycle without an
//! operating-system process or a real transport: the test scripts when the
//! fake child "registers" and when and how it "exits".

use crate::process::{ChildExit, ProcessHandle, ProcessLauncher};
use crate::remote::{PublishedLocator, RegistrationSink, RemoteChannel, RemoteHandle};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Launcher whose "processes" exit when the test says so.
///
/// Each launch hands the test a [`MockProcessControl`] through the receiver
/// returned by [`MockLauncher::new`]; dropping a control without calling
/// `exit` makes the corresponding wait fail (exit status unknown).
pub struct MockLauncher {
    controls_tx: mpsc::UnboundedSender<MockProcessControl>,
    fail_next: Mutex<Option<String>>,
    next_pid: AtomicUsize,
}

impl MockLauncher {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockProcessControl>) {
        let (controls_tx, controls_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                controls_tx,
                fail_next: Mutex::new(None),
                next_pid: AtomicUsize::new(1000),
            }),
            controls_rx,
        )
    }

    /// Make the next `launch` call fail with the given message.
    pub fn fail_next_launch(&self, message: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some(message.into());
    }
}

#[async_trait]
impl ProcessLauncher for MockLauncher {
    async fn launch(
        &self,
        command: &str,
        args: &[String],
        _env: &HashMap<String, String>,
        _working_dir: Option<&Path>,
    ) -> Result<Box<dyn ProcessHandle>> {
        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(anyhow::anyhow!(message));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed) as u32;
        let (exit_tx, exit_rx) = watch::channel(None);
        let control = MockProcessControl {
            pid,
            command: command.to_string(),
            args: args.to_vec(),
            exit_tx,
        };
        let _ = self.controls_tx.send(control);

        Ok(Box::new(MockProcess { pid, exit_rx }))
    }
}

/// Test-side remote control of one launched mock process.
pub struct MockProcessControl {
    pub pid: u32,
    pub command: String,
    pub args: Vec<String>,
    exit_tx: watch::Sender<Option<ChildExit>>,
}

impl MockProcessControl {
    /// Make the mock process exit with the given status.
    pub fn exit(&self, exit: ChildExit) {
        let _ = self.exit_tx.send(Some(exit));
    }
}

struct MockProcess {
    pid: u32,
    exit_rx: watch::Receiver<Option<ChildExit>>,
}

#[async_trait]
impl ProcessHandle for MockProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait(&mut self) -> Result<ChildExit> {
        let exit = self
            .exit_rx
            .wait_for(|exit| exit.is_some())
            .await
            .context("mock process control dropped before exit")?
            .clone();
        Ok(exit.expect("guarded by wait_for"))
    }

    async fn is_running(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }
}

/// Channel whose registrations are injected by the test.
#[derive(Default)]
pub struct MockChannel {
    sink: Mutex<Option<Arc<dyn RegistrationSink>>>,
    fail_next_publish: Mutex<Option<String>>,
    publish_count: AtomicUsize,
    withdraw_count: AtomicUsize,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `publish` call fail with the given message.
    pub fn fail_next_publish(&self, message: impl Into<String>) {
        *self.fail_next_publish.lock().unwrap() = Some(message.into());
    }

    /// Simulate the child resolving the locator and registering. Returns the
    /// handle the controller received so the test can inspect it.
    ///
    /// Panics if no locator has been published.
    pub async fn connect_child(&self) -> Arc<MockRemoteHandle> {
        let sink = self
            .sink
            .lock()
            .unwrap()
            .clone()
            .expect("no locator published");
        let handle = Arc::new(MockRemoteHandle::default());
        sink.register(handle.clone()).await;
        handle
    }

    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::Relaxed)
    }

    pub fn withdraw_count(&self) -> usize {
        self.withdraw_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RemoteChannel for MockChannel {
    async fn publish(&self, sink: Arc<dyn RegistrationSink>) -> Result<Arc<dyn PublishedLocator>> {
        if let Some(message) = self.fail_next_publish.lock().unwrap().take() {
            return Err(anyhow::anyhow!(message));
        }

        *self.sink.lock().unwrap() = Some(sink);
        let n = self.publish_count.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockLocator {
            address: format!("mock:{n}"),
        }))
    }

    async fn withdraw(&self, _locator: Arc<dyn PublishedLocator>) -> Result<()> {
        *self.sink.lock().unwrap() = None;
        self.withdraw_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct MockLocator {
    address: String,
}

impl PublishedLocator for MockLocator {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Remote handle that records outbound calls instead of making them.
#[derive(Default)]
pub struct MockRemoteHandle {
    quit_calls: AtomicUsize,
    dead: AtomicBool,
}

impl MockRemoteHandle {
    pub fn quit_calls(&self) -> usize {
        self.quit_calls.load(Ordering::Relaxed)
    }

    /// Make subsequent `is_alive` probes report false.
    pub fn mark_dead(&self) {
        self.dead.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl RemoteHandle for MockRemoteHandle {
    async fn quit(&self) -> Result<()> {
        self.quit_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn is_alive(&self) -> Result<bool> {
        Ok(!self.dead.load(Ordering::Relaxed))
    }
}

/// One observed lifecycle hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Quit(ChildExit),
    CrashDuringStartup(ChildExit),
}

/// Hook implementation that records every invocation for assertions.
pub struct RecordingEvents {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl RecordingEvents {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl crate::events::ControllerEvents for RecordingEvents {
    async fn on_connected(&self) {
        let _ = self.tx.send(LifecycleEvent::Connected);
    }

    async fn on_quit(&self, exit: ChildExit) {
        let _ = self.tx.send(LifecycleEvent::Quit(exit));
    }

    async fn on_crash_during_startup(&self, exit: ChildExit) {
        let _ = self.tx.send(LifecycleEvent::CrashDuringStartup(exit));
    }
}
