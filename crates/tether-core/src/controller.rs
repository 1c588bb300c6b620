use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::ControllerEvents;
use crate::process::{ChildExit, ProcessHandle, ProcessLauncher};
use crate::remote::{PublishedLocator, RegistrationSink, RemoteChannel, RemoteHandle};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Authoritative lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No child in flight; `start` may proceed.
    Idle,
    /// A child process has been launched but has not registered yet.
    StartupInProgress,
    /// The child registered; its remote handle is live.
    Connected,
    /// Terminal. No further `start` succeeds.
    Disposed,
}

/// Fields guarded by the controller's single lock. Every read or write goes
/// through the lock; remote calls, process launches and hook invocations
/// never happen while it is held.
struct LifecycleState {
    phase: Phase,
    child: Option<Arc<dyn RemoteHandle>>,
    quit_requested_during_startup: bool,
    supervisor: Option<JoinHandle<()>>,
    generation: u64,
    locator: Option<Arc<dyn PublishedLocator>>,
}

struct ControllerShared {
    config: ControllerConfig,
    launcher: Arc<dyn ProcessLauncher>,
    channel: Arc<dyn RemoteChannel>,
    events: Arc<dyn ControllerEvents>,
    lifecycle: Mutex<LifecycleState>,
    // Phase notifications for wait_until_idle() and queued start() calls.
    // Updated while holding `lifecycle` so observers never see stale order.
    phase_tx: watch::Sender<Phase>,
}

/// Supervises exactly one companion OS process at a time.
///
/// `start` launches the child and hands it a locator through which it calls
/// back to register; a supervisor task observes the process exit and returns
/// the controller to `Idle`. At most one child is ever in flight per
/// controller; overlapping `start` calls queue until the previous child has
/// fully exited.
///
/// Cloning is cheap and every clone drives the same underlying state.
#[derive(Clone)]
pub struct MasterController {
    shared: Arc<ControllerShared>,
}

enum ExitKind {
    BeforeRegistration,
    AfterConnect,
}

impl MasterController {
    pub fn new(
        config: ControllerConfig,
        launcher: Arc<dyn ProcessLauncher>,
        channel: Arc<dyn RemoteChannel>,
        events: Arc<dyn ControllerEvents>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            shared: Arc::new(ControllerShared {
                config,
                launcher,
                channel,
                events,
                lifecycle: Mutex::new(LifecycleState {
                    phase: Phase::Idle,
                    child: None,
                    quit_requested_during_startup: false,
                    supervisor: None,
                    generation: 0,
                    locator: None,
                }),
                phase_tx,
            }),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.shared.lifecycle.lock().unwrap().phase
    }

    /// Whether a child is currently registered.
    pub fn is_connected(&self) -> bool {
        self.shared.lifecycle.lock().unwrap().child.is_some()
    }

    /// Whether a supervising task is attached to the current child
    /// generation and still waiting on it.
    pub fn supervisor_active(&self) -> bool {
        self.shared
            .lifecycle
            .lock()
            .unwrap()
            .supervisor
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Launch a fresh child process and return once it exists.
    ///
    /// Does not wait for the child to register; registration arrives later
    /// through the channel and is reported via `on_connected`. If a previous
    /// child is still in flight, waits until it has fully exited first, so
    /// two children never overlap.
    pub async fn start(&self) -> Result<(), ControllerError> {
        let generation = self.claim_startup().await?;

        let locator = match self.published_locator().await {
            Ok(locator) => locator,
            Err(e) => {
                self.abort_startup(generation);
                return Err(ControllerError::export_error(e));
            }
        };

        let args = self.launch_args(locator.address());
        let config = &self.shared.config;
        let launched = self
            .shared
            .launcher
            .launch(
                &config.command,
                &args,
                &config.env,
                config.working_directory.as_deref(),
            )
            .await;

        let handle = match launched {
            Ok(handle) => handle,
            Err(e) => {
                warn!(controller = %config.name, error = %e, "child process launch failed");
                self.abort_startup(generation);
                return Err(ControllerError::launch_error(e));
            }
        };

        info!(
            controller = %config.name,
            pid = ?handle.pid(),
            generation,
            "child process launched; awaiting registration"
        );

        let task = tokio::spawn(Self::supervise(self.shared.clone(), handle, generation));

        let mut state = self.shared.lifecycle.lock().unwrap();
        if state.generation == generation
            && matches!(state.phase, Phase::StartupInProgress | Phase::Connected)
        {
            state.supervisor = Some(task);
        }

        Ok(())
    }

    /// Ask the current child to terminate.
    ///
    /// No-op while `Idle` or `Disposed`. During startup the request is
    /// remembered and executed the moment the child registers. While
    /// connected, the remote `quit()` is issued immediately, outside the
    /// lock, so a slow or hung remote endpoint cannot block state reads.
    /// The state transition itself only happens when the supervisor
    /// observes the process exit.
    pub async fn request_quit(&self) {
        let target = {
            let mut state = self.shared.lifecycle.lock().unwrap();
            match state.phase {
                Phase::Idle | Phase::Disposed => None,
                Phase::StartupInProgress => {
                    state.quit_requested_during_startup = true;
                    debug!(
                        controller = %self.shared.config.name,
                        "quit requested before registration; deferring"
                    );
                    None
                }
                Phase::Connected => state.child.clone(),
            }
        };

        if let Some(child) = target {
            if let Err(e) = child.quit().await {
                warn!(
                    controller = %self.shared.config.name,
                    error = %e,
                    "quit request to child failed"
                );
            }
        }
    }

    /// Wait until no child is in flight (`Idle`) or the controller is
    /// `Disposed`.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.shared.phase_tx.subscribe();
        let _ = rx
            .wait_for(|phase| matches!(phase, Phase::Idle | Phase::Disposed))
            .await;
    }

    /// Terminal teardown. Idempotent.
    ///
    /// Withdraws the published locator so no further child can complete a
    /// registration, and issues a best-effort `quit()` to a connected child
    /// without waiting for its exit. Never fails.
    pub async fn dispose(&self) {
        let (child, locator) = {
            let mut state = self.shared.lifecycle.lock().unwrap();
            if state.phase == Phase::Disposed {
                return;
            }
            state.phase = Phase::Disposed;
            state.quit_requested_during_startup = false;
            state.supervisor = None;
            self.shared.phase_tx.send_replace(Phase::Disposed);
            (state.child.take(), state.locator.take())
        };

        if let Some(child) = child {
            if let Err(e) = child.quit().await {
                debug!(
                    controller = %self.shared.config.name,
                    error = %e,
                    "quit on dispose failed; ignoring"
                );
            }
        }

        if let Some(locator) = locator {
            if let Err(e) = self.shared.channel.withdraw(locator).await {
                warn!(
                    controller = %self.shared.config.name,
                    error = %e,
                    "failed to withdraw published locator"
                );
            }
        }

        info!(controller = %self.shared.config.name, "controller disposed");
    }

    /// Claim the Idle slot for a new startup, waiting out any child still in
    /// flight. Returns the new generation number.
    async fn claim_startup(&self) -> Result<u64, ControllerError> {
        loop {
            let mut rx = self.shared.phase_tx.subscribe();
            {
                let mut state = self.shared.lifecycle.lock().unwrap();
                match state.phase {
                    Phase::Disposed => return Err(ControllerError::Disposed),
                    Phase::Idle => {
                        state.phase = Phase::StartupInProgress;
                        state.generation += 1;
                        state.supervisor = None;
                        self.shared.phase_tx.send_replace(Phase::StartupInProgress);
                        return Ok(state.generation);
                    }
                    Phase::StartupInProgress | Phase::Connected => {}
                }
            }

            debug!(
                controller = %self.shared.config.name,
                "start queued behind a child still in flight"
            );
            if rx
                .wait_for(|phase| matches!(phase, Phase::Idle | Phase::Disposed))
                .await
                .is_err()
            {
                return Err(ControllerError::Disposed);
            }
        }
    }

    /// Roll a failed startup back to `Idle`.
    fn abort_startup(&self, generation: u64) {
        let mut state = self.shared.lifecycle.lock().unwrap();
        if state.generation == generation && state.phase == Phase::StartupInProgress {
            state.phase = Phase::Idle;
            state.quit_requested_during_startup = false;
            self.shared.phase_tx.send_replace(Phase::Idle);
        }
    }

    /// The cached published locator, publishing it on first use. The locator
    /// is scoped to the controller's lifetime, not to an individual start.
    async fn published_locator(&self) -> anyhow::Result<Arc<dyn PublishedLocator>> {
        if let Some(locator) = self.shared.lifecycle.lock().unwrap().locator.clone() {
            return Ok(locator);
        }

        let sink: Arc<dyn RegistrationSink> = Arc::new(self.clone());
        let locator = self.shared.channel.publish(sink).await?;
        info!(
            controller = %self.shared.config.name,
            address = %locator.address(),
            "callback locator published"
        );

        self.shared.lifecycle.lock().unwrap().locator = Some(locator.clone());
        Ok(locator)
    }

    fn launch_args(&self, locator_address: &str) -> Vec<String> {
        let config = &self.shared.config;
        let mut args = config.args.clone();
        args.push("--entry".to_string());
        args.push(config.child_entry.clone());
        args.push("--locator".to_string());
        args.push(locator_address.to_string());
        args
    }

    /// One task per launched child. Its only suspension point is the wait on
    /// process exit; afterwards it applies the Idle transition and fires the
    /// owner hook with the lock released.
    async fn supervise(
        shared: Arc<ControllerShared>,
        mut handle: Box<dyn ProcessHandle>,
        generation: u64,
    ) {
        let exit = match handle.wait().await {
            Ok(exit) => exit,
            Err(e) => {
                warn!(
                    controller = %shared.config.name,
                    error = %e,
                    "wait on child process failed; exit status unknown"
                );
                ChildExit::unknown()
            }
        };

        let outcome = {
            let mut state = shared.lifecycle.lock().unwrap();
            if state.generation != generation {
                debug!(
                    controller = %shared.config.name,
                    generation,
                    "stale supervisor observed exit; ignoring"
                );
                return;
            }
            match state.phase {
                Phase::StartupInProgress => {
                    state.phase = Phase::Idle;
                    state.quit_requested_during_startup = false;
                    state.child = None;
                    state.supervisor = None;
                    shared.phase_tx.send_replace(Phase::Idle);
                    Some(ExitKind::BeforeRegistration)
                }
                Phase::Connected => {
                    state.phase = Phase::Idle;
                    state.child = None;
                    state.supervisor = None;
                    shared.phase_tx.send_replace(Phase::Idle);
                    Some(ExitKind::AfterConnect)
                }
                Phase::Disposed => {
                    state.child = None;
                    None
                }
                Phase::Idle => None,
            }
        };

        match outcome {
            Some(ExitKind::BeforeRegistration) => {
                warn!(
                    controller = %shared.config.name,
                    %exit,
                    generation,
                    "child exited before registering"
                );
                shared.events.on_crash_during_startup(exit).await;
            }
            Some(ExitKind::AfterConnect) => {
                info!(
                    controller = %shared.config.name,
                    %exit,
                    generation,
                    "child exited"
                );
                shared.events.on_quit(exit).await;
            }
            None => {
                debug!(
                    controller = %shared.config.name,
                    %exit,
                    "child exit observed after dispose"
                );
            }
        }
    }
}

#[async_trait]
impl RegistrationSink for MasterController {
    /// Inbound registration from the child, delivered on the channel's own
    /// task. Meaningful only during startup; in any other phase it is a
    /// protocol error: logged, the handle discarded, state untouched.
    async fn register(&self, handle: Arc<dyn RemoteHandle>) {
        let deferred_quit = {
            let mut state = self.shared.lifecycle.lock().unwrap();
            if state.phase != Phase::StartupInProgress {
                warn!(
                    controller = %self.shared.config.name,
                    phase = ?state.phase,
                    "registration received outside startup; discarding handle"
                );
                return;
            }
            state.phase = Phase::Connected;
            state.child = Some(handle.clone());
            self.shared.phase_tx.send_replace(Phase::Connected);
            std::mem::take(&mut state.quit_requested_during_startup)
        };

        info!(controller = %self.shared.config.name, "child registered");
        self.shared.events.on_connected().await;

        if deferred_quit {
            debug!(
                controller = %self.shared.config.name,
                "executing quit deferred from startup"
            );
            if let Err(e) = handle.quit().await {
                warn!(
                    controller = %self.shared.config.name,
                    error = %e,
                    "deferred quit failed"
                );
            }
        }
    }
}
