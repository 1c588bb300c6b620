use std::sync::Arc;
use std::time::Duration;
use tether_core::testing::{
    LifecycleEvent, MockChannel, MockLauncher, MockProcessControl, RecordingEvents,
};
use tether_core::{ChildExit, ControllerConfig, ControllerError, MasterController, Phase};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    controller: MasterController,
    channel: Arc<MockChannel>,
    launcher: Arc<MockLauncher>,
    controls: mpsc::UnboundedReceiver<MockProcessControl>,
    events: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl Harness {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();

        let config = ControllerConfig::builder()
            .name("test-controller")
            .command("fake-child")
            .child_entry("worker.Main")
            .build()
            .unwrap();

        let (launcher, controls) = MockLauncher::new();
        let channel = MockChannel::new();
        let (events, events_rx) = RecordingEvents::new();
        let controller =
            MasterController::new(config, launcher.clone(), channel.clone(), events);

        Self {
            controller,
            channel,
            launcher,
            controls,
            events: events_rx,
        }
    }

    async fn next_control(&mut self) -> MockProcessControl {
        timeout(WAIT, self.controls.recv())
            .await
            .expect("timed out waiting for a launch")
            .expect("launcher dropped")
    }

    async fn next_event(&mut self) -> LifecycleEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a lifecycle event")
            .expect("event channel closed")
    }

    fn assert_no_pending_event(&mut self) {
        assert!(
            self.events.try_recv().is_err(),
            "unexpected lifecycle event pending"
        );
    }
}

/// Full normal lifecycle: launch, register, connect, exit, back to idle.
#[tokio::test]
async fn normal_lifecycle_reports_connect_then_quit() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    assert_eq!(h.controller.phase(), Phase::StartupInProgress);
    assert!(h.controller.supervisor_active());

    let control = h.next_control().await;
    assert_eq!(control.command, "fake-child");
    assert!(control.args.contains(&"--entry".to_string()));
    assert!(control.args.contains(&"worker.Main".to_string()));

    h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);
    assert_eq!(h.controller.phase(), Phase::Connected);
    assert!(h.controller.is_connected());

    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::Quit(ChildExit::with_code(0))
    );

    h.controller.wait_until_idle().await;
    assert_eq!(h.controller.phase(), Phase::Idle);
    assert!(!h.controller.is_connected());
}

/// A second start blocks until the first child has fully exited; two
/// children are never in flight together.
#[tokio::test]
async fn overlapping_starts_are_serialized() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let first = h.next_control().await;

    let second = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.start().await })
    };

    // The queued start must not produce a second process while the first
    // child is alive.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.controls.try_recv().is_err(), "second child launched early");
    assert!(!second.is_finished());

    first.exit(ChildExit::with_code(0));
    timeout(WAIT, second).await.unwrap().unwrap().unwrap();

    let replacement = h.next_control().await;
    assert_ne!(replacement.pid, first.pid);
    assert_eq!(h.controller.phase(), Phase::StartupInProgress);

    // First generation never registered, so its exit is a startup crash.
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::CrashDuringStartup(ChildExit::with_code(0))
    );
}

/// A quit requested during startup is executed the moment the child
/// registers, exactly once, and does not leak into later starts.
#[tokio::test]
async fn quit_during_startup_is_deferred_until_registration() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let control = h.next_control().await;

    h.controller.request_quit().await;
    assert_eq!(h.controller.phase(), Phase::StartupInProgress);

    let handle = h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);
    assert_eq!(handle.quit_calls(), 1);

    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::Quit(ChildExit::with_code(0))
    );
    h.controller.wait_until_idle().await;

    // A later generation must not inherit the deferred request.
    h.controller.start().await.unwrap();
    let control = h.next_control().await;
    let handle = h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);
    assert_eq!(handle.quit_calls(), 0);

    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::Quit(ChildExit::with_code(0))
    );
}

/// Dispose is idempotent and withdraws the locator exactly once.
#[tokio::test]
async fn dispose_is_idempotent() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let _control = h.next_control().await;
    let handle = h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);

    h.controller.dispose().await;
    assert_eq!(h.controller.phase(), Phase::Disposed);
    assert_eq!(handle.quit_calls(), 1);
    assert_eq!(h.channel.withdraw_count(), 1);

    h.controller.dispose().await;
    assert_eq!(handle.quit_calls(), 1);
    assert_eq!(h.channel.withdraw_count(), 1);

    assert!(matches!(
        h.controller.start().await,
        Err(ControllerError::Disposed)
    ));
}

/// A child that dies before registering fires the crash hook exactly once;
/// connect/quit never fire and the controller returns to Idle.
#[tokio::test]
async fn crash_before_registration() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let control = h.next_control().await;

    control.exit(ChildExit::with_code(3));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::CrashDuringStartup(ChildExit::with_code(3))
    );

    h.controller.wait_until_idle().await;
    assert_eq!(h.controller.phase(), Phase::Idle);
    h.assert_no_pending_event();
}

/// After a full lifecycle the controller is reusable and generations do
/// not bleed into each other.
#[tokio::test]
async fn restart_produces_an_independent_generation() {
    let mut h = Harness::new();

    for expected_exit in [0, 7] {
        h.controller.start().await.unwrap();
        let control = h.next_control().await;
        h.channel.connect_child().await;
        assert_eq!(h.next_event().await, LifecycleEvent::Connected);

        control.exit(ChildExit::with_code(expected_exit));
        assert_eq!(
            h.next_event().await,
            LifecycleEvent::Quit(ChildExit::with_code(expected_exit))
        );
        h.controller.wait_until_idle().await;
        assert_eq!(h.controller.phase(), Phase::Idle);
    }

    // The locator is published once for the controller's lifetime, not per
    // start.
    assert_eq!(h.channel.publish_count(), 1);
}

/// A quit while idle is a no-op: no remote call, no state change.
#[tokio::test]
async fn quit_on_idle_is_noop() {
    let mut h = Harness::new();

    h.controller.request_quit().await;
    assert_eq!(h.controller.phase(), Phase::Idle);
    h.assert_no_pending_event();

    // Full cycle afterwards: the stray request must not have queued anything.
    h.controller.start().await.unwrap();
    let control = h.next_control().await;
    let handle = h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);
    assert_eq!(handle.quit_calls(), 0);
    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::Quit(ChildExit::with_code(0))
    );
}

#[tokio::test]
async fn request_quit_while_connected_calls_child() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let control = h.next_control().await;
    let handle = h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);

    h.controller.request_quit().await;
    assert_eq!(handle.quit_calls(), 1);
    // State only changes when the exit is observed.
    assert_eq!(h.controller.phase(), Phase::Connected);

    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::Quit(ChildExit::with_code(0))
    );
}

#[tokio::test]
async fn launch_failure_leaves_controller_idle_and_reusable() {
    let mut h = Harness::new();

    h.launcher.fail_next_launch("no such executable");
    let err = h.controller.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::Launch(_)));
    assert!(err.leaves_controller_reusable());
    assert_eq!(h.controller.phase(), Phase::Idle);

    // The locator was published before the launch attempt and is reused.
    h.controller.start().await.unwrap();
    assert_eq!(h.channel.publish_count(), 1);
    let control = h.next_control().await;
    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::CrashDuringStartup(ChildExit::with_code(0))
    );
}

#[tokio::test]
async fn publish_failure_leaves_controller_idle() {
    let mut h = Harness::new();

    h.channel.fail_next_publish("address in use");
    let err = h.controller.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::Export(_)));
    assert_eq!(h.controller.phase(), Phase::Idle);
    assert!(h.controls.try_recv().is_err(), "child launched without a locator");

    // Publication is retried on the next start because nothing was cached.
    h.controller.start().await.unwrap();
    assert_eq!(h.channel.publish_count(), 1);
    let control = h.next_control().await;
    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::CrashDuringStartup(ChildExit::with_code(0))
    );
}

/// Registration in any phase other than StartupInProgress is a protocol
/// error: logged, discarded, state untouched.
#[tokio::test]
async fn stray_registration_is_discarded() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let control = h.next_control().await;
    h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);

    // Second registration for the same generation.
    h.channel.connect_child().await;
    h.assert_no_pending_event();
    assert_eq!(h.controller.phase(), Phase::Connected);

    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::Quit(ChildExit::with_code(0))
    );
    h.controller.wait_until_idle().await;

    // Registration while idle.
    h.channel.connect_child().await;
    h.assert_no_pending_event();
    assert_eq!(h.controller.phase(), Phase::Idle);
}

/// A signal-terminated child is surfaced with its signal, not as an error.
#[tokio::test]
async fn signal_exit_is_reported() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let control = h.next_control().await;
    h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);

    control.exit(ChildExit::with_signal(9));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::Quit(ChildExit::with_signal(9))
    );
    h.controller.wait_until_idle().await;
    assert_eq!(h.controller.phase(), Phase::Idle);
}

/// A hook may call back into the controller: restarting from on_quit must
/// not deadlock.
#[tokio::test]
async fn wait_until_idle_unblocks_queued_caller() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let control = h.next_control().await;
    h.channel.connect_child().await;
    assert_eq!(h.next_event().await, LifecycleEvent::Connected);

    let waiter = {
        let controller = h.controller.clone();
        tokio::spawn(async move {
            controller.wait_until_idle().await;
            controller.phase()
        })
    };

    control.exit(ChildExit::with_code(0));
    assert_eq!(
        h.next_event().await,
        LifecycleEvent::Quit(ChildExit::with_code(0))
    );
    let phase = timeout(WAIT, waiter).await.unwrap().unwrap();
    assert_eq!(phase, Phase::Idle);
}

/// Disposing while a child is still starting: the locator is withdrawn, the
/// late exit fires no hooks, and the phase stays Disposed.
#[tokio::test]
async fn dispose_during_startup_suppresses_hooks() {
    let mut h = Harness::new();

    h.controller.start().await.unwrap();
    let control = h.next_control().await;

    h.controller.dispose().await;
    assert_eq!(h.controller.phase(), Phase::Disposed);
    assert_eq!(h.channel.withdraw_count(), 1);

    control.exit(ChildExit::with_code(1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.assert_no_pending_event();
    assert_eq!(h.controller.phase(), Phase::Disposed);
}
