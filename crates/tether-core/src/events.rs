use crate::process::ChildExit;
use async_trait::async_trait;

/// Lifecycle hooks exposed to whatever embeds the controller.
///
/// Every hook is invoked with the controller's lock released, so a hook may
/// call back into the controller; starting a replacement child from
/// `on_quit` is fine.
///
/// Per child generation, `on_connected` fires at most once, and exactly one
/// of `on_quit` / `on_crash_during_startup` fires once the process exits.
#[async_trait]
pub trait ControllerEvents: Send + Sync {
    /// The child finished registering; the remote handle is live.
    async fn on_connected(&self) {}

    /// The child exited after having connected.
    async fn on_quit(&self, exit: ChildExit) {
        let _ = exit;
    }

    /// The child exited before registering.
    async fn on_crash_during_startup(&self, exit: ChildExit) {
        let _ = exit;
    }
}

/// Hook implementation that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

#[async_trait]
impl ControllerEvents for NoopEvents {}
