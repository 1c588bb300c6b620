use thiserror::Error;

/// Errors surfaced synchronously by [`MasterController::start`].
///
/// Everything that happens after the child process exists (crash, unexpected
/// exit, protocol misuse by the child) is reported through the
/// [`ControllerEvents`] hooks instead, never as an error on a caller's thread.
///
/// [`MasterController::start`]: crate::MasterController::start
/// [`ControllerEvents`]: crate::ControllerEvents
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("failed to launch child process: {0}")]
    Launch(String),

    #[error("failed to publish callback locator: {0}")]
    Export(String),

    #[error("controller has been disposed")]
    Disposed,
}

impl ControllerError {
    pub fn launch_error(err: impl std::fmt::Display) -> Self {
        ControllerError::Launch(err.to_string())
    }

    pub fn export_error(err: impl std::fmt::Display) -> Self {
        ControllerError::Export(err.to_string())
    }

    /// Whether the failed operation left the controller in `Idle`, ready for
    /// another `start` attempt.
    pub fn leaves_controller_reusable(&self) -> bool {
        matches!(
            self,
            ControllerError::Launch(_) | ControllerError::Export(_)
        )
    }
}
