//! Tether - launch and supervise a companion OS process.
//!
//! The [`Tether`] facade wires the core [`MasterController`] to the platform
//! process launcher and the Unix-domain-socket callback channel. Embedders
//! that bring their own transport or launcher can assemble a
//! [`MasterController`] directly via [`Tether::with_collaborators`].

#[cfg(unix)]
mod channel;
#[cfg(unix)]
mod child;
mod platform;

pub use platform::{create_launcher, platform_name};
pub use tether_core::{
    ChildExit, ControllerConfig, ControllerError, ControllerEvents, MasterController, NoopEvents,
    Phase, ProcessHandle, ProcessLauncher, PublishedLocator, RegistrationSink, RemoteChannel,
    RemoteHandle,
};

#[cfg(unix)]
pub use channel::{UdsRemoteChannel, UdsRemoteHandle};
#[cfg(unix)]
pub use child::ChildSession;

use std::sync::Arc;

/// A [`MasterController`] assembled with this crate's default collaborators.
#[derive(Clone)]
pub struct Tether {
    controller: MasterController,
}

impl Tether {
    /// Build a controller backed by the platform launcher and the UDS
    /// callback channel.
    #[cfg(unix)]
    pub fn new(config: ControllerConfig, events: Arc<dyn ControllerEvents>) -> anyhow::Result<Self> {
        config.validate()?;
        let channel = Arc::new(UdsRemoteChannel::new(
            config.name.clone(),
            config.locator_dir.clone(),
        ));
        Ok(Self::with_collaborators(
            config,
            platform::create_launcher(),
            channel,
            events,
        ))
    }

    /// Build a controller from explicit collaborators.
    pub fn with_collaborators(
        config: ControllerConfig,
        launcher: Arc<dyn ProcessLauncher>,
        channel: Arc<dyn RemoteChannel>,
        events: Arc<dyn ControllerEvents>,
    ) -> Self {
        Self {
            controller: MasterController::new(config, launcher, channel, events),
        }
    }

    pub async fn start(&self) -> Result<(), ControllerError> {
        self.controller.start().await
    }

    pub async fn request_quit(&self) {
        self.controller.request_quit().await
    }

    pub async fn wait_until_idle(&self) {
        self.controller.wait_until_idle().await
    }

    pub async fn dispose(&self) {
        self.controller.dispose().await
    }

    pub fn phase(&self) -> Phase {
        self.controller.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.controller.is_connected()
    }

    /// The underlying controller, e.g. to hand out as a [`RegistrationSink`].
    pub fn controller(&self) -> &MasterController {
        &self.controller
    }
}
