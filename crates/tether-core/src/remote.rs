use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The duplex call mechanism between controller and child.
///
/// The controller publishes a locator the child can resolve; the transport
/// delivers the child's registration back through the [`RegistrationSink`]
/// and hands the controller a [`RemoteHandle`] for outbound calls. The wire
/// format is entirely the transport's business.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Publish a locator for this controller's callback endpoint.
    ///
    /// Registrations arriving through the published endpoint are delivered to
    /// `sink` on the transport's own delivery task.
    async fn publish(&self, sink: Arc<dyn RegistrationSink>) -> Result<Arc<dyn PublishedLocator>>;

    /// Withdraw a previously published locator so no further child can
    /// complete a registration against it.
    async fn withdraw(&self, locator: Arc<dyn PublishedLocator>) -> Result<()>;
}

/// A published callback locator. `address` is the serialized form the child
/// resolves; for file-based transports, a path handed to the child on its
/// command line.
pub trait PublishedLocator: Send + Sync {
    fn address(&self) -> &str;
}

/// The controller's remote view of a registered child.
#[async_trait]
pub trait RemoteHandle: Send + Sync {
    /// Ask the child to terminate itself. Fire-and-forget; the actual exit
    /// is observed by the supervisor, not by this call.
    async fn quit(&self) -> Result<()>;

    /// Optional liveness probe.
    async fn is_alive(&self) -> Result<bool>;
}

/// Inbound half of the channel: receives the child's registration call.
/// Implemented by the controller.
#[async_trait]
pub trait RegistrationSink: Send + Sync {
    async fn register(&self, handle: Arc<dyn RemoteHandle>);
}
