//! Port Interfaces
//!
//! Contracts between the distribution side and the upstream feed,
//! following the Hexagonal Architecture pattern. The hub never talks
//! to a socket; it talks to [`UpstreamControl`].

/// Control surface of the upstream feed connection.
///
/// Implemented by the Massive gateway adapter. Both operations are
/// synchronous: they record desired state and hand the wire work to
/// the connection task.
#[cfg_attr(test, mockall::automock)]
pub trait UpstreamControl: Send + Sync {
    /// Register interest in a symbol upstream. Idempotent; if the
    /// feed is not yet authenticated the request is flushed on the
    /// next successful authentication.
    fn subscribe(&self, symbol: &str);

    /// Withdraw a symbol from the desired set. The provider protocol
    /// is never sent an unsubscribe message.
    fn unsubscribe(&self, symbol: &str);
}
