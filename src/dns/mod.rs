//! Name resolution module
//!
//! Resolves DNS names into their IPv4 and IPv6 addresses over a bounded pool
//! of client connections dialed inside the target container's network
//! namespace.

use futures_util::future::BoxFuture;

use crate::error::ResolveError;

pub mod pool;

pub use pool::ResolverPool;

/// Docker's embedded DNS resolver, reachable only from inside a container's
/// network namespace.
pub const DOCKER_EMBEDDED_RESOLVER: &str = "127.0.0.11:53";

/// Either the resolved addresses (textual literals, A records first, then
/// AAAA) or the reason resolution failed.
pub type ResolveOutcome = Result<Vec<String>, ResolveError>;

/// Completion callback of a resolution job; invoked exactly once.
pub type ResolveCallback = Box<dyn FnOnce(ResolveOutcome) -> BoxFuture<'static, ()> + Send>;

/// Name resolver seam so digging can be exercised without a live resolver.
pub trait NameResolver: Send + 'static {
    /// Enqueues resolution of `name` into its A and AAAA addresses. Does not
    /// wait for the resolution to complete; `done` is invoked exactly once
    /// with the outcome.
    fn resolve_name(&self, name: &str, done: ResolveCallback);

    /// Waits for all queued work to drain, then releases the resolver's
    /// resources.
    fn stop_wait(self) -> impl std::future::Future<Output = ()> + Send;
}
