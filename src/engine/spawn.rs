//! Host event loop seam.

use futures::future::LocalBoxFuture;

/// Hands detached work to the host event loop.
///
/// The engine never creates threads; it only asks the host to poll futures.
pub trait Spawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

/// Spawns onto the current tokio `LocalSet`.
///
/// Calling [`Spawner::spawn`] outside a `LocalSet` panics, as
/// `tokio::task::spawn_local` does.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalSpawner;

impl Spawner for LocalSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }
}
