//! Cancellation capability handed to producers.
//!
//! Hosts differ in whether they can really abort in-flight work. The engine
//! does not care: it holds an [`AbortScope`] chosen once at construction,
//! either [`NativeAbort`] or the inert [`NoopAbort`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tokio::sync::Notify;

struct SignalState {
    aborted: Cell<bool>,
    notify: Notify,
}

/// Read side of an abort handle, passed to producers.
///
/// A signal created by [`AbortSignal::never`] never fires.
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Option<Rc<SignalState>>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { state: None }
    }

    pub fn is_aborted(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.aborted.get())
    }

    /// Resolves once the signal fires.
    pub async fn aborted(&self) {
        let Some(state) = &self.state else {
            return std::future::pending().await;
        };
        loop {
            let notified = state.notify.notified();
            if state.aborted.get() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("live", &self.state.is_some())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Write side of a single abort handle.
#[derive(Debug)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal {
                state: Some(Rc::new(SignalState {
                    aborted: Cell::new(false),
                    notify: Notify::new(),
                })),
            },
        }
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fire the signal. Aborting twice is harmless.
    pub fn abort(&self) {
        if let Some(state) = &self.signal.state {
            state.aborted.set(true);
            state.notify.notify_waiters();
        }
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// The engine's cancellation capability.
pub trait AbortScope {
    /// Abort the current handle and replace it with a fresh one.
    ///
    /// Returns the signal of the new handle.
    fn renew(&mut self) -> AbortSignal;

    /// Signal of the current handle.
    fn signal(&self) -> AbortSignal;

    /// Abort the current handle without replacing it.
    fn abort(&self);
}

/// Real cancellation: every start aborts the previous invocation.
#[derive(Debug, Default)]
pub struct NativeAbort {
    current: AbortController,
}

impl NativeAbort {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AbortScope for NativeAbort {
    fn renew(&mut self) -> AbortSignal {
        self.current.abort();
        self.current = AbortController::new();
        self.current.signal()
    }

    fn signal(&self) -> AbortSignal {
        self.current.signal()
    }

    fn abort(&self) {
        self.current.abort();
    }
}

/// Stub for hosts without cancellation; producers get a signal that never fires.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAbort;

impl AbortScope for NoopAbort {
    fn renew(&mut self) -> AbortSignal {
        AbortSignal::never()
    }

    fn signal(&self) -> AbortSignal {
        AbortSignal::never()
    }

    fn abort(&self) {}
}
