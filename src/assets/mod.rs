//! Asset loading and the "everything loaded" signal
//!
//! Every load registers a [`LoadTicket`] with a shared [`LoadingManager`].
//! The manager resolves its [`AssetsLoaded`] future once no tickets are
//! outstanding, which is what one-shot work such as probe baking waits on.

pub mod arena;
#[cfg(feature = "gltf-models")]
pub mod gltf;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Intensity given to directional lights of loaded scenes
pub const SUN_INTENSITY: f32 = 3.0;

/// Asset error type
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to read model {path}: {message}")]
    Import { path: PathBuf, message: String },
    #[error("Model {path} has no scene to instantiate")]
    EmptyModel { path: PathBuf },
    #[error("Model format not supported in this build: {0}")]
    Unsupported(PathBuf),
    #[error("Asset loader thread for {0} panicked")]
    LoaderPanicked(String),
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Outcome of all loads tracked by a manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Default)]
struct LoadState {
    pending: usize,
    summary: LoadSummary,
    wakers: Vec<Waker>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<LoadState>,
    done: Condvar,
}

/// Tracks outstanding asset loads
///
/// Clones share the same state, so a clone can be moved into a loader thread.
#[derive(Clone, Default)]
pub struct LoadingManager {
    shared: Arc<Shared>,
}

impl LoadingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a load that must finish before the manager reports completion
    pub fn begin(&self, name: impl Into<String>) -> LoadTicket {
        let name = name.into();
        self.shared.state.lock().pending += 1;
        log::debug!("Loading '{}'", name);
        LoadTicket {
            shared: Arc::clone(&self.shared),
            name,
            finished: false,
        }
    }

    /// True when no loads are outstanding
    pub fn is_loaded(&self) -> bool {
        self.shared.state.lock().pending == 0
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending
    }

    pub fn summary(&self) -> LoadSummary {
        self.shared.state.lock().summary.clone()
    }

    /// Future resolving once every registered load has finished
    pub fn loaded(&self) -> AssetsLoaded {
        AssetsLoaded {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block the calling thread until every registered load has finished
    pub fn wait(&self) -> LoadSummary {
        pollster::block_on(self.loaded())
    }

    /// Block until loaded or until `timeout` passes; `None` on timeout
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> Option<LoadSummary> {
        let mut state = self.shared.state.lock();
        if state.pending > 0 {
            let result = self
                .shared
                .done
                .wait_while_for(&mut state, |s| s.pending > 0, timeout);
            if result.timed_out() && state.pending > 0 {
                return None;
            }
        }
        Some(state.summary.clone())
    }
}

/// Handle for one in-flight load
///
/// Dropping a ticket without calling [`complete`](LoadTicket::complete) or
/// [`fail`](LoadTicket::fail) records the load as failed.
pub struct LoadTicket {
    shared: Arc<Shared>,
    name: String,
    finished: bool,
}

impl LoadTicket {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn complete(mut self) {
        self.finish(None);
    }

    pub fn fail(mut self, reason: impl Into<String>) {
        self.finish(Some(reason.into()));
    }

    fn finish(&mut self, failure: Option<String>) {
        if self.finished {
            return;
        }
        self.finished = true;

        let wakers = {
            let mut state = self.shared.state.lock();
            match failure {
                None => {
                    log::info!("Loaded '{}'", self.name);
                    state.summary.loaded.push(self.name.clone());
                }
                Some(reason) => {
                    log::error!("Failed to load '{}': {}", self.name, reason);
                    state.summary.failed.push((self.name.clone(), reason));
                }
            }
            state.pending -= 1;
            if state.pending > 0 {
                return;
            }
            log::info!("Loading complete");
            self.shared.done.notify_all();
            std::mem::take(&mut state.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

impl Drop for LoadTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Some("load abandoned".to_string()));
        }
    }
}

/// Future returned by [`LoadingManager::loaded`]
pub struct AssetsLoaded {
    shared: Arc<Shared>,
}

impl Future for AssetsLoaded {
    type Output = LoadSummary;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<LoadSummary> {
        let mut state = self.shared.state.lock();
        if state.pending == 0 {
            return Poll::Ready(state.summary.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::{RawWaker, RawWakerVTable};
    use std::time::Duration;

    fn noop_waker() -> Waker {
        fn noop(_: *const ()) {}
        fn clone(p: *const ()) -> RawWaker {
            RawWaker::new(p, &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn empty_manager_is_loaded() {
        let manager = LoadingManager::new();
        assert!(manager.is_loaded());
        assert_eq!(manager.wait(), LoadSummary::default());
    }

    #[test]
    fn future_pending_until_last_ticket() {
        let manager = LoadingManager::new();
        let a = manager.begin("a");
        let b = manager.begin("b");

        let mut fut = manager.loaded();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        a.complete();
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        b.fail("missing file");
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(summary) => {
                assert_eq!(summary.loaded, vec!["a".to_string()]);
                assert_eq!(summary.failed.len(), 1);
            }
            Poll::Pending => panic!("expected Ready"),
        }
    }

    #[test]
    fn dropped_ticket_counts_as_failure() {
        let manager = LoadingManager::new();
        drop(manager.begin("model"));
        assert!(manager.is_loaded());
        assert_eq!(manager.summary().failed[0].0, "model");
    }

    #[test]
    fn wait_blocks_until_worker_finishes() {
        let manager = LoadingManager::new();
        let ticket = manager.begin("slow");
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            ticket.complete();
        });
        let summary = manager.wait();
        assert_eq!(summary.loaded, vec!["slow".to_string()]);
        worker.join().unwrap();
    }

    #[test]
    fn wait_timeout_reports_timeout() {
        let manager = LoadingManager::new();
        let _ticket = manager.begin("never");
        assert!(manager.wait_timeout(Duration::from_millis(5)).is_none());
    }
}
