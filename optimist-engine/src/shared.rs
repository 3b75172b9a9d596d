//! Thread-safe engine handle
//!
//! One lock guards the whole engine. Dispatch holds the write lock for the
//! full event, so readers only ever observe state between events.

use crate::cache::{Revision, Snapshot};
use crate::engine::Engine;
use crate::error::Result;
use crate::event::Event;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SharedEngine {
    inner: Arc<RwLock<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        SharedEngine {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn dispatch(&self, event: &Event) -> Result<Revision> {
        self.inner.write().dispatch(event)
    }

    /// Read access; hold the guard briefly, dispatch waits on it
    pub fn read(&self) -> RwLockReadGuard<'_, Engine> {
        self.inner.read()
    }

    /// Run `f` against the engine under the read lock
    pub fn with<R>(&self, f: impl FnOnce(&Engine) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().snapshot()
    }
}

impl From<Engine> for SharedEngine {
    fn from(engine: Engine) -> Self {
        SharedEngine::new(engine)
    }
}
