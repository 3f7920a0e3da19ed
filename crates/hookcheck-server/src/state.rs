use std::sync::Arc;

use parking_lot::RwLock;

/// The single last-request slot. Every registration overwrites it.
///
/// Bodies are kept exactly as received so key order and whitespace survive.
#[derive(Clone, Default)]
pub struct LastRequestStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl LastRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `body`, returning the previously stored value
    pub fn record(&self, body: impl Into<String>) -> Option<String> {
        self.inner.write().replace(body.into())
    }

    /// The last stored body, if any
    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }

    /// Empty the slot, returning what it held
    pub fn clear(&self) -> Option<String> {
        self.inner.write().take()
    }
}
