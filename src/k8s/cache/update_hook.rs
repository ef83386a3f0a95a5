use std::sync::{Arc, PoisonError, RwLock};

/// A mutation the watch loop applied to a store
#[derive(Debug, Clone)]
pub enum UpdateEvent<K> {
    Added(Arc<K>),
    Modified(Arc<K>),
    Deleted(Arc<K>),
}

impl<K> UpdateEvent<K> {
    #[must_use]
    pub fn object(&self) -> &Arc<K> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => obj,
        }
    }
}

pub type UpdateHandler<K> = Arc<dyn Fn(&UpdateEvent<K>) + Send + Sync>;

/// Slot for at most one update callback
pub struct UpdateHook<K> {
    handler: RwLock<Option<UpdateHandler<K>>>,
}

impl<K> Default for UpdateHook<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for UpdateHook<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateHook")
            .field("is_set", &self.is_set())
            .finish()
    }
}

impl<K> UpdateHook<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handler: RwLock::new(None),
        }
    }

    /// Register `handler`, replacing any previous one
    pub fn set(&self, handler: UpdateHandler<K>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn clear(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Invoke the registered handler, if any.
    ///
    /// The handler is cloned out first so it may call `set` or `clear` itself.
    pub fn fire(&self, event: &UpdateEvent<K>) {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}
