use super::{SessionRecord, SessionRecordStore, StoreError, UserSession};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Request-scoped view of the session loaded for the current browser.
#[derive(Debug)]
pub struct SessionSlot {
    id: String,
    loaded: UserSession,
    user: UserSession,
    destroyed: bool,
}

impl SessionSlot {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn user(&self) -> &UserSession {
        &self.user
    }

    pub fn user_mut(&mut self) -> &mut UserSession {
        &mut self.user
    }

    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// True once the session differs from what was loaded from the store.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.user != self.loaded
    }
}

/// What the session middleware owes the store once the response is built.
#[derive(Debug)]
pub enum WriteBack {
    Unchanged,
    Modified(SessionRecord),
    Destroyed,
}

/// Shared handle inserted into request extensions by the session middleware.
///
/// Handlers and inner middleware mutate the session through the handle; the
/// middleware writes a modified session back to the store once the response
/// is built, unless the session was destroyed along the way.
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<Mutex<SessionSlot>>);

impl SessionHandle {
    #[must_use]
    pub fn new(id: impl Into<String>, user: UserSession) -> Self {
        Self(Arc::new(Mutex::new(SessionSlot {
            id: id.into(),
            loaded: user.clone(),
            user,
            destroyed: false,
        })))
    }

    #[must_use]
    pub fn from_record(record: SessionRecord) -> Self {
        Self::new(record.id, record.session)
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.0.lock().await
    }

    /// Mark the session destroyed and remove it from `store`.
    ///
    /// The slot stays destroyed even when the delete fails so it is never
    /// written back.
    ///
    /// # Errors
    /// Returns the store error from the delete.
    pub async fn destroy(&self, store: &dyn SessionRecordStore) -> Result<(), StoreError> {
        let id = {
            let mut slot = self.0.lock().await;
            slot.destroyed = true;
            slot.id.clone()
        };
        store.delete_by_id(&id).await
    }

    pub async fn write_back(&self) -> WriteBack {
        let slot = self.0.lock().await;
        if slot.destroyed {
            WriteBack::Destroyed
        } else if slot.is_modified() {
            WriteBack::Modified(SessionRecord::new(slot.id.clone(), slot.user.clone()))
        } else {
            WriteBack::Unchanged
        }
    }
}
