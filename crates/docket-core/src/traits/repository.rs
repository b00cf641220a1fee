// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session contract for repositories participating in a unit of work.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::traits::datastore::{Datastore, TransactionSession};

/// A repository that can be pointed at the active transaction session.
///
/// The unit of work sets the session on `begin` (or on registration while
/// active) and clears it on `dispose`. Repositories must thread the session
/// returned by [`SessionAware::session`] through every CRUD call.
pub trait SessionAware<S: TransactionSession>: Send + Sync + 'static {
    /// Point the repository at `session`, or detach it with `None`.
    fn set_session(&self, session: Option<Weak<S>>);

    /// The active session, if one is attached and still alive.
    fn session(&self) -> Option<Arc<S>>;
}

/// A repository the unit of work can construct lazily.
pub trait Repository<D: Datastore>: SessionAware<D::Session> + Sized {
    fn create(datastore: &Arc<D>) -> Self;
}

/// Holder for the weak session reference repositories keep.
///
/// Upgrading fails as soon as the owning unit of work drops its `Arc`, so a
/// repository can never keep using a disposed session.
pub struct SessionSlot<S> {
    inner: RwLock<Option<Weak<S>>>,
}

impl<S> SessionSlot<S> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn set(&self, session: Option<Weak<S>>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn get(&self) -> Option<Arc<S>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Whether a session reference is stored (alive or not).
    pub fn is_attached(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<S> Default for SessionSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for SessionSlot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_stops_yielding_dropped_session() {
        let slot = SessionSlot::new();
        let session = Arc::new(42u32);
        slot.set(Some(Arc::downgrade(&session)));
        assert_eq!(slot.get().as_deref(), Some(&42));

        drop(session);
        assert!(slot.is_attached());
        assert!(slot.get().is_none());

        slot.set(None);
        assert!(!slot.is_attached());
    }
}
