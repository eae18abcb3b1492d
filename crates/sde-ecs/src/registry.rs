//! Per-type registry of live instances.
//!
//! A [`Registry<T>`] keeps non-owning references to every live `T` that has
//! registered with it. Registering hands back a [`Registration`] token; the
//! entry disappears when the token is dropped, so embedding the token in the
//! instance makes membership follow the instance's lifetime.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::handle::{Handle, HandleAllocator};

struct Slots<T> {
    handles: HandleAllocator,
    /// Registration order. Removal shifts later entries down.
    entries: Vec<(Handle, Weak<RefCell<T>>)>,
}

impl<T> Slots<T> {
    fn remove(&mut self, handle: Handle) -> bool {
        if !self.handles.release(handle) {
            return false;
        }
        if let Some(pos) = self.entries.iter().position(|(h, _)| *h == handle) {
            self.entries.remove(pos);
        }
        true
    }
}

/// Enumerable list of every live instance of `T`.
///
/// Cloning a `Registry` yields another handle to the same storage. Two
/// registries created with [`Registry::new`] never share storage, even for
/// the same `T`.
pub struct Registry<T> {
    slots: Rc<RefCell<Slots<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Slots {
                handles: HandleAllocator::new(),
                entries: Vec::new(),
            })),
        }
    }

    /// Append an instance. The returned token removes it again when dropped.
    pub fn register(&self, instance: Weak<RefCell<T>>) -> Registration<T> {
        let mut slots = self.slots.borrow_mut();
        let handle = slots.handles.allocate();
        slots.entries.push((handle, instance));
        trace!(%handle, live = slots.entries.len(), "registered instance");
        Registration {
            handle,
            slots: Rc::downgrade(&self.slots),
        }
    }

    /// Remove a registration ahead of its drop. Equivalent to dropping the token.
    pub fn deregister(&self, registration: Registration<T>) {
        drop(registration);
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.slots.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().entries.is_empty()
    }

    /// The instance at `index` in registration order.
    ///
    /// Indices shift when earlier instances go away; use [`Registry::find`]
    /// with a handle for anything that must survive removals.
    pub fn get(&self, index: usize) -> Option<Rc<RefCell<T>>> {
        self.slots.borrow().entries.get(index)?.1.upgrade()
    }

    /// The handle of the instance at `index` in registration order.
    pub fn handle_at(&self, index: usize) -> Option<Handle> {
        self.slots.borrow().entries.get(index).map(|(h, _)| *h)
    }

    /// Look up an instance by the handle its registration was given.
    pub fn find(&self, handle: Handle) -> Option<Rc<RefCell<T>>> {
        let slots = self.slots.borrow();
        if !slots.handles.is_live(handle) {
            return None;
        }
        slots
            .entries
            .iter()
            .find(|(h, _)| *h == handle)
            .and_then(|(_, weak)| weak.upgrade())
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slots.borrow().handles.is_live(handle)
    }

    /// Snapshot of all live instances in registration order.
    ///
    /// The returned `Rc`s keep instances alive only for as long as the caller
    /// holds the vector.
    pub fn iter(&self) -> std::vec::IntoIter<Rc<RefCell<T>>> {
        let live: Vec<_> = self
            .slots
            .borrow()
            .entries
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        live.into_iter()
    }
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Rc::clone(&self.slots),
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

/// Membership token returned by [`Registry::register`].
pub struct Registration<T> {
    handle: Handle,
    slots: Weak<RefCell<Slots<T>>>,
}

impl<T> Registration<T> {
    /// The stable handle of this registration.
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl<T> fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Registration").field(&self.handle).finish()
    }
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        let Some(shared) = self.slots.upgrade() else {
            return;
        };
        // Registry methods never hold the borrow across user code, so this
        // only fails if a registry is dropped from inside its own accessor.
        let Ok(mut slots) = shared.try_borrow_mut() else {
            return;
        };
        if slots.remove(self.handle) {
            trace!(
                handle = %self.handle,
                live = slots.entries.len(),
                "deregistered instance"
            );
        }
    }
}
