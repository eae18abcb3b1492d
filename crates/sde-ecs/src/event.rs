//! Typed message dispatch.
//!
//! Every dispatch-capable object owns an [`EventHandler`] created from a shared
//! [`Dispatcher`]. A handler keeps at most one callback per message type.
//! Registering also appends the handler to the dispatcher's receiver list for
//! that type, which is what [`EventHandler::broadcast`] fans out over.
//!
//! Matching is by the exact runtime type of the message. Wrapping one message
//! type inside another does not make it deliverable as the inner type.
//!
//! Receiver lists hold generational [`Handle`]s rather than references. A
//! dropped handler's handle goes dead and broadcasts skip it.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::handle::{Handle, HandleAllocator};

/// A message payload. Implemented for every `'static` type.
pub trait Event: Any {
    fn as_any(&self) -> &dyn Any;

    /// Short type name, for logs.
    fn event_name(&self) -> &'static str;

    /// The exact runtime type used for routing.
    fn event_type(&self) -> TypeId {
        self.as_any().type_id()
    }
}

impl<T: Any> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn event_name(&self) -> &'static str {
        type_name::<T>()
    }
}

type Callback = Rc<dyn Fn(&dyn Event) -> Delivery>;
type CallbackTable = HashMap<TypeId, Callback>;

/// Outcome of delivering a message to a single handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A callback for the message type ran.
    Handled,
    /// No callback for the message type is registered on this handler, or
    /// a method-style callback skipped a dropped or busy target.
    Ignored,
}

#[derive(Default)]
struct DispatchState {
    handlers: HandleAllocator,
    /// Callback table per handler, indexed by handle slot.
    tables: Vec<CallbackTable>,
    /// Message type to receivers, in registration order. Append-only;
    /// dead handles stay until [`Dispatcher::prune`].
    receivers: HashMap<TypeId, Vec<Handle>>,
}

impl DispatchState {
    fn allocate(&mut self) -> Handle {
        let handle = self.handlers.allocate();
        let idx = handle.index() as usize;
        if idx >= self.tables.len() {
            self.tables.resize_with(idx + 1, HashMap::new);
        }
        handle
    }

    /// Kill a handle and hand back its callbacks so the caller can drop them
    /// outside the borrow.
    fn release(&mut self, handle: Handle) -> Option<CallbackTable> {
        if !self.handlers.release(handle) {
            return None;
        }
        Some(std::mem::take(&mut self.tables[handle.index() as usize]))
    }

    fn callback(&self, handle: Handle, event_type: TypeId) -> Option<Callback> {
        if !self.handlers.is_live(handle) {
            return None;
        }
        self.tables
            .get(handle.index() as usize)?
            .get(&event_type)
            .cloned()
    }

    fn receivers(&self, event_type: TypeId) -> Vec<Handle> {
        self.receivers
            .get(&event_type)
            .cloned()
            .unwrap_or_default()
    }
}

fn deliver(state: &RefCell<DispatchState>, handle: Handle, event: &dyn Event) -> Delivery {
    let callback = state.borrow().callback(handle, event.event_type());
    match callback {
        Some(callback) => {
            trace!(%handle, event = event.event_name(), "delivering event");
            callback(event)
        }
        None => Delivery::Ignored,
    }
}

fn fan_out(state: &RefCell<DispatchState>, event: &dyn Event) -> usize {
    // Snapshot so callbacks may register or drop handlers mid-broadcast.
    let receivers = state.borrow().receivers(event.event_type());
    let mut delivered = 0;
    for handle in receivers {
        if !state.borrow().handlers.is_live(handle) {
            trace!(%handle, event = event.event_name(), "skipping dropped receiver");
            continue;
        }
        if deliver(state, handle, event) == Delivery::Handled {
            delivered += 1;
        }
    }
    trace!(event = event.event_name(), delivered, "broadcast finished");
    delivered
}

/// Shared dispatch state: the handler liveness table, each handler's
/// callbacks, and the receiver list per message type.
///
/// Cloning yields another reference to the same state.
#[derive(Clone, Default)]
pub struct Dispatcher {
    state: Rc<RefCell<DispatchState>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new handler attached to this dispatcher.
    pub fn handler(&self) -> EventHandler {
        let handle = self.state.borrow_mut().allocate();
        trace!(%handle, "created event handler");
        EventHandler {
            handle,
            state: Rc::downgrade(&self.state),
        }
    }

    /// Deliver `event` to every receiver registered for its exact type.
    /// Returns the number of deliveries that were [`Delivery::Handled`].
    pub fn broadcast(&self, event: &dyn Event) -> usize {
        fan_out(&self.state, event)
    }

    /// Entries in the receiver list for `M`, duplicates and dropped handlers included.
    pub fn receiver_count<M: Event>(&self) -> usize {
        self.state
            .borrow()
            .receivers
            .get(&TypeId::of::<M>())
            .map_or(0, Vec::len)
    }

    /// Number of handlers that have not been dropped.
    pub fn live_handlers(&self) -> usize {
        self.state.borrow().handlers.len()
    }

    /// Drop receiver entries whose handler is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut state = self.state.borrow_mut();
        let DispatchState {
            handlers,
            receivers,
            ..
        } = &mut *state;
        let mut removed = 0;
        for list in receivers.values_mut() {
            let before = list.len();
            list.retain(|h| handlers.is_live(*h));
            removed += before - list.len();
        }
        receivers.retain(|_, list| !list.is_empty());
        debug!(removed, "pruned dropped receivers");
        removed
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Dispatcher")
            .field("live_handlers", &state.handlers.len())
            .field("message_types", &state.receivers.len())
            .finish()
    }
}

/// Per-object dispatch capability.
///
/// Holds only a weak reference to its dispatcher; once the dispatcher is gone
/// every operation is a no-op. Dropping the handler removes it from every
/// future delivery.
pub struct EventHandler {
    handle: Handle,
    state: Weak<RefCell<DispatchState>>,
}

impl EventHandler {
    /// Create a handler on `dispatcher`. Same as [`Dispatcher::handler`].
    pub fn new(dispatcher: &Dispatcher) -> Self {
        dispatcher.handler()
    }

    /// This handler's handle in the dispatcher's liveness table.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Create another handler on the same dispatcher.
    pub fn sibling(&self) -> EventHandler {
        match self.state.upgrade() {
            Some(state) => Dispatcher { state }.handler(),
            None => EventHandler {
                handle: self.handle,
                state: Weak::new(),
            },
        }
    }

    /// The dispatcher this handler belongs to, if it still exists.
    pub fn dispatcher(&self) -> Option<Dispatcher> {
        self.state.upgrade().map(|state| Dispatcher { state })
    }

    /// Register `callback` for messages of type `M`.
    ///
    /// Replaces any earlier callback for `M` on this handler, and appends this
    /// handler to `M`'s receiver list. Registering twice appends twice, so a
    /// broadcast then runs the current callback twice.
    pub fn register_func<M, F>(&self, callback: F)
    where
        M: Event,
        F: Fn(&M) + 'static,
    {
        self.insert_callback::<M, _>(move |message| {
            callback(message);
            Delivery::Handled
        });
    }

    /// Register a method-style callback on a shared target.
    ///
    /// Only a weak reference to `target` is kept. Delivery is skipped, and
    /// reported as [`Delivery::Ignored`], if the target has been dropped or
    /// is already borrowed.
    pub fn register_method<T, M, F>(&self, target: &Rc<RefCell<T>>, method: F)
    where
        T: 'static,
        M: Event,
        F: Fn(&mut T, &M) + 'static,
    {
        let target = Rc::downgrade(target);
        self.insert_callback::<M, _>(move |message| {
            let Some(target) = target.upgrade() else {
                trace!(event = type_name::<M>(), "target dropped, skipping");
                return Delivery::Ignored;
            };
            let Ok(mut guard) = target.try_borrow_mut() else {
                warn!(
                    event = type_name::<M>(),
                    target = type_name::<T>(),
                    "target already borrowed, skipping delivery"
                );
                return Delivery::Ignored;
            };
            method(&mut *guard, message);
            Delivery::Handled
        });
    }

    /// Store `callback` as this handler's entry for `M` and append the
    /// handler to `M`'s receiver list.
    fn insert_callback<M, F>(&self, callback: F)
    where
        M: Event,
        F: Fn(&M) -> Delivery + 'static,
    {
        let Some(state) = self.state.upgrade() else {
            warn!(handle = %self.handle, "register on handler whose dispatcher is gone");
            return;
        };
        let event_type = TypeId::of::<M>();
        let callback: Callback = Rc::new(move |event: &dyn Event| {
            match event.as_any().downcast_ref::<M>() {
                Some(message) => callback(message),
                None => Delivery::Ignored,
            }
        });

        let previous = {
            let mut state = state.borrow_mut();
            if !state.handlers.is_live(self.handle) {
                return;
            }
            state
                .receivers
                .entry(event_type)
                .or_default()
                .push(self.handle);
            let idx = self.handle.index() as usize;
            state.tables[idx].insert(event_type, callback)
        };
        debug!(
            handle = %self.handle,
            event = type_name::<M>(),
            replaced = previous.is_some(),
            "registered event callback"
        );
        // Old callback may own objects whose drop touches the dispatcher.
        drop(previous);
    }

    /// Whether this handler has a callback for `M`.
    pub fn is_registered<M: Event>(&self) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let registered = state
            .borrow()
            .callback(self.handle, TypeId::of::<M>())
            .is_some();
        registered
    }

    /// Deliver `event` to this handler only.
    pub fn handle_event(&self, event: &dyn Event) -> Delivery {
        match self.state.upgrade() {
            Some(state) => deliver(&state, self.handle, event),
            None => Delivery::Ignored,
        }
    }

    /// Deliver `event` to every receiver registered for its exact type, in
    /// registration order, whichever handler initiates it.
    pub fn broadcast(&self, event: &dyn Event) -> usize {
        match self.state.upgrade() {
            Some(state) => fan_out(&state, event),
            None => 0,
        }
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventHandler").field(&self.handle).finish()
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let Ok(mut guard) = state.try_borrow_mut() else {
            warn!(handle = %self.handle, "dispatcher busy while dropping handler");
            return;
        };
        let released = guard.release(self.handle);
        drop(guard);
        if released.is_some() {
            trace!(handle = %self.handle, "dropped event handler");
        }
        // Callbacks drop here, after the borrow is released.
        drop(released);
    }
}
