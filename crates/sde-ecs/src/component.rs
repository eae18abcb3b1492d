use std::any::Any;
use std::fmt;

use crate::entity::EntityId;
use crate::event::EventHandler;

/// Type-erasure helpers for boxed components. Implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Per-entity identity of a component, stable while the component is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey(pub(crate) u64);

/// State every component carries: its owner, its active flag, and its own
/// dispatch capability. Only an [`Entity`](crate::Entity) hands these out.
pub struct ComponentBase {
    owner: EntityId,
    key: ComponentKey,
    active: bool,
    events: EventHandler,
}

impl ComponentBase {
    pub(crate) fn new(owner: EntityId, key: ComponentKey, events: EventHandler) -> Self {
        Self {
            owner,
            key,
            active: true,
            events,
        }
    }

    /// The entity this component is attached to. A back-reference only.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn key(&self) -> ComponentKey {
        self.key
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn events(&self) -> &EventHandler {
        &self.events
    }
}

impl fmt::Debug for ComponentBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBase")
            .field("owner", &self.owner)
            .field("key", &self.key)
            .field("active", &self.active)
            .finish()
    }
}

/// A unit of state and behavior owned by exactly one entity.
///
/// Implementors embed the [`ComponentBase`] they are constructed with and
/// expose it through [`base`](Component::base) and
/// [`base_mut`](Component::base_mut).
///
/// ```ignore
/// struct Health {
///     base: ComponentBase,
///     hp: u32,
/// }
///
/// impl Component for Health {
///     fn base(&self) -> &ComponentBase { &self.base }
///     fn base_mut(&mut self) -> &mut ComponentBase { &mut self.base }
/// }
///
/// entity.add_component(|base| Health { base, hp: 100 });
/// ```
pub trait Component: AsAny {
    fn base(&self) -> &ComponentBase;
    fn base_mut(&mut self) -> &mut ComponentBase;

    /// One-time setup hook. Not called on construction; see
    /// [`Entity::initialize_all_components`](crate::Entity::initialize_all_components).
    fn initialize(&mut self) {}

    /// Plain flag write, no side effects.
    fn set_active(&mut self, active: bool) {
        self.base_mut().set_active(active);
    }

    fn active(&self) -> bool {
        self.base().active()
    }

    fn owner(&self) -> EntityId {
        self.base().owner()
    }

    fn events(&self) -> &EventHandler {
        self.base().events()
    }
}

/// Borrow a type-erased component as `T` if that is its exact runtime type.
pub(crate) fn downcast_ref<'a, T: Component>(
    component: &'a (dyn Component + 'static),
) -> Option<&'a T> {
    component.as_any().downcast_ref::<T>()
}

pub(crate) fn downcast_mut<'a, T: Component>(
    component: &'a mut (dyn Component + 'static),
) -> Option<&'a mut T> {
    component.as_any_mut().downcast_mut::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Dispatcher;
    use crate::handle::Handle;

    struct Marker {
        base: ComponentBase,
        initialized: bool,
    }

    impl Component for Marker {
        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }

        fn initialize(&mut self) {
            self.initialized = true;
        }
    }

    struct Other {
        base: ComponentBase,
    }

    impl Component for Other {
        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }
    }

    fn base(dispatcher: &Dispatcher) -> ComponentBase {
        ComponentBase::new(
            EntityId::from(Handle::from_raw(4, 1)),
            ComponentKey(0),
            dispatcher.handler(),
        )
    }

    #[test]
    fn defaults_to_active_with_owner() {
        let dispatcher = Dispatcher::new();
        let mut marker = Marker {
            base: base(&dispatcher),
            initialized: false,
        };
        assert!(marker.active());
        assert_eq!(marker.owner(), EntityId::from(Handle::from_raw(4, 1)));
        assert!(!marker.initialized);

        marker.set_active(false);
        assert!(!marker.active());
        marker.initialize();
        assert!(marker.initialized);
    }

    #[test]
    fn downcast_requires_exact_type() {
        let dispatcher = Dispatcher::new();
        let boxed: Box<dyn Component> = Box::new(Other {
            base: base(&dispatcher),
        });
        assert!(downcast_ref::<Other>(&*boxed).is_some());
        assert!(downcast_ref::<Marker>(&*boxed).is_none());
    }
}
