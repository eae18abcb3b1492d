use std::any::type_name;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::component::{self, AsAny, Component, ComponentBase, ComponentKey};
use crate::event::{Dispatcher, EventHandler};
use crate::handle::Handle;
use crate::registry::{Registration, Registry};

/// Stable identity of an entity. Never reused for a different entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Handle);

impl EntityId {
    /// The registry handle behind this id.
    pub fn handle(&self) -> Handle {
        self.0
    }
}

impl From<Handle> for EntityId {
    fn from(handle: Handle) -> Self {
        Self(handle)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Shared reference to a live entity. The registry only holds weak ones.
pub type EntityRef = Rc<RefCell<Entity>>;

/// A simulation object owning components and tags.
///
/// Entities are created through [`World::spawn`](crate::World::spawn) and
/// stay in the world's entity registry until the last [`EntityRef`] is
/// dropped. Components are dropped together with their entity, before
/// anything else the entity holds.
pub struct Entity {
    components: Vec<Box<dyn Component>>,
    /// Active flags recorded by the last deactivation.
    snapshot: HashMap<ComponentKey, bool>,
    tags: Vec<String>,
    active: bool,
    next_key: u64,
    id: EntityId,
    events: EventHandler,
    _registration: Registration<Entity>,
}

impl Entity {
    /// Construct an entity and append it to `registry`.
    pub(crate) fn spawn(registry: &Registry<Entity>, dispatcher: &Dispatcher) -> EntityRef {
        let entity = Rc::new_cyclic(|weak| {
            let registration = registry.register(weak.clone());
            RefCell::new(Entity {
                components: Vec::new(),
                snapshot: HashMap::new(),
                tags: Vec::new(),
                active: true,
                next_key: 0,
                id: EntityId(registration.handle()),
                events: dispatcher.handler(),
                _registration: registration,
            })
        });
        debug!(entity = %entity.borrow().id, "spawned entity");
        entity
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// This entity's own dispatch capability.
    pub fn events(&self) -> &EventHandler {
        &self.events
    }

    // ---- Components ----

    /// Attach a new component built from a fresh [`ComponentBase`] owned by
    /// this entity. Components of the same type are not deduplicated; only
    /// the first one of a type is reachable through the typed accessors.
    pub fn add_component<T, F>(&mut self, build: F) -> &mut T
    where
        T: Component,
        F: FnOnce(ComponentBase) -> T,
    {
        let key = ComponentKey(self.next_key);
        self.next_key += 1;
        let base = ComponentBase::new(self.id, key, self.events.sibling());
        debug!(entity = %self.id, component = type_name::<T>(), "adding component");

        let index = self.components.len();
        self.components.push(Box::new(build(base)));
        // The element at `index` was pushed as a `T` on the line above.
        match component::downcast_mut::<T>(&mut *self.components[index]) {
            Some(component) => component,
            None => unreachable!("component {index} was pushed as {}", type_name::<T>()),
        }
    }

    /// The first attached component whose runtime type is `T`.
    pub fn get_component<T: Component>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|c| component::downcast_ref::<T>(&**c))
    }

    pub fn get_component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|c| component::downcast_mut::<T>(&mut **c))
    }

    pub fn has_component<T: Component>(&self) -> bool {
        self.get_component::<T>().is_some()
    }

    /// Detach the first component of type `T` and forget its recorded
    /// active flag. Returns `None` if there is none.
    ///
    /// The returned box still owns the component's [`EventHandler`], so the
    /// component keeps receiving broadcasts until the box is dropped.
    pub fn remove_component<T: Component>(&mut self) -> Option<Box<T>> {
        let pos = self
            .components
            .iter()
            .position(|c| component::downcast_ref::<T>(&**c).is_some())?;
        let removed = self.components.remove(pos);
        self.snapshot.remove(&removed.base().key());
        debug!(entity = %self.id, component = type_name::<T>(), "removed component");
        removed.into_any().downcast::<T>().ok()
    }

    /// Number of attached components, unreachable duplicates included.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// All attached components in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &dyn Component> {
        self.components.iter().map(|c| &**c)
    }

    /// Set every component's flag, ignoring anything recorded by [`Entity::set_active`].
    pub fn set_all_components_active(&mut self, active: bool) {
        for component in &mut self.components {
            component.set_active(active);
        }
    }

    /// Run [`Component::initialize`] on every component in insertion order.
    pub fn initialize_all_components(&mut self) {
        for component in &mut self.components {
            component.initialize();
        }
        trace!(entity = %self.id, count = self.components.len(), "initialized components");
    }

    // ---- Active state ----

    pub fn active(&self) -> bool {
        self.active
    }

    /// Toggle the entity and cascade to its components.
    ///
    /// Deactivating records each component's current flag (replacing any
    /// earlier record) and forces it off. Activating restores every recorded
    /// flag and keeps the record. Components attached while the entity was
    /// inactive have no record and are left as they are. Deactivating twice
    /// in a row records the already-forced `false`.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if active {
            for component in &mut self.components {
                if let Some(&previous) = self.snapshot.get(&component.base().key()) {
                    component.set_active(previous);
                }
            }
        } else {
            for component in &mut self.components {
                self.snapshot
                    .insert(component.base().key(), component.active());
                component.set_active(false);
            }
        }
        debug!(entity = %self.id, active, "entity active state changed");
    }

    // ---- Tags ----

    /// Append a tag. Duplicates are kept.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Remove the first occurrence of `tag`, if any.
    pub fn remove_tag(&mut self, tag: &str) {
        if let Some(pos) = self.tags.iter().position(|t| t == tag) {
            self.tags.remove(pos);
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("active", &self.active)
            .field("components", &self.components.len())
            .field("tags", &self.tags)
            .finish()
    }
}
