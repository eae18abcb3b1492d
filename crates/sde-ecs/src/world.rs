use tracing::trace;

use crate::entity::{Entity, EntityId, EntityRef};
use crate::error::EcsError;
use crate::event::{Dispatcher, Event, EventHandler};
use crate::registry::Registry;

/// The simulation context. Owns the entity registry and the dispatcher.
///
/// Create the world before the first entity and keep it until the last one
/// is gone; entities that outlive it keep working but can no longer send or
/// receive messages.
#[derive(Debug, Default)]
pub struct World {
    entities: Registry<Entity>,
    dispatcher: Dispatcher,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Entity management ----

    /// Create an entity. It is enumerable through [`World::entities`] until
    /// the returned reference and all its clones are dropped.
    pub fn spawn(&self) -> EntityRef {
        Entity::spawn(&self.entities, &self.dispatcher)
    }

    /// Every live entity, in spawn order.
    pub fn entities(&self) -> &Registry<Entity> {
        &self.entities
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Look up a live entity by id.
    pub fn entity(&self, id: EntityId) -> Option<EntityRef> {
        self.entities.find(id.handle())
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.contains(id.handle())
    }

    /// Run `f` on a live entity, failing instead of panicking when the
    /// entity is gone or already borrowed.
    pub fn with_entity_mut<R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&mut Entity) -> R,
    ) -> Result<R, EcsError> {
        let entity = self.entity(id).ok_or(EcsError::StaleEntity(id))?;
        let mut guard = entity
            .try_borrow_mut()
            .map_err(|_| EcsError::EntityBorrowed(id))?;
        Ok(f(&mut guard))
    }

    /// Live entities carrying `tag`. Entities borrowed mutably elsewhere are skipped.
    pub fn entities_with_tag(&self, tag: &str) -> Vec<EntityRef> {
        self.entities
            .iter()
            .filter(|entity| match entity.try_borrow() {
                Ok(entity) => entity.has_tag(tag),
                Err(_) => {
                    trace!(tag, "skipping borrowed entity in tag lookup");
                    false
                }
            })
            .collect()
    }

    // ---- Dispatch ----

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// A new handler for a system or any other object that wants messages.
    pub fn event_handler(&self) -> EventHandler {
        self.dispatcher.handler()
    }

    /// Deliver `event` to every receiver of its exact type.
    pub fn broadcast(&self, event: &dyn Event) -> usize {
        self.dispatcher.broadcast(event)
    }
}
