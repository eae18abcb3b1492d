use crate::entity::EntityId;

/// Errors from id-based entity access through a [`World`](crate::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("entity {0} is not alive")]
    StaleEntity(EntityId),

    #[error("entity {0} is already borrowed")]
    EntityBorrowed(EntityId),
}
