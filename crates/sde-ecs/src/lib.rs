//! SDE ECS - entities, components and typed message dispatch
//!
//! A small single-threaded runtime for simulations:
//! - [`Registry`]: enumerable list of every live instance of a type
//! - [`Entity`]: owns [`Component`]s and tags, cascades its active state
//! - [`Dispatcher`] / [`EventHandler`]: per-type callbacks, direct delivery and broadcast
//! - [`System`]: per-tick execution contract
//! - [`World`]: the context tying the entity registry and dispatcher together

mod component;
mod entity;
mod error;
mod event;
mod handle;
mod registry;
mod system;
mod world;

pub use component::{AsAny, Component, ComponentBase, ComponentKey};
pub use entity::{Entity, EntityId, EntityRef};
pub use error::EcsError;
pub use event::{Delivery, Dispatcher, Event, EventHandler};
pub use handle::{Handle, HandleAllocator};
pub use registry::{Registration, Registry};
pub use system::{System, SystemSchedule};
pub use world::World;
