//! Bouncing-bodies demo simulation
//!
//! Bodies drift inside a spherical arena, bounce off its edge and expire
//! after a random number of ticks. Systems talk through broadcasts:
//! movement announces [`Collision`]s, lifetimes announce [`Expired`], and the
//! report system listens to both.

use std::cell::Cell;
use std::rc::Rc;

use glam::Vec3;
use rand::Rng;
use sde_core::SimTime;
use sde_ecs::{
    Component, ComponentBase, Entity, EntityId, EntityRef, EventHandler, System, SystemSchedule,
    World,
};
use tracing::{debug, info, warn};

use crate::settings::SimulationSettings;

/// Tag carried by every spawned body
pub const BODY_TAG: &str = "body";
/// Tag added the first time a body hits the arena edge
pub const BOUNCED_TAG: &str = "bounced";

// ---- Components ----

pub struct Body {
    base: ComponentBase,
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Component for Body {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }
}

pub struct Lifetime {
    base: ComponentBase,
    pub remaining: u32,
}

impl Component for Lifetime {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn initialize(&mut self) {
        debug!(entity = %self.owner(), remaining = self.remaining, "lifetime armed");
    }
}

// ---- Messages ----

/// A body reached the arena edge and was reflected.
#[derive(Debug, Clone, Copy)]
pub struct Collision {
    pub entity: EntityId,
    pub position: Vec3,
}

/// A body's lifetime ran out; the body has been deactivated.
#[derive(Debug, Clone, Copy)]
pub struct Expired {
    pub entity: EntityId,
}

// ---- Systems ----

pub struct MovementSystem {
    dt: f32,
    arena_radius: f32,
    events: EventHandler,
}

impl MovementSystem {
    pub fn new(world: &World, dt: f32, arena_radius: f32) -> Self {
        Self {
            dt,
            arena_radius,
            events: world.event_handler(),
        }
    }
}

impl System for MovementSystem {
    fn execute(&mut self, world: &World) {
        let mut collisions = Vec::new();
        for entity in world.entities().iter() {
            let mut entity = entity.borrow_mut();
            let id = entity.id();
            let Some(body) = entity.get_component_mut::<Body>() else {
                continue;
            };
            if !body.active() {
                continue;
            }
            body.position += body.velocity * self.dt;
            if body.position.length() > self.arena_radius {
                body.position = body.position.normalize_or_zero() * self.arena_radius;
                body.velocity = -body.velocity;
                collisions.push(Collision {
                    entity: id,
                    position: body.position,
                });
            }
        }
        // Broadcast after the loop so receivers can borrow the entities.
        for collision in &collisions {
            self.events.broadcast(collision);
        }
    }

    fn name(&self) -> &str {
        "movement"
    }
}

pub struct LifetimeSystem {
    events: EventHandler,
}

impl LifetimeSystem {
    pub fn new(world: &World) -> Self {
        Self {
            events: world.event_handler(),
        }
    }
}

impl System for LifetimeSystem {
    fn execute(&mut self, world: &World) {
        let mut expired = Vec::new();
        for entity in world.entities().iter() {
            let mut entity = entity.borrow_mut();
            if !entity.active() {
                continue;
            }
            let Some(lifetime) = entity.get_component_mut::<Lifetime>() else {
                continue;
            };
            lifetime.remaining = lifetime.remaining.saturating_sub(1);
            if lifetime.remaining == 0 {
                entity.set_active(false);
                expired.push(Expired { entity: entity.id() });
            }
        }
        for message in &expired {
            self.events.broadcast(message);
        }
    }

    fn name(&self) -> &str {
        "lifetime"
    }
}

/// Counters shared between the report system and its callbacks
#[derive(Debug, Default)]
pub struct Tally {
    pub collisions: Cell<u64>,
    pub expired: Cell<u64>,
}

pub struct ReportSystem {
    tally: Rc<Tally>,
    every: u64,
    tick: u64,
    // Keeps the callbacks registered.
    _events: EventHandler,
}

impl ReportSystem {
    pub fn new(world: &World, every: u64) -> Self {
        let tally = Rc::new(Tally::default());
        let events = world.event_handler();
        let sink = Rc::clone(&tally);
        events.register_func(move |_: &Collision| sink.collisions.set(sink.collisions.get() + 1));
        let sink = Rc::clone(&tally);
        events.register_func(move |expired: &Expired| {
            debug!(entity = %expired.entity, "body expired");
            sink.expired.set(sink.expired.get() + 1);
        });
        Self {
            tally,
            every: every.max(1),
            tick: 0,
            _events: events,
        }
    }

    pub fn tally(&self) -> Rc<Tally> {
        Rc::clone(&self.tally)
    }
}

impl System for ReportSystem {
    fn execute(&mut self, world: &World) {
        self.tick += 1;
        if self.tick % self.every != 0 {
            return;
        }
        let active = world
            .entities()
            .iter()
            .filter(|e| e.try_borrow().is_ok_and(|e| e.active()))
            .count();
        info!(
            tick = self.tick,
            live = world.entity_count(),
            active,
            bounced = world.entities_with_tag(BOUNCED_TAG).len(),
            collisions = self.tally.collisions.get(),
            expired = self.tally.expired.get(),
            "simulation report"
        );
    }

    fn name(&self) -> &str {
        "report"
    }
}

/// The demo's systems in execution order.
pub fn schedule(
    world: &World,
    settings: &SimulationSettings,
    dt: f32,
) -> (SystemSchedule, Rc<Tally>) {
    let report = ReportSystem::new(world, settings.report_every);
    let tally = report.tally();
    let mut schedule = SystemSchedule::new();
    schedule.add_system(MovementSystem::new(
        world,
        dt,
        non_negative(settings.arena_radius),
    ));
    schedule.add_system(LifetimeSystem::new(world));
    schedule.add_system(report);
    (schedule, tally)
}

// ---- Population ----

/// Owns the spawned bodies. The world's registry only observes them.
pub struct Population {
    entities: Vec<EntityRef>,
}

impl Population {
    pub fn spawn(world: &World, settings: &SimulationSettings, rng: &mut impl Rng) -> Self {
        let half = non_negative(settings.arena_radius) * 0.5;
        let speed = non_negative(settings.max_speed).max(f32::EPSILON);
        let entities = (0..settings.entity_count)
            .map(|_| {
                let entity = world.spawn();
                {
                    let mut e = entity.borrow_mut();
                    e.add_tag(BODY_TAG);
                    let position = Vec3::new(
                        rng.gen_range(-half..=half),
                        rng.gen_range(-half..=half),
                        rng.gen_range(-half..=half),
                    );
                    let velocity = Vec3::new(
                        rng.gen_range(-speed..=speed),
                        rng.gen_range(-speed..=speed),
                        rng.gen_range(-speed..=speed),
                    );
                    e.add_component(|base| Body {
                        base,
                        position,
                        velocity,
                    });
                    let remaining = rng.gen_range(1..=settings.max_lifetime.max(1));
                    e.add_component(|base| Lifetime { base, remaining });
                }
                entity
                    .borrow()
                    .events()
                    .register_method(&entity, mark_bounced);
                entity
            })
            .collect();
        Self { entities }
    }

    /// Run every body's component initialization hooks.
    pub fn initialize(&self) {
        for entity in &self.entities {
            entity.borrow_mut().initialize_all_components();
        }
    }

    /// Drop every deactivated body. Returns how many were dropped.
    pub fn cull(&mut self) -> usize {
        let before = self.entities.len();
        self.entities.retain(|e| e.borrow().active());
        before - self.entities.len()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Drive `schedule` until `settings.ticks` ticks have run, the clock stops
/// advancing, or every body has expired. Returns the ticks actually run.
pub fn run(
    world: &World,
    schedule: &mut SystemSchedule,
    population: &mut Population,
    time: &mut SimTime,
    settings: &SimulationSettings,
) -> u64 {
    let mut ticks = 0;
    if !time.has_valid_timestep() {
        warn!(
            "Fixed timestep {} is not positive, nothing to run",
            time.config.fixed_timestep
        );
        return ticks;
    }
    while ticks < settings.ticks {
        time.update(settings.frame_delta);
        let steps = u64::from(time.fixed_steps());
        if steps == 0 && time.delta_time <= 0.0 {
            warn!("Clock is not advancing (frame_delta or time_scale is zero), stopping");
            break;
        }
        // One frame may yield several steps; never run past the budget.
        for _ in 0..steps.min(settings.ticks - ticks) {
            schedule.execute_all(world);
            population.cull();
            ticks += 1;
        }
        if population.is_empty() {
            info!("All bodies expired after {} ticks", ticks);
            break;
        }
    }
    ticks
}

/// Sanitize a length read from settings: NaN, infinite and negative become 0.
fn non_negative(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn mark_bounced(entity: &mut Entity, collision: &Collision) {
    if collision.entity == entity.id() && !entity.has_tag(BOUNCED_TAG) {
        debug!(entity = %collision.entity, position = ?collision.position, "first bounce");
        entity.add_tag(BOUNCED_TAG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use sde_core::TimeConfig;

    fn settings(count: u32, max_lifetime: u32) -> SimulationSettings {
        SimulationSettings {
            entity_count: count,
            max_lifetime,
            ..Default::default()
        }
    }

    fn body(world: &World, position: Vec3, velocity: Vec3, remaining: u32) -> EntityRef {
        let entity = world.spawn();
        {
            let mut e = entity.borrow_mut();
            e.add_component(|base| Body {
                base,
                position,
                velocity,
            });
            e.add_component(|base| Lifetime { base, remaining });
        }
        entity.borrow().events().register_method(&entity, mark_bounced);
        entity
    }

    #[test]
    fn spawns_tagged_bodies() {
        let world = World::new();
        let mut rng = StdRng::seed_from_u64(1);
        let population = Population::spawn(&world, &settings(5, 10), &mut rng);
        population.initialize();

        assert_eq!(population.len(), 5);
        assert_eq!(world.entity_count(), 5);
        assert_eq!(world.entities_with_tag(BODY_TAG).len(), 5);
        for entity in world.entities().iter() {
            let e = entity.borrow();
            assert!(e.has_component::<Body>());
            let remaining = e.get_component::<Lifetime>().unwrap().remaining;
            assert!((1..=10).contains(&remaining));
        }
    }

    #[test]
    fn bad_arena_radius_spawns_at_origin() {
        let world = World::new();
        let mut rng = StdRng::seed_from_u64(3);
        for radius in [-5.0, f32::NAN, f32::INFINITY] {
            let settings = SimulationSettings {
                arena_radius: radius,
                ..settings(1, 10)
            };
            let population = Population::spawn(&world, &settings, &mut rng);
            let entity = population.entities[0].borrow();
            assert_eq!(entity.get_component::<Body>().unwrap().position, Vec3::ZERO);
        }
    }

    #[test]
    fn run_stops_at_tick_budget() {
        let world = World::new();
        let sim = SimulationSettings {
            ticks: 3,
            frame_delta: 0.25,
            ..settings(0, 1)
        };
        let (mut schedule, _tally) = schedule(&world, &sim, 1.0 / 60.0);
        let runs = Rc::new(Cell::new(0u64));
        let sink = Rc::clone(&runs);
        schedule.add_system(move |_: &World| sink.set(sink.get() + 1));
        let mut population = Population {
            entities: vec![body(&world, Vec3::ZERO, Vec3::ZERO, 1000)],
        };
        let mut time = SimTime::new(TimeConfig::default());

        // A single 0.25s frame yields 15 steps at 60Hz.
        assert_eq!(run(&world, &mut schedule, &mut population, &mut time, &sim), 3);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn run_refuses_zero_timestep() {
        let world = World::new();
        let sim = settings(0, 1);
        let mut schedule = SystemSchedule::new();
        let mut population = Population {
            entities: vec![body(&world, Vec3::ZERO, Vec3::ZERO, 1000)],
        };
        let mut time = SimTime::new(TimeConfig {
            fixed_timestep: 0.0,
            ..TimeConfig::default()
        });
        assert_eq!(run(&world, &mut schedule, &mut population, &mut time, &sim), 0);
    }

    #[test]
    fn bounce_broadcasts_collision_and_tags_body() {
        let world = World::new();
        let (mut schedule, tally) = schedule(&world, &settings(0, 1), 1.0);
        let mover = body(&world, Vec3::new(49.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0), 100);
        let idle = body(&world, Vec3::ZERO, Vec3::ZERO, 100);

        schedule.execute_all(&world);

        assert_eq!(tally.collisions.get(), 1);
        let m = mover.borrow();
        let b = m.get_component::<Body>().unwrap();
        assert_eq!(b.position, Vec3::new(50.0, 0.0, 0.0));
        assert_eq!(b.velocity, Vec3::new(-5.0, 0.0, 0.0));
        assert!(m.has_tag(BOUNCED_TAG));
        assert!(!idle.borrow().has_tag(BOUNCED_TAG));
    }

    #[test]
    fn expired_bodies_are_deactivated_and_culled() {
        let world = World::new();
        let (mut schedule, tally) = schedule(&world, &settings(0, 1), 1.0);
        let mut population = Population {
            entities: vec![
                body(&world, Vec3::ZERO, Vec3::X, 1),
                body(&world, Vec3::ZERO, Vec3::X, 3),
            ],
        };

        schedule.execute_all(&world);
        assert_eq!(tally.expired.get(), 1);
        assert_eq!(population.cull(), 1);
        assert_eq!(world.entity_count(), 1);

        // Deactivated bodies stop moving even before they are culled.
        let survivor = Rc::clone(&population.entities[0]);
        survivor.borrow_mut().set_active(false);
        let before = survivor.borrow().get_component::<Body>().unwrap().position;
        schedule.execute_all(&world);
        assert_eq!(
            survivor.borrow().get_component::<Body>().unwrap().position,
            before
        );
        drop(survivor);
        assert_eq!(population.cull(), 1);
        assert!(population.is_empty());
        assert_eq!(world.entity_count(), 0);
    }
}
