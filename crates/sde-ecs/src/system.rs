use std::any::type_name;

use tracing::trace;

use crate::world::World;

/// Logic that runs once per simulation tick.
///
/// Systems that want messages own an [`EventHandler`](crate::EventHandler),
/// usually created with [`World::event_handler`].
pub trait System {
    fn execute(&mut self, world: &World);

    /// Name used in logs.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// Blanket implementation so closures can be used as systems.
impl<F: FnMut(&World)> System for F {
    fn execute(&mut self, world: &World) {
        (self)(world);
    }
}

/// An ordered list of systems. The driver decides the order by insertion.
#[derive(Default)]
pub struct SystemSchedule {
    systems: Vec<Box<dyn System>>,
}

impl SystemSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a system to the end of the schedule.
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.systems.push(Box::new(system));
    }

    /// Execute every system once, in insertion order.
    pub fn execute_all(&mut self, world: &World) {
        for system in &mut self.systems {
            trace!(system = system.name(), "executing system");
            system.execute(world);
        }
    }

    /// Names of the scheduled systems, in order.
    pub fn names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentBase};
    use crate::event::EventHandler;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Counter {
        base: ComponentBase,
        ticks: u32,
    }

    impl Component for Counter {
        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }
    }

    struct CountSystem;

    impl System for CountSystem {
        fn execute(&mut self, world: &World) {
            for entity in world.entities().iter() {
                let mut entity = entity.borrow_mut();
                if let Some(counter) = entity.get_component_mut::<Counter>() {
                    if counter.active() {
                        counter.ticks += 1;
                    }
                }
            }
        }

        fn name(&self) -> &str {
            "count"
        }
    }

    struct Reset;

    struct ResetListener {
        events: EventHandler,
        resets: Rc<RefCell<u32>>,
    }

    impl ResetListener {
        fn new(world: &World) -> Self {
            let resets = Rc::new(RefCell::new(0));
            let events = world.event_handler();
            let sink = Rc::clone(&resets);
            events.register_func(move |_: &Reset| *sink.borrow_mut() += 1);
            Self { events, resets }
        }
    }

    impl System for ResetListener {
        fn execute(&mut self, _world: &World) {
            self.events.broadcast(&Reset);
        }
    }

    #[test]
    fn closure_system() {
        let world = World::new();
        let calls = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&calls);
        let mut system = move |_: &World| *sink.borrow_mut() += 1;
        system.execute(&world);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn schedule_ordering() {
        let world = World::new();
        let log = Rc::new(RefCell::new(Vec::<u32>::new()));

        let mut schedule = SystemSchedule::new();
        for n in 1..=3 {
            let log = Rc::clone(&log);
            schedule.add_system(move |_: &World| log.borrow_mut().push(n));
        }

        schedule.execute_all(&world);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(schedule.len(), 3);
    }

    #[test]
    fn systems_skip_inactive_components() {
        let world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        a.borrow_mut().add_component(|base| Counter { base, ticks: 0 });
        b.borrow_mut().add_component(|base| Counter { base, ticks: 0 });
        b.borrow_mut().set_active(false);

        let mut schedule = SystemSchedule::new();
        schedule.add_system(CountSystem);
        assert_eq!(schedule.names(), vec!["count"]);
        schedule.execute_all(&world);
        schedule.execute_all(&world);

        assert_eq!(a.borrow().get_component::<Counter>().unwrap().ticks, 2);
        assert_eq!(b.borrow().get_component::<Counter>().unwrap().ticks, 0);
    }

    #[test]
    fn systems_can_exchange_messages() {
        let world = World::new();
        let mut listener = ResetListener::new(&world);
        let resets = Rc::clone(&listener.resets);
        listener.execute(&world);
        assert_eq!(*resets.borrow(), 1);
        assert!(listener.name().ends_with("ResetListener"));
    }
}
