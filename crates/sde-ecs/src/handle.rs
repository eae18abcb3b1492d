use std::fmt;

/// A generational handle. The index names a slot, the generation tells a
/// live occupant apart from any earlier occupant of the same slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Handle {
    /// Create a handle from raw parts (mainly for testing).
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The slot index of this handle.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The generation of this handle (incremented each time the slot is reused).
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Liveness table for generational handles.
///
/// Released slots go on a free list and are handed out again with a bumped
/// generation, so a handle that outlives its owner never validates against
/// the new occupant.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    generations: Vec<u32>,
    live: Vec<bool>,
    free_list: Vec<u32>,
    live_count: usize,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a live handle, reusing a released slot when one is available.
    pub fn allocate(&mut self) -> Handle {
        self.live_count += 1;
        if let Some(index) = self.free_list.pop() {
            self.live[index as usize] = true;
            return Handle {
                index,
                generation: self.generations[index as usize],
            };
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.live.push(true);
        Handle {
            index,
            generation: 0,
        }
    }

    /// Mark a handle dead. Returns `false` if it was already dead or stale.
    pub fn release(&mut self, handle: Handle) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        let idx = handle.index as usize;
        self.live[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_list.push(handle.index);
        self.live_count -= 1;
        true
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        let idx = handle.index as usize;
        idx < self.live.len() && self.live[idx] && self.generations[idx] == handle.generation
    }

    /// Number of currently live handles.
    pub fn len(&self) -> usize {
        self.live_count
    }

    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Number of slots ever allocated, live or not.
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequential_slots() {
        let mut alloc = HandleAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(a.generation(), 0);
        assert_eq!(alloc.len(), 2);
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut alloc = HandleAllocator::new();
        let first = alloc.allocate();
        assert!(alloc.release(first));
        let second = alloc.allocate();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), 1);
        assert!(!alloc.is_live(first));
        assert!(alloc.is_live(second));
        assert_eq!(alloc.capacity(), 1);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut alloc = HandleAllocator::new();
        let h = alloc.allocate();
        assert!(alloc.release(h));
        assert!(!alloc.release(h));
        assert!(alloc.is_empty());
    }

    #[test]
    fn unknown_handle_is_not_live() {
        let alloc = HandleAllocator::new();
        assert!(!alloc.is_live(Handle::from_raw(3, 0)));
    }
}
