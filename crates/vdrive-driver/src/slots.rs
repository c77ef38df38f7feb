use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use vdrive_types::VolumePath;

/// Per-volume registry of destination names currently being created.
///
/// A creator holds the slot of its destination path for the duration of the
/// existence check and the write, so two creators of one name are serialized
/// even when the backend's own primitive would overwrite. Unrelated names
/// never contend.
#[derive(Debug, Default)]
pub struct NameSlots {
    held: Mutex<HashSet<VolumePath>>,
    released: Condvar,
}

impl NameSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `path`, blocking while another creator holds it.
    pub fn acquire(&self, path: &VolumePath) -> SlotGuard<'_> {
        let mut held = self.held.lock().expect("lock poisoned");
        while held.contains(path) {
            held = self.released.wait(held).expect("lock poisoned");
        }
        held.insert(path.clone());
        SlotGuard {
            slots: self,
            path: path.clone(),
        }
    }
}

/// Reservation of one name slot; released on drop.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    slots: &'a NameSlots,
    path: VolumePath,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.slots.held.lock() {
            held.remove(&self.path);
        }
        self.slots.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn p(s: &str) -> VolumePath {
        VolumePath::parse(s).unwrap()
    }

    #[test]
    fn guard_releases_on_drop() {
        let slots = NameSlots::new();
        let guard = slots.acquire(&p("a"));
        // Unrelated names never contend.
        drop(slots.acquire(&p("b")));
        drop(guard);
        // Would block forever if the first guard had kept its slot.
        drop(slots.acquire(&p("a")));
    }

    #[test]
    fn holders_of_one_slot_are_serialized() {
        let slots = NameSlots::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);
        let barrier = Barrier::new(8);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    let _slot = slots.acquire(&p("same"));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        drop(slots.acquire(&p("same")));
    }
}
