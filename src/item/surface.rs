//! Outside-interaction detection.
//!
//! The host owns one [`InteractionSurface`] for the whole list and reports
//! every pointer interaction to it. Each mounted item holds an
//! [`OutsideListener`] scoped to its bounding region; the surface queues the
//! interaction on every listener whose region does not contain the point.
//! Dropping the listener unregisters it.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: u16,
    pub y: u16,
}

impl Point {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box in surface cells. An empty region contains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Region {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && u32::from(point.x) < u32::from(self.x) + u32::from(self.width)
            && u32::from(point.y) < u32::from(self.y) + u32::from(self.height)
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<u64, ListenerSlot>,
}

#[derive(Debug)]
struct ListenerSlot {
    region: Region,
    outside: Sender<Point>,
}

#[derive(Debug, Clone, Default)]
pub struct InteractionSurface {
    registry: Arc<Mutex<Registry>>,
}

impl InteractionSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&self, region: Region) -> OutsideListener {
        let (tx, rx) = unbounded();
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(
            id,
            ListenerSlot {
                region,
                outside: tx,
            },
        );
        tracing::trace!(id, ?region, "outside listener installed");
        OutsideListener {
            id,
            registry: Arc::downgrade(&self.registry),
            events: rx,
        }
    }

    /// Broadcasts an interaction and returns how many listeners saw it as outside.
    pub fn interact(&self, point: Point) -> usize {
        let registry = self.registry.lock();
        let mut notified = 0;
        for slot in registry.listeners.values() {
            if slot.region.contains(point) {
                continue;
            }
            if slot.outside.send(point).is_ok() {
                notified += 1;
            }
        }
        notified
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

#[derive(Debug)]
pub struct OutsideListener {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    events: Receiver<Point>,
}

impl OutsideListener {
    pub fn set_region(&self, region: Region) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut guard = registry.lock();
        if let Some(slot) = guard.listeners.get_mut(&self.id) {
            slot.region = region;
        }
    }

    pub fn region(&self) -> Option<Region> {
        let registry = self.registry.upgrade()?;
        let region = registry.lock().listeners.get(&self.id).map(|slot| slot.region);
        region
    }

    /// Drains queued interactions; `true` if any arrived since the last call.
    pub fn take_outside(&self) -> bool {
        self.events.try_iter().count() > 0
    }
}

impl Drop for OutsideListener {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.remove(&self.id);
            tracing::trace!(id = self.id, "outside listener released");
        }
    }
}
