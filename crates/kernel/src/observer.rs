use std::cell::RefCell;
use std::rc::Weak;

use glam::{DVec3, Vec3};
use largemap_common::ObserverId;
use largemap_origin::OriginState;

/// The one capability the tracker needs from an observed entity: reading and
/// rewriting its position relative to the current origin.
///
/// Returning `None` from `local_position` means the entity is gone.
pub trait LocalFrame {
    fn local_position(&self) -> Option<Vec3>;
    /// Move the entity to a new local position. Returns false if it is gone.
    fn set_local_position(&mut self, local: Vec3) -> bool;
}

/// An entity shared as `Rc<RefCell<Vec3>>`; dropping the last `Rc` makes the
/// observer stale.
impl LocalFrame for Weak<RefCell<Vec3>> {
    fn local_position(&self) -> Option<Vec3> {
        self.upgrade().map(|cell| *cell.borrow())
    }

    fn set_local_position(&mut self, local: Vec3) -> bool {
        match self.upgrade() {
            Some(cell) => {
                *cell.borrow_mut() = local;
                true
            }
            None => false,
        }
    }
}

/// A tracked observer and its last known absolute position.
pub struct Observer {
    id: ObserverId,
    frame: Box<dyn LocalFrame>,
    absolute: Option<DVec3>,
    stale: bool,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// `None` until the first refresh after registration.
    pub fn absolute(&self) -> Option<DVec3> {
        self.absolute
    }

    /// The entity behind this observer was gone at the last refresh.
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub stale: usize,
}

/// Keeps the absolute position of every observer, in registration order.
///
/// Stale observers are skipped, not removed: they keep their last position
/// for inspection but stop driving streaming and rebasing until the entity
/// reports again or the observer is removed explicitly.
#[derive(Default)]
pub struct ObserverTracker {
    observers: Vec<Observer>,
}

impl ObserverTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Its position resolves on the next refresh.
    /// Returns false if the id is already tracked.
    pub fn add(&mut self, id: ObserverId, frame: Box<dyn LocalFrame>) -> bool {
        if self.get(id).is_some() {
            return false;
        }
        self.observers.push(Observer {
            id,
            frame,
            absolute: None,
            stale: false,
        });
        true
    }

    /// Stop tracking an observer. Returns false if it was not tracked.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }

    pub fn get(&self, id: ObserverId) -> Option<&Observer> {
        self.observers.iter().find(|o| o.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observer> {
        self.observers.iter()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Recompute every absolute position as `origin + local`.
    pub fn refresh_all(&mut self, origin: &OriginState) -> RefreshReport {
        let mut report = RefreshReport::default();
        for observer in &mut self.observers {
            match observer.frame.local_position() {
                Some(local) => {
                    observer.absolute = Some(origin.to_absolute(local));
                    observer.stale = false;
                    report.refreshed += 1;
                }
                None => {
                    if !observer.stale {
                        tracing::debug!(id = ?observer.id, "observer entity gone, skipping");
                    }
                    observer.stale = true;
                    report.stale += 1;
                }
            }
        }
        report
    }

    /// Rewrite every live entity's local position against a new origin so
    /// its absolute position is unchanged. Returns how many were moved.
    pub fn relocate_all(&mut self, origin: &OriginState) -> usize {
        let mut moved = 0;
        for observer in &mut self.observers {
            if observer.stale {
                continue;
            }
            let Some(absolute) = observer.absolute else {
                continue;
            };
            if observer.frame.set_local_position(origin.to_local(absolute)) {
                moved += 1;
            } else {
                observer.stale = true;
            }
        }
        moved
    }

    /// Absolute positions of live observers with a known position.
    pub fn positions(&self) -> Vec<DVec3> {
        self.observers
            .iter()
            .filter(|o| !o.stale)
            .filter_map(|o| o.absolute)
            .collect()
    }
}
