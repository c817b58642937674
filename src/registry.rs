//! The central rider registry: the single source of truth a rider id
//! resolves to. Reservoirs index ids, never owned copies — this is the
//! concurrent map both reservoirs and the conductor go through so a rider
//! is never held by two places at once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::Rider;

/// Shared handle both reservoirs and the conductor go through. A `tokio`
/// mutex (not `std`) because call sites hold it across `.await` points.
pub type SharedRegistry = Arc<Mutex<RiderRegistry>>;

#[derive(Debug, Default)]
pub struct RiderRegistry {
    riders: HashMap<Uuid, Arc<Mutex<Rider>>>,
}

impl RiderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn insert(&mut self, rider: Rider) -> Arc<Mutex<Rider>> {
        let handle = Arc::new(Mutex::new(rider));
        let id = {
            // Safe: just constructed, no other holder yet.
            let guard = handle.try_lock().expect("freshly inserted rider is uncontended");
            guard.id
        };
        self.riders.insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Mutex<Rider>>> {
        self.riders.get(&id).cloned()
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Arc<Mutex<Rider>>> {
        self.riders.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.riders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.riders.is_empty()
    }
}
