//! Indirect object store
//!
//! Objects are shared behind `Arc` so that cloning a document is cheap and
//! an edit copies only the objects it touches.

use std::collections::BTreeMap;
use std::sync::Arc;
use log::{trace, warn};

use crate::error::{PDFError, PDFResult};
use super::{Object, ObjectId};

/// Highest generation number; an object number that reaches it is retired
pub const MAX_GENERATION: u16 = 65535;

#[derive(Debug, Clone)]
struct StoredObject {
    generation: u16,
    value: Arc<Object>,
}

/// Map from object number to the live object with that number
#[derive(Debug, Clone)]
pub struct ObjectStore {
    objects: BTreeMap<u32, StoredObject>,
    /// Freed object numbers and the generation their next use will carry
    free: BTreeMap<u32, u16>,
    next_number: u32,
}

impl ObjectStore {
    /// Create empty store; object numbers start at 1
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            free: BTreeMap::new(),
            next_number: 1,
        }
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// One past the highest object number ever allocated
    pub fn size(&self) -> u32 {
        let highest_free = self.free.keys().next_back().map_or(0, |n| n + 1);
        self.next_number.max(highest_free).max(1)
    }

    /// Insert an object under an explicit identifier, replacing any
    /// previous object with the same number
    pub fn insert(&mut self, id: ObjectId, object: Object) {
        self.free.remove(&id.number);
        self.objects.insert(
            id.number,
            StoredObject {
                generation: id.generation,
                value: Arc::new(object),
            },
        );
        self.next_number = self.next_number.max(id.number.saturating_add(1));
    }

    /// Insert an object that is already shared with another store
    pub fn insert_shared(&mut self, id: ObjectId, object: Arc<Object>) {
        self.free.remove(&id.number);
        self.objects.insert(
            id.number,
            StoredObject {
                generation: id.generation,
                value: object,
            },
        );
        self.next_number = self.next_number.max(id.number.saturating_add(1));
    }

    /// Record a number as free, as read from a cross-reference section
    pub fn mark_free(&mut self, number: u32, next_generation: u16) {
        if number == 0 || self.objects.contains_key(&number) {
            return;
        }
        if next_generation == MAX_GENERATION {
            // Retired; never handed out again
            self.free.remove(&number);
        } else {
            self.free.insert(number, next_generation);
        }
        self.next_number = self.next_number.max(number.saturating_add(1));
    }

    /// Add an object under a fresh identifier
    ///
    /// The lowest freed number is reused with its bumped generation; with
    /// no freed numbers a new number past the current maximum is taken.
    pub fn add(&mut self, object: Object) -> ObjectId {
        let id = match self.free.pop_first() {
            Some((number, generation)) => ObjectId::new(number, generation),
            None => ObjectId::new(self.next_number, 0),
        };
        trace!("Allocated object {}", id);
        self.insert(id, object);
        id
    }

    /// Reserve an identifier now and fill it in later with `insert`
    pub fn reserve(&mut self) -> ObjectId {
        self.add(Object::Null)
    }

    /// Get object by identifier; a generation mismatch reads as absent
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects
            .get(&id.number)
            .filter(|stored| stored.generation == id.generation)
            .map(|stored| stored.value.as_ref())
    }

    /// Get object, failing with `MalformedDocument` when absent
    pub fn require(&self, id: ObjectId) -> PDFResult<&Object> {
        self.get(id)
            .ok_or_else(|| PDFError::malformed(format!("Object {} not found", id)))
    }

    /// Get mutable object; shared copies are cloned first
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects
            .get_mut(&id.number)
            .filter(|stored| stored.generation == id.generation)
            .map(|stored| Arc::make_mut(&mut stored.value))
    }

    /// Get the shared handle of an object
    pub fn get_shared(&self, id: ObjectId) -> Option<Arc<Object>> {
        self.objects
            .get(&id.number)
            .filter(|stored| stored.generation == id.generation)
            .map(|stored| Arc::clone(&stored.value))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Identifier of the live object with this number, if any
    pub fn id_for_number(&self, number: u32) -> Option<ObjectId> {
        self.objects
            .get(&number)
            .map(|stored| ObjectId::new(number, stored.generation))
    }

    /// Remove an object and free its number
    pub fn remove(&mut self, id: ObjectId) -> Option<Object> {
        if self.get(id).is_none() {
            return None;
        }
        let stored = self.objects.remove(&id.number)?;
        if stored.generation < MAX_GENERATION {
            self.free.insert(id.number, stored.generation + 1);
        } else {
            warn!("Object number {} reached generation {} and is retired", id.number, MAX_GENERATION);
        }
        trace!("Freed object {}", id);
        Some(Arc::try_unwrap(stored.value).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Follow references until a direct object is reached
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        let mut current = object;
        // Bounded so that a reference cycle cannot loop forever
        for _ in 0..32 {
            match current {
                Object::Reference(id) => current = self.get(*id)?,
                direct => return Some(direct),
            }
        }
        warn!("Reference chain too long while resolving {:?}", object.as_reference());
        None
    }

    /// Resolve and read as integer
    pub fn resolve_integer(&self, object: &Object) -> Option<i64> {
        self.resolve(object).and_then(Object::as_integer)
    }

    /// Iterate live objects in ascending object number order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .map(|(&number, stored)| (ObjectId::new(number, stored.generation), stored.value.as_ref()))
    }

    /// Identifiers of all live objects, ascending
    pub fn ids(&self) -> Vec<ObjectId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Free entries as (number, next generation), ascending
    pub fn free_entries(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        self.free.iter().map(|(&n, &g)| (n, g))
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}
