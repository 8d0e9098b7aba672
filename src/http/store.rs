//! In-memory person records.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A person record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
}

/// Request body for creating or updating a person.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonInput {
    /// Ignored on update; zero or absent on create picks the next id
    #[serde(default)]
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
}

/// Keyed CRUD over a list of people.
///
/// Lookups are linear scans; the store is meant for a handful of records.
#[derive(Debug, Default)]
pub struct RecordStore {
    people: RwLock<Vec<Person>>,
}

impl RecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a few sample records.
    pub fn with_sample_data() -> Self {
        let people = [(1, "Ada", "Lovelace"), (2, "Alan", "Turing"), (3, "Grace", "Hopper")]
            .into_iter()
            .map(|(id, first, last)| Person {
                id,
                first_name: first.to_string(),
                last_name: last.to_string(),
            })
            .collect();

        Self {
            people: RwLock::new(people),
        }
    }

    pub fn list(&self) -> Vec<Person> {
        self.people.read().clone()
    }

    pub fn get(&self, id: i32) -> Option<Person> {
        self.people.read().iter().find(|p| p.id == id).cloned()
    }

    /// Insert a person. Returns `None` if the requested id is taken.
    pub fn create(&self, input: PersonInput) -> Option<Person> {
        let mut people = self.people.write();

        let id = if input.id > 0 {
            if people.iter().any(|p| p.id == input.id) {
                return None;
            }
            input.id
        } else {
            people.iter().map(|p| p.id).max().unwrap_or(0) + 1
        };

        let person = Person {
            id,
            first_name: input.first_name,
            last_name: input.last_name,
        };
        people.push(person.clone());
        Some(person)
    }

    /// Replace the person stored under `id`. The id in `input` is ignored.
    pub fn update(&self, id: i32, input: PersonInput) -> Option<Person> {
        let mut people = self.people.write();
        let person = people.iter_mut().find(|p| p.id == id)?;
        person.first_name = input.first_name;
        person.last_name = input.last_name;
        Some(person.clone())
    }

    /// Remove the person stored under `id`. Returns whether it existed.
    pub fn delete(&self, id: i32) -> bool {
        let mut people = self.people.write();
        let before = people.len();
        people.retain(|p| p.id != id);
        people.len() != before
    }

    pub fn len(&self) -> usize {
        self.people.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: i32, first: &str, last: &str) -> PersonInput {
        PersonInput {
            id,
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    #[test]
    fn test_create_assigns_next_id() {
        let store = RecordStore::with_sample_data();
        let person = store.create(input(0, "Edsger", "Dijkstra")).unwrap();
        assert_eq!(person.id, 4);
        assert_eq!(store.get(4), Some(person));
    }

    #[test]
    fn test_create_with_taken_id_fails() {
        let store = RecordStore::with_sample_data();
        assert!(store.create(input(2, "Someone", "Else")).is_none());
        assert_eq!(store.len(), 3);

        let person = store.create(input(10, "Barbara", "Liskov")).unwrap();
        assert_eq!(person.id, 10);
    }

    #[test]
    fn test_update_uses_path_id() {
        let store = RecordStore::with_sample_data();
        let updated = store.update(1, input(3, "Augusta", "King")).unwrap();

        assert_eq!(updated.id, 1);
        assert_eq!(store.get(1).unwrap().first_name, "Augusta");
        assert_eq!(store.get(3).unwrap().first_name, "Grace");
    }

    #[test]
    fn test_missing_records() {
        let store = RecordStore::new();
        assert!(store.is_empty());
        assert!(store.get(1).is_none());
        assert!(store.update(1, input(1, "A", "B")).is_none());
        assert!(!store.delete(1));
    }

    #[test]
    fn test_delete() {
        let store = RecordStore::with_sample_data();
        assert!(store.delete(2));
        assert!(store.get(2).is_none());
        assert_eq!(store.len(), 2);
    }
}
