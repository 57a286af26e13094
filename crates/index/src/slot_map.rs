//! Bidirectional `slot <-> document id` map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps vector slots to docstore ids and back.
///
/// Slots are dense and assigned in insertion order, so the forward
/// direction is a plain vector. Serialized as that vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SlotMap {
    ids: Vec<String>,
    by_id: HashMap<String, usize>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an id at the next slot and return that slot.
    pub fn push(&mut self, id: impl Into<String>) -> usize {
        let id = id.into();
        let slot = self.ids.len();
        self.by_id.insert(id.clone(), slot);
        self.ids.push(id);
        slot
    }

    pub fn id_for(&self, slot: usize) -> Option<&str> {
        self.ids.get(slot).map(String::as_str)
    }

    pub fn slot_for(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in slot order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Drop every slot at or past `len`.
    pub fn truncate(&mut self, len: usize) {
        for id in self.ids.drain(len.min(self.ids.len())..) {
            self.by_id.remove(&id);
        }
    }
}

impl From<Vec<String>> for SlotMap {
    fn from(ids: Vec<String>) -> Self {
        let by_id = ids
            .iter()
            .enumerate()
            .map(|(slot, id)| (id.clone(), slot))
            .collect();
        Self { ids, by_id }
    }
}

impl From<SlotMap> for Vec<String> {
    fn from(map: SlotMap) -> Self {
        map.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_dense_slots() {
        let mut map = SlotMap::new();
        assert_eq!(map.push("a"), 0);
        assert_eq!(map.push("b"), 1);

        assert_eq!(map.id_for(1), Some("b"));
        assert_eq!(map.slot_for("a"), Some(0));
        assert_eq!(map.id_for(2), None);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let map = SlotMap::from(vec!["x".to_string(), "y".to_string()]);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"["x","y"]"#);

        let back: SlotMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.slot_for("y"), Some(1));
    }

    #[test]
    fn test_truncate_drops_reverse_entries() {
        let mut map = SlotMap::from(vec!["x".to_string(), "y".to_string(), "z".to_string()]);
        map.truncate(1);
        assert_eq!(map.len(), 1);
        assert_eq!(map.slot_for("y"), None);
        assert_eq!(map.slot_for("x"), Some(0));
    }
}
