//! Identity registry - which room a live connection belongs to
//!
//! Pure lookup table. Entries are added on create/join/rejoin and removed
//! on leave, rejoin (stale id) or room deletion.

use std::collections::HashMap;

use uuid::Uuid;

#[derive(Debug, Default)]
pub struct IdentityRegistry {
    rooms_by_connection: HashMap<Uuid, Uuid>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `connection_id` is seated in `room_id`
    pub fn bind(&mut self, room_id: Uuid, connection_id: Uuid) {
        self.rooms_by_connection.insert(connection_id, room_id);
    }

    /// Forget a connection, returning the room it was bound to
    pub fn unbind(&mut self, connection_id: Uuid) -> Option<Uuid> {
        self.rooms_by_connection.remove(&connection_id)
    }

    pub fn lookup(&self, connection_id: Uuid) -> Option<Uuid> {
        self.rooms_by_connection.get(&connection_id).copied()
    }

    /// Drop every connection bound to `room_id`
    pub fn purge(&mut self, room_id: Uuid) {
        self.rooms_by_connection.retain(|_, bound| *bound != room_id);
    }

    pub fn len(&self) -> usize {
        self.rooms_by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms_by_connection.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_lookup_unbind() {
        let mut registry = IdentityRegistry::new();
        let room = Uuid::new_v4();
        let conn = Uuid::new_v4();

        registry.bind(room, conn);
        assert_eq!(registry.lookup(conn), Some(room));
        assert_eq!(registry.unbind(conn), Some(room));
        assert_eq!(registry.lookup(conn), None);
        assert_eq!(registry.unbind(conn), None);
    }

    #[test]
    fn test_purge_only_touches_room() {
        let mut registry = IdentityRegistry::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();
        let b1 = Uuid::new_v4();
        registry.bind(room_a, a1);
        registry.bind(room_a, a2);
        registry.bind(room_b, b1);

        registry.purge(room_a);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(b1), Some(room_b));
        assert_eq!(registry.lookup(a1), None);
    }

    #[test]
    fn test_rebind_moves_connection() {
        let mut registry = IdentityRegistry::new();
        let conn = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        registry.bind(first, conn);
        registry.bind(second, conn);
        assert_eq!(registry.lookup(conn), Some(second));
        assert_eq!(registry.len(), 1);
    }
}
