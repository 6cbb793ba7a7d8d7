//! Client record store.
//!
//! Sole owner of every `ClientRecord`. Keyed by `ClientId`, iterated in
//! connection order so broadcasts go out in a stable order.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use quiz_core::{ClientId, ClientRecord, ClientStatus};
use tracing::{debug, warn};

use super::commands::RegistryError;

/// Default maximum number of connected clients.
pub const MAX_CLIENTS: usize = 64;

/// Connection-keyed store of client records.
#[derive(Debug)]
pub struct ClientRegistry {
    records: BTreeMap<ClientId, ClientRecord>,
    max_clients: usize,
}

impl ClientRegistry {
    /// Creates an empty registry holding at most `max_clients` records.
    pub fn new(max_clients: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            max_clients,
        }
    }

    /// Inserts a `Connected` record for a new connection.
    pub fn register(
        &mut self,
        client_id: ClientId,
        peer: Option<SocketAddr>,
    ) -> Result<&ClientRecord, RegistryError> {
        if self.records.contains_key(&client_id) {
            debug!(client_id = %client_id, "Client already registered, rejecting");
            return Err(RegistryError::ClientAlreadyExists(client_id));
        }

        if self.records.len() >= self.max_clients {
            warn!(
                client_id = %client_id,
                current = self.records.len(),
                max = self.max_clients,
                "Registry is full, rejecting connection"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_clients,
            });
        }

        Ok(self
            .records
            .entry(client_id)
            .or_insert_with(|| ClientRecord::new(client_id, peer)))
    }

    /// Removes and returns a record.
    pub fn unregister(&mut self, client_id: ClientId) -> Option<ClientRecord> {
        self.records.remove(&client_id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&ClientRecord> {
        self.records.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut ClientRecord> {
        self.records.get_mut(&client_id)
    }

    /// Iterates records in connection order.
    pub fn iter(&self) -> impl Iterator<Item = &ClientRecord> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientRecord> {
        self.records.values_mut()
    }

    /// Number of clients with the given status.
    pub fn count_with_status(&self, status: ClientStatus) -> usize {
        self.records.values().filter(|r| r.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(MAX_CLIENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_creates_connected_record() {
        let mut registry = ClientRegistry::default();
        let record = registry.register(ClientId::new(1), None).unwrap();
        assert_eq!(record.status, ClientStatus::Connected);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = ClientRegistry::default();
        registry.register(ClientId::new(1), None).unwrap();

        let result = registry.register(ClientId::new(1), None);
        assert!(matches!(result, Err(RegistryError::ClientAlreadyExists(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_max_clients_limit() {
        let mut registry = ClientRegistry::new(2);
        registry.register(ClientId::new(1), None).unwrap();
        registry.register(ClientId::new(2), None).unwrap();

        let result = registry.register(ClientId::new(3), None);
        assert_eq!(result.unwrap_err(), RegistryError::RegistryFull { max: 2 });

        // Space frees up after a departure
        registry.unregister(ClientId::new(1));
        assert!(registry.register(ClientId::new(3), None).is_ok());
    }

    #[test]
    fn test_unregister_nonexistent() {
        let mut registry = ClientRegistry::default();
        assert!(registry.unregister(ClientId::new(9)).is_none());
    }

    #[test]
    fn test_iterates_in_connection_order() {
        let mut registry = ClientRegistry::default();
        for id in [5, 1, 3] {
            registry.register(ClientId::new(id), None).unwrap();
        }
        let ids: Vec<ClientId> = registry.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![ClientId::new(1), ClientId::new(3), ClientId::new(5)]);
    }

    #[test]
    fn test_count_with_status() {
        let mut registry = ClientRegistry::default();
        registry.register(ClientId::new(1), None).unwrap();
        registry.register(ClientId::new(2), None).unwrap();
        registry.get_mut(ClientId::new(2)).unwrap().set_name("Bob");

        assert_eq!(registry.count_with_status(ClientStatus::Connected), 1);
        assert_eq!(registry.count_with_status(ClientStatus::Named), 1);
    }
}
