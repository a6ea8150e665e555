//! Registry store: tool id → descriptor, read-mostly.
//!
//! Readers get an `Arc` snapshot (BTreeMap, so iteration order is
//! deterministic); the cache is invalidated whenever the registry is
//! written. Writes happen only through seeding, removal, and request
//! approval (see `requests::decide`).

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};

use vulnpilot_core::error::{Error, Result};
use vulnpilot_core::tool::{canonical_id, ToolDescriptor};

use crate::Store;

/// Point-in-time view of the registry, keyed by canonical tool id.
pub type RegistrySnapshot = BTreeMap<String, ToolDescriptor>;

pub(crate) fn load_snapshot(conn: &Connection) -> Result<RegistrySnapshot> {
    let mut stmt = conn
        .prepare("SELECT id, descriptor FROM tools")
        .map_err(Error::store)?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let descriptor: String = row.get(1)?;
            Ok((id, descriptor))
        })
        .map_err(Error::store)?;

    let mut snapshot = RegistrySnapshot::new();
    for row in rows {
        let (id, descriptor_json) = row.map_err(Error::store)?;
        match serde_json::from_str::<ToolDescriptor>(&descriptor_json) {
            Ok(descriptor) => {
                snapshot.insert(id, descriptor);
            }
            Err(e) => {
                tracing::warn!(tool_id = %id, err = %e, "skipping unreadable descriptor row");
            }
        }
    }
    Ok(snapshot)
}

impl Store {
    /// Cached registry view. Loaded lazily, shared until the next write.
    pub fn registry_snapshot(&self) -> Result<Arc<RegistrySnapshot>> {
        if let Some(snapshot) = self
            .registry_cache
            .read()
            .ok()
            .and_then(|guard| guard.clone())
        {
            return Ok(snapshot);
        }
        let conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        let snapshot = Arc::new(load_snapshot(&conn)?);
        drop(conn);
        if let Ok(mut guard) = self.registry_cache.write() {
            *guard = Some(snapshot.clone());
        }
        Ok(snapshot)
    }

    pub(crate) fn invalidate_registry_cache(&self) {
        if let Ok(mut guard) = self.registry_cache.write() {
            *guard = None;
        }
    }

    /// Look up one descriptor by id (case-insensitive).
    pub fn tool(&self, id: &str) -> Result<Option<ToolDescriptor>> {
        Ok(self.registry_snapshot()?.get(&canonical_id(id)).cloned())
    }

    /// Insert a descriptor unless its id is already registered. Returns
    /// whether it was inserted. Used by catalog seeding.
    pub fn insert_tool_if_absent(&self, descriptor: &ToolDescriptor) -> Result<bool> {
        descriptor.validate()?;
        let conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM tools WHERE id = ?1",
                params![descriptor.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::store)?;
        if existing.is_some() {
            return Ok(false);
        }
        let descriptor_json = serde_json::to_string(descriptor).map_err(Error::store)?;
        conn.execute(
            "INSERT INTO tools (id, descriptor) VALUES (?1, ?2)",
            params![descriptor.id, descriptor_json],
        )
        .map_err(Error::store)?;
        drop(conn);
        self.invalidate_registry_cache();
        Ok(true)
    }

    /// Remove a tool by id. Returns whether a row was deleted.
    pub fn remove_tool(&self, id: &str) -> Result<bool> {
        let canonical = canonical_id(id);
        let conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        let deleted = conn
            .execute("DELETE FROM tools WHERE id = ?1", params![canonical])
            .map_err(Error::store)?;
        drop(conn);
        if deleted > 0 {
            self.invalidate_registry_cache();
        }
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use vulnpilot_core::tool::ParamKind;

    use super::*;

    fn nmap() -> ToolDescriptor {
        ToolDescriptor {
            id: "nmap".to_string(),
            name: "Nmap".to_string(),
            description: "Network scanner for discovering hosts and services".to_string(),
            command: "nmap -sV {target}".to_string(),
            params: [("target".to_string(), ParamKind::Target)].into(),
            default_param: "target".to_string(),
            category: "network".to_string(),
            trigger_phrases: vec!["port scan".to_string()],
            usage_example: None,
        }
    }

    #[test]
    fn test_insert_and_case_insensitive_lookup() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.insert_tool_if_absent(&nmap()).unwrap());
        assert!(store.tool("NMAP").unwrap().is_some());
        assert!(store.tool("nuclei").unwrap().is_none());
    }

    #[test]
    fn test_insert_if_absent_never_overwrites() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.insert_tool_if_absent(&nmap()).unwrap());
        let mut changed = nmap();
        changed.description = "different".to_string();
        assert!(!store.insert_tool_if_absent(&changed).unwrap());
        let kept = store.tool("nmap").unwrap().unwrap();
        assert_eq!(kept.description, nmap().description);
    }

    #[test]
    fn test_snapshot_invalidated_on_write() {
        let store = Store::open_in_memory().unwrap();
        let before = store.registry_snapshot().unwrap();
        assert!(before.is_empty());
        store.insert_tool_if_absent(&nmap()).unwrap();
        let after = store.registry_snapshot().unwrap();
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn test_remove_tool() {
        let store = Store::open_in_memory().unwrap();
        store.insert_tool_if_absent(&nmap()).unwrap();
        assert!(store.remove_tool("Nmap").unwrap());
        assert!(!store.remove_tool("nmap").unwrap());
        assert!(store.tool("nmap").unwrap().is_none());
    }
}
