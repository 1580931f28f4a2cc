//! Binding a role to a live connection.

use std::collections::HashMap;

use serde_json::Value;

use crate::model::Role;

/// Connection key the active role is stored under.
pub const ROLE_KEY: &str = "roles.role";

/// Per-caller key/value state supplied by the transport layer.
pub trait Connection {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value);
}

/// Connection state held in a map; used by tests and local tools.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    values: HashMap<String, Value>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connection for MemoryConnection {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }
}

/// Bind `role` to the connection, replacing any previous one.
pub fn bind_role<C: Connection + ?Sized>(connection: &mut C, role: &Role) {
    match serde_json::to_value(role) {
        Ok(value) => connection.set(ROLE_KEY, value),
        Err(e) => tracing::warn!(role = %role.name, error = %e, "cannot bind role"),
    }
}

/// Clear the role bound to the connection.
pub fn unbind_role<C: Connection + ?Sized>(connection: &mut C) {
    connection.set(ROLE_KEY, Value::Null);
}

/// Role currently bound to the connection, if any.
pub fn connection_role<C: Connection + ?Sized>(connection: &C) -> Option<Role> {
    connection
        .get(ROLE_KEY)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_read_back() {
        let mut conn = MemoryConnection::new();
        assert!(connection_role(&conn).is_none());

        let role = Role::new("admin", Some("shop"), ["*"]);
        bind_role(&mut conn, &role);
        assert_eq!(connection_role(&conn), Some(role));

        unbind_role(&mut conn);
        assert!(connection_role(&conn).is_none());
    }
}
