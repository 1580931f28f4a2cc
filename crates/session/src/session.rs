//! Session management.

use std::collections::HashMap;

use policy::{
    Capability, Connection, DataAccess, Resolver, Role, Target, bind_role, connection_role,
    unbind_role,
};
use storage::{Document, DocumentStore, Query};
use tracing::debug;

use crate::{Error, Result};

/// One caller's view of the store, gated by the role bound to its
/// connection.
pub struct Session<C> {
    connection: C,
    store: DocumentStore,
    resolver: Resolver<DocumentStore>,
    domain: Option<String>,
    models: HashMap<String, Target>,
}

impl<C: Connection> Session<C> {
    /// Create a session over `store` for the given connection.
    pub fn new(store: DocumentStore, connection: C) -> Self {
        Self {
            connection,
            resolver: Resolver::new(store.clone()),
            store,
            domain: None,
            models: HashMap::new(),
        }
    }

    /// Restrict every check to one domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Mark `table` as holding the access-controlled data model `model`.
    /// Tables not marked are open to every caller.
    pub fn guard_table(mut self, table: impl Into<String>, model: impl Into<String>) -> Self {
        self.models.insert(table.into(), Target::guarded(model));
        self
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn resolver(&self) -> &Resolver<DocumentStore> {
        &self.resolver
    }

    /// Role bound to this session's connection.
    pub fn role(&self) -> Option<Role> {
        connection_role(&self.connection)
    }

    /// Look up a stored role and bind it to the connection.
    pub fn login(&mut self, role: &str) -> Result<Role> {
        let role = self
            .resolver
            .role(role, self.domain())
            .ok_or_else(|| Error::UnknownRole(role.to_string()))?;
        bind_role(&mut self.connection, &role);
        debug!(role = %role.name, "role bound to connection");
        Ok(role)
    }

    pub fn logout(&mut self) {
        unbind_role(&mut self.connection);
    }

    /// Check if the bound role holds a capability.
    pub fn check(&self, capability: &Capability) -> bool {
        self.resolver
            .can_capability(self.role().as_ref(), capability, self.domain())
    }

    /// Request a capability, returning an error if denied.
    pub fn require(&self, capability: &Capability) -> Result<()> {
        if self.check(capability) {
            Ok(())
        } else {
            Err(denied(capability.action_name()))
        }
    }

    /// Gate a controller, and its module if given.
    pub fn require_controller(&self, controller: &Target, module: Option<&Target>) -> Result<()> {
        let role = self.role();
        if self
            .resolver
            .controller(role.as_ref(), controller, self.domain(), module)
        {
            Ok(())
        } else {
            Err(denied(Capability::controller(&controller.name).action_name()))
        }
    }

    /// Gate a page behind its controller and module.
    pub fn require_page(
        &self,
        page: &Target,
        controller: Option<&Target>,
        module: Option<&Target>,
    ) -> Result<()> {
        let role = self.role();
        if self
            .resolver
            .page(role.as_ref(), page, self.domain(), controller, module)
        {
            Ok(())
        } else {
            Err(denied(Capability::page(&page.name).action_name()))
        }
    }

    /// Read and write access to a table's model.
    pub fn access(&self, table: &str) -> DataAccess {
        let target = self.target(table);
        self.resolver
            .data(self.role().as_ref(), &target, self.domain())
    }

    pub fn read(&self, table: &str, query: &Query<'_>) -> Result<Vec<Document>> {
        self.require_read(table)?;
        Ok(self.store.get(table, query))
    }

    pub fn first(&self, table: &str, query: &Query<'_>) -> Result<Option<Document>> {
        self.require_read(table)?;
        Ok(self.store.first(table, query))
    }

    /// Insert through the gate. `Ok(None)` means the store rejected the
    /// document (unknown table or schema validity).
    pub fn insert(&self, table: &str, candidate: &Document) -> Result<Option<Document>> {
        self.require_write(table)?;
        Ok(self.store.set(table, candidate))
    }

    pub fn update(&self, table: &str, template: &Document, query: &Query<'_>) -> Result<bool> {
        self.require_write(table)?;
        Ok(self.store.update(table, template, query))
    }

    pub fn delete(&self, table: &str, query: &Query<'_>) -> Result<bool> {
        self.require_write(table)?;
        Ok(self.store.delete(table, query))
    }

    fn require_read(&self, table: &str) -> Result<()> {
        if self.access(table).read {
            Ok(())
        } else {
            Err(denied(Capability::data_read(&self.target(table).name).action_name()))
        }
    }

    fn require_write(&self, table: &str) -> Result<()> {
        if self.access(table).write {
            Ok(())
        } else {
            Err(denied(Capability::data_write(&self.target(table).name).action_name()))
        }
    }

    fn target(&self, table: &str) -> Target {
        self.models
            .get(table)
            .cloned()
            .unwrap_or_else(|| Target::open(table))
    }

    fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

fn denied(capability: String) -> Error {
    debug!(capability = %capability, "access denied");
    Error::AccessDenied { capability }
}
