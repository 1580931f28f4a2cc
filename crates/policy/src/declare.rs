//! Boot-time declaration of actions, roles and groups.
//!
//! Declarations are collected once (from code or a TOML file), completed by
//! back-filling every role and action a group or role mentions, checked for
//! integrity, and then written into the store as ordinary documents.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use storage::DocumentStore;
use tracing::{debug, info};

use crate::capability::Capability;
use crate::model::{AccessRecord, Action, Group, Role, WILDCARD};
use crate::{Error, Result};

/// An action granted by name or as a typed capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grant {
    Name(String),
    Capability(Capability),
}

impl Grant {
    pub fn action_name(&self) -> String {
        match self {
            Grant::Name(name) => name.clone(),
            Grant::Capability(capability) => capability.action_name(),
        }
    }
}

impl From<&str> for Grant {
    fn from(name: &str) -> Self {
        Grant::Name(name.to_string())
    }
}

impl From<Capability> for Grant {
    fn from(capability: Capability) -> Self {
        Grant::Capability(capability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDecl {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl ActionDecl {
    pub fn new(name: impl Into<String>, domain: Option<&str>) -> Self {
        Self {
            name: name.into(),
            domain: domain.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDecl {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub actions: Vec<Grant>,
}

impl RoleDecl {
    pub fn new(name: impl Into<String>, domain: Option<&str>) -> Self {
        Self {
            name: name.into(),
            domain: domain.map(str::to_string),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, name: &str) -> Self {
        self.actions.push(Grant::from(name));
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.actions.push(Grant::from(capability));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDecl {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub actions: Vec<Grant>,
}

impl GroupDecl {
    pub fn new(name: impl Into<String>, domain: Option<&str>) -> Self {
        Self {
            name: name.into(),
            domain: domain.map(str::to_string),
            roles: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn role(mut self, name: &str) -> Self {
        self.roles.push(name.to_string());
        self
    }

    pub fn action(mut self, name: &str) -> Self {
        self.actions.push(Grant::from(name));
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.actions.push(Grant::from(capability));
        self
    }
}

/// Access declarations loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub actions: Vec<ActionDecl>,

    #[serde(default)]
    pub roles: Vec<RoleDecl>,

    #[serde(default)]
    pub groups: Vec<GroupDecl>,
}

/// Fully back-filled access model, ready to be stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessGraph {
    pub actions: Vec<Action>,
    pub roles: Vec<Role>,
    pub groups: Vec<Group>,
}

/// How many records a seed inserted and how many were already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub existing: usize,
}

impl AccessConfig {
    /// Load declarations from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse declarations from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = ActionDecl>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleDecl>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupDecl>) -> Self {
        self.groups.extend(groups);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.roles.is_empty() && self.groups.is_empty()
    }

    /// Back-fill and validate the declarations.
    ///
    /// Groups are processed first: every role they list that is not
    /// declared becomes an empty role in the group's domain, and every
    /// action becomes an action in that domain. Roles then back-fill their
    /// actions the same way. Names are matched regardless of domain.
    pub fn resolve(&self) -> Result<AccessGraph> {
        let mut actions: Vec<Action> = self
            .actions
            .iter()
            .map(|a| Action::new(&a.name, a.domain.as_deref()))
            .collect();
        let mut roles: Vec<Role> = self
            .roles
            .iter()
            .map(|r| Role::new(&r.name, r.domain.as_deref(), r.actions.iter().map(Grant::action_name)))
            .collect();
        let mut groups = Vec::with_capacity(self.groups.len());

        for decl in &self.groups {
            let group = Group {
                id: None,
                name: decl.name.clone(),
                domain: decl.domain.clone(),
                roles: decl.roles.iter().cloned().collect(),
                actions: decl.actions.iter().map(Grant::action_name).collect(),
            };
            for role in &group.roles {
                if !roles.iter().any(|r| &r.name == role) {
                    debug!(role = %role, group = %group.name, "back-filling role");
                    roles.push(Role::new(role, group.domain.as_deref(), Vec::<String>::new()));
                }
            }
            backfill_actions(&mut actions, group.actions.iter(), group.domain.as_deref());
            groups.push(group);
        }
        for role in &roles {
            backfill_actions(&mut actions, role.actions.iter(), role.domain.as_deref());
        }

        let graph = AccessGraph {
            actions,
            roles,
            groups,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Resolve the declarations and store them. Waits for the store's boot
    /// load first so previously persisted records are not shadowed.
    ///
    /// Records already stored (same name and domain) are left untouched.
    pub async fn seed(&self, store: &DocumentStore) -> Result<SeedReport> {
        let graph = self.resolve()?;
        store.ready().await;

        ensure_table::<Action>(store, "RoleAction")?;
        ensure_table::<Role>(store, "Role")?;
        ensure_table::<Group>(store, "RoleGroup")?;

        let mut report = SeedReport::default();
        insert_all(store, &graph.actions, &mut report)?;
        insert_all(store, &graph.roles, &mut report)?;
        insert_all(store, &graph.groups, &mut report)?;
        info!(
            inserted = report.inserted,
            existing = report.existing,
            "access model seeded"
        );
        Ok(report)
    }
}

impl AccessGraph {
    fn validate(&self) -> Result<()> {
        check_unique("action", self.actions.iter().map(|a| (&a.name, &a.domain)))?;
        check_unique("role", self.roles.iter().map(|r| (&r.name, &r.domain)))?;
        check_unique("group", self.groups.iter().map(|g| (&g.name, &g.domain)))?;

        let action_names: HashSet<&str> = self.actions.iter().map(|a| a.name.as_str()).collect();
        let role_names: HashSet<&str> = self.roles.iter().map(|r| r.name.as_str()).collect();

        let granted = self
            .roles
            .iter()
            .flat_map(|r| r.actions.iter())
            .chain(self.groups.iter().flat_map(|g| g.actions.iter()));
        for action in granted {
            if action != WILDCARD && !action_names.contains(action.as_str()) {
                return Err(Error::Dangling(format!("action '{action}'")));
            }
        }
        for group in &self.groups {
            if let Some(role) = group.roles.iter().find(|r| !role_names.contains(r.as_str())) {
                return Err(Error::Dangling(format!("role '{role}' in group '{}'", group.name)));
            }
        }
        Ok(())
    }
}

fn backfill_actions<'a>(
    actions: &mut Vec<Action>,
    names: impl Iterator<Item = &'a String>,
    domain: Option<&str>,
) {
    for name in names {
        if name != WILDCARD && !actions.iter().any(|a| &a.name == name) {
            actions.push(Action::new(name, domain));
        }
    }
}

fn check_unique<'a>(
    kind: &str,
    entries: impl Iterator<Item = (&'a String, &'a Option<String>)>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for (name, domain) in entries {
        if name.trim().is_empty() {
            return Err(Error::Invalid(format!("{kind} with an empty name")));
        }
        if !seen.insert((name, domain)) {
            return Err(Error::Invalid(format!(
                "{kind} '{name}' declared twice{}",
                domain.as_ref().map(|d| format!(" in domain '{d}'")).unwrap_or_default()
            )));
        }
    }
    Ok(())
}

fn ensure_table<T: AccessRecord>(store: &DocumentStore, schema: &str) -> Result<()> {
    if store.has_table(T::TABLE) || store.new_table_with(T::TABLE, schema) {
        Ok(())
    } else {
        Err(Error::MissingTable(T::TABLE.to_string()))
    }
}

fn insert_all<T: AccessRecord>(store: &DocumentStore, records: &[T], report: &mut SeedReport) -> Result<()> {
    for record in records {
        if store.set(T::TABLE, &record.to_document()?).is_some() {
            report.inserted += 1;
        } else {
            debug!(table = T::TABLE, name = record.name(), "already stored");
            report.existing += 1;
        }
    }
    Ok(())
}
