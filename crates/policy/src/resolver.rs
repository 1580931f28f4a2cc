//! Capability checks over the stored access model.

use tracing::trace;

use crate::capability::{Capability, CapabilityKind, Target};
use crate::connection::{Connection, connection_role};
use crate::model::{AccessRecord, Action, Group, Role};
use crate::source::AccessSource;

/// Read and write permission on one data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataAccess {
    pub read: bool,
    pub write: bool,
}

impl DataAccess {
    pub const ALL: DataAccess = DataAccess {
        read: true,
        write: true,
    };
}

/// Action given either as a stored record or by name.
#[derive(Debug, Clone, Copy)]
pub enum ActionRef<'a> {
    Record(&'a Action),
    Name(&'a str),
}

impl<'a> ActionRef<'a> {
    /// Name checked against a role's action list.
    pub fn name(self) -> &'a str {
        match self {
            ActionRef::Record(action) => &action.name,
            ActionRef::Name(name) => name,
        }
    }
}

impl<'a> From<&'a Action> for ActionRef<'a> {
    fn from(action: &'a Action) -> Self {
        ActionRef::Record(action)
    }
}

impl<'a> From<&'a str> for ActionRef<'a> {
    fn from(name: &'a str) -> Self {
        ActionRef::Name(name)
    }
}

impl<'a> From<&'a String> for ActionRef<'a> {
    fn from(name: &'a String) -> Self {
        ActionRef::Name(name)
    }
}

/// Answers "may this role do X" using roles, groups and actions read from
/// an [`AccessSource`]. All checks are pure reads.
#[derive(Debug, Clone)]
pub struct Resolver<S> {
    source: S,
}

impl<S: AccessSource> Resolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// True iff a role is given, it lists the action (or the wildcard), and
    /// either no domain is asked for or the role belongs to it.
    ///
    /// Roles list actions by name, so a record and its name answer alike and
    /// the check never reads the source.
    pub fn can<'a>(&self, role: Option<&Role>, action: impl Into<ActionRef<'a>>, domain: Option<&str>) -> bool {
        let Some(role) = role else {
            return false;
        };
        let name = action.into().name();
        let allowed = role.has_action(name) && domain.is_none_or(|d| role.domain.as_deref() == Some(d));
        trace!(role = %role.name, action = name, ?domain, allowed, "capability check");
        allowed
    }

    /// Check a typed capability.
    pub fn can_capability(&self, role: Option<&Role>, capability: &Capability, domain: Option<&str>) -> bool {
        self.can(role, capability.action_name().as_str(), domain)
    }

    pub fn module(&self, role: Option<&Role>, module: &Target, domain: Option<&str>) -> bool {
        self.gate(role, CapabilityKind::Module, module, domain)
    }

    /// Controller check, preceded by its module when one is given.
    pub fn controller(
        &self,
        role: Option<&Role>,
        controller: &Target,
        domain: Option<&str>,
        module: Option<&Target>,
    ) -> bool {
        if module.is_some_and(|m| !self.module(role, m, domain)) {
            return false;
        }
        self.gate(role, CapabilityKind::Controller, controller, domain)
    }

    /// Page check, preceded by module and controller when given.
    pub fn page(
        &self,
        role: Option<&Role>,
        page: &Target,
        domain: Option<&str>,
        controller: Option<&Target>,
        module: Option<&Target>,
    ) -> bool {
        if module.is_some_and(|m| !self.module(role, m, domain)) {
            return false;
        }
        if controller.is_some_and(|c| !self.controller(role, c, domain, None)) {
            return false;
        }
        self.gate(role, CapabilityKind::Page, page, domain)
    }

    /// Read/write access to a data model; open models allow both.
    pub fn data(&self, role: Option<&Role>, model: &Target, domain: Option<&str>) -> DataAccess {
        if !model.guarded {
            return DataAccess::ALL;
        }
        DataAccess {
            read: self.can_capability(role, &Capability::data_read(&model.name), domain),
            write: self.can_capability(role, &Capability::data_write(&model.name), domain),
        }
    }

    /// Role-gated page: the role itself must be `name` (and in `domain`).
    pub fn has_role(&self, role: Option<&Role>, name: &str, domain: Option<&str>) -> bool {
        role.is_some_and(|r| r.name == name && domain.is_none_or(|d| r.domain.as_deref() == Some(d)))
    }

    /// Group-gated page: the role must be a member of group `name`.
    pub fn group_check(&self, role: Option<&Role>, name: &str, domain: Option<&str>) -> bool {
        let Some(role) = role else {
            return false;
        };
        domain.is_none_or(|d| role.domain.as_deref() == Some(d)) && self.in_group(role, name).is_some()
    }

    pub fn action(&self, name: &str, domain: Option<&str>) -> Option<Action> {
        self.lookup(name, domain)
    }

    pub fn role(&self, name: &str, domain: Option<&str>) -> Option<Role> {
        self.lookup(name, domain)
    }

    pub fn role_by_id(&self, id: u64) -> Option<Role> {
        self.source
            .find_first(Role::TABLE, &|doc| doc.id() == Some(id))
            .and_then(|doc| Role::from_document(&doc))
    }

    pub fn group(&self, name: &str, domain: Option<&str>) -> Option<Group> {
        self.lookup(name, domain)
    }

    /// Declared actions of a role, in the role's order. Undeclared names
    /// and the wildcard are skipped.
    pub fn actions_of(&self, role: &Role) -> Vec<Action> {
        let actions: Vec<Action> = self.all(&|doc| {
            doc.get_str("name").is_some_and(|n| role.actions.contains(n))
        });
        role.actions
            .iter()
            .filter_map(|name| actions.iter().find(|a| &a.name == name).cloned())
            .collect()
    }

    /// Groups listing the role.
    pub fn groups_of(&self, role: &Role) -> Vec<Group> {
        self.all::<Group>(&|_| true)
            .into_iter()
            .filter(|g| g.has_role(&role.name))
            .collect()
    }

    /// Member roles of a group.
    pub fn roles_of(&self, group: &Group) -> Vec<Role> {
        self.all(&|doc| doc.get_str("name").is_some_and(|n| group.roles.contains(n)))
    }

    /// The group named `group` if the role belongs to it.
    pub fn in_group(&self, role: &Role, group: &str) -> Option<Group> {
        self.groups_of(role).into_iter().find(|g| g.name == group)
    }

    /// Declared actions of the role bound to a connection.
    pub fn connection_actions<C: Connection + ?Sized>(&self, connection: &C) -> Vec<Action> {
        connection_role(connection)
            .map(|role| self.actions_of(&role))
            .unwrap_or_default()
    }

    fn gate(&self, role: Option<&Role>, kind: CapabilityKind, target: &Target, domain: Option<&str>) -> bool {
        if !target.guarded {
            return true;
        }
        self.can_capability(role, &Capability::new(kind, &target.name), domain)
    }

    /// First record named `name`; with a domain, only records of that
    /// domain qualify.
    fn lookup<T: AccessRecord>(&self, name: &str, domain: Option<&str>) -> Option<T> {
        self.source
            .find_first(T::TABLE, &|doc| {
                doc.get_str("name") == Some(name)
                    && domain.is_none_or(|d| doc.get_str("domain") == Some(d))
            })
            .and_then(|doc| T::from_document(&doc))
    }

    fn all<T: AccessRecord>(&self, filter: &dyn Fn(&storage::Document) -> bool) -> Vec<T> {
        self.source
            .find(T::TABLE, filter)
            .iter()
            .filter_map(T::from_document)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::{AccessConfig, GroupDecl, RoleDecl};
    use crate::model::WILDCARD;
    use storage::{DocumentStore, SchemaRegistry, StoreConfig};
    use tempfile::TempDir;

    async fn seeded(config: AccessConfig) -> (TempDir, Resolver<DocumentStore>) {
        let dir = TempDir::new().unwrap();
        let mut schemas = SchemaRegistry::new();
        crate::register_schemas(&mut schemas);
        let store = DocumentStore::open(
            StoreConfig::default().with_dir(dir.path()).with_cadence(0),
            schemas,
        )
        .await
        .unwrap();
        config.seed(&store).await.unwrap();
        (dir, Resolver::new(store))
    }

    fn basic() -> AccessConfig {
        AccessConfig::default()
            .with_roles([
                RoleDecl::new("R1", None).action("page.login"),
                RoleDecl::new("R2", None).action(WILDCARD),
                RoleDecl::new("clerk", Some("shop"))
                    .capability(Capability::controller("Orders"))
                    .capability(Capability::data_read("Order")),
            ])
            .with_groups([GroupDecl::new("staff", Some("shop"))
                .role("clerk")
                .role("manager")
                .action("page.reports")])
    }

    #[tokio::test]
    async fn test_can_by_name() {
        let (_dir, resolver) = seeded(basic()).await;
        let r1 = resolver.role("R1", None).unwrap();
        let r2 = resolver.role("R2", None).unwrap();
        assert!(resolver.can(Some(&r1), "page.login", None));
        assert!(!resolver.can(Some(&r1), "page.ban", None));
        assert!(resolver.can(Some(&r2), "page.ban", None));
        assert!(!resolver.can(None, "page.login", None));
    }

    #[tokio::test]
    async fn test_can_with_action_record() {
        let (_dir, resolver) = seeded(basic()).await;
        let r1 = resolver.role("R1", None).unwrap();
        let login = resolver.action("page.login", None).unwrap();
        assert!(resolver.can(Some(&r1), &login, None));
    }

    struct CountingSource(std::cell::Cell<usize>);

    impl AccessSource for CountingSource {
        fn find(&self, _table: &str, _filter: &dyn Fn(&storage::Document) -> bool) -> Vec<storage::Document> {
            self.0.set(self.0.get() + 1);
            Vec::new()
        }
    }

    #[test]
    fn test_can_reads_nothing_from_source() {
        let resolver = Resolver::new(CountingSource(Default::default()));
        let role = Role {
            id: Some(1),
            name: "R1".into(),
            domain: Some("shop".into()),
            actions: ["page.login".to_string()].into(),
        };
        let login = Action {
            id: None,
            name: "page.login".into(),
            domain: Some("blog".into()),
        };
        assert!(resolver.can(Some(&role), "page.login", Some("shop")));
        assert!(resolver.can(Some(&role), &login, Some("shop")));
        assert!(!resolver.can(Some(&role), "page.ban", Some("shop")));
        assert!(!resolver.can(Some(&role), "page.login", Some("blog")));
        assert_eq!(resolver.source().0.get(), 0);
    }

    #[tokio::test]
    async fn test_domain_must_match() {
        let (_dir, resolver) = seeded(basic()).await;
        let clerk = resolver.role("clerk", Some("shop")).unwrap();
        assert!(resolver.can(Some(&clerk), "controller.Orders", Some("shop")));
        assert!(!resolver.can(Some(&clerk), "controller.Orders", Some("blog")));
        assert!(resolver.can(Some(&clerk), "controller.Orders", None));

        let r2 = resolver.role("R2", None).unwrap();
        // the wildcard only reaches the role's own domain
        assert!(!resolver.can(Some(&r2), "page.ban", Some("shop")));
    }

    #[tokio::test]
    async fn test_open_targets_always_pass() {
        let (_dir, resolver) = seeded(basic()).await;
        let open = Target::open("Public");
        assert!(resolver.module(None, &open, None));
        assert!(resolver.controller(None, &open, None, None));
        assert!(resolver.page(None, &open, None, None, None));
        assert_eq!(resolver.data(None, &open, None), DataAccess::ALL);
    }

    #[tokio::test]
    async fn test_nested_checks_short_circuit() {
        let (_dir, resolver) = seeded(basic()).await;
        let clerk = resolver.role("clerk", Some("shop")).unwrap();
        let orders = Target::guarded("Orders");
        let admin = Target::guarded("Admin");
        let page = Target::open("list");

        assert!(resolver.controller(Some(&clerk), &orders, None, None));
        assert!(resolver.page(Some(&clerk), &page, None, Some(&orders), None));
        // guarded module the clerk lacks blocks everything below it
        assert!(!resolver.controller(Some(&clerk), &orders, None, Some(&admin)));
        assert!(!resolver.page(Some(&clerk), &page, None, Some(&orders), Some(&admin)));
        assert!(!resolver.page(Some(&clerk), &page, None, Some(&admin), None));
        assert!(!resolver.page(Some(&clerk), &Target::from("list"), None, Some(&orders), None));
    }

    #[tokio::test]
    async fn test_data_access_is_split() {
        let (_dir, resolver) = seeded(basic()).await;
        let clerk = resolver.role("clerk", Some("shop")).unwrap();
        let order = Target::guarded("Order");
        assert_eq!(
            resolver.data(Some(&clerk), &order, None),
            DataAccess {
                read: true,
                write: false
            }
        );
        assert_eq!(
            resolver.data(None, &order, None),
            DataAccess {
                read: false,
                write: false
            }
        );
    }

    #[tokio::test]
    async fn test_group_backfill_and_lookups() {
        let (_dir, resolver) = seeded(basic()).await;
        let manager = resolver.role("manager", Some("shop")).unwrap();
        assert!(manager.actions.is_empty());
        assert!(resolver.action("page.reports", Some("shop")).is_some());

        let clerk = resolver.role("clerk", Some("shop")).unwrap();
        let staff = resolver.in_group(&clerk, "staff").unwrap();
        let mut members: Vec<String> = resolver.roles_of(&staff).into_iter().map(|r| r.name).collect();
        members.sort();
        assert_eq!(members, ["clerk", "manager"]);
        assert!(resolver.group_check(Some(&clerk), "staff", Some("shop")));
        assert!(!resolver.group_check(Some(&clerk), "staff", Some("blog")));
        assert!(resolver.has_role(Some(&clerk), "clerk", None));
        assert!(!resolver.has_role(Some(&clerk), "manager", None));
    }

    #[tokio::test]
    async fn test_actions_of_skips_wildcard() {
        let (_dir, resolver) = seeded(basic()).await;
        let clerk = resolver.role("clerk", Some("shop")).unwrap();
        let names: Vec<String> = resolver.actions_of(&clerk).into_iter().map(|a| a.name).collect();
        assert_eq!(names, ["controller.Orders", "data.read.Order"]);

        let r2 = resolver.role("R2", None).unwrap();
        assert!(resolver.actions_of(&r2).is_empty());
    }

    #[tokio::test]
    async fn test_connection_actions() {
        use crate::connection::{MemoryConnection, bind_role};
        let (_dir, resolver) = seeded(basic()).await;
        let mut conn = MemoryConnection::new();
        assert!(resolver.connection_actions(&conn).is_empty());
        bind_role(&mut conn, &resolver.role("R1", None).unwrap());
        let actions = resolver.connection_actions(&conn);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name, "page.login");
    }
}
